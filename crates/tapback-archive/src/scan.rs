/// Last-resort scan for the typedstream string pattern `\x01+ <len> <bytes>`.
///
/// This matches a one-character type encoding `+` followed by a one-byte
/// length, which is how short message bodies appear in most blobs. It
/// knows nothing about the surrounding structure, so a match is only
/// trusted when both structured readers have declined.

use crate::Strategy;

const MARKER: &[u8] = b"\x01+";

pub struct MarkerScan;

impl Strategy for MarkerScan {
    fn name(&self) -> &'static str {
        "marker-scan"
    }

    fn decode(&self, blob: &[u8]) -> Option<String> {
        let at = blob.windows(MARKER.len()).position(|w| w == MARKER)?;
        let len = usize::from(*blob.get(at + MARKER.len())?);
        let start = at + MARKER.len() + 1;
        let text = blob.get(start..start + len)?;
        Some(String::from_utf8_lossy(text).into_owned())
    }
}
