/// Best-effort text recovery from `message.attributedBody` blobs.
///
/// The store serialises rich text with one of two Foundation archivers.
/// Neither format is documented, so decoding is a chain of independent
/// strategies tried in priority order:
/// - `typedstream`: the legacy `NSArchiver` stream (`\x04\x0bstreamtyped…`)
/// - `keyed`: `NSKeyedArchiver` binary property lists (`bplist00…`)
/// - `scan`: a marker scan that trusts a one-byte length after `\x01+`
///
/// The first strategy that returns text wins. None of them panic or
/// return errors on malformed input; they decline with `None`.

pub mod keyed;
pub mod scan;
pub mod typedstream;

use tracing::debug;

/// One way of pulling text out of an archive blob.
pub trait Strategy {
    fn name(&self) -> &'static str;

    /// `None` means the strategy does not recognise the blob.
    fn decode(&self, blob: &[u8]) -> Option<String>;
}

/// Decoders in the order they are tried. The marker scan is last because
/// it can misfire on blobs the structured readers would reject.
pub const STRATEGIES: [&dyn Strategy; 3] = [
    &typedstream::TypedStream,
    &keyed::KeyedArchive,
    &scan::MarkerScan,
];

/// Recover the plain text of a blob.
///
/// Returns an empty string for a missing blob and when every strategy
/// declines. An empty result therefore means "undecodable", not
/// "confirmed empty".
pub fn decode(blob: Option<&[u8]>) -> String {
    let Some(blob) = blob.filter(|b| !b.is_empty()) else {
        return String::new();
    };

    for strategy in STRATEGIES {
        match strategy.decode(blob) {
            Some(text) => {
                debug!(strategy = strategy.name(), len = text.len(), "decoded attributed body");
                return text;
            }
            None => debug!(strategy = strategy.name(), "strategy declined blob"),
        }
    }

    debug!(bytes = blob.len(), "no strategy could decode blob");
    String::new()
}
