use std::ops::RangeInclusive;

use tapback_db::RawRow;
use tapback_types::time::to_wallclock;
use tapback_types::{DecodedMessage, MessageKind};

/// Object replacement character the store leaves where inline rich
/// content was stripped from `text`.
pub const PLACEHOLDER_GLYPH: &str = "\u{FFFC}";

pub const REACTION_TEXT: &str = "Reaction";
pub const ATTACHMENT_TEXT: &str = "Attachment";
pub const UNKNOWN_TEXT: &str = "Unknown";

/// `associated_message_type` codes of tapbacks: 2000-2005 add one,
/// 3000-3005 remove it.
const TAPBACK_RANGES: [RangeInclusive<i64>; 2] = [2000..=2005, 3000..=3005];

pub fn is_tapback(associated_type: Option<i64>) -> bool {
    associated_type.is_some_and(|code| TAPBACK_RANGES.iter().any(|range| range.contains(&code)))
}

/// Assign a kind and display text to a row. Never fails.
///
/// Rules, first match wins:
/// 1. a tapback code makes it a reaction, whatever text it carries
/// 2. with attachments, visible text makes it text (a caption), else an attachment
/// 3. no visible text (blank or the placeholder glyph) is unknown
/// 4. anything else is text, verbatim
pub fn classify(row: &RawRow) -> (MessageKind, String) {
    let candidate = candidate_text(row);
    let visible = !candidate.trim().is_empty() && candidate != PLACEHOLDER_GLYPH;

    if is_tapback(row.associated_type) {
        (MessageKind::Reaction, REACTION_TEXT.to_string())
    } else if row.has_attachments {
        if visible {
            (MessageKind::Text, candidate)
        } else {
            (MessageKind::Attachment, ATTACHMENT_TEXT.to_string())
        }
    } else if visible {
        (MessageKind::Text, candidate)
    } else {
        (MessageKind::Unknown, UNKNOWN_TEXT.to_string())
    }
}

/// The `text` column, or the decoded `attributedBody` when `text` is blank.
fn candidate_text(row: &RawRow) -> String {
    match row.text.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ if row.attributed_body.is_some() => {
            tapback_archive::decode(row.attributed_body.as_deref())
        }
        _ => row.text.clone().unwrap_or_default(),
    }
}

/// Build the outward record for a row.
pub fn decode_row(row: &RawRow) -> DecodedMessage {
    let (kind, text) = classify(row);
    DecodedMessage {
        id: row.id,
        timestamp: to_wallclock(row.date),
        is_from_me: row.is_from_me,
        text,
        sender: if row.is_from_me { None } else { row.handle.clone() },
        kind,
    }
}
