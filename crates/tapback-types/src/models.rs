use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::time_label;

/// Semantic kind of a message row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Attachment,
    /// Tapback on another message.
    Reaction,
    /// Nothing displayable could be recovered.
    Unknown,
}

/// One message as handed to the presentation layer and dataset builders.
///
/// `text` is never empty for non-text kinds: it holds a fixed placeholder
/// instead of the raw content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedMessage {
    pub id: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_from_me: bool,
    pub text: String,
    /// Sender handle (phone number or email). `None` for our own messages
    /// and for incoming rows that carry no handle, so authorship is read
    /// from `is_from_me`, never from this field.
    pub sender: Option<String>,
    pub kind: MessageKind,
}

/// A row of the chat list, rebuilt from scratch on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: i64,
    /// Composite identifier used to address the chat as a whole.
    pub chat_identifier: Option<String>,
    pub name: String,
    pub preview: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_from_me: bool,
    /// Participant handles, deduplicated, in association order.
    pub participants: Vec<String>,
    /// Resolved participant names, deduplicated by name.
    pub participant_names: Vec<String>,
    pub initials: String,
}

impl ChatSummary {
    /// Local-time label of the latest message, empty when the row had no date.
    pub fn time_label(&self) -> String {
        self.timestamp.map(time_label).unwrap_or_default()
    }
}

/// Uppercased first letters of the first two words of `name`, or `?`.
pub fn initials(name: &str) -> String {
    let letters: String = name
        .split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect();

    if letters.is_empty() {
        "?".to_string()
    } else {
        letters
    }
}

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
