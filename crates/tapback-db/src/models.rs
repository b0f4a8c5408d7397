/// Row types as read from the store. Classification happens upstream; these
/// only normalise column quirks.

/// One `message` row with its sender handle joined in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub id: i64,
    /// Nanoseconds since 2001-01-01.
    pub date: Option<i64>,
    pub is_from_me: bool,
    pub text: Option<String>,
    pub attributed_body: Option<Vec<u8>>,
    pub handle: Option<String>,
    pub has_attachments: bool,
    /// `associated_message_type`, with the store's `0` mapped to `None`.
    pub associated_type: Option<i64>,
}

/// A chat together with its most recent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    pub chat_id: i64,
    pub display_name: Option<String>,
    pub chat_identifier: Option<String>,
    pub last: RawRow,
}
