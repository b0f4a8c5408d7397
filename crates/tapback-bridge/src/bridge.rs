use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tapback_db::{ChatRow, Database, DbError, Snapshot, default_snapshot_path};
use tapback_types::models::{collapse_whitespace, initials};
use tapback_types::{ChatSummary, DecodedMessage, MessageKind};
use tracing::{debug, info};

use crate::classify::{classify, decode_row};
use crate::contacts::NameResolver;
use crate::error::{BridgeError, Result};
use crate::send::{Route, ScriptRunner, chat_script, recipient_script, route};

const NO_MESSAGE: &str = "No message";
const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Live Messages store. Only ever read.
    pub source: PathBuf,
    /// Where the private copy is kept. Two bridges must not share one.
    pub snapshot: PathBuf,
}

impl BridgeConfig {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            snapshot: default_snapshot_path(),
        }
    }
}

/// The last messages of one chat, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub chat_id: i64,
    pub messages: Vec<DecodedMessage>,
}

/// Reads chats and messages from a snapshot of the Messages store and
/// sends through the Messages app.
///
/// Every read works against the snapshot taken by [`Bridge::open`] or the
/// latest [`Bridge::refresh`]. Callers poll by refreshing and re-reading.
pub struct Bridge<R, S> {
    snapshot: Snapshot,
    db: Option<Database>,
    resolver: R,
    runner: S,
}

impl<R: NameResolver, S: ScriptRunner> Bridge<R, S> {
    pub fn open(config: &BridgeConfig, resolver: R, runner: S) -> Result<Self> {
        let snapshot = Snapshot::acquire(&config.source, &config.snapshot)?;
        let db = Database::open(snapshot.path())?;

        Ok(Self {
            snapshot,
            db: Some(db),
            resolver,
            runner,
        })
    }

    /// Take a fresh snapshot and reopen it.
    pub fn refresh(&mut self) -> Result<()> {
        // The old connection must be gone before its files are overwritten.
        self.db = None;
        self.snapshot.refresh()?;
        self.db = Some(Database::open(self.snapshot.path())?);
        debug!("Reopened snapshot of {}", self.snapshot.source().display());
        Ok(())
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    fn db(&self) -> Result<&Database> {
        self.db.as_ref().ok_or(BridgeError::Io(DbError::Closed))
    }

    // -- Reads --

    /// The `limit` most recently active chats, newest first, one entry per chat.
    pub fn recent_chats(&mut self, limit: u32) -> Result<Vec<ChatSummary>> {
        let rows = self.db()?.latest_chat_rows(limit)?;
        let chat_ids: Vec<i64> = rows.iter().map(|row| row.chat_id).collect();
        let mut participants = self.db()?.chat_participants(&chat_ids)?;

        let mut handles: HashSet<String> =
            rows.iter().filter_map(|row| row.last.handle.clone()).collect();
        handles.extend(participants.values().flatten().cloned());
        self.resolver.build_index_for_handles(&handles);

        let summaries: Vec<ChatSummary> = rows
            .into_iter()
            .map(|row| {
                let handles = participants.remove(&row.chat_id).unwrap_or_default();
                self.summarize(row, handles)
            })
            .collect();

        debug!("Built {} chat summaries from {} handles", summaries.len(), handles.len());
        Ok(summaries)
    }

    fn summarize(&self, row: ChatRow, participants: Vec<String>) -> ChatSummary {
        let resolve = |handle: &str| self.resolver.get_contact_name(handle);

        let name = non_empty(row.display_name.as_deref())
            .map(str::to_string)
            .or_else(|| row.last.handle.as_deref().and_then(resolve))
            .or_else(|| non_empty(row.last.handle.as_deref()).map(str::to_string))
            .or_else(|| non_empty(row.chat_identifier.as_deref()).map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());

        let (kind, text) = classify(&row.last);
        let preview = match kind {
            MessageKind::Unknown => String::new(),
            _ => collapse_whitespace(&text),
        };

        let mut participant_names: Vec<String> = Vec::with_capacity(participants.len());
        for handle in &participants {
            let label = resolve(handle).unwrap_or_else(|| handle.clone());
            if !participant_names.contains(&label) {
                participant_names.push(label);
            }
        }

        ChatSummary {
            id: row.chat_id,
            chat_identifier: row.chat_identifier.filter(|id| !id.is_empty()),
            initials: initials(&name),
            name,
            preview: if preview.is_empty() { NO_MESSAGE.to_string() } else { preview },
            timestamp: tapback_types::time::to_wallclock(row.last.date),
            is_from_me: row.last.is_from_me,
            participants,
            participant_names,
        }
    }

    /// The last `limit` messages of a chat, oldest first.
    pub fn messages_in_chat(&mut self, chat_id: i64, limit: u32) -> Result<Vec<DecodedMessage>> {
        let rows = self.db()?.chat_messages(chat_id, limit)?;
        let mut messages: Vec<DecodedMessage> = rows.iter().map(decode_row).collect();
        messages.reverse();

        self.index_senders(&messages);
        Ok(messages)
    }

    /// The newest `limit` messages across all chats, oldest first.
    pub fn recent_messages(&mut self, limit: u32) -> Result<Vec<DecodedMessage>> {
        let rows = self.db()?.recent_messages(limit)?;
        let mut messages: Vec<DecodedMessage> = rows.iter().map(decode_row).collect();
        messages.reverse();

        self.index_senders(&messages);
        Ok(messages)
    }

    /// The `chats` most recently active chats, newest chat first, each with
    /// its last `per_chat` messages.
    pub fn latest_conversations(&mut self, chats: u32, per_chat: u32) -> Result<Vec<Conversation>> {
        let chat_ids = self.db()?.chat_ids_by_activity(chats)?;

        let mut conversations = Vec::with_capacity(chat_ids.len());
        for &chat_id in &chat_ids {
            let rows = self.db()?.chat_messages(chat_id, per_chat)?;
            let mut messages: Vec<DecodedMessage> = rows.iter().map(decode_row).collect();
            messages.reverse();
            conversations.push(Conversation { chat_id, messages });
        }

        let senders: HashSet<String> = self.db()?.sender_handles(&chat_ids)?.into_iter().collect();
        self.resolver.build_index_for_handles(&senders);

        info!(
            "Loaded {} conversations ({} messages)",
            conversations.len(),
            conversations.iter().map(|c| c.messages.len()).sum::<usize>()
        );
        Ok(conversations)
    }

    fn index_senders(&mut self, messages: &[DecodedMessage]) {
        let senders: HashSet<String> = messages.iter().filter_map(|m| m.sender.clone()).collect();
        self.resolver.build_index_for_handles(&senders);
    }

    /// Who a message is from, for display and datasets.
    pub fn sender_label(&self, message: &DecodedMessage) -> String {
        if message.is_from_me {
            return "me".to_string();
        }
        match message.sender.as_deref() {
            Some(handle) => self
                .resolver
                .get_contact_name(handle)
                .unwrap_or_else(|| handle.to_string()),
            None => "unknown".to_string(),
        }
    }

    // -- Sends --

    pub fn send_to_recipient(&self, handle: &str, text: &str) -> Result<()> {
        info!("Sending {} chars to {}", text.chars().count(), handle);
        self.runner.run(&recipient_script(handle, text))
    }

    pub fn send_to_chat_identifier(&self, chat_identifier: &str, text: &str) -> Result<()> {
        info!("Sending {} chars to chat {}", text.chars().count(), chat_identifier);
        self.runner.run(&chat_script(chat_identifier, text))
    }

    /// Send into a chat from the list, routed by its participant count.
    pub fn send(&self, chat: &ChatSummary, text: &str) -> Result<()> {
        self.dispatch(route(&chat.participants, chat.chat_identifier.as_deref())?, text)
    }

    /// Send into a chat known only by ID, looking up its participants.
    pub fn send_to_chat(&self, chat_id: i64, text: &str) -> Result<()> {
        let participants = self
            .db()?
            .chat_participants(&[chat_id])?
            .remove(&chat_id)
            .unwrap_or_default();
        let chat_identifier = self.db()?.chat_identifier(chat_id)?;

        self.dispatch(route(&participants, chat_identifier.as_deref())?, text)
    }

    fn dispatch(&self, route: Route<'_>, text: &str) -> Result<()> {
        match route {
            Route::Direct(handle) => self.send_to_recipient(handle, text),
            Route::Chat(id) => self.send_to_chat_identifier(id, text),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

