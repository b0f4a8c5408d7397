use std::collections::HashMap;

use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use crate::Database;
use crate::error::Result;
use crate::models::{ChatRow, RawRow};

/// Message columns in the order [`raw_row`] reads them.
const MESSAGE_COLUMNS: &str = "m.ROWID, m.date, m.is_from_me, m.text, m.attributedBody, \
     h.id, m.cache_has_attachments, m.associated_message_type";

/// Cap on sender handles gathered for one name-resolution pass.
const MAX_SENDER_HANDLES: u32 = 2000;

impl Database {
    // -- Chats --

    /// Each chat with its single most recent message, newest chat first.
    ///
    /// Messages sharing a date are ordered by ROWID, so a chat can never
    /// appear twice.
    pub fn latest_chat_rows(&self, limit: u32) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT c.ROWID, c.display_name, c.chat_identifier, {MESSAGE_COLUMNS}
                 FROM (
                     SELECT cmj.chat_id, cmj.message_id,
                            ROW_NUMBER() OVER (
                                PARTITION BY cmj.chat_id
                                ORDER BY m2.date DESC, m2.ROWID DESC
                            ) AS rn
                     FROM chat_message_join cmj
                     JOIN message m2 ON m2.ROWID = cmj.message_id
                 ) latest
                 JOIN chat c ON c.ROWID = latest.chat_id
                 JOIN message m ON m.ROWID = latest.message_id
                 LEFT JOIN handle h ON h.ROWID = m.handle_id
                 WHERE latest.rn = 1
                 ORDER BY m.date DESC, m.ROWID DESC
                 LIMIT ?1"
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(ChatRow {
                        chat_id: row.get(0)?,
                        display_name: row.get(1)?,
                        chat_identifier: row.get(2)?,
                        last: raw_row(row, 3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// IDs of the most recently active chats, newest first.
    pub fn chat_ids_by_activity(&self, limit: u32) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT cmj.chat_id
                 FROM chat_message_join cmj
                 JOIN message m ON m.ROWID = cmj.message_id
                 GROUP BY cmj.chat_id
                 ORDER BY MAX(m.date) DESC, cmj.chat_id DESC
                 LIMIT ?1",
            )?;

            let ids = stmt
                .query_map([limit], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;

            Ok(ids)
        })
    }

    /// Composite identifier of a chat. `None` if the chat is unknown or
    /// has no identifier.
    pub fn chat_identifier(&self, chat_id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let identifier: Option<Option<String>> = conn
                .query_row(
                    "SELECT chat_identifier FROM chat WHERE ROWID = ?1",
                    [chat_id],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(identifier.flatten().filter(|id| !id.is_empty()))
        })
    }

    /// Batch-fetch participant handles for a set of chats.
    ///
    /// Handles are deduplicated per chat and keep association order.
    /// Chats without participants are absent from the map.
    pub fn chat_participants(&self, chat_ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        if chat_ids.is_empty() {
            return Ok(HashMap::new());
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT chj.chat_id, h.id
                 FROM chat_handle_join chj
                 JOIN handle h ON h.ROWID = chj.handle_id
                 WHERE chj.chat_id IN ({})
                 ORDER BY chj.chat_id, chj.rowid",
                placeholders(chat_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let pairs = stmt
                .query_map(params_from_iter(chat_ids), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut participants: HashMap<i64, Vec<String>> = HashMap::new();
            for (chat_id, handle) in pairs {
                let Some(handle) = handle.filter(|h| !h.is_empty()) else {
                    continue;
                };
                let handles = participants.entry(chat_id).or_default();
                if !handles.contains(&handle) {
                    handles.push(handle);
                }
            }

            Ok(participants)
        })
    }

    // -- Messages --

    /// Latest messages of one chat, newest first.
    pub fn chat_messages(&self, chat_id: i64, limit: u32) -> Result<Vec<RawRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM chat_message_join cmj
                 JOIN message m ON m.ROWID = cmj.message_id
                 LEFT JOIN handle h ON h.ROWID = m.handle_id
                 WHERE cmj.chat_id = ?1
                 ORDER BY m.date DESC, m.ROWID DESC
                 LIMIT ?2"
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![chat_id, limit], |row| raw_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Latest messages across every chat, newest first.
    pub fn recent_messages(&self, limit: u32) -> Result<Vec<RawRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS}
                 FROM message m
                 LEFT JOIN handle h ON h.ROWID = m.handle_id
                 ORDER BY m.date DESC, m.ROWID DESC
                 LIMIT ?1"
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit], |row| raw_row(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Distinct handles that sent messages (not ours) into any of `chat_ids`.
    pub fn sender_handles(&self, chat_ids: &[i64]) -> Result<Vec<String>> {
        if chat_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT DISTINCT h.id
                 FROM chat_message_join cmj
                 JOIN message m ON m.ROWID = cmj.message_id
                 JOIN handle h ON h.ROWID = m.handle_id
                 WHERE cmj.chat_id IN ({})
                   AND m.is_from_me = 0
                   AND h.id IS NOT NULL
                 LIMIT {MAX_SENDER_HANDLES}",
                placeholders(chat_ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let handles = stmt
                .query_map(params_from_iter(chat_ids), |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;

            Ok(handles)
        })
    }
}

fn placeholders(count: usize) -> String {
    (1..=count).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

/// Read [`MESSAGE_COLUMNS`] starting at column `start`.
fn raw_row(row: &Row<'_>, start: usize) -> rusqlite::Result<RawRow> {
    let flag = |idx: usize| -> rusqlite::Result<bool> {
        Ok(row.get::<_, Option<i64>>(idx)?.unwrap_or(0) != 0)
    };

    Ok(RawRow {
        id: row.get(start)?,
        date: row.get(start + 1)?,
        is_from_me: flag(start + 2)?,
        text: row.get(start + 3)?,
        attributed_body: row.get(start + 4)?,
        handle: row.get(start + 5)?,
        has_attachments: flag(start + 6)?,
        associated_type: row
            .get::<_, Option<i64>>(start + 7)?
            .filter(|&code| code != 0),
    })
}
