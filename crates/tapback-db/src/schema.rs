use rusqlite::Connection;

use crate::error::Result;

/// The subset of the Messages store schema that the queries read.
///
/// Column names and types match the real store so fixtures built with it
/// exercise the same SQL. Only used to build fixture databases.
pub const FIXTURE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS handle (
        ROWID    INTEGER PRIMARY KEY AUTOINCREMENT UNIQUE,
        id       TEXT NOT NULL,
        service  TEXT NOT NULL DEFAULT 'iMessage'
    );

    CREATE TABLE IF NOT EXISTS chat (
        ROWID            INTEGER PRIMARY KEY AUTOINCREMENT,
        guid             TEXT,
        chat_identifier  TEXT,
        display_name     TEXT
    );

    CREATE TABLE IF NOT EXISTS message (
        ROWID                    INTEGER PRIMARY KEY AUTOINCREMENT,
        guid                     TEXT,
        text                     TEXT,
        attributedBody           BLOB,
        handle_id                INTEGER DEFAULT 0,
        date                     INTEGER,
        is_from_me               INTEGER DEFAULT 0,
        cache_has_attachments    INTEGER DEFAULT 0,
        associated_message_type  INTEGER DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS chat_message_join (
        chat_id       INTEGER REFERENCES chat (ROWID) ON DELETE CASCADE,
        message_id    INTEGER REFERENCES message (ROWID) ON DELETE CASCADE,
        message_date  INTEGER DEFAULT 0,
        PRIMARY KEY (chat_id, message_id)
    );

    CREATE TABLE IF NOT EXISTS chat_handle_join (
        chat_id    INTEGER REFERENCES chat (ROWID) ON DELETE CASCADE,
        handle_id  INTEGER REFERENCES handle (ROWID) ON DELETE CASCADE,
        UNIQUE (chat_id, handle_id)
    );
";

pub fn create_fixture_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(FIXTURE_SCHEMA)?;
    Ok(())
}
