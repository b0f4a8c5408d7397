pub mod error;
pub mod models;
pub mod queries;
pub mod schema;
pub mod snapshot;

pub use error::{DbError, Result};
pub use models::{ChatRow, RawRow};
pub use snapshot::{Snapshot, default_snapshot_path};

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Read-only handle on a snapshot of the Messages store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        // Read-write without create: replaying a copied WAL needs to write
        // the shm file, but nothing else should ever be written.
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.pragma_update(None, "query_only", true)?;

        // Touch the schema so an unreadable file fails here, not mid-query.
        let tables: i64 = conn.query_row("SELECT count(*) FROM sqlite_master", [], |r| r.get(0))?;

        info!("Snapshot opened at {} ({} schema objects)", path.display(), tables);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DbError::LockPoisoned(e.to_string()))?;
        f(&conn)
    }
}
