use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tapback_bridge::contacts::DEFAULT_AUTHORIZATION_TIMEOUT;

/// Runtime settings, read from the environment after `.env` is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `TAPBACK_SOURCE_DB`, the live Messages store.
    pub source_db: PathBuf,
    /// `TAPBACK_SNAPSHOT_PATH`, where the private copy goes.
    pub snapshot_path: PathBuf,
    /// `TAPBACK_CONTACTS`, optional JSON contact list.
    pub contacts: Option<PathBuf>,
    /// `TAPBACK_CONTACTS_TIMEOUT_SECS`
    pub contacts_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let source_db = match var("TAPBACK_SOURCE_DB") {
            Some(path) => PathBuf::from(path),
            None => default_source_db()?,
        };
        let snapshot_path = var("TAPBACK_SNAPSHOT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(tapback_db::default_snapshot_path);
        let contacts = var("TAPBACK_CONTACTS").map(PathBuf::from);
        let contacts_timeout = match var("TAPBACK_CONTACTS_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(secs.trim().parse().with_context(|| {
                format!("TAPBACK_CONTACTS_TIMEOUT_SECS is not a number: {}", secs)
            })?),
            None => DEFAULT_AUTHORIZATION_TIMEOUT,
        };

        Ok(Self {
            source_db,
            snapshot_path,
            contacts,
            contacts_timeout,
        })
    }
}

/// `~/Library/Messages/chat.db`
fn default_source_db() -> Result<PathBuf> {
    let home = dirs::home_dir().context("cannot determine home directory, set TAPBACK_SOURCE_DB")?;
    Ok(home.join("Library").join("Messages").join("chat.db"))
}
