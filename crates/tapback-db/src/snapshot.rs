use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{DbError, Result};

/// Side files that hold committed pages not yet checkpointed into the
/// main file when the store runs in WAL mode.
pub const SIDE_FILE_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// Default location of the snapshot copy.
pub fn default_snapshot_path() -> PathBuf {
    std::env::temp_dir().join("chat.db")
}

/// A private copy of the live store.
///
/// The writer process keeps the source locked and appends to its WAL, so
/// queries never run against it directly. The copy is read-only by
/// convention and is overwritten on every [`Snapshot::refresh`].
#[derive(Debug)]
pub struct Snapshot {
    source: PathBuf,
    path: PathBuf,
}

impl Snapshot {
    /// Copy `source` (and its side files, if any) to `path`.
    pub fn acquire(source: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Result<Self> {
        let snapshot = Self {
            source: source.into(),
            path: path.into(),
        };
        snapshot.refresh()?;
        Ok(snapshot)
    }

    /// Re-copy the source over the existing snapshot.
    ///
    /// Callers must close any connection on the snapshot first.
    pub fn refresh(&self) -> Result<()> {
        let failed = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| DbError::Snapshot { path, source }
        };

        if same_file(&self.source, &self.path) {
            return Err(failed(&self.path)(io::Error::new(
                io::ErrorKind::InvalidInput,
                "snapshot path is the source database",
            )));
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(failed(parent))?;
        }

        // Checked apart from the copy so copy errors name the destination.
        fs::metadata(&self.source).map_err(failed(&self.source))?;
        let bytes = copy_preserving_mtime(&self.source, &self.path).map_err(failed(&self.path))?;
        let mut copied = vec![self.path.display().to_string()];

        for suffix in SIDE_FILE_SUFFIXES {
            let src = with_suffix(&self.source, suffix);
            let dst = with_suffix(&self.path, suffix);

            if src.exists() {
                copy_preserving_mtime(&src, &dst).map_err(failed(&dst))?;
                copied.push(dst.display().to_string());
            } else if dst.exists() {
                // A log left over from an earlier copy must not be replayed
                // against the new main file.
                fs::remove_file(&dst).map_err(failed(&dst))?;
                debug!("Removed stale side file {}", dst.display());
            }
        }

        info!(
            "Snapshot of {} taken ({} bytes): {}",
            self.source.display(),
            bytes,
            copied.join(", ")
        );
        Ok(())
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `path` with `suffix` appended to the file name (`chat.db` → `chat.db-wal`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn copy_preserving_mtime(src: &Path, dst: &Path) -> io::Result<u64> {
    let bytes = fs::copy(src, dst)?;
    if let Err(e) = copy_mtime(src, dst) {
        debug!("Could not carry modification time to {}: {}", dst.display(), e);
    }
    Ok(bytes)
}

fn copy_mtime(src: &Path, dst: &Path) -> io::Result<()> {
    let modified = fs::metadata(src)?.modified()?;
    fs::File::options().write(true).open(dst)?.set_modified(modified)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
