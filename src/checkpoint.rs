use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::key::RecordKey;

/// Resume anchor: nothing processed yet, or the last key attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Start,
    At(RecordKey),
}

/// Single-line file holding the last processed key, e.g. `PA/00123/20`.
pub struct Checkpoint {
    path: PathBuf,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Checkpoint { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing, empty or garbled file means `Start`. The
    /// trailing newline is optional.
    pub fn load(&self) -> CheckpointState {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No checkpoint at {:?}. Starting fresh.", self.path);
                return CheckpointState::Start;
            }
            Err(e) => {
                warn!("Failed to read checkpoint {:?}: {}. Starting from the beginning.", self.path, e);
                return CheckpointState::Start;
            }
        };

        let line = content.trim();
        let parsed = if line.contains('\n') {
            None
        } else {
            line.parse::<RecordKey>().ok()
        };

        match parsed {
            Some(key) => {
                info!(%key, "Resuming from checkpoint");
                CheckpointState::At(key)
            }
            None => {
                warn!(
                    "Checkpoint {:?} is corrupt ({:?}). Starting from the beginning.",
                    self.path, content
                );
                CheckpointState::Start
            }
        }
    }

    /// Replace the slot. Written to a sibling temp file and renamed so a
    /// crash leaves either the old or the new key, never a mix.
    pub fn save(&self, key: &RecordKey) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let write = || -> io::Result<()> {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
            let mut f = File::create(&tmp)?;
            writeln!(f, "{}", key)?;
            f.sync_all()?;
            replace_file(&tmp, &self.path)
        };
        write().map_err(|e| Error::checkpoint(&self.path, e))
    }
}

/// Rename `tmp` over `path`, then sync the directory so the rename itself
/// survives a crash.
pub(crate) fn replace_file(tmp: &Path, path: &Path) -> io::Result<()> {
    fs::rename(tmp, path)?;
    sync_parent(path)
}

#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}
