//! Persisted sessions so a restart can restore the signed-in user.
//!
//! TRADE-OFFS
//! ==========
//! A corrupt session file is treated as "no session" rather than an error:
//! the worst case is one extra sign-in, while failing here would block the
//! initial probe on a file the user cannot easily fix.

#[cfg(test)]
#[path = "storage_test.rs"]
mod storage_test;

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::error::ProviderError;
use crate::types::Session;

pub trait SessionStorage: Send + Sync {
    /// Load the stored session, if any.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Storage` when the backing store cannot be read.
    fn load(&self) -> Result<Option<Session>, ProviderError>;

    /// Replace the stored session.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Storage` when the session cannot be written.
    fn save(&self, session: &Session) -> Result<(), ProviderError>;

    /// Forget the stored session. Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Storage` when the backing store cannot be removed.
    fn clear(&self) -> Result<(), ProviderError>;
}

// =============================================================================
// MEMORY
// =============================================================================

/// Process-local storage. Used when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<Session>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Session>, ProviderError> {
        let slot = self.slot.lock().map_err(|e| ProviderError::Storage(e.to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, session: &Session) -> Result<(), ProviderError> {
        let mut slot = self.slot.lock().map_err(|e| ProviderError::Storage(e.to_string()))?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), ProviderError> {
        let mut slot = self.slot.lock().map_err(|e| ProviderError::Storage(e.to_string()))?;
        *slot = None;
        Ok(())
    }
}

// =============================================================================
// FILE
// =============================================================================

/// JSON file storage. Writes go through a sibling temp file and a rename.
///
/// The file holds live refresh tokens, so on unix it is created readable by
/// its owner only.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp path unique to this write, so concurrent writers never
    /// share one.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{:08x}.tmp", std::process::id(), rand::random::<u32>()));
        self.path.with_file_name(name)
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<Session>, ProviderError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ProviderError::Storage(e.to_string())),
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
                Ok(None)
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), ProviderError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ProviderError::Storage(e.to_string()))?;
        }
        let json = serde_json::to_vec_pretty(session).map_err(|e| ProviderError::Storage(e.to_string()))?;
        let tmp = self.temp_path();
        let written = write_private(&tmp, &json).and_then(|()| fs::rename(&tmp, &self.path));
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(ProviderError::Storage(e.to_string()));
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), ProviderError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProviderError::Storage(e.to_string())),
        }
    }
}

/// Create `path` (which must not exist) with owner-only permissions.
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
