//! Bearer credential handling.
//!
//! The credential is issued elsewhere (login flow) and handed to the session
//! through a [`CredentialStore`]. The session reads the store at every
//! connection attempt, so a token refreshed between reconnects is picked up,
//! and asks for it to be discarded on logout.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use thiserror::Error;
use zeroize::Zeroize;

/// Bearer token presented to the broker and the HTTP collaborators.
///
/// Never printed: `Debug` is redacted and the token is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token, for placing in an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Credential store errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Backing file could not be read or removed.
    #[error("credential file {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Holds the bearer credential between login and logout.
pub trait CredentialStore: fmt::Debug + Send + Sync {
    /// Current credential, if one is stored.
    fn load(&self) -> Option<Credential>;

    /// Discard the stored credential. Idempotent.
    fn clear(&self) -> Result<(), CredentialError>;
}

/// In-memory store, used by simulation and tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    /// Store holding `credential`.
    pub fn new(credential: Credential) -> Self {
        Self { slot: Mutex::new(Some(credential)) }
    }

    /// Replace the stored credential.
    pub fn store(&self, credential: Credential) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential);
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<Credential> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn clear(&self) -> Result<(), CredentialError> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

/// Store backed by a file containing only the token.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credential> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        if token.is_empty() { None } else { Some(Credential::new(token)) }
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CredentialError::Io { path: self.path.clone(), source }),
        }
    }
}
