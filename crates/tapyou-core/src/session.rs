// Authenticated session context and its on-disk persistence.
//
// The session is an explicit value: it is created at login (or restored at
// startup), passed by reference to every authenticated backend call, and
// destroyed at logout. Nothing looks it up ambiently.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::api::models::LoginResponse;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no data directory available for session storage")]
    NoDataDir,
}

/// A logged-in user with a bearer token and a fixed expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Build a session from a successful login, expiring `ttl` from `now`.
    pub fn from_login(login: &LoginResponse, ttl: Duration, now: DateTime<Utc>) -> Self {
        Session {
            username: login.username.clone(),
            user_id: login.user_id.clone(),
            token: login.access_token.clone(),
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// File-backed session storage.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    /// Store under the platform data directory (e.g. `~/.local/share/tapyou`).
    pub fn in_data_dir() -> Result<Self, SessionError> {
        let dirs = directories::ProjectDirs::from("", "", "tapyou").ok_or(SessionError::NoDataDir)?;
        Ok(SessionStore::new(dirs.data_dir().join("session.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restore a persisted session.
    ///
    /// Returns `None` when nothing is stored, when the stored session has
    /// expired, or when the file cannot be parsed. Expired and unreadable
    /// files are removed.
    pub fn load(&self, now: DateTime<Utc>) -> Option<Session> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read session file {}: {}", self.path.display(), e);
                return None;
            }
        };

        let session: Session = match serde_json::from_str(&text) {
            Ok(s) => s,
            Err(e) => {
                warn!("Discarding unreadable session file: {}", e);
                let _ = self.clear();
                return None;
            }
        };

        if session.is_expired(now) {
            info!("Stored session for {} has expired", session.username);
            let _ = self.clear();
            return None;
        }

        Some(session)
    }

    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SessionError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, json).map_err(|source| SessionError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Remove the stored session. Missing files are not an error.
    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
