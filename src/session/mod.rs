//! Saved console sessions, keyed by environment
//!
//! A session captured after a successful login lets later runs skip the
//! identity provider until the console expires it.

use crate::core::config::DEFAULT_ENV;
use crate::surface::PersistedState;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Error types for session storage
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Trait for session storage backends
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the saved session for an environment, if any
    async fn load(&self, env: &str) -> Result<Option<PersistedState>, SessionError>;

    /// Replace the saved session for an environment
    async fn save(&self, env: &str, state: &PersistedState) -> Result<(), SessionError>;
}

/// Sessions stored as JSON files in one directory
///
/// The default environment uses `auth.json`; any other uses `auth.<env>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store sessions in the working directory
    pub fn in_current_dir() -> Self {
        Self::new(".")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the session for `env`
    pub fn path_for(&self, env: &str) -> PathBuf {
        if env.is_empty() || env == DEFAULT_ENV {
            self.dir.join("auth.json")
        } else {
            self.dir.join(format!("auth.{}.json", env))
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, env: &str) -> Result<Option<PersistedState>, SessionError> {
        let path = self.path_for(env);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No saved session at {}", path.display());
                return Ok(None);
            }
            Err(source) => return Err(SessionError::Io { path, source }),
        };

        let state = serde_json::from_str(&content)
            .map_err(|source| SessionError::Corrupt { path: path.clone(), source })?;
        debug!("Loaded saved session from {}", path.display());
        Ok(Some(PersistedState(state)))
    }

    async fn save(&self, env: &str, state: &PersistedState) -> Result<(), SessionError> {
        let path = self.path_for(env);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SessionError::Io { path: self.dir.clone(), source })?;

        let content = serde_json::to_string_pretty(&state.0)
            .map_err(|source| SessionError::Corrupt { path: path.clone(), source })?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| SessionError::Io { path: path.clone(), source })?;

        debug!("Saved session to {}", path.display());
        Ok(())
    }
}

/// In-memory session store (for testing or ephemeral use)
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: tokio::sync::RwLock<HashMap<String, PersistedState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of environments with a saved session
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, env: &str) -> Result<Option<PersistedState>, SessionError> {
        Ok(self.sessions.read().await.get(env).cloned())
    }

    async fn save(&self, env: &str, state: &PersistedState) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .insert(env.to_string(), state.clone());
        Ok(())
    }
}
