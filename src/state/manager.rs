//! State manager implementation
//!
//! Holds the run's replication state behind a lock and optionally persists it
//! to a file with atomic writes.

use super::types::State;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// State manager for loading, updating and persisting state
#[derive(Debug)]
pub struct StateManager {
    /// Path to the state file, empty for in-memory mode
    path: PathBuf,
    /// Current state
    state: Arc<RwLock<State>>,
}

impl StateManager {
    /// Create an empty state manager persisting to the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: Arc::new(RwLock::new(State::new())),
        }
    }

    /// Create an in-memory state manager (no file persistence)
    pub fn in_memory() -> Self {
        Self::with_state(State::new())
    }

    /// Create an in-memory state manager holding `state`
    pub fn with_state(state: State) -> Self {
        Self {
            path: PathBuf::new(),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Create a state manager from a file, loading existing state if present
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::state(format!("Failed to read state file: {e}")))?;
            parse_state(&contents)?
        } else {
            State::new()
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create an in-memory state manager from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::with_state(parse_state(json)?))
    }

    /// Create an in-memory state manager from a JSON value
    pub fn from_value(value: JsonValue) -> Result<Self> {
        let state = serde_json::from_value(value)
            .map_err(|e| Error::state(format!("Failed to parse state JSON: {e}")))?;
        Ok(Self::with_state(state))
    }

    /// Persist to `path` from now on
    #[must_use]
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    /// Save state to a specific file path
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = self.to_json_pretty().await?;

        // Write to temp file first, then rename for atomicity
        let path = path.as_ref();
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::state(format!("Failed to write state file: {e}")))?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| Error::state(format!("Failed to rename state file: {e}")))?;

        Ok(())
    }

    /// Save current state to the configured file, if any
    pub async fn save(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        debug!("Saving state to {}", self.path.display());
        self.save_to_file(&self.path).await
    }

    /// Get a read lock on the current state
    pub async fn state(&self) -> tokio::sync::RwLockReadGuard<'_, State> {
        self.state.read().await
    }

    /// Get a write lock on the current state
    pub async fn state_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, State> {
        self.state.write().await
    }

    /// Copy of the current state
    pub async fn snapshot(&self) -> State {
        self.state.read().await.clone()
    }

    /// Current state as a JSON value
    pub async fn to_value(&self) -> Result<JsonValue> {
        let state = self.state.read().await;
        serde_json::to_value(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// Export state as pretty-printed JSON string
    pub async fn to_json_pretty(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string_pretty(&*state)
            .map_err(|e| Error::state(format!("Failed to serialize state: {e}")))
    }

    /// String bookmark for a stream and key
    pub async fn get_bookmark(&self, stream: &str, key: &str) -> Option<String> {
        let state = self.state.read().await;
        state
            .get_bookmark(stream, key)
            .and_then(JsonValue::as_str)
            .map(ToString::to_string)
    }

    /// Move a replication-key bookmark forward, see [`State::advance_bookmark`]
    pub async fn advance_bookmark(&self, stream: &str, key: &str, value: &JsonValue) -> bool {
        self.state.write().await.advance_bookmark(stream, key, value)
    }

    /// Whether an initial ACTIVATE_VERSION was emitted for the stream
    pub async fn wrote_initial_activate_version(&self, stream: &str) -> Option<bool> {
        self.state.read().await.wrote_initial_activate_version(stream)
    }

    /// Record that an ACTIVATE_VERSION was emitted for the stream
    pub async fn set_wrote_initial_activate_version(&self, stream: &str) {
        self.state
            .write()
            .await
            .set_wrote_initial_activate_version(stream);
    }

    /// Stream being synced, if any
    pub async fn currently_syncing(&self) -> Option<String> {
        self.state.read().await.currently_syncing.clone()
    }

    /// Set or clear the stream being synced
    pub async fn set_currently_syncing(&self, stream: Option<&str>) {
        self.state.write().await.set_currently_syncing(stream);
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

fn parse_state(json: &str) -> Result<State> {
    serde_json::from_str(json).map_err(|e| Error::state(format!("Failed to parse state JSON: {e}")))
}
