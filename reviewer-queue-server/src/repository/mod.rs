//! Repository abstraction for queue state persistence.
//!
//! The queue persists exactly one value, the [`AssignmentState`]. This trait
//! is the thin load/store port around the pure core; implementations provide
//! the backend (in-memory for tests, SQLite for deployments).
//!
//! Writes are optimistic. Every load returns the stored version and a save
//! only lands if the version is unchanged, so two processes sharing one
//! database cannot overwrite each other's assignments.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use reviewer_queue_core::AssignmentState;
use thiserror::Error;

/// Key the queue state is stored under.
pub const STATE_KEY: &str = "reviewer-round-robin";

/// Errors from a state repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// The backend failed to perform `operation`.
    #[error("storage error during {operation}: {message}")]
    Storage {
        operation: &'static str,
        message: String,
    },

    /// Stored data could not be decoded.
    #[error("corrupt {what} in storage")]
    Corruption { what: &'static str },

    /// Someone else saved since this state was loaded.
    #[error("state was modified concurrently (expected version {expected})")]
    Conflict { expected: u64 },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: &'static str) -> Self {
        Self::Corruption { what }
    }
}

/// A loaded state together with the version it was stored under.
///
/// Version 0 means nothing has been saved yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredState {
    pub state: AssignmentState,
    pub version: u64,
}

/// Load/store port for the queue state.
///
/// A repository that has never been written to loads as the empty state at
/// version 0.
#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn load(&self) -> Result<StoredState, RepositoryError>;

    /// Replace the stored state if it is still at `expected_version`.
    ///
    /// Returns the new version, or [`RepositoryError::Conflict`] if another
    /// writer got there first.
    async fn save(
        &self,
        state: &AssignmentState,
        expected_version: u64,
    ) -> Result<u64, RepositoryError>;
}
