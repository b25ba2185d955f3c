//! In-memory implementation of `StateRepository`.
//!
//! All state is lost on restart. Used by tests and by the CLI's dry runs.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reviewer_queue_core::AssignmentState;
use tokio::sync::RwLock;

use super::{RepositoryError, StateRepository, StoredState};

pub struct InMemoryRepository {
    stored: RwLock<StoredState>,
    /// When set, every `save` fails. Lets tests exercise persistence failures.
    fail_saves: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            stored: RwLock::new(StoredState::default()),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Start from `state` as if it had been saved once.
    pub fn with_state(state: AssignmentState) -> Self {
        Self {
            stored: RwLock::new(StoredState { state, version: 1 }),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateRepository for InMemoryRepository {
    async fn load(&self) -> Result<StoredState, RepositoryError> {
        Ok(self.stored.read().await.clone())
    }

    async fn save(
        &self,
        state: &AssignmentState,
        expected_version: u64,
    ) -> Result<u64, RepositoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::storage("save", "saves disabled"));
        }
        let mut stored = self.stored.write().await;
        if stored.version != expected_version {
            return Err(RepositoryError::Conflict {
                expected: expected_version,
            });
        }
        stored.state = state.clone();
        stored.version += 1;
        Ok(stored.version)
    }
}
