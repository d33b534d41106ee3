//! Persistence contracts shared by the workflows plus in-memory adapters.

pub mod memory;

use std::sync::{Mutex, MutexGuard};

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Serializes the load, mutate and store sequences of a service.
#[derive(Debug, Default)]
pub struct WriteGate {
    gate: Mutex<()>,
}

impl WriteGate {
    pub fn enter(&self) -> Result<MutexGuard<'_, ()>, RepositoryError> {
        self.gate
            .lock()
            .map_err(|_| RepositoryError::Unavailable("write gate poisoned".to_string()))
    }
}
