//! Storage layer for response batches.
//!
//! The backend is a black-box table store. [`BatchStore`] names the
//! operations the survey needs; [`RestStore`] talks to a PostgREST endpoint
//! and [`MemoryStore`] keeps everything in process for offline runs and tests.

pub mod memory;
pub mod rest;

use crate::error::Result;
use crate::models::{InterestEmail, ResponseBatch};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub use memory::MemoryStore;
pub use rest::{RestConfig, RestStore};

/// Result of an atomic create keyed by username.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// The batch was inserted.
    Created,
    /// A batch with the same username already existed; nothing was written.
    Existing(ResponseBatch),
}

/// Storage backend for `decisions_batch` and `interest_emails`.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Look up the batch owned by a username. `NotFound` when absent.
    async fn find_by_username(&self, username: &str) -> Result<ResponseBatch>;

    /// Insert the batch unless one with the same username exists.
    async fn create_if_absent(&self, batch: &ResponseBatch) -> Result<CreateOutcome>;

    /// Insert a new batch.
    async fn insert(&self, batch: &ResponseBatch) -> Result<()>;

    /// Replace the stored batch with the same id.
    async fn update(&self, batch: &ResponseBatch) -> Result<()>;

    /// Delete a batch by id.
    async fn delete(&self, batch_id: Uuid) -> Result<()>;

    /// Most recent batches, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ResponseBatch>>;

    /// Channel of batches written after the call.
    async fn subscribe(&self) -> Result<mpsc::Receiver<ResponseBatch>>;

    /// Store a mailing-list signup.
    async fn save_interest_email(&self, email: &InterestEmail) -> Result<()>;
}

/// Best-effort save of in-progress work.
///
/// Failures are logged and swallowed; the wizard keeps going either way.
pub async fn autosave(store: &dyn BatchStore, batch: &ResponseBatch) -> bool {
    match store.update(batch).await {
        Ok(()) => {
            debug!("Autosaved batch {}", batch.batch_id);
            true
        }
        Err(e) => {
            warn!("Autosave of batch {} failed: {}", batch.batch_id, e);
            false
        }
    }
}
