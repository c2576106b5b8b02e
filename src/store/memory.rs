//! In-process store used by `--offline` runs and tests.

use crate::error::{Result, SurveyError};
use crate::models::{InterestEmail, ResponseBatch};
use crate::store::{BatchStore, CreateOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

const SUBSCRIBER_BUFFER: usize = 64;

/// Batches held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    batches: RwLock<Vec<ResponseBatch>>,
    interest: RwLock<Vec<InterestEmail>>,
    subscribers: Mutex<Vec<mpsc::Sender<ResponseBatch>>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail with a backend error.
    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of everything stored.
    #[cfg(test)]
    pub async fn all(&self) -> Vec<ResponseBatch> {
        self.batches.read().await.clone()
    }

    #[cfg(test)]
    pub async fn interest_emails(&self) -> Vec<InterestEmail> {
        self.interest.read().await.clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SurveyError::Backend {
                status: 503,
                body: "writes disabled".to_string(),
            });
        }
        Ok(())
    }

    /// A subscriber that has fallen behind misses this batch but stays
    /// registered; a closed one is dropped.
    async fn notify(&self, batch: &ResponseBatch) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|tx| match tx.try_send(batch.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Subscriber buffer full, dropping update for batch {}",
                    batch.batch_id
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    #[cfg(test)]
    async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn find_by_username(&self, username: &str) -> Result<ResponseBatch> {
        self.batches
            .read()
            .await
            .iter()
            .find(|b| b.username.as_deref() == Some(username))
            .cloned()
            .ok_or_else(|| SurveyError::NotFound(format!("no batch for username '{}'", username)))
    }

    async fn create_if_absent(&self, batch: &ResponseBatch) -> Result<CreateOutcome> {
        self.check_writable()?;
        {
            let mut batches = self.batches.write().await;
            if let Some(existing) = batches
                .iter()
                .find(|b| b.username.is_some() && b.username == batch.username)
            {
                return Ok(CreateOutcome::Existing(existing.clone()));
            }
            batches.push(batch.clone());
        }
        self.notify(batch).await;
        Ok(CreateOutcome::Created)
    }

    async fn insert(&self, batch: &ResponseBatch) -> Result<()> {
        self.check_writable()?;
        {
            let mut batches = self.batches.write().await;
            if batches.iter().any(|b| b.batch_id == batch.batch_id) {
                return Err(SurveyError::Backend {
                    status: 409,
                    body: format!("duplicate batch_id {}", batch.batch_id),
                });
            }
            batches.push(batch.clone());
        }
        self.notify(batch).await;
        Ok(())
    }

    async fn update(&self, batch: &ResponseBatch) -> Result<()> {
        self.check_writable()?;
        let mut batches = self.batches.write().await;
        let existing = batches
            .iter_mut()
            .find(|b| b.batch_id == batch.batch_id)
            .ok_or_else(|| SurveyError::NotFound(format!("batch {}", batch.batch_id)))?;
        *existing = batch.clone();
        Ok(())
    }

    async fn delete(&self, batch_id: Uuid) -> Result<()> {
        self.check_writable()?;
        self.batches.write().await.retain(|b| b.batch_id != batch_id);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ResponseBatch>> {
        let mut batches = self.batches.read().await.clone();
        batches.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        batches.truncate(limit);
        Ok(batches)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<ResponseBatch>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.lock().await.push(tx);
        Ok(rx)
    }

    async fn save_interest_email(&self, email: &InterestEmail) -> Result<()> {
        self.check_writable()?;
        self.interest.write().await.push(email.clone());
        Ok(())
    }
}
