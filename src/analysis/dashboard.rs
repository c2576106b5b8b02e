//! Admin dashboard state: recent batches plus their statistics.

use super::{compute_stats, AggregateStat};
use crate::models::ResponseBatch;
use std::collections::HashMap;
use tracing::debug;

/// Most batches the dashboard keeps.
pub const RECENT_LIMIT: usize = 200;

/// Recent batches, newest first, with statistics kept in sync.
#[derive(Debug, Clone)]
pub struct Dashboard {
    offenses: Vec<String>,
    limit: usize,
    batches: Vec<ResponseBatch>,
    stats: HashMap<String, AggregateStat>,
}

impl Dashboard {
    pub fn new(offenses: Vec<String>) -> Self {
        Self::with_limit(offenses, RECENT_LIMIT)
    }

    pub fn with_limit(offenses: Vec<String>, limit: usize) -> Self {
        let stats = compute_stats(&[], &offenses);
        Self {
            offenses,
            limit: limit.clamp(1, RECENT_LIMIT),
            batches: Vec::new(),
            stats,
        }
    }

    /// Replace the held batches with a freshly loaded set.
    pub fn load(&mut self, mut batches: Vec<ResponseBatch>) {
        batches.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        batches.truncate(self.limit);
        self.batches = batches;
        self.recompute();
    }

    /// Add a live insert at the front. A batch already held is replaced.
    pub fn on_insert(&mut self, batch: ResponseBatch) {
        self.batches.retain(|b| b.batch_id != batch.batch_id);
        self.batches.insert(0, batch);
        self.batches.truncate(self.limit);
        self.recompute();
    }

    fn recompute(&mut self) {
        self.stats = compute_stats(&self.batches, &self.offenses);
        debug!("Recomputed stats over {} batches", self.batches.len());
    }

    pub fn batches(&self) -> &[ResponseBatch] {
        &self.batches
    }

    pub fn offenses(&self) -> &[String] {
        &self.offenses
    }

    pub fn stats(&self) -> &HashMap<String, AggregateStat> {
        &self.stats
    }
}
