//! Staged load generator for the decisions endpoint.
//!
//! Virtual users (VUs) each run a loop of one upsert followed by a random
//! think time. A controller follows the stage plan, publishing the target VU
//! count on a `watch` channel; VUs whose id is above the target exit.

pub mod metrics;

use crate::error::Result;
use crate::models::Decision;
use indicatif::{ProgressBar, ProgressStyle};
use metrics::{Metrics, Sample, Summary, Thresholds};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

const TICK: Duration = Duration::from_millis(100);

/// Linear ramp to `target` VUs over `duration_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub duration_seconds: u64,
    pub target: usize,
}

/// Ramp to 200 over 30s, hold for a minute, ramp down over 30s.
pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage {
            duration_seconds: 30,
            target: 200,
        },
        Stage {
            duration_seconds: 60,
            target: 200,
        },
        Stage {
            duration_seconds: 30,
            target: 0,
        },
    ]
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    pub url: String,
    pub api_key: String,
    pub matrix_id: String,
    pub stages: Vec<Stage>,
    pub thresholds: Thresholds,
    /// Stage durations are multiplied by this.
    pub scale: f64,
    pub max_vus: Option<usize>,
    pub timeout_seconds: u64,
    pub show_progress: bool,
}

impl LoadTestConfig {
    /// `{url}/rest/v1/decisions` with the upsert conflict target.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/rest/v1/decisions?on_conflict=matrix_id,collaborator_email,uccs_code",
            self.url.trim_end_matches('/')
        )
    }

    fn scaled_stages(&self) -> Vec<(Duration, usize)> {
        let scale = if self.scale > 0.0 { self.scale } else { 1.0 };
        self.stages
            .iter()
            .map(|s| {
                let target = match self.max_vus {
                    Some(max) => s.target.min(max),
                    None => s.target,
                };
                (
                    Duration::from_secs_f64(s.duration_seconds as f64 * scale),
                    target,
                )
            })
            .collect()
    }
}

/// Target VU count `elapsed` into the plan, or `None` once it is over.
///
/// Each stage ramps linearly from the previous stage's target (0 at start).
pub fn target_at(stages: &[(Duration, usize)], elapsed: Duration) -> Option<usize> {
    let mut start = Duration::ZERO;
    let mut from = 0usize;
    for (duration, target) in stages {
        let end = start + *duration;
        if elapsed < end {
            let progress = (elapsed - start).as_secs_f64() / duration.as_secs_f64();
            let vus = from as f64 + (*target as f64 - from as f64) * progress;
            return Some(vus.round() as usize);
        }
        start = end;
        from = *target;
    }
    None
}

/// Body of one decision upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionPayload {
    pub matrix_id: String,
    pub collaborator_email: String,
    pub uccs_code: u16,
    pub decision_level: String,
    pub look_back_period: u8,
}

impl DecisionPayload {
    pub fn random<R: Rng>(rng: &mut R, matrix_id: &str, vu: usize) -> Self {
        let decision = Decision::ALL[rng.gen_range(0..Decision::ALL.len())];
        Self {
            matrix_id: matrix_id.to_string(),
            collaborator_email: format!("user+{}@example.com", vu),
            uccs_code: rng.gen_range(100..200),
            decision_level: decision.color().to_string(),
            look_back_period: rng.gen_range(0..=10),
        }
    }
}

fn think_time<R: Rng>(rng: &mut R) -> Duration {
    Duration::from_secs_f64(rng.gen_range(0.1..1.6))
}

#[derive(Clone)]
struct Worker {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    matrix_id: String,
    samples: mpsc::UnboundedSender<Sample>,
}

impl Worker {
    async fn send_one(&self, vu: usize) -> Sample {
        let payload = DecisionPayload::random(&mut rand::thread_rng(), &self.matrix_id, vu);
        let started = Instant::now();
        let result = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=representation, resolution=merge-duplicates")
            .json(&payload)
            .send()
            .await;

        let success = match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("VU {} request failed: {}", vu, e);
                false
            }
        };
        Sample {
            latency: started.elapsed(),
            success,
        }
    }

    async fn run(self, vu: usize, mut target: watch::Receiver<usize>) {
        while vu <= *target.borrow() {
            let sample = self.send_one(vu).await;
            if self.samples.send(sample).is_err() {
                break;
            }
            let pause = think_time(&mut rand::thread_rng());
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = target.changed() => {}
            }
        }
        debug!("VU {} stopped", vu);
    }
}

fn progress_bar(total: Duration, show: bool) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let pb = ProgressBar::new(total.as_secs().max(1));
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}s {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    Some(pb)
}

/// Run the stage plan and return the collected summary.
pub async fn run(config: &LoadTestConfig) -> Result<Summary> {
    let stages = config.scaled_stages();
    let total: Duration = stages.iter().map(|(d, _)| *d).sum();
    info!(
        "Load test against {} for {:.0}s",
        config.endpoint(),
        total.as_secs_f64()
    );

    let (samples_tx, mut samples_rx) = mpsc::unbounded_channel();
    let worker = Worker {
        client: reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?,
        endpoint: config.endpoint(),
        api_key: config.api_key.clone(),
        matrix_id: config.matrix_id.clone(),
        samples: samples_tx,
    };

    let (target_tx, target_rx) = watch::channel(0usize);
    let pb = progress_bar(total, config.show_progress);
    let mut metrics = Metrics::new();
    let mut handles = Vec::new();
    let mut spawned = 0usize;
    let started = Instant::now();
    let mut ticker = tokio::time::interval(TICK);

    loop {
        ticker.tick().await;
        while let Ok(sample) = samples_rx.try_recv() {
            metrics.record(sample);
        }

        let elapsed = started.elapsed();
        let Some(target) = target_at(&stages, elapsed) else {
            break;
        };
        target_tx.send_replace(target);

        // VUs above the target stop on their own; ids are reused on the way up.
        spawned = spawned.min(target);
        while spawned < target {
            spawned += 1;
            handles.push(tokio::spawn(worker.clone().run(spawned, target_rx.clone())));
        }

        if let Some(ref pb) = pb {
            pb.set_position(elapsed.as_secs());
            pb.set_message(format!("{} VUs, {} requests", target, metrics.requests()));
        }
    }

    target_tx.send_replace(0);
    drop(worker);
    futures::future::join_all(handles).await;
    while let Some(sample) = samples_rx.recv().await {
        metrics.record(sample);
    }

    if let Some(pb) = pb {
        pb.finish_with_message(format!("{} requests", metrics.requests()));
    }

    let summary = metrics.summarize();
    info!(
        "Load test finished: {} requests, {} failed",
        summary.requests, summary.failures
    );
    Ok(summary)
}
