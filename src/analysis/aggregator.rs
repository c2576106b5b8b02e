//! Per-offense statistics over response batches.
//!
//! Every batch contributes both its flat and hierarchical responses. Counts
//! are taken per decision tier; look-back statistics use only finite year
//! values, so `AlwaysEligible` (no look-back) and `NoLimit` are left out.

use crate::models::{Decision, ResponseBatch};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Aggregate view of one offense.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStat {
    pub count_by_tier: BTreeMap<Decision, usize>,
    pub percent_by_tier: BTreeMap<Decision, f64>,
    pub total: usize,
    pub mean_look_back: Option<f64>,
    pub median_look_back: Option<f64>,
    pub mode_look_back: Option<f64>,
}

impl AggregateStat {
    fn from_parts(counts: BTreeMap<Decision, usize>, look_backs: &[f64]) -> Self {
        let total: usize = counts.values().sum();
        let percent_by_tier = counts
            .iter()
            .map(|(decision, count)| (*decision, percentage(*count, total)))
            .collect();

        Self {
            count_by_tier: counts,
            percent_by_tier,
            total,
            mean_look_back: mean(look_backs),
            median_look_back: median(look_backs),
            mode_look_back: mode(look_backs),
        }
    }

    pub fn count(&self, decision: Decision) -> usize {
        self.count_by_tier.get(&decision).copied().unwrap_or(0)
    }

    pub fn percent(&self, decision: Decision) -> f64 {
        self.percent_by_tier.get(&decision).copied().unwrap_or(0.0)
    }
}

fn empty_counts() -> BTreeMap<Decision, usize> {
    Decision::ALL.iter().map(|d| (*d, 0)).collect()
}

/// `count / total * 100`, or 0 when there is nothing to divide by.
pub fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Middle value; the average of the two middle values for even sizes.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent value; ties go to the smallest.
pub fn mode(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let value = sorted[i];
        let run = sorted[i..].iter().take_while(|v| **v == value).count();
        if best.map_or(true, |(_, n)| run > n) {
            best = Some((value, run));
        }
        i += run;
    }
    best.map(|(value, _)| value)
}

/// Statistics for every offense in `offenses`, across all batches.
///
/// Offenses nobody answered still get an entry with zero counts.
pub fn compute_stats(
    batches: &[ResponseBatch],
    offenses: &[String],
) -> HashMap<String, AggregateStat> {
    let mut counts: HashMap<&str, BTreeMap<Decision, usize>> = offenses
        .iter()
        .map(|o| (o.as_str(), empty_counts()))
        .collect();
    let mut look_backs: HashMap<&str, Vec<f64>> = HashMap::new();

    for batch in batches {
        for (offense, decision, look_back) in batch.assessments() {
            let Some(tiers) = counts.get_mut(offense) else {
                continue;
            };
            *tiers.entry(decision).or_default() += 1;
            if let Some(years) = look_back.and_then(|lb| lb.as_years()) {
                look_backs.entry(offense).or_default().push(years);
            }
        }
    }

    counts
        .into_iter()
        .map(|(offense, tiers)| {
            let values = look_backs.get(offense).map(Vec::as_slice).unwrap_or(&[]);
            (offense.to_string(), AggregateStat::from_parts(tiers, values))
        })
        .collect()
}
