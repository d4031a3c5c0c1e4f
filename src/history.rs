use std::collections::{HashMap, VecDeque};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::HistoryError;

/// Default number of samples kept per target.
pub const NUM_POINTS: usize = 100;

/// One latency measurement for a target.
///
/// Serialized as the plain millisecond count, or `null` for a failed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Sample {
    /// Round-trip time in whole milliseconds (truncated).
    Latency(u64),
    /// The probe did not receive a response status within its budget.
    Failed,
}

impl Sample {
    pub fn millis(&self) -> Option<u64> {
        match self {
            Sample::Latency(ms) => Some(*ms),
            Sample::Failed => None,
        }
    }
}

/// Bounded, per-target latency history.
///
/// The set of targets is fixed at construction. Every target owns its own
/// lock so appends for different targets never contend, and an append plus
/// its eviction happen under a single lock acquisition.
#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    series: HashMap<String, Mutex<VecDeque<Sample>>>,
}

impl HistoryStore {
    pub fn new<I, S>(targets: I, capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let series = targets
            .into_iter()
            .map(|target| (target.into(), Mutex::new(VecDeque::with_capacity(capacity))))
            .collect();

        HistoryStore { capacity, series }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends `sample` to the end of `target`'s history, evicting the oldest
    /// samples once the capacity is exceeded. Returns the resulting length.
    pub async fn append(&self, target: &str, sample: Sample) -> Result<usize, HistoryError> {
        let series = self
            .series
            .get(target)
            .ok_or_else(|| HistoryError::UnknownTarget(target.to_string()))?;

        let mut samples = series.lock().await;
        samples.push_back(sample);
        while samples.len() > self.capacity {
            samples.pop_front();
        }

        Ok(samples.len())
    }

    /// Copies every target's history into an owned snapshot.
    pub async fn snapshot(&self) -> HistorySnapshot {
        let mut series = HashMap::with_capacity(self.series.len());
        for (target, samples) in &self.series {
            let samples = samples.lock().await;
            series.insert(target.clone(), samples.iter().copied().collect());
        }

        HistorySnapshot { capacity: self.capacity, series }
    }
}

/// Point-in-time copy of the history store, oldest sample first per target.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySnapshot {
    pub capacity: usize,
    pub series: HashMap<String, Vec<Sample>>,
}

impl HistorySnapshot {
    /// Samples for `target`, or an empty slice for an unknown target.
    pub fn samples(&self, target: &str) -> &[Sample] {
        self.series.get(target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Largest successful latency across all targets.
    pub fn max_latency(&self) -> Option<u64> {
        self.series
            .values()
            .flatten()
            .filter_map(Sample::millis)
            .max()
    }
}
