//! Checkpoint records and their ranking order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// A retained (or candidate) checkpoint.
///
/// `score` is the monitored value multiplied by the direction coefficient, so a
/// higher score is always better. Records order by score, then epoch, then
/// path; the smallest record is the worst checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointRecord {
    score: f64,
    epoch: usize,
    path: PathBuf,
}

impl CheckpointRecord {
    pub fn new(score: f64, epoch: usize, path: impl Into<PathBuf>) -> Self {
        // -0.0 and 0.0 are the same score; only the epoch may separate them.
        let score = if score == 0.0 { 0.0 } else { score };
        Self {
            score,
            epoch,
            path: path.into(),
        }
    }

    /// Oriented score (higher is better).
    pub fn score(&self) -> f64 {
        self.score
    }

    /// 1-based epoch the checkpoint was produced at.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The monitored value as reported by the training loop.
    pub fn raw_value(&self, coefficient: f64) -> f64 {
        self.score * coefficient
    }
}

impl PartialEq for CheckpointRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CheckpointRecord {}

impl PartialOrd for CheckpointRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CheckpointRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.epoch.cmp(&other.epoch))
            .then_with(|| self.path.cmp(&other.path))
    }
}
