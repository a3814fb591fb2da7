//! Bounded pool of retained checkpoints, kept sorted worst-first.

use crate::record::CheckpointRecord;

/// Result of offering a candidate to a [`RetainedPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// The pool had room; nothing was evicted.
    Inserted,
    /// The pool was full and the worst record was displaced by the candidate.
    Replaced { evicted: CheckpointRecord },
    /// The candidate would have been the worst record; the pool is unchanged.
    Rejected(CheckpointRecord),
}

/// Fixed-capacity min-priority pool.
///
/// Records are stored in ascending order, so index 0 is always the worst
/// checkpoint and the first to be evicted.
#[derive(Debug, Clone)]
pub struct RetainedPool {
    records: Vec<CheckpointRecord>,
    capacity: usize,
}

impl RetainedPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// The record that would be evicted next.
    pub fn peek_worst(&self) -> Option<&CheckpointRecord> {
        self.records.first()
    }

    pub fn best(&self) -> Option<&CheckpointRecord> {
        self.records.last()
    }

    /// Whether [`offer`](Self::offer) would accept `candidate`.
    pub fn admits(&self, candidate: &CheckpointRecord) -> bool {
        match self.peek_worst() {
            _ if !self.is_full() => true,
            Some(worst) => worst < candidate,
            None => false,
        }
    }

    /// Insert `candidate`, replacing the worst record when the pool is full.
    ///
    /// Equivalent to a heap push-pop: the candidate only displaces the worst
    /// record if the worst is strictly smaller under the record order.
    pub fn offer(&mut self, candidate: CheckpointRecord) -> Offer {
        if !self.is_full() {
            self.insert_sorted(candidate);
            return Offer::Inserted;
        }
        if !self.admits(&candidate) {
            return Offer::Rejected(candidate);
        }
        let evicted = self.records.remove(0);
        self.insert_sorted(candidate);
        Offer::Replaced { evicted }
    }

    /// Records from best to worst.
    pub fn iter_best_first(&self) -> impl Iterator<Item = &CheckpointRecord> {
        self.records.iter().rev()
    }

    pub fn to_vec_best_first(&self) -> Vec<CheckpointRecord> {
        self.iter_best_first().cloned().collect()
    }

    fn insert_sorted(&mut self, record: CheckpointRecord) {
        let idx = self.records.partition_point(|r| r < &record);
        self.records.insert(idx, record);
    }
}
