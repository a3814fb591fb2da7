//! Training-loop callbacks.

use crate::error::CheckpointError;
use crate::policy::{CheckpointRetentionPolicy, EpochLogs};
use crate::store::CheckpointStore;

/// Action a callback can request from the training loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    Continue,
    Stop,
}

/// Trait for per-epoch training callbacks.
pub trait EpochCallback {
    /// Called at the end of each epoch with the 0-based epoch index and its logs.
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &EpochLogs,
    ) -> Result<CallbackAction, CheckpointError>;
}

impl<S: CheckpointStore> EpochCallback for CheckpointRetentionPolicy<S> {
    fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &EpochLogs,
    ) -> Result<CallbackAction, CheckpointError> {
        CheckpointRetentionPolicy::on_epoch_end(self, epoch, logs)?;
        Ok(CallbackAction::Continue)
    }
}

/// Ordered set of callbacks driven together.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn EpochCallback + Send>>,
}

impl CallbackList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, callback: impl EpochCallback + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run callbacks in order, stopping at the first error or `Stop`.
    pub fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &EpochLogs,
    ) -> Result<CallbackAction, CheckpointError> {
        for callback in &mut self.callbacks {
            if callback.on_epoch_end(epoch, logs)? == CallbackAction::Stop {
                return Ok(CallbackAction::Stop);
            }
        }
        Ok(CallbackAction::Continue)
    }
}

impl std::fmt::Debug for CallbackList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackList")
            .field("len", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StopAfter {
        limit: usize,
        seen: usize,
    }

    impl EpochCallback for StopAfter {
        fn on_epoch_end(
            &mut self,
            _epoch: usize,
            _logs: &EpochLogs,
        ) -> Result<CallbackAction, CheckpointError> {
            self.seen += 1;
            if self.seen >= self.limit {
                Ok(CallbackAction::Stop)
            } else {
                Ok(CallbackAction::Continue)
            }
        }
    }

    #[test]
    fn test_callback_list_stops_on_request() {
        let mut list = CallbackList::new();
        list.push(StopAfter { limit: 2, seen: 0 });
        let logs = EpochLogs::new();
        assert_eq!(list.on_epoch_end(0, &logs).unwrap(), CallbackAction::Continue);
        assert_eq!(list.on_epoch_end(1, &logs).unwrap(), CallbackAction::Stop);
        assert_eq!(list.len(), 1);
    }
}
