//! Top-N checkpoint retention.
//!
//! [`CheckpointRetentionPolicy`] is notified once per completed epoch. It keeps
//! the `capacity` best checkpoints by the monitored metric, writes a new one
//! when it beats the worst retained checkpoint, and deletes the file of the
//! checkpoint it displaces.

use crate::config::RetentionConfig;
use crate::error::CheckpointError;
use crate::pool::{Offer, RetainedPool};
use crate::record::CheckpointRecord;
use crate::store::CheckpointStore;
use crate::template::PathTemplate;
use std::collections::HashMap;
use std::path::PathBuf;

/// Metric values reported for one epoch, keyed by metric name.
pub type EpochLogs = HashMap<String, f64>;

type PathFn = Box<dyn Fn(usize, &EpochLogs) -> Result<PathBuf, CheckpointError> + Send>;

/// What a single [`on_epoch_end`](CheckpointRetentionPolicy::on_epoch_end) call did.
#[derive(Debug, Clone, PartialEq)]
pub enum EpochOutcome {
    /// The save interval has not elapsed yet.
    NotDue,
    /// The monitored metric was absent (or NaN); nothing was evaluated.
    MissingMetric,
    /// The pool had room and the checkpoint was written.
    Admitted(CheckpointRecord),
    /// The checkpoint was written and the worst retained one deleted.
    Replaced {
        admitted: CheckpointRecord,
        evicted: CheckpointRecord,
    },
    /// The checkpoint would have been the worst retained one; nothing was written.
    Discarded(CheckpointRecord),
}

macro_rules! status {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

/// Keeps the N best checkpoints seen during training.
pub struct CheckpointRetentionPolicy<S> {
    config: RetentionConfig,
    coefficient: f64,
    pool: RetainedPool,
    epochs_since_last_save: usize,
    resolve_path: PathFn,
    store: S,
}

impl<S: CheckpointStore> CheckpointRetentionPolicy<S> {
    /// Build a policy writing to paths rendered from `config.filepath`.
    pub fn new(config: RetentionConfig, store: S) -> Result<Self, CheckpointError> {
        config.validate()?;
        let template = PathTemplate::new(&config.filepath)?;
        let coefficient = config.coefficient();
        tracing::debug!(
            monitor = %config.monitor,
            mode = %config.mode,
            coefficient,
            capacity = config.capacity,
            template = template.as_str(),
            "Checkpoint retention configured"
        );

        Ok(Self {
            pool: RetainedPool::new(config.capacity),
            coefficient,
            epochs_since_last_save: 0,
            resolve_path: Box::new(move |epoch, logs| template.render(epoch, logs)),
            store,
            config,
        })
    }

    /// Replace the path template with a resolver `(displayed_epoch, logs) -> path`.
    ///
    /// The resolver must return a distinct path for every epoch.
    pub fn with_path_fn<F>(mut self, resolve: F) -> Self
    where
        F: Fn(usize, &EpochLogs) -> Result<PathBuf, CheckpointError> + Send + 'static,
    {
        self.resolve_path = Box::new(resolve);
        self
    }

    /// Handle the end of epoch `epoch` (0-based; checkpoints record `epoch + 1`).
    pub fn on_epoch_end(
        &mut self,
        epoch: usize,
        logs: &EpochLogs,
    ) -> Result<EpochOutcome, CheckpointError> {
        self.epochs_since_last_save += 1;
        if self.epochs_since_last_save < self.config.save_interval {
            return Ok(EpochOutcome::NotDue);
        }
        self.epochs_since_last_save = 0;

        let epoch = epoch + 1;
        let monitor = self.config.monitor.as_str();
        let current = match logs.get(monitor) {
            Some(value) if !value.is_nan() => *value,
            Some(_) => {
                tracing::warn!(epoch, monitor, "Monitored metric is NaN, skipping checkpoint");
                return Ok(EpochOutcome::MissingMetric);
            }
            None => {
                tracing::warn!(
                    epoch,
                    monitor,
                    "Can save best model only with the monitored metric available, skipping"
                );
                return Ok(EpochOutcome::MissingMetric);
            }
        };

        let path = (self.resolve_path)(epoch, logs)?;
        let candidate = CheckpointRecord::new(current * self.coefficient, epoch, path);

        if !self.pool.admits(&candidate) {
            status!(
                self.config.verbose,
                epoch,
                monitor,
                current,
                retained = %self.retained_scores(),
                "Model did not improve"
            );
            return Ok(EpochOutcome::Discarded(candidate));
        }

        self.check_path_is_free(&candidate)?;
        self.store.persist(candidate.path(), self.config.weights_only)?;

        match self.pool.offer(candidate.clone()) {
            Offer::Inserted => {
                status!(
                    self.config.verbose,
                    epoch,
                    monitor,
                    current,
                    path = %candidate.path().display(),
                    retained = %self.retained_scores(),
                    "Saved new checkpoint"
                );
                Ok(EpochOutcome::Admitted(candidate))
            }
            Offer::Replaced { evicted } => {
                status!(
                    self.config.verbose,
                    epoch,
                    monitor,
                    current,
                    path = %candidate.path().display(),
                    evicted_epoch = evicted.epoch(),
                    evicted_value = evicted.raw_value(self.coefficient),
                    evicted_path = %evicted.path().display(),
                    retained = %self.retained_scores(),
                    "Saved improved checkpoint, deleting the worst retained one"
                );
                // Same path means the persist above already overwrote it.
                if evicted.path() != candidate.path() {
                    if let Err(e) = self.store.delete(evicted.path()) {
                        tracing::error!(
                            path = %evicted.path().display(),
                            error = %e,
                            "Failed to delete evicted checkpoint"
                        );
                        return Err(e);
                    }
                }
                Ok(EpochOutcome::Replaced {
                    admitted: candidate,
                    evicted,
                })
            }
            // `admits` returned true above, so the pool cannot refuse the record.
            Offer::Rejected(record) => Err(CheckpointError::Rejected {
                path: record.path().to_path_buf(),
            }),
        }
    }

    /// A retained checkpoint other than the one about to be evicted must not be overwritten.
    fn check_path_is_free(&self, candidate: &CheckpointRecord) -> Result<(), CheckpointError> {
        let evictable = self.pool.is_full().then(|| self.pool.peek_worst()).flatten();
        match self
            .pool
            .iter_best_first()
            .find(|r| r.path() == candidate.path())
        {
            Some(existing) if Some(existing) != evictable => Err(CheckpointError::config(format!(
                "path {} already holds the retained checkpoint from epoch {}",
                candidate.path().display(),
                existing.epoch()
            ))),
            _ => Ok(()),
        }
    }

    fn retained_scores(&self) -> String {
        self.pool
            .iter_best_first()
            .map(|r| format!("{:.5}", r.raw_value(self.coefficient)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<S> CheckpointRetentionPolicy<S> {
    /// Retained checkpoints, best first.
    pub fn retained(&self) -> Vec<CheckpointRecord> {
        self.pool.to_vec_best_first()
    }

    pub fn best(&self) -> Option<&CheckpointRecord> {
        self.pool.best()
    }

    pub fn pool(&self) -> &RetainedPool {
        &self.pool
    }

    /// `+1.0` if the monitored metric is maximized, `-1.0` if minimized.
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub fn epochs_since_last_save(&self) -> usize {
        self.epochs_since_last_save
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for CheckpointRetentionPolicy<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointRetentionPolicy")
            .field("config", &self.config)
            .field("coefficient", &self.coefficient)
            .field("pool", &self.pool)
            .field("epochs_since_last_save", &self.epochs_since_last_save)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorMode;
    use std::path::Path;

    #[derive(Debug, Default)]
    struct MemoryStore {
        live: Vec<PathBuf>,
        persisted: Vec<PathBuf>,
        deleted: Vec<PathBuf>,
    }

    impl CheckpointStore for MemoryStore {
        fn persist(&mut self, path: &Path, _weights_only: bool) -> Result<(), CheckpointError> {
            self.persisted.push(path.to_path_buf());
            if !self.live.iter().any(|p| p == path) {
                self.live.push(path.to_path_buf());
            }
            Ok(())
        }

        fn delete(&mut self, path: &Path) -> Result<(), CheckpointError> {
            let idx = self.live.iter().position(|p| p == path).ok_or_else(|| {
                CheckpointError::Delete {
                    path: path.to_path_buf(),
                    source: std::io::ErrorKind::NotFound.into(),
                }
            })?;
            self.live.remove(idx);
            self.deleted.push(path.to_path_buf());
            Ok(())
        }
    }

    fn logs(monitor: &str, value: f64) -> EpochLogs {
        EpochLogs::from([(monitor.to_string(), value)])
    }

    fn policy(capacity: usize) -> CheckpointRetentionPolicy<MemoryStore> {
        let config = RetentionConfig::new("val_loss", "ckpt/model.bin")
            .with_mode(MonitorMode::Min)
            .with_capacity(capacity);
        CheckpointRetentionPolicy::new(config, MemoryStore::default()).unwrap()
    }

    #[test]
    fn test_admits_until_full() {
        let mut policy = policy(2);
        let outcome = policy.on_epoch_end(0, &logs("val_loss", 0.5)).unwrap();
        assert!(matches!(outcome, EpochOutcome::Admitted(ref r) if r.epoch() == 1));
        policy.on_epoch_end(1, &logs("val_loss", 0.3)).unwrap();
        assert_eq!(policy.pool().len(), 2);
        assert_eq!(
            policy.store().persisted,
            vec![PathBuf::from("ckpt/model_1.bin"), PathBuf::from("ckpt/model_2.bin")]
        );
    }

    #[test]
    fn test_replacement_deletes_evicted_file() {
        let mut policy = policy(1);
        policy.on_epoch_end(0, &logs("val_loss", 0.5)).unwrap();
        let outcome = policy.on_epoch_end(1, &logs("val_loss", 0.2)).unwrap();
        match outcome {
            EpochOutcome::Replaced { admitted, evicted } => {
                assert_eq!(admitted.epoch(), 2);
                assert_eq!(evicted.epoch(), 1);
            }
            other => panic!("expected replacement, got {other:?}"),
        }
        assert_eq!(policy.store().deleted, vec![PathBuf::from("ckpt/model_1.bin")]);
        assert_eq!(policy.store().live, vec![PathBuf::from("ckpt/model_2.bin")]);
    }

    #[test]
    fn test_nan_metric_is_skipped() {
        let mut policy = policy(2);
        let outcome = policy.on_epoch_end(0, &logs("val_loss", f64::NAN)).unwrap();
        assert_eq!(outcome, EpochOutcome::MissingMetric);
        assert!(policy.store().persisted.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RetentionConfig::default().with_capacity(0);
        let err = CheckpointRetentionPolicy::new(config, MemoryStore::default()).unwrap_err();
        assert!(matches!(err, CheckpointError::Config(_)));
    }

    #[test]
    fn test_custom_path_fn_reusing_evicted_path_skips_delete() {
        let mut policy = policy(1).with_path_fn(|_, _| Ok(PathBuf::from("ckpt/best.bin")));
        policy.on_epoch_end(0, &logs("val_loss", 0.5)).unwrap();
        let outcome = policy.on_epoch_end(1, &logs("val_loss", 0.4)).unwrap();
        assert!(matches!(outcome, EpochOutcome::Replaced { .. }));
        assert!(policy.store().deleted.is_empty());
        assert_eq!(policy.store().live, vec![PathBuf::from("ckpt/best.bin")]);
    }

    #[test]
    fn test_custom_path_fn_cannot_overwrite_retained_checkpoint() {
        let mut policy = policy(2).with_path_fn(|_, _| Ok(PathBuf::from("ckpt/same.bin")));
        policy.on_epoch_end(0, &logs("val_loss", 0.5)).unwrap();
        let err = policy.on_epoch_end(1, &logs("val_loss", 0.4)).unwrap_err();
        assert!(matches!(err, CheckpointError::Config(_)));
        assert_eq!(policy.store().persisted.len(), 1);
        assert_eq!(policy.pool().len(), 1);
    }
}
