//! # keeptop-core — top-N checkpoint retention
//!
//! Keeps the N best-scoring model checkpoints during training. After every
//! eligible epoch the monitored metric is compared with the worst retained
//! checkpoint; a better model is written to disk and the displaced checkpoint's
//! file is deleted, so at most N checkpoint files are live at any time.
//!
//! Model serialization stays with the caller through [`CheckpointStore`].

pub mod callback;
pub mod config;
pub mod error;
pub mod policy;
pub mod pool;
pub mod record;
pub mod store;
pub mod template;

pub use callback::{CallbackAction, CallbackList, EpochCallback};
pub use config::{MonitorMode, RetentionConfig, load_config, load_config_file};
pub use error::CheckpointError;
pub use policy::{CheckpointRetentionPolicy, EpochLogs, EpochOutcome};
pub use pool::{Offer, RetainedPool};
pub use record::CheckpointRecord;
pub use store::{CheckpointStore, FsStore, SaveKind};
pub use template::PathTemplate;
