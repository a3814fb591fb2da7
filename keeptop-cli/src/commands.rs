//! Subcommand implementations.

use anyhow::{Context, bail};
use keeptop_core::{
    CheckpointRetentionPolicy, EpochLogs, EpochOutcome, FsStore, MonitorMode, RetentionConfig,
    SaveKind,
};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Command-line overrides applied on top of the loaded configuration.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Metric to monitor
    #[arg(long)]
    pub monitor: Option<String>,

    /// Direction: auto, min or max
    #[arg(long)]
    pub mode: Option<String>,

    /// Number of checkpoints to keep
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Evaluate every N epochs
    #[arg(long)]
    pub interval: Option<usize>,

    /// Checkpoint path template
    #[arg(long)]
    pub filepath: Option<String>,

    /// Save weights only
    #[arg(long)]
    pub weights_only: bool,
}

impl Overrides {
    fn apply(&self, mut config: RetentionConfig) -> RetentionConfig {
        if let Some(monitor) = &self.monitor {
            config.monitor = monitor.clone();
        }
        if let Some(mode) = &self.mode {
            config.mode = MonitorMode::parse(mode);
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(interval) = self.interval {
            config.save_interval = interval;
        }
        if let Some(filepath) = &self.filepath {
            config.filepath = filepath.clone();
        }
        if self.weights_only {
            config.weights_only = true;
        }
        config
    }
}

pub fn resolve_config(
    workspace: &Path,
    config_file: Option<&Path>,
    overrides: &Overrides,
) -> anyhow::Result<RetentionConfig> {
    let config = match config_file {
        Some(path) => keeptop_core::load_config_file(path),
        None => keeptop_core::load_config(Some(workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(overrides.apply(config))
}

/// Parse one epoch per non-empty line; non-numeric values are ignored.
pub fn parse_log(content: &str) -> anyhow::Result<Vec<EpochLogs>> {
    let mut epochs = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .with_context(|| format!("line {}: invalid JSON", lineno + 1))?;
        let Some(object) = value.as_object() else {
            bail!("line {}: expected an object of metric values", lineno + 1);
        };
        let logs = object
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|v| (k.clone(), v)))
            .collect();
        epochs.push(logs);
    }
    Ok(epochs)
}

/// Drive the retention policy over a metrics log and describe the result.
pub fn replay(log: &Path, config: RetentionConfig) -> anyhow::Result<String> {
    let content = std::fs::read_to_string(log)
        .with_context(|| format!("Failed to read metrics log {}", log.display()))?;
    let epochs = parse_log(&content)?;

    // The snapshot written for each checkpoint is the epoch's own logs.
    let current = Arc::new(Mutex::new((0usize, EpochLogs::new())));
    let snapshot = Arc::clone(&current);
    let store = FsStore::json(move |kind| {
        let guard = snapshot.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::json!({
            "epoch": guard.0,
            "kind": match kind {
                SaveKind::Weights => "weights",
                SaveKind::FullModel => "full_model",
            },
            "logs": guard.1,
        })
    });

    let mut policy = CheckpointRetentionPolicy::new(config, store)?;
    let mut saved = 0usize;
    let mut deleted = 0usize;
    for (epoch, logs) in epochs.iter().enumerate() {
        {
            let mut guard = current.lock().unwrap_or_else(|e| e.into_inner());
            *guard = (epoch + 1, logs.clone());
        }
        match policy.on_epoch_end(epoch, logs)? {
            EpochOutcome::Admitted(_) => saved += 1,
            EpochOutcome::Replaced { .. } => {
                saved += 1;
                deleted += 1;
            }
            EpochOutcome::NotDue | EpochOutcome::MissingMetric | EpochOutcome::Discarded(_) => {}
        }
    }
    tracing::info!(epochs = epochs.len(), saved, deleted, "Replay finished");

    let mut out = String::new();
    writeln!(
        out,
        "Retained {} of {} checkpoints by {} ({} epochs, {} saved, {} deleted):",
        policy.pool().len(),
        policy.config().capacity,
        policy.config().monitor,
        epochs.len(),
        saved,
        deleted,
    )?;
    for (rank, record) in policy.retained().iter().enumerate() {
        writeln!(
            out,
            "  {}. epoch {:>5}  {} = {:.5}  {}",
            rank + 1,
            record.epoch(),
            policy.config().monitor,
            record.raw_value(policy.coefficient()),
            record.path().display(),
        )?;
    }
    Ok(out)
}
