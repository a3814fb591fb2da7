//! Configuration for checkpoint retention.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides.

use crate::error::CheckpointError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Direction in which the monitored metric improves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MonitorMode {
    /// Infer the direction from the metric name.
    #[default]
    Auto,
    Min,
    Max,
}

impl MonitorMode {
    /// Parse a mode name. Unknown names fall back to [`MonitorMode::Auto`] with a warning.
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "auto" => Self::Auto,
            "min" => Self::Min,
            "max" => Self::Max,
            other => {
                tracing::warn!(mode = other, "Checkpoint mode is unknown, falling back to auto");
                Self::Auto
            }
        }
    }

    /// `+1.0` when higher values are better, `-1.0` otherwise.
    pub fn coefficient(self, monitor: &str) -> f64 {
        match self {
            Self::Min => -1.0,
            Self::Max => 1.0,
            Self::Auto if monitor.contains("acc") || monitor.starts_with("fmeasure") => 1.0,
            Self::Auto => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl From<String> for MonitorMode {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<MonitorMode> for String {
    fn from(mode: MonitorMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for MonitorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for a [`CheckpointRetentionPolicy`](crate::CheckpointRetentionPolicy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Metric key read from each epoch's logs.
    #[serde(default = "default_monitor")]
    pub monitor: String,
    /// Whether the metric is minimized or maximized.
    #[serde(default)]
    pub mode: MonitorMode,
    /// Maximum number of checkpoints kept on disk.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Only every `save_interval`-th epoch is evaluated.
    #[serde(default = "default_save_interval")]
    pub save_interval: usize,
    /// Destination template; an `_{epoch}` suffix is always added.
    #[serde(default = "default_filepath")]
    pub filepath: String,
    /// Save weights only instead of the full model.
    #[serde(default)]
    pub weights_only: bool,
    /// Report retention decisions at info level instead of debug.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            monitor: default_monitor(),
            mode: MonitorMode::Auto,
            capacity: default_capacity(),
            save_interval: default_save_interval(),
            filepath: default_filepath(),
            weights_only: false,
            verbose: false,
        }
    }
}

fn default_monitor() -> String {
    "val_loss".to_string()
}

fn default_capacity() -> usize {
    5
}

fn default_save_interval() -> usize {
    1
}

fn default_filepath() -> String {
    "checkpoints/model.ckpt".to_string()
}

impl RetentionConfig {
    pub fn new(monitor: impl Into<String>, filepath: impl Into<String>) -> Self {
        Self {
            monitor: monitor.into(),
            filepath: filepath.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: MonitorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_save_interval(mut self, save_interval: usize) -> Self {
        self.save_interval = save_interval;
        self
    }

    pub fn with_weights_only(mut self, weights_only: bool) -> Self {
        self.weights_only = weights_only;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Direction coefficient for the configured monitor and mode.
    pub fn coefficient(&self) -> f64 {
        self.mode.coefficient(&self.monitor)
    }

    pub fn validate(&self) -> Result<(), CheckpointError> {
        if self.monitor.trim().is_empty() {
            return Err(CheckpointError::config("monitor must not be empty"));
        }
        if self.capacity == 0 {
            return Err(CheckpointError::config("capacity must be at least 1"));
        }
        if self.save_interval == 0 {
            return Err(CheckpointError::config("save_interval must be at least 1"));
        }
        Ok(())
    }
}

/// Workspace-relative location of the config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".keeptop").join("config.toml")
}

/// Load configuration with layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `KEEPTOP_`)
/// 3. Workspace-local config (`.keeptop/config.toml`)
/// 4. User config (`~/.config/keeptop/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&RetentionConfig>,
) -> Result<RetentionConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(RetentionConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "keeptop", "keeptop") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // KEEPTOP_MONITOR, KEEPTOP_CAPACITY, ...
    figment = figment.merge(Env::prefixed("KEEPTOP_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load configuration from a single TOML file on top of the defaults.
pub fn load_config_file(path: &Path) -> Result<RetentionConfig, Box<figment::Error>> {
    Figment::from(Serialized::defaults(RetentionConfig::default()))
        .merge(Toml::file(path))
        .extract()
        .map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_values() {
        let config = RetentionConfig::default();
        assert_eq!(config.monitor, "val_loss");
        assert_eq!(config.mode, MonitorMode::Auto);
        assert_eq!(config.capacity, 5);
        assert_eq!(config.save_interval, 1);
        assert!(!config.weights_only);
        assert_eq!(config.coefficient(), -1.0);
    }

    #[test]
    fn test_auto_mode_infers_direction() {
        assert_eq!(MonitorMode::Auto.coefficient("val_acc"), 1.0);
        assert_eq!(MonitorMode::Auto.coefficient("categorical_accuracy"), 1.0);
        assert_eq!(MonitorMode::Auto.coefficient("fmeasure_macro"), 1.0);
        assert_eq!(MonitorMode::Auto.coefficient("val_fmeasure"), -1.0);
        assert_eq!(MonitorMode::Auto.coefficient("val_loss"), -1.0);
    }

    #[test]
    fn test_explicit_mode_overrides_name() {
        assert_eq!(MonitorMode::Min.coefficient("val_acc"), -1.0);
        assert_eq!(MonitorMode::Max.coefficient("val_loss"), 1.0);
    }

    #[test]
    fn test_unknown_mode_falls_back_to_auto() {
        assert_eq!(MonitorMode::parse("maximize"), MonitorMode::Auto);
        assert_eq!(MonitorMode::parse("MAX"), MonitorMode::Max);
        let mode: MonitorMode = serde_json::from_str("\"sideways\"").unwrap();
        assert_eq!(mode, MonitorMode::Auto);
    }

    #[test]
    fn test_validate_rejects_zero_capacity_and_interval() {
        assert!(RetentionConfig::default().validate().is_ok());
        let err = RetentionConfig::default().with_capacity(0).validate();
        assert!(matches!(err, Err(CheckpointError::Config(_))));
        let err = RetentionConfig::default().with_save_interval(0).validate();
        assert!(matches!(err, Err(CheckpointError::Config(_))));
        let err = RetentionConfig::new(" ", "m.ckpt").validate();
        assert!(matches!(err, Err(CheckpointError::Config(_))));
    }

    #[test]
    fn test_load_config_file_merges_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("retention.toml");
        std::fs::write(
            &path,
            "monitor = \"val_acc\"\ncapacity = 3\nmode = \"max\"\n",
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.monitor, "val_acc");
        assert_eq!(config.capacity, 3);
        assert_eq!(config.mode, MonitorMode::Max);
        assert_eq!(config.save_interval, 1);
    }

    #[test]
    fn test_overrides_take_priority() {
        let dir = TempDir::new().unwrap();
        let ws_config = workspace_config_path(dir.path());
        std::fs::create_dir_all(ws_config.parent().unwrap()).unwrap();
        std::fs::write(&ws_config, "capacity = 7\n").unwrap();

        let overrides = RetentionConfig::default().with_capacity(2);
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert_eq!(config.capacity, 2);
    }
}
