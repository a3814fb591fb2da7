//! Error types for the keeptop-core crate.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for checkpoint retention.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to persist checkpoint to {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete checkpoint {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Checkpoint {path} was written but the retained pool refused it")]
    Rejected { path: PathBuf },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Path template error: {0}")]
    Template(String),
}

impl CheckpointError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Path of the checkpoint file involved, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Persist { path, .. } | Self::Delete { path, .. } | Self::Rejected { path } => {
                Some(path)
            }
            _ => None,
        }
    }
}
