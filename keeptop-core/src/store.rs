//! Persistence seam: writing checkpoints and deleting evicted ones.

use crate::error::CheckpointError;
use std::io;
use std::path::Path;

/// What the save function should write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    /// Model weights only.
    Weights,
    /// Full model (architecture, weights and optimizer state).
    FullModel,
}

impl SaveKind {
    pub fn from_weights_only(weights_only: bool) -> Self {
        if weights_only {
            Self::Weights
        } else {
            Self::FullModel
        }
    }
}

/// Side effects the retention policy needs from its host.
///
/// Both operations must fail loudly: a `persist` that returns `Ok` has created a
/// loadable file at `path`, and a `delete` that returns `Ok` has removed one.
pub trait CheckpointStore {
    fn persist(&mut self, path: &Path, weights_only: bool) -> Result<(), CheckpointError>;

    fn delete(&mut self, path: &Path) -> Result<(), CheckpointError>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Box<S> {
    fn persist(&mut self, path: &Path, weights_only: bool) -> Result<(), CheckpointError> {
        (**self).persist(path, weights_only)
    }

    fn delete(&mut self, path: &Path) -> Result<(), CheckpointError> {
        (**self).delete(path)
    }
}

type SaveFn = Box<dyn FnMut(&Path, SaveKind) -> io::Result<()> + Send>;

/// Local filesystem store.
///
/// Serialization is delegated to a caller-supplied save function; the store
/// prepares the parent directory, checks that a file was produced, and removes
/// evicted checkpoints with `std::fs::remove_file`.
pub struct FsStore {
    save: SaveFn,
}

impl FsStore {
    pub fn new<F>(save: F) -> Self
    where
        F: FnMut(&Path, SaveKind) -> io::Result<()> + Send + 'static,
    {
        Self {
            save: Box::new(save),
        }
    }

    /// Store whose checkpoints are JSON snapshots produced by `snapshot`.
    pub fn json<F>(mut snapshot: F) -> Self
    where
        F: FnMut(SaveKind) -> serde_json::Value + Send + 'static,
    {
        Self::new(move |path, kind| {
            let value = snapshot(kind);
            let json = serde_json::to_vec_pretty(&value).map_err(io::Error::other)?;
            atomic_write(path, &json)
        })
    }
}

impl std::fmt::Debug for FsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsStore").finish_non_exhaustive()
    }
}

impl CheckpointStore for FsStore {
    fn persist(&mut self, path: &Path, weights_only: bool) -> Result<(), CheckpointError> {
        let persist_err = |source| CheckpointError::Persist {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(persist_err)?;
        }
        (self.save)(path, SaveKind::from_weights_only(weights_only)).map_err(persist_err)?;

        if !path.is_file() {
            return Err(persist_err(io::Error::new(
                io::ErrorKind::NotFound,
                "save function returned without creating the checkpoint file",
            )));
        }
        Ok(())
    }

    fn delete(&mut self, path: &Path) -> Result<(), CheckpointError> {
        std::fs::remove_file(path).map_err(|source| CheckpointError::Delete {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Write to a `.tmp` sibling, then rename over the target.
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}
