//! Local working copy of the gold snapshot
//!
//! The API reads one DuckDB file on local disk. A new copy is always
//! downloaded into a temporary directory beside the active file and then
//! renamed over it, so a reader opens either the previous snapshot or the new
//! one, never a partial download. Staging and installing are separate steps;
//! a staged snapshot that is dropped without being installed removes itself.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use terc_common::storage::ObjectStore;
use terc_common::{layout, Layer};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::queries;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to download snapshot {key}: {message}")]
    Download { key: String, message: String },

    #[error("Failed to install snapshot at {}: {source}", .path.display())]
    Install {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to initialize empty snapshot: {0}")]
    Initialize(String),
}

/// What `load` ended up serving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    Downloaded { bytes: u64 },
    KeptExisting,
    InitializedEmpty,
}

/// A downloaded snapshot waiting to be installed
pub struct StagedSnapshot {
    _dir: tempfile::TempDir,
    path: PathBuf,
    bytes: u64,
}

impl StagedSnapshot {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Atomically replace `active` with the staged file
    pub async fn install(self, active: &Path) -> Result<u64, SnapshotError> {
        let StagedSnapshot { _dir, path, bytes } = self;
        let active = active.to_path_buf();
        let target = active.clone();

        tokio::task::spawn_blocking(move || std::fs::rename(&path, &target))
            .await
            .map_err(std::io::Error::other)
            .and_then(|renamed| renamed)
            .map_err(|source| SnapshotError::Install {
                path: active,
                source,
            })?;
        Ok(bytes)
    }
}

pub struct SnapshotLoader {
    store: Arc<dyn ObjectStore>,
    key: String,
    active: PathBuf,
    swap_lock: Mutex<()>,
}

impl SnapshotLoader {
    /// Loader for the gold layer snapshot, kept at `active`
    pub fn new(store: Arc<dyn ObjectStore>, active: impl Into<PathBuf>) -> Self {
        Self {
            store,
            key: layout::layer_snapshot_key(Layer::Gold),
            active: active.into(),
            swap_lock: Mutex::new(()),
        }
    }

    pub fn active_path(&self) -> &Path {
        &self.active
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn snapshot_dir(&self) -> PathBuf {
        match self.active.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn file_name(&self) -> String {
        self.active
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.duckdb", layout::layer_table(Layer::Gold)))
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let dir = self.snapshot_dir();
        std::fs::create_dir_all(&dir)?;
        tempfile::Builder::new()
            .prefix(".terc-snapshot-")
            .tempdir_in(dir)
    }

    /// Download the remote snapshot next to the active file
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn stage(&self) -> Result<StagedSnapshot, SnapshotError> {
        let download_error = |message: String| SnapshotError::Download {
            key: self.key.clone(),
            message,
        };

        let dir = self.scratch_dir().map_err(|e| download_error(e.to_string()))?;
        let path = dir.path().join(self.file_name());
        let bytes = self
            .store
            .download_to(&self.key, &path)
            .await
            .map_err(|e| download_error(format!("{:#}", e)))?;

        Ok(StagedSnapshot {
            _dir: dir,
            path,
            bytes,
        })
    }

    /// Startup load. Never leaves the API without a database: when the
    /// download fails the existing local copy is kept, or an empty one is
    /// created.
    pub async fn load(&self) -> Result<LoadOutcome, SnapshotError> {
        let _guard = self.swap_lock.lock().await;

        let attempt = match self.stage().await {
            Ok(staged) => staged.install(&self.active).await,
            Err(e) => Err(e),
        };

        match attempt {
            Ok(bytes) => {
                info!(bytes, "Snapshot loaded into {}", self.active.display());
                Ok(LoadOutcome::Downloaded { bytes })
            },
            Err(e) if self.active.exists() => {
                warn!("{}; serving existing {}", e, self.active.display());
                Ok(LoadOutcome::KeptExisting)
            },
            Err(e) => {
                warn!("{}; starting with an empty snapshot", e);
                self.initialize_empty().await?;
                Ok(LoadOutcome::InitializedEmpty)
            },
        }
    }

    /// On-demand reload. On failure the active snapshot is left as it was.
    pub async fn refresh(&self) -> Result<u64, SnapshotError> {
        let _guard = self.swap_lock.lock().await;
        let staged = self.stage().await?;
        let bytes = staged.install(&self.active).await?;
        info!(bytes, "Snapshot refreshed from {}", self.store.describe(&self.key));
        Ok(bytes)
    }

    async fn initialize_empty(&self) -> Result<(), SnapshotError> {
        let dir = self
            .scratch_dir()
            .map_err(|e| SnapshotError::Initialize(e.to_string()))?;
        let active = self.active.clone();
        let path = dir.path().join(self.file_name());

        tokio::task::spawn_blocking(move || -> Result<(), SnapshotError> {
            let conn = duckdb::Connection::open(&path)
                .map_err(|e| SnapshotError::Initialize(e.to_string()))?;
            conn.execute_batch(&queries::empty_table_ddl())
                .map_err(|e| SnapshotError::Initialize(e.to_string()))?;
            conn.close()
                .map_err(|(_, e)| SnapshotError::Initialize(e.to_string()))?;

            std::fs::rename(&path, &active).map_err(|source| SnapshotError::Install {
                path: active.clone(),
                source,
            })?;
            drop(dir);
            Ok(())
        })
        .await
        .map_err(|e| SnapshotError::Initialize(e.to_string()))??;

        info!("Empty snapshot created at {}", self.active.display());
        Ok(())
    }
}
