//! Layer promotion
//!
//! dbt materializes `terceirizados_{bronze,silver,gold}` inside one working
//! DuckDB file. Consumers should not need that whole file (or its lock), so
//! each layer is copied into its own single-table database file and uploaded
//! next to the raw partitions. Once every layer has been handled the serving
//! API is told to pick up the new gold snapshot, unless nothing was uploaded
//! or the gold upload itself failed.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use terc_common::layout;
use terc_common::storage::ObjectStore;
use terc_common::Layer;
use tracing::{error, info, instrument, warn};

use crate::error::{IngestError, Result};

/// A layer uploaded as a standalone database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotedLayer {
    pub layer: Layer,
    pub key: String,
    pub size: u64,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerFailure {
    pub layer: Layer,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RefreshOutcome {
    NotConfigured,
    /// No new gold snapshot to pick up
    Skipped { reason: String },
    Triggered { status: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    pub promoted: Vec<PromotedLayer>,
    pub failures: Vec<LayerFailure>,
    pub refresh: RefreshOutcome,
}

impl PromotionReport {
    /// Every requested layer was uploaded. A failed refresh does not count.
    pub fn all_promoted(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Body returned by the serving API's refresh endpoint
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    status: String,
}

/// Calls the serving API's refresh endpoint
#[derive(Debug, Clone)]
pub struct RefreshTrigger {
    client: reqwest::Client,
    url: String,
}

impl RefreshTrigger {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the refresh endpoint and return the status it reports
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn trigger(&self) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .send()
            .await
            .map_err(|e| IngestError::RefreshTrigger(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(IngestError::RefreshTrigger(format!("HTTP {}: {}", status, body)));
        }

        Ok(serde_json::from_str::<RefreshResponse>(&body)
            .map(|r| r.status)
            .unwrap_or(body))
    }
}

pub struct LayerPromoter {
    store: Arc<dyn ObjectStore>,
    working_db: PathBuf,
    scratch_dir: PathBuf,
    refresh: Option<RefreshTrigger>,
}

/// Reason to leave the serving refresh alone: the gold upload failed or
/// nothing was uploaded at all
fn refresh_skip_reason(promoted: &[PromotedLayer], failures: &[LayerFailure]) -> Option<String> {
    if failures.iter().any(|f| f.layer == Layer::Gold) {
        Some("gold layer was not promoted".to_string())
    } else if promoted.is_empty() {
        Some("no layer was promoted".to_string())
    } else {
        None
    }
}

impl LayerPromoter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        working_db: impl Into<PathBuf>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            working_db: working_db.into(),
            scratch_dir: scratch_dir.into(),
            refresh: None,
        }
    }

    pub fn with_refresh(mut self, trigger: RefreshTrigger) -> Self {
        self.refresh = Some(trigger);
        self
    }

    /// Upload each layer, then trigger the serving refresh.
    ///
    /// A failing layer is recorded and the next one is attempted; uploads are
    /// never undone when the refresh call fails.
    #[instrument(skip(self), fields(working_db = %self.working_db.display()))]
    pub async fn promote(&self, layers: &[Layer]) -> PromotionReport {
        let mut promoted = Vec::new();
        let mut failures = Vec::new();

        for &layer in layers {
            match self.promote_layer(layer).await {
                Ok(done) => promoted.push(done),
                Err(e) => {
                    error!(layer = %layer, "{}", e);
                    failures.push(LayerFailure {
                        layer,
                        error: e.to_string(),
                    });
                },
            }
        }

        let refresh = match (&self.refresh, refresh_skip_reason(&promoted, &failures)) {
            (None, _) => RefreshOutcome::NotConfigured,
            (Some(_), Some(reason)) => {
                warn!("Serving refresh skipped: {}", reason);
                RefreshOutcome::Skipped { reason }
            },
            (Some(trigger), None) => match trigger.trigger().await {
                Ok(status) => {
                    info!(status = %status, "Serving layer refreshed");
                    RefreshOutcome::Triggered { status }
                },
                Err(e) => {
                    warn!("{}", e);
                    RefreshOutcome::Failed {
                        error: e.to_string(),
                    }
                },
            },
        };

        PromotionReport {
            promoted,
            failures,
            refresh,
        }
    }

    async fn promote_layer(&self, layer: Layer) -> Result<PromotedLayer> {
        if layer == Layer::Raw {
            return Err(IngestError::promotion(
                layer,
                "raw data is published as partitions, not as a database",
            ));
        }

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let scratch = ScratchFile::new(&self.scratch_dir, layer)
            .map_err(|e| IngestError::promotion(layer, e))?;

        let working_db = self.working_db.clone();
        let target = scratch.path().to_path_buf();
        tokio::task::spawn_blocking(move || export_layer(&working_db, &target, layer))
            .await
            .map_err(|e| IngestError::promotion(layer, e))?
            .map_err(|e| IngestError::promotion(layer, e))?;

        let key = layout::layer_snapshot_key(layer);
        let upload = self
            .store
            .put_file(&key, scratch.path())
            .await
            .map_err(|e| IngestError::promotion(layer, e))?;

        info!(
            layer = %layer,
            size = upload.size,
            "Layer uploaded to {}",
            self.store.describe(&key)
        );

        Ok(PromotedLayer {
            layer,
            key,
            size: upload.size,
            checksum: upload.checksum,
        })
    }
}

/// Directory holding one layer's scratch database (and any WAL DuckDB
/// leaves beside it); removed on drop
struct ScratchFile {
    _dir: tempfile::TempDir,
    path: PathBuf,
}

impl ScratchFile {
    fn new(parent: &Path, layer: Layer) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("terc-{}-", layer))
            .tempdir_in(parent)?;
        let path = dir.path().join(format!("{}.duckdb", layout::layer_table(layer)));
        Ok(Self { _dir: dir, path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn sql_literal(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "''"))
}

/// Copy `terceirizados_{layer}` from the working database into a new
/// single-table database at `target`
pub fn export_layer(working_db: &Path, target: &Path, layer: Layer) -> anyhow::Result<()> {
    if !working_db.exists() {
        anyhow::bail!("working database {} does not exist", working_db.display());
    }

    let table = layout::layer_table(layer);
    let conn = duckdb::Connection::open_in_memory().context("open DuckDB")?;
    conn.execute_batch(&format!(
        "ATTACH {src} AS src (READ_ONLY);
         ATTACH {dst} AS dst;
         CREATE TABLE dst.{table} AS SELECT * FROM src.{table};
         CHECKPOINT dst;
         DETACH dst;
         DETACH src;",
        src = sql_literal(working_db),
        dst = sql_literal(target),
        table = table,
    ))
    .with_context(|| format!("copy table {}", table))?;

    Ok(())
}
