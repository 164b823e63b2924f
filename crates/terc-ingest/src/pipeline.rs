//! Ingestion pipeline
//!
//! Wires the stages together. [`IngestPipeline::load_raw`] is the per-file
//! loop (discover, filter, then fetch, normalize and publish each file);
//! [`IngestPipeline::run`] is the full run expressed as a task graph:
//!
//! ```text
//! ensure_bucket -> load_raw -> transform -> promote
//! ```

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use terc_common::storage::ObjectStore;
use terc_common::{Layer, ReportingPeriod, SourceFile};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::SourceCatalog;
use crate::config::{FailurePolicy, IngestConfig};
use crate::error::{IngestError, Result};
use crate::fetch::Fetcher;
use crate::filter::{filter_by_window, LoadWindow};
use crate::graph::{GraphOutcome, TaskGraph};
use crate::normalize::{self, ColumnMapping};
use crate::promote::{LayerPromoter, PromotionReport, RefreshTrigger};
use crate::publish::{PartitionPublisher, PublishedPartition};
use crate::transform::{TransformCommand, TransformStage};

/// One file that did not make it to the raw layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub url: String,
    pub period: ReportingPeriod,
    pub stage: &'static str,
    pub error: String,
}

/// Summary of one raw load
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub discovered: usize,
    /// Periods of every file that was started, in load order
    pub attempted: Vec<ReportingPeriod>,
    pub published: Vec<PublishedPartition>,
    pub failures: Vec<FileFailure>,
    /// True when the abort policy stopped the run early
    pub aborted: bool,
}

impl RunReport {
    pub fn published_periods(&self) -> Vec<ReportingPeriod> {
        self.published.iter().map(|p| p.period).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.aborted
    }

    /// Stage error for a load that aborted or published nothing, naming the
    /// stage and message of the first file that failed
    pub fn incomplete_error(&self) -> IngestError {
        let first = self.failures.first();
        IngestError::LoadIncomplete {
            failed: self.failures.len(),
            aborted: self.aborted,
            first_stage: first.map_or("load", |f| f.stage),
            first_error: first.map(|f| f.error.clone()).unwrap_or_default(),
        }
    }
}

/// Summary of a full run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub stages: GraphOutcome,
    pub load: Option<RunReport>,
    pub promotion: Option<PromotionReport>,
}

/// Units of the full run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EnsureBucket,
    LoadRaw,
    Transform(TransformCommand),
    Promote,
}

pub struct IngestPipeline {
    config: IngestConfig,
    store: Arc<dyn ObjectStore>,
    catalog: SourceCatalog,
    fetcher: Fetcher,
    publisher: PartitionPublisher,
    transform: TransformStage,
    promoter: LayerPromoter,
    mapping: ColumnMapping,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;
        let client = config.http_client()?;

        let mut promoter = LayerPromoter::new(
            store.clone(),
            config.working_db.clone(),
            config.staging_dir.clone(),
        );
        if let Some(url) = &config.refresh_url {
            promoter = promoter.with_refresh(RefreshTrigger::new(client.clone(), url.clone()));
        }

        Ok(Self {
            catalog: SourceCatalog::new(client.clone()),
            fetcher: Fetcher::new(client, config.retry),
            publisher: PartitionPublisher::new(store.clone())
                .with_staging_dir(config.staging_dir.clone()),
            transform: TransformStage::new(
                config.dbt_program.clone(),
                config.dbt_project_dir.clone(),
                config.dbt_profiles_dir.clone(),
            ),
            promoter,
            mapping: ColumnMapping::positional(),
            store,
            config,
        })
    }

    /// Replace the default positional column mapping
    pub fn with_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn publisher(&self) -> &PartitionPublisher {
        &self.publisher
    }

    pub async fn discover(&self) -> Result<Vec<SourceFile>> {
        self.catalog.discover(&self.config.index_url).await
    }

    /// Discover, filter and load every file in `window` into the raw layer.
    ///
    /// Fails only when discovery fails; per-file problems end up in the report.
    #[instrument(skip(self), fields(start = %window.start(), end = %window.end()))]
    pub async fn load_raw(&self, window: &LoadWindow) -> Result<RunReport> {
        let discovered = self.discover().await?;
        let selected = filter_by_window(&discovered, window);
        info!(
            discovered = discovered.len(),
            selected = selected.len(),
            "Files selected for loading"
        );

        let mut report = self.load_files(selected).await?;
        report.discovered = discovered.len();
        Ok(report)
    }

    /// Fetch, normalize and publish `files`, isolating per-file failures
    pub async fn load_files(&self, files: Vec<SourceFile>) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        tokio::fs::create_dir_all(&self.config.staging_dir).await?;
        let staging = tempfile::Builder::new()
            .prefix("terc-run-")
            .tempdir_in(&self.config.staging_dir)?;

        let stop = AtomicBool::new(false);
        let abort_on_failure = self.config.failure_policy == FailurePolicy::Abort;
        let total = files.len();

        let results: Vec<(SourceFile, Option<Result<PublishedPartition>>)> =
            stream::iter(files.into_iter().enumerate())
                .map(|(idx, file)| {
                    let stop = &stop;
                    let staging_path = staging.path().join(format!(
                        "{:04}-{}.{}",
                        idx,
                        file.period.yyyymm(),
                        file.kind.extension()
                    ));
                    async move {
                        if stop.load(Ordering::SeqCst) {
                            return (file, None);
                        }
                        info!(
                            run_id = %run_id,
                            period = %file.period,
                            kind = %file.kind,
                            "Loading file {}/{}: {}",
                            idx + 1,
                            total,
                            file.url
                        );
                        let result = self.load_file(&file, &staging_path).await;
                        if result.is_err() && abort_on_failure {
                            stop.store(true, Ordering::SeqCst);
                        }
                        (file, Some(result))
                    }
                })
                .buffered(self.config.max_concurrent_files.max(1))
                .collect()
                .await;

        let mut report = RunReport {
            run_id,
            discovered: total,
            attempted: Vec::new(),
            published: Vec::new(),
            failures: Vec::new(),
            aborted: false,
        };

        for (file, result) in results {
            match result {
                None => report.aborted = true,
                Some(Ok(partition)) => {
                    report.attempted.push(file.period);
                    report.published.push(partition);
                },
                Some(Err(e)) => {
                    report.attempted.push(file.period);
                    error!(period = %file.period, url = %file.url, "{}", e);
                    report.failures.push(FileFailure {
                        url: file.url,
                        period: file.period,
                        stage: e.stage(),
                        error: e.to_string(),
                    });
                },
            }
        }

        info!(
            run_id = %run_id,
            published = report.published.len(),
            failed = report.failures.len(),
            aborted = report.aborted,
            "Raw load finished"
        );
        Ok(report)
    }

    async fn load_file(&self, file: &SourceFile, staging_path: &Path) -> Result<PublishedPartition> {
        let fetched = self.fetcher.fetch(&file.url, staging_path).await?;
        let normalized =
            normalize::normalize(&fetched.path, file.kind, file.period, &self.mapping).await;

        if let Err(e) = tokio::fs::remove_file(&fetched.path).await {
            warn!("Failed to remove staged file {}: {}", fetched.path.display(), e);
        }

        self.publisher.publish(normalized?).await
    }

    pub async fn ensure_bucket(&self) -> Result<()> {
        let created = self
            .store
            .ensure_bucket()
            .await
            .map_err(|e| IngestError::Storage(format!("{:#}", e)))?;
        if created {
            info!("Bucket created");
        }
        Ok(())
    }

    pub async fn transform(&self, command: TransformCommand) -> Result<()> {
        self.transform.invoke(command).await
    }

    pub async fn promote(&self, layers: &[Layer]) -> PromotionReport {
        self.promoter.promote(layers).await
    }

    /// Full run: ensure the bucket, load the window, build the derived
    /// layers, then promote them
    pub async fn run(&self, window: &LoadWindow) -> Result<PipelineReport> {
        let mut graph = TaskGraph::new();
        graph.add_task("ensure_bucket", Stage::EnsureBucket)?;
        graph.add_task("load_raw", Stage::LoadRaw)?;
        graph.add_task("transform", Stage::Transform(TransformCommand::Build))?;
        graph.add_task("promote", Stage::Promote)?;
        graph.wait_for("load_raw", &["ensure_bucket"])?;
        graph.wait_for("transform", &["load_raw"])?;
        graph.wait_for("promote", &["transform"])?;

        let results = StageResults::default();
        let stages = graph
            .execute(|stage| self.run_stage(stage, window, &results))
            .await?;

        let report = PipelineReport {
            stages,
            load: results.load.lock().ok().and_then(|mut slot| slot.take()),
            promotion: results.promotion.lock().ok().and_then(|mut slot| slot.take()),
        };

        if report.stages.is_success() {
            info!("Pipeline finished");
        } else {
            warn!(
                failed = report.stages.failed.len(),
                skipped = report.stages.skipped.len(),
                "Pipeline finished with problems"
            );
        }
        Ok(report)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        window: &LoadWindow,
        results: &StageResults,
    ) -> Result<()> {
        match stage {
            Stage::EnsureBucket => self.ensure_bucket().await,
            Stage::LoadRaw => {
                let report = self.load_raw(window).await?;
                let outcome = if report.aborted
                    || (report.published.is_empty() && !report.failures.is_empty())
                {
                    Err(report.incomplete_error())
                } else {
                    Ok(())
                };
                if let Ok(mut slot) = results.load.lock() {
                    *slot = Some(report);
                }
                outcome
            },
            Stage::Transform(command) => self.transform(command).await,
            Stage::Promote => {
                let report = self.promote(&Layer::DERIVED).await;
                let outcome = match report.failures.first() {
                    Some(failure) => Err(IngestError::promotion(failure.layer, &failure.error)),
                    None => Ok(()),
                };
                if let Ok(mut slot) = results.promotion.lock() {
                    *slot = Some(report);
                }
                outcome
            },
        }
    }
}

#[derive(Default)]
struct StageResults {
    load: Mutex<Option<RunReport>>,
    promotion: Mutex<Option<PromotionReport>>,
}
