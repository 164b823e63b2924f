//! Terceirizados Ingest Library
//!
//! Loads the federal government's monthly outsourced-worker files into object
//! storage and promotes the derived layers to the serving API.
//!
//! # Stages
//!
//! - **catalog**: find monthly files on the portal index page
//! - **filter**: keep the files inside a reporting-period window
//! - **fetch**: download with retry into a staging file
//! - **normalize**: CSV (multi-encoding) and spreadsheet parsing into one schema
//! - **publish**: one Parquet partition per reporting period
//! - **transform**: run dbt to build bronze/silver/gold
//! - **promote**: ship each layer as a standalone DuckDB file and refresh the API
//!
//! # Example
//!
//! ```no_run
//! use terc_common::storage::{connect, StorageConfig};
//! use terc_ingest::{IngestConfig, IngestPipeline, LoadWindow};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = connect(StorageConfig::from_env()?).await?;
//!     let pipeline = IngestPipeline::new(IngestConfig::from_env()?, store)?;
//!     let window = LoadWindow::new("2024-01".parse()?, "2024-06".parse()?)?;
//!     let report = pipeline.load_raw(&window).await?;
//!     println!("{} partitions published", report.published.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod graph;
pub mod normalize;
pub mod pipeline;
pub mod promote;
pub mod publish;
pub mod transform;

pub use catalog::SourceCatalog;
pub use config::{FailurePolicy, IngestConfig};
pub use error::{IngestError, Result};
pub use fetch::{Fetcher, RetryPolicy};
pub use filter::{filter_by_window, LoadWindow};
pub use graph::TaskGraph;
pub use pipeline::{IngestPipeline, PipelineReport, RunReport};
pub use promote::{LayerPromoter, PromotionReport, RefreshTrigger};
pub use publish::{PartitionPublisher, PublishedPartition};
pub use transform::{TransformCommand, TransformStage};
