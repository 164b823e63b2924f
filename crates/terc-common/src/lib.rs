//! Terceirizados Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, storage adapters, and error handling for the terceirizados
//! ingestion pipeline and its serving API.
//!
//! # Overview
//!
//! - **Types**: reporting periods, source files, transformation layers
//! - **Layout**: object-store key conventions for raw partitions and layer snapshots
//! - **Storage**: the [`storage::ObjectStore`] trait with S3 and local-directory backends
//! - **Logging**: centralized `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use terc_common::{layout, ReportingPeriod};
//!
//! let period: ReportingPeriod = "2024-03".parse()?;
//! assert_eq!(
//!     layout::raw_partition_key(&period),
//!     "terceirizados/raw/mes_referencia=2024-03-01/terceirizados.parquet"
//! );
//! # Ok::<(), terc_common::TercError>(())
//! ```

pub mod error;
pub mod layout;
pub mod logging;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TercError};
pub use types::{FileKind, Layer, ReportingPeriod, SourceFile};
