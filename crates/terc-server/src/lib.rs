//! Terceirizados Server Library
//!
//! Read-only HTTP API over the gold layer. The gold snapshot is a DuckDB file
//! published by the ingest pipeline; this crate keeps a local copy of it
//! ([`snapshot`]), queries it ([`queries`]) and serves it ([`routes`]).

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod error;
pub mod queries;
pub mod routes;
pub mod snapshot;

pub use config::ServerConfig;
pub use error::AppError;
pub use routes::{create_router, AppState};
pub use snapshot::{LoadOutcome, SnapshotError, SnapshotLoader};
