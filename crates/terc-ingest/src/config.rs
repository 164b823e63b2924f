//! Ingestion configuration
//!
//! Built once by the binary from the environment (`.env` is loaded first) and
//! passed down as a value; nothing below `main` reads environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::DEFAULT_INDEX_URL;
use crate::error::{IngestError, Result};
use crate::fetch::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::transform::DEFAULT_PROGRAM;

pub const DEFAULT_WORKING_DB: &str = "dbt_pipeline/terceirizados.duckdb";
pub const DEFAULT_DBT_PROJECT_DIR: &str = "dbt_pipeline";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 1;

/// What a run does after one file fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next file
    #[default]
    Continue,
    /// Stop starting new files after the first failure
    Abort,
}

impl std::str::FromStr for FailurePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(IngestError::Config(format!("unknown failure policy: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Portal page listing the monthly files
    pub index_url: String,
    /// Where downloads are staged before parsing
    pub staging_dir: PathBuf,
    /// DuckDB file dbt materializes the derived layers into
    pub working_db: PathBuf,
    pub dbt_program: String,
    pub dbt_project_dir: PathBuf,
    pub dbt_profiles_dir: PathBuf,
    /// Serving API refresh endpoint, called after promotion
    pub refresh_url: Option<String>,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub max_concurrent_files: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            index_url: DEFAULT_INDEX_URL.to_string(),
            staging_dir: env::temp_dir().join("terc-staging"),
            working_db: PathBuf::from(DEFAULT_WORKING_DB),
            dbt_program: DEFAULT_PROGRAM.to_string(),
            dbt_project_dir: PathBuf::from(DEFAULT_DBT_PROJECT_DIR),
            dbt_profiles_dir: PathBuf::from(DEFAULT_DBT_PROJECT_DIR),
            refresh_url: None,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            failure_policy: FailurePolicy::Continue,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| IngestError::Config(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

impl IngestConfig {
    /// Defaults overridden by `TERC_*` variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("TERC_INDEX_URL") {
            config.index_url = url;
        }
        if let Ok(dir) = env::var("TERC_STAGING_DIR") {
            config.staging_dir = PathBuf::from(dir);
        }
        if let Ok(path) = env::var("TERC_WORKING_DB") {
            config.working_db = PathBuf::from(path);
        }
        if let Ok(program) = env::var("TERC_DBT_PROGRAM") {
            config.dbt_program = program;
        }
        if let Ok(dir) = env::var("TERC_DBT_PROJECT_DIR") {
            config.dbt_project_dir = PathBuf::from(&dir);
            config.dbt_profiles_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("TERC_DBT_PROFILES_DIR") {
            config.dbt_profiles_dir = PathBuf::from(dir);
        }
        config.refresh_url = env::var("TERC_REFRESH_URL").ok().filter(|u| !u.is_empty());

        let attempts = parse_env::<u32>("TERC_FETCH_MAX_ATTEMPTS")?.unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let delay = parse_env::<u64>("TERC_FETCH_RETRY_DELAY_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_DELAY);
        config.retry = match env::var("TERC_FETCH_BACKOFF").as_deref() {
            Ok("exponential") => RetryPolicy::exponential(attempts, delay, delay * 16),
            _ => RetryPolicy::fixed(attempts, delay),
        };

        if let Some(secs) = parse_env::<u64>("TERC_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_env::<usize>("TERC_MAX_CONCURRENT_FILES")? {
            config.max_concurrent_files = n;
        }
        if let Some(policy) = parse_env::<FailurePolicy>("TERC_FAILURE_POLICY")? {
            config.failure_policy = policy;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.index_url.starts_with("http://") || self.index_url.starts_with("https://")) {
            return Err(IngestError::Config(format!(
                "index URL must be http(s): {}",
                self.index_url
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(IngestError::Config("fetch max attempts must be at least 1".into()));
        }
        if self.max_concurrent_files == 0 {
            return Err(IngestError::Config("max concurrent files must be at least 1".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(IngestError::Config("request timeout must be positive".into()));
        }
        if self.dbt_program.trim().is_empty() {
            return Err(IngestError::Config("transformation program must be set".into()));
        }
        Ok(())
    }

    /// HTTP client shared by discovery, downloads and the refresh trigger
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .user_agent(concat!("terc-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {}", e)))
    }
}
