use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::{Result, TercError};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_BUCKET: &str = "terceirizados";

/// Object storage settings shared by the pipeline and the API.
///
/// When `local_root` is set every key is stored under that directory instead
/// of a bucket, which is how tests and offline runs work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    #[serde(skip_serializing, default)]
    pub secret_key: String,
    pub path_style: bool,
    pub local_root: Option<PathBuf>,
}

impl StorageConfig {
    /// Read `S3_*` variables, falling back to the standard `AWS_*` names.
    ///
    /// `TERC_STORAGE_DIR` switches to the local-directory backend.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            region: env::var("S3_REGION")
                .or_else(|_| env::var("AWS_REGION"))
                .unwrap_or_else(|_| DEFAULT_REGION.to_string()),
            bucket: env::var("S3_BUCKET")
                .or_else(|_| env::var("BUCKET_NAME"))
                .unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
            access_key: env::var("S3_ACCESS_KEY")
                .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
                .unwrap_or_default(),
            secret_key: env::var("S3_SECRET_KEY")
                .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_default(),
            path_style: env::var("S3_PATH_STYLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            local_root: env::var("TERC_STORAGE_DIR").ok().map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: DEFAULT_REGION.to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            local_root: None,
        }
    }

    pub fn for_local(root: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            path_style: false,
            local_root: Some(root.into()),
        }
    }

    pub fn is_local(&self) -> bool {
        self.local_root.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_local() {
            return Ok(());
        }
        if self.bucket.trim().is_empty() {
            return Err(TercError::Config("bucket must not be empty".to_string()));
        }
        if self.region.trim().is_empty() {
            return Err(TercError::Config("region must not be empty".to_string()));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(TercError::Config(
                "S3 credentials are required (S3_ACCESS_KEY/S3_SECRET_KEY or AWS_*)".to_string(),
            ));
        }
        Ok(())
    }
}
