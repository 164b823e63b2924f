//! Object storage
//!
//! Partitions and layer snapshots go through the [`ObjectStore`] trait. Two
//! backends implement it: [`S3Storage`] for S3-compatible services (AWS,
//! MinIO) and [`LocalStorage`], a plain directory tree used for offline runs
//! and tests.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    types::{BucketLocationConstraint, CreateBucketConfiguration},
    Client,
};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

pub mod config;

pub use config::StorageConfig;

/// Result of writing one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: u64,
}

/// Whole-object key/value store. Every write replaces the object at `key`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<UploadResult>;

    /// Upload a local file without buffering it in memory
    async fn put_file(&self, key: &str, path: &Path) -> Result<UploadResult>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write the object at `key` to `dest`, returning the byte count
    async fn download_to(&self, key: &str, dest: &Path) -> Result<u64>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Create the backing container if missing. Returns true when it was created.
    async fn ensure_bucket(&self) -> Result<bool> {
        Ok(false)
    }

    /// Human-readable location of `key`, for logs
    fn describe(&self, key: &str) -> String;
}

/// Build the backend selected by `config`
pub async fn connect(config: StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    config.validate()?;
    match config.local_root {
        Some(root) => Ok(Arc::new(LocalStorage::new(root).await?)),
        None => Ok(Arc::new(S3Storage::new(config).await?)),
    }
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
}

impl S3Storage {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!(
            bucket = %config.bucket,
            endpoint = ?config.endpoint,
            region = %config.region,
            "Initializing S3 storage"
        );

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "terc-storage",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket);

        Ok(Self {
            client,
            bucket: config.bucket,
            region: config.region,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self, data), fields(bucket = %self.bucket))]
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<UploadResult> {
        let checksum = sha256_hex(&data);
        let size = data.len() as u64;

        debug!("Uploading {} bytes to s3://{}/{}", size, self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to upload to S3: {}", key))?;

        info!("Uploaded s3://{}/{}", self.bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn put_file(&self, key: &str, path: &Path) -> Result<UploadResult> {
        let (checksum, size) = sha256_file(path.to_path_buf()).await?;
        let body = ByteStream::from_path(path)
            .await
            .with_context(|| format!("Failed to open {} for upload", path.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_length(size as i64)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to upload file to S3: {}", key))?;

        info!(size, "Uploaded {} to s3://{}/{}", path.display(), self.bucket, key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download from S3: {}", key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);
        Ok(data)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn download_to(&self, key: &str, dest: &Path) -> Result<u64> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download from S3: {}", key))?;

        let mut body = response.body;
        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .context("Failed to read S3 response body")?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        debug!("Downloaded {} bytes from s3://{}/{} to {}", written, self.bucket, key, dest.display());
        Ok(written)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow!("Failed to check S3 object existence: {}", service_error))
                }
            },
        }
    }

    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn ensure_bucket(&self) -> Result<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!("Bucket {} already exists", self.bucket);
                return Ok(false);
            },
            Err(e) => {
                let service_error = e.into_service_error();
                if !service_error.is_not_found() {
                    bail!("Failed to check bucket {}: {}", self.bucket, service_error);
                }
            },
        }

        let mut request = self.client.create_bucket().bucket(&self.bucket);
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .with_context(|| format!("Failed to create bucket {}", self.bucket))?;

        info!(region = %self.region, "Created bucket {}", self.bucket);
        Ok(true)
    }

    fn describe(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

/// Stores objects as files under a root directory.
///
/// Writes land in a sibling temporary file first and are renamed into place,
/// so a reader never sees a half-written object.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create storage root {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` under the root, rejecting absolute keys and `..`
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid object key: {:?}", key);
        }
        Ok(self.root.join(relative))
    }

    async fn prepare(&self, key: &str) -> Result<(PathBuf, PathBuf)> {
        let target = self.path_for(key)?;
        let parent = target
            .parent()
            .ok_or_else(|| anyhow!("Object key has no parent: {}", key))?;
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = parent.join(format!(".{}.partial", file_name));
        Ok((target, partial))
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    #[instrument(skip(self, data))]
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<UploadResult> {
        let (target, partial) = self.prepare(key).await?;
        let checksum = sha256_hex(&data);
        let size = data.len() as u64;

        tokio::fs::write(&partial, &data)
            .await
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        tokio::fs::rename(&partial, &target)
            .await
            .with_context(|| format!("Failed to move object into place: {}", target.display()))?;

        debug!("Stored {} bytes at {}", size, target.display());
        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self))]
    async fn put_file(&self, key: &str, path: &Path) -> Result<UploadResult> {
        let (target, partial) = self.prepare(key).await?;
        let (checksum, size) = sha256_file(path.to_path_buf()).await?;

        tokio::fs::copy(path, &partial)
            .await
            .with_context(|| format!("Failed to copy {}", path.display()))?;
        tokio::fs::rename(&partial, &target)
            .await
            .with_context(|| format!("Failed to move object into place: {}", target.display()))?;

        debug!("Stored {} bytes at {}", size, target.display());
        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read object {}", path.display()))
    }

    async fn download_to(&self, key: &str, dest: &Path) -> Result<u64> {
        let path = self.path_for(key)?;
        tokio::fs::copy(&path, dest)
            .await
            .with_context(|| format!("Failed to copy object {} to {}", path.display(), dest.display()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    fn describe(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

async fn sha256_file(path: PathBuf) -> Result<(String, u64)> {
    tokio::task::spawn_blocking(move || -> Result<(String, u64)> {
        use sha2::{Digest, Sha256};
        use std::io::Read;

        let mut file = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        let mut size = 0u64;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        Ok((format!("{:x}", hasher.finalize()), size))
    })
    .await
    .context("Checksum task panicked")?
}
