//! Resilient file download
//!
//! Portal downloads are large and the portal is flaky, so a [`Fetcher`]
//! streams each response straight to a staging file through a bounded buffer
//! and retries according to a [`RetryPolicy`]. The retry schedule is a plain
//! value so it can be inspected without touching the network.

use anyhow::{anyhow, Context};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use crate::error::{IngestError, Result};

/// Write buffer between the response stream and the staging file
pub const CHUNK_SIZE: usize = 8 * 1024;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How the wait between attempts grows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry
    Fixed,
    /// Delay doubles after each failure, capped at `max_delay`
    Exponential { max_delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Exponential { max_delay },
        }
    }

    /// Wait before the next attempt once attempt number `attempt` (1-based)
    /// has failed; `None` when that was the last attempt.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        match self.backoff {
            Backoff::Fixed => Some(self.base_delay),
            Backoff::Exponential { max_delay } => {
                let factor = 2u32.saturating_pow(attempt - 1);
                Some(self.base_delay.saturating_mul(factor).min(max_delay))
            },
        }
    }

    /// Every wait the policy allows, in order
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .filter_map(|attempt| self.delay_after(attempt))
            .collect()
    }
}

/// A completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Download `url` into `staging_path`, retrying per the policy.
    ///
    /// A partially written staging file never survives a failed attempt.
    #[instrument(skip(self, staging_path), fields(url = %url))]
    pub async fn fetch(&self, url: &str, staging_path: &Path) -> Result<FetchedFile> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.fetch_once(url, staging_path).await {
                Ok(bytes) => {
                    info!(bytes, attempt, "Downloaded {}", url);
                    return Ok(FetchedFile {
                        path: staging_path.to_path_buf(),
                        bytes,
                    });
                },
                Err(e) => {
                    discard_partial(staging_path).await;
                    warn!("Download attempt {}/{} failed: {:#}", attempt, attempts, e);
                    last_error = Some(e);

                    if let Some(delay) = self.policy.delay_after(attempt) {
                        debug!("Retrying in {:?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }

        let cause = last_error.unwrap_or_else(|| anyhow!("no download attempt was made"));
        Err(IngestError::fetch(url, cause))
    }

    async fn fetch_once(&self, url: &str, staging_path: &Path) -> anyhow::Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("request failed")?
            .error_for_status()
            .context("server returned an error status")?;

        let file = tokio::fs::File::create(staging_path)
            .await
            .with_context(|| format!("failed to create {}", staging_path.display()))?;
        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("failed to read response body")?;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        Ok(written)
    }
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial download {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!("Failed to remove partial download {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.schedule(), vec![DEFAULT_RETRY_DELAY; 4]);
    }

    #[test]
    fn test_fixed_schedule() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
        assert_eq!(policy.delay_after(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(3), None);
        assert_eq!(policy.delay_after(0), None);
    }

    #[test]
    fn test_exponential_schedule_is_capped() {
        let policy =
            RetryPolicy::exponential(6, Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn test_single_attempt_never_waits() {
        assert!(RetryPolicy::fixed(1, Duration::from_secs(1)).schedule().is_empty());
    }
}
