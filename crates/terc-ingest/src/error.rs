//! Ingestion error taxonomy
//!
//! Each pipeline stage fails with its own variant so a run summary can say
//! where a file or layer was lost. Storage adapters speak `anyhow`; the stage
//! that called them folds the chain into the message here.

use terc_common::{Layer, ReportingPeriod, TercError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Discovery failed for {url}: {message}")]
    Discovery { url: String, message: String },

    #[error("Fetch failed for {url}: {cause}")]
    Fetch { url: String, cause: String },

    #[error("Normalize failed: {0}")]
    Normalize(String),

    #[error("Publish failed for period {period}: {message}")]
    Publish {
        period: ReportingPeriod,
        message: String,
    },

    #[error(
        "Raw load incomplete ({failed} file(s) failed{}): first failure at {first_stage}: {first_error}",
        abort_note(.aborted)
    )]
    LoadIncomplete {
        failed: usize,
        aborted: bool,
        first_stage: &'static str,
        first_error: String,
    },

    #[error("Promotion failed for layer {layer}: {message}")]
    Promotion { layer: Layer, message: String },

    #[error("Refresh trigger failed: {0}")]
    RefreshTrigger(String),

    #[error("Transformation failed: {0}")]
    Transform(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Task graph error: {0}")]
    Graph(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Common(#[from] TercError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn abort_note(aborted: &bool) -> &'static str {
    if *aborted {
        ", run aborted"
    } else {
        ""
    }
}

impl IngestError {
    pub fn fetch(url: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            cause: format!("{:#}", cause),
        }
    }

    pub fn publish(period: ReportingPeriod, err: impl std::fmt::Display) -> Self {
        Self::Publish {
            period,
            message: format!("{:#}", err),
        }
    }

    pub fn promotion(layer: Layer, err: impl std::fmt::Display) -> Self {
        Self::Promotion {
            layer,
            message: format!("{:#}", err),
        }
    }

    /// Name of the stage that produced this error, for run summaries
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Discovery { .. } | Self::Pattern(_) => "discovery",
            Self::Fetch { .. } => "fetch",
            Self::Normalize(_) => "normalize",
            Self::Publish { .. } => "publish",
            Self::LoadIncomplete { first_stage, .. } => first_stage,
            Self::Promotion { .. } => "promotion",
            Self::RefreshTrigger(_) => "refresh",
            Self::Transform(_) => "transform",
            Self::Storage(_) => "storage",
            Self::Graph(_) => "graph",
            Self::Config(_) => "config",
            Self::Common(_) | Self::Io(_) => "internal",
        }
    }
}
