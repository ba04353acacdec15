//! Generation pipeline
//!
//! This module runs one job per URL and drains the refresh queue:
//! - `JobContext` collects the per-job log transcript
//! - `Generator` renders, extracts, stores and checks one page
//! - `Worker` claims queue entries, runs jobs concurrently and reports outcomes

mod context;
mod generator;
mod worker;

pub use context::JobContext;
pub use generator::{GeneratedCss, Generator};
pub use worker::{DrainReport, Worker};

use crate::extraction::ExtractionError;
use crate::render::RenderError;
use crate::storage::StorageError;
use crate::ConfigError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that end a single generation job
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Source stylesheet not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Unable to read source stylesheet {path}: {source}")]
    SourceRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How the queue should treat a failed job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Retrying cannot help until the configuration changes
    Fatal,
    /// Transient; worth another attempt while budget remains
    Retry,
    /// The result was stored but violates policy
    Soft,
}

impl JobError {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Config(_) | Self::SourceMissing(_) => Disposition::Fatal,
            Self::Extraction(e) if e.is_policy_violation() => Disposition::Soft,
            Self::SourceRead { .. } | Self::Render(_) | Self::Extraction(_) | Self::Storage(_) => {
                Disposition::Retry
            }
        }
    }

    pub fn severity(&self) -> Severity {
        match self.disposition() {
            Disposition::Soft => Severity::Warning,
            Disposition::Fatal | Disposition::Retry => Severity::Danger,
        }
    }

    /// Size of the stored CSS, known only for policy violations
    pub fn size_bytes(&self) -> usize {
        match self {
            Self::Extraction(ExtractionError::SizeExceeded { actual, .. }) => *actual,
            _ => 0,
        }
    }
}

/// Final status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Error,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Success => write!(f, "success"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// How loudly a job outcome is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Good,
    Warning,
    Danger,
}

impl Severity {
    /// Attachment color understood by Slack-compatible webhooks
    pub fn as_color(&self) -> &'static str {
        match self {
            Severity::Good => "good",
            Severity::Warning => "warning",
            Severity::Danger => "danger",
        }
    }
}

/// Outcome of one generation job
///
/// `critical_css` is present exactly when the job succeeded and
/// `error_detail` exactly when it failed.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub url: String,
    pub status: JobStatus,
    pub critical_css: Option<String>,
    pub error_detail: Option<String>,
    pub size_bytes: usize,
    pub duration: Duration,
    pub severity: Severity,
}

impl GenerationResult {
    pub fn success(url: &str, css: String, duration: Duration) -> Self {
        Self {
            url: url.to_string(),
            status: JobStatus::Success,
            size_bytes: css.len(),
            critical_css: Some(css),
            error_detail: None,
            duration,
            severity: Severity::Good,
        }
    }

    pub fn error(
        url: &str,
        error_detail: String,
        severity: Severity,
        size_bytes: usize,
        duration: Duration,
    ) -> Self {
        Self {
            url: url.to_string(),
            status: JobStatus::Error,
            critical_css: None,
            error_detail: Some(error_detail),
            size_bytes,
            duration,
            severity,
        }
    }

    /// Builds the result reported for a finished [`Generator::generate`] call
    pub fn from_job(
        url: &str,
        outcome: &Result<GeneratedCss, JobError>,
        duration: Duration,
    ) -> Self {
        match outcome {
            Ok(generated) => Self::success(url, generated.css.clone(), duration),
            Err(e) => Self::error(url, e.to_string(), e.severity(), e.size_bytes(), duration),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}
