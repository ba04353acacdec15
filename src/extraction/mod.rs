//! Critical CSS extraction
//!
//! Wraps the call to the external extraction service: request construction,
//! timeout, response classification and the inline size budget.

mod client;

pub use client::{ExtractionClient, DEFAULT_TIMEOUT};

use thiserror::Error;

/// Largest critical CSS that is inlined without a policy warning
pub const DEFAULT_SIZE_BUDGET: usize = 14 * 1024;

/// Errors reported by the extraction service call
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Request to critical CSS server timed out")]
    Timeout,

    #[error("Unexpected response from critical CSS server: {body} (HTTP {code})")]
    UnexpectedStatus { code: u16, body: String },

    #[error("Critical CSS response is unexpectedly empty")]
    EmptyResult,

    #[error("Failed to reach critical CSS server: {0}")]
    Transport(String),

    #[error("Critical CSS is {actual} bytes, over the {limit} byte budget")]
    SizeExceeded { actual: usize, limit: usize },
}

impl ExtractionError {
    /// Policy violations leave a stored result behind; everything else is a
    /// failed call.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::SizeExceeded { .. })
    }
}

/// Critical CSS returned by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCss {
    pub css: String,
    pub size_bytes: usize,
}

impl ExtractedCss {
    pub fn new(css: String) -> Self {
        let size_bytes = css.len();
        Self { css, size_bytes }
    }

    /// Checks the result against the inline size budget
    pub fn check_budget(&self, limit: usize) -> Result<(), ExtractionError> {
        if self.size_bytes > limit {
            return Err(ExtractionError::SizeExceeded {
                actual: self.size_bytes,
                limit,
            });
        }
        Ok(())
    }
}

/// Formats a byte count as kilobytes with two decimals, e.g. `12.35kb`
pub fn format_kb(bytes: usize) -> String {
    format!("{:.2}kb", bytes as f64 / 1000.0)
}
