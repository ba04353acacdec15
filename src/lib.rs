//! critpath: critical CSS generation and refresh queue
//!
//! This crate renders configured pages, sends their HTML and stylesheet to an
//! external critical-CSS extraction service, stores the returned CSS, and keeps
//! a durable queue of pages waiting to be regenerated.

pub mod config;
pub mod extraction;
pub mod inline;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod render;
pub mod storage;
pub mod trigger;

use thiserror::Error;

/// Main error type for critpath operations
#[derive(Debug, Error)]
pub enum CritError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Generation failed: {0}")]
    Job(#[from] pipeline::JobError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// Besides problems with the configuration file itself, this covers jobs that
/// cannot run because the configuration does not describe them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No config found for {0}")]
    NoPageConfig(String),

    #[error("Extraction endpoint is not configured")]
    MissingEndpoint,
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),
}

/// Result type alias for critpath operations
pub type Result<T> = std::result::Result<T, CritError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use pipeline::{GenerationResult, Generator, JobContext, Worker};
pub use queue::RefreshQueue;
pub use registry::{PageConfig, PageRegistry};
