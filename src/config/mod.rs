//! Configuration module for critpath
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use critpath::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("critpath.toml")).unwrap();
//! println!("Monitoring {} pages", config.pages.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, EmailConfig, ExtractionConfig, NotifyConfig, PageEntry, QueueConfig, RenderConfig,
    ServerConfig, SiteConfig, StorageConfig, StorageMode,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
