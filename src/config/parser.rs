use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so that operators can tell which configuration a
/// running worker was started with.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID: &str = r#"
[site]
base-url = "https://example.com"

[extraction]
endpoint = "https://critical.example.net/"

[storage]
mode = "record"

[queue]
database-path = "./critpath.db"

[notify]
slack-webhook = "https://hooks.slack.com/services/T000/B000/XXX"

[[page]]
url = "/"
source = "themes/site/style.css"
handle = "site-style"

[[page]]
url = "https://example.com/about/"
source = "themes/site/style.css"
storage-key = "about"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.site.base_url, "https://example.com");
        assert_eq!(config.storage.mode, StorageMode::Record);
        assert_eq!(config.pages.len(), 2);
        assert_eq!(config.pages[0].handle.as_deref(), Some("site-style"));
        assert_eq!(config.pages[1].storage_key.as_deref(), Some("about"));
    }

    #[test]
    fn test_defaults_applied() {
        let config = parse_config(VALID).unwrap();

        assert_eq!(config.extraction.timeout_secs, 90);
        assert_eq!(config.extraction.size_budget_bytes, 14 * 1024);
        assert_eq!(config.queue.max_attempts, 3);
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.queue.retry_delay_secs, 60);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert!(config.notify.email.is_none());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/critpath.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_storage_mode_rejected() {
        let content = VALID.replace("mode = \"record\"", "mode = \"redis\"");
        assert!(matches!(parse_config(&content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
