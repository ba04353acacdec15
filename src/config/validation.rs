use crate::config::types::{
    Config, EmailConfig, ExtractionConfig, NotifyConfig, PageEntry, QueueConfig, StorageConfig,
    StorageMode,
};
use crate::registry::normalize_url;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let base = validate_base_url(&config.site.base_url)?;
    validate_extraction_config(&config.extraction)?;
    validate_storage_config(&config.storage)?;
    validate_queue_config(&config.queue)?;
    validate_notify_config(&config.notify)?;
    validate_pages(&base, &config.pages)?;
    Ok(())
}

fn validate_base_url(base_url: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url '{}': {}", base_url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    Ok(url)
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    // A missing endpoint is allowed here and surfaces per job instead.
    if let Some(endpoint) = &config.endpoint {
        Url::parse(endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid extraction endpoint '{}': {}", endpoint, e))
        })?;
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "extraction timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.size_budget_bytes == 0 {
        return Err(ConfigError::Validation(
            "size-budget-bytes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.mode == StorageMode::File
        && config.directory.as_deref().map_or(true, str::is_empty)
    {
        return Err(ConfigError::Validation(
            "storage directory is required when mode = \"file\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.batch_size < 1 || config.batch_size > 100 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be between 1 and 100, got {}",
            config.batch_size
        )));
    }

    if config.workers < 1 || config.workers > 32 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 32, got {}",
            config.workers
        )));
    }

    if config.tick_secs < 1 {
        return Err(ConfigError::Validation(
            "tick-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_notify_config(config: &NotifyConfig) -> Result<(), ConfigError> {
    if let Some(webhook) = &config.slack_webhook {
        Url::parse(webhook)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid slack-webhook: {}", e)))?;
    }

    if let Some(email) = &config.email {
        validate_email_config(email)?;
    }

    Ok(())
}

fn validate_email_config(config: &EmailConfig) -> Result<(), ConfigError> {
    Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid email endpoint: {}", e)))?;

    if config.token.is_empty() {
        return Err(ConfigError::Validation(
            "email token cannot be empty".to_string(),
        ));
    }

    validate_email(&config.from)?;
    validate_email(&config.to)?;
    Ok(())
}

fn validate_pages(base: &Url, pages: &[PageEntry]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for page in pages {
        if page.source.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Page '{}' must name a source stylesheet",
                page.url
            )));
        }

        let normalized = normalize_url(base, &page.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid page URL '{}': {}", page.url, e)))?;

        if !seen.insert(normalized.clone()) {
            return Err(ConfigError::Validation(format!(
                "Page '{}' is configured more than once",
                normalized
            )));
        }
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "email address cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
