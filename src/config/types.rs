use serde::Deserialize;

/// Main configuration structure for critpath
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub render: RenderConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default, rename = "page")]
    pub pages: Vec<PageEntry>,
}

/// The site whose pages are monitored
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Base URL used to resolve relative page URLs
    #[serde(rename = "base-url")]
    pub base_url: String,
}

/// Critical CSS extraction service
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Endpoint of the extraction service; jobs fail while unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_extraction_timeout")]
    pub timeout_secs: u64,

    /// Largest critical CSS accepted without a policy warning
    #[serde(rename = "size-budget-bytes", default = "default_size_budget")]
    pub size_budget_bytes: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: default_extraction_timeout(),
            size_budget_bytes: default_size_budget(),
        }
    }
}

/// Page rendering
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    #[serde(rename = "timeout-secs", default = "default_render_timeout")]
    pub timeout_secs: u64,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_render_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Where generated critical CSS is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One flat file per page
    File,
    /// One key-value record per page in the database
    Record,
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub mode: StorageMode,

    /// Root directory for file mode
    #[serde(default)]
    pub directory: Option<String>,
}

/// Refresh queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Path to the SQLite database holding the queue, records and settings
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Attempts per URL before it is recorded as a permanent failure
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds a failed entry waits before a later drain may retry it
    #[serde(rename = "retry-delay-secs", default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Entries claimed per drain round
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// Jobs processed concurrently
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Seconds between scheduled drains in `serve` mode
    #[serde(rename = "tick-secs", default = "default_tick_secs")]
    pub tick_secs: u64,
}

/// Trigger endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Notification channels; every channel is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// Incoming webhook URL of a Slack-compatible chat
    #[serde(rename = "slack-webhook", default)]
    pub slack_webhook: Option<String>,

    #[serde(default)]
    pub email: Option<EmailConfig>,
}

/// Transactional mail API settings
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Mail API endpoint, e.g. `https://api.postmarkapp.com/email`
    pub endpoint: String,

    /// Server token sent with every request
    pub token: String,

    pub from: String,

    pub to: String,
}

/// One monitored page
#[derive(Debug, Clone, Deserialize)]
pub struct PageEntry {
    /// Absolute URL, or a path resolved against the site base URL
    pub url: String,

    /// Full stylesheet sent to the extraction service
    pub source: String,

    /// Destination file for file mode, relative to the storage directory
    #[serde(default)]
    pub critical: Option<String>,

    /// Explicit storage key overriding the derived one
    #[serde(rename = "storage-key", default)]
    pub storage_key: Option<String>,

    /// Handle of the stylesheet whose tag gets the inline CSS
    #[serde(default)]
    pub handle: Option<String>,
}

fn default_extraction_timeout() -> u64 {
    90
}

fn default_size_budget() -> usize {
    14 * 1024
}

fn default_render_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("critpath/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_batch_size() -> u32 {
    4
}

fn default_workers() -> u32 {
    2
}

fn default_tick_secs() -> u64 {
    300
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
