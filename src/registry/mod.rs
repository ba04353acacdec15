//! Page registry
//!
//! Holds the configured pages, keyed by normalized absolute URL, together with
//! the stylesheet each one is generated from and the key its critical CSS is
//! stored under.

mod normalize;

pub use normalize::normalize_url;

use crate::config::{Config, PageEntry, StorageMode};
use crate::{ConfigError, UrlError};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use url::Url;

/// A monitored page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    /// Normalized absolute URL
    pub url: String,

    /// Full stylesheet sent for extraction
    pub source_stylesheet_path: PathBuf,

    /// Key the generated CSS is stored under
    pub storage_key: String,

    /// Stylesheet handle rewritten by the inliner
    pub handle: Option<String>,
}

/// Read-only lookup of configured pages
#[derive(Debug, Clone)]
pub struct PageRegistry {
    base: Url,
    pages: Vec<PageConfig>,
    by_url: HashMap<String, usize>,
}

impl PageRegistry {
    /// Builds the registry from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let base = Url::parse(&config.site.base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.site.base_url, e)))?;

        let pages = config
            .pages
            .iter()
            .map(|entry| page_from_entry(&base, entry, config.storage.mode))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(base, pages)
    }

    /// Builds a registry from already-resolved pages
    ///
    /// Page URLs are normalized against `base`; duplicates are rejected.
    pub fn new(base: Url, pages: Vec<PageConfig>) -> Result<Self, ConfigError> {
        let mut normalized = Vec::with_capacity(pages.len());
        let mut by_url = HashMap::new();

        for mut page in pages {
            page.url = normalize_url(&base, &page.url)
                .map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

            if by_url.insert(page.url.clone(), normalized.len()).is_some() {
                return Err(ConfigError::Validation(format!(
                    "Page '{}' is configured more than once",
                    page.url
                )));
            }
            normalized.push(page);
        }

        Ok(Self {
            base,
            pages: normalized,
            by_url,
        })
    }

    /// Normalizes a URL against the site base URL
    pub fn normalize(&self, url: &str) -> Result<String, UrlError> {
        normalize_url(&self.base, url)
    }

    /// Looks up the page for a URL, normalizing it first
    pub fn resolve(&self, url: &str) -> Option<&PageConfig> {
        let key = self.normalize(url).ok()?;
        self.by_url.get(&key).map(|&idx| &self.pages[idx])
    }

    /// Configured page URLs in configuration order
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(|page| page.url.as_str())
    }

    pub fn pages(&self) -> &[PageConfig] {
        &self.pages
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

fn page_from_entry(
    base: &Url,
    entry: &PageEntry,
    mode: StorageMode,
) -> Result<PageConfig, ConfigError> {
    let url =
        normalize_url(base, &entry.url).map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;

    let storage_key = match (&entry.storage_key, &entry.critical, mode) {
        (Some(key), _, _) => key.clone(),
        (None, Some(critical), StorageMode::File) => critical.clone(),
        (None, _, mode) => derive_storage_key(&url, mode),
    };

    Ok(PageConfig {
        url,
        source_stylesheet_path: PathBuf::from(&entry.source),
        storage_key,
        handle: entry.handle.clone(),
    })
}

/// Derives a stable storage key from a normalized URL
///
/// Record mode keys look like `critical_css_<hash>`; file mode keys are
/// `<hash>.css` file names.
pub fn derive_storage_key(url: &str, mode: StorageMode) -> String {
    let digest = hex::encode(Sha256::digest(url.as_bytes()));
    let short = &digest[..16];
    match mode {
        StorageMode::Record => format!("critical_css_{}", short),
        StorageMode::File => format!("{}.css", short),
    }
}
