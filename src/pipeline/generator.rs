use crate::config::Config;
use crate::extraction::{format_kb, ExtractionClient, DEFAULT_SIZE_BUDGET};
use crate::pipeline::{JobContext, JobError};
use crate::registry::PageRegistry;
use crate::render::{build_http_client, HttpRenderer, RenderError, Renderer};
use crate::storage::CssStore;
use crate::ConfigError;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Critical CSS produced and stored by a successful job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCss {
    pub url: String,
    pub storage_key: String,

    /// Where the CSS was written, as reported by the store
    pub location: String,

    pub css: String,
}

/// Runs generation jobs against injected collaborators
pub struct Generator {
    registry: Arc<PageRegistry>,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn CssStore>,
    extraction: Option<ExtractionClient>,
    size_budget: usize,
    render_timeout: Duration,
}

impl Generator {
    /// Creates a generator; `extraction` is `None` while no endpoint is configured
    pub fn new(
        registry: Arc<PageRegistry>,
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn CssStore>,
        extraction: Option<ExtractionClient>,
    ) -> Self {
        Self {
            registry,
            renderer,
            store,
            extraction,
            size_budget: DEFAULT_SIZE_BUDGET,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    /// Builds the HTTP renderer and extraction client described by `config`
    pub fn from_config(
        config: &Config,
        registry: Arc<PageRegistry>,
        store: Arc<dyn CssStore>,
    ) -> Result<Self, reqwest::Error> {
        let render_timeout = Duration::from_secs(config.render.timeout_secs);
        let client = build_http_client(&config.render.user_agent, render_timeout)?;

        let extraction = match &config.extraction.endpoint {
            Some(endpoint) => Some(ExtractionClient::new(
                endpoint.clone(),
                Duration::from_secs(config.extraction.timeout_secs),
            )?),
            None => None,
        };

        Ok(Self::new(
            registry,
            Arc::new(HttpRenderer::new(client)),
            store,
            extraction,
        )
        .with_size_budget(config.extraction.size_budget_bytes)
        .with_render_timeout(render_timeout))
    }

    pub fn with_size_budget(mut self, bytes: usize) -> Self {
        self.size_budget = bytes;
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &PageRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn CssStore> {
        &self.store
    }

    /// Generates and stores critical CSS for one URL
    ///
    /// An unknown URL fails before any request is made or anything is
    /// written. A result over the size budget is stored and then reported as
    /// [`ExtractionError::SizeExceeded`](crate::extraction::ExtractionError::SizeExceeded).
    pub async fn generate(
        &self,
        url: &str,
        ctx: &mut JobContext,
    ) -> Result<GeneratedCss, JobError> {
        let page = self
            .registry
            .resolve(url)
            .ok_or_else(|| ConfigError::NoPageConfig(url.to_string()))?;

        let extraction = self
            .extraction
            .as_ref()
            .ok_or(ConfigError::MissingEndpoint)?;

        let path = &page.source_stylesheet_path;
        let stylesheet = match tokio::fs::read_to_string(path).await {
            Ok(css) => css,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(JobError::SourceMissing(path.clone()));
            }
            Err(e) => {
                return Err(JobError::SourceRead {
                    path: path.clone(),
                    source: e,
                });
            }
        };

        ctx.log(format!("Rendering output for {}", page.url));
        let html = tokio::time::timeout(self.render_timeout, self.renderer.render(&page.url))
            .await
            .map_err(|_| RenderError::Timeout {
                url: page.url.clone(),
            })??;

        ctx.log(format!(
            "Posting output ({}) and stylesheet ({}) to {}",
            format_kb(html.len()),
            format_kb(stylesheet.len()),
            extraction.endpoint()
        ));
        let extracted = extraction.extract(&html, &stylesheet).await?;

        self.store.put(&page.storage_key, &extracted.css)?;
        let location = self.store.describe(&page.storage_key);
        ctx.log(format!(
            "Saved critical css ({}) to {}",
            format_kb(extracted.size_bytes),
            location
        ));

        extracted.check_budget(self.size_budget)?;

        Ok(GeneratedCss {
            url: page.url.clone(),
            storage_key: page.storage_key.clone(),
            location,
            css: extracted.css,
        })
    }
}
