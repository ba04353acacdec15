//! critpath main entry point
//!
//! This is the command-line interface for generating and refreshing critical CSS.

use clap::{Parser, Subcommand};
use critpath::config::{load_config_with_hash, Config};
use critpath::inline::inline_critical_css;
use critpath::notify::Notifier;
use critpath::pipeline::{Generator, Worker};
use critpath::queue::RefreshQueue;
use critpath::registry::PageRegistry;
use critpath::storage::{open_store, CssStore, Database};
use critpath::trigger::{self, TriggerState};
use critpath::ConfigError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// critpath: critical CSS generation and refresh queue
///
/// Renders configured pages, extracts their critical CSS through an external
/// service, and stores the result for inlining.
#[derive(Parser, Debug)]
#[command(name = "critpath")]
#[command(version)]
#[command(about = "Critical CSS generation and refresh queue", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate critical CSS for one page right away
    Generate {
        /// Page URL (defaults to the site base URL)
        #[arg(long)]
        url: Option<String>,
    },

    /// Delete the stored critical CSS of every configured page
    Clear,

    /// Print the refresh trigger URL
    RefreshWebhook,

    /// Serve the refresh trigger and drain the queue on a schedule
    Serve,

    /// Process every queued refresh job, then exit
    Drain,

    /// Show queue statistics and permanent failures
    Status,

    /// Print the critical CSS stored for a page
    Show {
        #[arg(long)]
        url: String,

        /// HTML document to print with the critical CSS inlined instead
        #[arg(long, value_name = "FILE")]
        html: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let app = App::open(config)?;

    match cli.command {
        Command::Generate { url } => handle_generate(&app, url).await,
        Command::Clear => handle_clear(&app),
        Command::RefreshWebhook => handle_refresh_webhook(&app),
        Command::Serve => handle_serve(&app).await,
        Command::Drain => handle_drain(&app).await,
        Command::Status => handle_status(&app),
        Command::Show { url, html } => handle_show(&app, &url, html.as_deref()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("critpath=info,warn"),
            1 => EnvFilter::new("critpath=debug,info"),
            2 => EnvFilter::new("critpath=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Components shared by every command
struct App {
    config: Config,
    db: Arc<Database>,
    registry: Arc<PageRegistry>,
    store: Arc<dyn CssStore>,
}

impl App {
    fn open(config: Config) -> Result<Self, critpath::CritError> {
        let db = Arc::new(Database::open(Path::new(&config.queue.database_path))?);
        let registry = Arc::new(PageRegistry::from_config(&config)?);
        let store = open_store(&config.storage, db.clone())?;
        tracing::debug!("{} pages configured", registry.len());

        Ok(Self {
            config,
            db,
            registry,
            store,
        })
    }

    fn queue(&self) -> Arc<RefreshQueue> {
        Arc::new(RefreshQueue::from_config(self.db.clone(), &self.config))
    }

    fn generator(&self) -> Result<Generator, reqwest::Error> {
        Generator::from_config(&self.config, self.registry.clone(), self.store.clone())
    }

    fn worker(&self, wait_for_notifications: bool) -> Result<Worker, reqwest::Error> {
        Ok(Worker::new(
            self.queue(),
            Arc::new(self.generator()?),
            Notifier::from_config(&self.config.notify)?,
        )
        .with_batch_size(self.config.queue.batch_size as usize)
        .with_workers(self.config.queue.workers as usize)
        .wait_for_notifications(wait_for_notifications))
    }
}

/// Handles `generate`: runs one job now, claiming the page in the queue
async fn handle_generate(app: &App, url: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let url = url.unwrap_or_else(|| app.config.site.base_url.clone());
    let worker = app.worker(true)?;

    match worker.generate_now(&url).await? {
        Ok(generated) => {
            println!(
                "✓ Generated critical CSS for {} ({} bytes)",
                generated.url,
                generated.css.len()
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("{}", e);
            Err(e.into())
        }
    }
}

/// Handles `clear`: deletes stored critical CSS for every page
fn handle_clear(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    for page in app.registry.pages() {
        if app.store.delete(&page.storage_key)? {
            println!(
                "Deleted critical css at {}",
                app.store.describe(&page.storage_key)
            );
        }
    }
    println!("✓ Cleared critical CSS");
    Ok(())
}

/// Handles `refresh-webhook`: prints the trigger URL, creating the key if needed
fn handle_refresh_webhook(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let key = trigger::trigger_key(&app.db)?;
    let url = trigger::trigger_url(app.registry.base_url(), &key)?;
    println!("{}", url);
    Ok(())
}

/// Handles `serve`: trigger endpoint plus scheduled drains until interrupted
async fn handle_serve(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let worker = Arc::new(app.worker(false)?);
    let recovered = worker.queue().recover_in_flight()?;
    if recovered > 0 {
        tracing::info!("Returned {} interrupted jobs to the queue", recovered);
    }

    let key = trigger::trigger_key(&app.db)?;
    tracing::info!("Refresh trigger path: {}", trigger::trigger_path(&key));
    let state = TriggerState {
        worker: worker.clone(),
        key: Arc::from(key.as_str()),
    };

    let tick = Duration::from_secs(app.config.queue.tick_secs);
    tokio::select! {
        served = trigger::serve(&app.config.server.bind, state) => served?,
        _ = worker.clone().run(tick) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }
    Ok(())
}

/// Handles `drain`: processes the queue once in the foreground
async fn handle_drain(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let worker = app.worker(true)?;
    let recovered = worker.queue().recover_in_flight()?;
    if recovered > 0 {
        tracing::info!("Returned {} interrupted jobs to the queue", recovered);
    }

    let report = worker.drain().await?;
    println!("=== Drain Report ===\n");
    println!("  Succeeded:   {}", report.succeeded);
    println!("  Over budget: {}", report.warned);
    println!("  Retrying:    {}", report.retried);
    println!("  Abandoned:   {}", report.abandoned);
    Ok(())
}

/// Handles `status`: prints queue state and stored CSS per page
fn handle_status(app: &App) -> Result<(), Box<dyn std::error::Error>> {
    let queue = app.queue();
    let stats = queue.stats()?;

    println!("Database: {}\n", app.config.queue.database_path);
    println!("Queue:");
    println!("  Pending: {}", stats.pending);
    println!("  In flight: {}", stats.in_flight);
    println!("  Permanent failures: {}", stats.permanent_failures);

    println!("\nPages ({}):", app.registry.len());
    for page in app.registry.pages() {
        match app.store.get(&page.storage_key)? {
            Some(stored) => println!(
                "  - {} ({} bytes, updated {})",
                page.url,
                stored.css.len(),
                stored.updated_at.format("%Y-%m-%d %H:%M:%S")
            ),
            None => println!("  - {} (not generated)", page.url),
        }
    }

    let failures = queue.permanent_failures()?;
    if !failures.is_empty() {
        println!("\nPermanent failures:");
        for failure in failures {
            println!(
                "  - {} after {} attempt(s) at {}: {}",
                failure.url,
                failure.attempts,
                failure.failed_at.format("%Y-%m-%d %H:%M:%S"),
                failure.error
            );
        }
    }
    Ok(())
}

/// Handles `show`: prints stored CSS, or a document with it inlined
fn handle_show(app: &App, url: &str, html: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let page = app
        .registry
        .resolve(url)
        .ok_or_else(|| ConfigError::NoPageConfig(url.to_string()))?;

    if let Some(path) = html {
        let document = std::fs::read_to_string(path)?;
        print!("{}", inline_critical_css(&document, page, app.store.as_ref())?);
        return Ok(());
    }

    match app.store.get(&page.storage_key)? {
        Some(stored) => println!("{}", stored.css),
        None => println!("No critical CSS stored for {}", page.url),
    }
    Ok(())
}
