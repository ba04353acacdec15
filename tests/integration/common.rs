use critpath::config::{parse_config, Config};
use critpath::notify::Notifier;
use critpath::pipeline::{DrainReport, Generator, Worker};
use critpath::queue::RefreshQueue;
use critpath::registry::PageRegistry;
use critpath::storage::{open_store, CssStore, Database};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Everything a test needs, built the same way the binary builds it
pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub db: Arc<Database>,
    pub registry: Arc<PageRegistry>,
    pub store: Arc<dyn CssStore>,
    pub queue: Arc<RefreshQueue>,
}

impl Harness {
    pub fn generator(&self) -> Generator {
        Generator::from_config(&self.config, self.registry.clone(), self.store.clone())
            .expect("Failed to build generator")
    }

    pub fn worker(&self) -> Worker {
        Worker::new(
            self.queue.clone(),
            Arc::new(self.generator()),
            Notifier::from_config(&self.config.notify).expect("Failed to build notifier"),
        )
        .with_batch_size(self.config.queue.batch_size as usize)
        .with_workers(self.config.queue.workers as usize)
        .wait_for_notifications(true)
    }
}

/// Writes a config pointing at `server` and builds the harness from it
///
/// Pages `/` (key `home`) and `/about/` are configured; `extra` is appended
/// to the generated TOML.
pub fn harness(server: &MockServer, storage_mode: &str, extra: &str) -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let source = dir.path().join("style.css");
    std::fs::write(&source, "p{color:red}.unused{margin:0}").expect("Failed to write stylesheet");

    let toml = format!(
        r#"
[site]
base-url = "{uri}/"

[extraction]
endpoint = "{uri}/extract"
timeout-secs = 1

[render]
timeout-secs = 5

[storage]
mode = "{mode}"
directory = "{dir}"

[queue]
database-path = "{db}"
max-attempts = 3
batch-size = 2
workers = 2
retry-delay-secs = 0

[[page]]
url = "/"
source = "{source}"
storage-key = "home"

[[page]]
url = "/about/"
source = "{source}"

{extra}
"#,
        uri = server.uri(),
        mode = storage_mode,
        dir = dir.path().join("critical").display(),
        db = dir.path().join("critpath.db").display(),
        source = source.display(),
        extra = extra,
    );

    let config = parse_config(&toml).expect("Failed to parse test config");
    let db = Arc::new(
        Database::open(&dir.path().join("critpath.db")).expect("Failed to open database"),
    );
    let registry = Arc::new(PageRegistry::from_config(&config).expect("Failed to build registry"));
    let store = open_store(&config.storage, db.clone()).expect("Failed to open store");
    let queue = Arc::new(RefreshQueue::from_config(db.clone(), &config));

    Harness {
        dir,
        config,
        db,
        registry,
        store,
        queue,
    }
}

/// Drains repeatedly until a drain finds nothing, summing the reports
///
/// Each drain leaves retries for the next one.
pub async fn drain_until_idle(worker: &Worker) -> (DrainReport, usize) {
    let mut total = DrainReport::default();
    let mut drains = 0;
    loop {
        let report = worker.drain().await.expect("Drain failed");
        if report.total() == 0 {
            return (total, drains);
        }
        drains += 1;
        total.succeeded += report.succeeded;
        total.warned += report.warned;
        total.retried += report.retried;
        total.abandoned += report.abandoned;
    }
}

/// Serves simple HTML for every page of the site
pub async fn mount_site(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body><p>hello</p></body></html>"),
        )
        .mount(server)
        .await;
}

/// Makes the extraction service answer with `response`
pub async fn mount_extraction(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/extract"))
        .respond_with(response)
        .mount(server)
        .await;
}

pub fn file_exists(dir: &Path, name: &str) -> bool {
    dir.join("critical").join(name).exists()
}
