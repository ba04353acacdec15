//! End-to-end generation and queue drain tests

use crate::common::{drain_until_idle, file_exists, harness, mount_extraction, mount_site};
use critpath::queue::RefreshQueue;
use critpath::config::StorageMode;
use critpath::extraction::ExtractionError;
use critpath::pipeline::{Disposition, GenerationResult, JobContext, JobError, JobStatus};
use critpath::registry::derive_storage_key;
use critpath::ConfigError;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn css_response(css: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "css": css }))
}

async fn extraction_calls(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == "/extract")
        .count()
}

#[tokio::test]
async fn test_generate_stores_css_under_configured_key() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    mount_extraction(&server, css_response(".a{color:red}")).await;
    let h = harness(&server, "file", "");

    let url = format!("{}/", server.uri());
    let mut ctx = JobContext::new(url.clone());
    let generated = h.generator().generate(&url, &mut ctx).await.unwrap();

    assert_eq!(generated.storage_key, "home");
    assert!(file_exists(h.dir.path(), "home"));
    assert_eq!(h.store.get("home").unwrap().unwrap().css, ".a{color:red}");

    let transcript = ctx.transcript();
    assert!(transcript.starts_with(&format!("Rendering output for {}", url)));
    assert!(transcript.contains("Posting output ("));
    assert!(transcript.contains("Saved critical css (0.01kb) to "));

    let requests = server.received_requests().await.unwrap();
    let extract = requests
        .iter()
        .find(|request| request.url.path() == "/extract")
        .unwrap();
    let body: Value = serde_json::from_slice(&extract.body).unwrap();
    assert_eq!(body["css"], "p{color:red}.unused{margin:0}");
    assert_eq!(body["html"], "<html><body><p>hello</p></body></html>");
}

#[tokio::test]
async fn test_record_mode_uses_derived_key() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    mount_extraction(&server, css_response(".about{}")).await;
    let h = harness(&server, "record", "");

    let url = format!("{}/about/", server.uri());
    let mut ctx = JobContext::new(url.clone());
    let generated = h.generator().generate(&url, &mut ctx).await.unwrap();

    let key = derive_storage_key(&url, StorageMode::Record);
    assert_eq!(generated.storage_key, key);
    assert!(key.starts_with("critical_css_"));
    assert_eq!(h.store.get(&key).unwrap().unwrap().css, ".about{}");
    assert!(!file_exists(h.dir.path(), &key));
}

#[tokio::test]
async fn test_unknown_url_is_rejected_without_requests() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    mount_extraction(&server, css_response(".a{}")).await;
    let h = harness(&server, "file", "");

    let url = format!("{}/not-configured/", server.uri());
    let mut ctx = JobContext::new(url.clone());
    let err = h.generator().generate(&url, &mut ctx).await.unwrap_err();

    assert!(matches!(err, JobError::Config(ConfigError::NoPageConfig(_))));
    assert_eq!(err.to_string(), format!("No config found for {}", url));
    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(h.store.get("home").unwrap().is_none());
}

#[tokio::test]
async fn test_size_budget() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let h = harness(&server, "file", "");
    let url = format!("{}/", server.uri());

    // Under budget
    mount_extraction(&server, css_response(&"a".repeat(10_000))).await;
    let mut ctx = JobContext::new(url.clone());
    let outcome = h.generator().generate(&url, &mut ctx).await;
    let result = GenerationResult::from_job(&url, &outcome, ctx.elapsed());
    assert_eq!(result.status, JobStatus::Success);
    assert_eq!(result.size_bytes, 10_000);

    // Over budget: stored, then reported
    server.reset().await;
    mount_site(&server).await;
    mount_extraction(&server, css_response(&"b".repeat(15_000))).await;
    let mut ctx = JobContext::new(url.clone());
    let outcome = h.generator().generate(&url, &mut ctx).await;

    let err = outcome.as_ref().unwrap_err();
    assert!(matches!(
        err,
        JobError::Extraction(ExtractionError::SizeExceeded {
            actual: 15_000,
            limit: 14_336
        })
    ));
    assert_eq!(err.disposition(), Disposition::Soft);
    assert_eq!(h.store.get("home").unwrap().unwrap().css, "b".repeat(15_000));

    let result = GenerationResult::from_job(&url, &outcome, ctx.elapsed());
    assert_eq!(result.status, JobStatus::Error);
    assert_eq!(result.size_bytes, 15_000);
}

#[tokio::test]
async fn test_drain_reports_oversized_result_as_warning() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    mount_extraction(&server, css_response(&"a".repeat(15_000))).await;
    let h = harness(&server, "record", "");

    h.queue.enqueue([format!("{}/", server.uri())]).unwrap();
    let report = h.worker().drain().await.unwrap();

    assert_eq!(report.warned, 1);
    assert_eq!(report.total(), 1);
    assert!(h.queue.permanent_failures().unwrap().is_empty());
    assert_eq!(h.store.get("home").unwrap().unwrap().css.len(), 15_000);
}

#[tokio::test]
async fn test_timeouts_are_retried_then_abandoned() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    mount_extraction(
        &server,
        css_response(".a{}").set_delay(Duration::from_secs(3)),
    )
    .await;
    let h = harness(&server, "file", "");
    let url = format!("{}/", server.uri());

    h.queue.enqueue([url.as_str()]).unwrap();
    let worker = h.worker();
    let first = worker.drain().await.unwrap();
    assert_eq!(first.retried, 1);
    assert_eq!(extraction_calls(&server).await, 1);

    let (rest, drains) = drain_until_idle(&worker).await;
    assert_eq!(drains, 2);
    assert_eq!(rest.retried, 1);
    assert_eq!(rest.abandoned, 1);
    assert_eq!(extraction_calls(&server).await, 3);

    let failures = h.queue.permanent_failures().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].url, url);
    assert_eq!(failures[0].attempts, 3);
    assert_eq!(failures[0].error, "Request to critical CSS server timed out");
    assert!(h.store.get("home").unwrap().is_none());
}

#[tokio::test]
async fn test_failing_page_does_not_block_others() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/about/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_site(&server).await;
    mount_extraction(&server, css_response(".a{}")).await;
    let h = harness(&server, "record", "");

    let home = format!("{}/", server.uri());
    let about = format!("{}/about/", server.uri());
    h.queue.enqueue([home.as_str(), about.as_str()]).unwrap();
    let worker = h.worker();
    let first = worker.drain().await.unwrap();
    assert_eq!(first.succeeded, 1);
    assert_eq!(first.retried, 1);
    assert_eq!(h.store.get("home").unwrap().unwrap().css, ".a{}");

    let (rest, _) = drain_until_idle(&worker).await;
    assert_eq!(rest.succeeded, 0);
    assert_eq!(rest.abandoned, 1);
    assert_eq!(h.store.get("home").unwrap().unwrap().css, ".a{}");
    assert_eq!(h.queue.permanent_failures().unwrap()[0].url, about);
}

#[tokio::test]
async fn test_interrupted_jobs_are_recovered() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    mount_extraction(&server, css_response(".a{}")).await;
    let h = harness(&server, "file", "");

    h.queue.enqueue([format!("{}/", server.uri())]).unwrap();
    let claimed = h.queue.dequeue_batch(10).unwrap();
    assert_eq!(claimed.len(), 1);

    // A drain started now finds nothing to claim
    assert_eq!(h.worker().drain().await.unwrap().total(), 0);

    // A restarted process leaves the claim alone until its lease expires
    let restarted = RefreshQueue::from_config(h.db.clone(), &h.config);
    assert_eq!(restarted.recover_in_flight().unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let expired = RefreshQueue::from_config(h.db.clone(), &h.config).with_lease(Duration::ZERO);
    assert_eq!(expired.recover_in_flight().unwrap(), 1);
    let report = h.worker().drain().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert!(file_exists(h.dir.path(), "home"));
}

#[tokio::test]
async fn test_failure_notification_is_sent() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    mount_extraction(&server, ResponseTemplate::new(200).set_body_json(json!({"css": ""}))).await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    let h = harness(
        &server,
        "file",
        &format!("[notify]\nslack-webhook = \"{}/slack\"\n", server.uri()),
    );

    h.queue.enqueue([format!("{}/", server.uri())]).unwrap();
    let (report, drains) = drain_until_idle(&h.worker()).await;
    assert_eq!(drains, 3);
    assert_eq!(report.abandoned, 1);

    let requests = server.received_requests().await.unwrap();
    let slack: Vec<Value> = requests
        .iter()
        .filter(|request| request.url.path() == "/slack")
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect();

    // One notification per attempt
    assert_eq!(slack.len(), 3);
    let attachment = &slack[2]["attachments"][0];
    assert_eq!(attachment["color"], "danger");
    assert!(attachment["title"]
        .as_str()
        .unwrap()
        .starts_with("Critical CSS Error: "));
    assert!(attachment["text"]
        .as_str()
        .unwrap()
        .ends_with("Critical CSS response is unexpectedly empty"));
}
