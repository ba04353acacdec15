//! Refresh trigger tests

use crate::common::{harness, mount_extraction, mount_site};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use critpath::storage::Database;
use critpath::trigger::{router, trigger_key, trigger_path, TriggerState};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::{MockServer, ResponseTemplate};

async fn get(state: TriggerState, uri: &str) -> (StatusCode, String) {
    let response = router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_trigger_refreshes_every_page() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    mount_extraction(
        &server,
        ResponseTemplate::new(200).set_body_json(json!({"css": ".a{}"})),
    )
    .await;
    let h = harness(&server, "record", "");

    let key = trigger_key(&h.db).unwrap();
    let worker = Arc::new(h.worker());
    let state = TriggerState {
        worker: worker.clone(),
        key: Arc::from(key.as_str()),
    };

    let (status, body) = get(state.clone(), &trigger_path(&key)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Queued 2 refresh jobs.");

    for _ in 0..300 {
        if !worker.is_drain_scheduled() && h.queue.stats().unwrap().pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(h.queue.stats().unwrap().pending, 0);
    assert_eq!(h.queue.stats().unwrap().in_flight, 0);
    assert_eq!(h.store.get("home").unwrap().unwrap().css, ".a{}");
    let about = h
        .registry
        .resolve(&format!("{}/about/", server.uri()))
        .unwrap();
    assert!(h.store.get(&about.storage_key).unwrap().is_some());

    let (status, _) = get(state, "/critical-css-refresh/ffffffff").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_trigger_key_survives_restart() {
    let server = MockServer::start().await;
    let h = harness(&server, "file", "");
    let first = trigger_key(&h.db).unwrap();

    let reopened = Database::open(&h.dir.path().join("critpath.db")).unwrap();
    assert_eq!(trigger_key(&reopened).unwrap(), first);
}
