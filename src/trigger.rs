//! Refresh trigger endpoint
//!
//! A `GET` on `/critical-css-refresh/<key>` enqueues every configured page and
//! schedules a drain. The key is a short random hex string generated on first
//! use and persisted in the settings table. Anyone who knows the URL can
//! trigger a refresh; the key only keeps the path from being guessed.

use crate::pipeline::Worker;
use crate::storage::Database;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use url::Url;

/// Settings entry holding the trigger key
pub const TRIGGER_KEY_SETTING: &str = "trigger_key";

const KEY_LEN: usize = 8;

/// Returns the persisted trigger key, creating it on first call
pub fn trigger_key(db: &Database) -> Result<String, rusqlite::Error> {
    db.get_or_insert_setting(TRIGGER_KEY_SETTING, &generate_key())
}

fn generate_key() -> String {
    let mut key = uuid::Uuid::new_v4().simple().to_string();
    key.truncate(KEY_LEN);
    key
}

pub fn trigger_path(key: &str) -> String {
    format!("/critical-css-refresh/{}", key)
}

/// Full trigger URL on the site, as printed by `refresh-webhook`
pub fn trigger_url(base: &Url, key: &str) -> Result<Url, url::ParseError> {
    base.join(&trigger_path(key))
}

/// State shared with the trigger handler
#[derive(Clone)]
pub struct TriggerState {
    pub worker: Arc<Worker>,
    pub key: Arc<str>,
}

pub fn router(state: TriggerState) -> Router {
    Router::new()
        .route("/critical-css-refresh/:key", get(handle_refresh))
        .with_state(state)
}

async fn handle_refresh(State(state): State<TriggerState>, Path(key): Path<String>) -> Response {
    if key != *state.key {
        tracing::debug!("Rejected refresh trigger with unknown key");
        return StatusCode::NOT_FOUND.into_response();
    }

    match state.worker.trigger() {
        Ok(added) => (StatusCode::OK, format!("Queued {} refresh jobs.", added)).into_response(),
        Err(e) => {
            tracing::error!("Failed to enqueue refresh jobs: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to queue refresh jobs.").into_response()
        }
    }
}

/// Serves the trigger endpoint on `bind` until the process exits
pub async fn serve(bind: &str, state: TriggerState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Listening for refresh triggers on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}
