use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rocket::http::Status;
use rocket::response::content::RawHtml;
use rocket::serde::json::Json;
use rocket::{get, routes, Build, Rocket, State};
use serde::Serialize;
use tracing::info;

use common::Config;

use crate::generator::{self, GenerateOutcome, NO_UPDATES_MESSAGE};
use crate::ingestion::FeedFetcher;
use crate::purge::purge_prefix;
use crate::storage::BlobStore;

/// Application state stored inside Rocket managed state.
#[derive(Clone)]
pub struct AppState {
    pub started_at: DateTime<Utc>,
    pub config: Arc<Config>,
    pub fetcher: Arc<FeedFetcher>,
    pub store: Arc<dyn BlobStore>,
}

impl AppState {
    pub fn new(config: Arc<Config>, fetcher: Arc<FeedFetcher>, store: Arc<dyn BlobStore>) -> Self {
        Self {
            started_at: Utc::now(),
            config,
            fetcher,
            store,
        }
    }
}

/// Response structure for `/api/v1/status`.
#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    uptime_seconds: i64,
    feed_url: String,
    storage: String,
    purge_enabled: bool,
    purge_prefix: String,
    scheduler_times: Vec<String>,
}

#[get("/health")]
async fn health() -> &'static str {
    "OK"
}

/// Status endpoint returning simple JSON with uptime and basic config info.
#[get("/api/v1/status")]
async fn status(state: &State<AppState>) -> Json<StatusResponse> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    let cfg = &state.config;

    Json(StatusResponse {
        status: "ok",
        uptime_seconds: uptime,
        feed_url: state.fetcher.url().to_string(),
        storage: state.store.describe(),
        purge_enabled: cfg.purge_enabled(),
        purge_prefix: purge_prefix(cfg),
        scheduler_times: cfg.scheduler.times.clone(),
    })
}

/// Builds the deck for `[start, end]` and answers with a download link.
#[get("/api/presentation?<start>&<end>")]
async fn presentation(
    state: &State<AppState>,
    start: Option<String>,
    end: Option<String>,
) -> (Status, RawHtml<String>) {
    let now = Utc::now();

    let window = match generator::resolve_window(start.as_deref(), end.as_deref(), now.date_naive()) {
        Ok(w) => w,
        Err(e) => {
            info!(start = ?start, end = ?end, reason = %e, "rejected presentation request");
            return respond(e.status_code(), e.public_message().to_string());
        }
    };

    match generator::generate_presentation(&state.fetcher, state.store.as_ref(), window, now).await {
        Ok(GenerateOutcome::NoUpdates) => respond(200, NO_UPDATES_MESSAGE.to_string()),
        Ok(GenerateOutcome::Uploaded(upload)) => respond(200, generator::download_message(&upload.url)),
        Err(e) => respond(e.status_code(), e.public_message().to_string()),
    }
}

fn respond(code: u16, body: String) -> (Status, RawHtml<String>) {
    (Status::new(code), RawHtml(body))
}

/// Rocket instance with managed state and routes, bound per `[server]`.
pub fn build_rocket(state: AppState) -> Rocket<Build> {
    let mut fig = rocket::Config::figment();
    if let Some(server) = &state.config.server {
        if let Some(bind) = &server.bind {
            fig = fig.merge(("address", bind.clone()));
        }
        if let Some(port) = server.port {
            fig = fig.merge(("port", port));
        }
    }

    rocket::custom(fig)
        .manage(state)
        .mount("/", routes![health, status, presentation])
}

pub async fn launch_rocket(state: AppState) -> Result<()> {
    // Launch Rocket - this will run until shutdown (SIGINT/SIGTERM etc.)
    info!("Starting Rocket HTTP server");
    build_rocket(state)
        .launch()
        .await
        .map_err(|e| anyhow!("Rocket failed: {}", e))?;

    info!("Rocket HTTP server has shut down");
    Ok(())
}
