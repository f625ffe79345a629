//! HTTP surface for tok-lens
//!
//! Axum server with the upload page, per-session dashboards, a small JSON API
//! and plain JSON health/info/metrics endpoints.

pub mod api;
pub mod pages;
pub mod selection;

use crate::config::Config;
use crate::error::Result;
use crate::oembed::{ClipMetaSource, create_meta_source};
use crate::session::SessionStore;
use axum::{
    Router,
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use std::{cmp::Ordering, collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Multipart framing on top of the archive itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;
const LATENCY_WINDOW: usize = 256;

/// Shared state for HTTP server
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub meta: Arc<dyn ClipMetaSource>,
    pub metrics: Arc<Mutex<HttpMetrics>>,
    pub started_unix: u64,
}

impl AppState {
    pub fn new(config: Config, meta: Arc<dyn ClipMetaSource>) -> Self {
        let sessions = Arc::new(SessionStore::new(
            config.sessions.max_sessions,
            Duration::from_secs(config.sessions.ttl_secs),
        ));
        Self {
            config: Arc::new(config),
            sessions,
            meta,
            metrics: Arc::new(Mutex::new(HttpMetrics::new())),
            started_unix: unix_now(),
        }
    }
}

/// Metrics for HTTP server
#[derive(Debug, Clone)]
pub struct HttpMetrics {
    pub total_requests: u64,
    pub last_request_unix: u64,
    pub errors_total: u64,
    pub uploads_total: u64,
    pub latencies: Vec<f64>, // ring buffer for p95
    pub routes_count: HashMap<String, u64>,
}

impl HttpMetrics {
    fn new() -> Self {
        Self {
            total_requests: 0,
            last_request_unix: unix_now(),
            errors_total: 0,
            uploads_total: 0,
            latencies: Vec::with_capacity(LATENCY_WINDOW),
            routes_count: HashMap::new(),
        }
    }

    fn record(&mut self, route: String, latency_ms: f64, success: bool) {
        if latency_ms > 0.0 {
            self.latencies.push(latency_ms);
            if self.latencies.len() > LATENCY_WINDOW {
                self.latencies.remove(0);
            }
        }
        if !success {
            self.errors_total = self.errors_total.saturating_add(1);
        }
        self.total_requests = self.total_requests.saturating_add(1);
        self.last_request_unix = unix_now();
        *self.routes_count.entry(route).or_default() += 1;
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn json_ok(body: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Health check endpoint
pub async fn health_handler() -> impl IntoResponse {
    "ok"
}

/// Info endpoint
pub async fn info_handler(State(state): State<AppState>) -> impl IntoResponse {
    let cfg = &state.config;
    json_ok(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": unix_now().saturating_sub(state.started_unix),
        "sessions": {
            "active": state.sessions.len().await,
            "max": cfg.sessions.max_sessions,
            "ttl_secs": cfg.sessions.ttl_secs
        },
        "server": {
            "bind": cfg.runtime.http_bind.to_string(),
            "max_upload_mb": cfg.server.max_upload_mb,
            "max_entry_mb": cfg.server.max_entry_mb
        },
        "thumbnails": {
            "source": state.meta.name(),
            "enabled": cfg.oembed.enabled
        },
        "display": {
            "timezone": cfg.runtime.tz.name(),
            "cards_per_row": cfg.display.cards_per_row,
            "num_cards": cfg.display.num_cards
        }
    }))
}

/// Metrics endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let metrics = state.metrics.lock().await.clone();

    // Compute latency stats
    let (avg_latency_ms, p95_latency_ms) = if metrics.latencies.is_empty() {
        (None, None)
    } else {
        let sum: f64 = metrics.latencies.iter().sum();
        let avg = sum / metrics.latencies.len() as f64;
        let mut sorted = metrics.latencies.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        let p95_idx = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);
        (Some(avg), sorted.get(p95_idx).copied())
    };

    // Top 5 routes
    let mut routes_vec: Vec<_> = metrics.routes_count.iter().collect();
    routes_vec.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    let routes_top_5: Vec<_> = routes_vec
        .into_iter()
        .take(5)
        .map(|(k, v)| json!({ "route": k, "count": v }))
        .collect();

    json_ok(json!({
        "metrics_version": "1",
        "total_requests": metrics.total_requests,
        "last_request_unix": metrics.last_request_unix,
        "errors_total": metrics.errors_total,
        "uploads_total": metrics.uploads_total,
        "active_sessions": state.sessions.len().await,
        "avg_latency_ms": avg_latency_ms,
        "p95_latency_ms": p95_latency_ms,
        "routes_top_5": routes_top_5
    }))
}

async fn track_requests(
    State(metrics): State<Arc<Mutex<HttpMetrics>>>,
    req: Request,
    next: Next,
) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = std::time::Instant::now();
    let resp = next.run(req).await;
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    let ok = !resp.status().is_server_error() && !resp.status().is_client_error();
    metrics.lock().await.record(route, latency_ms, ok);
    resp
}

/// Build the application router around `state`
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.limits().max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);
    let timeout = Duration::from_millis(state.config.server.request_timeout_ms);

    let api = Router::new()
        .route("/api/s/:id/paths", get(api::paths_handler))
        .route("/api/s/:id/metrics", get(api::metrics_handler))
        .route("/api/s/:id/export.csv", get(api::export_csv_handler))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any));

    Router::new()
        .route("/", get(pages::index_handler))
        .route("/upload", post(pages::upload_handler))
        .route("/s/:id", get(pages::dashboard_handler))
        .route("/s/:id/end", post(pages::end_session_handler))
        .route("/health", get(health_handler))
        .route("/info", get(info_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .fallback(pages::not_found_handler)
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            track_requests,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and block until shutdown
pub async fn start_http_server(config: Config) -> Result<()> {
    let meta = create_meta_source(&config.oembed)?;
    let bind = config.runtime.http_bind;
    let sweep_every = Duration::from_secs(config.sessions.sweep_secs);
    let state = AppState::new(config, meta);
    let sweeper = state.sessions.spawn_sweeper(sweep_every);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind HTTP listener: {}", e))?;

    tracing::info!("Dashboard available at http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down; discarding all sessions");
        })
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {}", e))?;

    sweeper.abort();
    Ok(())
}
