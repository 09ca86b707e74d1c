use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::types::AppState;

/// GET /health
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /health");

    let relay = s.relay.config();
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "upstream": relay.upstream.as_str(),
            "mount": relay.mount,
            "cross_site_cookies": relay.cross_site_cookies,
            "uptime_secs": (chrono::Utc::now() - s.started_at).num_seconds(),
        })),
    )
        .into_response()
}
