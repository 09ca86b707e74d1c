use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;

use crate::server::endpoints::{attendance, relay, status};
use crate::types::AppState;

mod endpoints;
pub mod types;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::get_health))
        .route("/terms", get(attendance::get_terms))
        .route("/weights", get(attendance::get_weights))
        .route("/projection", get(attendance::get_projection));

    // The relay owns its mount and everything below it. Mounted at the root it
    // takes whatever the API routes don't.
    let mount = app_state.relay.config().mount.clone();
    let relay_router = if mount.is_empty() {
        Router::new().fallback(relay::relay)
    } else {
        Router::new()
            .route(&mount, any(relay::relay))
            .route(&format!("{}/*rest", mount), any(relay::relay))
    };

    api_router
        .merge(relay_router)
        .with_state(app_state)
}
