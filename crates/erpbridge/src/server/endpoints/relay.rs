use axum::extract::{Request, State};
use axum::response::Response;
use std::sync::Arc;

use crate::types::AppState;

/// ANY {mount} and {mount}/*rest
pub async fn relay(State(s): State<Arc<AppState>>, request: Request) -> Response {
    s.relay.forward(request).await
}
