//! Read-only helpers for the dashboard: the term catalogue and attendance
//! projections. Nothing here talks to the ERP.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::attendance::academic::{known_years, semester_names};
use crate::attendance::projection::{classes_needed, classes_skippable, project};
use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// GET /terms
pub async fn get_terms() -> Response {
    info!("GET /terms");

    (
        StatusCode::OK,
        Json(json!({
            "years": known_years().collect::<Vec<_>>(),
            "semesters": semester_names().collect::<Vec<_>>(),
        })),
    )
        .into_response()
}

/// GET /weights
pub async fn get_weights(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /weights");
    (StatusCode::OK, Json(s.weights.clone())).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ProjectionParams {
    pub attended: u64,
    pub total: u64,
    /// Custom target percentage, in addition to the 75/85 defaults
    pub threshold: Option<f64>,
}

/// GET /projection?attended=..&total=..[&threshold=..]
pub async fn get_projection(Query(params): Query<ProjectionParams>) -> Response {
    info!(
        attended = params.attended,
        total = params.total,
        "GET /projection"
    );

    if params.attended > params.total {
        return ApiErrorType::from((
            StatusCode::BAD_REQUEST,
            "attended cannot exceed total",
            None,
        ))
        .into_response();
    }

    let projection = project(params.attended, params.total);
    let Some(threshold) = params.threshold else {
        return (StatusCode::OK, Json(json!({ "projection": projection }))).into_response();
    };

    if !threshold.is_finite() || threshold <= 0.0 || threshold > 100.0 {
        return ApiErrorType::from((
            StatusCode::BAD_REQUEST,
            "threshold must be in (0, 100]",
            Some(threshold.to_string()),
        ))
        .into_response();
    }

    (
        StatusCode::OK,
        Json(json!({
            "projection": projection,
            "custom": {
                "threshold": threshold,
                "must_attend": classes_needed(params.attended, params.total, threshold),
                "can_skip": classes_skippable(params.attended, params.total, threshold),
            },
        })),
    )
        .into_response()
}
