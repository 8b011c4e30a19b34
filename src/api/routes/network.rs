//! Telemetry query endpoints
//!
//! Collections are returned as plain JSON arrays, empty while no sample has
//! been recorded yet.

use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    Metrics,
    alerts::Alert,
    analysis::{Averages, Baseline, NetworkSummary, Prediction},
    api::{error::ApiResult, state::ApiState, types::MetricsQuery},
};

/// GET /api/v1/network/metrics?limit=N
pub async fn get_metrics(
    State(state): State<ApiState>,
    Query(query): Query<MetricsQuery>,
) -> Json<Vec<Metrics>> {
    Json(state.telemetry.recent_metrics(query.limit))
}

/// GET /api/v1/network/baseline
pub async fn get_baseline(State(state): State<ApiState>) -> Json<Baseline> {
    Json(state.telemetry.baseline())
}

/// GET /api/v1/network/averages
pub async fn get_averages(State(state): State<ApiState>) -> Json<Averages> {
    Json(state.telemetry.averages())
}

/// GET /api/v1/network/alerts
pub async fn get_alerts(State(state): State<ApiState>) -> Json<Vec<Alert>> {
    Json(state.telemetry.alerts())
}

/// GET /api/v1/network/predictions
pub async fn get_predictions(State(state): State<ApiState>) -> Json<Vec<Prediction>> {
    Json(state.telemetry.predictions().unwrap_or_default())
}

/// GET /api/v1/network/analysis
///
/// Fails with 422 while the history is empty
pub async fn get_analysis(State(state): State<ApiState>) -> ApiResult<Json<NetworkSummary>> {
    Ok(Json(state.telemetry.summary()?))
}
