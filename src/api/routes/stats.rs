//! System statistics endpoint

use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState, types::StatsResponse};

/// GET /api/v1/stats
///
/// Hub counters, pipeline counters, history size and balancer load
pub async fn get_stats(State(state): State<ApiState>) -> ApiResult<Json<StatsResponse>> {
    let pipeline = match &state.pipeline {
        Some(handle) => handle.stats().await.unwrap_or_default(),
        None => Default::default(),
    };

    Ok(Json(StatsResponse {
        timestamp: chrono::Utc::now().to_rfc3339(),
        hub: state.hub.stats(),
        pipeline,
        samples: state.telemetry.sample_count(),
        instances: state.balancer.len(),
        average_load: state.balancer.average_load(),
    }))
}
