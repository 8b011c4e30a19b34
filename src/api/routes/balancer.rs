//! Load balancer endpoints

use axum::{Json, extract::State};

use crate::{
    api::{
        error::{ApiError, ApiResult},
        state::ApiState,
        types::InstancesResponse,
    },
    balancer::ServiceInstance,
};

/// GET /api/v1/balancer/instances
pub async fn list_instances(State(state): State<ApiState>) -> Json<InstancesResponse> {
    let instances = state.balancer.instances();

    Json(InstancesResponse {
        strategy: state.balancer.strategy_name(),
        average_load: state.balancer.average_load(),
        count: instances.len(),
        instances,
    })
}

/// GET /api/v1/balancer/select
pub async fn select_instance(State(state): State<ApiState>) -> ApiResult<Json<ServiceInstance>> {
    state
        .balancer
        .select_instance()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no instances registered".to_string()))
}
