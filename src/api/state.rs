//! Shared state passed to all API handlers

use std::sync::Arc;

use crate::{
    actors::pipeline::{PipelineHandle, TelemetryState},
    balancer::LoadBalancer,
    hub::Hub,
};

#[derive(Clone)]
pub struct ApiState {
    /// Sample history, alert log, predictor and baseline
    pub telemetry: Arc<TelemetryState>,

    /// Push hub, WebSocket connections subscribe here
    pub hub: Hub,

    pub balancer: Arc<LoadBalancer>,

    /// Pipeline actor handle, absent when the pipeline is not running
    pub pipeline: Option<PipelineHandle>,
}

impl ApiState {
    pub fn new(telemetry: Arc<TelemetryState>, hub: Hub, balancer: Arc<LoadBalancer>) -> Self {
        Self {
            telemetry,
            hub,
            balancer,
            pipeline: None,
        }
    }

    pub fn with_pipeline(mut self, pipeline: PipelineHandle) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}
