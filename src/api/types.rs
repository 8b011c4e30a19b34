//! Request and response types of the HTTP and WebSocket surface

use serde::{Deserialize, Serialize};

use crate::{actors::messages::PipelineStats, balancer::ServiceInstance, hub::HubStats};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub timestamp: String,
    pub hub: HubStats,
    pub pipeline: PipelineStats,
    /// Samples currently held in the history
    pub samples: usize,
    pub instances: usize,
    pub average_load: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstancesResponse {
    pub strategy: &'static str,
    pub average_load: f64,
    pub count: usize,
    pub instances: Vec<ServiceInstance>,
}

/// Query parameters of `GET /api/v1/network/metrics`
#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    /// Most recent N samples, all of the history when absent
    pub limit: Option<usize>,
}

/// Frames a push client may send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
}
