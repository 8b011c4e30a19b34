//! REST API and WebSocket server
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/stats` - Hub, pipeline and balancer statistics
//! - `GET /api/v1/network/metrics?limit=N` - Recent samples
//! - `GET /api/v1/network/baseline` - Current baseline
//! - `GET /api/v1/network/averages` - Averages over the history
//! - `GET /api/v1/network/alerts` - Recently emitted alerts
//! - `GET /api/v1/network/predictions` - Next hour forecasts
//! - `GET /api/v1/network/analysis` - Statistical summary of the history
//! - `GET /api/v1/balancer/instances` - Registered service instances
//! - `GET /api/v1/balancer/select` - Instance picked by the active strategy
//! - `WS /api/v1/stream` - Batched topic push

pub mod error;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{ClientFrame, HealthResponse, InstancesResponse, StatsResponse};

use std::net::SocketAddr;

use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiSection;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    /// Allow any origin, for browser dashboards
    pub enable_cors: bool,
}

impl ApiConfig {
    /// Bind address from the config file, else from the environment
    pub fn from_section(section: &ApiSection) -> Self {
        Self {
            bind_addr: section.bind.unwrap_or_else(crate::util::get_bind_addr),
            enable_cors: section.enable_cors,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], crate::util::get_default_port())),
            enable_cors: true,
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/stats", get(routes::stats::get_stats))
        .route("/api/v1/network/metrics", get(routes::network::get_metrics))
        .route("/api/v1/network/baseline", get(routes::network::get_baseline))
        .route("/api/v1/network/averages", get(routes::network::get_averages))
        .route("/api/v1/network/alerts", get(routes::network::get_alerts))
        .route(
            "/api/v1/network/predictions",
            get(routes::network::get_predictions),
        )
        .route("/api/v1/network/analysis", get(routes::network::get_analysis))
        .route(
            "/api/v1/balancer/instances",
            get(routes::balancer::list_instances),
        )
        .route(
            "/api/v1/balancer/select",
            get(routes::balancer::select_instance),
        )
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the API server in a background task and return its local address
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let mut app = router(state);

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
