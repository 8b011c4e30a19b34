//! Actor-based telemetry pipeline
//!
//! Each actor runs as an independent tokio task and is controlled through a
//! cloneable handle.
//!
//! ## Architecture Overview
//!
//! ```text
//!     ┌──────────────────────┐
//!     │ MetricCollectorActor │  samples a MetricsSource every interval
//!     └──────────┬───────────┘
//!                │ MetricEvent
//!     ┌──────────▼───────────┐
//!     │  Broadcast Channel   │
//!     └──────────┬───────────┘
//!                │ subscribe
//!     ┌──────────▼───────────┐      ┌────────────────┐
//!     │    PipelineActor     │─────►│ TelemetryState │◄──── query surface
//!     └──────────┬───────────┘      └────────────────┘
//!                │ publish
//!     ┌──────────▼───────────┐
//!     │         Hub          │─────► subscribers
//!     └──────────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel
//! 2. **Events**: samples fan out over a broadcast channel
//! 3. **Request/Response**: oneshot channels for queries such as `poll_now`

pub mod collector;
pub mod messages;
pub mod pipeline;
