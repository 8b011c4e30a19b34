//! Message types for actor communication
//!
//! Commands travel over per-actor mpsc channels, with oneshot channels for
//! replies. Events are broadcast and must be cheap to clone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::Metrics;

/// Published on the sample broadcast channel for every collected sample
#[derive(Debug, Clone)]
pub struct MetricEvent {
    /// Identifier of the producing source (instance id for the local sampler)
    pub source_id: String,

    pub metrics: Metrics,

    /// When the sample was handed to the channel
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub enum CollectorCommand {
    /// Sample immediately, bypassing the interval timer
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Restart the interval timer with a new period
    UpdateInterval { interval_secs: u64 },

    Shutdown,
}

#[derive(Debug)]
pub enum PipelineCommand {
    GetStats {
        respond_to: oneshot::Sender<PipelineStats>,
    },

    /// Compute and publish predictions now
    PublishPredictions {
        respond_to: oneshot::Sender<usize>,
    },

    Shutdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub samples_processed: u64,
    pub alerts_emitted: u64,
    pub predictions_published: u64,
    /// Samples skipped because the pipeline fell behind the broadcast channel
    pub samples_lagged: u64,
}
