//! Statistical analysis of the sample stream
//!
//! - [`baseline`]: rolling baseline and threshold based anomaly detection
//! - [`throttle`]: per alert kind cool-down bookkeeping
//! - [`predictor`]: linear trend forecasts blended with the moving average
//! - [`regression`]: least squares helpers shared by the predictor
//! - [`summary`]: averages and baseline deviation over a sample history

pub mod baseline;
pub mod predictor;
pub mod regression;
pub mod summary;
pub mod throttle;

pub use baseline::{Baseline, BaselineMonitor, BaselineStore, JsonFileStore, MemoryStore};
pub use predictor::{Prediction, Predictor};
pub use summary::{Averages, NetworkSummary};
pub use throttle::AlertThrottle;

/// Errors surfaced to callers of the analysis components
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// Not enough samples to produce a meaningful result
    #[error("insufficient data: need at least {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },
}
