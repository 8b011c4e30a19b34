//! Short-horizon trend forecasting
//!
//! Each forecast is the midpoint between the least squares extrapolation one
//! step past the window and the window mean, clamped to a physically sensible
//! range. Confidence is the R² of the fitted line.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{
    AnalysisError,
    regression::{least_squares, mean, r_squared},
};
use crate::{Metrics, config::PredictorConfig};

/// 10 GiB per sample
const BANDWIDTH_CEILING: f64 = 10.0 * 1024.0 * 1024.0 * 1024.0;

const LATENCY_CEILING_MS: f64 = 1000.0;

const MIN_SAMPLES: usize = 2;

/// Below this many samples the fit is too weak to judge
const MIN_CONFIDENT_SAMPLES: usize = 5;

const FALLBACK_CONFIDENCE: f64 = 0.5;

const MIN_CONFIDENCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Point in time the forecast refers to
    pub timestamp: DateTime<Utc>,
    pub metric: String,
    pub value: f64,
    /// In [0, 1]
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy)]
struct TrendPoint {
    bandwidth: f64,
    latency: f64,
}

#[derive(Debug)]
pub struct Predictor {
    window: VecDeque<TrendPoint>,
    capacity: usize,
    horizon: Duration,
}

impl Predictor {
    pub fn new(capacity: usize, horizon: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            horizon,
        }
    }

    pub fn from_config(config: &PredictorConfig) -> Self {
        Self::new(config.window_size, config.horizon())
    }

    pub fn add_sample(&mut self, sample: &Metrics) {
        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(TrendPoint {
            bandwidth: sample.bandwidth_bytes(),
            latency: sample.latency,
        });
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn predict_next_hour(&self) -> Result<Vec<Prediction>, AnalysisError> {
        self.predict_at(Utc::now())
    }

    /// Forecast bandwidth and latency at `now + horizon`
    pub fn predict_at(&self, now: DateTime<Utc>) -> Result<Vec<Prediction>, AnalysisError> {
        if self.window.len() < MIN_SAMPLES {
            return Err(AnalysisError::InsufficientData {
                required: MIN_SAMPLES,
                available: self.window.len(),
            });
        }

        let timestamp = now + self.horizon;
        let bandwidth: Vec<f64> = self.window.iter().map(|p| p.bandwidth).collect();
        let latency: Vec<f64> = self.window.iter().map(|p| p.latency).collect();

        let predictions = vec![
            forecast("bandwidth", &bandwidth, BANDWIDTH_CEILING, timestamp),
            forecast("latency", &latency, LATENCY_CEILING_MS, timestamp),
        ];
        trace!("predictions: {predictions:?}");

        Ok(predictions)
    }
}

fn forecast(metric: &str, values: &[f64], ceiling: f64, timestamp: DateTime<Utc>) -> Prediction {
    let fit = least_squares(values);
    let extrapolated = fit.at(values.len() as f64);
    let average = mean(values).unwrap_or_default();

    let value = ((extrapolated + average) / 2.0).clamp(0.0, ceiling);

    Prediction {
        timestamp,
        metric: metric.to_string(),
        value,
        confidence: confidence(values, |x| fit.at(x)),
    }
}

fn confidence(values: &[f64], fitted: impl Fn(f64) -> f64) -> f64 {
    if values.len() < MIN_CONFIDENT_SAMPLES {
        return FALLBACK_CONFIDENCE;
    }

    let predicted: Vec<f64> = (0..values.len()).map(|i| fitted(i as f64)).collect();

    r_squared(&predicted, values)
        .map(|r2| r2.clamp(MIN_CONFIDENCE, 1.0))
        .unwrap_or(FALLBACK_CONFIDENCE)
}
