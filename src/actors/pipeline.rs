//! PipelineActor - turns raw samples into telemetry
//!
//! ## Message Flow
//!
//! ```text
//! MetricEvent ─► TelemetryState::record_sample ─┬─► baseline ring + anomaly detection ─► hub "alerts"
//!                                                ├─► predictor window
//!                                                └─► history ─────────────────────────► hub "metrics"
//! prediction tick ─► predictor ─► hub "predictions"
//! ```
//!
//! [`TelemetryState`] is shared with the query surface, which only ever reads
//! snapshots from it.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Duration, Instant, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    Metrics,
    alerts::Alert,
    analysis::{
        AnalysisError, Averages, Baseline, BaselineMonitor, NetworkSummary, Prediction, Predictor,
        summary,
    },
    config::PipelineConfig,
    hub::Hub,
};

use super::messages::{MetricEvent, PipelineCommand, PipelineStats};

pub const METRICS_TOPIC: &str = "metrics";
pub const ALERTS_TOPIC: &str = "alerts";
pub const PREDICTIONS_TOPIC: &str = "predictions";

/// Analysis state shared between the pipeline and the query surface
pub struct TelemetryState {
    /// Learns the baseline and raises throttled alerts
    baseline: Arc<BaselineMonitor>,
    /// Regression window behind the forecasts
    predictor: Mutex<Predictor>,
    /// Recent samples, oldest first
    history: RwLock<VecDeque<Metrics>>,
    /// Capacity of `history`, at least one
    history_size: usize,
    /// Recently emitted alerts, oldest first
    alert_log: RwLock<VecDeque<Alert>>,
    /// Capacity of `alert_log`, at least one
    alert_log_size: usize,
}

impl TelemetryState {
    /// Empty history and alert log, sized from `config`
    pub fn new(
        baseline: Arc<BaselineMonitor>,
        predictor: Predictor,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            baseline,
            predictor: Mutex::new(predictor),
            history: RwLock::new(VecDeque::with_capacity(config.history_size)),
            history_size: config.history_size.max(1),
            alert_log: RwLock::new(VecDeque::with_capacity(config.alert_log_size)),
            alert_log_size: config.alert_log_size.max(1),
        }
    }

    /// Feed one sample through every consumer and return the alerts it raised
    pub fn record_sample(&self, sample: &Metrics) -> Vec<Alert> {
        self.baseline.add_sample(sample.clone());
        self.predictor.lock().add_sample(sample);

        {
            let mut history = self.history.write();
            if history.len() >= self.history_size {
                history.pop_front();
            }
            history.push_back(sample.clone());
        }

        let alerts = self.baseline.detect_anomalies_at(sample, sample.timestamp);
        if !alerts.is_empty() {
            let mut log = self.alert_log.write();
            for alert in &alerts {
                if log.len() >= self.alert_log_size {
                    log.pop_front();
                }
                log.push_back(alert.clone());
            }
        }

        alerts
    }

    /// The monitor behind the periodic baseline refresh
    pub fn baseline_monitor(&self) -> &Arc<BaselineMonitor> {
        &self.baseline
    }

    /// Snapshot of the current baseline
    pub fn baseline(&self) -> Baseline {
        self.baseline.baseline()
    }

    /// Samples held in the history
    pub fn sample_count(&self) -> usize {
        self.history.read().len()
    }

    /// Most recent samples, oldest first
    pub fn recent_metrics(&self, limit: Option<usize>) -> Vec<Metrics> {
        let history = self.history.read();
        let skip = limit.map_or(0, |limit| history.len().saturating_sub(limit));
        history.iter().skip(skip).cloned().collect()
    }

    /// Recently emitted alerts, oldest first
    pub fn alerts(&self) -> Vec<Alert> {
        self.alert_log.read().iter().cloned().collect()
    }

    /// Bandwidth and latency forecasts one horizon ahead
    pub fn predictions(&self) -> Result<Vec<Prediction>, AnalysisError> {
        self.predictor.lock().predict_next_hour()
    }

    /// Means over the whole history
    pub fn averages(&self) -> Averages {
        Averages::from_samples(&self.recent_metrics(None))
    }

    /// Classified health summary, fails on an empty history
    pub fn summary(&self) -> Result<NetworkSummary, AnalysisError> {
        summary::summarize(&self.recent_metrics(None), &self.baseline())
    }
}

pub struct PipelineActor {
    state: Arc<TelemetryState>,
    hub: Hub,
    metric_rx: broadcast::Receiver<MetricEvent>,
    command_rx: mpsc::Receiver<PipelineCommand>,
    prediction_interval: Duration,
    stats: PipelineStats,
}

impl PipelineActor {
    pub fn new(
        state: Arc<TelemetryState>,
        hub: Hub,
        metric_rx: broadcast::Receiver<MetricEvent>,
        command_rx: mpsc::Receiver<PipelineCommand>,
        prediction_interval: Duration,
    ) -> Self {
        Self {
            state,
            hub,
            metric_rx,
            command_rx,
            prediction_interval,
            stats: PipelineStats::default(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting pipeline actor");

        let mut prediction_ticker = interval_at(
            Instant::now() + self.prediction_interval,
            self.prediction_interval,
        );

        loop {
            tokio::select! {
                event = self.metric_rx.recv() => {
                    match event {
                        Ok(event) => self.process(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("pipeline lagged behind, skipped {skipped} samples");
                            self.stats.samples_lagged += skipped;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("sample channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = prediction_ticker.tick() => {
                    self.publish_predictions();
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PipelineCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats);
                        }

                        PipelineCommand::PublishPredictions { respond_to } => {
                            let published = self.publish_predictions();
                            let _ = respond_to.send(published);
                        }

                        PipelineCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        debug!("pipeline actor stopped");
    }

    fn process(&mut self, event: MetricEvent) {
        trace!("processing sample from {}", event.source_id);

        let alerts = self.state.record_sample(&event.metrics);
        self.stats.samples_processed += 1;

        self.hub.publish_json(METRICS_TOPIC, &event.metrics);

        for alert in alerts {
            info!("{} alert: {}", alert.severity, alert.description);
            self.stats.alerts_emitted += 1;
            self.hub.publish_json(ALERTS_TOPIC, &alert);
        }
    }

    fn publish_predictions(&mut self) -> usize {
        match self.state.predictions() {
            Ok(predictions) => {
                let count = predictions.len();
                self.hub.publish_json(PREDICTIONS_TOPIC, &predictions);
                self.stats.predictions_published += count as u64;
                count
            }
            Err(e) => {
                trace!("skipping predictions: {e}");
                0
            }
        }
    }
}

#[derive(Clone)]
pub struct PipelineHandle {
    sender: mpsc::Sender<PipelineCommand>,
}

impl PipelineHandle {
    pub fn spawn(
        state: Arc<TelemetryState>,
        hub: Hub,
        metric_rx: broadcast::Receiver<MetricEvent>,
        prediction_interval: Duration,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = PipelineActor::new(state, hub, metric_rx, cmd_rx, prediction_interval);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn stats(&self) -> Result<PipelineStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PipelineCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Publish predictions now, returns how many were published
    pub async fn publish_predictions(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PipelineCommand::PublishPredictions { respond_to: tx })
            .await
            .context("failed to send PublishPredictions command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PipelineCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
