//! MetricCollectorActor - samples a [`MetricsSource`] on a fixed interval
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → source.sample() → Publish MetricEvent → [PipelineActor, ...]
//!     ↑
//!     └─── Commands (PollNow, UpdateInterval, Shutdown)
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::monitors::MetricsSource;

use super::messages::{CollectorCommand, MetricEvent};

pub struct MetricCollectorActor<S> {
    source: S,

    command_rx: mpsc::Receiver<CollectorCommand>,

    /// Broadcast sender for publishing samples
    metric_tx: broadcast::Sender<MetricEvent>,

    source_id: String,

    interval_duration: Duration,
}

impl<S: MetricsSource> MetricCollectorActor<S> {
    pub fn new(
        source: S,
        source_id: String,
        interval_duration: Duration,
        command_rx: mpsc::Receiver<CollectorCommand>,
        metric_tx: broadcast::Sender<MetricEvent>,
    ) -> Self {
        Self {
            source,
            command_rx,
            metric_tx,
            source_id,
            interval_duration,
        }
    }

    /// Runs until a Shutdown command is received or every handle is dropped
    #[instrument(skip(self), fields(source = %self.source_id))]
    pub async fn run(mut self) {
        debug!("starting collector actor");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_metrics().await {
                        error!("failed to collect metrics: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        CollectorCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let result = self.poll_metrics().await;
                            let _ = respond_to.send(result);
                        }

                        CollectorCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = interval(self.interval_duration);
                        }

                        CollectorCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("collector actor stopped");
    }

    async fn poll_metrics(&mut self) -> Result<()> {
        let metrics = self
            .source
            .sample()
            .await
            .context("failed to sample metrics")?;

        let event = MetricEvent {
            source_id: self.source_id.clone(),
            metrics,
            timestamp: Utc::now(),
        };

        // no receivers is fine, nobody may be listening yet
        match self.metric_tx.send(event) {
            Ok(num_receivers) => {
                trace!("published metric event to {num_receivers} receivers");
            }
            Err(_) => {
                trace!("no receivers for metric event");
            }
        }

        Ok(())
    }
}

/// Cloneable handle for controlling a MetricCollectorActor
#[derive(Clone)]
pub struct CollectorHandle {
    sender: mpsc::Sender<CollectorCommand>,

    pub source_id: String,
}

impl CollectorHandle {
    /// Create the actor, spawn it as a tokio task and return its handle
    pub fn spawn<S: MetricsSource>(
        source: S,
        source_id: impl Into<String>,
        interval: Duration,
        metric_tx: broadcast::Sender<MetricEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let source_id = source_id.into();

        let actor =
            MetricCollectorActor::new(source, source_id.clone(), interval, cmd_rx, metric_tx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            source_id,
        }
    }

    /// Sample immediately and wait for the result
    pub async fn poll_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CollectorCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(CollectorCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CollectorCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
