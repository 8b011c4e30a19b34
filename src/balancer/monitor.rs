//! Keeps this process's own instance entry current
//!
//! ```text
//! every poll interval: sample cpu/mem/disk ─► load, health ─► LoadBalancer
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, instrument, warn};

use super::{BalancerError, LoadBalancer};
use crate::config::BalancerConfig;
use crate::monitors::{ResourceUsage, SystemSampler};

/// `min(1, (cpu + memory) / 200)`
pub fn load_factor(usage: ResourceUsage) -> f64 {
    ((usage.cpu + usage.memory) / 200.0).clamp(0.0, 1.0)
}

/// Weighted headroom, 40 % cpu, 40 % memory, 20 % disk
pub fn health_score(usage: ResourceUsage) -> f64 {
    let headroom = |percent: f64| 1.0 - percent / 100.0;
    (0.4 * headroom(usage.cpu) + 0.4 * headroom(usage.memory) + 0.2 * headroom(usage.disk))
        .clamp(0.0, 1.0)
}

pub struct LoadMonitor {
    balancer: Arc<LoadBalancer>,
    instance_id: String,
}

impl LoadMonitor {
    pub fn new(balancer: Arc<LoadBalancer>, instance_id: impl Into<String>) -> Self {
        Self {
            balancer,
            instance_id: instance_id.into(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Push one resource reading into the registry
    pub fn apply(&self, usage: ResourceUsage) -> Result<(), BalancerError> {
        self.balancer
            .update_metrics(&self.instance_id, load_factor(usage), health_score(usage))
    }

    /// Sample the local system on the configured interval until aborted
    pub fn spawn(self, config: &BalancerConfig) -> JoinHandle<()> {
        let period = config.poll_interval();
        tokio::spawn(self.run(period))
    }

    #[instrument(skip(self), fields(instance = %self.instance_id))]
    async fn run(self, period: std::time::Duration) {
        debug!("starting load monitor every {period:?}");
        let mut sampler = SystemSampler::new();
        let mut ticker = interval(period);

        loop {
            ticker.tick().await;
            let usage = sampler.resources();
            if let Err(e) = self.apply(usage) {
                warn!("failed to update instance load: {e}");
            }
        }
    }
}
