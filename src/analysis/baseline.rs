//! Adaptive baseline and anomaly detection
//!
//! ## Lifecycle
//!
//! ```text
//! startup ─► load persisted baseline ─(missing/corrupt)─► defaults, persist
//!
//! add_sample ─► ring buffer (capacity N, FIFO eviction)
//!
//! every update period:
//!   ring.len() >= N/2 ─► mean over ring ─► swap baseline ─► persist (best effort)
//!   otherwise         ─► keep the stale baseline
//!
//! detect_anomalies(sample):
//!   metric > baseline * factor && throttle permits ─► Alert
//! ```
//!
//! The baseline record is always replaced as a whole, readers take a copy.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use super::throttle::AlertThrottle;
use crate::{
    Metrics,
    alerts::{Alert, AlertKind},
    config::{AnomalyThresholds, BaselineConfig},
};

/// Rolling reference aggregate of "normal" metric values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// MiB per sample (bytes sent + received)
    pub average_bandwidth: f64,
    /// Milliseconds
    pub average_latency: f64,
    pub cpu_baseline: f64,
    pub memory_baseline: f64,
    pub disk_baseline: f64,
    pub packets_baseline: f64,
    pub updated_at: DateTime<Utc>,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            average_bandwidth: 100.0,
            average_latency: 100.0,
            cpu_baseline: 50.0,
            memory_baseline: 50.0,
            disk_baseline: 50.0,
            packets_baseline: 0.0,
            updated_at: Utc::now(),
        }
    }
}

impl Baseline {
    /// Arithmetic means over `samples`, `None` when there are none.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Metrics>) -> Option<Self> {
        let mut count = 0usize;
        let mut totals = [0.0f64; 6];

        for sample in samples {
            count += 1;
            totals[0] += sample.bandwidth_mib();
            totals[1] += sample.latency;
            totals[2] += sample.cpu_usage;
            totals[3] += sample.memory_usage;
            totals[4] += sample.disk_usage;
            totals[5] += sample.packets();
        }

        if count == 0 {
            return None;
        }

        let n = count as f64;
        Some(Self {
            average_bandwidth: totals[0] / n,
            average_latency: totals[1] / n,
            cpu_baseline: totals[2] / n,
            memory_baseline: totals[3] / n,
            disk_baseline: totals[4] / n,
            packets_baseline: totals[5] / n,
            updated_at: Utc::now(),
        })
    }
}

/// Durable storage for the baseline record
pub trait BaselineStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Baseline>;

    fn save(&self, baseline: &Baseline) -> anyhow::Result<()>;
}

/// Stores the baseline as a pretty printed JSON document
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BaselineStore for JsonFileStore {
    fn load(&self) -> anyhow::Result<Baseline> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    fn save(&self, baseline: &Baseline) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(baseline)?;
        std::fs::write(&self.path, content)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

/// Keeps the baseline in memory only
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<Baseline>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baseline(baseline: Baseline) -> Self {
        Self {
            saved: Mutex::new(Some(baseline)),
        }
    }

    pub fn saved(&self) -> Option<Baseline> {
        *self.saved.lock()
    }
}

impl BaselineStore for MemoryStore {
    fn load(&self) -> anyhow::Result<Baseline> {
        self.saved().ok_or_else(|| anyhow::anyhow!("no baseline stored"))
    }

    fn save(&self, baseline: &Baseline) -> anyhow::Result<()> {
        *self.saved.lock() = Some(*baseline);
        Ok(())
    }
}

impl<S: BaselineStore + ?Sized> BaselineStore for Arc<S> {
    fn load(&self) -> anyhow::Result<Baseline> {
        (**self).load()
    }

    fn save(&self, baseline: &Baseline) -> anyhow::Result<()> {
        (**self).save(baseline)
    }
}

/// Maintains the sample ring, the current baseline and the alert throttle
pub struct BaselineMonitor {
    capacity: usize,
    thresholds: AnomalyThresholds,
    samples: Mutex<VecDeque<Metrics>>,
    baseline: RwLock<Baseline>,
    throttle: AlertThrottle,
    store: Box<dyn BaselineStore>,
}

impl BaselineMonitor {
    /// Create a monitor, restoring the persisted baseline if there is one.
    pub fn new(config: &BaselineConfig, store: Box<dyn BaselineStore>) -> Self {
        let baseline = match store.load() {
            Ok(baseline) => {
                info!("restored baseline from {}", baseline.updated_at);
                baseline
            }
            Err(e) => {
                debug!("no usable persisted baseline ({e:#}), seeding defaults");
                let baseline = Baseline::default();
                if let Err(e) = store.save(&baseline) {
                    warn!("failed to persist default baseline: {e:#}");
                }
                baseline
            }
        };

        let capacity = config.sample_size.max(1);

        Self {
            capacity,
            thresholds: config.thresholds,
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            baseline: RwLock::new(baseline),
            throttle: AlertThrottle::new(config.alert_cooldown()),
            store,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    /// Snapshot of the current baseline
    pub fn baseline(&self) -> Baseline {
        *self.baseline.read()
    }

    pub fn thresholds(&self) -> AnomalyThresholds {
        self.thresholds
    }

    /// Append a sample, evicting the oldest once the ring is full
    pub fn add_sample(&self, sample: Metrics) {
        let mut samples = self.samples.lock();
        if samples.len() >= self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Recompute the baseline from the ring.
    ///
    /// Returns `false` and keeps the current baseline when fewer than half of
    /// the ring's capacity is filled.
    #[instrument(skip(self))]
    pub fn recompute_baseline(&self) -> bool {
        let next = {
            let samples = self.samples.lock();
            if samples.len() < self.capacity / 2 {
                trace!(
                    "skipping baseline recompute: {}/{} samples",
                    samples.len(),
                    self.capacity
                );
                return false;
            }
            Baseline::from_samples(samples.iter())
        };

        let Some(next) = next else {
            return false;
        };

        *self.baseline.write() = next;
        debug!(
            "baseline updated: bandwidth {:.2} MiB, latency {:.1} ms, cpu {:.1}%, memory {:.1}%",
            next.average_bandwidth, next.average_latency, next.cpu_baseline, next.memory_baseline
        );

        if let Err(e) = self.store.save(&next) {
            warn!("failed to persist baseline: {e:#}");
        }

        true
    }

    /// Compare `sample` against the current baseline
    pub fn detect_anomalies(&self, sample: &Metrics) -> Vec<Alert> {
        self.detect_anomalies_at(sample, Utc::now())
    }

    /// Same as [`detect_anomalies`](Self::detect_anomalies) with an explicit clock
    pub fn detect_anomalies_at(&self, sample: &Metrics, now: DateTime<Utc>) -> Vec<Alert> {
        let baseline = self.baseline();
        let t = self.thresholds;

        let checks = [
            (
                AlertKind::Bandwidth,
                sample.bandwidth_mib(),
                baseline.average_bandwidth,
                t.bandwidth,
            ),
            (
                AlertKind::Latency,
                sample.latency,
                baseline.average_latency,
                t.latency,
            ),
            (AlertKind::Cpu, sample.cpu_usage, baseline.cpu_baseline, t.cpu),
            (
                AlertKind::Memory,
                sample.memory_usage,
                baseline.memory_baseline,
                t.memory,
            ),
        ];

        checks
            .into_iter()
            .filter(|(_, current, reference, factor)| *current > reference * factor)
            .filter(|(kind, ..)| {
                let permitted = self.throttle.try_acquire(*kind, now);
                if !permitted {
                    trace!("{kind} anomaly suppressed by throttle");
                }
                permitted
            })
            .map(|(kind, current, reference, _)| describe(kind, current, reference, now))
            .collect()
    }

    /// Recompute on a fixed period for as long as the returned task runs
    pub fn spawn_periodic_recompute(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let monitor = Arc::clone(self);

        tokio::spawn(async move {
            debug!("starting baseline recompute every {period:?}");
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                monitor.recompute_baseline();
            }
        })
    }
}

fn describe(kind: AlertKind, current: f64, reference: f64, now: DateTime<Utc>) -> Alert {
    match kind {
        AlertKind::Bandwidth => Alert::new(
            kind,
            format!("Bandwidth usage {current:.2} MB/s exceeds baseline {reference:.2} MB/s"),
            "Investigate potential network congestion or unusual traffic patterns",
            now,
        ),
        AlertKind::Latency => Alert::new(
            kind,
            format!("Network latency {current:.1} ms above normal level of {reference:.1} ms"),
            "Check network connectivity and routing",
            now,
        ),
        AlertKind::Cpu => Alert::new(
            kind,
            format!("CPU usage {current:.1}% significantly elevated (baseline {reference:.1}%)"),
            "Investigate high CPU processes and potential resource constraints",
            now,
        ),
        AlertKind::Memory => Alert::new(
            kind,
            format!("Memory usage {current:.1}% above baseline {reference:.1}%"),
            "Check for memory leaks and high memory consumers",
            now,
        ),
    }
}
