//! Descriptive statistics over the recent sample history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AnalysisError, Baseline};
use crate::{
    Metrics,
    alerts::{Alert, AlertKind, Severity},
};

/// Mean of every numeric field over a set of samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub sample_count: usize,
    pub bytes_sent: f64,
    pub bytes_received: f64,
    pub packets_sent: f64,
    pub packets_received: f64,
    pub latency: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
}

impl Averages {
    /// All zeros for an empty history
    pub fn from_samples(samples: &[Metrics]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut totals = Self::default();
        for sample in samples {
            totals.bytes_sent += sample.bytes_sent as f64;
            totals.bytes_received += sample.bytes_received as f64;
            totals.packets_sent += sample.packets_sent as f64;
            totals.packets_received += sample.packets_received as f64;
            totals.latency += sample.latency;
            totals.cpu_usage += sample.cpu_usage;
            totals.memory_usage += sample.memory_usage;
            totals.disk_usage += sample.disk_usage;
        }

        let n = samples.len() as f64;
        Self {
            sample_count: samples.len(),
            bytes_sent: totals.bytes_sent / n,
            bytes_received: totals.bytes_received / n,
            packets_sent: totals.packets_sent / n,
            packets_received: totals.packets_received / n,
            latency: totals.latency / n,
            cpu_usage: totals.cpu_usage / n,
            memory_usage: totals.memory_usage / n,
            disk_usage: totals.disk_usage / n,
        }
    }
}

/// Average, peak and net change of one metric over the history
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub average: f64,
    pub max: f64,
    /// Last value minus first value
    pub trend: f64,
    /// Relative deviation of the average from the baseline, in percent
    pub baseline_deviation: f64,
}

impl MetricStats {
    fn compute(values: &[f64], baseline: f64) -> Self {
        let average = values.iter().sum::<f64>() / values.len().max(1) as f64;
        let max = values.iter().copied().fold(0.0, f64::max);
        let trend = match (values.first(), values.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        let baseline_deviation = if baseline > 0.0 {
            (average - baseline) / baseline * 100.0
        } else {
            0.0
        };

        Self {
            average,
            max,
            trend,
            baseline_deviation,
        }
    }
}

/// Static limits applied to the history averages, `(warning, critical)`
const CPU_LIMITS: (f64, f64) = (70.0, 80.0);
const MEMORY_LIMITS: (f64, f64) = (80.0, 90.0);
const LATENCY_LIMITS: (f64, f64) = (150.0, 200.0);
/// MiB per sample
const BANDWIDTH_LIMITS: (f64, f64) = (600.0, 800.0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub sample_count: usize,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub cpu: MetricStats,
    pub memory: MetricStats,
    pub latency: MetricStats,
    /// MiB per sample
    pub bandwidth: MetricStats,
    pub baseline: Baseline,
    /// Findings from the static limits, independent of the alert throttle
    pub findings: Vec<Alert>,
}

/// Summarize `history` (oldest first) against `baseline`
pub fn summarize(
    history: &[Metrics],
    baseline: &Baseline,
) -> Result<NetworkSummary, AnalysisError> {
    let (Some(first), Some(last)) = (history.first(), history.last()) else {
        return Err(AnalysisError::InsufficientData {
            required: 1,
            available: 0,
        });
    };

    let series = |f: fn(&Metrics) -> f64| history.iter().map(f).collect::<Vec<_>>();

    let cpu = MetricStats::compute(&series(|m| m.cpu_usage), baseline.cpu_baseline);
    let memory = MetricStats::compute(&series(|m| m.memory_usage), baseline.memory_baseline);
    let latency = MetricStats::compute(&series(|m| m.latency), baseline.average_latency);
    let bandwidth =
        MetricStats::compute(&series(Metrics::bandwidth_mib), baseline.average_bandwidth);

    let now = Utc::now();
    let findings = [
        (AlertKind::Cpu, cpu.average, CPU_LIMITS, "%"),
        (AlertKind::Memory, memory.average, MEMORY_LIMITS, "%"),
        (AlertKind::Latency, latency.average, LATENCY_LIMITS, " ms"),
        (AlertKind::Bandwidth, bandwidth.average, BANDWIDTH_LIMITS, " MB/s"),
    ]
    .into_iter()
    .filter_map(|(kind, value, (warning, critical), unit)| {
        let severity = if value > critical {
            Severity::Critical
        } else if value > warning {
            Severity::Warning
        } else {
            return None;
        };

        Some(Alert {
            kind,
            severity,
            description: format!(
                "Average {kind} at {value:.2}{unit} over {} samples",
                history.len()
            ),
            recommended: recommendation(kind).to_string(),
            timestamp: now,
        })
    })
    .collect();

    Ok(NetworkSummary {
        sample_count: history.len(),
        from: first.timestamp,
        to: last.timestamp,
        cpu,
        memory,
        latency,
        bandwidth,
        baseline: *baseline,
        findings,
    })
}

fn recommendation(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::Cpu => "Identify the processes driving CPU load",
        AlertKind::Memory => "Monitor application memory consumption",
        AlertKind::Latency => "Check upstream links and routing",
        AlertKind::Bandwidth => "Review traffic sources and capacity headroom",
    }
}
