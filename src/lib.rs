pub mod actors;
pub mod alerts;
pub mod analysis;
#[cfg(feature = "api")]
pub mod api;
pub mod balancer;
pub mod config;
pub mod hub;
pub mod monitors;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// One host/network performance sample.
///
/// Counters are cumulative for the lifetime of a collection run, gauges are
/// instantaneous readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub timestamp: DateTime<Utc>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    /// Round-trip latency in milliseconds
    pub latency: f64,
    pub connections: usize,
    #[serde(default)]
    pub interfaces: Vec<String>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<GeoPoint>,
}

impl Metrics {
    /// Bytes sent plus bytes received.
    pub fn bandwidth_bytes(&self) -> f64 {
        (self.bytes_sent + self.bytes_received) as f64
    }

    /// Bandwidth in MiB, the unit the baseline uses.
    pub fn bandwidth_mib(&self) -> f64 {
        self.bandwidth_bytes() / BYTES_PER_MIB
    }

    pub fn packets(&self) -> f64 {
        (self.packets_sent + self.packets_received) as f64
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            bytes_sent: 0,
            bytes_received: 0,
            packets_sent: 0,
            packets_received: 0,
            latency: 0.0,
            connections: 0,
            interfaces: vec![],
            cpu_usage: 0.0,
            memory_usage: 0.0,
            disk_usage: 0.0,
            facility_id: None,
            coordinates: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}
