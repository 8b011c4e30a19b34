//! Local host sampling via `sysinfo` plus TCP connect latency probes

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use sysinfo::{Disks, Networks, System};
use tokio::net::TcpStream;
use tracing::{instrument, trace};

use crate::{Metrics, config::SamplerConfig};

/// Reported when no latency probe succeeds
pub const UNREACHABLE_LATENCY_MS: f64 = 1000.0;

/// Anything that can produce a [`Metrics`] sample on demand
#[async_trait]
pub trait MetricsSource: Send + 'static {
    async fn sample(&mut self) -> anyhow::Result<Metrics>;
}

/// CPU, memory and disk utilisation in percent
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

/// Cumulative interface counters summed over every interface
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkTotals {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub interfaces: Vec<String>,
}

pub struct SystemSampler {
    system: System,
    disks: Disks,
    networks: Networks,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // the first usage reading needs a previous refresh to diff against
        system.refresh_cpu_usage();
        system.refresh_memory();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    pub fn resources(&mut self) -> ResourceUsage {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.disks.refresh(true);

        let memory = percent(self.system.used_memory(), self.system.total_memory());

        let (total, available) = self
            .disks
            .iter()
            .fold((0u64, 0u64), |(total, available), disk| {
                (total + disk.total_space(), available + disk.available_space())
            });
        let disk = percent(total.saturating_sub(available), total);

        ResourceUsage {
            cpu: (self.system.global_cpu_usage() as f64).clamp(0.0, 100.0),
            memory,
            disk,
        }
    }

    pub fn network(&mut self) -> NetworkTotals {
        self.networks.refresh(true);

        let mut totals = NetworkTotals::default();
        for (name, data) in self.networks.iter() {
            totals.bytes_sent += data.total_transmitted();
            totals.bytes_received += data.total_received();
            totals.packets_sent += data.total_packets_transmitted();
            totals.packets_received += data.total_packets_received();
            totals.interfaces.push(name.clone());
        }
        totals.interfaces.sort();

        totals
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}

/// Median TCP connect time to `hosts` in milliseconds
#[instrument(skip_all)]
pub async fn measure_latency(hosts: &[String], timeout: Duration) -> f64 {
    let mut samples = Vec::with_capacity(hosts.len());

    for host in hosts {
        let started = Instant::now();
        match tokio::time::timeout(timeout, TcpStream::connect(host.as_str())).await {
            Ok(Ok(_stream)) => samples.push(started.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(e)) => trace!("latency probe to {host} failed: {e}"),
            Err(_) => trace!("latency probe to {host} timed out"),
        }
    }

    median(&mut samples).unwrap_or(UNREACHABLE_LATENCY_MS)
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Samples this host: resources, interface counters and probe latency
pub struct LocalSampler {
    config: SamplerConfig,
    system: SystemSampler,
}

impl LocalSampler {
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            system: SystemSampler::new(),
        }
    }
}

#[async_trait]
impl MetricsSource for LocalSampler {
    async fn sample(&mut self) -> anyhow::Result<Metrics> {
        let resources = self.system.resources();
        let network = self.system.network();
        let latency =
            measure_latency(&self.config.latency_hosts, self.config.probe_timeout()).await;

        Ok(Metrics {
            timestamp: Utc::now(),
            bytes_sent: network.bytes_sent,
            bytes_received: network.bytes_received,
            packets_sent: network.packets_sent,
            packets_received: network.packets_received,
            latency,
            connections: network.interfaces.len(),
            interfaces: network.interfaces,
            cpu_usage: resources.cpu,
            memory_usage: resources.memory,
            disk_usage: resources.disk,
            facility_id: self.config.facility_id.clone(),
            coordinates: self.config.coordinates,
        })
    }
}
