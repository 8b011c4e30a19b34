use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

use crate::GeoPoint;

/// Top-level configuration file
///
/// Every section is optional; a missing section falls back to its defaults.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub baseline: BaselineConfig,

    #[serde(default)]
    pub predictor: PredictorConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub balancer: BalancerConfig,

    #[serde(default)]
    pub api: ApiSection,
}

/// Local system sampler settings
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_sample_interval")]
    pub interval_secs: u64,

    /// `host:port` targets used for TCP connect latency probes
    #[serde(default = "default_latency_hosts")]
    pub latency_hosts: Vec<String>,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    pub facility_id: Option<String>,

    pub coordinates: Option<GeoPoint>,
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sample_interval(),
            latency_hosts: default_latency_hosts(),
            probe_timeout_ms: default_probe_timeout(),
            facility_id: None,
            coordinates: None,
        }
    }
}

/// Multiplicative anomaly thresholds relative to the baseline
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AnomalyThresholds {
    #[serde(default = "default_bandwidth_factor")]
    pub bandwidth: f64,

    #[serde(default = "default_latency_factor")]
    pub latency: f64,

    #[serde(default = "default_cpu_factor")]
    pub cpu: f64,

    #[serde(default = "default_memory_factor")]
    pub memory: f64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            bandwidth: default_bandwidth_factor(),
            latency: default_latency_factor(),
            cpu: default_cpu_factor(),
            memory: default_memory_factor(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BaselineConfig {
    /// Ring buffer capacity (N)
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    #[serde(default = "default_update_period")]
    pub update_period_secs: u64,

    /// Minimum time between two alerts of the same kind
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_secs: u64,

    #[serde(default = "default_baseline_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub thresholds: AnomalyThresholds,
}

impl BaselineConfig {
    pub fn update_period(&self) -> Duration {
        Duration::from_secs(self.update_period_secs.max(1))
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        saturating_seconds(self.alert_cooldown_secs)
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            update_period_secs: default_update_period(),
            alert_cooldown_secs: default_alert_cooldown(),
            path: default_baseline_path(),
            thresholds: AnomalyThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PredictorConfig {
    /// Historical window capacity (W)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_horizon")]
    pub horizon_secs: u64,

    /// How often fresh predictions are pushed to subscribers
    #[serde(default = "default_prediction_interval")]
    pub publish_interval_secs: u64,
}

impl PredictorConfig {
    pub fn horizon(&self) -> chrono::Duration {
        saturating_seconds(self.horizon_secs)
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs.max(1))
    }
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            horizon_secs: default_horizon(),
            publish_interval_secs: default_prediction_interval(),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PipelineConfig {
    /// Recent samples kept for the query surface
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Recently emitted alerts kept for the query surface
    #[serde(default = "default_alert_log_size")]
    pub alert_log_size: usize,

    /// Capacity of the sample broadcast channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            alert_log_size: default_alert_log_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Batching, compression and fan-out settings of the publish hub
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HubConfig {
    /// Pending messages are sealed at least this often
    #[serde(default = "default_batch_interval")]
    pub batch_interval_ms: u64,

    /// A topic is sealed early once this many messages are pending
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Outbound queue capacity per subscriber
    #[serde(default = "default_client_queue")]
    pub client_queue_capacity: usize,

    /// Envelopes larger than this many bytes are gzip compressed
    #[serde(default = "default_compression_min_size")]
    pub compression_min_size: usize,

    /// gzip level, 0 (store) to 9 (best)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// Topics a new push connection is subscribed to
    #[serde(default = "default_topics")]
    pub default_topics: Vec<String>,
}

impl HubConfig {
    /// Seal period, never zero
    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms.max(1))
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            batch_interval_ms: default_batch_interval(),
            max_batch_size: default_max_batch_size(),
            client_queue_capacity: default_client_queue(),
            compression_min_size: default_compression_min_size(),
            compression_level: default_compression_level(),
            default_topics: default_topics(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    Weighted,
    RoundRobin,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BalancerConfig {
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Health at or below this is excluded while a healthier instance exists
    #[serde(default = "default_viability_floor")]
    pub viability_floor: f64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Host advertised for this process; defaults to the machine host name
    pub host: Option<String>,
}

impl BalancerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            viability_floor: default_viability_floor(),
            poll_interval_secs: default_poll_interval(),
            host: None,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSection {
    pub bind: Option<SocketAddr>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            bind: None,
            enable_cors: true,
        }
    }
}

fn default_sample_interval() -> u64 {
    6
}

fn default_latency_hosts() -> Vec<String> {
    vec!["8.8.8.8:80".to_string(), "1.1.1.1:80".to_string()]
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_bandwidth_factor() -> f64 {
    2.0
}

fn default_latency_factor() -> f64 {
    1.5
}

fn default_cpu_factor() -> f64 {
    1.8
}

fn default_memory_factor() -> f64 {
    1.5
}

fn default_sample_size() -> usize {
    100
}

fn default_update_period() -> u64 {
    60 * 60
}

fn default_alert_cooldown() -> u64 {
    60
}

fn default_baseline_path() -> PathBuf {
    PathBuf::from("./baseline.json")
}

fn default_window_size() -> usize {
    600
}

fn default_horizon() -> u64 {
    60 * 60
}

fn default_prediction_interval() -> u64 {
    60
}

fn default_history_size() -> usize {
    600
}

fn default_alert_log_size() -> usize {
    100
}

fn default_channel_capacity() -> usize {
    256
}

fn default_batch_interval() -> u64 {
    100
}

fn default_max_batch_size() -> usize {
    100
}

fn default_client_queue() -> usize {
    256
}

fn default_compression_min_size() -> usize {
    512
}

fn default_compression_level() -> u32 {
    6
}

fn default_topics() -> Vec<String> {
    vec!["metrics".to_string(), "alerts".to_string()]
}

fn default_viability_floor() -> f64 {
    0.1
}

fn default_poll_interval() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

/// Longest configurable span, keeps `now + span` representable
const MAX_SPAN_SECS: i64 = 100 * 365 * 24 * 60 * 60;

fn saturating_seconds(secs: u64) -> chrono::Duration {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(MAX_SPAN_SECS);
    chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
