//! Alert records produced by the anomaly engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert type key, used for throttling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Bandwidth,
    Latency,
    Cpu,
    Memory,
}

impl AlertKind {
    /// Resource exhaustion is critical, capacity and latency drift is a warning.
    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::Cpu => Severity::Critical,
            AlertKind::Bandwidth | AlertKind::Latency | AlertKind::Memory => Severity::Warning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Bandwidth => "bandwidth",
            AlertKind::Latency => "latency",
            AlertKind::Cpu => "cpu",
            AlertKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub description: String,
    pub recommended: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        description: impl Into<String>,
        recommended: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            description: description.into(),
            recommended: recommended.into(),
            timestamp,
        }
    }
}
