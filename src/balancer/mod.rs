//! Local load balancing across service instances
//!
//! The registry maps instance ids to their last reported load and health.
//! Selection is delegated to a [`SelectionStrategy`]; both built-in
//! strategies prefer instances whose health is above the viability floor and
//! fall back to every instance when none qualifies.

pub mod monitor;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::{BalancerConfig, StrategyKind};

pub use monitor::{LoadMonitor, health_score, load_factor};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BalancerError {
    #[error("unknown instance {0}")]
    UnknownInstance(String),
}

/// A backend the balancer can route to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Registry key, also the tie breaker between equal weights
    pub id: String,
    pub host: String,
    pub port: u16,
    /// Fraction of capacity in use, in [0, 1]
    pub load: f64,
    /// 1 is fully healthy, at or below the strategy floor it is not viable
    pub health: f64,
    /// Time of the last registration or metric update
    pub last_updated: DateTime<Utc>,
}

impl ServiceInstance {
    /// Idle and fully healthy
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
            load: 0.0,
            health: 1.0,
            last_updated: Utc::now(),
        }
    }

    /// Clamped into [0, 1]
    pub fn with_load(mut self, load: f64) -> Self {
        self.load = clamp_unit(load);
        self
    }

    pub fn with_health(mut self, health: f64) -> Self {
        self.health = clamp_unit(health);
        self
    }

    /// `(1 - load) * health`
    pub fn weight(&self) -> f64 {
        (1.0 - self.load) * self.health
    }
}

/// Load and health of one instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceLoad {
    pub load: f64,
    pub health: f64,
}

/// Picks one instance out of a registry snapshot ordered by id
pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance>;
}

/// Instances with health above `floor`, or all of them if none qualifies
fn viable(instances: &[ServiceInstance], floor: f64) -> Vec<&ServiceInstance> {
    let healthy: Vec<_> = instances.iter().filter(|i| i.health > floor).collect();
    if healthy.is_empty() {
        instances.iter().collect()
    } else {
        healthy
    }
}

/// Deterministic argmax of `(1 - load) * health`, ties broken by lowest id
#[derive(Debug, Clone)]
pub struct WeightedStrategy {
    floor: f64,
}

impl WeightedStrategy {
    pub fn new(floor: f64) -> Self {
        Self { floor }
    }
}

impl Default for WeightedStrategy {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl SelectionStrategy for WeightedStrategy {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        viable(instances, self.floor)
            .into_iter()
            .reduce(|best, candidate| {
                // strictly greater keeps the earlier (lower) id on ties
                if candidate.weight() > best.weight() {
                    candidate
                } else {
                    best
                }
            })
    }
}

/// Cycles through the viable instances
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    floor: f64,
    next: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new(floor: f64) -> Self {
        Self {
            floor,
            next: AtomicUsize::new(0),
        }
    }
}

impl SelectionStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn select<'a>(&self, instances: &'a [ServiceInstance]) -> Option<&'a ServiceInstance> {
        let candidates = viable(instances, self.floor);
        if candidates.is_empty() {
            return None;
        }
        let turn = self.next.fetch_add(1, Ordering::Relaxed);
        Some(candidates[turn % candidates.len()])
    }
}

pub struct LoadBalancer {
    instances: RwLock<BTreeMap<String, ServiceInstance>>,
    strategy: Box<dyn SelectionStrategy>,
}

impl LoadBalancer {
    pub fn new(strategy: Box<dyn SelectionStrategy>) -> Self {
        Self {
            instances: RwLock::new(BTreeMap::new()),
            strategy,
        }
    }

    pub fn from_config(config: &BalancerConfig) -> Self {
        let strategy: Box<dyn SelectionStrategy> = match config.strategy {
            StrategyKind::Weighted => Box::new(WeightedStrategy::new(config.viability_floor)),
            StrategyKind::RoundRobin => Box::new(RoundRobinStrategy::new(config.viability_floor)),
        };
        Self::new(strategy)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Insert or overwrite an instance
    pub fn register_instance(&self, mut instance: ServiceInstance) {
        instance.load = clamp_unit(instance.load);
        instance.health = clamp_unit(instance.health);
        instance.last_updated = Utc::now();

        debug!(
            "registering instance {} at {}:{}",
            instance.id, instance.host, instance.port
        );
        self.instances.write().insert(instance.id.clone(), instance);
    }

    pub fn unregister_instance(&self, id: &str) -> Result<ServiceInstance, BalancerError> {
        self.instances
            .write()
            .remove(id)
            .ok_or_else(|| BalancerError::UnknownInstance(id.to_string()))
            .inspect(|_| debug!("unregistered instance {id}"))
    }

    pub fn update_load(&self, id: &str, load: f64) -> Result<(), BalancerError> {
        self.update(id, |instance| instance.load = clamp_unit(load))
    }

    pub fn update_health(&self, id: &str, health: f64) -> Result<(), BalancerError> {
        self.update(id, |instance| instance.health = clamp_unit(health))
    }

    /// Replace load and health together, readers never see one without the other
    pub fn update_metrics(&self, id: &str, load: f64, health: f64) -> Result<(), BalancerError> {
        self.update(id, |instance| {
            instance.load = clamp_unit(load);
            instance.health = clamp_unit(health);
        })
    }

    fn update(
        &self,
        id: &str,
        apply: impl FnOnce(&mut ServiceInstance),
    ) -> Result<(), BalancerError> {
        let mut instances = self.instances.write();
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| BalancerError::UnknownInstance(id.to_string()))?;

        apply(instance);
        instance.last_updated = Utc::now();
        trace!(
            "instance {id}: load {:.2}, health {:.2}",
            instance.load, instance.health
        );

        Ok(())
    }

    pub fn select_instance(&self) -> Option<ServiceInstance> {
        let instances = self.instances.read();
        let snapshot: Vec<ServiceInstance> = instances.values().cloned().collect();
        drop(instances);

        self.strategy.select(&snapshot).cloned()
    }

    /// Mean load over all instances, 0 when empty
    pub fn average_load(&self) -> f64 {
        let instances = self.instances.read();
        if instances.is_empty() {
            return 0.0;
        }
        instances.values().map(|i| i.load).sum::<f64>() / instances.len() as f64
    }

    pub fn instance_metrics(&self) -> BTreeMap<String, InstanceLoad> {
        self.instances
            .read()
            .iter()
            .map(|(id, i)| {
                (
                    id.clone(),
                    InstanceLoad {
                        load: i.load,
                        health: i.health,
                    },
                )
            })
            .collect()
    }

    /// Snapshot ordered by id
    pub fn instances(&self) -> Vec<ServiceInstance> {
        self.instances.read().values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<ServiceInstance> {
        self.instances.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(Box::new(WeightedStrategy::default()))
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
