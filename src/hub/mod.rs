//! Topic based publish/subscribe hub
//!
//! ## Data flow
//!
//! ```text
//! publish(topic, data) ─► pending[topic] ─(full)─┐
//!                                                ├─► seal ─► Arc<SealedBatch> ─► try_send ─► subscriber queues
//! flusher tick ─► flush() ─► every pending batch ┘                                   │
//!                                                                        full/closed ─► evict
//! ```
//!
//! Every topic owns its pending queue behind its own lock. Sealing and
//! dispatch happen while that lock is held, so every subscriber observes a
//! topic's batches in seal order, while publishers on other topics proceed.
//! The topic map lock only guards lookups and is never held across a seal.
//! The subscription index is only read during dispatch; evictions take the
//! write lock once the read lock is released. Lock order is always topic
//! queue, then index.

pub mod batch;
pub mod compression;
pub mod pool;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

pub use batch::{BatchEnvelope, HubMessage, SealOptions, SealedBatch, decode_frame};

use crate::config::HubConfig;

pub type ClientId = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("unknown client {0}")]
    UnknownClient(ClientId),
}

/// Receiving end of a subscriber connection
#[derive(Debug)]
pub struct Subscriber {
    pub id: ClientId,
    pub rx: mpsc::Receiver<Arc<SealedBatch>>,
}

impl Subscriber {
    pub async fn recv(&mut self) -> Option<Arc<SealedBatch>> {
        self.rx.recv().await
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub clients: usize,
    /// Topics with at least one subscriber
    pub topics: usize,
    pub pending_messages: usize,
    pub messages_published: u64,
    pub batches_sealed: u64,
    pub compressed_batches: u64,
    pub subscribers_evicted: u64,
}

struct ClientEntry {
    tx: mpsc::Sender<Arc<SealedBatch>>,
    topics: HashSet<String>,
}

#[derive(Default)]
struct TopicIndex {
    topics: HashMap<String, HashSet<ClientId>>,
    clients: HashMap<ClientId, ClientEntry>,
}

impl TopicIndex {
    fn remove_client(&mut self, id: ClientId) -> bool {
        let Some(entry) = self.clients.remove(&id) else {
            return false;
        };

        for topic in entry.topics {
            if let Some(members) = self.topics.get_mut(&topic) {
                members.remove(&id);
                if members.is_empty() {
                    self.topics.remove(&topic);
                }
            }
        }

        true
    }
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    sealed: AtomicU64,
    compressed: AtomicU64,
    evicted: AtomicU64,
}

/// Messages of one topic waiting to be sealed
type TopicQueue = Arc<Mutex<Vec<HubMessage>>>;

struct HubInner {
    config: HubConfig,
    /// Per topic pending queues, the map lock is only held for lookups
    pending: Mutex<HashMap<String, TopicQueue>>,
    /// Messages queued across every topic
    pending_count: AtomicUsize,
    index: RwLock<TopicIndex>,
    next_client: AtomicU64,
    counters: Counters,
}

/// Cheaply cloneable handle to a shared hub
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                pending: Mutex::new(HashMap::new()),
                pending_count: AtomicUsize::new(0),
                index: RwLock::new(TopicIndex::default()),
                next_client: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Queue `data` on `topic`. Never blocks on subscribers or on other topics.
    pub fn publish(&self, topic: &str, data: serde_json::Value) {
        let message = HubMessage {
            topic: topic.to_string(),
            data,
            time: Utc::now(),
        };
        self.inner.counters.published.fetch_add(1, Ordering::Relaxed);

        let queue = self.topic_queue(topic);
        let mut pending = queue.lock();
        pending.push(message);
        self.inner.pending_count.fetch_add(1, Ordering::Relaxed);

        if pending.len() >= self.inner.config.max_batch_size.max(1) {
            let messages = std::mem::take(&mut *pending);
            self.inner
                .pending_count
                .fetch_sub(messages.len(), Ordering::Relaxed);
            self.seal_and_dispatch(topic, messages);
        }
    }

    /// Serialize `value` and publish it
    pub fn publish_json<T: Serialize>(&self, topic: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(data) => self.publish(topic, data),
            Err(e) => error!("failed to serialize message for topic {topic}: {e}"),
        }
    }

    /// Seal and dispatch every non-empty pending batch
    pub fn flush(&self) {
        let queues: Vec<(String, TopicQueue)> = self
            .inner
            .pending
            .lock()
            .iter()
            .map(|(topic, queue)| (topic.clone(), Arc::clone(queue)))
            .collect();

        for (topic, queue) in queues {
            let mut pending = queue.lock();
            if pending.is_empty() {
                continue;
            }
            let messages = std::mem::take(&mut *pending);
            self.inner
                .pending_count
                .fetch_sub(messages.len(), Ordering::Relaxed);
            self.seal_and_dispatch(&topic, messages);
        }
    }

    /// Flush on the configured batching interval until the task is aborted
    pub fn spawn_flusher(&self) -> JoinHandle<()> {
        let hub = self.clone();
        let period = self.inner.config.batch_interval();

        tokio::spawn(async move {
            debug!("starting hub flusher every {period:?}");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                hub.flush();
            }
        })
    }

    /// Register a new subscriber with no topics
    pub fn connect(&self) -> Subscriber {
        let id = self.inner.next_client.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.config.client_queue_capacity.max(1));

        self.inner.index.write().clients.insert(
            id,
            ClientEntry {
                tx,
                topics: HashSet::new(),
            },
        );
        debug!("client {id} connected");

        Subscriber { id, rx }
    }

    /// Remove a subscriber from every index and close its queue
    pub fn disconnect(&self, id: ClientId) -> Result<(), HubError> {
        if self.inner.index.write().remove_client(id) {
            debug!("client {id} disconnected");
            Ok(())
        } else {
            Err(HubError::UnknownClient(id))
        }
    }

    pub fn subscribe(&self, id: ClientId, topic: &str) -> Result<(), HubError> {
        let mut guard = self.inner.index.write();
        let index = &mut *guard;
        let entry = index
            .clients
            .get_mut(&id)
            .ok_or(HubError::UnknownClient(id))?;

        if entry.topics.insert(topic.to_string()) {
            index
                .topics
                .entry(topic.to_string())
                .or_default()
                .insert(id);
            trace!("client {id} subscribed to {topic}");
        }

        Ok(())
    }

    pub fn unsubscribe(&self, id: ClientId, topic: &str) -> Result<(), HubError> {
        let mut guard = self.inner.index.write();
        let index = &mut *guard;
        let entry = index
            .clients
            .get_mut(&id)
            .ok_or(HubError::UnknownClient(id))?;

        if entry.topics.remove(topic) {
            if let Some(members) = index.topics.get_mut(topic) {
                members.remove(&id);
                if members.is_empty() {
                    index.topics.remove(topic);
                }
            }
            trace!("client {id} unsubscribed from {topic}");
        }

        Ok(())
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.inner.index.read().clients.contains_key(&id)
    }

    /// Topics `id` is subscribed to, sorted
    pub fn topics_of(&self, id: ClientId) -> Result<Vec<String>, HubError> {
        let index = self.inner.index.read();
        let entry = index.clients.get(&id).ok_or(HubError::UnknownClient(id))?;
        let mut topics: Vec<_> = entry.topics.iter().cloned().collect();
        topics.sort();
        Ok(topics)
    }

    /// Subscribers of `topic`, sorted
    pub fn subscribers_of(&self, topic: &str) -> Vec<ClientId> {
        let mut ids: Vec<_> = self
            .inner
            .index
            .read()
            .topics
            .get(topic)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn stats(&self) -> HubStats {
        let pending_messages = self.inner.pending_count.load(Ordering::Relaxed);
        let (clients, topics) = {
            let index = self.inner.index.read();
            (index.clients.len(), index.topics.len())
        };
        let counters = &self.inner.counters;

        HubStats {
            clients,
            topics,
            pending_messages,
            messages_published: counters.published.load(Ordering::Relaxed),
            batches_sealed: counters.sealed.load(Ordering::Relaxed),
            compressed_batches: counters.compressed.load(Ordering::Relaxed),
            subscribers_evicted: counters.evicted.load(Ordering::Relaxed),
        }
    }

    fn topic_queue(&self, topic: &str) -> TopicQueue {
        let mut pending = self.inner.pending.lock();
        if let Some(queue) = pending.get(topic) {
            return Arc::clone(queue);
        }
        Arc::clone(pending.entry(topic.to_string()).or_default())
    }

    /// Must be called with the topic's queue lock held
    fn seal_and_dispatch(&self, topic: &str, messages: Vec<HubMessage>) {
        let options = SealOptions {
            compression_min_size: self.inner.config.compression_min_size,
            compression_level: self.inner.config.compression_level,
        };

        let batch = match SealedBatch::seal(topic, messages, options) {
            Ok(batch) => Arc::new(batch),
            Err(e) => {
                error!("failed to seal batch for topic {topic}: {e}");
                return;
            }
        };

        let counters = &self.inner.counters;
        counters.sealed.fetch_add(1, Ordering::Relaxed);
        if batch.compressed {
            counters.compressed.fetch_add(1, Ordering::Relaxed);
        }

        let faulty: Vec<ClientId> = {
            let index = self.inner.index.read();
            let Some(members) = index.topics.get(topic) else {
                trace!("batch {} on {topic} has no subscribers", batch.batch_id);
                return;
            };

            members
                .iter()
                .filter(|id| {
                    index
                        .clients
                        .get(*id)
                        .is_none_or(|entry| entry.tx.try_send(batch.clone()).is_err())
                })
                .copied()
                .collect()
        };

        trace!(
            "dispatched batch {} ({} messages) on {topic}",
            batch.batch_id, batch.message_count
        );

        if faulty.is_empty() {
            return;
        }

        let mut index = self.inner.index.write();
        for id in faulty {
            if index.remove_client(id) {
                warn!("evicting client {id}: outbound queue full or closed");
                counters.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }
        debug!("{} clients remain connected", index.clients.len());
    }
}
