//! Reuse of idle transport connections
//!
//! A library seam for outbound transports: anything implementing [`Probe`]
//! can be parked here between requests. The hub itself pushes over
//! server-side WebSockets and does not pool, so nothing inside this crate
//! holds a pool yet. [`TcpStream`] is supported out of the box.
//!
//! Liveness is checked before a connection is handed out and before it is
//! taken back. Checks never run under the pool lock.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tracing::trace;

/// How long an idle socket may stay silent before it counts as open
const TCP_LIVENESS_WAIT: Duration = Duration::from_millis(1);

/// A transport connection that can report whether it is still usable
#[async_trait]
pub trait Probe: Send + 'static {
    /// `false` when the connection must not be used again
    async fn probe(&mut self) -> bool;
}

#[async_trait]
impl Probe for TcpStream {
    /// An idle socket is usable while it has nothing to read. End of stream
    /// means the peer hung up, unread bytes mean the protocol is out of step.
    async fn probe(&mut self) -> bool {
        let mut buf = [0u8; 1];
        match tokio::time::timeout(TCP_LIVENESS_WAIT, self.peek(&mut buf)).await {
            Err(_) => true,
            Ok(_) => false,
        }
    }
}

/// Counters of a [`ConnectionPool`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Connections currently parked
    pub idle: usize,
    /// Connections handed out again after passing the liveness check
    pub reused: u64,
    /// Connections dropped because they failed the liveness check
    pub discarded: u64,
}

/// Bounded stack of idle connections, most recently released first
pub struct ConnectionPool<C> {
    /// Parked connections beyond this are dropped on release
    max_idle: usize,
    /// Idle connections, the last one is handed out first
    idle: Mutex<Vec<C>>,
    /// Reuse and discard counters, `idle` is filled in on read
    stats: Mutex<PoolStats>,
}

impl<C: Probe> ConnectionPool<C> {
    pub fn new(max_idle: usize) -> Self {
        Self {
            max_idle,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            stats: Mutex::new(PoolStats::default()),
        }
    }

    /// Upper bound on parked connections
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Connections currently parked
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle_count(),
            ..*self.stats.lock()
        }
    }

    /// Take a live idle connection, discarding dead ones on the way.
    ///
    /// `None` means the caller has to open a new connection.
    pub async fn acquire(&self) -> Option<C> {
        loop {
            let mut conn = self.idle.lock().pop()?;

            if conn.probe().await {
                self.stats.lock().reused += 1;
                return Some(conn);
            }

            trace!("discarding dead pooled connection");
            self.stats.lock().discarded += 1;
        }
    }

    /// Return a connection to the pool. It is dropped when it fails the
    /// liveness check or the pool is full.
    pub async fn release(&self, mut conn: C) {
        if !conn.probe().await {
            self.stats.lock().discarded += 1;
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }
}
