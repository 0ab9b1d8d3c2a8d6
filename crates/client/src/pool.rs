//! Bounded keep-alive connection pool.
//!
//! The pool caps concurrent connections per destination and in total, hands
//! out leases, and parks persistent connections for reuse in most-recently-
//! used order. All bookkeeping lives behind a plain mutex that is never held
//! across an await; waiters park on a [`Notify`] armed before each state
//! check so a release can never slip by unobserved.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use courier_http::transport::ClientTransport;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::connector::Connector;
use crate::error::ClientError;
use crate::route::Destination;

/// Capacity limits and idle-connection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Upper bound on connections across all destinations.
    pub max_total: usize,
    /// Upper bound on connections per destination.
    pub max_per_route: usize,
    /// How idle connections are vetted before reuse.
    pub idle_policy: IdlePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_total: 25, max_per_route: 5, idle_policy: IdlePolicy::ProbeAfter(Duration::from_secs(2)) }
    }
}

/// What to do with a parked connection before handing it out again.
///
/// A connection the server closed while it sat idle would fail its next
/// exchange; these policies trade that risk against per-lease overhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Reuse idle connections as-is.
    Unchecked,
    /// Discard connections idle for longer than the given duration.
    ExpireAfter(Duration),
    /// Probe connections idle for longer than the given duration via
    /// [`ClientTransport::is_open`], discarding dead ones.
    ProbeAfter(Duration),
}

/// Identifies one underlying connection across reuses.
///
/// Ids are unique per pool and stable for the lifetime of the connection, so
/// two responses carrying the same id travelled over the same connection. The
/// requester exposes the id through response extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Leased and idle counts, pool-wide or for one route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub leased: usize,
    pub idle: usize,
}

struct IdleConnection<T> {
    id: ConnectionId,
    transport: T,
    idle_since: Instant,
}

struct PoolState<T> {
    idle: HashMap<Destination, VecDeque<IdleConnection<T>>>,
    leased_per_route: HashMap<Destination, usize>,
    total_leased: usize,
}

struct PoolShared<T> {
    config: PoolConfig,
    state: Mutex<PoolState<T>>,
    released: Notify,
    next_id: AtomicU64,
}

impl<T> PoolShared<T> {
    fn lock(&self) -> MutexGuard<'_, PoolState<T>> {
        // the lock is never held across an await and no code path panics
        // while holding it
        self.state.lock().expect("pool state lock poisoned")
    }
}

/// Returns one leased slot to the route and total counters.
fn unlease<T>(state: &mut PoolState<T>, destination: &Destination) {
    if let Some(count) = state.leased_per_route.get_mut(destination) {
        *count -= 1;
        if *count == 0 {
            state.leased_per_route.remove(destination);
        }
    }
    state.total_leased = state.total_leased.saturating_sub(1);
}

enum Acquire<T> {
    /// An idle connection passed the idle policy.
    Reused(IdleConnection<T>),
    /// Capacity was reserved for a fresh connection.
    SlotReserved,
    /// Both caps are hit; wait for a release.
    Saturated,
}

/// The pool itself. Cloning is cheap and clones share state.
pub struct ConnectionPool<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<T: ClientTransport> fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("ConnectionPool").field("config", &self.shared.config).field("stats", &stats).finish()
    }
}

impl<T: ClientTransport> ConnectionPool<T> {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState { idle: HashMap::new(), leased_per_route: HashMap::new(), total_leased: 0 }),
                released: Notify::new(),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Leases a connection for the destination, reusing an idle one when
    /// possible and connecting otherwise. Blocks while both caps are hit,
    /// up to `timeout`.
    ///
    /// Capacity for a fresh connection is reserved before the connector runs,
    /// so a slow connect can never let the pool overshoot its caps. A failed
    /// connect gives the reservation back.
    pub async fn lease<C>(
        &self,
        destination: &Destination,
        timeout: Duration,
        connector: &C,
    ) -> Result<PooledConnection<T>, ClientError>
    where
        C: Connector<Transport = T>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.shared.released.notified();
            tokio::pin!(notified);
            // arm before inspecting state so a release between the check and
            // the await below cannot be missed
            notified.as_mut().enable();

            match self.try_acquire(destination) {
                Acquire::Reused(idle) => {
                    debug!(%destination, connection = %idle.id, "reusing idle connection");
                    return Ok(PooledConnection {
                        lease: Some(Lease {
                            id: idle.id,
                            destination: destination.clone(),
                            transport: idle.transport,
                            reused: true,
                        }),
                        shared: Arc::clone(&self.shared),
                    });
                }
                Acquire::SlotReserved => match connector.connect(destination).await {
                    Ok(transport) => {
                        let id = ConnectionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
                        debug!(%destination, connection = %id, "established new connection");
                        return Ok(PooledConnection {
                            lease: Some(Lease { id, destination: destination.clone(), transport, reused: false }),
                            shared: Arc::clone(&self.shared),
                        });
                    }
                    Err(e) => {
                        unlease(&mut self.shared.lock(), destination);
                        self.shared.released.notify_waiters();
                        return Err(ClientError::connect(destination.clone(), e));
                    }
                },
                Acquire::Saturated => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(ClientError::PoolExhausted { destination: destination.clone(), elapsed: timeout });
                    }
                }
            }
        }
    }

    /// Returns a leased connection. Persistent connections are parked at the
    /// front of their route's idle queue; others are dropped. Either way the
    /// lease's capacity is freed and waiters are woken.
    pub fn release(&self, mut connection: PooledConnection<T>, persistent: bool) {
        let Some(lease) = connection.lease.take() else { return };

        let discarded = {
            let mut state = self.shared.lock();
            unlease(&mut state, &lease.destination);
            if persistent {
                state
                    .idle
                    .entry(lease.destination)
                    .or_default()
                    .push_front(IdleConnection { id: lease.id, transport: lease.transport, idle_since: Instant::now() });
                None
            } else {
                Some(lease.transport)
            }
        };
        // the transport's own drop may do real work; keep it outside the lock
        drop(discarded);

        self.shared.released.notify_waiters();
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.lock();
        PoolStats { leased: state.total_leased, idle: state.idle.values().map(VecDeque::len).sum() }
    }

    pub fn route_stats(&self, destination: &Destination) -> PoolStats {
        let state = self.shared.lock();
        PoolStats {
            leased: state.leased_per_route.get(destination).copied().unwrap_or(0),
            idle: state.idle.get(destination).map_or(0, VecDeque::len),
        }
    }

    fn try_acquire(&self, destination: &Destination) -> Acquire<T> {
        let mut stale = Vec::new();
        let acquired = {
            let mut state = self.shared.lock();

            loop {
                let Some(idle) = state.idle.get_mut(destination).and_then(VecDeque::pop_front) else {
                    state.idle.remove(destination);
                    let per_route = state.leased_per_route.get(destination).copied().unwrap_or(0);
                    if per_route < self.shared.config.max_per_route && state.total_leased < self.shared.config.max_total
                    {
                        *state.leased_per_route.entry(destination.clone()).or_insert(0) += 1;
                        state.total_leased += 1;
                        break Acquire::SlotReserved;
                    }
                    break Acquire::Saturated;
                };
                if self.idle_is_usable(&idle) {
                    if state.idle.get(destination).is_some_and(VecDeque::is_empty) {
                        state.idle.remove(destination);
                    }
                    *state.leased_per_route.entry(destination.clone()).or_insert(0) += 1;
                    state.total_leased += 1;
                    break Acquire::Reused(idle);
                }
                debug!(%destination, connection = %idle.id, "discarding stale idle connection");
                stale.push(idle);
            }
        };
        // stale transports may do real work on drop; the lock is gone by now
        drop(stale);
        acquired
    }

    fn idle_is_usable(&self, idle: &IdleConnection<T>) -> bool {
        match self.shared.config.idle_policy {
            IdlePolicy::Unchecked => true,
            IdlePolicy::ExpireAfter(limit) => idle.idle_since.elapsed() <= limit,
            IdlePolicy::ProbeAfter(limit) => idle.idle_since.elapsed() <= limit || idle.transport.is_open(),
        }
    }
}

struct Lease<T> {
    id: ConnectionId,
    destination: Destination,
    transport: T,
    reused: bool,
}

/// A leased connection. Exactly one lease exists per live connection.
///
/// Return it through [`ConnectionPool::release`]; a lease that is merely
/// dropped frees its capacity but the connection is discarded, so forgetting
/// to release can never leak pool slots.
pub struct PooledConnection<T> {
    lease: Option<Lease<T>>,
    shared: Arc<PoolShared<T>>,
}

impl<T> PooledConnection<T> {
    pub fn id(&self) -> ConnectionId {
        self.lease.as_ref().map(|lease| lease.id).expect("lease already released")
    }

    pub fn destination(&self) -> &Destination {
        self.lease.as_ref().map(|lease| &lease.destination).expect("lease already released")
    }

    /// Whether this lease reused an idle connection rather than dialing a new
    /// one.
    pub fn is_reused(&self) -> bool {
        self.lease.as_ref().is_some_and(|lease| lease.reused)
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.lease.as_mut().map(|lease| &mut lease.transport).expect("lease already released")
    }
}

impl<T> fmt::Debug for PooledConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lease {
            Some(lease) => f
                .debug_struct("PooledConnection")
                .field("id", &lease.id)
                .field("destination", &lease.destination)
                .field("reused", &lease.reused)
                .finish(),
            None => f.debug_struct("PooledConnection").field("released", &true).finish(),
        }
    }
}

impl<T> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            if let Ok(mut state) = self.shared.state.lock() {
                unlease(&mut state, &lease.destination);
            }
            self.shared.released.notify_waiters();
        }
    }
}
