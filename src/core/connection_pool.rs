//! Health-checked pool of reusable connections.
//!
//! - Live connections (idle + checked out) never exceed `max_connections`:
//!   a slot is reserved with a CAS loop before the factory is called.
//! - The idle set is a bounded lock-free MPMC channel.
//! - Callers blocked in [`ConnectionPool::acquire`] park on a
//!   [`tokio::sync::Notify`] and give up when their token is cancelled.
//! - A background monitor drains the idle set once per `check_interval`,
//!   re-validates every connection, discards failures and tops the pool back
//!   up to `min_connections`.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionPoolConfig;
use crate::core::{ConnectionError, HealthChecker, LifetimeHealthChecker, MetricsSink, NoopMetrics};

/// Creates, validates and closes connections on behalf of the pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Connection handle managed by the pool.
    type Connection: Send + Sync + 'static;

    /// Open a new connection. Implementations should give up when `ctx` is
    /// cancelled.
    async fn create(&self, ctx: &CancellationToken) -> Result<Self::Connection, ConnectionError>;

    /// Check that an idle connection still works.
    async fn validate(&self, _conn: &Self::Connection) -> Result<(), ConnectionError> {
        Ok(())
    }

    /// Close a connection the pool no longer tracks.
    async fn close(&self, _conn: Self::Connection) -> Result<(), ConnectionError> {
        Ok(())
    }
}

/// A connection plus the bookkeeping the pool needs to retire it.
///
/// Dereferences to the underlying connection.
#[derive(Debug)]
pub struct PooledConnection<C> {
    conn: C,
    id: u64,
    created_at: Instant,
    last_used: Instant,
    usage_count: u64,
    healthy: bool,
}

impl<C> PooledConnection<C> {
    pub(crate) fn new(conn: C, id: u64) -> Self {
        let now = Instant::now();
        Self {
            conn,
            id,
            created_at: now,
            last_used: now,
            usage_count: 0,
            healthy: true,
        }
    }

    /// Pool-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// When the connection was opened.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the connection was last handed out or returned.
    #[must_use]
    pub const fn last_used(&self) -> Instant {
        self.last_used
    }

    /// How many times the connection was handed out.
    #[must_use]
    pub const fn usage_count(&self) -> u64 {
        self.usage_count
    }

    /// False once [`mark_unhealthy`](Self::mark_unhealthy) was called.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Flag the connection as broken so `release` closes it.
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    /// Time since the connection was opened.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time since the connection was last used.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_used.elapsed()
    }

    fn checkout(&mut self) {
        self.last_used = Instant::now();
        self.usage_count += 1;
    }

    fn into_inner(self) -> C {
        self.conn
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

/// Snapshot of connection pool state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Connections created and not yet closed.
    pub live: usize,
    /// Connections sitting in the idle set.
    pub idle: usize,
    /// Connections checked out by callers.
    pub in_use: usize,
    /// Configured lower bound.
    pub min_connections: usize,
    /// Configured upper bound.
    pub max_connections: usize,
    /// Connections opened since construction.
    pub total_created: u64,
    /// Connections closed since construction.
    pub total_closed: u64,
    /// Whether `close` has been called.
    pub closed: bool,
}

struct PoolInner<F: ConnectionFactory> {
    config: ConnectionPoolConfig,
    factory: F,
    checker: Arc<dyn HealthChecker<F::Connection>>,
    metrics: Arc<dyn MetricsSink>,
    idle_tx: Sender<PooledConnection<F::Connection>>,
    idle_rx: Receiver<PooledConnection<F::Connection>>,
    live: AtomicUsize,
    next_id: AtomicU64,
    total_created: AtomicU64,
    total_closed: AtomicU64,
    started: AtomicBool,
    closed: AtomicBool,
    released: Notify,
    monitor: CancellationToken,
}

/// Pool of connections produced by a [`ConnectionFactory`].
pub struct ConnectionPool<F: ConnectionFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool. No connection is opened until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: ConnectionPoolConfig, factory: F) -> Result<Self, ConnectionError> {
        config.validate().map_err(ConnectionError::InvalidConfig)?;
        let (idle_tx, idle_rx) = bounded(config.max_connections);
        let checker = Arc::new(LifetimeHealthChecker::from_config(&config));
        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                checker,
                metrics: Arc::new(NoopMetrics),
                idle_tx,
                idle_rx,
                live: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                total_created: AtomicU64::new(0),
                total_closed: AtomicU64::new(0),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                released: Notify::new(),
                monitor: CancellationToken::new(),
            }),
        })
    }

    /// Replace the stock [`LifetimeHealthChecker`]. Takes effect only before
    /// [`start`](Self::start).
    #[must_use]
    pub fn with_health_checker(mut self, checker: Arc<dyn HealthChecker<F::Connection>>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.checker = checker;
        } else {
            warn!("health checker ignored: connection pool already started");
        }
        self
    }

    /// Report events to `metrics`. Takes effect only before
    /// [`start`](Self::start).
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.metrics = metrics;
        } else {
            warn!("metrics sink ignored: connection pool already started");
        }
        self
    }

    /// Open `min_connections` connections and start the health monitor.
    /// Must be called from within a tokio runtime. Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::PoolClosed` if the pool was closed
    /// - the factory's error if any pre-warm connection fails to open
    pub async fn start(&self, ctx: &CancellationToken) -> Result<(), ConnectionError> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return Err(ConnectionError::PoolClosed);
        }
        if inner.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for _ in 0..inner.config.min_connections {
            let Some(slot) = inner.try_reserve() else {
                break;
            };
            let conn = inner.open(slot, ctx).await?;
            inner.put_idle(conn).await;
        }

        tokio::spawn(run_monitor(
            Arc::downgrade(inner),
            inner.monitor.clone(),
            inner.config.check_interval(),
        ));

        info!(
            min_connections = inner.config.min_connections,
            max_connections = inner.config.max_connections,
            check_interval = ?inner.config.check_interval(),
            "connection pool started"
        );
        Ok(())
    }

    /// Take an idle connection, open a new one while under
    /// `max_connections`, or wait until one is released.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::Cancelled` if `ctx` is cancelled while waiting
    /// - `ConnectionError::PoolClosed` if the pool is closed
    /// - the factory's error if opening a connection fails
    pub async fn acquire(
        &self,
        ctx: &CancellationToken,
    ) -> Result<PooledConnection<F::Connection>, ConnectionError> {
        let inner = &self.inner;
        let mut wait_started: Option<Instant> = None;

        loop {
            if inner.closed.load(Ordering::Acquire) {
                return Err(ConnectionError::PoolClosed);
            }
            if ctx.is_cancelled() {
                return Err(ConnectionError::Cancelled);
            }

            if let Ok(mut conn) = inner.idle_rx.try_recv() {
                conn.checkout();
                inner.report_wait(wait_started);
                trace!(conn_id = conn.id(), "acquired idle connection");
                return Ok(conn);
            }

            if let Some(slot) = inner.try_reserve() {
                let mut conn = inner.open(slot, ctx).await?;
                if inner.closed.load(Ordering::Acquire) {
                    let _ = inner.destroy(conn).await;
                    return Err(ConnectionError::PoolClosed);
                }
                conn.checkout();
                inner.report_wait(wait_started);
                return Ok(conn);
            }

            let notified = inner.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            // A release between the checks above and `enable` is not lost.
            if !inner.idle_rx.is_empty()
                || inner.live.load(Ordering::Acquire) < inner.config.max_connections
                || inner.closed.load(Ordering::Acquire)
            {
                continue;
            }

            wait_started.get_or_insert_with(Instant::now);
            trace!("connection pool saturated, waiting for release");
            tokio::select! {
                () = &mut notified => {}
                () = ctx.cancelled() => return Err(ConnectionError::Cancelled),
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// The connection is closed instead when the pool is closed, when the
    /// health checker reports it unhealthy, or when the idle set is full.
    pub async fn release(&self, mut conn: PooledConnection<F::Connection>) {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            let _ = inner.destroy(conn).await;
            return;
        }
        if !inner.checker.is_healthy(&conn) {
            debug!(conn_id = conn.id(), "closing unhealthy connection on release");
            let _ = inner.destroy(conn).await;
            return;
        }
        conn.last_used = Instant::now();
        inner.put_idle(conn).await;

        // Lost a race with `close`: it may have drained before our send.
        if inner.closed.load(Ordering::Acquire) {
            let _ = inner.drain_idle().await;
        }
    }

    /// Close the pool: stop the monitor, wake waiters and close every idle
    /// connection. Connections still checked out are closed on release.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the factory while closing; every
    /// idle connection is closed regardless.
    pub async fn close(&self) -> Result<(), ConnectionError> {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        inner.monitor.cancel();
        inner.released.notify_waiters();

        let result = inner.drain_idle().await;
        info!(
            live = inner.live.load(Ordering::Acquire),
            "connection pool closed"
        );
        result
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        let inner = &self.inner;
        let live = inner.live.load(Ordering::Acquire);
        let idle = inner.idle_rx.len();
        ConnectionStats {
            live,
            idle,
            in_use: live.saturating_sub(idle),
            min_connections: inner.config.min_connections,
            max_connections: inner.config.max_connections,
            total_created: inner.total_created.load(Ordering::Relaxed),
            total_closed: inner.total_closed.load(Ordering::Relaxed),
            closed: inner.closed.load(Ordering::Acquire),
        }
    }

    /// Run one health pass immediately instead of waiting for the monitor.
    pub async fn check_health(&self) {
        self.inner.health_pass().await;
    }
}

/// Dropping an unclosed pool stops the monitor and, when a tokio runtime is
/// current, closes idle connections on a spawned task. Outside a runtime idle
/// connections are dropped without [`ConnectionFactory::close`]; call
/// [`ConnectionPool::close`] for a deterministic shutdown.
impl<F: ConnectionFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        self.inner.monitor.cancel();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.released.notify_waiters();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let inner = Arc::clone(&self.inner);
            handle.spawn(async move {
                let _ = inner.drain_idle().await;
            });
        } else {
            debug!(
                idle = self.inner.idle_rx.len(),
                "connection pool dropped outside a runtime, idle connections not closed"
            );
        }
    }
}

impl<F: ConnectionFactory> PoolInner<F> {
    /// Reserve a live slot; `None` once `max_connections` is reached.
    fn try_reserve(&self) -> Option<SlotReservation<'_, F>> {
        let mut current = self.live.load(Ordering::Acquire);
        loop {
            if current >= self.config.max_connections {
                return None;
            }
            match self.live.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(SlotReservation {
                        inner: self,
                        filled: false,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Open a connection into a reserved slot. The slot is given back if
    /// creation fails or this future is dropped first.
    async fn open(
        &self,
        slot: SlotReservation<'_, F>,
        ctx: &CancellationToken,
    ) -> Result<PooledConnection<F::Connection>, ConnectionError> {
        match self.factory.create(ctx).await {
            Ok(conn) => {
                slot.fill();
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.total_created.fetch_add(1, Ordering::Relaxed);
                self.metrics.connection_created();
                debug!(conn_id = id, "connection opened");
                Ok(PooledConnection::new(conn, id))
            }
            Err(e) => {
                drop(slot);
                warn!(error = %e, "failed to open connection");
                Err(e)
            }
        }
    }

    /// Close a connection and free its slot, also when this future is
    /// dropped mid-close.
    async fn destroy(&self, conn: PooledConnection<F::Connection>) -> Result<(), ConnectionError> {
        let id = conn.id();
        let slot = SlotReservation {
            inner: self,
            filled: false,
        };
        let result = self.factory.close(conn.into_inner()).await;
        self.total_closed.fetch_add(1, Ordering::Relaxed);
        self.metrics.connection_closed();
        drop(slot);
        match &result {
            Ok(()) => debug!(conn_id = id, "connection closed"),
            Err(e) => warn!(conn_id = id, error = %e, "failed to close connection"),
        }
        result
    }

    async fn put_idle(&self, conn: PooledConnection<F::Connection>) {
        match self.idle_tx.try_send(conn) {
            Ok(()) => self.released.notify_one(),
            Err(TrySendError::Full(conn) | TrySendError::Disconnected(conn)) => {
                let _ = self.destroy(conn).await;
            }
        }
    }

    async fn drain_idle(&self) -> Result<(), ConnectionError> {
        let mut first_error = None;
        while let Ok(conn) = self.idle_rx.try_recv() {
            if let Err(e) = self.destroy(conn).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn report_wait(&self, wait_started: Option<Instant>) {
        if let Some(started) = wait_started {
            self.metrics.connection_waited(started.elapsed());
        }
    }

    /// Re-validate idle connections and top the pool up to `min_connections`.
    async fn health_pass(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }

        // Single non-blocking drain; acquire/release keep running meanwhile.
        let drained: Vec<_> = self.idle_rx.try_iter().collect();
        let checked = drained.len();
        let mut retired = 0usize;
        for conn in drained {
            let keep = self.checker.is_healthy(&conn)
                && !self.checker.should_replace(&conn)
                && self.factory.validate(&conn).await.is_ok();
            if keep {
                self.put_idle(conn).await;
            } else {
                retired += 1;
                debug!(conn_id = conn.id(), age = ?conn.age(), "retiring connection");
                let _ = self.destroy(conn).await;
            }
        }

        let ctx = self.monitor.child_token();
        let mut opened = 0usize;
        while !self.closed.load(Ordering::Acquire)
            && self.live.load(Ordering::Acquire) < self.config.min_connections
        {
            let Some(slot) = self.try_reserve() else {
                break;
            };
            match self.open(slot, &ctx).await {
                Ok(conn) => {
                    opened += 1;
                    self.put_idle(conn).await;
                }
                Err(_) => break,
            }
        }

        if self.closed.load(Ordering::Acquire) {
            let _ = self.drain_idle().await;
        }
        if retired > 0 || opened > 0 {
            info!(checked, retired, opened, "connection health pass");
        } else {
            trace!(checked, "connection health pass");
        }
    }
}

/// A live slot claimed by [`PoolInner::try_reserve`]. Dropping it unfilled
/// gives the slot back and wakes one waiter.
struct SlotReservation<'a, F: ConnectionFactory> {
    inner: &'a PoolInner<F>,
    filled: bool,
}

impl<F: ConnectionFactory> SlotReservation<'_, F> {
    fn fill(mut self) {
        self.filled = true;
    }
}

impl<F: ConnectionFactory> Drop for SlotReservation<'_, F> {
    fn drop(&mut self) {
        if !self.filled {
            self.inner.live.fetch_sub(1, Ordering::AcqRel);
            self.inner.released.notify_one();
        }
    }
}

async fn run_monitor<F: ConnectionFactory>(
    pool: Weak<PoolInner<F>>,
    token: CancellationToken,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = pool.upgrade() else { break };
        inner.health_pass().await;
    }
    debug!("connection health monitor stopped");
}
