//! Connection pool with least-loaded selection and supervision.
//!
//! The pool owns up to `pool_size` connections, dialed asynchronously at
//! construction and re-dialed when the supervisor reaps broken ones.
//! Borrowers pick the least-borrowed live connection under two admission
//! caps — the per-connection borrow cap and the per-connection in-flight
//! cap — and otherwise wait on a single-slot availability notification
//! bounded by the pool timeout.
//!
//! Availability signals come from unpredictable producers (the completion
//! callback of any future, a finished dial, an explicit put); a signal
//! arriving while the slot is full is dropped, so waiters always re-check
//! pool state after waking.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, warn};

use super::{Dialer, Options};
use crate::error::{Error, Result};
use crate::transport::connection::Connection;

// ============================================================================
// Constants
// ============================================================================

/// Gap between probe dials after dial errors saturate the pool.
const RETRY_DIAL_GAP: Duration = Duration::from_secs(1);

/// Supervisor ticks between pool status log lines.
const STATUS_LOG_EVERY: u64 = 5;

// ============================================================================
// ConnPool
// ============================================================================

/// Pool of [`Connection`]s with least-loaded borrow semantics.
pub struct ConnPool {
    options: Arc<Options>,
    dialer: Dialer,

    conns: RwLock<Vec<Arc<Connection>>>,

    closed: AtomicBool,
    /// Concurrent dial attempts in flight.
    opening: AtomicI32,
    /// Consecutive dial failures; saturation starts the probe loop.
    dial_errors: AtomicU32,
    last_dial_error: RwLock<Option<String>>,

    /// Single-slot availability notification for waiting borrowers.
    has_available_conn: Notify,
    /// Single-slot fast path to the supervisor; full sends are dropped.
    check_tx: mpsc::Sender<()>,
    /// Stops the supervisor.
    closed_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for ConnPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnPool")
            .field("options", &self.options)
            .field("closed", &self.closed)
            .field("opening", &self.opening)
            .field("dial_errors", &self.dial_errors)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnPool - Construction
// ============================================================================

impl ConnPool {
    /// Creates a pool and launches `pool_size` background dial attempts.
    ///
    /// Starts the supervisor when an alive-check interval is configured.
    #[must_use]
    pub fn new(options: Arc<Options>) -> Arc<Self> {
        Self::with_dialer(options, super::default_dialer())
    }

    /// Creates a pool with a substitute dial function.
    #[must_use]
    pub fn with_dialer(options: Arc<Options>, dialer: Dialer) -> Arc<Self> {
        let (check_tx, check_rx) = mpsc::channel(1);
        let (closed_tx, _) = watch::channel(false);

        let pool = Arc::new(Self {
            options: Arc::clone(&options),
            dialer,
            conns: RwLock::new(Vec::with_capacity(options.pool_size)),
            closed: AtomicBool::new(false),
            opening: AtomicI32::new(0),
            dial_errors: AtomicU32::new(0),
            last_dial_error: RwLock::new(None),
            has_available_conn: Notify::new(),
            check_tx,
            closed_tx,
        });

        pool.add_conns();
        if let Some(interval) = options.alive_check_interval {
            tokio::spawn(Arc::clone(&pool).supervisor(interval, check_rx));
        }

        info!(
            size = options.pool_size,
            get_timeout = ?options.pool_timeout,
            alive_freq = ?options.alive_check_interval,
            "create pool"
        );
        pool
    }
}

// ============================================================================
// ConnPool - Public API
// ============================================================================

impl ConnPool {
    /// Borrows the least-loaded live connection.
    ///
    /// Blocks up to `pool_timeout` for a slot when every connection is at
    /// capacity.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolClosed`] after [`close`](Self::close).
    /// - [`Error::GetConnTimeout`] when no slot freed up in time.
    pub async fn get(self: &Arc<Self>) -> Result<Arc<Connection>> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }
        self.borrow_conn(self.options.pool_timeout).await
    }

    /// Returns a borrowed connection.
    ///
    /// Invoked by future completion callbacks and by explicit callers on
    /// submit failure.
    pub fn put(self: &Arc<Self>, conn: &Arc<Connection>) {
        if self.is_closed() {
            error!("put conn on closed pool");
            return;
        }
        self.return_conn(conn);
    }

    /// Total number of pooled connections.
    #[must_use]
    pub fn size(&self) -> usize {
        self.conns.read().len()
    }

    /// Returns `true` once the pool has been closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the pool and every connection. Idempotent.
    pub fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        info!(size = self.size(), "close pool");
        let _ = self.closed_tx.send(true);

        let conns: Vec<Arc<Connection>> = {
            let mut list = self.conns.write();
            std::mem::take(&mut *list)
        };
        for conn in conns {
            conn.close();
        }
        // release any borrower still parked on the availability slot
        self.has_available_conn.notify_waiters();
    }

    /// The last dial failure, if any.
    #[must_use]
    pub fn last_dial_error(&self) -> Option<String> {
        self.last_dial_error.read().clone()
    }
}

// ============================================================================
// ConnPool - Dialing
// ============================================================================

impl ConnPool {
    /// Schedules background dials up to the configured size.
    fn add_conns(self: &Arc<Self>) {
        if self.opening.load(Ordering::Acquire) > 0 || self.is_closed() {
            debug!("pool is opening or closed");
            return;
        }
        if self.dial_errors.load(Ordering::Acquire) >= self.options.pool_size as u32 {
            debug!("dial errors saturated, waiting for probe");
            return;
        }

        let current = self.size();
        debug!(current, target = self.options.pool_size, "new conn async");
        for _ in current..self.options.pool_size {
            let pool = Arc::clone(self);
            tokio::spawn(async move { pool.new_conn().await });
        }
    }

    /// One background dial attempt.
    async fn new_conn(self: Arc<Self>) {
        if self.opening.fetch_add(1, Ordering::AcqRel) + 1 > self.options.pool_size as i32 {
            self.opening.fetch_sub(1, Ordering::AcqRel);
            return;
        }

        let dialed = self.dial_conn().await;
        self.opening.fetch_sub(1, Ordering::AcqRel);

        let Ok(conn) = dialed else {
            return;
        };

        let installed = {
            let mut conns = self.conns.write();
            if !self.is_closed() && conns.len() < self.options.pool_size {
                self.install_hooks(&conn);
                conns.push(Arc::clone(&conn));
                true
            } else {
                false
            }
        };

        if installed {
            self.announce_available_conn();
        } else {
            debug!(conn = %conn, "release conn as pool full");
            conn.close();
        }
    }

    /// Dials once, tracking consecutive failures.
    async fn dial_conn(self: &Arc<Self>) -> Result<Arc<Connection>> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }
        if self.dial_errors.load(Ordering::Acquire) >= self.options.pool_size as u32 {
            return Err(Error::connect(
                self.last_dial_error().unwrap_or_else(|| "dial failed".into()),
            ));
        }

        match (self.dialer)(Arc::clone(&self.options)).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                error!(error = %e, "dialer connect");
                self.set_last_dial_error(&e);
                if self.dial_errors.fetch_add(1, Ordering::AcqRel) + 1
                    == self.options.pool_size as u32
                {
                    let pool = Arc::clone(self);
                    tokio::spawn(async move { pool.try_dial().await });
                }
                Err(e)
            }
        }
    }

    /// Probes the endpoint once per second until a dial succeeds, then
    /// resets the failure accounting and re-fills the pool.
    async fn try_dial(self: Arc<Self>) {
        loop {
            if self.is_closed() {
                debug!("try routine gone as pool closed");
                return;
            }

            match (self.dialer)(Arc::clone(&self.options)).await {
                Ok(conn) => {
                    info!("try to dial server success");
                    self.dial_errors.store(0, Ordering::Release);
                    conn.close();
                    self.add_conns();
                    return;
                }
                Err(e) => {
                    info!(url = %self.options.url, error = %e, "try dial conn");
                    self.set_last_dial_error(&e);
                    tokio::time::sleep(RETRY_DIAL_GAP).await;
                }
            }
        }
    }

    fn set_last_dial_error(&self, err: &Error) {
        *self.last_dial_error.write() = Some(err.to_string());
    }

    /// Wires the supervisor wakeup and auto-return hooks into a fresh
    /// connection.
    fn install_hooks(self: &Arc<Self>, conn: &Arc<Connection>) {
        let weak = Arc::downgrade(self);
        conn.set_notifier(Arc::new(move || {
            if let Some(pool) = weak.upgrade() {
                pool.notify_check();
            }
        }));

        let weak = Arc::downgrade(self);
        conn.set_release_hook(Arc::new(move |conn| {
            if let Some(pool) = weak.upgrade() {
                pool.put(&conn);
            }
        }));
    }
}

// ============================================================================
// ConnPool - Borrowing
// ============================================================================

impl ConnPool {
    /// Selects and reserves a connection, waiting up to `timeout`.
    async fn borrow_conn(self: &Arc<Self>, timeout: Duration) -> Result<Arc<Connection>> {
        let Some(conn) = self.select_least_borrowed() else {
            debug!(pool_size = self.size(), "borrow conn nil");
            return self.wait_for_conn(timeout).await;
        };

        loop {
            let in_flight = conn.borrowed();
            let available = conn.available_in_flight();
            if in_flight >= self.options.max_simultaneous_usage as u32 && available == 0 {
                debug!(conn = %conn, "wait conn");
                return self.wait_for_conn(timeout).await;
            }
            if conn.try_borrow(in_flight) {
                debug!(conn = %conn, "borrowed conn");
                return Ok(conn);
            }
        }
    }

    /// Parks on the availability slot until a connection has capacity or
    /// the deadline fires.
    ///
    /// After a wakeup the sole re-wait predicate is `available == 0`; the
    /// borrow-cap test applies only on first selection.
    async fn wait_for_conn(self: &Arc<Self>, timeout: Duration) -> Result<Arc<Connection>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                debug!("wait conn timeout");
                return Err(Error::GetConnTimeout);
            }

            let waited =
                tokio::time::timeout_at(deadline, self.has_available_conn.notified()).await;
            if waited.is_err() {
                debug!("wait conn timeout");
                return Err(Error::GetConnTimeout);
            }
            if self.is_closed() {
                debug!("wait conn failed as pool closed");
                return Err(Error::PoolClosed);
            }

            if let Some(conn) = self.select_least_borrowed() {
                loop {
                    let in_flight = conn.borrowed();
                    let available = conn.available_in_flight();
                    if available == 0 {
                        info!(conn = %conn, in_flight, "wait conn may timeout");
                        break;
                    }
                    if conn.try_borrow(in_flight) {
                        return Ok(conn);
                    }
                }
            }
        }
    }

    /// Least-borrowed live connection; first in list wins ties.
    fn select_least_borrowed(&self) -> Option<Arc<Connection>> {
        let conns = self.conns.read();
        let mut least: Option<&Arc<Connection>> = None;
        let mut min_borrowed = u32::MAX;
        for conn in conns.iter() {
            let borrowed = conn.borrowed();
            if conn.is_live() && borrowed < min_borrowed {
                min_borrowed = borrowed;
                least = Some(conn);
            }
        }
        least.cloned()
    }

    /// Releases a borrow and either reaps the connection or signals
    /// availability.
    fn return_conn(self: &Arc<Self>, conn: &Arc<Connection>) {
        conn.release_borrow();

        if conn.is_broken_or_closed() {
            debug!(conn = %conn, "return broken conn");
            self.remove_conn(conn);
            conn.close();
            self.add_conns();
        } else {
            self.announce_available_conn();
        }
    }

    fn remove_conn(&self, conn: &Arc<Connection>) {
        let mut conns = self.conns.write();
        if let Some(pos) = conns.iter().position(|c| Arc::ptr_eq(c, conn)) {
            conns.remove(pos);
        }
    }

    /// Signals one waiting borrower. At most one signal is retained; the
    /// rest are dropped.
    fn announce_available_conn(&self) {
        self.has_available_conn.notify_one();
    }
}

// ============================================================================
// ConnPool - Supervision
// ============================================================================

impl ConnPool {
    /// Periodic and on-demand health checking.
    async fn supervisor(self: Arc<Self>, interval: Duration, mut check_rx: mpsc::Receiver<()>) {
        let mut closed_rx = self.closed_tx.subscribe();
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.do_check();
                    if ticks % STATUS_LOG_EVERY == 0 {
                        info!(size = self.size(), errors = ?self.last_dial_error(), "pool status");
                    }
                    ticks += 1;
                }
                _ = check_rx.recv() => {
                    self.do_check();
                }
                _ = closed_rx.changed() => {
                    return;
                }
            }
        }
    }

    /// Wakes the supervisor out of band. A full slot is dropped.
    pub(crate) fn notify_check(&self) {
        if self.is_closed() {
            return;
        }
        let _ = self.check_tx.try_send(());
    }

    /// Reaps broken connections and schedules replacements.
    fn do_check(self: &Arc<Self>) {
        // the tick and the close signal can race; never reap after close
        if self.is_closed() {
            return;
        }
        let count = self.reap_stale_conns();
        if count > 0 {
            debug!(count, "reaped stale conns");
            self.add_conns();
        }
    }

    fn reap_stale_conns(&self) -> usize {
        let stale: Vec<Arc<Connection>> = {
            let mut conns = self.conns.write();
            let mut stale = Vec::new();
            conns.retain(|conn| {
                if conn.is_broken_or_closed() {
                    stale.push(Arc::clone(conn));
                    false
                } else {
                    true
                }
            });
            stale
        };

        for conn in &stale {
            warn!(conn = %conn, "reap broken conn");
            conn.close();
        }
        stale.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_options(pool_size: usize) -> Arc<Options> {
        Arc::new(Options {
            url: "ws://127.0.0.1:1/gremlin".into(),
            username: String::new(),
            password: String::new(),
            pool_size,
            pool_timeout: Duration::from_millis(20),
            alive_check_interval: None,
            write_timeout: Duration::from_millis(200),
            read_timeout: Duration::from_millis(200),
            ping_interval: Duration::from_secs(20),
            max_in_flight: 4,
            max_simultaneous_usage: 4,
        })
    }

    /// Dialer that always fails.
    fn failing_dialer() -> Dialer {
        Arc::new(|_| Box::pin(async { Err(Error::connect("refused")) }))
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let pool = ConnPool::with_dialer(test_options(2), failing_dialer());
        pool.close();
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.size(), 0);
    }

    #[tokio::test]
    async fn test_get_after_close_is_pool_closed() {
        let pool = ConnPool::with_dialer(test_options(2), failing_dialer());
        pool.close();
        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, Error::PoolClosed));
    }

    #[tokio::test]
    async fn test_get_with_no_connections_times_out() {
        let pool = ConnPool::with_dialer(test_options(2), failing_dialer());
        let start = tokio::time::Instant::now();
        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, Error::GetConnTimeout));
        assert!(start.elapsed() >= Duration::from_millis(20));
        pool.close();
    }

    #[tokio::test]
    async fn test_dial_errors_recorded() {
        let pool = ConnPool::with_dialer(test_options(2), failing_dialer());
        // let the background dials fail
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.size(), 0);
        assert!(pool.last_dial_error().expect("error recorded").contains("refused"));
        pool.close();
    }
}
