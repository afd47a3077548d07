//! WebSocket transport layer.
//!
//! Internal module handling connections, the per-connection request
//! multiplexer and the connection pool.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`future`] | One-shot completable response handoff |
//! | [`connection`] | One WebSocket: write path, read loop, ping loop |
//! | [`pool`] | Pool of connections with least-loaded selection |

pub mod connection;
pub mod future;
pub mod pool;

pub use connection::Connection;
pub use future::ResponseFuture;
pub use pool::ConnPool;

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;

// ============================================================================
// Options
// ============================================================================

/// Transport configuration shared by the pool and its connections.
///
/// Built from [`Settings`](crate::Settings); all fields are resolved (no
/// unset defaults remain at this level).
#[derive(Debug, Clone)]
pub struct Options {
    /// Full endpoint URL, `ws://host:port/gremlin`.
    pub url: String,
    /// Credentials for the lazy SASL reply. Empty when the server does not
    /// challenge.
    pub username: String,
    /// See [`username`](Self::username).
    pub password: String,

    /// Maximum number of live connections in the pool.
    pub pool_size: usize,
    /// Maximum wait for a free connection in `pool.get`.
    pub pool_timeout: Duration,
    /// Supervisor period; `None` disables supervision.
    pub alive_check_interval: Option<Duration>,

    /// Per-write deadline.
    pub write_timeout: Duration,
    /// Advisory read timeout; streamed reads are not bounded.
    pub read_timeout: Duration,
    /// Period between WebSocket pings.
    pub ping_interval: Duration,

    /// Per-connection cap on in-flight requests.
    pub max_in_flight: usize,
    /// Per-connection cap on simultaneous pool borrows.
    pub max_simultaneous_usage: usize,
}

// ============================================================================
// Dialer
// ============================================================================

/// Future returned by a dial attempt.
pub type DialFuture = Pin<Box<dyn Future<Output = Result<Arc<Connection>>> + Send>>;

/// Pluggable dial function used by the pool.
///
/// Defaults to [`Connection::dial`]; substituted in tests.
pub type Dialer = Arc<dyn Fn(Arc<Options>) -> DialFuture + Send + Sync>;

/// The production dialer.
#[must_use]
pub fn default_dialer() -> Dialer {
    Arc::new(|options| Box::pin(Connection::dial(options)))
}
