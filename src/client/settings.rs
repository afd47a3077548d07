//! Client configuration.
//!
//! Provides defaults for every option and derives the dependent ones the
//! same way at each resolution point: an unset read timeout follows the
//! write timeout, and an unset pool timeout is the read timeout plus one
//! second.
//!
//! # Example
//!
//! ```ignore
//! use graphdb_driver::Settings;
//!
//! let settings = Settings::new()
//!     .with_host("db.internal")
//!     .with_port(8182)
//!     .with_auth("user", "secret")
//!     .with_pool_size(16);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::transport::Options;

// ============================================================================
// Constants
// ============================================================================

/// Default endpoint host.
const DEFAULT_HOST: &str = "localhost";

/// Default endpoint port.
const DEFAULT_PORT: u16 = 8182;

/// Default maximum number of live connections.
const DEFAULT_POOL_SIZE: usize = 8;

/// Default per-connection concurrent request cap.
const DEFAULT_MAX_CONCURRENT_REQUEST: usize = 4;

/// Default WebSocket ping period.
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-write deadline.
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default supervisor period.
const DEFAULT_ALIVE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Session pools always hold a single connection.
const SESSION_POOL_SIZE: usize = 1;

/// Session per-connection concurrent request cap.
const SESSION_MAX_CONCURRENT_REQUEST: usize = 2;

// ============================================================================
// Settings
// ============================================================================

/// Connection and pool configuration.
///
/// | Option | Default |
/// |--------|---------|
/// | `host` | `"localhost"` |
/// | `port` | `8182` |
/// | `username`/`password` | empty (no proactive auth) |
/// | `pool_size` | 8 |
/// | `max_concurrent_request` | 4 |
/// | `ping_interval` | 60 s |
/// | `write_timeout` | 5 s |
/// | `read_timeout` | = `write_timeout` |
/// | `pool_timeout` | = `read_timeout` + 1 s |
/// | `alive_check_interval` | 60 s (`None` disables) |
/// | `is_manage_transaction` | `false` |
#[derive(Debug, Clone)]
pub struct Settings {
    /// Host the driver connects to.
    pub host: String,
    /// Port the driver connects to.
    pub port: u16,
    /// Username for the lazy SASL reply.
    pub username: String,
    /// Password for the lazy SASL reply.
    pub password: String,
    /// Whether the caller manages the session transaction itself.
    pub is_manage_transaction: bool,

    /// Maximum number of socket connections.
    pub pool_size: usize,
    /// Max concurrent requests pending on one connection.
    pub max_concurrent_request: usize,
    /// Wait for a free connection before `GetConnTimeout`; derived when
    /// unset.
    pub pool_timeout: Option<Duration>,
    /// Frequency of WebSocket ping checks.
    pub ping_interval: Duration,
    /// Per-write deadline.
    pub write_timeout: Duration,
    /// Advisory read deadline; follows `write_timeout` when unset.
    pub read_timeout: Option<Duration>,
    /// Pool health-check period; `None` disables supervision.
    pub alive_check_interval: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            is_manage_transaction: false,
            pool_size: DEFAULT_POOL_SIZE,
            max_concurrent_request: DEFAULT_MAX_CONCURRENT_REQUEST,
            pool_timeout: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: None,
            alive_check_interval: Some(DEFAULT_ALIVE_CHECK_INTERVAL),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl Settings {
    /// Creates settings with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the endpoint port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets credentials for the lazy SASL reply.
    #[must_use]
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Sets the pool size.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Sets the per-connection concurrent request cap.
    #[must_use]
    pub fn with_max_concurrent_request(mut self, max: usize) -> Self {
        self.max_concurrent_request = max;
        self
    }

    /// Sets the pool borrow timeout.
    #[must_use]
    pub fn with_pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = Some(timeout);
        self
    }

    /// Sets the ping period.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the per-write deadline.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the advisory read deadline.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Sets the supervisor period; `None` disables supervision.
    #[must_use]
    pub fn with_alive_check_interval(mut self, interval: Option<Duration>) -> Self {
        self.alive_check_interval = interval;
        self
    }

    /// Lets the caller drive the session transaction.
    #[must_use]
    pub fn with_manage_transaction(mut self, manage: bool) -> Self {
        self.is_manage_transaction = manage;
        self
    }
}

// ============================================================================
// Resolution
// ============================================================================

impl Settings {
    /// Validates the endpoint settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on an empty host, a zero port or a zero
    /// pool size.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("empty host"));
        }
        if self.port == 0 {
            return Err(Error::config("port must be non-zero"));
        }
        if self.pool_size == 0 {
            return Err(Error::config("pool size must be non-zero"));
        }
        Ok(())
    }

    /// The resolved read timeout.
    #[inline]
    #[must_use]
    pub fn resolved_read_timeout(&self) -> Duration {
        self.read_timeout.unwrap_or(self.write_timeout)
    }

    /// The resolved pool borrow timeout.
    #[inline]
    #[must_use]
    pub fn resolved_pool_timeout(&self) -> Duration {
        self.pool_timeout
            .unwrap_or_else(|| self.resolved_read_timeout() + Duration::from_secs(1))
    }

    /// The WebSocket endpoint URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}:{}/gremlin", self.host, self.port)
    }

    /// Transport options for a session-less pool.
    #[must_use]
    pub fn options(&self) -> Arc<Options> {
        Arc::new(Options {
            url: self.url(),
            username: self.username.clone(),
            password: self.password.clone(),
            pool_size: self.pool_size,
            pool_timeout: self.resolved_pool_timeout(),
            alive_check_interval: self.alive_check_interval,
            write_timeout: self.write_timeout,
            read_timeout: self.resolved_read_timeout(),
            ping_interval: self.ping_interval,
            max_in_flight: self.max_concurrent_request,
            max_simultaneous_usage: self.max_concurrent_request,
        })
    }

    /// Transport options for a session pool.
    ///
    /// All requests of a session must land on one physical connection, so
    /// the pool shrinks to a single connection with tightened caps.
    #[must_use]
    pub fn session_options(&self) -> Arc<Options> {
        Arc::new(Options {
            url: self.url(),
            username: self.username.clone(),
            password: self.password.clone(),
            pool_size: SESSION_POOL_SIZE,
            pool_timeout: self.resolved_pool_timeout(),
            alive_check_interval: self.alive_check_interval,
            write_timeout: self.write_timeout,
            read_timeout: self.resolved_read_timeout(),
            ping_interval: self.ping_interval,
            max_in_flight: SESSION_MAX_CONCURRENT_REQUEST,
            max_simultaneous_usage: SESSION_MAX_CONCURRENT_REQUEST,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 8182);
        assert_eq!(settings.pool_size, 8);
        assert_eq!(settings.max_concurrent_request, 4);
        assert_eq!(settings.ping_interval, Duration::from_secs(60));
        assert_eq!(settings.write_timeout, Duration::from_secs(5));
        assert!(!settings.is_manage_transaction);
    }

    #[test]
    fn test_derived_defaults() {
        let settings = Settings::new().with_write_timeout(Duration::from_secs(3));
        assert_eq!(settings.resolved_read_timeout(), Duration::from_secs(3));
        assert_eq!(settings.resolved_pool_timeout(), Duration::from_secs(4));
    }

    #[test]
    fn test_explicit_timeouts_win() {
        let settings = Settings::new()
            .with_read_timeout(Duration::from_secs(7))
            .with_pool_timeout(Duration::from_millis(20));
        assert_eq!(settings.resolved_read_timeout(), Duration::from_secs(7));
        assert_eq!(settings.resolved_pool_timeout(), Duration::from_millis(20));
    }

    #[test]
    fn test_url() {
        let settings = Settings::new().with_host("10.0.0.5").with_port(9999);
        assert_eq!(settings.url(), "ws://10.0.0.5:9999/gremlin");
    }

    #[test]
    fn test_session_options_overrides() {
        let settings = Settings::new().with_pool_size(8).with_max_concurrent_request(4);
        let options = settings.session_options();
        assert_eq!(options.pool_size, 1);
        assert_eq!(options.max_in_flight, 2);
        assert_eq!(options.max_simultaneous_usage, 2);
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        assert!(Settings::new().with_host("").validate().is_err());
        assert!(Settings::new().with_port(0).validate().is_err());
        assert!(Settings::new().with_pool_size(0).validate().is_err());
        assert!(Settings::new().validate().is_ok());
    }
}
