//! Session client and the transaction envelope.
//!
//! A session binds every request to one server-side transaction context,
//! so the session pool holds a single physical connection. The
//! [`batch_submit`](SessionClient::batch_submit) envelope turns an
//! arbitrary user closure into an atomic open/commit/rollback sequence:
//!
//! ```text
//!    ┌──────── idle ────────┐
//!    │          │            │
//!    open-ok    open-fail    │
//!    │          │            │
//!    ▼          ▼            │
//!  running ── error ──► rollback ──► idle
//!    │
//!   commit-ok ──► idle
//!   commit-fail ──► rollback ──► idle
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{error, info, warn};

use super::{BaseClient, QueryResult, ResultSetFuture, Settings};
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::request::{Request, RequestOptions};
use crate::protocol::response::status;

// ============================================================================
// Constants
// ============================================================================

/// Transaction scripts.
const TX_OPEN: &str = "g.tx().open()";
const TX_COMMIT: &str = "g.tx().commit()";
const TX_ROLLBACK: &str = "g.tx().rollback()";

/// Wait on the session-close acknowledgement before tearing the pool down.
const CLOSE_SESSION_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// SessionClient
// ============================================================================

/// Client bound to one server session.
///
/// # Example
///
/// ```no_run
/// use graphdb_driver::{SessionClient, Settings};
///
/// #[tokio::main]
/// async fn main() -> graphdb_driver::Result<()> {
///     let client = SessionClient::new("f1f32aac-74b6-4bf5-a5b7-86ab7be67bc3", Settings::new())?;
///
///     client
///         .batch_submit(|shell| async move {
///             shell.submit_script("g.addV('person').property('name', 'a')").await?;
///             shell.submit_script("g.addV('person').property('name', 'b')").await?;
///             Ok(())
///         })
///         .await?;
///
///     client.close().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct SessionClient {
    inner: Arc<BaseClient>,
}

impl SessionClient {
    /// Creates a session client with a caller-supplied session ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on invalid settings.
    pub fn new(session_id: impl Into<SessionId>, settings: Settings) -> Result<Self> {
        let inner = Arc::new(BaseClient::new(settings, Some(session_id.into()))?);
        info!(endpoint = %inner.settings().url(), session = true, "new client");
        Ok(Self { inner })
    }

    /// Runs `f` inside a transaction.
    ///
    /// Opens the transaction, hands the closure a [`SessionShell`] whose
    /// submissions join the session, commits on success and rolls back on
    /// any error in the open/closure/commit sequence. A rollback failure
    /// is logged and the original causing error is returned.
    pub async fn batch_submit<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnOnce(SessionShell) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let outcome = match self.transaction(TX_OPEN).await {
            Ok(()) => {
                let shell = SessionShell {
                    inner: Arc::clone(&self.inner),
                };
                match f(shell).await {
                    Ok(()) => self.transaction(TX_COMMIT).await,
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };

        if let Err(cause) = outcome {
            if let Err(rollback_err) = self.transaction(TX_ROLLBACK).await {
                error!(error = %rollback_err, "unstable transaction status as rollback failed");
            }
            return Err(cause);
        }
        Ok(())
    }

    /// Closes the session server-side, then the pool.
    ///
    /// The close request gets a bounded wait; the pool is torn down
    /// regardless of the acknowledgement.
    pub async fn close(&self) {
        self.close_session().await;
        self.inner.pool().close();
        info!(session = true, "close client");
    }

    /// Submits one transaction script and checks its outcome.
    ///
    /// Transaction replies carry no data; only the status matters.
    async fn transaction(&self, script: &str) -> Result<()> {
        let future = self
            .inner
            .submit_options_async(script, RequestOptions::default())
            .await?;
        // reuse the decode path solely for its error reification
        future.get_results().await.map(|_| ())
    }

    /// Best-effort `session.close()` with a bounded wait.
    async fn close_session(&self) {
        let Some(session_id) = self.inner.session_id() else {
            return;
        };
        let request = Request::close_session(session_id);

        let future = match self.inner.request_async(request).await {
            Ok(future) => future,
            Err(e) => {
                warn!(error = %e, "fail to close session");
                return;
            }
        };

        match future.get_or_timeout(CLOSE_SESSION_TIMEOUT).await {
            None => warn!("response timeout for close session"),
            Some(response)
                if response.code != status::NO_CONTENT && response.code != status::SUCCESS =>
            {
                warn!(code = response.code, "response error for close session");
            }
            Some(_) => {}
        }
    }
}

// ============================================================================
// SessionShell
// ============================================================================

/// Submission handle passed to the [`batch_submit`](SessionClient::batch_submit)
/// closure.
///
/// Every submission joins the open transaction of the owning session.
#[derive(Clone)]
pub struct SessionShell {
    inner: Arc<BaseClient>,
}

impl SessionShell {
    /// Submits a script inside the transaction and waits for results.
    pub async fn submit_script(&self, script: &str) -> Result<Vec<QueryResult>> {
        self.submit_script_bound(script, Map::new()).await
    }

    /// Submits a script with bindings and waits for results.
    pub async fn submit_script_bound(
        &self,
        script: &str,
        bindings: Map<String, Value>,
    ) -> Result<Vec<QueryResult>> {
        self.submit_script_options(script, RequestOptions::with_bindings(bindings))
            .await
    }

    /// Submits a script with full request options and waits for results.
    pub async fn submit_script_options(
        &self,
        script: &str,
        options: RequestOptions,
    ) -> Result<Vec<QueryResult>> {
        let future = self.submit_script_options_async(script, options).await?;
        future.get_results().await
    }

    /// Submits a script, returning a future for its results.
    pub async fn submit_script_async(&self, script: &str) -> Result<ResultSetFuture> {
        self.submit_script_options_async(script, RequestOptions::default())
            .await
    }

    /// Submits a script with full request options, returning a future.
    pub async fn submit_script_options_async(
        &self,
        script: &str,
        options: RequestOptions,
    ) -> Result<ResultSetFuture> {
        self.inner.submit_options_async(script, options).await
    }
}

// ============================================================================
// Tests
// ============================================================================
