//! Public client entry points.
//!
//! [`Client`] is the session-less entry: every submitted script is
//! auto-committed server-side and may land on any pooled connection.
//! [`SessionClient`] binds all requests to one server session (and one
//! physical connection) and wraps user work in an explicit transaction
//! envelope.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`settings`] | Configuration with defaults |
//! | [`result`] | [`QueryResult`] accessors and [`ResultSetFuture`] |
//! | [`session`] | Session client and transaction envelope |

pub mod result;
pub mod session;
pub mod settings;

pub use result::{QueryResult, ResultSetFuture};
pub use session::{SessionClient, SessionShell};
pub use settings::Settings;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::error::Result;
use crate::identifiers::SessionId;
use crate::protocol::request::{args, Request, RequestOptions};
use crate::transport::{ConnPool, ResponseFuture};

// ============================================================================
// BaseClient
// ============================================================================

/// Shared submit machinery under both client flavors.
#[derive(Debug)]
pub(crate) struct BaseClient {
    settings: Settings,
    session_id: Option<SessionId>,
    pool: Arc<ConnPool>,
}

impl BaseClient {
    /// Validates settings and starts the pool.
    fn new(settings: Settings, session_id: Option<SessionId>) -> Result<Self> {
        settings.validate()?;
        let options = match session_id {
            Some(_) => settings.session_options(),
            None => settings.options(),
        };
        let pool = ConnPool::new(options);
        Ok(Self {
            settings,
            session_id,
            pool,
        })
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.settings
    }

    pub(crate) fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub(crate) fn pool(&self) -> &Arc<ConnPool> {
        &self.pool
    }

    /// Builds and submits an eval request, injecting session arguments in
    /// session mode.
    pub(crate) async fn submit_options_async(
        &self,
        script: &str,
        mut options: RequestOptions,
    ) -> Result<ResultSetFuture> {
        if let Some(session_id) = &self.session_id {
            options.add_arg(args::SESSION, session_id.as_str());
            options.add_arg(args::MANAGE_TRANSACTION, self.settings.is_manage_transaction);
        }

        let request = Request::eval(script, &options);
        let future = self.request_async(request).await?;
        Ok(ResultSetFuture::new(future))
    }

    /// Borrows a connection and submits.
    ///
    /// The borrow is auto-returned by the future's completion callback; on
    /// submit rejection the borrow is returned here.
    pub(crate) async fn request_async(&self, request: Request) -> Result<Arc<ResponseFuture>> {
        let conn = self.pool.get().await?;

        info!(
            dsl = request.args.get(args::GREMLIN).and_then(serde_json::Value::as_str).unwrap_or_default(),
            processor = ?request.processor,
            "submit script"
        );
        match conn.submit(request).await {
            Ok(future) => Ok(future),
            Err(e) => {
                self.pool.put(&conn);
                Err(e)
            }
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Session-less client; every request auto-commits server-side.
///
/// # Example
///
/// ```no_run
/// use graphdb_driver::{Client, Settings};
///
/// #[tokio::main]
/// async fn main() -> graphdb_driver::Result<()> {
///     let client = Client::new(Settings::new().with_host("127.0.0.1"))?;
///     let results = client.submit_script("g.V().count()").await?;
///     println!("vertices: {}", results[0].get_int64());
///     client.close();
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Client {
    inner: Arc<BaseClient>,
}

impl Client {
    /// Creates a client and starts filling its pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) on invalid settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let inner = Arc::new(BaseClient::new(settings, None)?);
        info!(endpoint = %inner.settings().url(), session = false, "new client");
        Ok(Self { inner })
    }

    /// Submits a script and waits for its results.
    pub async fn submit_script(&self, script: &str) -> Result<Vec<QueryResult>> {
        self.submit_script_bound(script, Map::new()).await
    }

    /// Submits a script with bindings and waits for its results.
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
        self.submit_script_bound_async(script, Map::new()).await
    }

    /// Submits a script with bindings, returning a future.
    pub async fn submit_script_bound_async(
        &self,
        script: &str,
        bindings: Map<String, Value>,
    ) -> Result<ResultSetFuture> {
        self.submit_script_options_async(script, RequestOptions::with_bindings(bindings))
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

    /// Closes the pool. Subsequent submissions fail with
    /// [`Error::PoolClosed`](crate::Error::PoolClosed).
    pub fn close(&self) {
        self.inner.pool().close();
        info!(session = false, "close client");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_rejects_bad_settings() {
        let err = Client::new(Settings::new().with_host("")).unwrap_err();
        assert!(matches!(err, crate::Error::Config { .. }));
    }
}
