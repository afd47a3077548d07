//! One-shot completable response futures.
//!
//! A [`ResponseFuture`] is the handoff point between a connection's read
//! path and the caller: the read loop merges streamed chunks into the
//! accumulator and completes the future exactly once; callers block on
//! [`get`](ResponseFuture::get) or poll with a timed wait.
//!
//! Completion is race-free across the read loop, connection teardown and
//! waiters: the pending→completed transition is a compare-and-swap on a
//! state word, and the completion callback runs at most once.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::protocol::request::Request;
use crate::protocol::response::Response;

// ============================================================================
// Types
// ============================================================================

/// Callback invoked exactly once when the future completes.
///
/// The pool uses this to auto-return the borrowed connection.
pub type CompletionHook = Box<dyn FnOnce() + Send>;

// ============================================================================
// ResponseFuture
// ============================================================================

/// One-shot handoff from the connection's read path to the caller.
pub struct ResponseFuture {
    request: Request,
    response: Mutex<Response>,
    completed: AtomicBool,
    notify: Notify,
    callback: Mutex<Option<CompletionHook>>,
}

impl ResponseFuture {
    /// Creates a pending future for the request.
    #[must_use]
    pub fn new(request: Request, callback: Option<CompletionHook>) -> Self {
        let response = Response::pending(request.request_id.clone());
        Self {
            request,
            response: Mutex::new(response),
            completed: AtomicBool::new(false),
            notify: Notify::new(),
            callback: Mutex::new(callback),
        }
    }

    /// The originating request.
    #[inline]
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns `true` once the future has completed.
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Completes the future, storing `response` when given.
    ///
    /// With `None` the accumulator built up by [`merge`](Self::merge) is the
    /// final response. The first call wins; later calls are no-ops. The
    /// completion callback runs before waiters wake.
    pub fn complete(&self, response: Option<Response>) {
        if self
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        if let Some(response) = response {
            *self.response.lock() = response;
        }

        if let Some(callback) = self.callback.lock().take() {
            callback();
        }

        self.notify.notify_waiters();
    }

    /// Grants the read path mutual access to the accumulator.
    ///
    /// Used on partial-content chunks before the terminal completion.
    pub fn merge<F>(&self, f: F)
    where
        F: FnOnce(&mut Response),
    {
        f(&mut self.response.lock());
    }

    /// Blocks until completed and returns the stored response.
    pub async fn get(&self) -> Response {
        loop {
            if self.is_completed() {
                return self.response.lock().clone();
            }
            let notified = self.notify.notified();
            if self.is_completed() {
                return self.response.lock().clone();
            }
            notified.await;
        }
    }

    /// Waits up to `timeout`; `None` if the deadline fires first.
    ///
    /// A local timeout does not abort the server-side work.
    pub async fn get_or_timeout(&self, timeout: Duration) -> Option<Response> {
        if self.is_completed() {
            return Some(self.response.lock().clone());
        }
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(response) => Some(response),
            Err(_) => None,
        }
    }
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("request_id", &self.request.request_id)
            .field("completed", &self.is_completed())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
