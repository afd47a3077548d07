//! One WebSocket connection and its worker loops.
//!
//! A connection owns one socket and multiplexes many in-flight requests
//! over it. Writes are serialized behind a single async mutex with a per
//! write deadline; a read loop demultiplexes responses to pending futures
//! by request ID; a ping loop probes liveness. The connection reports
//! broken state to its owning pool through a notifier hook and returns
//! borrowed slots through a release hook wired into each future's
//! completion callback.
//!
//! # Ordering
//!
//! Per request: at most one completion. Across requests on one connection:
//! completion order follows server response order, which may differ from
//! submission order. Across connections: none.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::Options;
use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::request::Request;
use crate::protocol::response::{read_response, status, Response};
use crate::transport::future::{CompletionHook, ResponseFuture};

// ============================================================================
// Constants
// ============================================================================

/// Consecutive read errors tolerated before the connection is marked broken.
const MAX_READ_ERRORS: u32 = 10;

/// Ping attempts per interval before the connection is marked broken.
const PING_RETRY_LIMIT: u32 = 3;

/// Gap between ping retry attempts.
const PING_RETRY_GAP: Duration = Duration::from_secs(1);

/// Completion message for futures drained during teardown.
const MSG_CONN_CLOSED: &str = "connection closed";

// ============================================================================
// Types
// ============================================================================

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Map of request IDs to pending futures.
type PendingMap = FxHashMap<RequestId, Arc<ResponseFuture>>;

/// Hook waking the pool supervisor when the connection breaks.
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

/// Hook returning the connection to its pool on future completion.
pub type ReleaseHook = Arc<dyn Fn(Arc<Connection>) + Send + Sync>;

// ============================================================================
// State
// ============================================================================

/// Connection lifecycle state. Transitions are monotonic:
/// live→broken, live→closed, broken→closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Accepting submissions.
    Live = 0,
    /// Failed liveness; awaiting pool reap.
    Broken = 1,
    /// Torn down.
    Closed = 2,
}

// ============================================================================
// Connection
// ============================================================================

/// One WebSocket connection multiplexing many in-flight requests.
pub struct Connection {
    options: Arc<Options>,

    state: AtomicU8,
    created_at: Instant,
    /// Milliseconds since `created_at` of the last use.
    used_at_ms: AtomicU64,

    /// In-flight requests not yet terminally completed.
    pending: Mutex<PendingMap>,
    /// Mirrors `pending.len()`; read lock-free by the pool.
    pending_size: AtomicUsize,
    /// Concurrent pool borrowers currently holding this connection.
    borrowed: AtomicU32,
    /// Consecutive ping failures in the current probe round.
    ping_errors: AtomicU32,

    /// Write half; the mutex is the total order on writes.
    writer: Arc<tokio::sync::Mutex<WsSink>>,
    /// Stops the worker loops; workers hold receivers.
    quit: watch::Sender<bool>,

    notifier: OnceLock<Notifier>,
    release_hook: OnceLock<ReleaseHook>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("created_at", &self.created_at)
            .field("used_at_ms", &self.used_at_ms)
            .field("pending_size", &self.pending_size)
            .field("borrowed", &self.borrowed)
            .field("ping_errors", &self.ping_errors)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Dials the endpoint and starts the read and ping loops.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the handshake fails.
    pub async fn dial(options: Arc<Options>) -> Result<Arc<Self>> {
        let (socket, _) = tokio_tungstenite::connect_async(options.url.as_str()).await?;
        let (sink, source) = socket.split();
        let (quit, _) = watch::channel(false);

        let conn = Arc::new(Self {
            options: Arc::clone(&options),
            state: AtomicU8::new(State::Live as u8),
            created_at: Instant::now(),
            used_at_ms: AtomicU64::new(0),
            pending: Mutex::new(PendingMap::default()),
            pending_size: AtomicUsize::new(0),
            borrowed: AtomicU32::new(0),
            ping_errors: AtomicU32::new(0),
            writer: Arc::new(tokio::sync::Mutex::new(sink)),
            quit,
            notifier: OnceLock::new(),
            release_hook: OnceLock::new(),
        });

        // subscribe before returning so a close() racing task startup
        // still reaches both loops
        tokio::spawn(Arc::clone(&conn).read_loop(source, conn.quit.subscribe()));
        tokio::spawn(Arc::clone(&conn).ping_loop(conn.quit.subscribe()));

        info!(
            endpoint = %options.url,
            ping_interval = ?options.ping_interval,
            concurrent = options.max_in_flight,
            "connect"
        );
        Ok(conn)
    }

    /// Tears the connection down.
    ///
    /// Idempotent. Stops the loops, closes the socket and completes every
    /// pending future with a transport-error response (code 697), exactly
    /// once each.
    pub fn close(&self) {
        let closed = loop {
            let state = self.state.load(Ordering::Acquire);
            if state == State::Closed as u8 {
                break false;
            }
            if self
                .state
                .compare_exchange(state, State::Closed as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break true;
            }
        };
        if !closed {
            return;
        }

        let _ = self.quit.send(true);

        // best-effort close frame; the read side ends on quit regardless
        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            let mut sink = writer.lock().await;
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
        });

        self.drain_pending();
        info!("connect close");
    }

    /// Completes every pending future with a deliver-error response.
    fn drain_pending(&self) {
        let drained: Vec<(RequestId, Arc<ResponseFuture>)> =
            self.pending.lock().drain().collect();
        self.pending_size.store(0, Ordering::Release);

        let count = drained.len();
        for (request_id, future) in drained {
            future.complete(Some(Response::local_error(
                request_id,
                status::REQUEST_ERROR_DELIVER,
                MSG_CONN_CLOSED,
            )));
        }
        if count > 0 {
            debug!(count, "completed pending futures on close");
        }
    }
}

// ============================================================================
// Connection - State and accounting
// ============================================================================

impl Connection {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            0 => State::Live,
            1 => State::Broken,
            _ => State::Closed,
        }
    }

    /// Returns `true` while submissions are accepted.
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state() == State::Live
    }

    /// Returns `true` once the connection is broken or closed.
    #[inline]
    #[must_use]
    pub fn is_broken_or_closed(&self) -> bool {
        !self.is_live()
    }

    /// Marks the connection broken and wakes the pool supervisor.
    ///
    /// No-op unless the connection is still live.
    fn set_broken(&self) {
        if self
            .state
            .compare_exchange(
                State::Live as u8,
                State::Broken as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            warn!("connection broken");
            if let Some(notifier) = self.notifier.get() {
                notifier();
            }
        }
    }

    /// Creation time.
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time of last use (write or ping).
    #[must_use]
    pub fn used_at(&self) -> Instant {
        self.created_at + Duration::from_millis(self.used_at_ms.load(Ordering::Relaxed))
    }

    fn touch(&self) {
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.used_at_ms.store(elapsed, Ordering::Relaxed);
    }

    /// Number of requests written but not yet terminally completed.
    #[inline]
    #[must_use]
    pub fn pending_size(&self) -> usize {
        self.pending_size.load(Ordering::Acquire)
    }

    /// Free in-flight slots.
    #[must_use]
    pub fn available_in_flight(&self) -> usize {
        self.options.max_in_flight.saturating_sub(self.pending_size())
    }

    /// Current borrow count.
    #[inline]
    #[must_use]
    pub fn borrowed(&self) -> u32 {
        self.borrowed.load(Ordering::Acquire)
    }

    /// Attempts to move the borrow count from `current` to `current + 1`.
    #[must_use]
    pub fn try_borrow(&self, current: u32) -> bool {
        self.borrowed
            .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases one borrow.
    pub fn release_borrow(&self) {
        self.borrowed.fetch_sub(1, Ordering::AcqRel);
    }

    /// Installs the pool supervisor wakeup hook.
    pub fn set_notifier(&self, notifier: Notifier) {
        let _ = self.notifier.set(notifier);
    }

    /// Installs the auto-return hook run by future completion callbacks.
    pub fn set_release_hook(&self, hook: ReleaseHook) {
        let _ = self.release_hook.set(hook);
    }
}

// ============================================================================
// Connection - Submit path
// ============================================================================

impl Connection {
    /// Submits a request, returning its future.
    ///
    /// The returned future may already be completed with a synthetic error
    /// response (serialization failure, duplicate ID, write failure); the
    /// terminal outcome always flows through the future.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnClosed`] if the connection is broken or closed.
    /// - [`Error::OverQueue`] if no in-flight slot is free. Does not block.
    pub async fn submit(self: &Arc<Self>, request: Request) -> Result<Arc<ResponseFuture>> {
        if self.is_broken_or_closed() {
            return Err(Error::ConnClosed);
        }
        if self.pending_size() >= self.options.max_in_flight {
            return Err(Error::OverQueue);
        }

        let request_id = request.request_id.clone();
        let is_auth = request.is_authentication();

        // an authentication replay is not a pool borrow; completing it must
        // not release one
        let hook = if is_auth { None } else { self.completion_hook() };

        let frame = match request.serialize() {
            Ok(frame) => frame,
            Err(e) => {
                let future = Arc::new(ResponseFuture::new(request, hook));
                future.complete(Some(Response::local_error(
                    request_id,
                    status::REQUEST_ERROR_SERIALIZATION,
                    e.to_string(),
                )));
                return Ok(future);
            }
        };

        let future = Arc::new(ResponseFuture::new(request, hook));

        // Admission into the pending map. An authentication reply reuses
        // the challenged request's ID on purpose and must still be written;
        // its outcome flows through the already-pending entry.
        {
            let mut pending = self.pending.lock();
            match pending.entry(request_id.clone()) {
                std::collections::hash_map::Entry::Occupied(_) => {
                    if !is_auth {
                        warn!(id = %request_id, "request duplicate");
                        future.complete(Some(Response::local_error(
                            request_id.clone(),
                            status::REQUEST_ERROR_DELIVER,
                            format!("duplicate request id pending to server: {request_id}"),
                        )));
                        return Ok(future);
                    }
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&future));
                    self.pending_size.fetch_add(1, Ordering::AcqRel);
                }
            }
        }

        // a concurrent close may have drained the map between the state
        // check and the insert; the entry must still complete exactly once
        if self.state() == State::Closed && self.remove_pending(&request_id).is_some() {
            future.complete(Some(Response::local_error(
                request_id,
                status::REQUEST_ERROR_DELIVER,
                MSG_CONN_CLOSED,
            )));
            return Ok(future);
        }

        if let Err(e) = self.write_frame(frame).await {
            if !is_auth {
                self.remove_pending(&request_id);
            }
            future.complete(Some(Response::local_error(
                request_id,
                status::REQUEST_ERROR_DELIVER,
                e.to_string(),
            )));
        }
        Ok(future)
    }

    /// Writes one binary frame under the write lock with the configured
    /// deadline.
    async fn write_frame(&self, frame: Vec<u8>) -> Result<()> {
        self.touch();
        let mut sink = self.writer.lock().await;
        match timeout(self.options.write_timeout, sink.send(Message::Binary(frame.into()))).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::from(e)),
            Err(_) => Err(Error::transport("write deadline exceeded")),
        }
    }

    /// Removes a pending entry, keeping the size mirror in step.
    fn remove_pending(&self, request_id: &RequestId) -> Option<Arc<ResponseFuture>> {
        let removed = self.pending.lock().remove(request_id);
        if removed.is_some() {
            self.pending_size.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Builds the completion callback returning this connection to its
    /// pool, admitting a waiting borrower.
    fn completion_hook(self: &Arc<Self>) -> Option<CompletionHook> {
        let hook = self.release_hook.get()?.clone();
        let conn = Arc::clone(self);
        Some(Box::new(move || hook(conn)))
    }
}

// ============================================================================
// Connection - Read loop
// ============================================================================

impl Connection {
    /// Reads frames until quit, routing each response to its future.
    async fn read_loop(self: Arc<Self>, mut source: WsSource, mut quit: watch::Receiver<bool>) {
        let mut error_times: u32 = 0;

        loop {
            tokio::select! {
                _ = quit.changed() => {
                    debug!("read loop done as quit");
                    break;
                }

                message = source.next() => {
                    match message {
                        Some(Ok(Message::Binary(payload))) => {
                            error_times = self.route_payload(&payload, error_times).await;
                        }
                        Some(Ok(Message::Text(payload))) => {
                            error_times = self.route_payload(payload.as_bytes(), error_times).await;
                        }
                        // control frames carry no responses
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error_times += 1;
                            if error_times >= MAX_READ_ERRORS {
                                error!(error = %e, "read loop exit due to errors");
                                self.set_broken();
                                break;
                            }
                        }
                        None => {
                            debug!("socket stream ended");
                            self.set_broken();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Decodes and dispatches one frame, returning the new consecutive
    /// error count.
    async fn route_payload(self: &Arc<Self>, payload: &[u8], error_times: u32) -> u32 {
        match read_response(payload) {
            Ok(response) => {
                self.handle_response(response).await;
                0
            }
            Err(e) => {
                let error_times = error_times + 1;
                if error_times >= MAX_READ_ERRORS {
                    error!(error = %e, "read loop marking broken after decode errors");
                    self.set_broken();
                } else {
                    error!(error = %e, "undecodable response frame");
                }
                error_times
            }
        }
    }

    /// Routes one decoded response.
    async fn handle_response(self: &Arc<Self>, response: Response) {
        // server challenge: reply with the same request ID; the reply's
        // outcome flows through the already-pending entry
        if response.code == status::AUTHENTICATE {
            let auth = Request::authentication(
                response.request_id,
                &self.options.username,
                &self.options.password,
            );
            if let Err(e) = self.submit(auth).await {
                warn!(error = %e, "failed to submit authentication reply");
            }
            return;
        }

        let future = {
            let pending = self.pending.lock();
            pending.get(&response.request_id).cloned()
        };
        let Some(future) = future else {
            error!(id = %response.request_id, "response for unknown request");
            return;
        };

        let terminal = response.is_terminal();
        let code = response.code;
        future.merge(|stored| {
            stored.code = code;
            match response.data {
                crate::protocol::response::ResponseData::None => {}
                crate::protocol::response::ResponseData::Raw(chunk) => {
                    stored.data.merge_chunk(chunk);
                }
                crate::protocol::response::ResponseData::Chunks(chunks) => {
                    for chunk in chunks {
                        stored.data.merge_chunk(chunk);
                    }
                }
                crate::protocol::response::ResponseData::Error(err) => {
                    // an error terminates the stream; earlier data chunks
                    // are superseded, a stored error absorbs later frames
                    if !stored.data.is_error() {
                        stored.data = crate::protocol::response::ResponseData::Error(err);
                    }
                }
            }
        });

        if terminal {
            self.remove_pending(&future.request().request_id);
            future.complete(None);
            debug!(id = %future.request().request_id, code, "response complete");
        }
    }
}

// ============================================================================
// Connection - Ping loop
// ============================================================================

impl Connection {
    /// Probes liveness every `ping_interval`.
    ///
    /// A round makes up to three attempts spaced one second apart; a fully
    /// failed round marks the connection broken. Pong replies are not
    /// required — sendability of the control frame is the test.
    async fn ping_loop(self: Arc<Self>, mut quit: watch::Receiver<bool>) {
        let period = self.options.ping_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = quit.changed() => {
                    debug!("ping loop done as quit");
                    return;
                }
                _ = ticker.tick() => {
                    if self.is_broken_or_closed() {
                        return;
                    }
                    if !self.ping_round().await {
                        error!("ping failed, marking connection broken");
                        self.set_broken();
                        return;
                    }
                }
            }
        }
    }

    /// One probe round; `true` when a ping was sent.
    async fn ping_round(&self) -> bool {
        loop {
            let sent = {
                self.touch();
                let mut sink = self.writer.lock().await;
                matches!(
                    timeout(
                        self.options.write_timeout,
                        sink.send(Message::Ping(Vec::new().into()))
                    )
                    .await,
                    Ok(Ok(()))
                )
            };

            if sent {
                self.ping_errors.store(0, Ordering::Release);
                return true;
            }

            let failures = self.ping_errors.fetch_add(1, Ordering::AcqRel) + 1;
            warn!(failures, "ping attempt failed");
            if failures >= PING_RETRY_LIMIT {
                return false;
            }
            tokio::time::sleep(PING_RETRY_GAP).await;
        }
    }
}

// ============================================================================
// Display
// ============================================================================

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "conn{{state: {:?}, borrowed: {}, pending: {}}}",
            self.state(),
            self.borrowed(),
            self.pending_size()
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
