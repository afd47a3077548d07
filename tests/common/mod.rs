// not every test binary exercises every helper
#![allow(dead_code)]

//! In-process WebSocket echo server for driver tests.
//!
//! Accepts connections, extracts the `requestId` from each inbound frame
//! and answers with frames produced by a configurable responder. Supports
//! an artificial per-request delay and killing live sockets to exercise
//! the pool's replacement path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Frames to send back for one request, in order.
pub type Responder = Arc<dyn Fn(&serde_json::Value) -> Vec<String> + Send + Sync>;

/// MIME marker the driver prefixes to outbound frames.
const MIME_PREFIX: &str = "!application/vnd.gremlin-v3.0+json";

/// Default response: code 200 with `g:List[g:Int64 0]`.
pub fn count_zero_frame(request_id: &str) -> String {
    format!(
        r#"{{"requestId": "{request_id}", "result": {{ "data": {{ "@type": "g:List", "@value": [ {{ "@type": "g:Int64", "@value": 0 }} ] }}, "meta": {{ "@type": "g:Map", "@value": [] }} }}, "status": {{ "attributes": {{ "@type": "g:Map", "@value": [] }}, "code": 200, "message": "" }} }}"#
    )
}

/// Partial-content frame carrying one int64 value.
pub fn partial_frame(request_id: &str, value: i64) -> String {
    format!(
        r#"{{"requestId": "{request_id}", "result": {{ "data": {{ "@type": "g:List", "@value": [ {{ "@type": "g:Int64", "@value": {value} }} ] }} }}, "status": {{ "code": 206, "message": "" }} }}"#
    )
}

/// Terminal success frame carrying one int64 value.
pub fn success_frame(request_id: &str, value: i64) -> String {
    format!(
        r#"{{"requestId": "{request_id}", "result": {{ "data": {{ "@type": "g:List", "@value": [ {{ "@type": "g:Int64", "@value": {value} }} ] }} }}, "status": {{ "code": 200, "message": "" }} }}"#
    )
}

/// Terminal server-error frame.
pub fn error_frame(request_id: &str, code: u16, message: &str) -> String {
    format!(
        r#"{{"requestId": "{request_id}", "status": {{ "code": {code}, "message": "{message}", "attributes": {{ "@type": "g:Map", "@value": ["stackTrace", "at server", "exceptions", {{ "@type": "g:List", "@value": ["ServerException"] }}] }} }} }}"#
    )
}

/// Mutable server behavior.
struct ServerState {
    delay: Mutex<Duration>,
    responder: Mutex<Responder>,
    kill_switches: Mutex<Vec<mpsc::Sender<()>>>,
    accepted: AtomicUsize,
}

/// The running echo server.
pub struct TestServer {
    pub host: String,
    pub port: u16,
    state: Arc<ServerState>,
}

impl TestServer {
    /// Binds to an ephemeral localhost port and starts accepting.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let state = Arc::new(ServerState {
            delay: Mutex::new(Duration::ZERO),
            responder: Mutex::new(Arc::new(|request: &serde_json::Value| {
                let id = request["requestId"].as_str().unwrap_or_default();
                vec![count_zero_frame(id)]
            }) as Responder),
            kill_switches: Mutex::new(Vec::new()),
            accepted: AtomicUsize::new(0),
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn_state = Arc::clone(&accept_state);
                tokio::spawn(async move {
                    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    conn_state.accepted.fetch_add(1, Ordering::SeqCst);

                    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
                    conn_state.kill_switches.lock().push(kill_tx);

                    let (mut sink, mut source) = ws.split();
                    loop {
                        tokio::select! {
                            _ = kill_rx.recv() => {
                                // drop the socket without a close frame
                                return;
                            }
                            message = source.next() => {
                                let payload = match message {
                                    Some(Ok(Message::Binary(b))) => String::from_utf8_lossy(&b).into_owned(),
                                    Some(Ok(Message::Text(t))) => t.to_string(),
                                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                                    _ => return,
                                };

                                let body = payload.strip_prefix(MIME_PREFIX).unwrap_or(&payload);
                                let Ok(request) = serde_json::from_str::<serde_json::Value>(body) else {
                                    continue;
                                };

                                let delay = *conn_state.delay.lock();
                                if delay > Duration::ZERO {
                                    tokio::time::sleep(delay).await;
                                }

                                let frames = {
                                    let responder = conn_state.responder.lock().clone();
                                    responder(&request)
                                };
                                for frame in frames {
                                    if sink.send(Message::Text(frame.into())).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            state,
        }
    }

    /// Replaces the response factory.
    pub fn set_responder(&self, responder: Responder) {
        *self.state.responder.lock() = responder;
    }

    /// Sets an artificial processing delay per request.
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    /// Number of WebSocket connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Drops one live socket without a close handshake.
    pub fn kill_one_connection(&self) {
        let switches = self.state.kill_switches.lock();
        for tx in switches.iter() {
            if tx.try_send(()).is_ok() {
                return;
            }
        }
    }
}
