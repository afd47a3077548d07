//! Async client for Gremlin-speaking graph databases over WebSocket.
//!
//! The driver multiplexes many in-flight requests over a small pool of
//! long-lived WebSocket connections, supports both session-less
//! (auto-commit) and sessioned (explicit transaction) submission, replies
//! to server authentication challenges lazily, and surfaces results as
//! strongly typed graph values.
//!
//! # Architecture
//!
//! ```text
//! caller → Client → ConnPool.get → Connection.submit → codec → WebSocket
//!        ← ResultSetFuture ← ResponseFuture.complete ← read loop ← server
//! ```
//!
//! - Each [`Connection`](transport::Connection) owns one socket, a read
//!   loop, a ping loop and the pending-request map.
//! - The [`ConnPool`](transport::ConnPool) dials connections in the
//!   background, picks the least-loaded live one under two admission caps
//!   and replaces broken ones.
//! - Failed requests are never retried by the transport; the server may
//!   have already applied them.
//!
//! # Quick Start
//!
//! ```no_run
//! use graphdb_driver::{Client, Settings};
//!
//! #[tokio::main]
//! async fn main() -> graphdb_driver::Result<()> {
//!     let client = Client::new(
//!         Settings::new()
//!             .with_host("127.0.0.1")
//!             .with_port(8182)
//!             .with_auth("user", "secret"),
//!     )?;
//!
//!     let results = client.submit_script("g.V().count()").await?;
//!     println!("vertices: {}", results[0].get_int64());
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Public entry: [`Client`], [`SessionClient`], [`Settings`] |
//! | [`graph`] | Typed graph values: [`Vertex`], [`Edge`], [`Path`], ... |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types and codec (internal) |
//! | [`transport`] | Connection and pool layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Public entry: clients, settings, results.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Typed graph values returned by the server.
pub mod graph;

/// Type-safe identifiers for requests and sessions.
pub mod identifiers;

/// Wire protocol message types and codec.
///
/// Internal module; exposed for integration testing and advanced use.
pub mod protocol;

/// WebSocket transport layer.
///
/// Internal module handling connections and pooling.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{
    Client, QueryResult, ResultSetFuture, SessionClient, SessionShell, Settings,
};

// Error types
pub use error::{Error, ResponseError, Result};

// Graph types
pub use graph::{BulkSet, Edge, GKey, GMap, GValue, Path, Property, Vertex, VertexProperty};

// Identifier types
pub use identifiers::{RequestId, SessionId};

// Request options travel with every submit variant
pub use protocol::request::RequestOptions;
