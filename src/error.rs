//! Error types for the graph database driver.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use graphdb_driver::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let results = client.submit_script("g.V().count()").await?;
//!     println!("{}", results[0].get_int64());
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connect`], [`Error::ConnClosed`], [`Error::Transport`] |
//! | Pool | [`Error::PoolClosed`], [`Error::GetConnTimeout`], [`Error::OverQueue`] |
//! | Request | [`Error::DuplicateId`], [`Error::Serialization`], [`Error::ResultTimeout`] |
//! | Server | [`Error::Server`] |
//! | Decoding | [`Error::Decode`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::protocol::response::status;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client settings are invalid.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Dial failed.
    ///
    /// Surfaces once consecutive dial failures saturate the pool.
    #[error("connect failed: {message}")]
    Connect {
        /// Description of the dial failure.
        message: String,
    },

    /// Connection is broken or closed.
    ///
    /// Returned on submission to a dead connection; also the completion
    /// payload of every future drained during teardown.
    #[error("connection closed")]
    ConnClosed,

    /// Request could not be delivered or a reply could not be read.
    ///
    /// Carries the synthetic status code 697 on the response.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    // ========================================================================
    // Pool Errors
    // ========================================================================
    /// The connection pool has been closed.
    #[error("connection pool closed")]
    PoolClosed,

    /// No connection became available within the pool timeout.
    #[error("get connection timeout")]
    GetConnTimeout,

    /// The connection has no free in-flight slot.
    ///
    /// Returned synchronously; the caller may retry once a pending request
    /// on the connection completes.
    #[error("request queue is full, overhead concurrent")]
    OverQueue,

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// A request with the same ID is already pending on the connection.
    #[error("duplicate request id pending to server: {request_id}")]
    DuplicateId {
        /// The offending request ID.
        request_id: String,
    },

    /// The request could not be encoded.
    ///
    /// Carries the synthetic status code 497 on the response.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the encoder failure.
        message: String,
    },

    /// A timed wait on a result future elapsed before completion.
    ///
    /// Local only; the server-side work is not aborted.
    #[error("get result timeout")]
    ResultTimeout,

    // ========================================================================
    // Server Errors
    // ========================================================================
    /// Terminal non-2xx response from the server.
    #[error("server error {code}: {message}")]
    Server {
        /// Server status code (4xx/5xx).
        code: u16,
        /// Server-supplied message.
        message: String,
        /// Server-side stack trace, if any.
        stack_trace: String,
        /// Exception class names reported by the server.
        exceptions: Vec<String>,
    },

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// A response value could not be decoded.
    #[error("decode error in {context}: {message}")]
    Decode {
        /// Which reader failed (e.g. "map", "path", "vertex").
        context: String,
        /// Description of the malformed input.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connect error.
    #[inline]
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a duplicate-request-id error.
    #[inline]
    pub fn duplicate_id(request_id: impl Into<String>) -> Self {
        Self::DuplicateId {
            request_id: request_id.into(),
        }
    }

    /// Creates a serialization error.
    #[inline]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            context: context.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::GetConnTimeout | Self::ResultTimeout)
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::ConnClosed | Self::Transport { .. } | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error came from the server.
    #[inline]
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// Returns `true` if the request was rejected before being sent.
    ///
    /// Over-queue and pool-timeout rejections leave the request unsent, so
    /// the caller may safely resubmit.
    #[inline]
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::OverQueue | Self::GetConnTimeout)
    }
}

// ============================================================================
// ResponseError
// ============================================================================

/// Typed error value the codec places in a response's data slot.
///
/// Server errors carry the full status attributes; local synthetic errors
/// (transport 697, serialization 497) carry a code and message only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseError {
    /// Status code, server-assigned or synthetic.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Server-side stack trace (empty for local errors).
    pub stack_trace: String,
    /// Exception class names (empty for local errors).
    pub exceptions: Vec<String>,
}

impl ResponseError {
    /// Creates a server-reported error from status fields.
    #[must_use]
    pub fn server(
        code: u16,
        message: String,
        stack_trace: String,
        exceptions: Vec<String>,
    ) -> Self {
        Self {
            code,
            message,
            stack_trace,
            exceptions,
        }
    }

    /// Creates a local synthetic error with the given status code.
    #[must_use]
    pub fn local(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stack_trace: String::new(),
            exceptions: Vec::new(),
        }
    }
}

impl From<ResponseError> for Error {
    /// Maps a reified response error back to the matching variant.
    fn from(err: ResponseError) -> Self {
        match err.code {
            status::REQUEST_ERROR_DELIVER if err.message.contains("duplicate request id") => {
                Error::DuplicateId {
                    request_id: err
                        .message
                        .rsplit(": ")
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                }
            }
            status::REQUEST_ERROR_DELIVER => Error::Transport {
                message: err.message,
            },
            status::REQUEST_ERROR_SERIALIZATION => Error::Serialization {
                message: err.message,
            },
            code => Error::Server {
                code,
                message: err.message,
                stack_trace: err.stack_trace,
                exceptions: err.exceptions,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connect("refused");
        assert_eq!(err.to_string(), "connect failed: refused");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("empty host");
        assert_eq!(err.to_string(), "configuration error: empty host");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::GetConnTimeout.is_timeout());
        assert!(Error::ResultTimeout.is_timeout());
        assert!(!Error::PoolClosed.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::ConnClosed.is_connection_error());
        assert!(Error::transport("write failed").is_connection_error());
        assert!(!Error::OverQueue.is_connection_error());
    }

    #[test]
    fn test_is_rejected() {
        assert!(Error::OverQueue.is_rejected());
        assert!(Error::GetConnTimeout.is_rejected());
        assert!(!Error::ConnClosed.is_rejected());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_response_error_to_server_variant() {
        let re = ResponseError::server(597, "bad script".into(), "trace".into(), vec![]);
        let err: Error = re.into();
        match err {
            Error::Server { code, message, .. } => {
                assert_eq!(code, 597);
                assert_eq!(message, "bad script");
            }
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn test_response_error_to_transport_variant() {
        let re = ResponseError::local(697, "connection closed");
        let err: Error = re.into();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[test]
    fn test_response_error_to_duplicate_id_variant() {
        let re = ResponseError::local(697, "duplicate request id pending to server: abc-123");
        let err: Error = re.into();
        match err {
            Error::DuplicateId { request_id } => assert_eq!(request_id, "abc-123"),
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn test_response_error_to_serialization_variant() {
        let re = ResponseError::local(497, "unencodable binding");
        let err: Error = re.into();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
