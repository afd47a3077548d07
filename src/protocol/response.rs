//! Response message parsing and the chunk accumulator.
//!
//! Inbound frames are JSON of the shape
//! `{requestId, result: {data, meta}, status: {code, message, attributes}}`.
//! Successful data stays as a raw chunk for lazy decoding; terminal error
//! statuses are reified into a typed [`ResponseError`] stored in the data
//! slot.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::error;

use crate::error::{Error, ResponseError, Result};
use crate::graph::GValue;
use crate::identifiers::RequestId;
use crate::protocol::reader;

// ============================================================================
// Status codes
// ============================================================================

/// Response status codes.
pub mod status {
    /// Request processed to completion; no messages remain in the stream.
    pub const SUCCESS: u16 = 200;
    /// Request processed but there is no result to return.
    pub const NO_CONTENT: u16 = 204;
    /// Some content returned; more chunks remain in the stream.
    pub const PARTIAL_CONTENT: u16 = 206;
    /// Challenge from the server for the client to authenticate.
    pub const AUTHENTICATE: u16 = 401;
    /// The server authenticated the request but will not fulfill it.
    pub const FORBIDDEN: u16 = 403;
    /// Proxy-level authentication failure; terminal.
    pub const PROXY_AUTHENTICATION: u16 = 407;
    /// The request contained objects unserializable on the client side.
    pub const REQUEST_ERROR_SERIALIZATION: u16 = 497;
    /// The request message could not be parsed or routed.
    pub const REQUEST_ERROR_MALFORMED: u16 = 498;
    /// Request arguments were in conflict or incomplete.
    pub const REQUEST_ERROR_INVALID_ARGUMENTS: u16 = 499;
    /// General server error.
    pub const SERVER_ERROR: u16 = 500;
    /// Script evaluation failed.
    pub const SERVER_ERROR_SCRIPT_EVALUATION: u16 = 597;
    /// The server exceeded a timeout for the request.
    pub const SERVER_ERROR_TIMEOUT: u16 = 598;
    /// The server could not serialize a result object.
    pub const SERVER_ERROR_SERIALIZATION: u16 = 599;
    /// Local synthetic code: the request could not be delivered.
    pub const REQUEST_ERROR_DELIVER: u16 = 697;
}

// ============================================================================
// ResponseData
// ============================================================================

/// Accumulator for a response's data across a chunked stream.
///
/// Transitions driven by the read path:
/// nothing → one raw chunk → ordered chunk sequence; an error is terminal
/// and absorbs any later chunks.
#[derive(Debug, Clone)]
pub enum ResponseData {
    /// No content yet (or a 204).
    None,
    /// A single raw chunk.
    Raw(Box<RawValue>),
    /// Ordered sequence of raw chunks from a partial-content stream.
    Chunks(Vec<Box<RawValue>>),
    /// Reified terminal error.
    Error(ResponseError),
}

impl ResponseData {
    /// Folds one more chunk into the accumulator.
    ///
    /// An existing error swallows the chunk; data chunks append in arrival
    /// order.
    pub fn merge_chunk(&mut self, chunk: Box<RawValue>) {
        match self {
            Self::None => *self = Self::Raw(chunk),
            Self::Raw(_) => {
                let Self::Raw(first) = std::mem::replace(self, Self::None) else {
                    unreachable!()
                };
                *self = Self::Chunks(vec![first, chunk]);
            }
            Self::Chunks(chunks) => chunks.push(chunk),
            Self::Error(_) => {}
        }
    }

    /// Returns `true` if the accumulator holds a reified error.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

// ============================================================================
// Response
// ============================================================================

/// A decoded response frame, or the merged view of a chunked stream.
#[derive(Debug, Clone)]
pub struct Response {
    /// Matches the originating request's ID.
    pub request_id: RequestId,
    /// Status code; see [`status`].
    pub code: u16,
    /// Data payload, raw or reified.
    pub data: ResponseData,
}

impl Response {
    /// Creates an empty pending response for a request.
    #[must_use]
    pub fn pending(request_id: RequestId) -> Self {
        Self {
            request_id,
            code: 0,
            data: ResponseData::None,
        }
    }

    /// Creates a synthetic local-error response.
    ///
    /// Used for transport failures (697), encoder failures (497) and
    /// teardown drains.
    #[must_use]
    pub fn local_error(request_id: RequestId, code: u16, message: impl Into<String>) -> Self {
        Self {
            request_id,
            code,
            data: ResponseData::Error(ResponseError::local(code, message)),
        }
    }

    /// Returns `true` once more chunks cannot follow.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.code != status::PARTIAL_CONTENT
    }
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Deserialize)]
struct StatusJson {
    #[serde(default)]
    attributes: Option<Box<RawValue>>,
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ResultJson {
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseJson {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    result: Option<ResultJson>,
    status: StatusJson,
}

// ============================================================================
// Parsing
// ============================================================================

/// Decodes one inbound frame.
///
/// # Errors
///
/// Returns [`Error::Decode`] if the frame is not a response message.
pub fn read_response(msg: &[u8]) -> Result<Response> {
    let parsed: ResponseJson = serde_json::from_slice(msg).map_err(|e| {
        error!(error = %e, "response frame is not valid json");
        Error::decode("response", e.to_string())
    })?;

    let request_id = RequestId::new(parsed.request_id);
    let code = parsed.status.code;

    let data = match code {
        status::AUTHENTICATE => ResponseData::None,
        status::SUCCESS | status::PARTIAL_CONTENT => match parsed.result.and_then(|r| r.data) {
            Some(chunk) if chunk.get() != "null" => ResponseData::Raw(chunk),
            _ => ResponseData::None,
        },
        status::NO_CONTENT => ResponseData::None,
        _ => ResponseData::Error(reify_error(code, parsed.status)),
    };

    Ok(Response {
        request_id,
        code,
        data,
    })
}

/// Builds the typed error value from a terminal error status.
fn reify_error(code: u16, status: StatusJson) -> ResponseError {
    let (stack_trace, exceptions) = status
        .attributes
        .as_deref()
        .map(decode_attributes)
        .unwrap_or_default();
    ResponseError::server(code, status.message, stack_trace, exceptions)
}

/// Extracts `stackTrace` and `exceptions` from the status attributes map.
///
/// Attribute decoding failures degrade to empty fields; the status code and
/// message still reach the caller.
fn decode_attributes(raw: &RawValue) -> (String, Vec<String>) {
    let attributes = match reader::decode_value(raw) {
        Ok(GValue::Map(map)) => map,
        Ok(other) => {
            error!(got = %other.type_name(), "status attributes are not a map");
            return (String::new(), Vec::new());
        }
        Err(e) => {
            error!(error = %e, "failed to decode status attributes");
            return (String::new(), Vec::new());
        }
    };

    let stack_trace = match attributes.get_str("stackTrace") {
        Some(GValue::String(s)) => s.clone(),
        _ => String::new(),
    };

    let exceptions = match attributes.get_str("exceptions") {
        Some(GValue::List(items)) => items
            .iter()
            .filter_map(|item| match item {
                GValue::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    (stack_trace, exceptions)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: &str) -> Box<RawValue> {
        RawValue::from_string(json.to_string()).expect("raw value")
    }

    #[test]
    fn test_read_success_response() {
        let msg = br#"{
            "requestId": "r-1",
            "result": { "data": {"@type":"g:List","@value":[]}, "meta": {} },
            "status": { "code": 200, "message": "", "attributes": {} }
        }"#;

        let response = read_response(msg).expect("parse");
        assert_eq!(response.request_id.as_str(), "r-1");
        assert_eq!(response.code, status::SUCCESS);
        assert!(matches!(response.data, ResponseData::Raw(_)));
        assert!(response.is_terminal());
    }

    #[test]
    fn test_read_no_content_response() {
        let msg = br#"{"requestId":"r-2","status":{"code":204,"message":""}}"#;
        let response = read_response(msg).expect("parse");
        assert_eq!(response.code, status::NO_CONTENT);
        assert!(matches!(response.data, ResponseData::None));
    }

    #[test]
    fn test_read_partial_content_is_not_terminal() {
        let msg = br#"{
            "requestId": "r-3",
            "result": { "data": {"@type":"g:List","@value":[]} },
            "status": { "code": 206, "message": "" }
        }"#;
        let response = read_response(msg).expect("parse");
        assert!(!response.is_terminal());
    }

    #[test]
    fn test_read_challenge_response() {
        let msg = br#"{"requestId":"r-4","status":{"code":401,"message":"authenticate"}}"#;
        let response = read_response(msg).expect("parse");
        assert_eq!(response.code, status::AUTHENTICATE);
        assert!(matches!(response.data, ResponseData::None));
    }

    #[test]
    fn test_read_server_error_reifies_attributes() {
        let msg = br#"{
            "requestId": "r-5",
            "status": {
                "code": 597,
                "message": "script failed",
                "attributes": {"@type":"g:Map","@value":[
                    "stackTrace", "trace-line",
                    "exceptions", {"@type":"g:List","@value":["java.lang.IllegalStateException"]}
                ]}
            }
        }"#;

        let response = read_response(msg).expect("parse");
        let ResponseData::Error(err) = response.data else {
            panic!("not an error")
        };
        assert_eq!(err.code, 597);
        assert_eq!(err.message, "script failed");
        assert_eq!(err.stack_trace, "trace-line");
        assert_eq!(err.exceptions, vec!["java.lang.IllegalStateException"]);
    }

    #[test]
    fn test_read_garbage_fails() {
        assert!(read_response(b"not json").is_err());
    }

    #[test]
    fn test_merge_chunk_transitions() {
        let mut data = ResponseData::None;

        data.merge_chunk(chunk("1"));
        assert!(matches!(data, ResponseData::Raw(_)));

        data.merge_chunk(chunk("2"));
        let ResponseData::Chunks(ref chunks) = data else {
            panic!("not chunks")
        };
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].get(), "1");
        assert_eq!(chunks[1].get(), "2");

        data.merge_chunk(chunk("3"));
        let ResponseData::Chunks(ref chunks) = data else {
            panic!("not chunks")
        };
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_merge_chunk_into_error_is_ignored() {
        let mut data = ResponseData::Error(ResponseError::local(500, "boom"));
        data.merge_chunk(chunk("1"));
        assert!(data.is_error());
    }

    #[test]
    fn test_local_error_response() {
        let response = Response::local_error(
            RequestId::new("r-6"),
            status::REQUEST_ERROR_DELIVER,
            "connection closed",
        );
        assert_eq!(response.code, 697);
        assert!(response.data.is_error());
    }
}
