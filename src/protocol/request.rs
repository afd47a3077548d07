//! Request message type, argument tokens and builders.
//!
//! A request is immutable after creation. Builders cover the three
//! operations the server accepts: script evaluation, the SASL reply to an
//! authentication challenge, and session close.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::identifiers::{RequestId, SessionId};

// ============================================================================
// Constants
// ============================================================================

/// MIME marker prefixed to every outbound frame.
pub const MIME_TYPE: &str = "!application/vnd.gremlin-v3.0+json";

/// Script language sent with every eval request.
const LANGUAGE_GROOVY: &str = "gremlin-groovy";

/// Script submitted by the close-session request.
const SESSION_CLOSE_SCRIPT: &str = "session.close()";

/// Recognized argument names.
///
/// Mirrors the driver token table of the upstream Gremlin protocol.
pub mod args {
    pub const BATCH_SIZE: &str = "batchSize";
    pub const BINDINGS: &str = "bindings";
    pub const ALIASES: &str = "aliases";
    pub const GREMLIN: &str = "gremlin";
    pub const LANGUAGE: &str = "language";
    pub const SCRIPT_EVAL_TIMEOUT: &str = "scriptEvaluationTimeout";
    pub const SESSION: &str = "session";
    pub const MANAGE_TRANSACTION: &str = "manageTransaction";
    pub const SASL: &str = "sasl";
    pub const SASL_MECHANISM: &str = "saslMechanism";
}

// ============================================================================
// Op
// ============================================================================

/// Request operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// Evaluate a script.
    Eval,
    /// Reply to a SASL challenge.
    Authentication,
    /// Close a server-side session.
    Close,
}

// ============================================================================
// Processor
// ============================================================================

/// Server-side processor routing the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Processor {
    /// Session-less processing; every request auto-commits.
    #[default]
    #[serde(rename = "")]
    Default,
    /// Sessioned processing; requests share one transaction context.
    #[serde(rename = "session")]
    Session,
    /// Traversal processor; used by authentication replies.
    #[serde(rename = "traversal")]
    Traversal,
}

// ============================================================================
// Request
// ============================================================================

/// A framed request to the server.
///
/// # Format
///
/// ```json
/// {
///   "requestId": "uuid",
///   "op": "eval",
///   "processor": "",
///   "args": { "gremlin": "g.V().count()", "language": "gremlin-groovy" }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Unique identifier for request/response correlation.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,

    /// Operation code.
    pub op: Op,

    /// Processor selection.
    pub processor: Processor,

    /// Named arguments.
    pub args: Map<String, Value>,
}

impl Request {
    /// Builds a script-evaluation request.
    ///
    /// Uses the options' override request ID when set, else generates a
    /// fresh UUID. Selects the session processor iff a `session` argument
    /// is present after merging.
    #[must_use]
    pub fn eval(script: &str, options: &RequestOptions) -> Self {
        let request_id = match &options.request_id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => RequestId::generate(),
        };

        let mut args = Map::new();
        args.insert(args::GREMLIN.into(), Value::from(script));
        args.insert(args::LANGUAGE.into(), Value::from(LANGUAGE_GROOVY));

        if let Some(timeout) = options.timeout {
            args.insert(
                args::SCRIPT_EVAL_TIMEOUT.into(),
                Value::from(timeout.as_millis() as u64),
            );
        }

        let mut session = false;
        for (key, value) in &options.parameters {
            if key == args::SESSION {
                session = true;
            }
            args.insert(key.clone(), value.clone());
        }

        Self {
            request_id,
            op: Op::Eval,
            processor: if session {
                Processor::Session
            } else {
                Processor::Default
            },
            args,
        }
    }

    /// Builds the SASL reply to a server challenge.
    ///
    /// Reuses the challenged request's ID so the reply completes the
    /// original pending entry. The SASL payload is
    /// `base64(NUL + username + NUL + password)`.
    #[must_use]
    pub fn authentication(request_id: RequestId, username: &str, password: &str) -> Self {
        let mut sasl = Vec::with_capacity(username.len() + password.len() + 2);
        sasl.push(0u8);
        sasl.extend_from_slice(username.as_bytes());
        sasl.push(0u8);
        sasl.extend_from_slice(password.as_bytes());

        let mut args = Map::new();
        args.insert(args::SASL.into(), Value::from(BASE64.encode(sasl)));

        Self {
            request_id,
            op: Op::Authentication,
            processor: Processor::Traversal,
            args,
        }
    }

    /// Builds a session-close request.
    #[must_use]
    pub fn close_session(session_id: &SessionId) -> Self {
        let mut args = Map::new();
        args.insert(args::SESSION.into(), Value::from(session_id.as_str()));
        args.insert(args::GREMLIN.into(), Value::from(SESSION_CLOSE_SCRIPT));

        Self {
            request_id: RequestId::generate(),
            op: Op::Close,
            processor: Processor::Session,
            args,
        }
    }

    /// Returns `true` for authentication replies.
    ///
    /// The submit path admits these despite the pending duplicate they
    /// intentionally create.
    #[inline]
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        self.op == Op::Authentication
    }

    /// Encodes the request into a framed binary message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if an argument value
    /// cannot be encoded.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)?;
        let mut msg = Vec::with_capacity(MIME_TYPE.len() + body.len());
        msg.extend_from_slice(MIME_TYPE.as_bytes());
        msg.extend_from_slice(&body);
        Ok(msg)
    }
}

// ============================================================================
// RequestOptions
// ============================================================================

/// Optional per-request parameters.
///
/// # Example
///
/// ```ignore
/// let mut options = RequestOptions::default();
/// options.set_timeout(Duration::from_secs(10));
/// options.add_binding("GDB___id", "vertex-1");
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    request_id: Option<RequestId>,
    timeout: Option<Duration>,
    parameters: Map<String, Value>,
}

impl RequestOptions {
    /// Creates empty options.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options carrying a bindings map.
    #[must_use]
    pub fn with_bindings(bindings: Map<String, Value>) -> Self {
        let mut options = Self::default();
        if !bindings.is_empty() {
            options
                .parameters
                .insert(args::BINDINGS.into(), Value::Object(bindings));
        }
        options
    }

    /// Overrides the generated request ID.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = Some(request_id);
    }

    /// Sets the server-side script evaluation timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Adds a free-form argument.
    pub fn add_arg(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.parameters.insert(key.into(), value.into());
    }

    /// Adds a single script binding.
    pub fn add_binding(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        match self
            .parameters
            .entry(args::BINDINGS.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(bindings) => {
                bindings.insert(key.into(), value.into());
            }
            other => {
                *other = Value::Object(Map::from_iter([(key.into(), value.into())]));
            }
        }
    }

    /// The override request ID, if any.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_serialization() {
        let request = Request::eval("g.V().count()", &RequestOptions::default());
        let json = serde_json::to_string(&request).expect("serialize");

        assert!(json.contains("\"op\":\"eval\""));
        assert!(json.contains("\"processor\":\"\""));
        assert!(json.contains("\"gremlin\":\"g.V().count()\""));
        assert!(json.contains("\"language\":\"gremlin-groovy\""));
    }

    #[test]
    fn test_eval_with_override_id() {
        let mut options = RequestOptions::default();
        options.set_request_id(RequestId::new("fixed-id"));

        let request = Request::eval("g.V()", &options);
        assert_eq!(request.request_id.as_str(), "fixed-id");
    }

    #[test]
    fn test_eval_generates_unique_ids() {
        let a = Request::eval("g.V()", &RequestOptions::default());
        let b = Request::eval("g.V()", &RequestOptions::default());
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_eval_session_selects_session_processor() {
        let mut options = RequestOptions::default();
        options.add_arg(args::SESSION, "session-1");

        let request = Request::eval("g.V()", &options);
        assert_eq!(request.processor, Processor::Session);
        assert_eq!(request.args[args::SESSION], Value::from("session-1"));
    }

    #[test]
    fn test_eval_timeout_arg() {
        let mut options = RequestOptions::default();
        options.set_timeout(Duration::from_millis(1500));

        let request = Request::eval("g.V()", &options);
        assert_eq!(request.args[args::SCRIPT_EVAL_TIMEOUT], Value::from(1500u64));
    }

    #[test]
    fn test_eval_merges_bindings() {
        let mut options = RequestOptions::default();
        options.add_binding("GDB___id", "v-1");
        options.add_binding("GDB___n", 3);

        let request = Request::eval("g.V(GDB___id).limit(GDB___n)", &options);
        let bindings = request.args[args::BINDINGS].as_object().expect("bindings");
        assert_eq!(bindings["GDB___id"], Value::from("v-1"));
        assert_eq!(bindings["GDB___n"], Value::from(3));
    }

    #[test]
    fn test_authentication_request() {
        let request = Request::authentication(RequestId::new("challenge-id"), "user", "pass");

        assert_eq!(request.op, Op::Authentication);
        assert_eq!(request.processor, Processor::Traversal);
        assert_eq!(request.request_id.as_str(), "challenge-id");
        assert!(request.is_authentication());

        let sasl = request.args[args::SASL].as_str().expect("sasl");
        let decoded = BASE64.decode(sasl).expect("base64");
        assert_eq!(decoded, b"\0user\0pass");
    }

    #[test]
    fn test_close_session_request() {
        let request = Request::close_session(&SessionId::new("s-1"));

        assert_eq!(request.op, Op::Close);
        assert_eq!(request.processor, Processor::Session);
        assert_eq!(request.args[args::SESSION], Value::from("s-1"));
        assert_eq!(request.args[args::GREMLIN], Value::from("session.close()"));
    }

    #[test]
    fn test_serialize_frames_mime_prefix() {
        let request = Request::eval("g.V()", &RequestOptions::default());
        let framed = request.serialize().expect("serialize");

        assert!(framed.starts_with(MIME_TYPE.as_bytes()));
        let body: serde_json::Value =
            serde_json::from_slice(&framed[MIME_TYPE.len()..]).expect("json body");
        assert_eq!(body["op"], "eval");
    }
}
