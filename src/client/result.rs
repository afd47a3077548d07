//! Caller-facing result values and the async result handoff.
//!
//! [`QueryResult`] wraps one decoded value and exposes type-testing
//! accessors that return a default when the tag does not match — never a
//! panic. [`ResultSetFuture`] wraps the transport future and decodes on
//! demand.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::graph::{BulkSet, Edge, GMap, GValue, Path, Property, Vertex, VertexProperty};
use crate::protocol;
use crate::transport::ResponseFuture;

// ============================================================================
// QueryResult
// ============================================================================

/// One decoded result value.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    value: GValue,
}

impl QueryResult {
    /// Wraps a decoded value.
    #[inline]
    #[must_use]
    pub fn new(value: GValue) -> Self {
        Self { value }
    }

    /// The underlying value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &GValue {
        &self.value
    }

    /// Unwraps into the underlying value.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> GValue {
        self.value
    }

    /// Boolean value, `false` on mismatch.
    #[inline]
    #[must_use]
    pub fn get_bool(&self) -> bool {
        matches!(self.value, GValue::Bool(true))
    }

    /// Byte value, `0` on mismatch.
    #[inline]
    #[must_use]
    pub fn get_int8(&self) -> i8 {
        match self.value {
            GValue::Int8(v) => v,
            _ => 0,
        }
    }

    /// 32-bit integer value, `0` on mismatch.
    #[inline]
    #[must_use]
    pub fn get_int32(&self) -> i32 {
        match self.value {
            GValue::Int32(v) => v,
            _ => 0,
        }
    }

    /// 64-bit integer value, `0` on mismatch.
    #[inline]
    #[must_use]
    pub fn get_int64(&self) -> i64 {
        match self.value {
            GValue::Int64(v) => v,
            _ => 0,
        }
    }

    /// Float value, `0.0` on mismatch.
    #[inline]
    #[must_use]
    pub fn get_float(&self) -> f32 {
        match self.value {
            GValue::Float(v) => v,
            _ => 0.0,
        }
    }

    /// Double value, `0.0` on mismatch.
    #[inline]
    #[must_use]
    pub fn get_double(&self) -> f64 {
        match self.value {
            GValue::Double(v) => v,
            _ => 0.0,
        }
    }

    /// String value, empty on mismatch.
    #[inline]
    #[must_use]
    pub fn get_string(&self) -> &str {
        match &self.value {
            GValue::String(v) => v,
            _ => "",
        }
    }

    /// Vertex value, if the tag matches.
    #[inline]
    #[must_use]
    pub fn get_vertex(&self) -> Option<&Vertex> {
        match &self.value {
            GValue::Vertex(v) => Some(v),
            _ => None,
        }
    }

    /// Edge value, if the tag matches.
    #[inline]
    #[must_use]
    pub fn get_edge(&self) -> Option<&Edge> {
        match &self.value {
            GValue::Edge(e) => Some(e),
            _ => None,
        }
    }

    /// Property value, if the tag matches.
    #[inline]
    #[must_use]
    pub fn get_property(&self) -> Option<&Property> {
        match &self.value {
            GValue::Property(p) => Some(p),
            _ => None,
        }
    }

    /// Vertex-property value, if the tag matches.
    #[inline]
    #[must_use]
    pub fn get_vertex_property(&self) -> Option<&VertexProperty> {
        match &self.value {
            GValue::VertexProperty(vp) => Some(vp),
            _ => None,
        }
    }

    /// Path value, if the tag matches.
    #[inline]
    #[must_use]
    pub fn get_path(&self) -> Option<&Path> {
        match &self.value {
            GValue::Path(p) => Some(p),
            _ => None,
        }
    }

    /// List value, if the tag matches.
    #[inline]
    #[must_use]
    pub fn get_list(&self) -> Option<&[GValue]> {
        match &self.value {
            GValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Map value, if the tag matches.
    #[inline]
    #[must_use]
    pub fn get_map(&self) -> Option<&GMap> {
        match &self.value {
            GValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Bulk-set value, if the tag matches.
    #[inline]
    #[must_use]
    pub fn get_bulk_set(&self) -> Option<&BulkSet> {
        match &self.value {
            GValue::BulkSet(bs) => Some(bs),
            _ => None,
        }
    }
}

// ============================================================================
// ResultSetFuture
// ============================================================================

/// Asynchronous handle to the results of one submitted script.
///
/// Decoding happens lazily at the first results call.
#[derive(Debug, Clone)]
pub struct ResultSetFuture {
    future: Arc<ResponseFuture>,
}

impl ResultSetFuture {
    /// Wraps a transport future.
    #[inline]
    #[must_use]
    pub fn new(future: Arc<ResponseFuture>) -> Self {
        Self { future }
    }

    /// Returns `true` once the response (or failure) has arrived.
    #[inline]
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.future.is_completed()
    }

    /// Waits for the response and decodes the results.
    ///
    /// # Errors
    ///
    /// The reified transport/server error, or [`Error::Decode`].
    pub async fn get_results(&self) -> Result<Vec<QueryResult>> {
        let response = self.future.get().await;
        let values = protocol::get_results(&response)?;
        Ok(values.into_iter().map(QueryResult::new).collect())
    }

    /// Waits up to `timeout` for the response.
    ///
    /// # Errors
    ///
    /// [`Error::ResultTimeout`] if the deadline fires; otherwise as
    /// [`get_results`](Self::get_results).
    pub async fn get_results_or_timeout(&self, timeout: Duration) -> Result<Vec<QueryResult>> {
        let Some(response) = self.future.get_or_timeout(timeout).await else {
            return Err(Error::ResultTimeout);
        };
        let values = protocol::get_results(&response)?;
        Ok(values.into_iter().map(QueryResult::new).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
