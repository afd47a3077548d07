//! Tagged-JSON result decoding.
//!
//! Response data is a forest of `{"@type": ..., "@value": ...}` nodes.
//! Each tag dispatches to a reader; untagged scalars decode as string or
//! bool by trial. Decoding is lazy — raw chunks stay unparsed until the
//! caller asks for results, and chunked (partial content) data concatenates
//! per-chunk results in arrival order.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::error;

use crate::error::{Error, Result};
use crate::graph::{BulkSet, Edge, GKey, GMap, GValue, Path, Property, Vertex, VertexProperty};
use crate::protocol::response::{Response, ResponseData};

// ============================================================================
// Type tags
// ============================================================================

const TYPE_INT8: &str = "gx:Byte";
const TYPE_INT32: &str = "g:Int32";
const TYPE_INT64: &str = "g:Int64";
const TYPE_FLOAT: &str = "g:Float";
const TYPE_DOUBLE: &str = "g:Double";

const TYPE_LIST: &str = "g:List";
const TYPE_MAP: &str = "g:Map";
const TYPE_SET: &str = "g:Set";
const TYPE_BULK_SET: &str = "g:BulkSet";

const TYPE_T: &str = "g:T";

const TYPE_VERTEX: &str = "g:Vertex";
const TYPE_EDGE: &str = "g:Edge";
const TYPE_VERTEX_PROPERTY: &str = "g:VertexProperty";
const TYPE_PROPERTY: &str = "g:Property";
const TYPE_PATH: &str = "g:Path";

// ============================================================================
// Wire shapes
// ============================================================================

/// One tagged node.
#[derive(Deserialize)]
struct Tagged<'a> {
    #[serde(rename = "@type")]
    tag: String,
    #[serde(rename = "@value", borrow)]
    value: &'a RawValue,
}

#[derive(Deserialize)]
struct VertexV3<'a> {
    id: String,
    label: String,
    #[serde(default, borrow)]
    properties: FxHashMap<String, Vec<Tagged<'a>>>,
}

#[derive(Deserialize)]
struct VertexPropertyV3<'a> {
    id: String,
    #[serde(borrow)]
    value: &'a RawValue,
    label: String,
}

#[derive(Deserialize)]
struct PropertyV3<'a> {
    key: String,
    #[serde(borrow)]
    value: &'a RawValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EdgeV3<'a> {
    id: String,
    label: String,
    in_v: String,
    in_v_label: String,
    out_v: String,
    out_v_label: String,
    #[serde(default, borrow)]
    properties: FxHashMap<String, Tagged<'a>>,
}

#[derive(Deserialize)]
struct PathV3<'a> {
    #[serde(borrow)]
    labels: Tagged<'a>,
    #[serde(borrow)]
    objects: Tagged<'a>,
}

// ============================================================================
// Entry points
// ============================================================================

/// Decodes a terminal response into typed results.
///
/// Empty on no-content; per-chunk results concatenate in arrival order for
/// streamed responses; a reified error converts back into the matching
/// [`enum@Error`] variant.
///
/// # Errors
///
/// [`Error::Decode`] on malformed data, or the reified response error.
pub fn get_results(response: &Response) -> Result<Vec<GValue>> {
    match &response.data {
        ResponseData::None => Ok(Vec::new()),
        ResponseData::Raw(chunk) => decode_chunk(chunk),
        ResponseData::Chunks(chunks) => {
            let mut merged = Vec::new();
            for chunk in chunks {
                merged.extend(decode_chunk(chunk)?);
            }
            Ok(merged)
        }
        ResponseData::Error(err) => Err(Error::from(err.clone())),
    }
}

/// Decodes one raw data chunk. The top level is always `g:List`.
pub(crate) fn decode_chunk(raw: &RawValue) -> Result<Vec<GValue>> {
    let tagged: Tagged<'_> = serde_json::from_str(raw.get())
        .map_err(|e| Error::decode("chunk", e.to_string()))?;

    if tagged.tag != TYPE_LIST {
        error!(tag = %tagged.tag, "response data does not start with a list");
        return Err(Error::decode(
            "chunk",
            format!("expected {TYPE_LIST} at top level, got {}", tagged.tag),
        ));
    }
    decode_list(tagged.value)
}

/// Decodes a single value node, tagged or untagged.
pub(crate) fn decode_value(raw: &RawValue) -> Result<GValue> {
    let Ok(tagged) = serde_json::from_str::<Tagged<'_>>(raw.get()) else {
        return decode_bool_or_string(raw);
    };

    match tagged.tag.as_str() {
        TYPE_INT8 => Ok(GValue::Int8(decode_number(tagged.value)?)),
        TYPE_INT32 => Ok(GValue::Int32(decode_number(tagged.value)?)),
        TYPE_INT64 => Ok(GValue::Int64(decode_number(tagged.value)?)),
        TYPE_FLOAT => Ok(GValue::Float(decode_number(tagged.value)?)),
        TYPE_DOUBLE => Ok(GValue::Double(decode_number(tagged.value)?)),
        TYPE_T => decode_bool_or_string(tagged.value),
        TYPE_LIST | TYPE_SET => Ok(GValue::List(decode_list(tagged.value)?)),
        TYPE_MAP => decode_map(tagged.value),
        TYPE_BULK_SET => decode_bulk_set(tagged.value),
        TYPE_VERTEX => decode_vertex(tagged.value),
        TYPE_EDGE => decode_edge(tagged.value),
        TYPE_VERTEX_PROPERTY => decode_vertex_property(tagged.value),
        TYPE_PROPERTY => decode_property(tagged.value),
        TYPE_PATH => decode_path(tagged.value),
        other => {
            error!(tag = %other, "unknown graphson type");
            Err(Error::decode("value", format!("unsupported type {other}")))
        }
    }
}

// ============================================================================
// Scalar readers
// ============================================================================

fn decode_number<T: serde::de::DeserializeOwned>(raw: &RawValue) -> Result<T> {
    serde_json::from_str(raw.get()).map_err(|e| Error::decode("number", e.to_string()))
}

fn decode_bool_or_string(raw: &RawValue) -> Result<GValue> {
    if let Ok(s) = serde_json::from_str::<String>(raw.get()) {
        return Ok(GValue::String(s));
    }
    if let Ok(b) = serde_json::from_str::<bool>(raw.get()) {
        return Ok(GValue::Bool(b));
    }
    Err(Error::decode(
        "scalar",
        format!("neither string nor bool: {}", raw.get()),
    ))
}

// ============================================================================
// Composite readers
// ============================================================================

fn decode_list(raw: &RawValue) -> Result<Vec<GValue>> {
    let items: Vec<&RawValue> = serde_json::from_str(raw.get())
        .map_err(|e| Error::decode("list", e.to_string()))?;

    let mut values = Vec::with_capacity(items.len());
    for item in items {
        if item.get() == "null" {
            continue;
        }
        values.push(decode_value(item)?);
    }
    Ok(values)
}

/// The map value is a flat key/value sequence of even length.
fn decode_map(raw: &RawValue) -> Result<GValue> {
    let flat = decode_list(raw)?;
    if flat.len() % 2 != 0 {
        return Err(Error::decode("map", "un-paired key/value sequence"));
    }

    let mut map = GMap::new();
    let mut iter = flat.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let key = GKey::try_from(key)
            .map_err(|v| Error::decode("map", format!("unhashable key of type {}", v.type_name())))?;
        map.insert(key, value);
    }
    Ok(GValue::Map(map))
}

/// The bulk-set value is a flat `(value, int64 count)` pair sequence.
fn decode_bulk_set(raw: &RawValue) -> Result<GValue> {
    let flat = decode_list(raw)?;
    if flat.len() % 2 != 0 {
        return Err(Error::decode("bulkSet", "un-paired value/count sequence"));
    }

    let mut bulk = BulkSet::new();
    let mut iter = flat.into_iter();
    while let (Some(value), Some(count)) = (iter.next(), iter.next()) {
        match count {
            GValue::Int64(n) => bulk.add(value, n),
            other => {
                error!(got = %other.type_name(), "bulkSet count is not an int64");
                return Err(Error::decode(
                    "bulkSet",
                    format!("count of type {}", other.type_name()),
                ));
            }
        }
    }
    Ok(GValue::BulkSet(bulk))
}

// ============================================================================
// Graph element readers
// ============================================================================

fn decode_vertex_property(raw: &RawValue) -> Result<GValue> {
    let vp: VertexPropertyV3<'_> = serde_json::from_str(raw.get())
        .map_err(|e| Error::decode("vertexProperty", e.to_string()))?;

    let value = decode_value(vp.value)?;
    Ok(GValue::VertexProperty(VertexProperty::new(
        vp.id, vp.label, value,
    )))
}

fn decode_vertex(raw: &RawValue) -> Result<GValue> {
    let v: VertexV3<'_> =
        serde_json::from_str(raw.get()).map_err(|e| Error::decode("vertex", e.to_string()))?;

    let mut vertex = Vertex::new(v.id, v.label);
    for (_, props) in v.properties {
        for prop in props {
            match decode_vertex_property(prop.value)? {
                GValue::VertexProperty(vp) => vertex.add_property(vp),
                other => {
                    return Err(Error::decode(
                        "vertex",
                        format!("property decoded as {}", other.type_name()),
                    ));
                }
            }
        }
    }
    Ok(GValue::Vertex(vertex))
}

fn decode_property(raw: &RawValue) -> Result<GValue> {
    let p: PropertyV3<'_> =
        serde_json::from_str(raw.get()).map_err(|e| Error::decode("property", e.to_string()))?;

    let value = decode_value(p.value)?;
    Ok(GValue::Property(Property::new(p.key, value, "")))
}

fn decode_edge(raw: &RawValue) -> Result<GValue> {
    let e: EdgeV3<'_> =
        serde_json::from_str(raw.get()).map_err(|e| Error::decode("edge", e.to_string()))?;

    let out_vertex = Vertex::new(e.out_v, e.out_v_label);
    let in_vertex = Vertex::new(e.in_v, e.in_v_label);
    let mut edge = Edge::new(e.id, e.label, out_vertex, in_vertex);

    for (_, prop) in e.properties {
        match decode_value_tagged(&prop)? {
            GValue::Property(p) => edge.add_property(p),
            other => {
                return Err(Error::decode(
                    "edge",
                    format!("property decoded as {}", other.type_name()),
                ));
            }
        }
    }
    Ok(GValue::Edge(edge))
}

fn decode_value_tagged(tagged: &Tagged<'_>) -> Result<GValue> {
    match tagged.tag.as_str() {
        TYPE_PROPERTY => decode_property(tagged.value),
        other => Err(Error::decode(
            "edge",
            format!("expected {TYPE_PROPERTY}, got {other}"),
        )),
    }
}

fn decode_path(raw: &RawValue) -> Result<GValue> {
    let p: PathV3<'_> =
        serde_json::from_str(raw.get()).map_err(|e| Error::decode("path", e.to_string()))?;

    if p.labels.tag != TYPE_LIST || p.objects.tag != TYPE_LIST {
        return Err(Error::decode("path", "labels/objects are not lists"));
    }

    let objects = decode_list(p.objects.value)?;
    let labels = decode_list(p.labels.value)?;
    if objects.len() != labels.len() {
        return Err(Error::decode("path", "un-paired labels and objects"));
    }

    let mut path = Path::new();
    for (object, label_set) in objects.into_iter().zip(labels) {
        let GValue::List(labels) = label_set else {
            return Err(Error::decode("path", "label set is not a list"));
        };
        let mut names = Vec::with_capacity(labels.len());
        for label in labels {
            match label {
                GValue::String(s) => names.push(s),
                other => {
                    return Err(Error::decode(
                        "path",
                        format!("label of type {}", other.type_name()),
                    ));
                }
            }
        }
        path.extend(object, names);
    }
    Ok(GValue::Path(path))
}

// ============================================================================
// Tests
// ============================================================================
