//! Typed graph values returned by the server.
//!
//! The decoder produces values of heterogeneous shape — scalars, lists,
//! maps, graph elements, paths, bulk sets — modeled here as the [`GValue`]
//! tagged union. Graph elements are *detached*: they carry identity, label
//! and properties but no live link back to the server.
//!
//! A [`VertexProperty`] is both a property (key/value, owner vertex) and an
//! element (it has its own server-assigned id and may itself be addressed).
//! The property-to-vertex back-reference is stored as the owner's id rather
//! than an owning pointer, which keeps the vertex/property cycle out of the
//! ownership graph.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;

// ============================================================================
// GValue
// ============================================================================

/// Any value decodable from a response.
///
/// `g:Set` decodes into [`GValue::List`] (order preserved, uniqueness is the
/// server's promise); `g:T` tokens decode into [`GValue::String`].
#[derive(Debug, Clone, PartialEq)]
pub enum GValue {
    /// Boolean scalar (untagged on the wire).
    Bool(bool),
    /// `gx:Byte`.
    Int8(i8),
    /// `g:Int32`.
    Int32(i32),
    /// `g:Int64`.
    Int64(i64),
    /// `g:Float`.
    Float(f32),
    /// `g:Double`.
    Double(f64),
    /// Untagged string or `g:T` token.
    String(String),
    /// `g:List` or `g:Set`.
    List(Vec<GValue>),
    /// `g:Map`.
    Map(GMap),
    /// `g:BulkSet`.
    BulkSet(BulkSet),
    /// `g:Vertex`.
    Vertex(Vertex),
    /// `g:Edge`.
    Edge(Edge),
    /// `g:VertexProperty`.
    VertexProperty(VertexProperty),
    /// `g:Property`.
    Property(Property),
    /// `g:Path`.
    Path(Path),
}

impl GValue {
    /// Short tag name used in decode diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int8(_) => "int8",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::BulkSet(_) => "bulkSet",
            Self::Vertex(_) => "vertex",
            Self::Edge(_) => "edge",
            Self::VertexProperty(_) => "vertexProperty",
            Self::Property(_) => "property",
            Self::Path(_) => "path",
        }
    }
}

// ============================================================================
// GKey
// ============================================================================

/// Hashable subset of [`GValue`] usable as a map key.
///
/// GraphSON map keys are scalars in practice (strings, `g:T` tokens,
/// integers, booleans); anything else fails decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GKey {
    /// String or token key.
    String(String),
    /// Integer key (`g:Int32`/`g:Int64`/`gx:Byte` widen to i64).
    Int(i64),
    /// Boolean key.
    Bool(bool),
}

impl GKey {
    /// Returns the key as a string slice, if it is one.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl TryFrom<GValue> for GKey {
    type Error = GValue;

    /// Converts a decoded value into a key, handing back the value on
    /// unsupported shapes.
    fn try_from(value: GValue) -> std::result::Result<Self, GValue> {
        match value {
            GValue::String(s) => Ok(Self::String(s)),
            GValue::Int8(v) => Ok(Self::Int(i64::from(v))),
            GValue::Int32(v) => Ok(Self::Int(i64::from(v))),
            GValue::Int64(v) => Ok(Self::Int(v)),
            GValue::Bool(v) => Ok(Self::Bool(v)),
            other => Err(other),
        }
    }
}

impl From<&str> for GKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl fmt::Display for GKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

// ============================================================================
// GMap
// ============================================================================

/// Unordered mapping decoded from `g:Map`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GMap(FxHashMap<GKey, GValue>);

impl GMap {
    /// Creates an empty map.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key/value pair, replacing any previous value.
    pub fn insert(&mut self, key: GKey, value: GValue) {
        self.0.insert(key, value);
    }

    /// Looks up a value by key.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &GKey) -> Option<&GValue> {
        self.0.get(key)
    }

    /// Looks up a value by string key.
    #[inline]
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&GValue> {
        self.0.get(&GKey::String(key.to_string()))
    }

    /// Number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the map has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&GKey, &GValue)> {
        self.0.iter()
    }
}

// ============================================================================
// BulkSet
// ============================================================================

/// Multiset where each distinct value carries an occurrence count.
///
/// Entries keep server arrival order; `size` is the weighted total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkSet {
    entries: Vec<(GValue, i64)>,
}

impl BulkSet {
    /// Creates an empty bulk set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value with its count.
    pub fn add(&mut self, value: GValue, count: i64) {
        self.entries.push((value, count));
    }

    /// Weighted size: the sum of all counts.
    #[must_use]
    pub fn size(&self) -> i64 {
        self.entries.iter().map(|(_, n)| n).sum()
    }

    /// Number of distinct entries.
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(value, count)` entries in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = &(GValue, i64)> {
        self.entries.iter()
    }
}

// ============================================================================
// Property
// ============================================================================

/// Key/value property attached to an edge (or standalone in a result).
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    key: String,
    value: Box<GValue>,
    element_id: String,
}

impl Property {
    /// Creates a property; `element_id` is empty when detached.
    #[must_use]
    pub fn new(key: impl Into<String>, value: GValue, element_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Box::new(value),
            element_id: element_id.into(),
        }
    }

    /// The property key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The property value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &GValue {
        &self.value
    }

    /// Id of the owning element, empty when detached.
    #[inline]
    #[must_use]
    pub fn element_id(&self) -> &str {
        &self.element_id
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p[{}->{}]", self.key, clipped(&self.value))
    }
}

// ============================================================================
// VertexProperty
// ============================================================================

/// Property of a vertex.
///
/// Also an element: it has a server-assigned id, and its label equals the
/// property key. The owning vertex is referenced by id.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexProperty {
    id: String,
    label: String,
    value: Box<GValue>,
    vertex_id: String,
}

impl VertexProperty {
    /// Creates a vertex property; the vertex id is attached by the decoder
    /// once the owning vertex is known.
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>, value: GValue) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            value: Box::new(value),
            vertex_id: String::new(),
        }
    }

    /// Server-assigned element id of the property itself.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Element label; equals the property key.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The property key (same as [`label`](Self::label)).
    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.label
    }

    /// The property value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &GValue {
        &self.value
    }

    /// Id of the owning vertex, empty when detached.
    #[inline]
    #[must_use]
    pub fn vertex_id(&self) -> &str {
        &self.vertex_id
    }

    /// Binds the property to its owning vertex.
    pub fn set_vertex_id(&mut self, vertex_id: impl Into<String>) {
        self.vertex_id = vertex_id.into();
    }
}

impl fmt::Display for VertexProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vp[{}->{}]", self.label, clipped(&self.value))
    }
}

// ============================================================================
// Vertex
// ============================================================================

/// A graph vertex with a multimap of properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    id: String,
    label: String,
    properties: FxHashMap<String, Vec<VertexProperty>>,
}

impl Vertex {
    /// Creates a vertex with no properties.
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: FxHashMap::default(),
        }
    }

    /// Unique identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Categorizing label.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Appends a property under its key; keys may repeat.
    pub fn add_property(&mut self, mut prop: VertexProperty) {
        prop.set_vertex_id(self.id.clone());
        self.properties
            .entry(prop.key().to_string())
            .or_default()
            .push(prop);
    }

    /// First property for the key, if present.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&VertexProperty> {
        self.properties.get(key).and_then(|props| props.first())
    }

    /// All properties for the key.
    #[must_use]
    pub fn properties(&self, key: &str) -> &[VertexProperty] {
        self.properties.get(key).map_or(&[], Vec::as_slice)
    }

    /// Every property of the vertex, in unspecified key order.
    #[must_use]
    pub fn all_properties(&self) -> Vec<&VertexProperty> {
        self.properties.values().flatten().collect()
    }

    /// First value for the key, if present.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&GValue> {
        self.property(key).map(VertexProperty::value)
    }

    /// Property keys in unspecified order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.properties.keys().map(String::as_str).collect()
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v[{}]", self.id)
    }
}

// ============================================================================
// Edge
// ============================================================================

/// A directed edge between two (shallow) vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    id: String,
    label: String,
    out_vertex: Vertex,
    in_vertex: Vertex,
    properties: FxHashMap<String, Property>,
}

impl Edge {
    /// Creates an edge between the given endpoint vertices.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        out_vertex: Vertex,
        in_vertex: Vertex,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            out_vertex,
            in_vertex,
            properties: FxHashMap::default(),
        }
    }

    /// Unique identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Categorizing label.
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The vertex the edge points away from.
    #[inline]
    #[must_use]
    pub fn out_vertex(&self) -> &Vertex {
        &self.out_vertex
    }

    /// The vertex the edge points into.
    #[inline]
    #[must_use]
    pub fn in_vertex(&self) -> &Vertex {
        &self.in_vertex
    }

    /// Sets a property, replacing any previous value for the key.
    pub fn add_property(&mut self, prop: Property) {
        self.properties.insert(prop.key().to_string(), prop);
    }

    /// Property for the key, if present.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Property> {
        self.properties.get(key)
    }

    /// Value for the key, if present.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&GValue> {
        self.properties.get(key).map(Property::value)
    }

    /// Property keys in unspecified order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.properties.keys().map(String::as_str).collect()
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "e[{}][{}-{}->{}]",
            self.id, self.out_vertex.id, self.label, self.in_vertex.id
        )
    }
}

// ============================================================================
// Path
// ============================================================================

/// An ordered walk through the graph.
///
/// `objects` and `labels` run in parallel: `labels[i]` is the set of step
/// labels under which `objects[i]` was captured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    objects: Vec<GValue>,
    labels: Vec<Vec<String>>,
}

impl Path {
    /// Creates an empty path.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one step.
    pub fn extend(&mut self, object: GValue, labels: Vec<String>) {
        self.objects.push(object);
        self.labels.push(labels);
    }

    /// Number of steps.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.objects.len()
    }

    /// The objects visited, in order.
    #[inline]
    #[must_use]
    pub fn objects(&self) -> &[GValue] {
        &self.objects
    }

    /// The label sets, parallel to [`objects`](Self::objects).
    #[inline]
    #[must_use]
    pub fn labels(&self) -> &[Vec<String>] {
        &self.labels
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.objects.iter().map(clipped).collect();
        write!(f, "path[{}]", steps.join(","))
    }
}

// ============================================================================
// Display helper
// ============================================================================

/// Debug rendering clipped to keep log lines short.
fn clipped(value: &GValue) -> String {
    let mut s = match value {
        GValue::Bool(v) => v.to_string(),
        GValue::Int8(v) => v.to_string(),
        GValue::Int32(v) => v.to_string(),
        GValue::Int64(v) => v.to_string(),
        GValue::Float(v) => v.to_string(),
        GValue::Double(v) => v.to_string(),
        GValue::String(v) => v.clone(),
        GValue::Vertex(v) => v.to_string(),
        GValue::Edge(e) => e.to_string(),
        GValue::VertexProperty(vp) => vp.to_string(),
        GValue::Property(p) => p.to_string(),
        GValue::Path(p) => p.to_string(),
        other => format!("{other:?}"),
    };
    if s.len() > 20 {
        s.truncate(20);
        s.push_str("...");
    }
    s
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_properties_multimap() {
        let mut v = Vertex::new("1", "person");
        v.add_property(VertexProperty::new("p1", "name", GValue::String("luck".into())));
        v.add_property(VertexProperty::new("p2", "name", GValue::String("jack".into())));
        v.add_property(VertexProperty::new("p3", "age", GValue::Int32(30)));

        assert_eq!(v.properties("name").len(), 2);
        assert_eq!(v.property("name").map(VertexProperty::value), Some(&GValue::String("luck".into())));
        assert_eq!(v.value("age"), Some(&GValue::Int32(30)));
        assert_eq!(v.all_properties().len(), 3);
        assert!(v.value("missing").is_none());

        let mut keys = v.keys();
        keys.sort_unstable();
        assert_eq!(keys, vec!["age", "name"]);
    }

    #[test]
    fn test_vertex_property_back_reference_by_id() {
        let mut v = Vertex::new("42", "t");
        v.add_property(VertexProperty::new("p", "name", GValue::String("x".into())));
        assert_eq!(v.property("name").map(VertexProperty::vertex_id), Some("42"));
    }

    #[test]
    fn test_vertex_property_key_is_label() {
        let vp = VertexProperty::new("p", "name", GValue::String("x".into()));
        assert_eq!(vp.key(), vp.label());
    }

    #[test]
    fn test_edge_endpoints() {
        let edge = Edge::new("9", "knows", Vertex::new("1", "person"), Vertex::new("3", "person"));
        assert_eq!(edge.out_vertex().id(), "1");
        assert_eq!(edge.in_vertex().id(), "3");
        assert_eq!(edge.to_string(), "e[9][1-knows->3]");
    }

    #[test]
    fn test_path_parallel_sequences() {
        let mut path = Path::new();
        path.extend(GValue::Vertex(Vertex::new("1", "t")), vec![]);
        path.extend(GValue::Vertex(Vertex::new("3", "t")), vec!["a".into(), "b".into()]);

        assert_eq!(path.size(), 2);
        assert_eq!(path.labels()[1], vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_bulk_set_weighted_size() {
        let mut bs = BulkSet::new();
        bs.add(GValue::String("a".into()), 3);
        bs.add(GValue::String("b".into()), 1);

        assert_eq!(bs.size(), 4);
        assert_eq!(bs.entry_count(), 2);
    }

    #[test]
    fn test_gmap_lookup() {
        let mut map = GMap::new();
        map.insert(GKey::from("count"), GValue::Int64(7));
        map.insert(GKey::Int(3), GValue::Bool(true));

        assert_eq!(map.get_str("count"), Some(&GValue::Int64(7)));
        assert_eq!(map.get(&GKey::Int(3)), Some(&GValue::Bool(true)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_gkey_rejects_composite_values() {
        let res = GKey::try_from(GValue::List(vec![]));
        assert!(res.is_err());
    }

    #[test]
    fn test_display_renderings() {
        let p = Property::new("weight", GValue::Double(0.5), "9");
        assert_eq!(p.to_string(), "p[weight->0.5]");

        let vp = VertexProperty::new("pid", "name", GValue::String("a-very-long-value-over-20-chars".into()));
        assert_eq!(vp.to_string(), "vp[name->a-very-long-value-ov...]");

        assert_eq!(Vertex::new("7", "t").to_string(), "v[7]");
    }
}
