//! Core Types for via-pointsim
//!
//! Points, values and the composite structures the dispatcher produces.
//! Types are co-located here as the single source of truth.

use crate::dispatch::Category;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ============================================================================
// Primitive data types
// ============================================================================

/// Primitive data type of a point or of a category's elements.
///
/// The declaration order is the index used in category tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarType {
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    Guid,
    ByteString,
    XmlElement,
    NodeId,
    ExpandedNodeId,
    StatusCode,
    QualifiedName,
    LocalizedText,
    Variant,
    Enumeration,
    Number,
    Integer,
    UInteger,
}

impl ScalarType {
    pub const ALL: [ScalarType; 26] = [
        ScalarType::Boolean,
        ScalarType::SByte,
        ScalarType::Byte,
        ScalarType::Int16,
        ScalarType::UInt16,
        ScalarType::Int32,
        ScalarType::UInt32,
        ScalarType::Int64,
        ScalarType::UInt64,
        ScalarType::Float,
        ScalarType::Double,
        ScalarType::String,
        ScalarType::DateTime,
        ScalarType::Guid,
        ScalarType::ByteString,
        ScalarType::XmlElement,
        ScalarType::NodeId,
        ScalarType::ExpandedNodeId,
        ScalarType::StatusCode,
        ScalarType::QualifiedName,
        ScalarType::LocalizedText,
        ScalarType::Variant,
        ScalarType::Enumeration,
        ScalarType::Number,
        ScalarType::Integer,
        ScalarType::UInteger,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Numeric types, including the abstract Number/Integer/UInteger.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ScalarType::SByte
                | ScalarType::Byte
                | ScalarType::Int16
                | ScalarType::UInt16
                | ScalarType::Int32
                | ScalarType::UInt32
                | ScalarType::Int64
                | ScalarType::UInt64
                | ScalarType::Float
                | ScalarType::Double
                | ScalarType::Number
                | ScalarType::Integer
                | ScalarType::UInteger
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            ScalarType::Byte
                | ScalarType::UInt16
                | ScalarType::UInt32
                | ScalarType::UInt64
                | ScalarType::UInteger
        )
    }

    /// Concrete (non-abstract) types, Boolean through Variant.
    pub fn is_concrete(self) -> bool {
        self.index() <= ScalarType::Variant.index()
    }

    /// Integer widths that can hold the archive's seed countdown.
    pub fn is_history_integer(self) -> bool {
        matches!(
            self,
            ScalarType::Int16
                | ScalarType::UInt16
                | ScalarType::Int32
                | ScalarType::UInt32
                | ScalarType::Int64
                | ScalarType::UInt64
        )
    }
}

// ============================================================================
// Structured identifiers
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(uuid::Uuid),
    Opaque(Bytes),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeId {
    pub namespace: u16,
    pub identifier: Identifier,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    pub node_id: NodeId,
    pub namespace_uri: Option<String>,
    pub server_index: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualifiedName {
    pub namespace: u16,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub locale: String,
    pub text: String,
}

// ============================================================================
// Composite ("vector") structures
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Discriminant of a [`VectorUnion`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorUnionField {
    X = 1,
    Y = 2,
    Z = 3,
}

impl VectorUnionField {
    pub const ALL: [VectorUnionField; 3] =
        [VectorUnionField::X, VectorUnionField::Y, VectorUnionField::Z];
}

/// Tagged union over the three axes.
///
/// All slots carry a value; only the one named by `switch_field` is
/// authoritative, mirroring how the union is laid out on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorUnion {
    pub switch_field: VectorUnionField,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl VectorUnion {
    pub fn selected(&self) -> f64 {
        match self.switch_field {
            VectorUnionField::X => self.x,
            VectorUnionField::Y => self.y,
            VectorUnionField::Z => self.z,
        }
    }
}

/// Vector whose fields are individually optional.
///
/// Values are always populated; `encoding_mask` says which are present.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorWithOptionalFields {
    pub encoding_mask: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl VectorWithOptionalFields {
    pub const X_PRESENT: u32 = 0b001;
    pub const Y_PRESENT: u32 = 0b010;
    pub const Z_PRESENT: u32 = 0b100;

    pub fn x(&self) -> Option<f64> {
        (self.encoding_mask & Self::X_PRESENT != 0).then_some(self.x)
    }

    pub fn y(&self) -> Option<f64> {
        (self.encoding_mask & Self::Y_PRESENT != 0).then_some(self.y)
    }

    pub fn z(&self) -> Option<f64> {
        (self.encoding_mask & Self::Z_PRESENT != 0).then_some(self.z)
    }
}

/// Composite of every vector flavour plus an array of each.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultipleVectors {
    pub vector: Vector,
    pub vector_union: VectorUnion,
    pub vector_with_optional_fields: VectorWithOptionalFields,
    pub vector_array: Vec<Vector>,
    pub vector_union_array: Vec<VectorUnion>,
    pub vector_with_optional_fields_array: Vec<VectorWithOptionalFields>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StructureField {
    pub data_type: ScalarType,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayField {
    pub data_type: ScalarType,
    pub values: Vec<Value>,
}

/// One array per concrete scalar type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrayStructure {
    pub fields: Vec<ArrayField>,
}

/// The widest value surface: one field per scalar type, a nested structure
/// and an [`ArrayStructure`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalarStructure {
    pub fields: Vec<StructureField>,
    pub nested: Option<Box<ScalarStructure>>,
    pub arrays: ArrayStructure,
}

impl ScalarStructure {
    pub fn field(&self, data_type: ScalarType) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.data_type == data_type)
            .map(|f| &f.value)
    }
}

// ============================================================================
// Values
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Guid(uuid::Uuid),
    ByteString(Bytes),
    XmlElement(String),
    NodeId(NodeId),
    ExpandedNodeId(ExpandedNodeId),
    StatusCode(u32),
    QualifiedName(QualifiedName),
    LocalizedText(LocalizedText),
    Variant(Box<Value>),
    Enumeration(i32),
    Array(Vec<Value>),
    Vector(Vector),
    VectorUnion(VectorUnion),
    VectorWithOptionalFields(VectorWithOptionalFields),
    MultipleVectors(Box<MultipleVectors>),
    ScalarStructure(Box<ScalarStructure>),
    ArrayStructure(Box<ArrayStructure>),
}

impl Value {
    /// Concrete scalar type of this value, `None` for arrays and structures.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        let data_type = match self {
            Value::Boolean(_) => ScalarType::Boolean,
            Value::SByte(_) => ScalarType::SByte,
            Value::Byte(_) => ScalarType::Byte,
            Value::Int16(_) => ScalarType::Int16,
            Value::UInt16(_) => ScalarType::UInt16,
            Value::Int32(_) => ScalarType::Int32,
            Value::UInt32(_) => ScalarType::UInt32,
            Value::Int64(_) => ScalarType::Int64,
            Value::UInt64(_) => ScalarType::UInt64,
            Value::Float(_) => ScalarType::Float,
            Value::Double(_) => ScalarType::Double,
            Value::String(_) => ScalarType::String,
            Value::DateTime(_) => ScalarType::DateTime,
            Value::Guid(_) => ScalarType::Guid,
            Value::ByteString(_) => ScalarType::ByteString,
            Value::XmlElement(_) => ScalarType::XmlElement,
            Value::NodeId(_) => ScalarType::NodeId,
            Value::ExpandedNodeId(_) => ScalarType::ExpandedNodeId,
            Value::StatusCode(_) => ScalarType::StatusCode,
            Value::QualifiedName(_) => ScalarType::QualifiedName,
            Value::LocalizedText(_) => ScalarType::LocalizedText,
            Value::Variant(_) => ScalarType::Variant,
            Value::Enumeration(_) => ScalarType::Enumeration,
            _ => return None,
        };
        Some(data_type)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::SByte(v) => Some(v as f64),
            Value::Byte(v) => Some(v as f64),
            Value::Int16(v) => Some(v as f64),
            Value::UInt16(v) => Some(v as f64),
            Value::Int32(v) => Some(v as f64),
            Value::UInt32(v) => Some(v as f64),
            Value::Int64(v) => Some(v as f64),
            Value::UInt64(v) => Some(v as f64),
            Value::Float(v) => Some(v as f64),
            Value::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::SByte(v) => Some(v as i64),
            Value::Byte(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::Int64(v) => Some(v),
            Value::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Build an integer value of `data_type` from `raw`, `None` when the type
    /// is not an integer type or `raw` does not fit.
    pub fn integer(data_type: ScalarType, raw: i64) -> Option<Value> {
        let value = match data_type {
            ScalarType::SByte => Value::SByte(i8::try_from(raw).ok()?),
            ScalarType::Byte => Value::Byte(u8::try_from(raw).ok()?),
            ScalarType::Int16 => Value::Int16(i16::try_from(raw).ok()?),
            ScalarType::UInt16 => Value::UInt16(u16::try_from(raw).ok()?),
            ScalarType::Int32 => Value::Int32(i32::try_from(raw).ok()?),
            ScalarType::UInt32 => Value::UInt32(u32::try_from(raw).ok()?),
            ScalarType::Int64 => Value::Int64(raw),
            ScalarType::UInt64 => Value::UInt64(u64::try_from(raw).ok()?),
            _ => return None,
        };
        Some(value)
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}

// ============================================================================
// Points
// ============================================================================

/// Opaque, stable point identity assigned by the catalogue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(String);

impl PointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PointId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PointId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Good,
    Uncertain,
    Bad,
}

/// Current value/status/timestamp triple of a point
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PointState {
    pub value: Option<Value>,
    pub status: Status,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for PointState {
    fn default() -> Self {
        Self {
            value: None,
            status: Status::Uncertain,
            timestamp: None,
        }
    }
}

/// Shared handle to a catalogue point
pub type PointRef = Arc<Point>;

/// A simulated data point.
///
/// Identity (id, tag, parent, capability) is fixed at construction; the
/// value/status/timestamp triple is written only by the simulator.
#[derive(Debug)]
pub struct Point {
    id: PointId,
    tag: u32,
    parent: Option<PointRef>,
    self_generating: bool,
    state: Mutex<PointState>,
}

impl Point {
    pub fn new(id: impl Into<PointId>, tag: u32) -> Self {
        Self {
            id: id.into(),
            tag,
            parent: None,
            self_generating: false,
            state: Mutex::new(PointState::default()),
        }
    }

    pub fn with_parent(mut self, parent: PointRef) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Mark the point as producing its own values when sampled.
    pub fn with_self_generation(mut self) -> Self {
        self.self_generating = true;
        self
    }

    pub fn into_ref(self) -> PointRef {
        Arc::new(self)
    }

    pub fn id(&self) -> &PointId {
        &self.id
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn parent(&self) -> Option<&PointRef> {
        self.parent.as_ref()
    }

    pub fn is_self_generating(&self) -> bool {
        self.self_generating
    }

    pub fn category(&self) -> Option<Category> {
        Category::from_tag(self.tag)
    }

    pub fn state(&self) -> PointState {
        lock_unpoisoned(&self.state).clone()
    }

    pub(crate) fn set_state(&self, value: Value, status: Status, timestamp: DateTime<Utc>) {
        let mut state = lock_unpoisoned(&self.state);
        state.value = Some(value);
        state.status = status;
        state.timestamp = Some(timestamp);
    }
}

/// Lock a mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_type_index_round_trip() {
        for data_type in ScalarType::ALL {
            assert_eq!(ScalarType::from_index(data_type.index()), Some(data_type));
        }
        assert_eq!(ScalarType::from_index(26), None);
    }

    #[test]
    fn test_optional_vector_mask() {
        let v = VectorWithOptionalFields {
            encoding_mask: VectorWithOptionalFields::X_PRESENT | VectorWithOptionalFields::Z_PRESENT,
            x: 1.0,
            y: 2.0,
            z: 3.0,
        };
        assert_eq!(v.x(), Some(1.0));
        assert_eq!(v.y(), None);
        assert_eq!(v.z(), Some(3.0));
    }

    #[test]
    fn test_integer_construction_checks_width() {
        assert_eq!(Value::integer(ScalarType::Int32, 1000), Some(Value::Int32(1000)));
        assert_eq!(Value::integer(ScalarType::Byte, 1000), None);
        assert_eq!(Value::integer(ScalarType::UInt16, -1), None);
        assert_eq!(Value::integer(ScalarType::Double, 1), None);
    }

    #[test]
    fn test_point_state_written_by_core() {
        let point = Point::new("ns=2;s=Scalar_Int32", 1005);
        assert_eq!(point.state().status, Status::Uncertain);
        assert!(point.state().value.is_none());

        let now = Utc::now();
        point.set_state(Value::Int32(7), Status::Good, now);
        let state = point.state();
        assert_eq!(state.value, Some(Value::Int32(7)));
        assert_eq!(state.status, Status::Good);
        assert_eq!(state.timestamp, Some(now));
    }
}
