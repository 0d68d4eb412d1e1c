//! The dynamic in-memory message model the engine reads and writes.
//!
//! Values decoded from length-delimited spans are always copied into owned
//! storage (`String`, [`bytes::Bytes`], or a recursively decoded
//! [`DynamicMessage`]) before the scan cursor advances past them; the engine
//! never retains a pointer into caller-owned memory beyond a single decode
//! call.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::descriptor::{FieldDescriptor, FieldKind, MessageDescriptor, ScalarKind};
use crate::unknown::UnknownFields;

/// One field value: a scalar, an enum number, a nested message, a repeated
/// sequence, or a map.
///
/// Which scalar variant a field uses is determined by its
/// [`ScalarKind`]: `int32`/`sint32`/`sfixed32` all store [`Value::I32`],
/// `fixed32`/`uint32` store [`Value::U32`], and so on. The descriptor, not
/// the value, remembers the wire representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Bytes),
    /// Int-backed enum value; may be a number the schema does not name.
    Enum(i32),
    Message(DynamicMessage),
    List(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
}

impl Value {
    /// The default value for a field of the given kind.
    pub fn default_for(kind: &FieldKind) -> Value {
        match kind {
            FieldKind::Scalar(kind) => Value::default_for_scalar(*kind),
            FieldKind::Enum(desc) => Value::Enum(desc.default_number()),
            FieldKind::Message(desc) | FieldKind::Group(desc) => {
                Value::Message(DynamicMessage::new(desc.clone()))
            }
            FieldKind::Map(_) => Value::Map(BTreeMap::new()),
        }
    }

    pub fn default_for_scalar(kind: ScalarKind) -> Value {
        match kind {
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::Int32 | ScalarKind::SInt32 | ScalarKind::SFixed32 => Value::I32(0),
            ScalarKind::Int64 | ScalarKind::SInt64 | ScalarKind::SFixed64 => Value::I64(0),
            ScalarKind::UInt32 | ScalarKind::Fixed32 => Value::U32(0),
            ScalarKind::UInt64 | ScalarKind::Fixed64 => Value::U64(0),
            ScalarKind::Float => Value::F32(0.0),
            ScalarKind::Double => Value::F64(0.0),
            ScalarKind::String => Value::String(String::new()),
            ScalarKind::Bytes => Value::Bytes(Bytes::new()),
        }
    }

    /// Whether this value equals the default for its kind.
    ///
    /// Proto3 implicit-presence singular fields equal to their default are
    /// skipped by every encoder, so this predicate gates field emission.
    pub fn is_default(&self, kind: &FieldKind) -> bool {
        match self {
            Value::Bool(v) => !v,
            Value::I32(v) => *v == 0,
            Value::I64(v) => *v == 0,
            Value::U32(v) => *v == 0,
            Value::U64(v) => *v == 0,
            Value::F32(v) => v.to_bits() == 0,
            Value::F64(v) => v.to_bits() == 0,
            Value::String(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Enum(v) => match kind {
                FieldKind::Enum(desc) => *v == desc.default_number(),
                _ => *v == 0,
            },
            // Message presence is existence, never a default check.
            Value::Message(_) => false,
            Value::List(v) => v.is_empty(),
            Value::Map(v) => v.is_empty(),
        }
    }
}

/// The subset of scalar values protobuf allows as map keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum MapKey {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    String(String),
}

impl MapKey {
    /// The default key used when a map entry omits field 1.
    pub fn default_for(kind: ScalarKind) -> MapKey {
        match kind {
            ScalarKind::Bool => MapKey::Bool(false),
            ScalarKind::Int32 | ScalarKind::SInt32 | ScalarKind::SFixed32 => MapKey::I32(0),
            ScalarKind::Int64 | ScalarKind::SInt64 | ScalarKind::SFixed64 => MapKey::I64(0),
            ScalarKind::UInt32 | ScalarKind::Fixed32 => MapKey::U32(0),
            ScalarKind::UInt64 | ScalarKind::Fixed64 => MapKey::U64(0),
            ScalarKind::String => MapKey::String(String::new()),
            // Constructors reject float/double/bytes keys.
            _ => unreachable!("invalid map key kind"),
        }
    }

    /// Converts a decoded scalar into a map key. Panics on the kinds the
    /// descriptor layer already rejects as keys.
    pub fn from_value(value: Value) -> MapKey {
        match value {
            Value::Bool(v) => MapKey::Bool(v),
            Value::I32(v) => MapKey::I32(v),
            Value::I64(v) => MapKey::I64(v),
            Value::U32(v) => MapKey::U32(v),
            Value::U64(v) => MapKey::U64(v),
            Value::String(v) => MapKey::String(v),
            other => unreachable!("invalid map key value {other:?}"),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(v) => Value::Bool(*v),
            MapKey::I32(v) => Value::I32(*v),
            MapKey::I64(v) => Value::I64(*v),
            MapKey::U32(v) => Value::U32(*v),
            MapKey::U64(v) => Value::U64(*v),
            MapKey::String(v) => Value::String(v.clone()),
        }
    }
}

/// A decoded extension field: the registry-supplied descriptor plus its
/// value. Equality ignores the descriptor identity.
#[derive(Debug, Clone)]
pub struct ExtensionValue {
    pub field: Arc<FieldDescriptor>,
    pub value: Value,
}

impl PartialEq for ExtensionValue {
    fn eq(&self, other: &Self) -> bool {
        self.field.number == other.field.number && self.value == other.value
    }
}

/// A message instance addressed purely through its descriptor.
///
/// Fields live in a `BTreeMap` keyed by field number, which gives every
/// traversal ascending field-number order for free. Presence is existence:
/// a field absent from the map is unset.
#[derive(Debug, Clone)]
pub struct DynamicMessage {
    descriptor: Arc<MessageDescriptor>,
    fields: BTreeMap<u32, Value>,
    extensions: BTreeMap<u32, ExtensionValue>,
    unknown: UnknownFields,
}

impl DynamicMessage {
    pub fn new(descriptor: Arc<MessageDescriptor>) -> Self {
        DynamicMessage {
            descriptor,
            fields: BTreeMap::new(),
            extensions: BTreeMap::new(),
            unknown: UnknownFields::new(),
        }
    }

    pub fn descriptor(&self) -> &Arc<MessageDescriptor> {
        &self.descriptor
    }

    /// Stores a field value. If the field is a oneof member, every other
    /// member of the same oneof is cleared first.
    pub fn set(&mut self, number: u32, value: Value) {
        if let Some(oneof) = self.descriptor.field(number).and_then(|f| f.oneof) {
            self.clear_oneof(oneof);
        }
        self.fields.insert(number, value);
    }

    /// Removes every set member of the given oneof.
    pub fn clear_oneof(&mut self, oneof: usize) {
        let members: Vec<u32> = self
            .descriptor
            .fields()
            .iter()
            .filter(|f| f.oneof == Some(oneof))
            .map(|f| f.number)
            .collect();
        for number in members {
            self.fields.remove(&number);
        }
    }

    /// The set member of the given oneof, if any.
    pub fn oneof_member(&self, oneof: usize) -> Option<u32> {
        self.descriptor
            .fields()
            .iter()
            .filter(|f| f.oneof == Some(oneof))
            .map(|f| f.number)
            .find(|number| self.fields.contains_key(number))
    }

    pub fn get(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number)
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut Value> {
        self.fields.get_mut(&number)
    }

    pub fn has(&self, number: u32) -> bool {
        self.fields.contains_key(&number)
    }

    pub fn clear(&mut self, number: u32) {
        self.fields.remove(&number);
    }

    /// Set fields in ascending field-number order.
    pub fn fields(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.extensions.is_empty() && self.unknown.is_empty()
    }

    pub fn set_extension(&mut self, field: Arc<FieldDescriptor>, value: Value) {
        self.extensions
            .insert(field.number, ExtensionValue { field, value });
    }

    pub fn get_extension(&self, number: u32) -> Option<&Value> {
        self.extensions.get(&number).map(|e| &e.value)
    }

    pub fn get_extension_mut(&mut self, number: u32) -> Option<&mut ExtensionValue> {
        self.extensions.get_mut(&number)
    }

    /// Set extensions in ascending field-number order.
    pub fn extensions(&self) -> impl Iterator<Item = &ExtensionValue> {
        self.extensions.values()
    }

    pub fn unknown(&self) -> &UnknownFields {
        &self.unknown
    }

    pub fn unknown_mut(&mut self) -> &mut UnknownFields {
        &mut self.unknown
    }

    /// Appends to a repeated field, creating the list on first use.
    pub fn append(&mut self, number: u32, value: Value) {
        match self.fields.get_mut(&number) {
            Some(Value::List(list)) => list.push(value),
            _ => {
                self.fields.insert(number, Value::List(vec![value]));
            }
        }
    }

    /// Inserts into a map field, creating the map on first use. Later
    /// entries with the same key overwrite earlier ones.
    pub fn insert_map_entry(&mut self, number: u32, key: MapKey, value: Value) {
        match self.fields.get_mut(&number) {
            Some(Value::Map(map)) => {
                map.insert(key, value);
            }
            _ => {
                let mut map = BTreeMap::new();
                map.insert(key, value);
                self.fields.insert(number, Value::Map(map));
            }
        }
    }
}

impl PartialEq for DynamicMessage {
    /// Field-wise equality; descriptors compare by full name.
    fn eq(&self, other: &Self) -> bool {
        self.descriptor.full_name() == other.descriptor.full_name()
            && self.fields == other.fields
            && self.extensions == other.extensions
            && self.unknown == other.unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldDescriptor, Syntax};

    fn oneof_descriptor() -> Arc<MessageDescriptor> {
        MessageDescriptor::new(
            "test.OneofHolder",
            Syntax::Proto3,
            vec!["choice".to_owned()],
            vec![
                FieldDescriptor::new(1, "as_int", FieldKind::Scalar(ScalarKind::Int32)).in_oneof(0),
                FieldDescriptor::new(2, "as_text", FieldKind::Scalar(ScalarKind::String))
                    .in_oneof(0),
                FieldDescriptor::new(3, "plain", FieldKind::Scalar(ScalarKind::Bool)),
            ],
        )
    }

    #[test]
    fn set_clears_oneof_siblings() {
        let mut msg = DynamicMessage::new(oneof_descriptor());
        msg.set(1, Value::I32(5));
        assert_eq!(msg.oneof_member(0), Some(1));

        msg.set(2, Value::String("hi".to_owned()));
        assert!(!msg.has(1), "sibling must be cleared");
        assert_eq!(msg.oneof_member(0), Some(2));

        // Non-members are untouched.
        msg.set(3, Value::Bool(true));
        assert!(msg.has(2));
    }

    #[test]
    fn append_and_map_entry() {
        let desc = oneof_descriptor();
        let mut msg = DynamicMessage::new(desc);
        msg.append(3, Value::I32(1));
        msg.append(3, Value::I32(2));
        assert_eq!(
            msg.get(3),
            Some(&Value::List(vec![Value::I32(1), Value::I32(2)]))
        );

        let mut other = DynamicMessage::new(oneof_descriptor());
        other.insert_map_entry(4, MapKey::String("a".into()), Value::I32(1));
        other.insert_map_entry(4, MapKey::String("a".into()), Value::I32(9));
        match other.get(4) {
            Some(Value::Map(map)) => {
                assert_eq!(map.len(), 1);
                assert_eq!(map[&MapKey::String("a".into())], Value::I32(9));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn default_predicates() {
        assert!(Value::I32(0).is_default(&FieldKind::Scalar(ScalarKind::Int32)));
        assert!(!Value::I32(1).is_default(&FieldKind::Scalar(ScalarKind::Int32)));
        assert!(Value::String(String::new()).is_default(&FieldKind::Scalar(ScalarKind::String)));
        // Negative zero is not the default double.
        assert!(!Value::F64(-0.0).is_default(&FieldKind::Scalar(ScalarKind::Double)));
        assert!(Value::F64(0.0).is_default(&FieldKind::Scalar(ScalarKind::Double)));
    }
}
