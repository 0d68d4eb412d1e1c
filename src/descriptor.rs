//! The collaborator-facing metadata contract.
//!
//! The engine never assumes a concrete in-memory message layout; instead the
//! caller (normally a code generator or schema loader) supplies a
//! [`MessageDescriptor`]: an ordered catalog of fields, each with its number,
//! type, cardinality, and name tables. Everything the decoders and the
//! visitor traversal know about a message comes from here.

use std::collections::HashMap;
use std::sync::Arc;

use crate::wire::{WireType, MAX_FIELD_NUMBER, MIN_FIELD_NUMBER};

/// Which edition of field-presence and unknown-field semantics a message
/// follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Explicit presence, required fields, unknown fields preserved.
    Proto2,
    /// Implicit presence for singular scalars, unknown fields discarded.
    Proto3,
}

/// The closed set of primitive type tags.
///
/// One generic codec is parameterized over this enum; there is deliberately
/// no per-scalar trait family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int32,
    Int64,
    UInt32,
    UInt64,
    SInt32,
    SInt64,
    Fixed32,
    Fixed64,
    SFixed32,
    SFixed64,
    Float,
    Double,
    String,
    Bytes,
}

impl ScalarKind {
    /// The wire type this scalar uses when not packed.
    pub const fn wire_type(self) -> WireType {
        match self {
            ScalarKind::Bool
            | ScalarKind::Int32
            | ScalarKind::Int64
            | ScalarKind::UInt32
            | ScalarKind::UInt64
            | ScalarKind::SInt32
            | ScalarKind::SInt64 => WireType::Varint,
            ScalarKind::Fixed32 | ScalarKind::SFixed32 | ScalarKind::Float => WireType::Fixed32,
            ScalarKind::Fixed64 | ScalarKind::SFixed64 | ScalarKind::Double => WireType::Fixed64,
            ScalarKind::String | ScalarKind::Bytes => WireType::Len,
        }
    }

    /// Whether a repeated field of this scalar may use the packed encoding.
    pub const fn is_packable(self) -> bool {
        !matches!(self, ScalarKind::String | ScalarKind::Bytes)
    }

    /// Payload width for the fixed wire types, `None` for everything else.
    pub const fn fixed_width(self) -> Option<usize> {
        match self {
            ScalarKind::Fixed32 | ScalarKind::SFixed32 | ScalarKind::Float => Some(4),
            ScalarKind::Fixed64 | ScalarKind::SFixed64 | ScalarKind::Double => Some(8),
            _ => None,
        }
    }

    /// Whether this scalar may be used as a map key.
    pub const fn is_valid_map_key(self) -> bool {
        !matches!(
            self,
            ScalarKind::Float | ScalarKind::Double | ScalarKind::Bytes
        )
    }
}

/// The type of a field: a scalar, an enum, a nested message or group, or a
/// map.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Enum(Arc<EnumDescriptor>),
    Message(Arc<MessageDescriptor>),
    /// Deprecated proto2 nesting delimited by start/end keys instead of a
    /// length prefix.
    Group(Arc<MessageDescriptor>),
    Map(Arc<MapKind>),
}

impl FieldKind {
    /// The wire type of a singular (non-packed) occurrence of this field.
    pub fn wire_type(&self) -> WireType {
        match self {
            FieldKind::Scalar(kind) => kind.wire_type(),
            FieldKind::Enum(_) => WireType::Varint,
            FieldKind::Message(_) | FieldKind::Map(_) => WireType::Len,
            FieldKind::Group(_) => WireType::StartGroup,
        }
    }
}

/// Key and value types of a protobuf map field.
///
/// On the wire each map entry is a 2-field message: field 1 is the key,
/// field 2 the value.
#[derive(Debug, Clone)]
pub struct MapKind {
    pub key: ScalarKind,
    pub value: FieldKind,
}

impl MapKind {
    pub fn new(key: ScalarKind, value: FieldKind) -> Arc<Self> {
        debug_assert!(key.is_valid_map_key(), "invalid map key kind {key:?}");
        Arc::new(MapKind { key, value })
    }
}

/// Field cardinality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Optional,
    /// Proto2 only; checked at the end of every decode.
    Required,
    Repeated,
}

/// One entry of a message's field catalog.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub number: u32,
    /// The proto name, e.g. `user_id`. For extensions this is the fully
    /// qualified extension name, e.g. `my.pkg.user_id`.
    pub name: String,
    /// The lowerCamelCase JSON name, e.g. `userId`.
    pub json_name: String,
    pub kind: FieldKind,
    pub label: Label,
    /// Repeated scalar/enum fields are emitted packed when set.
    pub packed: bool,
    /// Index into the message's oneof table, if this field is a member.
    pub oneof: Option<usize>,
    /// Set by [`crate::extensions::ExtensionRegistry::register`]; extensions
    /// render as `[full.name]` in text format.
    pub is_extension: bool,
}

impl FieldDescriptor {
    /// A singular optional field; chain the builder methods below to adjust.
    pub fn new(number: u32, name: impl Into<String>, kind: FieldKind) -> Self {
        debug_assert!((MIN_FIELD_NUMBER..=MAX_FIELD_NUMBER).contains(&number));
        let name = name.into();
        let json_name = json_name(&name);
        FieldDescriptor {
            number,
            name,
            json_name,
            kind,
            label: Label::Optional,
            packed: false,
            oneof: None,
            is_extension: false,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.label = Label::Repeated;
        self
    }

    pub fn required(mut self) -> Self {
        self.label = Label::Required;
        self
    }

    pub fn packed(mut self) -> Self {
        self.label = Label::Repeated;
        self.packed = true;
        self
    }

    pub fn in_oneof(mut self, index: usize) -> Self {
        self.oneof = Some(index);
        self
    }

    pub fn with_json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = json_name.into();
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.label == Label::Repeated
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, FieldKind::Map(_))
    }
}

/// Derives the canonical lowerCamelCase JSON name from a proto field name.
pub fn json_name(proto_name: &str) -> String {
    let mut out = String::with_capacity(proto_name.len());
    let mut capitalize = false;
    for ch in proto_name.chars() {
        if ch == '_' {
            capitalize = true;
        } else if capitalize {
            out.extend(ch.to_uppercase());
            capitalize = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// The ordered field catalog for one message type.
#[derive(Debug)]
pub struct MessageDescriptor {
    full_name: String,
    syntax: Syntax,
    /// Sorted by field number.
    fields: Vec<FieldDescriptor>,
    oneofs: Vec<String>,
    by_number: HashMap<u32, usize>,
    by_proto_name: HashMap<String, usize>,
    by_json_name: HashMap<String, usize>,
}

impl MessageDescriptor {
    pub fn new(
        full_name: impl Into<String>,
        syntax: Syntax,
        oneofs: Vec<String>,
        mut fields: Vec<FieldDescriptor>,
    ) -> Arc<Self> {
        fields.sort_by_key(|f| f.number);
        let mut by_number = HashMap::with_capacity(fields.len());
        let mut by_proto_name = HashMap::with_capacity(fields.len());
        let mut by_json_name = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            let prev = by_number.insert(field.number, index);
            debug_assert!(prev.is_none(), "duplicate field number {}", field.number);
            by_proto_name.insert(field.name.clone(), index);
            by_json_name.insert(field.json_name.clone(), index);
            if let Some(oneof) = field.oneof {
                debug_assert!(oneof < oneofs.len(), "oneof index out of range");
            }
        }
        Arc::new(MessageDescriptor {
            full_name: full_name.into(),
            syntax,
            fields,
            oneofs,
            by_number,
            by_proto_name,
            by_json_name,
        })
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    /// All fields, in ascending field-number order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.by_number.get(&number).map(|&i| &self.fields[i])
    }

    pub fn field_by_proto_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_proto_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_by_json_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.by_json_name.get(name).map(|&i| &self.fields[i])
    }

    /// Name resolution for JSON input: JSON-name table first, proto names
    /// second.
    pub fn field_by_any_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.field_by_json_name(name)
            .or_else(|| self.field_by_proto_name(name))
    }

    pub fn oneofs(&self) -> &[String] {
        &self.oneofs
    }

    pub fn oneof_name(&self, index: usize) -> &str {
        &self.oneofs[index]
    }
}

/// Value table for one enum type.
#[derive(Debug)]
pub struct EnumDescriptor {
    full_name: String,
    /// Declaration order; the first entry is the proto2 default.
    values: Vec<(i32, String)>,
    by_number: HashMap<i32, usize>,
    by_name: HashMap<String, usize>,
}

impl EnumDescriptor {
    pub fn new(full_name: impl Into<String>, values: Vec<(i32, &str)>) -> Arc<Self> {
        let values: Vec<(i32, String)> = values
            .into_iter()
            .map(|(number, name)| (number, name.to_owned()))
            .collect();
        let mut by_number = HashMap::with_capacity(values.len());
        let mut by_name = HashMap::with_capacity(values.len());
        for (index, (number, name)) in values.iter().enumerate() {
            // First declaration wins for aliased numbers.
            by_number.entry(*number).or_insert(index);
            by_name.insert(name.clone(), index);
        }
        Arc::new(EnumDescriptor {
            full_name: full_name.into(),
            values,
            by_number,
            by_name,
        })
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn name(&self, number: i32) -> Option<&str> {
        self.by_number.get(&number).map(|&i| self.values[i].1.as_str())
    }

    pub fn number(&self, name: &str) -> Option<i32> {
        self.by_name.get(name).map(|&i| self.values[i].0)
    }

    /// The default value: the first declared entry (zero in proto3).
    pub fn default_number(&self) -> i32 {
        self.values.first().map(|(n, _)| *n).unwrap_or(0)
    }
}
