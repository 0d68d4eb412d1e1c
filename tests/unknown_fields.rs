//! Unknown-field preservation: proto2 keeps unrecognized bytes and re-emits
//! them verbatim after the known fields; proto3 drops them.

use std::sync::Arc;

use protowire::{
    decode_message, encode_to_vec, DecodeOptions, EnumDescriptor, FieldDescriptor, FieldKind,
    MapKey, MapKind, MessageDescriptor, ScalarKind, Syntax, Value,
};

fn one_int_field(syntax: Syntax) -> Arc<MessageDescriptor> {
    MessageDescriptor::new(
        "test.Holder",
        syntax,
        vec![],
        vec![FieldDescriptor::new(
            1,
            "id",
            FieldKind::Scalar(ScalarKind::Int32),
        )],
    )
}

// One known field followed by unknowns of every wire type: a varint, a
// fixed32, a fixed64, a length-delimited span, and a group.
const MIXED: &[u8] = &[
    0x08, 0x01, // id: 1
    0x10, 0x7f, // field 2 varint
    0x1d, 0x01, 0x02, 0x03, 0x04, // field 3 fixed32
    0x21, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, // field 4 fixed64
    0x2a, 0x02, 0xaa, 0xbb, // field 5 len 2
    0x33, 0x08, 0x09, 0x34, // field 6 group { field 1: 9 }
];

#[test]
fn proto2_preserves_every_wire_type() {
    let desc = one_int_field(Syntax::Proto2);
    let decoded = decode_message(&desc, MIXED, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get(1), Some(&Value::I32(1)));
    assert_eq!(decoded.unknown().as_bytes(), &MIXED[2..]);
    // Known field first, then the preserved bytes verbatim.
    assert_eq!(encode_to_vec(&decoded).unwrap(), MIXED);
}

#[test]
fn proto3_drops_unknowns() {
    let desc = one_int_field(Syntax::Proto3);
    let decoded = decode_message(&desc, MIXED, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get(1), Some(&Value::I32(1)));
    assert!(decoded.unknown().is_empty());
    assert_eq!(encode_to_vec(&decoded).unwrap(), [0x08, 0x01]);
}

#[test]
fn discard_option_drops_in_proto2_too() {
    let desc = one_int_field(Syntax::Proto2);
    let options = DecodeOptions {
        discard_unknown_fields: true,
        ..DecodeOptions::default()
    };
    let decoded = decode_message(&desc, MIXED, &options).unwrap();
    assert!(decoded.unknown().is_empty());
    assert_eq!(encode_to_vec(&decoded).unwrap(), [0x08, 0x01]);
}

#[test]
fn wire_type_mismatch_recovers_as_unknown() {
    // Field 1 is declared int32 but arrives length-delimited. The decode
    // must not abort; the bytes move to the unknown set (proto2).
    let desc = one_int_field(Syntax::Proto2);
    let bytes = [0x0a, 0x03, b'a', b'b', b'c'];
    let decoded = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get(1), None);
    assert_eq!(decoded.unknown().as_bytes(), &bytes);
    assert_eq!(encode_to_vec(&decoded).unwrap(), bytes);

    // Proto3 tolerates the mismatch but keeps nothing.
    let desc3 = one_int_field(Syntax::Proto3);
    let decoded3 = decode_message(&desc3, &bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded3.get(1), None);
    assert!(decoded3.unknown().is_empty());
}

#[test]
fn packed_enum_extras_become_packed_unknown() {
    // Proto2 routes unrecognized packed-enum numbers into a synthetic
    // packed unknown field under the original field number.
    let colors = EnumDescriptor::new("test.Color", vec![(0, "NONE"), (1, "RED")]);
    let desc = MessageDescriptor::new(
        "test.Palette",
        Syntax::Proto2,
        vec![],
        vec![FieldDescriptor::new(2, "colors", FieldKind::Enum(colors)).packed()],
    );
    let bytes = [0x12, 0x03, 0x00, 0x01, 0x05];
    let decoded = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(
        decoded.get(2),
        Some(&Value::List(vec![Value::Enum(0), Value::Enum(1)]))
    );
    assert_eq!(decoded.unknown().as_bytes(), &[0x12, 0x01, 0x05]);
}

#[test]
fn unrecognized_singular_enum_moves_to_unknowns() {
    let colors = EnumDescriptor::new("test.Color", vec![(0, "NONE"), (1, "RED")]);
    let desc = MessageDescriptor::new(
        "test.Palette",
        Syntax::Proto2,
        vec![],
        vec![FieldDescriptor::new(2, "color", FieldKind::Enum(colors))],
    );
    let bytes = [0x10, 0x05];
    let decoded = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get(2), None);
    assert_eq!(decoded.unknown().as_bytes(), &bytes);
}

#[test]
fn proto3_keeps_unrecognized_enum_number() {
    // Proto3 enums are open: any number is stored as-is.
    let colors = EnumDescriptor::new("test.Color", vec![(0, "NONE"), (1, "RED")]);
    let desc = MessageDescriptor::new(
        "test.Palette",
        Syntax::Proto3,
        vec![],
        vec![FieldDescriptor::new(2, "color", FieldKind::Enum(colors))],
    );
    let decoded = decode_message(&desc, &[0x10, 0x05], &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get(2), Some(&Value::Enum(5)));
}

#[test]
fn map_entries_never_keep_unknowns() {
    // Unknown fields inside a map entry are skipped even in proto2.
    let desc = MessageDescriptor::new(
        "test.Table",
        Syntax::Proto2,
        vec![],
        vec![FieldDescriptor::new(
            1,
            "rows",
            FieldKind::Map(MapKind::new(
                ScalarKind::Int32,
                FieldKind::Scalar(ScalarKind::Int32),
            )),
        )
        .repeated()],
    );
    // Entry holds key 1, value 2, plus a stray field 3.
    let bytes = [0x0a, 0x06, 0x08, 0x01, 0x10, 0x02, 0x18, 0x09];
    let decoded = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    match decoded.get(1) {
        Some(Value::Map(entries)) => {
            assert_eq!(entries[&MapKey::I32(1)], Value::I32(2));
        }
        other => panic!("expected map, got {other:?}"),
    }
    assert!(decoded.unknown().is_empty());
}

#[test]
fn nested_message_unknowns_are_scoped() {
    // Unknowns inside a nested proto2 message stay attached to that nested
    // message and re-emit inside its span.
    let inner = MessageDescriptor::new(
        "test.Inner",
        Syntax::Proto2,
        vec![],
        vec![FieldDescriptor::new(
            1,
            "id",
            FieldKind::Scalar(ScalarKind::Int32),
        )],
    );
    let desc = MessageDescriptor::new(
        "test.Outer",
        Syntax::Proto2,
        vec![],
        vec![FieldDescriptor::new(1, "inner", FieldKind::Message(inner))],
    );
    let bytes = [0x0a, 0x04, 0x08, 0x01, 0x10, 0x09];
    let decoded = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    match decoded.get(1) {
        Some(Value::Message(inner)) => {
            assert_eq!(inner.get(1), Some(&Value::I32(1)));
            assert_eq!(inner.unknown().as_bytes(), &[0x10, 0x09]);
        }
        other => panic!("expected message, got {other:?}"),
    }
    assert!(decoded.unknown().is_empty());
    assert_eq!(encode_to_vec(&decoded).unwrap(), bytes);
}
