//! End-to-end binary encode/decode against hand-checked wire bytes.

use std::sync::Arc;

use protowire::{
    decode_message, decode_message_with_extensions, encode_to_vec, encoded_len, DecodeError,
    DecodeOptions, DynamicMessage, EnumDescriptor, ExtensionRegistry, FieldDescriptor, FieldKind,
    MapKey, MapKind, MessageDescriptor, ScalarKind, Syntax, Value,
};

fn scalar(number: u32, name: &str, kind: ScalarKind) -> FieldDescriptor {
    FieldDescriptor::new(number, name, FieldKind::Scalar(kind))
}

fn sample_descriptor() -> Arc<MessageDescriptor> {
    let color = EnumDescriptor::new(
        "test.Color",
        vec![(0, "COLOR_UNSPECIFIED"), (1, "RED"), (2, "BLUE")],
    );
    let inner = MessageDescriptor::new(
        "test.Inner",
        Syntax::Proto3,
        vec![],
        vec![
            scalar(1, "id", ScalarKind::Int32),
            scalar(2, "label", ScalarKind::String),
        ],
    );
    MessageDescriptor::new(
        "test.Sample",
        Syntax::Proto3,
        vec![],
        vec![
            scalar(1, "count", ScalarKind::Int32),
            scalar(2, "name", ScalarKind::String),
            scalar(3, "ratio", ScalarKind::Double),
            scalar(4, "ids", ScalarKind::Int32).packed(),
            FieldDescriptor::new(5, "color", FieldKind::Enum(color)),
            FieldDescriptor::new(6, "inner", FieldKind::Message(inner)),
            FieldDescriptor::new(
                7,
                "counts",
                FieldKind::Map(MapKind::new(
                    ScalarKind::String,
                    FieldKind::Scalar(ScalarKind::Int32),
                )),
            )
            .repeated(),
            scalar(8, "signed", ScalarKind::SInt64),
            scalar(9, "payload", ScalarKind::Bytes),
        ],
    )
}

fn roundtrip(message: &DynamicMessage) -> DynamicMessage {
    let bytes = encode_to_vec(message).expect("encode");
    assert_eq!(bytes.len(), encoded_len(message));
    let decoded = decode_message(
        message.descriptor(),
        &bytes,
        &DecodeOptions::default(),
    )
    .expect("decode");
    assert_eq!(&decoded, message);
    decoded
}

#[test]
fn known_wire_bytes() {
    let desc = sample_descriptor();
    // Field 1, varint 300.
    let decoded = decode_message(&desc, &[0x08, 0xac, 0x02], &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get(1), Some(&Value::I32(300)));
    assert_eq!(encode_to_vec(&decoded).unwrap(), [0x08, 0xac, 0x02]);
}

#[test]
fn scalar_roundtrips() {
    let desc = sample_descriptor();
    let mut msg = DynamicMessage::new(desc);
    msg.set(1, Value::I32(-42));
    msg.set(2, Value::String("héllo".to_owned()));
    msg.set(3, Value::F64(-0.5));
    msg.set(5, Value::Enum(2));
    msg.set(8, Value::I64(i64::MIN));
    msg.set(9, Value::Bytes(bytes::Bytes::from_static(&[0, 1, 255])));
    roundtrip(&msg);
}

#[test]
fn packed_repeated_bytes_and_roundtrip() {
    let desc = sample_descriptor();
    let mut msg = DynamicMessage::new(desc.clone());
    msg.append(4, Value::I32(1));
    msg.append(4, Value::I32(2));
    msg.append(4, Value::I32(300));
    let bytes = encode_to_vec(&msg).unwrap();
    assert_eq!(bytes, [0x22, 0x04, 0x01, 0x02, 0xac, 0x02]);
    roundtrip(&msg);

    // Unpacked occurrences of a packed field are still accepted.
    let unpacked = [0x20, 0x01, 0x20, 0x02];
    let decoded = decode_message(&desc, &unpacked, &DecodeOptions::default()).unwrap();
    assert_eq!(
        decoded.get(4),
        Some(&Value::List(vec![Value::I32(1), Value::I32(2)]))
    );
}

#[test]
fn map_entry_bytes() {
    let desc = sample_descriptor();
    let mut msg = DynamicMessage::new(desc.clone());
    msg.insert_map_entry(7, MapKey::String("a".to_owned()), Value::I32(1));
    let bytes = encode_to_vec(&msg).unwrap();
    assert_eq!(bytes, [0x3a, 0x05, 0x0a, 0x01, b'a', 0x10, 0x01]);
    roundtrip(&msg);

    // An entry with both halves missing defaults them.
    let decoded = decode_message(&desc, &[0x3a, 0x00], &DecodeOptions::default()).unwrap();
    match decoded.get(7) {
        Some(Value::Map(entries)) => {
            assert_eq!(entries[&MapKey::String(String::new())], Value::I32(0));
        }
        other => panic!("expected map, got {other:?}"),
    }
}

#[test]
fn nested_message_merge() {
    let desc = sample_descriptor();
    // Two occurrences of field 6: {id: 1} then {label: "x"} merge.
    let bytes = [
        0x32, 0x02, 0x08, 0x01, // inner { id: 1 }
        0x32, 0x03, 0x12, 0x01, b'x', // inner { label: "x" }
    ];
    let decoded = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    match decoded.get(6) {
        Some(Value::Message(inner)) => {
            assert_eq!(inner.get(1), Some(&Value::I32(1)));
            assert_eq!(inner.get(2), Some(&Value::String("x".to_owned())));
        }
        other => panic!("expected message, got {other:?}"),
    }
}

#[test]
fn group_roundtrip() {
    let group = MessageDescriptor::new(
        "test.Outer.Details",
        Syntax::Proto2,
        vec![],
        vec![scalar(1, "id", ScalarKind::Int32)],
    );
    let desc = MessageDescriptor::new(
        "test.Outer",
        Syntax::Proto2,
        vec![],
        vec![FieldDescriptor::new(3, "details", FieldKind::Group(group))],
    );
    // 3 start-group, inner field 1 varint 5, 3 end-group.
    let bytes = [0x1b, 0x08, 0x05, 0x1c];
    let decoded = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    match decoded.get(3) {
        Some(Value::Message(inner)) => assert_eq!(inner.get(1), Some(&Value::I32(5))),
        other => panic!("expected group, got {other:?}"),
    }
    assert_eq!(encode_to_vec(&decoded).unwrap(), bytes);
}

#[test]
fn required_field_enforced() {
    let desc = MessageDescriptor::new(
        "test.Strict",
        Syntax::Proto2,
        vec![],
        vec![scalar(1, "id", ScalarKind::Int32).required()],
    );
    assert_eq!(
        decode_message(&desc, &[], &DecodeOptions::default()),
        Err(DecodeError::MissingRequiredField("id".to_owned()))
    );
    let decoded = decode_message(&desc, &[0x08, 0x07], &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.get(1), Some(&Value::I32(7)));
}

#[test]
fn required_satisfied_across_merged_spans() {
    let inner = MessageDescriptor::new(
        "test.Strict",
        Syntax::Proto2,
        vec![],
        vec![
            scalar(1, "id", ScalarKind::Int32).required(),
            scalar(2, "label", ScalarKind::String),
        ],
    );
    let desc = MessageDescriptor::new(
        "test.Holder",
        Syntax::Proto2,
        vec![],
        vec![FieldDescriptor::new(1, "inner", FieldKind::Message(inner))],
    );

    // Two occurrences of the singular nested message; only the second one
    // carries the required field. The merged result must satisfy it.
    let bytes = [
        0x0a, 0x03, 0x12, 0x01, b'x', // inner { label: "x" }
        0x0a, 0x02, 0x08, 0x01, // inner { id: 1 }
    ];
    let decoded = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    match decoded.get(1) {
        Some(Value::Message(inner)) => {
            assert_eq!(inner.get(1), Some(&Value::I32(1)));
            assert_eq!(inner.get(2), Some(&Value::String("x".to_owned())));
        }
        other => panic!("expected merged message, got {other:?}"),
    }

    // With the second span cut off, no occurrence supplies the field.
    assert_eq!(
        decode_message(&desc, &bytes[..5], &DecodeOptions::default()),
        Err(DecodeError::MissingRequiredField("id".to_owned()))
    );
}

#[test]
fn depth_limit_stops_recursion() {
    // A self-referencing chain 120 levels deep against the default limit
    // of 100.
    let mut desc = MessageDescriptor::new(
        "test.Leaf",
        Syntax::Proto3,
        vec![],
        vec![scalar(1, "n", ScalarKind::Int32)],
    );
    for level in 0..120 {
        desc = MessageDescriptor::new(
            format!("test.Nest{level}"),
            Syntax::Proto3,
            vec![],
            vec![FieldDescriptor::new(1, "child", FieldKind::Message(desc))],
        );
    }
    let mut bytes = vec![0x08, 0x01];
    for _ in 0..120 {
        let mut framed = vec![0x0a];
        assert!(bytes.len() < 0x80, "varint framing stays single-byte");
        framed.push(u8::try_from(bytes.len()).unwrap());
        framed.extend_from_slice(&bytes);
        bytes = framed;
    }
    assert_eq!(
        decode_message(&desc, &bytes, &DecodeOptions::default()),
        Err(DecodeError::MessageDepthLimit)
    );
}

#[test]
fn extension_roundtrip() {
    let desc = MessageDescriptor::new("test.Base", Syntax::Proto2, vec![], vec![]);
    let mut registry = ExtensionRegistry::new();
    registry.register(
        "test.Base",
        FieldDescriptor::new(100, "ext.pkg.count", FieldKind::Scalar(ScalarKind::Int32)),
    );

    let mut msg = DynamicMessage::new(desc.clone());
    let ext = registry.by_number("test.Base", 100).unwrap().clone();
    msg.set_extension(ext, Value::I32(9));
    let bytes = encode_to_vec(&msg).unwrap();
    // Field 100 varint: key = 100 << 3 = 800 = 0xa0 0x06.
    assert_eq!(bytes, [0xa0, 0x06, 0x09]);

    // With the registry the extension decodes into the extension set.
    let decoded =
        decode_message_with_extensions(&desc, &bytes, &DecodeOptions::default(), &registry)
            .unwrap();
    assert_eq!(decoded.get_extension(100), Some(&Value::I32(9)));

    // Without it, the field survives as unknown bytes (proto2).
    let plain = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(plain.unknown().as_bytes(), &bytes[..]);
    assert_eq!(encode_to_vec(&plain).unwrap(), bytes);
}

#[test]
fn depth_limit_bytes_stay_valid_below_limit() {
    // Same chain, 50 levels: decodes fine.
    let mut desc = MessageDescriptor::new(
        "test.Leaf",
        Syntax::Proto3,
        vec![],
        vec![scalar(1, "n", ScalarKind::Int32)],
    );
    for level in 0..50 {
        desc = MessageDescriptor::new(
            format!("test.Nest{level}"),
            Syntax::Proto3,
            vec![],
            vec![FieldDescriptor::new(1, "child", FieldKind::Message(desc))],
        );
    }
    let mut bytes = vec![0x08, 0x01];
    for _ in 0..50 {
        let mut framed = vec![0x0a];
        framed.push(u8::try_from(bytes.len()).unwrap());
        framed.extend_from_slice(&bytes);
        bytes = framed;
    }
    assert!(decode_message(&desc, &bytes, &DecodeOptions::default()).is_ok());
}
