//! Every prefix of a valid payload must decode to Ok or Err, never panic,
//! and no prefix of a length-delimited field may decode as complete.

use std::sync::Arc;

use protowire::{
    decode_message, encode_to_vec, DecodeError, DecodeOptions, DynamicMessage, FieldDescriptor,
    FieldKind, MapKey, MapKind, MessageDescriptor, ScalarKind, Syntax, Value,
};

fn scalar(number: u32, name: &str, kind: ScalarKind) -> FieldDescriptor {
    FieldDescriptor::new(number, name, FieldKind::Scalar(kind))
}

fn descriptor() -> Arc<MessageDescriptor> {
    let inner = MessageDescriptor::new(
        "test.Inner",
        Syntax::Proto2,
        vec![],
        vec![
            scalar(1, "id", ScalarKind::Int32),
            scalar(2, "label", ScalarKind::String),
        ],
    );
    let group = MessageDescriptor::new(
        "test.Fixture.Extra",
        Syntax::Proto2,
        vec![],
        vec![scalar(1, "flag", ScalarKind::Bool)],
    );
    MessageDescriptor::new(
        "test.Fixture",
        Syntax::Proto2,
        vec![],
        vec![
            scalar(1, "count", ScalarKind::Int64),
            scalar(2, "name", ScalarKind::String),
            scalar(3, "exact", ScalarKind::Fixed64),
            scalar(4, "ids", ScalarKind::SInt32).packed(),
            FieldDescriptor::new(5, "inner", FieldKind::Message(inner)),
            FieldDescriptor::new(6, "extra", FieldKind::Group(group)),
            FieldDescriptor::new(
                7,
                "rows",
                FieldKind::Map(MapKind::new(
                    ScalarKind::Int32,
                    FieldKind::Scalar(ScalarKind::String),
                )),
            )
            .repeated(),
        ],
    )
}

fn fixture() -> DynamicMessage {
    let desc = descriptor();
    let mut msg = DynamicMessage::new(desc.clone());
    msg.set(1, Value::I64(-777));
    msg.set(2, Value::String("prefix test".to_owned()));
    msg.set(3, Value::U64(0x1122_3344_5566_7788));
    msg.append(4, Value::I32(-1));
    msg.append(4, Value::I32(64));

    let FieldKind::Message(inner_desc) = &desc.field(5).unwrap().kind else {
        panic!("field 5 must be a message");
    };
    let mut inner = DynamicMessage::new(inner_desc.clone());
    inner.set(1, Value::I32(9));
    inner.set(2, Value::String("in".to_owned()));
    msg.set(5, Value::Message(inner));

    let FieldKind::Group(group_desc) = &desc.field(6).unwrap().kind else {
        panic!("field 6 must be a group");
    };
    let mut extra = DynamicMessage::new(group_desc.clone());
    extra.set(1, Value::Bool(true));
    msg.set(6, Value::Message(extra));

    msg.insert_map_entry(7, MapKey::I32(1), Value::String("one".to_owned()));
    msg
}

#[test]
fn every_prefix_decodes_without_panic() {
    let msg = fixture();
    let bytes = encode_to_vec(&msg).unwrap();
    let desc = descriptor();

    for end in 0..bytes.len() {
        // Any strict prefix is either an error or a shorter valid message
        // (a prefix that happens to end on a field boundary).
        let _ = decode_message(&desc, &bytes[..end], &DecodeOptions::default());
    }
    let full = decode_message(&desc, &bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(full, msg);
}

#[test]
fn cut_length_prefix_is_truncated() {
    // Field 2 claims 5 bytes but the buffer ends after 2.
    let desc = descriptor();
    let bytes = [0x12, 0x05, b'a', b'b'];
    assert_eq!(
        decode_message(&desc, &bytes, &DecodeOptions::default()),
        Err(DecodeError::Truncated)
    );
}

#[test]
fn unterminated_group_is_truncated() {
    let desc = descriptor();
    // Start-group for field 6 with no end key.
    let bytes = [0x33, 0x08, 0x01];
    assert_eq!(
        decode_message(&desc, &bytes, &DecodeOptions::default()),
        Err(DecodeError::Truncated)
    );
}

#[test]
fn overlong_varint_is_rejected() {
    let desc = descriptor();
    // Eleven continuation bytes can never be a valid varint.
    let mut bytes = vec![0x08];
    bytes.extend(std::iter::repeat(0x80).take(11));
    assert_eq!(
        decode_message(&desc, &bytes, &DecodeOptions::default()),
        Err(DecodeError::MalformedVarint)
    );
}

#[test]
fn length_past_end_of_buffer() {
    let desc = descriptor();
    // Field 2 claims 200 bytes; only 3 follow.
    let bytes = [0x12, 0xc8, 0x01, b'a', b'b', b'c'];
    assert_eq!(
        decode_message(&desc, &bytes, &DecodeOptions::default()),
        Err(DecodeError::Truncated)
    );
}

#[test]
fn stray_end_group_is_malformed() {
    let desc = descriptor();
    let bytes = [0x34]; // end-group for field 6 with no opener
    assert!(matches!(
        decode_message(&desc, &bytes, &DecodeOptions::default()),
        Err(DecodeError::MalformedProtobuf(_))
    ));
}
