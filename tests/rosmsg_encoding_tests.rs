//! rosmsg message codec: round-trip laws, string/padding differences from
//! CDR.

mod common;

use roslog::core::{MessageValue, Value};
use roslog::encoding::{CdrCodec, MessageCodec, RosmsgCodec};
use roslog::schema::{parse_schema, Dialect};

#[test]
fn empty_string_is_four_zero_bytes() {
    let schema = parse_schema("std_msgs/String", "string data", Dialect::Ros1).unwrap();
    let codec = RosmsgCodec::new();
    let mut msg = MessageValue::new();
    msg.insert("data".into(), Value::String(String::new()));

    let bytes = codec.serialize_message(&schema, &msg).unwrap();
    assert_eq!(bytes, vec![0x00, 0x00, 0x00, 0x00]);
    assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
}

#[test]
fn strings_are_one_byte_shorter_than_cdr() {
    // Same logical message; the rosmsg string drops the null terminator
    // (and rosmsg has no 4-byte encapsulation header).
    let ros1 = parse_schema("std_msgs/String", "string data", Dialect::Ros1).unwrap();
    let ros2 = parse_schema("std_msgs/msg/String", "string data", Dialect::Ros2).unwrap();
    let mut msg = MessageValue::new();
    msg.insert("data".into(), Value::String("hello".into()));

    let rosmsg_bytes = RosmsgCodec::new().serialize_message(&ros1, &msg).unwrap();
    let cdr_bytes = CdrCodec::new().serialize_message(&ros2, &msg).unwrap();
    let cdr_payload_len = cdr_bytes.len() - 4;
    assert_eq!(rosmsg_bytes.len() + 1, cdr_payload_len);
}

#[test]
fn layout_has_no_alignment_padding() {
    let text = "uint8 a\nfloat64 b\nuint8 c\nuint32 d";
    let schema = parse_schema("pkg/T", text, Dialect::Ros1).unwrap();
    let codec = RosmsgCodec::new();
    let mut msg = MessageValue::new();
    msg.insert("a".into(), Value::UInt8(1));
    msg.insert("b".into(), Value::Float64(2.0));
    msg.insert("c".into(), Value::UInt8(3));
    msg.insert("d".into(), Value::UInt32(4));

    let bytes = codec.serialize_message(&schema, &msg).unwrap();
    // 1 + 8 + 1 + 4: densely packed.
    assert_eq!(bytes.len(), 14);
    assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
}

#[test]
fn full_roundtrip_with_header_and_arrays() {
    let sep = "=".repeat(80);
    let text = format!(
        "std_msgs/Header header\nfloat32[] ranges\nuint8[4] rgba\nduration ttl\n{sep}\nMSG: std_msgs/Header\nuint32 seq\ntime stamp\nstring frame_id\n"
    );
    let schema = parse_schema("sensor_msgs/LaserScan", &text, Dialect::Ros1).unwrap();
    let codec = RosmsgCodec::new();

    let mut header = MessageValue::new();
    header.insert("seq".into(), Value::UInt32(77));
    header.insert(
        "stamp".into(),
        Value::Time {
            secs: 1_700_000_000,
            nsecs: 999_999_999,
        },
    );
    header.insert("frame_id".into(), Value::String("laser".into()));
    let mut msg = MessageValue::new();
    msg.insert("header".into(), Value::Struct(header));
    msg.insert(
        "ranges".into(),
        Value::Array(vec![
            Value::Float32(0.5),
            Value::Float32(1.5),
            Value::Float32(f32::INFINITY),
        ]),
    );
    msg.insert(
        "rgba".into(),
        Value::Array(vec![
            Value::UInt8(255),
            Value::UInt8(128),
            Value::UInt8(0),
            Value::UInt8(255),
        ]),
    );
    msg.insert(
        "ttl".into(),
        Value::Duration {
            secs: -1,
            nsecs: 500_000_000,
        },
    );

    let bytes = codec.serialize_message(&schema, &msg).unwrap();
    assert_eq!(codec.deserialize_message(&schema, &bytes).unwrap(), msg);
}

#[test]
fn time_is_two_unsigned_words() {
    let schema = parse_schema("pkg/T", "time stamp", Dialect::Ros1).unwrap();
    let codec = RosmsgCodec::new();
    let mut msg = MessageValue::new();
    msg.insert(
        "stamp".into(),
        Value::Time {
            secs: 0xAABBCCDD,
            nsecs: 0x11223344,
        },
    );
    let bytes = codec.serialize_message(&schema, &msg).unwrap();
    assert_eq!(&bytes[..4], &0xAABBCCDDu32.to_le_bytes());
    assert_eq!(&bytes[4..], &0x11223344u32.to_le_bytes());
}
