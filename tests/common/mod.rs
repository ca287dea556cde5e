//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use roslog::core::{MessageValue, Value};
use roslog::mcap::records::MessageRecord;
use roslog::mcap::{McapWriteOptions, McapWriter};

static NEXT_ID: AtomicU32 = AtomicU32::new(0);

/// A unique temp path with the given extension; best-effort cleanup is the
/// caller's business, the OS temp dir is the backstop.
pub fn temp_path(tag: &str, ext: &str) -> PathBuf {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "roslog-test-{tag}-{}-{id}.{ext}",
        std::process::id()
    ))
}

/// geometry_msgs/msg/Point schema text.
pub fn point_schema_text() -> &'static str {
    "float64 x\nfloat64 y\nfloat64 z\n"
}

/// A Point message value.
pub fn point(x: f64, y: f64, z: f64) -> MessageValue {
    let mut msg = MessageValue::new();
    msg.insert("x".into(), Value::Float64(x));
    msg.insert("y".into(), Value::Float64(y));
    msg.insert("z".into(), Value::Float64(z));
    msg
}

/// Write an in-memory MCAP with one `/t` channel and the given
/// `(log_time, payload)` pairs.
pub fn build_mcap(options: McapWriteOptions, messages: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let mut writer = McapWriter::new(Vec::new(), options).unwrap();
    let schema = writer
        .register_schema("std_msgs/msg/String", "ros2msg", b"string data\n")
        .unwrap();
    let channel = writer
        .register_channel(schema, "/t", "cdr", BTreeMap::new())
        .unwrap();
    for (log_time, data) in messages {
        let sequence = writer.next_sequence(channel);
        writer
            .write_message(&MessageRecord {
                channel_id: channel,
                sequence,
                log_time: *log_time,
                publish_time: *log_time,
                data: data.clone(),
            })
            .unwrap();
    }
    writer.finish().unwrap();
    writer.into_inner()
}
