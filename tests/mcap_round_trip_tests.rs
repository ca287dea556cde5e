//! MCAP writer -> reader equivalence across chunking and compression
//! settings, plus attachments, metadata, and opt-in CRC validation.

mod common;

use roslog::io::Compression;
use roslog::mcap::records::MessageRecord;
use roslog::mcap::{McapReader, McapWriteOptions, McapWriter, MessageQuery};
use std::collections::BTreeMap;

fn sample_messages() -> Vec<(u64, Vec<u8>)> {
    (0..25u64).map(|i| (i * 7, vec![i as u8; 40])).collect()
}

fn read_back(bytes: Vec<u8>) -> Vec<(u64, Vec<u8>)> {
    let reader = McapReader::from_bytes(bytes).unwrap();
    reader
        .messages(MessageQuery::topic("/t"))
        .unwrap()
        .map(|m| {
            let m = m.unwrap();
            (m.log_time, m.data)
        })
        .collect()
}

#[test]
fn identical_messages_across_chunking_and_compression() {
    let expected = sample_messages();
    let chunk_modes: [Option<u64>; 3] = [None, Some(1), Some(1024 * 1024)];
    let compressions = [Compression::None, Compression::Lz4, Compression::Zstd];

    for chunk_size in chunk_modes {
        for compression in compressions {
            if chunk_size.is_none() && compression != Compression::None {
                continue; // compression only applies to chunks
            }
            let mut options = McapWriteOptions::default();
            options.chunk_size = chunk_size;
            options.compression = compression;
            let bytes = common::build_mcap(options, &expected);
            let actual = read_back(bytes);
            assert_eq!(
                actual, expected,
                "mismatch for chunk_size={chunk_size:?} compression={compression:?}"
            );
        }
    }
}

#[test]
fn statistics_match_written_content() {
    let mut options = McapWriteOptions::default();
    options.chunk_size = Some(256);
    let bytes = common::build_mcap(options, &sample_messages());
    let reader = McapReader::from_bytes(bytes).unwrap();

    let stats = reader.statistics();
    assert_eq!(stats.message_count, 25);
    assert_eq!(stats.schema_count, 1);
    assert_eq!(stats.channel_count, 1);
    assert_eq!(stats.message_start_time, 0);
    assert_eq!(stats.message_end_time, 24 * 7);
    assert!(stats.chunk_count >= 2);
    assert_eq!(stats.channel_message_counts.get(&0), Some(&25));
}

#[test]
fn crc_validation_is_explicit_and_passes() {
    let mut options = McapWriteOptions::default();
    options.chunk_size = Some(128);
    options.compression = Compression::Zstd;
    let bytes = common::build_mcap(options, &sample_messages());
    let reader = McapReader::from_bytes(bytes).unwrap();
    reader.validate_data_crc().unwrap();
    reader.validate_summary_crc().unwrap();
    reader.validate_chunk_crcs().unwrap();
}

#[test]
fn multi_channel_files_keep_channels_separate() {
    let mut writer = McapWriter::new(Vec::new(), McapWriteOptions::default()).unwrap();
    let schema = writer
        .register_schema("std_msgs/msg/String", "ros2msg", b"string data\n")
        .unwrap();
    let chat = writer
        .register_channel(schema, "/chat", "cdr", BTreeMap::new())
        .unwrap();
    let log = writer
        .register_channel(schema, "/log", "cdr", BTreeMap::new())
        .unwrap();
    for i in 0..10u64 {
        let channel_id = if i % 2 == 0 { chat } else { log };
        let sequence = writer.next_sequence(channel_id);
        writer
            .write_message(&MessageRecord {
                channel_id,
                sequence,
                log_time: i,
                publish_time: i,
                data: vec![i as u8],
            })
            .unwrap();
    }
    writer.finish().unwrap();

    let reader = McapReader::from_bytes(writer.into_inner()).unwrap();
    assert_eq!(reader.message_count("/chat").unwrap(), 5);
    assert_eq!(reader.message_count("/log").unwrap(), 5);
    let chat_times: Vec<u64> = reader
        .messages(MessageQuery::topic("/chat"))
        .unwrap()
        .map(|m| m.unwrap().log_time)
        .collect();
    assert_eq!(chat_times, vec![0, 2, 4, 6, 8]);
}

#[test]
fn attachments_and_metadata_roundtrip() {
    let mut writer = McapWriter::new(Vec::new(), McapWriteOptions::default()).unwrap();
    writer
        .add_attachment(10, 5, "calibration.yaml", "text/yaml", b"fx: 500.0\n")
        .unwrap();
    let mut meta = BTreeMap::new();
    meta.insert("vehicle".to_string(), "unit-7".to_string());
    meta.insert("route".to_string(), "loop-3".to_string());
    writer.add_metadata("run_info", meta.clone()).unwrap();
    writer.finish().unwrap();

    let reader = McapReader::from_bytes(writer.into_inner()).unwrap();
    assert_eq!(reader.statistics().attachment_count, 1);
    assert_eq!(reader.statistics().metadata_count, 1);

    let attachment_index = &reader.attachment_indexes()[0];
    assert_eq!(attachment_index.name, "calibration.yaml");
    let attachment = reader.read_attachment(attachment_index).unwrap();
    assert_eq!(attachment.data, b"fx: 500.0\n");
    assert_eq!(attachment.media_type, "text/yaml");
    assert_eq!(attachment.log_time, 10);

    let metadata_index = &reader.metadata_indexes()[0];
    let metadata = reader.read_metadata(metadata_index).unwrap();
    assert_eq!(metadata.name, "run_info");
    assert_eq!(metadata.metadata, meta);
}

#[test]
fn file_writes_to_disk_and_reads_back() {
    let path = common::temp_path("roundtrip", "mcap");
    {
        let mut options = McapWriteOptions::default();
        options.chunk_size = Some(512);
        options.compression = Compression::Lz4;
        let mut writer = McapWriter::create(&path, options).unwrap();
        let schema = writer
            .register_schema("std_msgs/msg/String", "ros2msg", b"string data\n")
            .unwrap();
        let channel = writer
            .register_channel(schema, "/t", "cdr", BTreeMap::new())
            .unwrap();
        for i in 0..8u64 {
            let sequence = writer.next_sequence(channel);
            writer
                .write_message(&MessageRecord {
                    channel_id: channel,
                    sequence,
                    log_time: i,
                    publish_time: i,
                    data: vec![0xAB; 16],
                })
                .unwrap();
        }
        writer.finish().unwrap();
    }
    let reader = McapReader::open(&path).unwrap();
    assert_eq!(reader.statistics().message_count, 8);
    std::fs::remove_file(&path).ok();
}
