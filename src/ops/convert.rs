//! Cross-container conversion.
//!
//! Chains a reader to a writer of the other format. Payloads and schemas
//! are rewritten through the translator when the message worlds differ:
//! bag (rosmsg) to MCAP under the ros2 profile re-encodes every message as
//! CDR, and the reverse decodes CDR and re-encodes rosmsg. Bag to MCAP
//! under the ros1 profile passes payloads through untouched.

use std::collections::HashMap;
use std::path::Path;

use crate::core::{CodecError, Result};
use crate::encoding::{CdrCodec, MessageCodec, RosmsgCodec};
use crate::io::detection::FileFormat;
use crate::io::unified::{LogWriter, LogWriterOptions};
use crate::bag::reader::{BagMessageQuery, BagReader};
use crate::mcap::reader::{McapReader, MessageQuery};
use crate::schema::{parse_schema, Dialect, ParsedSchema};
use crate::translate::{
    translate_message_ros1_to_ros2, translate_message_ros2_to_ros1, translate_schema_ros1_to_ros2,
    translate_schema_ros2_to_ros1,
};

/// Outcome of a conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertStats {
    pub messages: u64,
    pub channels: usize,
}

/// Convert between container formats, dispatching on file extensions.
pub fn convert_file<P: AsRef<Path>>(
    input: P,
    output: P,
    options: LogWriterOptions,
) -> Result<ConvertStats> {
    let input_format = FileFormat::from_extension(&input)?;
    let output_format = FileFormat::from_extension(&output)?;
    if input_format == output_format {
        return Err(CodecError::unsupported(format!(
            "input and output are both {input_format}; conversion needs different formats"
        )));
    }
    match input_format {
        FileFormat::Bag => convert_bag_to_mcap(input, output, options),
        FileFormat::Mcap => convert_mcap_to_bag(input, output, options),
    }
}

/// Per-channel conversion context.
struct ConvertContext {
    channel_id: u16,
    decode_schema: ParsedSchema,
    encode_schema: ParsedSchema,
    translate: bool,
}

fn convert_bag_to_mcap<P: AsRef<Path>>(
    input: P,
    output: P,
    options: LogWriterOptions,
) -> Result<ConvertStats> {
    let to_ros2 = options.profile == "ros2";
    let reader = BagReader::open(input)?;
    let mut writer = LogWriter::create(output, options)?;

    let decoder = RosmsgCodec::new();
    let encoder = CdrCodec::new();

    let mut contexts: HashMap<u32, ConvertContext> = HashMap::new();
    for (conn, connection) in reader.connections() {
        let ros1_schema = parse_schema(
            &connection.header.msg_type,
            &connection.header.message_definition,
            Dialect::Ros1,
        )?;
        if to_ros2 {
            let translated = translate_schema_ros1_to_ros2(
                &connection.header.msg_type,
                &connection.header.message_definition,
            );
            let ros2_schema = parse_schema(&translated.name, &translated.text, Dialect::Ros2)?;
            let channel_id =
                writer.add_channel(&connection.topic, &translated.name, &translated.text, "cdr")?;
            contexts.insert(
                *conn,
                ConvertContext {
                    channel_id,
                    decode_schema: ros1_schema,
                    encode_schema: ros2_schema,
                    translate: true,
                },
            );
        } else {
            let channel_id = writer.add_channel(
                &connection.topic,
                &connection.header.msg_type,
                &connection.header.message_definition,
                "ros1",
            )?;
            contexts.insert(
                *conn,
                ConvertContext {
                    channel_id,
                    decode_schema: ros1_schema.clone(),
                    encode_schema: ros1_schema,
                    translate: false,
                },
            );
        }
    }

    let mut stats = ConvertStats {
        channels: contexts.len(),
        ..Default::default()
    };
    for message in reader.messages(BagMessageQuery::all())? {
        let message = message?;
        let context = contexts.get(&message.conn).ok_or_else(|| {
            CodecError::malformed("bag", format!("no connection {}", message.conn))
        })?;
        let payload = if context.translate {
            let decoded = decoder.deserialize_message(&context.decode_schema, &message.data)?;
            let translated = translate_message_ros1_to_ros2(&decoded, &context.decode_schema)?;
            encoder.serialize_message(&context.encode_schema, &translated)?
        } else {
            message.data
        };
        writer.write_serialized(context.channel_id, message.time, payload)?;
        stats.messages += 1;
    }

    writer.finish()?;
    Ok(stats)
}

fn convert_mcap_to_bag<P: AsRef<Path>>(
    input: P,
    output: P,
    options: LogWriterOptions,
) -> Result<ConvertStats> {
    let reader = McapReader::open(input)?;
    let mut writer = LogWriter::create(output, options)?;

    let decoder = CdrCodec::new();
    let encoder = RosmsgCodec::new();

    let mut contexts: HashMap<u16, ConvertContext> = HashMap::new();
    for (id, channel) in reader.channels() {
        let schema_record = reader.schema_for_channel(*id).ok_or_else(|| {
            CodecError::malformed_schema(&channel.topic, "channel has no schema to convert")
        })?;
        let text = String::from_utf8(schema_record.data.clone()).map_err(|_| {
            CodecError::malformed_schema(&schema_record.name, "schema text is not utf-8")
        })?;

        match channel.message_encoding.as_str() {
            "cdr" => {
                let ros2_schema = parse_schema(&schema_record.name, &text, Dialect::Ros2)?;
                let translated = translate_schema_ros2_to_ros1(&schema_record.name, &text);
                let ros1_schema = parse_schema(&translated.name, &translated.text, Dialect::Ros1)?;
                let channel_id = writer.add_channel(
                    &channel.topic,
                    &translated.name,
                    &translated.text,
                    "ros1",
                )?;
                contexts.insert(
                    *id,
                    ConvertContext {
                        channel_id,
                        decode_schema: ros2_schema,
                        encode_schema: ros1_schema,
                        translate: true,
                    },
                );
            }
            "ros1" | "ros1msg" => {
                let ros1_schema = parse_schema(&schema_record.name, &text, Dialect::Ros1)?;
                let channel_id =
                    writer.add_channel(&channel.topic, &schema_record.name, &text, "ros1")?;
                contexts.insert(
                    *id,
                    ConvertContext {
                        channel_id,
                        decode_schema: ros1_schema.clone(),
                        encode_schema: ros1_schema,
                        translate: false,
                    },
                );
            }
            other => return Err(CodecError::unknown_encoding(other)),
        }
    }

    let mut stats = ConvertStats {
        channels: contexts.len(),
        ..Default::default()
    };
    for message in reader.messages(MessageQuery::all())? {
        let message = message?;
        let context = contexts.get(&message.channel_id).ok_or_else(|| {
            CodecError::malformed("mcap", format!("no channel {}", message.channel_id))
        })?;
        let payload = if context.translate {
            let decoded = decoder.deserialize_message(&context.decode_schema, &message.data)?;
            let translated = translate_message_ros2_to_ros1(&decoded, &context.decode_schema)?;
            encoder.serialize_message(&context.encode_schema, &translated)?
        } else {
            message.data
        };
        writer.write_serialized(context.channel_id, message.log_time, payload)?;
        stats.messages += 1;
    }

    writer.finish()?;
    Ok(stats)
}
