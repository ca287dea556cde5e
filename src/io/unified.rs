//! Unified reader/writer façade over both container formats.
//!
//! `LogReader::open` and `LogWriter::create` dispatch on the file extension;
//! message iteration yields a uniform [`DecodedMessage`] regardless of the
//! underlying container, decoding each channel with the codec its
//! `message_encoding` implies.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::core::{CodecError, MessageValue, Result};
use crate::encoding::{codec_for_encoding, MessageCodec};
use crate::io::compression::Compression;
use crate::io::detection::FileFormat;
use crate::bag::records::ConnectionHeader;
use crate::bag::{compute_md5sum, BagMessageQuery, BagReader, BagWriteOptions, BagWriter};
use crate::mcap::encryption::EncryptionProvider;
use crate::mcap::records::MessageRecord;
use crate::mcap::{McapReadOptions, McapReader, McapWriteOptions, McapWriter, MessageQuery};
use crate::schema::{parse_schema, Dialect, ParsedSchema};

/// A decoded message with its channel context.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub topic: String,
    pub msg_type: String,
    /// Log (receive) time in nanoseconds
    pub log_time: u64,
    pub data: MessageValue,
}

/// Per-channel decoding context.
struct ChannelContext {
    topic: String,
    msg_type: String,
    schema: ParsedSchema,
    codec: Box<dyn MessageCodec>,
}

/// Format-agnostic log reader.
pub enum LogReader {
    Mcap(McapReader),
    Bag(BagReader),
}

impl LogReader {
    /// Open a file, dispatching on its extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_encryption(path, None)
    }

    /// Open a file with an optional decryption provider (MCAP only).
    pub fn open_with_encryption<P: AsRef<Path>>(
        path: P,
        encryption: Option<Box<dyn EncryptionProvider>>,
    ) -> Result<Self> {
        match FileFormat::from_extension(&path)? {
            FileFormat::Mcap => Ok(LogReader::Mcap(McapReader::open_with_options(
                path,
                McapReadOptions {
                    encryption,
                    chunk_cache_size: None,
                },
            )?)),
            FileFormat::Bag => Ok(LogReader::Bag(BagReader::open(path)?)),
        }
    }

    /// The container format.
    pub fn format(&self) -> FileFormat {
        match self {
            LogReader::Mcap(_) => FileFormat::Mcap,
            LogReader::Bag(_) => FileFormat::Bag,
        }
    }

    /// All topics.
    pub fn topics(&self) -> Vec<String> {
        match self {
            LogReader::Mcap(reader) => {
                reader.topics().into_iter().map(|t| t.to_string()).collect()
            }
            LogReader::Bag(reader) => {
                reader.topics().into_iter().map(|t| t.to_string()).collect()
            }
        }
    }

    /// Message count for a topic.
    pub fn message_count(&self, topic: &str) -> Result<u64> {
        match self {
            LogReader::Mcap(reader) => reader.message_count(topic),
            LogReader::Bag(reader) => reader.message_count(topic),
        }
    }

    fn channel_contexts(&self) -> Result<HashMap<u16, ChannelContext>> {
        let mut contexts = HashMap::new();
        match self {
            LogReader::Mcap(reader) => {
                for (id, channel) in reader.channels() {
                    let schema_record = reader.schema_for_channel(*id).ok_or_else(|| {
                        CodecError::malformed_schema(
                            &channel.topic,
                            "channel has no schema to decode with",
                        )
                    })?;
                    let text = String::from_utf8(schema_record.data.clone()).map_err(|_| {
                        CodecError::malformed_schema(&schema_record.name, "schema text is not utf-8")
                    })?;
                    let dialect = Dialect::from_schema_encoding(&schema_record.encoding)
                        .unwrap_or_else(|_| Dialect::detect(&schema_record.name, &text));
                    let schema = parse_schema(&schema_record.name, &text, dialect)?;
                    let codec = codec_for_encoding(&channel.message_encoding)?;
                    contexts.insert(
                        *id,
                        ChannelContext {
                            topic: channel.topic.clone(),
                            msg_type: schema_record.name.clone(),
                            schema,
                            codec,
                        },
                    );
                }
            }
            LogReader::Bag(reader) => {
                for (conn, connection) in reader.connections() {
                    let schema = parse_schema(
                        &connection.header.msg_type,
                        &connection.header.message_definition,
                        Dialect::Ros1,
                    )?;
                    contexts.insert(
                        *conn as u16,
                        ChannelContext {
                            topic: connection.topic.clone(),
                            msg_type: connection.header.msg_type.clone(),
                            schema,
                            codec: codec_for_encoding("ros1")?,
                        },
                    );
                }
            }
        }
        Ok(contexts)
    }

    /// Iterate decoded messages in log-time order, optionally filtered by
    /// topic.
    pub fn decoded_messages(
        &self,
        topic: Option<&str>,
    ) -> Result<Box<dyn Iterator<Item = Result<DecodedMessage>> + '_>> {
        let contexts = self.channel_contexts()?;
        match self {
            LogReader::Mcap(reader) => {
                let mut query = MessageQuery::all();
                query.topic = topic.map(|t| t.to_string());
                let iter = reader.messages(query)?.map(move |message| {
                    let message = message?;
                    decode_mcap_message(&contexts, &message)
                });
                Ok(Box::new(iter))
            }
            LogReader::Bag(reader) => {
                let mut query = BagMessageQuery::all();
                if let Some(topic) = topic {
                    query.topics = vec![topic.to_string()];
                }
                let iter = reader.messages(query)?.map(move |message| {
                    let message = message?;
                    let context = contexts.get(&(message.conn as u16)).ok_or_else(|| {
                        CodecError::malformed("bag", format!("no connection {}", message.conn))
                    })?;
                    let data = context
                        .codec
                        .deserialize_message(&context.schema, &message.data)?;
                    Ok(DecodedMessage {
                        topic: context.topic.clone(),
                        msg_type: context.msg_type.clone(),
                        log_time: message.time,
                        data,
                    })
                });
                Ok(Box::new(iter))
            }
        }
    }
}

fn decode_mcap_message(
    contexts: &HashMap<u16, ChannelContext>,
    message: &MessageRecord,
) -> Result<DecodedMessage> {
    let context = contexts.get(&message.channel_id).ok_or_else(|| {
        CodecError::malformed("mcap", format!("no channel {}", message.channel_id))
    })?;
    let data = context
        .codec
        .deserialize_message(&context.schema, &message.data)?;
    Ok(DecodedMessage {
        topic: context.topic.clone(),
        msg_type: context.msg_type.clone(),
        log_time: message.log_time,
        data,
    })
}

/// Writer configuration for the façade.
pub struct LogWriterOptions {
    /// MCAP profile for .mcap outputs
    pub profile: String,
    /// Chunk threshold; `None` keeps each format's default
    pub chunk_size: Option<u64>,
    /// Chunk compression for .mcap outputs
    pub mcap_compression: Compression,
    /// Chunk compression for .bag outputs
    pub bag_compression: Compression,
    /// Chunk encryption for .mcap outputs
    pub encryption: Option<Box<dyn EncryptionProvider>>,
}

impl Default for LogWriterOptions {
    fn default() -> Self {
        Self {
            profile: "ros2".to_string(),
            chunk_size: None,
            mcap_compression: Compression::Lz4,
            bag_compression: Compression::None,
            encryption: None,
        }
    }
}

/// Format-agnostic log writer for serialized payloads.
pub enum LogWriter {
    Mcap(McapWriter<BufWriter<File>>),
    Bag(BagWriter<BufWriter<File>>),
}

impl LogWriter {
    /// Create a writer, dispatching on the output extension.
    pub fn create<P: AsRef<Path>>(path: P, options: LogWriterOptions) -> Result<Self> {
        match FileFormat::from_extension(&path)? {
            FileFormat::Mcap => {
                let mut mcap_options = McapWriteOptions {
                    profile: options.profile,
                    compression: options.mcap_compression,
                    encryption: options.encryption,
                    ..Default::default()
                };
                if let Some(chunk_size) = options.chunk_size {
                    mcap_options.chunk_size = Some(chunk_size);
                }
                Ok(LogWriter::Mcap(McapWriter::create(path, mcap_options)?))
            }
            FileFormat::Bag => {
                let mut bag_options = BagWriteOptions {
                    compression: options.bag_compression,
                    ..Default::default()
                };
                if let Some(chunk_size) = options.chunk_size {
                    bag_options.chunk_size = chunk_size;
                }
                Ok(LogWriter::Bag(BagWriter::create(path, bag_options)?))
            }
        }
    }

    /// Register a channel from a schema text.
    ///
    /// For MCAP the schema is embedded as-is; for bags the md5sum is
    /// computed from the parsed tree.
    pub fn add_channel(
        &mut self,
        topic: &str,
        msg_type: &str,
        schema_text: &str,
        message_encoding: &str,
    ) -> Result<u16> {
        match self {
            LogWriter::Mcap(writer) => {
                let dialect = Dialect::detect(msg_type, schema_text);
                let schema_id = writer.register_schema(
                    msg_type,
                    dialect.schema_encoding(),
                    schema_text.as_bytes(),
                )?;
                writer.register_channel(schema_id, topic, message_encoding, BTreeMap::new())
            }
            LogWriter::Bag(writer) => {
                let parsed = parse_schema(msg_type, schema_text, Dialect::Ros1)?;
                let md5sum = compute_md5sum(&parsed)?;
                let conn = writer.add_connection(
                    topic,
                    ConnectionHeader {
                        topic: topic.to_string(),
                        msg_type: msg_type.to_string(),
                        md5sum,
                        message_definition: schema_text.to_string(),
                        callerid: None,
                        latching: None,
                    },
                )?;
                Ok(conn as u16)
            }
        }
    }

    /// Write one serialized message.
    pub fn write_serialized(
        &mut self,
        channel_id: u16,
        log_time: u64,
        data: Vec<u8>,
    ) -> Result<()> {
        match self {
            LogWriter::Mcap(writer) => {
                let sequence = writer.next_sequence(channel_id);
                writer.write_message(&MessageRecord {
                    channel_id,
                    sequence,
                    log_time,
                    publish_time: log_time,
                    data,
                })
            }
            LogWriter::Bag(writer) => writer.write_message(channel_id as u32, log_time, &data),
        }
    }

    /// Finalize the file.
    pub fn finish(&mut self) -> Result<()> {
        match self {
            LogWriter::Mcap(writer) => writer.finish(),
            LogWriter::Bag(writer) => writer.finish(),
        }
    }

    /// Messages written so far.
    pub fn message_count(&self) -> u64 {
        match self {
            LogWriter::Mcap(writer) => writer.message_count(),
            LogWriter::Bag(writer) => writer.message_count(),
        }
    }
}
