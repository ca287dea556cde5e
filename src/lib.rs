//! # roslog
//!
//! Robotics log container library for MCAP and ROS1 bag files.
//!
//! The crate covers three layers:
//! - **Containers**: MCAP ([`mcap`]) and ROS1 bag v2.0 ([`bag`]) readers and
//!   writers, with chunking, indexing, CRC validation, chunk compression
//!   (lz4/zstd/bz2) and optional AES-256-GCM chunk encryption.
//! - **Messages**: schema-driven CDR, rosmsg, and JSON codecs ([`encoding`])
//!   built on a compiling schema layer ([`schema`]) that batches primitive
//!   runs into single aligned transfers.
//! - **Translation**: bidirectional ROS1/ROS2 message and schema rewriting
//!   ([`translate`]), plus whole-file pipelines ([`ops`]) for convert,
//!   merge, recover, and sort.
//!
//! ## Reading with format auto-detection
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use roslog::LogReader;
//!
//! let reader = LogReader::open("drive.mcap")?;
//! for message in reader.decoded_messages(Some("/imu"))? {
//!     let message = message?;
//!     println!("{} @ {}", message.topic, message.log_time);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Writing an MCAP file
//!
//! ```rust,no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use roslog::mcap::{McapWriteOptions, McapWriter};
//!
//! let mut writer = McapWriter::create("out.mcap", McapWriteOptions::default())?;
//! let schema = writer.register_schema("std_msgs/msg/String", "ros2msg", b"string data\n")?;
//! let channel = writer.register_channel(schema, "/chat", "cdr", Default::default())?;
//! # let _ = channel;
//! writer.finish()?;
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{CodecError, CrcScope, MessageValue, Result, Value};

pub mod encoding;
pub mod io;
pub mod schema;
pub mod translate;

pub mod bag;
pub mod mcap;
pub mod ops;

pub use io::{DecodedMessage, FileFormat, LogReader, LogWriter, LogWriterOptions};
pub use schema::{Dialect, ParsedSchema, TypeStore};
