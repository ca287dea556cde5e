//! Error types for roslog.
//!
//! One error enum covers both container formats and both message encodings.
//! Parsers never swallow errors; the recovery pipeline is the only consumer
//! that downgrades them to warnings.

use std::fmt;

/// Which stored CRC failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcScope {
    /// `data_end.data_section_crc`
    Data,
    /// `footer.summary_crc`
    Summary,
    /// `chunk.uncompressed_crc`
    Chunk,
}

impl fmt::Display for CrcScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrcScope::Data => write!(f, "data section"),
            CrcScope::Summary => write!(f, "summary section"),
            CrcScope::Chunk => write!(f, "chunk"),
        }
    }
}

/// Errors that can occur while reading, writing, or translating log files.
#[derive(Debug, Clone)]
pub enum CodecError {
    /// Container structure does not conform to its specification
    MalformedContainer {
        /// Container format ("mcap" or "bag")
        format: &'static str,
        /// What went wrong
        message: String,
    },

    /// Schema text or tree is invalid
    MalformedSchema {
        /// Schema name or identifier
        schema_name: String,
        /// Validation error message
        reason: String,
    },

    /// Iteration requested a topic no channel covers
    UnknownTopic {
        /// The topic that was requested
        topic: String,
    },

    /// `message_encoding` value not supported by this build
    UnknownEncoding {
        /// The encoding string from the file
        encoding: String,
    },

    /// Computed CRC does not match the stored CRC
    InvalidCrc {
        /// Which CRC scope failed
        scope: CrcScope,
        /// CRC stored in the file
        expected: u32,
        /// CRC computed over the bytes
        actual: u32,
    },

    /// Authentication tag rejected the ciphertext or key
    DecryptionFailed {
        /// Failure detail
        message: String,
    },

    /// Chunk advertises an encryption algorithm the reader cannot handle
    UnknownEncryption {
        /// Algorithm name from the chunk, or empty if no provider configured
        algorithm: String,
    },

    /// Compression algorithm not permitted for this container
    UnsupportedCompression {
        /// The algorithm string
        algorithm: String,
        /// Container format ("mcap" or "bag")
        format: &'static str,
    },

    /// Buffer too short for the requested read
    BufferTooShort {
        /// Requested bytes
        requested: usize,
        /// Available bytes
        available: usize,
        /// Cursor position when the error occurred
        position: u64,
    },

    /// Message type not found in the schema or type store
    TypeNotFound {
        /// Type name that was not found
        type_name: String,
    },

    /// Unsupported type or operation
    Unsupported {
        /// What is not supported
        feature: String,
    },

    /// Encoding/decoding failure with codec context
    EncodeError {
        /// Codec context (e.g. "CDR", "rosmsg", "JSON", "IO")
        codec: &'static str,
        /// Error message
        message: String,
    },
}

impl CodecError {
    /// Create a malformed-container error.
    pub fn malformed(format: &'static str, message: impl Into<String>) -> Self {
        CodecError::MalformedContainer {
            format,
            message: message.into(),
        }
    }

    /// Create a malformed-schema error.
    pub fn malformed_schema(schema_name: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::MalformedSchema {
            schema_name: schema_name.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown-topic error.
    pub fn unknown_topic(topic: impl Into<String>) -> Self {
        CodecError::UnknownTopic {
            topic: topic.into(),
        }
    }

    /// Create an unknown-encoding error.
    pub fn unknown_encoding(encoding: impl Into<String>) -> Self {
        CodecError::UnknownEncoding {
            encoding: encoding.into(),
        }
    }

    /// Create a CRC-mismatch error.
    pub fn invalid_crc(scope: CrcScope, expected: u32, actual: u32) -> Self {
        CodecError::InvalidCrc {
            scope,
            expected,
            actual,
        }
    }

    /// Create a decryption-failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        CodecError::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Create an unknown-encryption error.
    pub fn unknown_encryption(algorithm: impl Into<String>) -> Self {
        CodecError::UnknownEncryption {
            algorithm: algorithm.into(),
        }
    }

    /// Create an unsupported-compression error.
    pub fn unsupported_compression(algorithm: impl Into<String>, format: &'static str) -> Self {
        CodecError::UnsupportedCompression {
            algorithm: algorithm.into(),
            format,
        }
    }

    /// Create a buffer-too-short error.
    pub fn buffer_too_short(requested: usize, available: usize, position: u64) -> Self {
        CodecError::BufferTooShort {
            requested,
            available,
            position,
        }
    }

    /// Create a "type not found" error.
    pub fn type_not_found(type_name: impl Into<String>) -> Self {
        CodecError::TypeNotFound {
            type_name: type_name.into(),
        }
    }

    /// Create an unsupported-feature error.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        CodecError::Unsupported {
            feature: feature.into(),
        }
    }

    /// Create an encode/decode error.
    pub fn encode(codec: &'static str, message: impl Into<String>) -> Self {
        CodecError::EncodeError {
            codec,
            message: message.into(),
        }
    }

    /// True for errors that indicate a broken file rather than a usage error.
    ///
    /// The CLI maps these to exit code 2.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CodecError::MalformedContainer { .. }
                | CodecError::MalformedSchema { .. }
                | CodecError::InvalidCrc { .. }
                | CodecError::DecryptionFailed { .. }
                | CodecError::UnknownEncryption { .. }
                | CodecError::UnsupportedCompression { .. }
                | CodecError::BufferTooShort { .. }
        )
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::MalformedContainer { format, message } => {
                write!(f, "Malformed {format} file: {message}")
            }
            CodecError::MalformedSchema {
                schema_name,
                reason,
            } => write!(f, "Malformed schema '{schema_name}': {reason}"),
            CodecError::UnknownTopic { topic } => write!(f, "Unknown topic: '{topic}'"),
            CodecError::UnknownEncoding { encoding } => {
                write!(f, "Unknown message encoding: '{encoding}'")
            }
            CodecError::InvalidCrc {
                scope,
                expected,
                actual,
            } => write!(
                f,
                "CRC mismatch in {scope}: stored {expected:#010x}, computed {actual:#010x}"
            ),
            CodecError::DecryptionFailed { message } => {
                write!(f, "Chunk decryption failed: {message}")
            }
            CodecError::UnknownEncryption { algorithm } => {
                if algorithm.is_empty() {
                    write!(
                        f,
                        "Chunk is encrypted but no encryption provider is configured"
                    )
                } else {
                    write!(f, "Unknown encryption algorithm: '{algorithm}'")
                }
            }
            CodecError::UnsupportedCompression { algorithm, format } => {
                write!(
                    f,
                    "Compression '{algorithm}' is not permitted in {format} files"
                )
            }
            CodecError::BufferTooShort {
                requested,
                available,
                position,
            } => write!(
                f,
                "Buffer too short: requested {requested} bytes at position {position}, only {available} available"
            ),
            CodecError::TypeNotFound { type_name } => {
                write!(f, "Type not found: '{type_name}'")
            }
            CodecError::Unsupported { feature } => write!(f, "Unsupported: {feature}"),
            CodecError::EncodeError { codec, message } => {
                write!(f, "{codec} error: {message}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::EncodeError {
            codec: "IO",
            message: err.to_string(),
        }
    }
}

/// Result type for roslog operations.
pub type Result<T> = std::result::Result<T, CodecError>;
