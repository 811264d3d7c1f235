use std::string::FromUtf8Error;

use crate::token::Segment;

/// Fatal failures of the decoding pipeline, in pipeline order.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Bad scheme marker, odd digit count or a non-digit pair.
    #[error("malformed numeric payload: {0}")]
    MalformedPayload(String),
    /// The compact token did not split into exactly three segments.
    #[error("compact token has {0} segments, expected 3")]
    Structure(usize),
    /// A token segment is not valid base64url.
    #[error("invalid base64url in {segment} segment: {source}")]
    Decode {
        /// Which segment failed
        segment: Segment,
        /// Underlying decoder error
        #[source]
        source: base64::DecodeError,
    },
    /// The payload is not a complete raw DEFLATE stream.
    #[error("failed to inflate payload: {0}")]
    Decompression(String),
    /// The inflated payload is not UTF-8.
    #[error("inflated payload is not valid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),
    /// Normalization or record parsing failed.
    #[error("credential schema error: {0}")]
    Schema(String),
}

/// Error kind names as reported to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum ErrorKind {
    MalformedPayload,
    StructureError,
    DecodeError,
    DecompressionError,
    EncodingError,
    SchemaError,
}

impl DecodeError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::MalformedPayload(_) => ErrorKind::MalformedPayload,
            DecodeError::Structure(_) => ErrorKind::StructureError,
            DecodeError::Decode { .. } => ErrorKind::DecodeError,
            DecodeError::Decompression(_) => ErrorKind::DecompressionError,
            DecodeError::Encoding(_) => ErrorKind::EncodingError,
            DecodeError::Schema(_) => ErrorKind::SchemaError,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        DecodeError::Schema(err.to_string())
    }
}
