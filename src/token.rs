use base64::engine::{general_purpose::URL_SAFE as BASE64_URL, Engine};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// The three parts of a compact signed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Segment {
    /// Protected header
    Header,
    /// Compressed credential payload
    Payload,
    /// Issuer signature
    Signature,
}

/// A compact signed token split into its decoded segments.
///
/// No cryptographic check has been made on any of these bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactToken {
    /// Decoded header bytes (JSON)
    pub header: Vec<u8>,
    /// Decoded payload bytes (raw DEFLATE)
    pub payload: Vec<u8>,
    /// Decoded signature bytes
    pub signature: Vec<u8>,
    signing_input: String,
}

impl CompactToken {
    /// Splits compact token text and base64url-decodes each segment.
    ///
    /// # Arguments
    /// * `text` - `header.payload.signature` in (usually unpadded) base64url
    ///
    /// # Returns
    /// * `Result<Self, DecodeError>` - `Structure` if there are not exactly three
    ///   segments, `Decode` naming the first segment that is not base64url
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        let parts = text.split('.').collect::<Vec<_>>();
        let [header, payload, signature] = parts.as_slice() else {
            return Err(DecodeError::Structure(parts.len()));
        };

        log::trace!(
            "Token segment lengths: header={} payload={} signature={}",
            header.len(),
            payload.len(),
            signature.len()
        );

        let token = Self {
            header: decode_segment(Segment::Header, header)?,
            payload: decode_segment(Segment::Payload, payload)?,
            signature: decode_segment(Segment::Signature, signature)?,
            signing_input: format!("{header}.{payload}"),
        };

        Ok(token)
    }

    /// The `header.payload` text the issuer signed, exactly as scanned.
    pub fn signing_input(&self) -> &str {
        &self.signing_input
    }

    /// Parses the header segment as JSON.
    pub fn parse_header(&self) -> Result<TokenHeader, DecodeError> {
        let header = serde_json::from_slice(&self.header)?;
        Ok(header)
    }
}

/// Protected header of a health card token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Signature algorithm, `ES256` for health cards
    pub alg: String,
    /// Key identifier within the issuer's key set
    #[serde(default)]
    pub kid: Option<String>,
    /// Payload compression, `DEF` for raw DEFLATE
    #[serde(default)]
    pub zip: Option<String>,
}

/// Appends the `=` padding a base64 segment is missing.
pub fn repair_padding(segment: &str) -> String {
    let missing = (4 - segment.len() % 4) % 4;
    let mut padded = String::with_capacity(segment.len() + missing);
    padded.push_str(segment);
    padded.extend(std::iter::repeat('=').take(missing));
    padded
}

fn decode_segment(segment: Segment, text: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64_URL
        .decode(repair_padding(text))
        .map_err(|source| DecodeError::Decode { segment, source })
}
