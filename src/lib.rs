//! Library for decoding SMART Health Card vaccination QR codes.
//!
//! This crate turns the numeric string scanned from a health card QR code into a
//! structured credential and a human-readable summary (issuer, patient name, dose
//! count). Decoding does not authenticate anything; signature checks go through
//! the [`verify::SignatureVerifier`] extension point.

/// Parsed credential records and their wire models
pub mod credential;

/// Pipeline error types
pub mod error;

/// Raw DEFLATE payload decompression
pub mod inflate;

/// Schema variant normalization of the payload JSON
pub mod normalize;

/// `shc:/` numeric payload transcoding
pub mod numeric;

/// End-to-end decoding of a scanned payload
pub mod pipeline;

/// Verification summaries
pub mod summary;

/// Compact signed token parsing
pub mod token;

/// Signature verification extension point and the ES256 JWKS verifier
pub mod verify;

pub use error::{DecodeError, ErrorKind};
pub use pipeline::{decode_credential, summarize, DecodeOptions, DecodedCredential};
pub use summary::{Authenticity, DosePolicy, SummaryWarning, VerificationReport};
