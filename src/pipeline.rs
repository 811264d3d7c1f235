use crate::{
    credential::{parse_credential, CredentialRecord},
    error::DecodeError,
    inflate::inflate_payload,
    normalize::normalize_family_names,
    numeric::decode_numeric,
    summary::{build_summary, DosePolicy, VerificationReport},
    token::{CompactToken, TokenHeader},
};

/// Options for decoding a health card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Which Immunization entries count as doses
    pub dose_policy: DosePolicy,
}

/// A fully decoded, not yet authenticated, health card.
#[derive(Debug, Clone)]
pub struct DecodedCredential {
    /// The token segments, for handing to a signature verifier
    pub token: CompactToken,
    /// The token header, if it was readable JSON
    pub header: Option<TokenHeader>,
    /// The parsed credential
    pub record: CredentialRecord,
}

/// Runs a scanned `shc:/` string through every decoding stage.
///
/// # Arguments
/// * `raw` - The numeric payload read from the QR symbol
///
/// # Returns
/// * `Result<DecodedCredential, DecodeError>` - The decoded credential, or the error
///   of the first stage that failed
pub fn decode_credential(raw: &str) -> Result<DecodedCredential, DecodeError> {
    log::debug!("Decoding numeric payload of {} chars", raw.len());
    let text = decode_numeric(raw)?;

    log::debug!("Parsing compact token of {} chars", text.len());
    let token = CompactToken::parse(&text)?;

    let header = match token.parse_header() {
        Ok(header) => {
            if header.zip.as_deref() != Some("DEF") {
                log::warn!("Token header declares zip={:?}, expected \"DEF\"", header.zip);
            }
            Some(header)
        }
        Err(e) => {
            log::warn!("Ignoring unreadable token header: {e}");
            None
        }
    };

    log::debug!("Inflating payload of {} bytes", token.payload.len());
    let json = inflate_payload(&token.payload)?;

    let json = normalize_family_names(&json)?;

    let record = parse_credential(&json)?;

    Ok(DecodedCredential {
        token,
        header,
        record,
    })
}

/// Decodes a scanned string and builds its verification report.
///
/// The report is always marked as not verified; see [`crate::verify`].
pub fn summarize(raw: &str, options: DecodeOptions) -> Result<VerificationReport, DecodeError> {
    let decoded = decode_credential(raw)?;
    Ok(build_summary(&decoded.record, options.dose_policy))
}
