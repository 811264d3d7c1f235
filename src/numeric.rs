//! Numeric QR payload transcoding.
//!
//! SMART Health Cards are stored in QR numeric mode: every character of the
//! compact token is written as two decimal digits holding `char - 45`.

use std::fmt::Write;

use crate::error::DecodeError;

/// Scheme marker that prefixes every numeric payload.
pub const SHC_PREFIX: &str = "shc:/";

/// Offset added to each digit pair to get the character code.
pub const CHAR_OFFSET: u32 = 45;

/// Decodes a scanned `shc:/` numeric payload into compact token text.
///
/// # Arguments
/// * `raw` - The string read from the QR symbol
///
/// # Returns
/// * `Result<String, DecodeError>` - The ASCII compact token, or `MalformedPayload`
pub fn decode_numeric(raw: &str) -> Result<String, DecodeError> {
    let digits = raw.strip_prefix(SHC_PREFIX).ok_or_else(|| {
        DecodeError::MalformedPayload(format!("payload does not start with '{SHC_PREFIX}'"))
    })?;

    if digits.len() % 2 != 0 {
        return Err(DecodeError::MalformedPayload(format!(
            "odd number of digits ({})",
            digits.len()
        )));
    }

    log::trace!("Transcoding {} digit pairs", digits.len() / 2);

    digits
        .as_bytes()
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let n = match pair {
                [hi @ b'0'..=b'9', lo @ b'0'..=b'9'] => {
                    u32::from(hi - b'0') * 10 + u32::from(lo - b'0')
                }
                _ => {
                    return Err(DecodeError::MalformedPayload(format!(
                        "non-digit pair at offset {}",
                        SHC_PREFIX.len() + i * 2
                    )))
                }
            };
            char::from_u32(n + CHAR_OFFSET).ok_or_else(|| {
                DecodeError::MalformedPayload(format!("invalid character code {}", n + CHAR_OFFSET))
            })
        })
        .collect()
}

/// Encodes compact token text as a `shc:/` numeric payload.
///
/// Only characters with code points in `45..=144` can be represented.
pub fn encode_numeric(token: &str) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(SHC_PREFIX.len() + token.len() * 2);
    out.push_str(SHC_PREFIX);

    for c in token.chars() {
        let n = (c as u32)
            .checked_sub(CHAR_OFFSET)
            .filter(|n| *n <= 99)
            .ok_or_else(|| {
                DecodeError::MalformedPayload(format!("character {c:?} cannot be encoded"))
            })?;
        // writing to a String cannot fail
        let _ = write!(out, "{n:02}");
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn decodes_digit_pairs() {
        // 'e' = 101 -> 56, 'y' = 121 -> 76, '.' = 46 -> 01
        let token = decode_numeric("shc:/567601").unwrap();
        assert_eq!(token, "ey.");
    }

    #[test]
    fn empty_body_is_empty_token() {
        assert_eq!(decode_numeric("shc:/").unwrap(), "");
    }

    #[test]
    fn rejects_bad_marker() {
        for raw in ["", "shc", "shc:", "abc:/5676", "SHC:/5676"] {
            let err = decode_numeric(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedPayload, "input {raw:?}");
        }
    }

    #[test]
    fn rejects_odd_length() {
        let err = decode_numeric("shc:/567").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedPayload);
    }

    #[test]
    fn rejects_non_digits() {
        for raw in ["shc:/56a6", "shc:/-1", "shc:/5 76"] {
            let err = decode_numeric(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedPayload, "input {raw:?}");
        }
    }

    #[test]
    fn round_trips_every_representable_char() {
        let all: String = (45u32..=144).filter_map(char::from_u32).collect();
        assert_eq!(all.chars().count(), 100);

        let encoded = encode_numeric(&all).unwrap();
        assert_eq!(encoded.len(), SHC_PREFIX.len() + 200);
        assert_eq!(decode_numeric(&encoded).unwrap(), all);
    }

    #[test]
    fn round_trips_token_alphabet() {
        let token = "eyJ6aXAiOiJERUYiLCJhbGciOiJFUzI1NiJ9.3ZJLb-_x.Xg1-2f";
        let encoded = encode_numeric(token).unwrap();
        assert!(encoded[SHC_PREFIX.len()..].bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(decode_numeric(&encoded).unwrap(), token);
    }

    #[test]
    fn encode_rejects_out_of_range() {
        assert!(encode_numeric("a+b").is_err());
        assert!(encode_numeric("é").is_err());
        assert!(encode_numeric("\u{90}").is_ok());
        assert!(encode_numeric("\u{91}").is_err());
    }
}
