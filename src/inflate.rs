use flate2::{Decompress, FlushDecompress, Status};

use crate::error::DecodeError;

/// Upper bound on the inflated payload size.
pub const MAX_INFLATED_LEN: usize = 1024 * 1024;

/// Inflates a raw DEFLATE payload (no zlib header, no checksum) into UTF-8 text.
///
/// # Arguments
/// * `payload` - The decoded payload segment of the token
///
/// # Returns
/// * `Result<String, DecodeError>` - `Decompression` for corrupt or truncated
///   streams, `Encoding` if the inflated bytes are not UTF-8
pub fn inflate_payload(payload: &[u8]) -> Result<String, DecodeError> {
    let mut inflater = Decompress::new(false);
    let mut out = Vec::with_capacity((payload.len() * 4).clamp(256, MAX_INFLATED_LEN));

    loop {
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();

        let status = inflater
            .decompress_vec(&payload[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| DecodeError::Decompression(e.to_string()))?;

        if status == Status::StreamEnd {
            break;
        }

        if out.len() == out.capacity() {
            if out.len() >= MAX_INFLATED_LEN {
                return Err(DecodeError::Decompression(format!(
                    "inflated payload exceeds {MAX_INFLATED_LEN} bytes"
                )));
            }
            let grow = out.capacity().min(MAX_INFLATED_LEN - out.len());
            out.reserve_exact(grow);
            continue;
        }

        let stalled =
            inflater.total_in() as usize == consumed && inflater.total_out() == produced;
        if inflater.total_in() as usize == payload.len() || stalled {
            return Err(DecodeError::Decompression(
                "truncated deflate stream".to_owned(),
            ));
        }
    }

    if out.len() > MAX_INFLATED_LEN {
        return Err(DecodeError::Decompression(format!(
            "inflated payload exceeds {MAX_INFLATED_LEN} bytes"
        )));
    }

    if inflater.total_in() as usize != payload.len() {
        log::warn!(
            "Ignoring {} trailing bytes after deflate stream",
            payload.len() - inflater.total_in() as usize
        );
    }

    log::trace!("Inflated {} bytes to {}", payload.len(), out.len());

    let text = String::from_utf8(out)?;
    Ok(text)
}
