use std::path::Path;

use anyhow::{bail, Context, Result};
use vaxx_check::numeric::SHC_PREFIX;

/// Reads an image file and returns the first `shc:/` QR payload found in it.
///
/// # Arguments
///
/// * `path` - Path to a PNG, JPEG or other image readable by `image`.
///
/// # Returns
///
/// The decoded QR text, or an error if no health card QR code could be read.
pub fn scan_image(path: &Path) -> Result<String> {
    let img = image::open(path)
        .with_context(|| format!("Failed to open image '{}'", path.display()))?
        .to_luma8();
    let (width, height) = img.dimensions();
    log::trace!("Scanning {width}x{height} image '{}'", path.display());

    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            img.get_pixel(x as u32, y as u32).0[0]
        });

    let grids = prepared.detect_grids();
    log::debug!("Found {} QR grid(s) in '{}'", grids.len(), path.display());

    for grid in grids {
        match grid.decode() {
            Ok((_, content)) if content.starts_with(SHC_PREFIX) => return Ok(content),
            Ok((_, content)) => {
                log::debug!("Skipping QR code that is not a health card ({} chars)", content.len())
            }
            Err(e) => log::debug!("Failed to decode QR grid: {e:?}"),
        }
    }

    bail!("No SMART Health Card QR code found in '{}'", path.display())
}
