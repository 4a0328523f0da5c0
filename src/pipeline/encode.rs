//! Image encoding: `DynamicImage` → base64 PNG [`PageImage`].
//!
//! PNG keeps rendered text crisp; JPEG artefacts on small print confuse
//! vision models far more than the extra bytes cost.

use crate::output::PageImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

pub const PNG_MIME: &str = "image/png";

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(PageImage {
        mime_type: PNG_MIME.to_string(),
        data: b64,
    })
}
