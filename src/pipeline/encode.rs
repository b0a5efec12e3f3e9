//! Image encoding: `DynamicImage` → PNG bytes ready for upload.
//!
//! PNG is lossless, so chart labels and small table text stay crisp. The
//! `image` crate's encoder writes no timestamps or text chunks, so the same
//! bitmap always yields the same bytes.

use crate::error::ExportError;
use crate::model::PageImage;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} image → {} bytes PNG", img.width(), img.height(), buf.len());
    Ok(buf)
}

/// Encode and tag a rendered bitmap with its page number and DPI.
pub fn to_page_image(img: &DynamicImage, page_number: usize, dpi: u32) -> Result<PageImage, ExportError> {
    let png = encode_png(img).map_err(|e| {
        ExportError::Internal(format!("PNG encoding failed for page {page_number}: {e}"))
    })?;
    Ok(PageImage {
        page_number,
        dpi,
        width: img.width(),
        height: img.height(),
        png,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        let mut img = RgbaImage::from_pixel(16, 9, Rgba([255, 255, 255, 255]));
        img.put_pixel(3, 4, Rgba([200, 30, 30, 255]));
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn encodes_valid_png() {
        let png = encode_png(&sample()).expect("encode should succeed");
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&png).expect("valid PNG");
        assert_eq!((decoded.width(), decoded.height()), (16, 9));
    }

    #[test]
    fn encoding_is_deterministic() {
        let img = sample();
        assert_eq!(encode_png(&img).unwrap(), encode_png(&img).unwrap());
    }

    #[test]
    fn page_image_carries_geometry() {
        let page = to_page_image(&sample(), 4, 150).unwrap();
        assert_eq!(page.page_number, 4);
        assert_eq!(page.dpi, 150);
        assert_eq!((page.width, page.height), (16, 9));
    }
}
