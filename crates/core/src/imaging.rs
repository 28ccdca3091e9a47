//! Image encoding for backend uploads.

use std::io::Cursor;

use image::codecs::webp::WebPEncoder;
use image::DynamicImage;

use crate::error::CoreError;

/// MIME type of the bytes produced by [`encode_webp`].
pub const WEBP_MIME: &str = "image/webp";

/// File extension matching [`encode_webp`].
pub const WEBP_EXTENSION: &str = "webp";

/// Encode an image as lossless WebP.
///
/// The image is normalised to RGBA8 first since the WebP encoder only
/// accepts 8-bit layouts.
pub fn encode_webp(image: &DynamicImage) -> Result<Vec<u8>, CoreError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(CoreError::Validation(
            "Cannot encode an empty image".to_string(),
        ));
    }

    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut buf = Cursor::new(Vec::new());
    rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn produces_riff_webp_container() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([10, 20, 30])));
        let bytes = encode_webp(&img).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn lossless_round_trip_preserves_pixels() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(4, 4, |x, y| {
            Rgb([(x * 60) as u8, (y * 60) as u8, 7])
        }));
        let bytes = encode_webp(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn empty_image_is_rejected() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(encode_webp(&img), Err(CoreError::Validation(_))));
    }
}
