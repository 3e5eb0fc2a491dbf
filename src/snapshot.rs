//! Canvas snapshots as embedded-base64 image strings.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

const JPEG_PREFIX: &str = "data:image/jpeg;base64,";
/// Quality used by browsers for `toDataURL("image/jpeg")` without an explicit argument.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Encode the image as a JPEG `data:` URL.
pub fn encode_data_url(image: &RgbImage) -> Result<String> {
    encode_data_url_with_quality(image, DEFAULT_JPEG_QUALITY)
}

pub fn encode_data_url_with_quality(image: &RgbImage, quality: u8) -> Result<String> {
    if image.width() == 0 || image.height() == 0 {
        return Err(anyhow!("cannot snapshot an empty canvas"));
    }
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(image)
        .context("encode snapshot as jpeg")?;

    let mut url = String::with_capacity(JPEG_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
    url.push_str(JPEG_PREFIX);
    STANDARD.encode_string(&jpeg, &mut url);
    Ok(url)
}

/// Decode a base64 image `data:` URL back into pixels.
pub fn decode_data_url(url: &str) -> Result<RgbImage> {
    let rest = url
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data URL"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("data URL has no payload"))?;
    if !meta.starts_with("image/") || !meta.ends_with(";base64") {
        return Err(anyhow!("unsupported data URL type '{}'", meta));
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .context("data URL payload is not base64")?;
    let image = image::load_from_memory(&bytes).context("decode snapshot image")?;
    Ok(image.into_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn encodes_jpeg_data_url() -> Result<()> {
        let image = RgbImage::from_pixel(16, 8, Rgb([200, 40, 40]));
        let url = encode_data_url(&image)?;
        assert!(url.starts_with("data:image/jpeg;base64,/9j/"));

        let decoded = decode_data_url(&url)?;
        assert_eq!(decoded.dimensions(), (16, 8));
        let px = decoded.get_pixel(8, 4).0;
        assert!((px[0] as i32 - 200).abs() < 12);
        Ok(())
    }

    #[test]
    fn rejects_empty_canvas_and_bad_urls() {
        assert!(encode_data_url(&RgbImage::new(0, 0)).is_err());
        assert!(decode_data_url("http://example.com/a.jpg").is_err());
        assert!(decode_data_url("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(decode_data_url("data:image/jpeg;base64,!!!").is_err());
    }
}
