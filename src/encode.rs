use image::{ExtendedColorType, ImageEncoder, RgbaImage, codecs::png::PngEncoder};
use serde::{Deserialize, Serialize};

#[derive(clap::ValueEnum, Clone, Default, Debug, Serialize, Deserialize, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    PNG,
    JPEG,
}

/// Encodes one tile image; JPEG drops the alpha channel.
pub fn encode(image: &RgbaImage, format: Format, jpeg_quality: u8) -> Result<Vec<u8>, String> {
    let (width, height) = image.dimensions();

    let mut out = Vec::new();

    match format {
        Format::PNG => {
            PngEncoder::new(&mut out)
                .write_image(image.as_raw(), width, height, ExtendedColorType::Rgba8)
                .map_err(|e| format!("Failed to encode PNG: {e}"))?;
        }
        Format::JPEG => {
            let rgb: Vec<u8> = image
                .as_raw()
                .chunks_exact(4)
                .flat_map(|chunk| &chunk[0..3])
                .copied()
                .collect();

            let width = u16::try_from(width).map_err(|e| e.to_string())?;
            let height = u16::try_from(height).map_err(|e| e.to_string())?;

            jpeg_encoder::Encoder::new(&mut out, jpeg_quality)
                .encode(&rgb, width, height, jpeg_encoder::ColorType::Rgb)
                .map_err(|e| format!("Failed to encode JPEG: {e}"))?;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn image() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, y| Rgba([x as u8 * 16, y as u8 * 16, 0, 128]))
    }

    #[test]
    fn encodes_png_with_alpha() {
        let bytes = encode(&image(), Format::PNG, 85).unwrap();

        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();

        assert_eq!(decoded, image());
    }

    #[test]
    fn encodes_jpeg() {
        let bytes = encode(&image(), Format::JPEG, 85).unwrap();

        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&bytes).unwrap();

        assert_eq!((decoded.width(), decoded.height()), (16, 16));
    }
}
