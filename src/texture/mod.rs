//! Texture conversion for GLB embedding.
//!
//! KTX2 output goes through the external Basis Universal compressor behind
//! the [`TextureCompressor`] seam; any failure falls back to JPEG. Source
//! images arrive in RGB/RGBA/BGRA layouts, possibly with row padding, and
//! every path honors the row step.

use log::warn;

use crate::error::{Result, TilerError};
use crate::scene::node::{PixelFormat, TextureCompression, TextureImage};

/// JPEG quality for the fallback encoder.
const JPEG_QUALITY: u8 = 80;

/// Edge length of the white fallback image.
const FALLBACK_SIZE: u32 = 256;

/// Seam to the external GPU-texture compressor (Basis Universal). Input is
/// tightly-packed RGBA8; output is a complete KTX2 container (UASTC 4×4,
/// supercompressed, mipmapped).
pub trait TextureCompressor: Send + Sync {
    fn compress_rgba_to_ktx2(&self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>>;
}

/// An encoded image ready for the glTF buffer.
pub struct EncodedTexture {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

impl EncodedTexture {
    pub fn is_ktx2(&self) -> bool {
        self.mime_type == "image/ktx2"
    }
}

/// Convert one texture for embedding. With `enable_ktx2` and a compressor,
/// the KTX2 path runs first and JPEG is the fallback; without them JPEG is
/// the primary path. A missing or undecodable image yields the white
/// fallback so the material table stays consistent.
pub fn process_texture(
    texture: Option<&TextureImage>,
    compressor: Option<&dyn TextureCompressor>,
    enable_ktx2: bool,
) -> EncodedTexture {
    if enable_ktx2 {
        if let (Some(tex), Some(compressor)) = (texture, compressor) {
            match try_compress_ktx2(tex, compressor) {
                Ok(data) => {
                    return EncodedTexture {
                        data,
                        mime_type: "image/ktx2",
                    }
                }
                Err(e) => warn!("KTX2 compression failed, falling back to JPEG: {e}"),
            }
        }
    }

    match texture.and_then(extract_rgb) {
        Some((rgb, width, height)) => match encode_jpeg(&rgb, width, height) {
            Ok(data) => EncodedTexture {
                data,
                mime_type: "image/jpeg",
            },
            Err(e) => {
                warn!("JPEG encoding failed, emitting white fallback: {e}");
                white_fallback()
            }
        },
        None => white_fallback(),
    }
}

fn try_compress_ktx2(tex: &TextureImage, compressor: &dyn TextureCompressor) -> Result<Vec<u8>> {
    if tex.width == 0 || tex.height == 0 {
        return Err(TilerError::codec("texture has zero dimension"));
    }
    let rgba = normalize_rgba(tex)
        .ok_or_else(|| TilerError::codec(format!("unsupported pixel format {:?}", tex.format)))?;
    compressor.compress_rgba_to_ktx2(&rgba, tex.width, tex.height)
}

/// Normalize a texture to tightly-packed RGBA8. Handles RGB→RGBA padding,
/// BGRA→RGBA channel swap, and padded rows. Block-compressed payloads and
/// luminance layouts are not converted here.
pub fn normalize_rgba(tex: &TextureImage) -> Option<Vec<u8>> {
    if tex.compression != TextureCompression::None {
        return None;
    }
    let width = tex.width as usize;
    let height = tex.height as usize;
    let mut rgba = vec![0u8; width * height * 4];

    match tex.format {
        PixelFormat::Rgba | PixelFormat::Bgra => {
            let swap = tex.format == PixelFormat::Bgra;
            for row in 0..height {
                let src_row = row * tex.row_step;
                for col in 0..width {
                    let src = src_row + col * 4;
                    if src + 4 > tex.data.len() {
                        return None;
                    }
                    let dst = (row * width + col) * 4;
                    if swap {
                        rgba[dst] = tex.data[src + 2];
                        rgba[dst + 1] = tex.data[src + 1];
                        rgba[dst + 2] = tex.data[src];
                    } else {
                        rgba[dst..dst + 3].copy_from_slice(&tex.data[src..src + 3]);
                    }
                    rgba[dst + 3] = tex.data[src + 3];
                }
            }
        }
        PixelFormat::Rgb => {
            for row in 0..height {
                let src_row = row * tex.row_step;
                for col in 0..width {
                    let src = src_row + col * 3;
                    if src + 3 > tex.data.len() {
                        return None;
                    }
                    let dst = (row * width + col) * 4;
                    rgba[dst..dst + 3].copy_from_slice(&tex.data[src..src + 3]);
                    rgba[dst + 3] = 255;
                }
            }
        }
        PixelFormat::Luminance | PixelFormat::LuminanceAlpha => return None,
    }

    Some(rgba)
}

/// Extract tightly-packed RGB8 rows for the JPEG encoder.
fn extract_rgb(tex: &TextureImage) -> Option<(Vec<u8>, u32, u32)> {
    if tex.width == 0 || tex.height == 0 {
        return None;
    }
    if tex.compression != TextureCompression::None {
        warn!(
            "texture uses block compression {:?}, emitting white fallback",
            tex.compression
        );
        return None;
    }

    let width = tex.width as usize;
    let height = tex.height as usize;
    let mut rgb = vec![0u8; width * height * 3];

    match tex.format {
        PixelFormat::Rgba | PixelFormat::Bgra => {
            let swap = tex.format == PixelFormat::Bgra;
            for row in 0..height {
                let src_row = row * tex.row_step;
                for col in 0..width {
                    let src = src_row + col * 4;
                    if src + 4 > tex.data.len() {
                        return None;
                    }
                    let dst = (row * width + col) * 3;
                    if swap {
                        rgb[dst] = tex.data[src + 2];
                        rgb[dst + 1] = tex.data[src + 1];
                        rgb[dst + 2] = tex.data[src];
                    } else {
                        rgb[dst..dst + 3].copy_from_slice(&tex.data[src..src + 3]);
                    }
                }
            }
        }
        PixelFormat::Rgb => {
            for row in 0..height {
                let src_row = row * tex.row_step;
                let src_end = src_row + width * 3;
                if src_end > tex.data.len() {
                    return None;
                }
                let dst = row * width * 3;
                rgb[dst..dst + width * 3].copy_from_slice(&tex.data[src_row..src_end]);
            }
        }
        PixelFormat::Luminance | PixelFormat::LuminanceAlpha => return None,
    }

    Some((rgb, tex.width, tex.height))
}

fn encode_jpeg(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    encoder
        .encode(rgb, width, height, image::ColorType::Rgb8)
        .map_err(|e| TilerError::codec(format!("jpeg encode: {e}")))?;
    Ok(out)
}

fn white_fallback() -> EncodedTexture {
    let size = (FALLBACK_SIZE * FALLBACK_SIZE * 3) as usize;
    let white = vec![255u8; size];
    // A constant white plane always encodes.
    let data = encode_jpeg(&white, FALLBACK_SIZE, FALLBACK_SIZE).unwrap_or_default();
    EncodedTexture {
        data,
        mime_type: "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded_rgb_texture() -> TextureImage {
        // 2x2 RGB with 2 bytes of row padding.
        let row_size = 2 * 3;
        let row_step = row_size + 2;
        let mut data = Vec::new();
        for row in 0..2u8 {
            for col in 0..2u8 {
                data.extend_from_slice(&[row * 100, col * 100, 42]);
            }
            data.extend_from_slice(&[0xEE, 0xEE]);
        }
        TextureImage {
            width: 2,
            height: 2,
            format: PixelFormat::Rgb,
            row_step,
            row_size,
            compression: TextureCompression::None,
            data,
        }
    }

    #[test]
    fn test_normalize_rgba_honors_row_padding() {
        let padded = padded_rgb_texture();
        let mut tight = padded.clone();
        tight.data = vec![
            0, 0, 42, 0, 100, 42, //
            100, 0, 42, 100, 100, 42,
        ];
        tight.row_step = tight.row_size;

        assert_eq!(normalize_rgba(&padded), normalize_rgba(&tight));
    }

    #[test]
    fn test_normalize_bgra_swaps_channels() {
        let tex = TextureImage::packed(1, 1, PixelFormat::Bgra, vec![10, 20, 30, 40]);
        assert_eq!(normalize_rgba(&tex).unwrap(), vec![30, 20, 10, 40]);
    }

    #[test]
    fn test_missing_texture_yields_white_jpeg() {
        let encoded = process_texture(None, None, false);
        assert_eq!(encoded.mime_type, "image/jpeg");
        assert!(!encoded.data.is_empty());
        // JPEG SOI marker.
        assert_eq!(&encoded.data[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_jpeg_path_for_rgb() {
        let tex = padded_rgb_texture();
        let encoded = process_texture(Some(&tex), None, false);
        assert_eq!(encoded.mime_type, "image/jpeg");
        assert_eq!(&encoded.data[0..2], &[0xFF, 0xD8]);
    }

    struct FakeCompressor {
        fail: bool,
    }

    impl TextureCompressor for FakeCompressor {
        fn compress_rgba_to_ktx2(&self, rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
            if self.fail {
                return Err(TilerError::codec("synthetic failure"));
            }
            assert_eq!(rgba.len(), (width * height * 4) as usize);
            Ok(b"\xABKTX 20\xBB".to_vec())
        }
    }

    #[test]
    fn test_ktx2_path_and_fallback() {
        let tex = padded_rgb_texture();

        let ok = FakeCompressor { fail: false };
        let encoded = process_texture(Some(&tex), Some(&ok), true);
        assert_eq!(encoded.mime_type, "image/ktx2");

        let failing = FakeCompressor { fail: true };
        let encoded = process_texture(Some(&tex), Some(&failing), true);
        assert_eq!(encoded.mime_type, "image/jpeg");
    }

    #[test]
    fn test_ktx2_request_without_compressor_falls_back() {
        let tex = padded_rgb_texture();
        let encoded = process_texture(Some(&tex), None, true);
        assert_eq!(encoded.mime_type, "image/jpeg");
    }
}
