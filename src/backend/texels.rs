//! Conversion between packed texel bytes and floating point texels
//!
//! Unorm formats are converted without any sRGB transfer: the values are the
//! stored encoding. Two-channel formats decode with blue 0 and alpha 1.

use glam::Vec4;
use half::f16;

use crate::backend::types::TextureFormat;

/// Decode tightly packed texels of the given format.
pub fn decode(format: TextureFormat, bytes: &[u8]) -> Vec<Vec4> {
    let stride = format.bytes_per_pixel() as usize;
    bytes
        .chunks_exact(stride)
        .map(|texel| decode_one(format, texel))
        .collect()
}

fn half_at(bytes: &[u8], index: usize) -> f32 {
    f16::from_le_bytes([bytes[index * 2], bytes[index * 2 + 1]]).to_f32()
}

fn float_at(bytes: &[u8], index: usize) -> f32 {
    let at = index * 4;
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn decode_one(format: TextureFormat, texel: &[u8]) -> Vec4 {
    let unorm = |b: u8| b as f32 / 255.0;
    match format {
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => Vec4::new(
            unorm(texel[0]),
            unorm(texel[1]),
            unorm(texel[2]),
            unorm(texel[3]),
        ),
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => Vec4::new(
            unorm(texel[2]),
            unorm(texel[1]),
            unorm(texel[0]),
            unorm(texel[3]),
        ),
        TextureFormat::Rgba16Float => Vec4::new(
            half_at(texel, 0),
            half_at(texel, 1),
            half_at(texel, 2),
            half_at(texel, 3),
        ),
        TextureFormat::Rg16Float => Vec4::new(half_at(texel, 0), half_at(texel, 1), 0.0, 1.0),
        TextureFormat::Rgba32Float => Vec4::new(
            float_at(texel, 0),
            float_at(texel, 1),
            float_at(texel, 2),
            float_at(texel, 3),
        ),
        TextureFormat::Depth32Float => Vec4::new(float_at(texel, 0), 0.0, 0.0, 1.0),
    }
}

/// Encode texels into the packed layout of the given format.
pub fn encode(format: TextureFormat, texels: &[Vec4]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(texels.len() * format.bytes_per_pixel() as usize);
    let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    for texel in texels {
        match format {
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => {
                bytes.extend([unorm(texel.x), unorm(texel.y), unorm(texel.z), unorm(texel.w)]);
            }
            TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => {
                bytes.extend([unorm(texel.z), unorm(texel.y), unorm(texel.x), unorm(texel.w)]);
            }
            TextureFormat::Rgba16Float => {
                for v in texel.to_array() {
                    bytes.extend(f16::from_f32(v).to_le_bytes());
                }
            }
            TextureFormat::Rg16Float => {
                bytes.extend(f16::from_f32(texel.x).to_le_bytes());
                bytes.extend(f16::from_f32(texel.y).to_le_bytes());
            }
            TextureFormat::Rgba32Float => {
                for v in texel.to_array() {
                    bytes.extend(v.to_le_bytes());
                }
            }
            TextureFormat::Depth32Float => bytes.extend(texel.x.to_le_bytes()),
        }
    }
    bytes
}

/// Round a texel to the precision the format stores.
pub fn quantize(format: TextureFormat, texel: Vec4) -> Vec4 {
    decode_one(format, &encode(format, &[texel]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_float_precision() {
        let texel = Vec4::new(1.0 / 3.0, 100.25, -2.0, 1.0);
        let stored = quantize(TextureFormat::Rgba16Float, texel);
        assert!((stored - texel).abs().max_element() < 0.05);
        assert_eq!(stored.z, -2.0);
        assert_eq!(encode(TextureFormat::Rgba16Float, &[texel]).len(), 8);
    }

    #[test]
    fn test_two_channel_formats_fill_blue_and_alpha() {
        let stored = quantize(TextureFormat::Rg16Float, Vec4::new(0.5, 0.25, 0.9, 0.1));
        assert_eq!(stored, Vec4::new(0.5, 0.25, 0.0, 1.0));
    }

    #[test]
    fn test_bgra_swaps_red_and_blue() {
        let bytes = encode(TextureFormat::Bgra8Unorm, &[Vec4::new(1.0, 0.0, 0.0, 1.0)]);
        assert_eq!(bytes, vec![0, 0, 255, 255]);
        assert_eq!(decode(TextureFormat::Bgra8Unorm, &bytes)[0], Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_unorm_clamps_out_of_range() {
        let stored = quantize(TextureFormat::Rgba8Unorm, Vec4::new(2.0, -1.0, 0.5, 1.0));
        assert_eq!(stored.x, 1.0);
        assert_eq!(stored.y, 0.0);
        assert!((stored.z - 128.0 / 255.0).abs() < 1e-6);
    }
}
