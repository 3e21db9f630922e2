//! Common utilities for backend integration tests.
//!
//! Tests are parameterized over [`Backend`] with `rstest`. The wgpu case runs
//! headless and is skipped when the machine has no adapter, or when the
//! adapter cannot read cube faces back.

use glam::Vec4;
use pbr_renderer::backend::{texels, CubeFace, GraphicsBackend, TextureHandle, TextureSubresource};
use pbr_renderer::{IblConfig, SoftwareBackend, WgpuBackend};

/// Available backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// CPU reference device.
    Software,
    /// wgpu without a window.
    Wgpu,
}

impl Backend {
    /// Create the device, or `None` when it cannot run here.
    pub fn create(self) -> Option<Box<dyn GraphicsBackend>> {
        match self {
            Backend::Software => Some(Box::new(SoftwareBackend::new(64, 64))),
            Backend::Wgpu => match WgpuBackend::new_headless(64, 64) {
                Ok(backend) if !backend.supports_cube_readback() => {
                    eprintln!("wgpu adapter cannot read back cube faces");
                    None
                }
                Ok(backend) => Some(Box::new(backend)),
                Err(e) => {
                    eprintln!("wgpu unavailable: {}", e);
                    None
                }
            },
        }
    }
}

/// Sizes small enough for the software device to convolve quickly.
pub fn small_config() -> IblConfig {
    IblConfig {
        environment_size: 8,
        irradiance_size: 4,
        prefilter_size: 8,
        prefilter_mip_levels: 3,
        brdf_lut_size: 8,
        irradiance_sample_delta: 0.1,
        prefilter_sample_count: 16,
        brdf_sample_count: 16,
    }
}

/// Read back every texel of one layer and mip.
pub fn read_texels(backend: &mut dyn GraphicsBackend, texture: TextureHandle, sub: TextureSubresource) -> Vec<Vec4> {
    let format = backend.texture_descriptor(texture).expect("live texture").format;
    let bytes = backend.read_texture(texture, sub).expect("readback");
    texels::decode(format, &bytes)
}

/// Texels of all six faces of a cubemap mip, in face order.
pub fn read_cube(backend: &mut dyn GraphicsBackend, texture: TextureHandle, mip_level: u32) -> Vec<Vec4> {
    CubeFace::ALL
        .into_iter()
        .flat_map(|face| read_texels(backend, texture, TextureSubresource::face(face, mip_level)))
        .collect()
}

/// Assert the rgb channels of every texel are within `tolerance` of `expected`.
pub fn assert_all_close(texels: &[Vec4], expected: f32, tolerance: f32) {
    assert!(!texels.is_empty());
    for (i, texel) in texels.iter().enumerate() {
        for channel in [texel.x, texel.y, texel.z] {
            assert!(
                (channel - expected).abs() <= tolerance,
                "texel {} is {:?}, expected {} ± {}",
                i,
                texel,
                expected,
                tolerance
            );
        }
    }
}
