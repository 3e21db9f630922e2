//! IBL precomputation tests against every available backend.
//!
//! A constant environment has a closed-form answer at every stage: the cubemap
//! and every prefilter mip keep the input radiance and the irradiance integral
//! returns it scaled by the quadrature error of the sample step.

mod common;

use common::{assert_all_close, read_cube, read_texels, small_config, Backend};
use glam::Vec4;
use pbr_renderer::backend::{TextureDimension, TextureFormat, TextureSubresource};
use pbr_renderer::ibl::{mip_resolution, mip_roughness, EnvironmentKeys, BRDF_LUT_KEY};
use pbr_renderer::resources::HdrImage;
use pbr_renderer::{IblPipeline, ResourceRegistry};
use rstest::rstest;

const RADIANCE: f32 = 0.5;

fn constant_hdr(width: u32, height: u32) -> HdrImage {
    HdrImage::constant(width, height, Vec4::new(RADIANCE, RADIANCE, RADIANCE, 1.0))
}

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_constant_environment_survives_every_stage(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let config = small_config();
    let pipeline = IblPipeline::new(device.as_mut(), config.clone()).unwrap();
    let mut registry = ResourceRegistry::new();
    let keys = EnvironmentKeys::primary("constant");

    let maps = pipeline
        .process_environment(device.as_mut(), &mut registry, &keys, &constant_hdr(2, 1))
        .unwrap();

    assert_all_close(&read_cube(device.as_mut(), maps.environment, 0), RADIANCE, 1e-2);
    // a 0.1 rad step integrates the cosine lobe to about 98%
    assert_all_close(&read_cube(device.as_mut(), maps.irradiance, 0), RADIANCE * 0.98, 1.5e-2);
    for mip in 0..config.prefilter_mip_levels {
        assert_all_close(&read_cube(device.as_mut(), maps.prefilter, mip), RADIANCE, 2e-2);
    }

    assert_eq!(device.bound_framebuffer(), None);
    pipeline.destroy(device.as_mut());
    registry.release_all(device.as_mut());
}

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_output_shapes_follow_config(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let config = small_config();
    let pipeline = IblPipeline::new(device.as_mut(), config.clone()).unwrap();
    let mut registry = ResourceRegistry::new();

    // the irradiance resolution does not depend on the source image
    for (name, width, height) in [("small", 16, 8), ("large", 64, 32)] {
        let keys = EnvironmentKeys::prefixed(name);
        let maps = pipeline
            .process_environment(device.as_mut(), &mut registry, &keys, &constant_hdr(width, height))
            .unwrap();

        let environment = device.texture_descriptor(maps.environment).unwrap().clone();
        assert_eq!(environment.dimension, TextureDimension::Cube);
        assert_eq!((environment.width, environment.format), (8, TextureFormat::Rgba16Float));

        let irradiance = device.texture_descriptor(maps.irradiance).unwrap().clone();
        assert_eq!((irradiance.width, irradiance.height), (4, 4));
        assert_eq!(irradiance.format, TextureFormat::Rgba16Float);

        let prefilter = device.texture_descriptor(maps.prefilter).unwrap().clone();
        assert_eq!(prefilter.mip_levels, config.prefilter_mip_levels);
        for mip in 0..prefilter.mip_levels {
            let size = mip_resolution(config.prefilter_size, mip);
            let texels = read_texels(
                device.as_mut(),
                maps.prefilter,
                TextureSubresource { layer: 0, mip_level: mip },
            );
            assert_eq!(texels.len(), (size * size) as usize, "mip {}", mip);
        }

        assert_eq!(registry.lookup(&keys.irradiance), Ok(maps.irradiance));
        assert_eq!(registry.lookup(&keys.prefilter), Ok(maps.prefilter));
    }
    assert_eq!(mip_roughness(config.prefilter_mip_levels - 1, config.prefilter_mip_levels), 1.0);

    pipeline.destroy(device.as_mut());
    registry.release_all(device.as_mut());
}

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_brdf_lut_is_bounded(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let pipeline = IblPipeline::new(device.as_mut(), small_config()).unwrap();
    let mut registry = ResourceRegistry::new();

    let lut = pipeline.process_brdf_lut(device.as_mut(), &mut registry).unwrap();
    assert_eq!(registry.lookup(BRDF_LUT_KEY), Ok(lut));

    let desc = device.texture_descriptor(lut).unwrap().clone();
    assert_eq!(desc.format, TextureFormat::Rg16Float);
    assert_eq!(desc.dimension, TextureDimension::D2);

    let texels = read_texels(device.as_mut(), lut, TextureSubresource::BASE);
    assert_eq!(texels.len(), 64);
    for texel in &texels {
        assert!(texel.x.is_finite() && texel.y.is_finite(), "{:?}", texel);
        assert!(texel.x >= 0.0 && texel.y >= 0.0, "{:?}", texel);
    }
    // smooth surfaces seen head-on reflect everything
    assert!(texels.iter().any(|t| (t.x + t.y - 1.0).abs() < 0.1));

    pipeline.destroy(device.as_mut());
    registry.release_all(device.as_mut());
}

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_precomputation_is_deterministic(#[case] backend: Backend) {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let Some(mut device) = backend.create() else {
            eprintln!("Backend {:?} not available, skipping", backend);
            return;
        };
        let pipeline = IblPipeline::new(device.as_mut(), small_config()).unwrap();
        let mut registry = ResourceRegistry::new();
        let mut pixels = Vec::with_capacity(32 * 16);
        for y in 0..16 {
            for x in 0..32 {
                pixels.push(Vec4::new(x as f32 / 8.0, y as f32 / 4.0, 1.0, 1.0));
            }
        }
        let hdr = HdrImage::from_pixels(32, 16, pixels).unwrap();
        let maps = pipeline
            .process_environment(device.as_mut(), &mut registry, &EnvironmentKeys::primary("gradient"), &hdr)
            .unwrap();
        runs.push((
            read_cube(device.as_mut(), maps.irradiance, 0),
            read_cube(device.as_mut(), maps.prefilter, 1),
        ));
        pipeline.destroy(device.as_mut());
        registry.release_all(device.as_mut());
    }
    // an all-zero readback would also compare equal
    let (irradiance, prefilter) = &runs[0];
    for texel in irradiance {
        assert!(texel.is_finite(), "{:?}", texel);
        assert!(texel.x > 0.0 && texel.y > 0.0 && texel.z > 0.0, "{:?}", texel);
    }
    assert!(!prefilter.is_empty());
    assert!(prefilter.iter().all(|texel| texel.w == 1.0), "{:?}", prefilter);
    assert_eq!(runs[0], runs[1]);
}

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_cube_readback_sees_uploaded_radiance(#[case] backend: Backend) {
    let Some(mut device) = backend.create() else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let pipeline = IblPipeline::new(device.as_mut(), small_config()).unwrap();
    let mut registry = ResourceRegistry::new();
    let maps = pipeline
        .process_environment(device.as_mut(), &mut registry, &EnvironmentKeys::primary("bright"), &constant_hdr(4, 2))
        .unwrap();

    // every face is covered, none reads back as cleared memory
    let environment = read_cube(device.as_mut(), maps.environment, 0);
    let face_len = environment.len() / 6;
    for (face, texels) in environment.chunks(face_len).enumerate() {
        assert!(texels.iter().any(|t| t.x > 0.0), "face {} is empty", face);
    }

    pipeline.destroy(device.as_mut());
    registry.release_all(device.as_mut());
}
