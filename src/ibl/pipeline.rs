use super::capture::{CaptureScope, ViewSet};
use super::{EnvironmentKeys, IblConfig, IblMaps, IblResult, BRDF_LUT_KEY};
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::{geometry, BackendResource, GpuMesh, HdrImage, ResourceRegistry};
use crate::shaders::ProgramKind;

/// Side length of mip `mip` of a `base` sized texture, clamped to 1.
pub fn mip_resolution(base: u32, mip: u32) -> u32 {
    (base >> mip.min(31)).max(1)
}

/// Roughness a prefilter mip level encodes, from 0 at the base to 1 at the last level.
pub fn mip_roughness(mip: u32, levels: u32) -> f32 {
    if levels <= 1 {
        0.0
    } else {
        mip as f32 / (levels - 1) as f32
    }
}

struct CapturePrograms {
    equirect: ProgramHandle,
    irradiance: ProgramHandle,
    prefilter: ProgramHandle,
    brdf: ProgramHandle,
}

impl CapturePrograms {
    fn create<B: GraphicsBackend + ?Sized>(backend: &mut B) -> BackendResult<Self> {
        let mut created = Vec::with_capacity(4);
        for kind in [
            ProgramKind::EquirectToCubemap,
            ProgramKind::Irradiance,
            ProgramKind::Prefilter,
            ProgramKind::BrdfIntegration,
        ] {
            match backend.create_program(kind.descriptor()) {
                Ok(program) => created.push(program),
                Err(e) => {
                    for program in created {
                        backend.destroy_program(program);
                    }
                    return Err(e);
                }
            }
        }
        Ok(Self {
            equirect: created[0],
            irradiance: created[1],
            prefilter: created[2],
            brdf: created[3],
        })
    }

    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for program in [self.equirect, self.irradiance, self.prefilter, self.brdf] {
            backend.destroy_program(program);
        }
    }
}

/// Programs and geometry shared by every precomputation stage.
///
/// Stages register their outputs in the texture registry, releasing whatever
/// was registered under the same key before. A failed stage leaves the
/// registry as it found it.
pub struct IblPipeline {
    config: IblConfig,
    views: ViewSet,
    programs: CapturePrograms,
    cube: GpuMesh,
    quad: GpuMesh,
}

impl IblPipeline {
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B, config: IblConfig) -> IblResult<Self> {
        config.validate()?;

        let programs = CapturePrograms::create(backend)?;
        let positions = geometry::skybox_cube();
        let cube = match GpuMesh::upload(
            backend,
            "capture cube",
            bytemuck::cast_slice(&positions),
            position_layout(),
            &[],
            PrimitiveTopology::TriangleList,
        ) {
            Ok(cube) => cube,
            Err(e) => {
                programs.release(backend);
                return Err(e.into());
            }
        };
        let quad_vertices = geometry::quad();
        let quad = match GpuMesh::upload(
            backend,
            "capture quad",
            bytemuck::cast_slice(&quad_vertices),
            QuadVertex::layout(),
            &[],
            PrimitiveTopology::TriangleStrip,
        ) {
            Ok(quad) => quad,
            Err(e) => {
                cube.release(backend);
                programs.release(backend);
                return Err(e.into());
            }
        };

        log::debug!("IBL pipeline ready on {}: {:?}", backend.name(), config);
        Ok(Self {
            config,
            views: ViewSet::standard(),
            programs,
            cube,
            quad,
        })
    }

    pub fn config(&self) -> &IblConfig {
        &self.config
    }

    /// Project an equirectangular texture onto a new environment cubemap.
    pub fn equirect_to_cubemap<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ResourceRegistry<TextureHandle>,
        key: &str,
        hdr_texture: TextureHandle,
    ) -> IblResult<TextureHandle> {
        let program = self.programs.equirect;
        let size = self.config.environment_size;
        let target = backend.create_texture(&TextureDescriptor::cube(key, size, 1, TextureFormat::Rgba16Float))?;

        let result = (|| -> BackendResult<()> {
            backend.set_uniform(program, "equirectangularMap", UniformValue::Int(0))?;
            backend.set_uniform(program, "projection", UniformValue::Mat4(self.views.projection))?;
            backend.bind_texture(0, hdr_texture)?;
            let mut scope = CaptureScope::begin(backend, size, size)?;
            scope.capture_cube(program, &self.cube, &self.views, target, 0)
        })();
        self.finish(backend, registry, key, target, result)
    }

    /// Convolve an environment cubemap over the hemisphere into a diffuse irradiance cubemap.
    pub fn irradiance_map<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ResourceRegistry<TextureHandle>,
        key: &str,
        environment: TextureHandle,
    ) -> IblResult<TextureHandle> {
        let program = self.programs.irradiance;
        let size = self.config.irradiance_size;
        let target = backend.create_texture(&TextureDescriptor::cube(key, size, 1, TextureFormat::Rgba16Float))?;

        let result = (|| -> BackendResult<()> {
            backend.set_uniform(program, "environmentMap", UniformValue::Int(0))?;
            backend.set_uniform(program, "projection", UniformValue::Mat4(self.views.projection))?;
            backend.set_uniform(program, "sampleDelta", UniformValue::Float(self.config.irradiance_sample_delta))?;
            backend.bind_texture(0, environment)?;
            let mut scope = CaptureScope::begin(backend, size, size)?;
            scope.capture_cube(program, &self.cube, &self.views, target, 0)
        })();
        self.finish(backend, registry, key, target, result)
    }

    /// Prefilter an environment cubemap for increasing roughness, one mip level each.
    pub fn prefilter_map<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ResourceRegistry<TextureHandle>,
        key: &str,
        environment: TextureHandle,
    ) -> IblResult<TextureHandle> {
        let program = self.programs.prefilter;
        let size = self.config.prefilter_size;
        let levels = self.config.prefilter_mip_levels;
        let target = backend.create_texture(&TextureDescriptor::cube(key, size, levels, TextureFormat::Rgba16Float))?;

        let result = (|| -> BackendResult<()> {
            backend.set_uniform(program, "environmentMap", UniformValue::Int(0))?;
            backend.set_uniform(program, "projection", UniformValue::Mat4(self.views.projection))?;
            backend.set_uniform(
                program,
                "sampleCount",
                UniformValue::Int(self.config.prefilter_sample_count as i32),
            )?;
            backend.bind_texture(0, environment)?;
            let mut scope = CaptureScope::begin(backend, size, size)?;
            for mip in 0..levels {
                let mip_size = mip_resolution(size, mip);
                let roughness = mip_roughness(mip, levels);
                scope.resize(mip_size, mip_size)?;
                scope
                    .backend()
                    .set_uniform(program, "roughness", UniformValue::Float(roughness))?;
                scope.capture_cube(program, &self.cube, &self.views, target, mip)?;
                log::debug!("Prefiltered mip {} ({}x{}, roughness {:.2})", mip, mip_size, mip_size, roughness);
            }
            Ok(())
        })();
        self.finish(backend, registry, key, target, result)
    }

    /// Integrate the split-sum BRDF into a two-channel lookup table.
    pub fn brdf_lut<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ResourceRegistry<TextureHandle>,
        key: &str,
    ) -> IblResult<TextureHandle> {
        let program = self.programs.brdf;
        let size = self.config.brdf_lut_size;
        let target = backend.create_texture(&TextureDescriptor {
            usage: TextureUsage::CAPTURE_TARGET,
            ..TextureDescriptor::sampled_2d(key, size, size, TextureFormat::Rg16Float)
        })?;

        let result = (|| -> BackendResult<()> {
            backend.set_uniform(program, "sampleCount", UniformValue::Int(self.config.brdf_sample_count as i32))?;
            let mut scope = CaptureScope::begin(backend, size, size)?;
            scope.capture_quad(program, &self.quad, target)
        })();
        self.finish(backend, registry, key, target, result)
    }

    /// Upload `hdr` and derive its environment, irradiance and prefilter maps.
    pub fn process_environment<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ResourceRegistry<TextureHandle>,
        keys: &EnvironmentKeys,
        hdr: &HdrImage,
    ) -> IblResult<IblMaps> {
        log::info!(
            "Processing environment '{}' ({}x{} HDR)",
            keys.name,
            hdr.width,
            hdr.height
        );
        let hdr_texture = hdr.upload(backend, &keys.hdr_texture)?;
        registry.register_releasing(backend, keys.hdr_texture.as_str(), hdr_texture);

        let environment = self.equirect_to_cubemap(backend, registry, &keys.environment, hdr_texture)?;
        let irradiance = self.irradiance_map(backend, registry, &keys.irradiance, environment)?;
        let prefilter = self.prefilter_map(backend, registry, &keys.prefilter, environment)?;
        // leave no capture source bound
        backend.bind_texture(0, TextureHandle::UNSET)?;

        log::info!("Environment '{}' ready", keys.name);
        Ok(IblMaps {
            hdr_texture,
            environment,
            irradiance,
            prefilter,
        })
    }

    /// Compute the lookup table under [`BRDF_LUT_KEY`].
    pub fn process_brdf_lut<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ResourceRegistry<TextureHandle>,
    ) -> IblResult<TextureHandle> {
        let lut = self.brdf_lut(backend, registry, BRDF_LUT_KEY)?;
        log::info!("BRDF lookup table ready ({0}x{0})", self.config.brdf_lut_size);
        Ok(lut)
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        self.programs.release(backend);
        self.cube.release(backend);
        self.quad.release(backend);
    }

    fn finish<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        registry: &mut ResourceRegistry<TextureHandle>,
        key: &str,
        target: TextureHandle,
        result: BackendResult<()>,
    ) -> IblResult<TextureHandle> {
        match result {
            Ok(()) => {
                registry.register_releasing(backend, key, target);
                Ok(target)
            }
            Err(e) => {
                log::error!("Failed to compute '{}': {}", key, e);
                backend.destroy_texture(target);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{texels, SoftwareBackend};
    use glam::Vec4;

    fn small_config() -> IblConfig {
        IblConfig {
            environment_size: 8,
            irradiance_size: 4,
            prefilter_size: 8,
            prefilter_mip_levels: 3,
            brdf_lut_size: 8,
            irradiance_sample_delta: 0.5,
            prefilter_sample_count: 16,
            brdf_sample_count: 16,
        }
    }

    #[test]
    fn test_mip_resolution_and_roughness() {
        let sizes: Vec<u32> = (0..5).map(|m| mip_resolution(128, m)).collect();
        assert_eq!(sizes, vec![128, 64, 32, 16, 8]);
        assert_eq!(mip_resolution(2, 4), 1);

        let roughness: Vec<f32> = (0..5).map(|m| mip_roughness(m, 5)).collect();
        assert_eq!(roughness, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(mip_roughness(0, 1), 0.0);
    }

    #[test]
    fn test_invalid_config_is_rejected_before_allocating() {
        let mut backend = SoftwareBackend::new(4, 4);
        let config = IblConfig {
            environment_size: 0,
            ..small_config()
        };
        assert!(IblPipeline::new(&mut backend, config).is_err());
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_process_environment_registers_maps() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut registry = ResourceRegistry::new();
        let pipeline = IblPipeline::new(&mut backend, small_config()).unwrap();
        let keys = EnvironmentKeys::primary("constant");
        let hdr = HdrImage::constant(16, 8, Vec4::new(0.5, 0.5, 0.5, 1.0));

        let maps = pipeline.process_environment(&mut backend, &mut registry, &keys, &hdr).unwrap();
        assert_eq!(registry.lookup("irradiance_map"), Ok(maps.irradiance));
        assert_eq!(registry.lookup("prefilter_map"), Ok(maps.prefilter));
        assert_eq!(registry.lookup("hdr_cube_map"), Ok(maps.environment));
        assert_eq!(registry.lookup("hdr_texture"), Ok(maps.hdr_texture));

        let irradiance = backend.texture_descriptor(maps.irradiance).unwrap();
        assert_eq!((irradiance.width, irradiance.dimension), (4, TextureDimension::Cube));
        let prefilter = backend.texture_descriptor(maps.prefilter).unwrap();
        assert_eq!(prefilter.mip_levels, 3);
        assert_eq!(backend.bound_framebuffer(), None);
        assert_eq!(backend.live_framebuffers(), 0);
        assert_eq!(backend.live_renderbuffers(), 0);

        // a constant environment stays constant through the projection
        let bytes = backend
            .read_texture(maps.environment, TextureSubresource::face(CubeFace::PositiveY, 0))
            .unwrap();
        for texel in texels::decode(TextureFormat::Rgba16Float, &bytes) {
            assert!((texel.x - 0.5).abs() < 1e-2, "{:?}", texel);
        }
    }

    #[test]
    fn test_reprocessing_releases_previous_maps() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut registry = ResourceRegistry::new();
        let pipeline = IblPipeline::new(&mut backend, small_config()).unwrap();
        let keys = EnvironmentKeys::prefixed("golden_bay");
        let hdr = HdrImage::constant(8, 4, Vec4::ONE);

        let first = pipeline.process_environment(&mut backend, &mut registry, &keys, &hdr).unwrap();
        let live = backend.live_textures();
        let second = pipeline.process_environment(&mut backend, &mut registry, &keys, &hdr).unwrap();
        assert_eq!(backend.live_textures(), live);
        assert!(backend.texture_descriptor(first.irradiance).is_none());
        assert_eq!(registry.lookup("golden_bay/irradiance_map"), Ok(second.irradiance));
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_brdf_lut_is_two_channel() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut registry = ResourceRegistry::new();
        let pipeline = IblPipeline::new(&mut backend, small_config()).unwrap();
        let lut = pipeline.process_brdf_lut(&mut backend, &mut registry).unwrap();
        let desc = backend.texture_descriptor(lut).unwrap();
        assert_eq!(desc.format, TextureFormat::Rg16Float);
        assert_eq!((desc.width, desc.height), (8, 8));
        assert_eq!(registry.lookup(BRDF_LUT_KEY), Ok(lut));
    }

    #[test]
    fn test_failed_stage_destroys_its_target() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut registry = ResourceRegistry::new();
        let pipeline = IblPipeline::new(&mut backend, small_config()).unwrap();
        let baseline = backend.live_textures();

        // a 2D texture bound where the irradiance pass expects a cubemap
        let flat = HdrImage::constant(4, 4, Vec4::ONE).upload(&mut backend, "flat").unwrap();
        let result = pipeline.irradiance_map(&mut backend, &mut registry, "irradiance_map", flat);
        assert!(result.is_err());
        assert!(!registry.contains("irradiance_map"));
        assert_eq!(backend.live_textures(), baseline + 1);
        assert_eq!(backend.bound_framebuffer(), None);

        pipeline.destroy(&mut backend);
    }
}
