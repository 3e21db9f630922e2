//! Per-frame scene rendering
//!
//! Every frame pushes the camera and light uniforms into the lit programs,
//! binds the active environment, runs the selected demo draw path and
//! finishes with the skybox. Missing textures fall back to placeholders and
//! missing models are skipped, so a frame never fails over an absent asset.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::ibl::{EnvironmentKeys, BRDF_LUT_KEY};
use crate::resources::{geometry, BackendResource, GpuMesh, GpuModel, Placeholders, ResourceRegistry};
use crate::scene::{normal_matrix, sphere_grid, DemoSelection, LightRig, SceneState};
use crate::shaders::{units, ProgramKind};
use glam::{Mat4, Vec3};
use std::collections::HashSet;

pub const CLEAR_COLOR: [f32; 4] = [0.2, 0.3, 0.3, 1.0];

/// Texture and model tables shared by the loaders, the IBL pipeline and the renderer
#[derive(Debug, Default)]
pub struct SceneResources {
    pub textures: ResourceRegistry<TextureHandle>,
    pub models: ResourceRegistry<GpuModel>,
}

impl SceneResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release_all<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) {
        self.textures.release_all(backend);
        self.models.release_all(backend);
    }
}

/// Which placeholder stands in for a missing map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fallback {
    White,
    Black,
    FlatNormal,
    BlackCube,
}

/// Map slot of a material: registry suffix, texture unit and fallback
type MapSlot = (&'static str, u32, Fallback);

const SPHERE_MAPS: [MapSlot; 5] = [
    ("albedo_map", units::ALBEDO, Fallback::White),
    ("ao_map", units::AO, Fallback::White),
    ("metallic_map", units::METALLIC, Fallback::Black),
    ("normal_map", units::NORMAL, Fallback::FlatNormal),
    ("roughness_map", units::ROUGHNESS, Fallback::White),
];

const MODEL_MAPS: [MapSlot; 3] = [
    ("albedo_map", units::ALBEDO, Fallback::White),
    ("arm_map", units::ARM, Fallback::White),
    ("normal_map", units::NORMAL, Fallback::FlatNormal),
];

struct ScenePrograms {
    pbr: ProgramHandle,
    pbr_model: ProgramHandle,
    sphere: ProgramHandle,
    background: ProgramHandle,
}

impl ScenePrograms {
    fn lit(&self) -> [ProgramHandle; 3] {
        [self.pbr, self.pbr_model, self.sphere]
    }

    fn all(&self) -> [ProgramHandle; 4] {
        [self.pbr, self.pbr_model, self.sphere, self.background]
    }
}

pub struct SceneRenderer {
    programs: ScenePrograms,
    sphere: GpuMesh,
    skybox: GpuMesh,
    placeholders: Placeholders,
    environments: Vec<EnvironmentKeys>,
    active_environment: usize,
    warned: HashSet<String>,
}

impl SceneRenderer {
    pub fn new<B: GraphicsBackend + ?Sized>(backend: &mut B) -> BackendResult<Self> {
        let mut programs = Vec::with_capacity(4);
        for kind in [
            ProgramKind::Pbr,
            ProgramKind::PbrModel,
            ProgramKind::SphereGrid,
            ProgramKind::Background,
        ] {
            match backend.create_program(kind.descriptor()) {
                Ok(program) => programs.push(program),
                Err(e) => {
                    for program in programs {
                        backend.destroy_program(program);
                    }
                    return Err(e);
                }
            }
        }
        let programs = ScenePrograms {
            pbr: programs[0],
            pbr_model: programs[1],
            sphere: programs[2],
            background: programs[3],
        };

        let sphere = GpuMesh::from_mesh(backend, &geometry::uv_sphere(geometry::SPHERE_SEGMENTS, geometry::SPHERE_SEGMENTS))?;
        let positions = geometry::skybox_cube();
        let skybox = GpuMesh::upload(
            backend,
            "skybox",
            bytemuck::cast_slice(&positions),
            position_layout(),
            &[],
            PrimitiveTopology::TriangleList,
        )?;
        let placeholders = Placeholders::create(backend)?;

        log::info!("Scene renderer ready on {}", backend.name());
        Ok(Self {
            programs,
            sphere,
            skybox,
            placeholders,
            environments: Vec::new(),
            active_environment: 0,
            warned: HashSet::new(),
        })
    }

    /// Make a processed environment selectable. The first one added is active.
    pub fn add_environment(&mut self, keys: EnvironmentKeys) {
        if let Some(existing) = self.environments.iter_mut().find(|e| e.name == keys.name) {
            *existing = keys;
        } else {
            self.environments.push(keys);
        }
    }

    pub fn environment_names(&self) -> Vec<&str> {
        self.environments.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn active_environment(&self) -> Option<&EnvironmentKeys> {
        self.environments.get(self.active_environment)
    }

    /// Switch to the environment called `name`. Returns false for an unknown name.
    pub fn set_active_environment(&mut self, name: &str) -> bool {
        match self.environments.iter().position(|e| e.name == name) {
            Some(index) => {
                if index != self.active_environment {
                    log::info!("Active environment: {}", name);
                }
                self.active_environment = index;
                true
            }
            None => {
                log::warn!("Unknown environment '{}'", name);
                false
            }
        }
    }

    /// Draw one frame into the default framebuffer.
    pub fn render<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        resources: &SceneResources,
        state: &SceneState,
    ) -> BackendResult<()> {
        let (width, height) = backend.surface_size();
        backend.bind_framebuffer(None)?;
        backend.set_viewport(width, height);
        backend.clear(CLEAR_COLOR)?;

        let view = state.camera.view_matrix();
        let projection = state.camera.projection_matrix();
        for program in self.programs.lit() {
            Self::set_lighting(backend, program, &state.lights, state.camera.position, view, projection)?;
        }
        self.bind_environment(backend, resources)?;

        let model = state.model_matrix();
        match state.demo {
            DemoSelection::Sphere => self.draw_sphere(backend, resources, "gold", model)?,
            DemoSelection::Spheres => self.draw_sphere_grid(backend)?,
            DemoSelection::Model => self.draw_model(backend, resources, "rat", model)?,
            DemoSelection::TexturedSpheres => {
                let [gold, iron] = state.textured_sphere_transforms();
                self.draw_sphere(backend, resources, "gold", gold)?;
                self.draw_sphere(backend, resources, "rusted_iron", iron)?;
            }
            DemoSelection::Scene => {
                let [chair, rat, bust] = state.scene_transforms();
                self.draw_model(backend, resources, "chair", chair)?;
                self.draw_model(backend, resources, "rat", rat)?;
                self.draw_model(backend, resources, "marble_bust", bust)?;
            }
            DemoSelection::Nothing => {}
        }

        let background = self.programs.background;
        backend.set_uniform(background, "view", state.camera.rotation_only_view().into())?;
        backend.set_uniform(background, "projection", projection.into())?;
        self.skybox.draw(backend, background, DepthState::SKYBOX)
    }

    pub fn destroy<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for program in self.programs.all() {
            backend.destroy_program(program);
        }
        self.sphere.release(backend);
        self.skybox.release(backend);
        self.placeholders.release(backend);
    }

    fn set_lighting<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        program: ProgramHandle,
        lights: &LightRig,
        view_pos: Vec3,
        view: Mat4,
        projection: Mat4,
    ) -> BackendResult<()> {
        backend.set_uniform(program, "light.direction", lights.light.direction.into())?;
        backend.set_uniform(program, "light.ambient", lights.light.ambient.into())?;
        backend.set_uniform(program, "light.diffuse", lights.light.diffuse.into())?;
        backend.set_uniform(program, "light.specular", lights.light.specular.into())?;
        backend.set_uniform(program, "light.isDirLight", true.into())?;
        for (name, direction) in LightRig::DIRECTION_UNIFORMS.iter().zip(lights.directions) {
            backend.set_uniform(program, name, direction.into())?;
        }
        backend.set_uniform(program, "viewPos", view_pos.into())?;
        backend.set_uniform(program, "view", view.into())?;
        backend.set_uniform(program, "projection", projection.into())
    }

    fn bind_environment<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        resources: &SceneResources,
    ) -> BackendResult<()> {
        let keys = self.environments.get(self.active_environment).cloned();
        let slots = [
            (keys.as_ref().map(|k| k.environment.as_str()), units::ENVIRONMENT),
            (keys.as_ref().map(|k| k.irradiance.as_str()), units::IRRADIANCE),
            (keys.as_ref().map(|k| k.prefilter.as_str()), units::PREFILTER),
        ];
        for (key, unit) in slots {
            let texture = match key {
                Some(key) => self.texture_or(resources, key, Fallback::BlackCube),
                None => self.placeholders.black_cube,
            };
            backend.bind_texture(unit, texture)?;
        }
        let lut = self.texture_or(resources, BRDF_LUT_KEY, Fallback::Black);
        backend.bind_texture(units::BRDF_LUT, lut)
    }

    fn bind_material<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        resources: &SceneResources,
        material: &str,
        maps: &[MapSlot],
    ) -> BackendResult<()> {
        for (suffix, unit, fallback) in maps {
            let key = format!("{}/{}", material, suffix);
            let texture = self.texture_or(resources, &key, *fallback);
            backend.bind_texture(*unit, texture)?;
        }
        Ok(())
    }

    fn draw_sphere<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        resources: &SceneResources,
        material: &str,
        model: Mat4,
    ) -> BackendResult<()> {
        let program = self.programs.pbr;
        self.bind_material(backend, resources, material, &SPHERE_MAPS)?;
        Self::set_transform(backend, program, model)?;
        self.sphere.draw(backend, program, DepthState::default())
    }

    fn draw_sphere_grid<B: GraphicsBackend + ?Sized>(&mut self, backend: &mut B) -> BackendResult<()> {
        let program = self.programs.sphere;
        for sphere in sphere_grid() {
            Self::set_transform(backend, program, sphere.model)?;
            backend.set_uniform(program, "color", sphere.color.into())?;
            backend.set_uniform(program, "roughness", sphere.roughness.into())?;
            backend.set_uniform(program, "metallic", sphere.metallic.into())?;
            self.sphere.draw(backend, program, DepthState::default())?;
        }
        Ok(())
    }

    fn draw_model<B: GraphicsBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        resources: &SceneResources,
        name: &str,
        model: Mat4,
    ) -> BackendResult<()> {
        let Ok(gpu_model) = resources.models.get(name) else {
            self.warn_once(name, "model not loaded, skipping its draw");
            return Ok(());
        };
        let program = self.programs.pbr_model;
        self.bind_material(backend, resources, name, &MODEL_MAPS)?;
        Self::set_transform(backend, program, model)?;
        gpu_model.draw(backend, program, DepthState::default())
    }

    fn set_transform<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        program: ProgramHandle,
        model: Mat4,
    ) -> BackendResult<()> {
        backend.set_uniform(program, "model", model.into())?;
        backend.set_uniform(program, "normalMatrix", normal_matrix(model).into())
    }

    fn texture_or(&mut self, resources: &SceneResources, key: &str, fallback: Fallback) -> TextureHandle {
        match resources.textures.lookup(key) {
            Ok(texture) => texture,
            Err(_) => {
                self.warn_once(key, "texture missing, using a placeholder");
                match fallback {
                    Fallback::White => self.placeholders.white,
                    Fallback::Black => self.placeholders.black,
                    Fallback::FlatNormal => self.placeholders.flat_normal,
                    Fallback::BlackCube => self.placeholders.black_cube,
                }
            }
        }
    }

    fn warn_once(&mut self, key: &str, message: &str) {
        if self.warned.insert(key.to_string()) {
            log::warn!("'{}': {}", key, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RecordedCommand, SoftwareBackend};

    fn draws(backend: &SoftwareBackend) -> Vec<&'static str> {
        backend
            .commands()
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::Draw { program, .. } => Some(*program),
                _ => None,
            })
            .collect()
    }

    fn frame(demo: DemoSelection) -> (SoftwareBackend, SceneRenderer) {
        let mut backend = SoftwareBackend::new(64, 36);
        let mut renderer = SceneRenderer::new(&mut backend).unwrap();
        let resources = SceneResources::new();
        let state = SceneState {
            demo,
            ..SceneState::default()
        };
        backend.take_commands();
        renderer.render(&mut backend, &resources, &state).unwrap();
        (backend, renderer)
    }

    #[test]
    fn test_sphere_frame_draws_sphere_then_skybox() {
        let (backend, _) = frame(DemoSelection::Sphere);
        assert_eq!(draws(&backend), vec!["pbr", "background"]);
        assert!(matches!(
            backend.commands()[0],
            RecordedCommand::Clear { framebuffer: None, color } if color == CLEAR_COLOR
        ));
    }

    #[test]
    fn test_grid_draws_49_spheres() {
        let (backend, _) = frame(DemoSelection::Spheres);
        let draws = draws(&backend);
        assert_eq!(draws.iter().filter(|p| **p == "sphere").count(), 49);
        assert_eq!(draws.last(), Some(&"background"));
    }

    #[test]
    fn test_missing_models_are_skipped() {
        let (backend, renderer) = frame(DemoSelection::Scene);
        assert_eq!(draws(&backend), vec!["background"]);
        assert!(renderer.warned.contains("chair"));
        assert!(renderer.warned.contains("marble_bust"));
    }

    #[test]
    fn test_nothing_still_draws_skybox() {
        let (backend, _) = frame(DemoSelection::Nothing);
        assert_eq!(draws(&backend), vec!["background"]);
    }

    #[test]
    fn test_missing_maps_bind_placeholders() {
        let (backend, renderer) = frame(DemoSelection::Sphere);
        assert_eq!(backend.texture_unit(units::ALBEDO), Some(renderer.placeholders.white));
        assert_eq!(backend.texture_unit(units::METALLIC), Some(renderer.placeholders.black));
        assert_eq!(backend.texture_unit(units::NORMAL), Some(renderer.placeholders.flat_normal));
        assert_eq!(backend.texture_unit(units::IRRADIANCE), Some(renderer.placeholders.black_cube));
        assert!(renderer.warned.contains("gold/albedo_map"));
    }

    #[test]
    fn test_registered_environment_is_bound() {
        let mut backend = SoftwareBackend::new(16, 16);
        let mut renderer = SceneRenderer::new(&mut backend).unwrap();
        let mut resources = SceneResources::new();

        let register_cube = |key: &str, resources: &mut SceneResources, backend: &mut SoftwareBackend| {
            let texture = backend
                .create_texture(&TextureDescriptor::cube(key, 1, 1, TextureFormat::Rgba16Float))
                .unwrap();
            resources.textures.register(key, texture);
            texture
        };
        let primary = EnvironmentKeys::primary("newport_loft");
        let golden = EnvironmentKeys::prefixed("golden_bay");
        let primary_irradiance = register_cube(primary.irradiance.as_str(), &mut resources, &mut backend);
        let golden_irradiance = register_cube(golden.irradiance.as_str(), &mut resources, &mut backend);
        renderer.add_environment(primary);
        renderer.add_environment(golden);
        assert_eq!(renderer.environment_names(), vec!["newport_loft", "golden_bay"]);

        let state = SceneState::default();
        renderer.render(&mut backend, &resources, &state).unwrap();
        assert_eq!(backend.texture_unit(units::IRRADIANCE), Some(primary_irradiance));

        assert!(renderer.set_active_environment("golden_bay"));
        renderer.render(&mut backend, &resources, &state).unwrap();
        assert_eq!(backend.texture_unit(units::IRRADIANCE), Some(golden_irradiance));
        assert!(!renderer.set_active_environment("missing"));
        assert_eq!(renderer.active_environment().unwrap().name, "golden_bay");
    }

    #[test]
    fn test_skybox_uses_rotation_only_view() {
        let mut backend = SoftwareBackend::new(16, 16);
        let mut renderer = SceneRenderer::new(&mut backend).unwrap();
        let mut state = SceneState::default();
        state.camera.position = Vec3::new(3.0, 1.0, 9.0);
        renderer.render(&mut backend, &SceneResources::new(), &state).unwrap();

        let expected = state.camera.rotation_only_view();
        assert_eq!(
            backend.uniform(renderer.programs.background, "view"),
            Some(UniformValue::Mat4(expected))
        );
        assert_eq!(
            backend.uniform(renderer.programs.pbr, "viewPos"),
            Some(UniformValue::Vec3(state.camera.position))
        );
    }
}
