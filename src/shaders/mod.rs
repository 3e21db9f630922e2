//! Built-in shading programs
//!
//! Every program is a WGSL module plus the uniform and sampler declarations a
//! backend needs to lay out its bindings. Uniform names are the ones callers
//! pass to `set_uniform`; they do not have to match the WGSL member names, only
//! their order does.

mod capture;
mod lit;

pub use capture::{BRDF_SHADER, EQUIRECT_TO_CUBEMAP_SHADER, IRRADIANCE_SHADER, PREFILTER_SHADER};
pub use lit::{BACKGROUND_SHADER, PBR_MODEL_SHADER, PBR_SHADER, SPHERE_SHADER};

use crate::backend::types::{
    AddressMode, ProgramDescriptor, SamplerDecl, TextureDimension, UniformDecl, UniformType,
};

/// Identifies a built-in program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    EquirectToCubemap,
    Irradiance,
    Prefilter,
    BrdfIntegration,
    Background,
    Pbr,
    PbrModel,
    SphereGrid,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 8] = [
        ProgramKind::EquirectToCubemap,
        ProgramKind::Irradiance,
        ProgramKind::Prefilter,
        ProgramKind::BrdfIntegration,
        ProgramKind::Background,
        ProgramKind::Pbr,
        ProgramKind::PbrModel,
        ProgramKind::SphereGrid,
    ];

    pub fn descriptor(&self) -> &'static ProgramDescriptor {
        match self {
            ProgramKind::EquirectToCubemap => &EQUIRECT_TO_CUBEMAP,
            ProgramKind::Irradiance => &IRRADIANCE,
            ProgramKind::Prefilter => &PREFILTER,
            ProgramKind::BrdfIntegration => &BRDF_INTEGRATION,
            ProgramKind::Background => &BACKGROUND,
            ProgramKind::Pbr => &PBR,
            ProgramKind::PbrModel => &PBR_MODEL,
            ProgramKind::SphereGrid => &SPHERE_GRID,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }
}

/// Texture units shared by all lit programs.
pub mod units {
    pub const ALBEDO: u32 = 0;
    pub const AO: u32 = 1;
    pub const ARM: u32 = 1;
    pub const METALLIC: u32 = 2;
    pub const NORMAL: u32 = 3;
    pub const ROUGHNESS: u32 = 4;
    pub const ENVIRONMENT: u32 = 5;
    pub const IRRADIANCE: u32 = 6;
    pub const PREFILTER: u32 = 7;
    pub const BRDF_LUT: u32 = 8;
}

const fn decl(name: &'static str, ty: UniformType) -> UniformDecl {
    UniformDecl::new(name, ty)
}

const fn tex2d(name: &'static str, unit: u32, address: AddressMode) -> SamplerDecl {
    SamplerDecl::new(name, TextureDimension::D2, unit, address)
}

const fn cube(name: &'static str, unit: u32) -> SamplerDecl {
    SamplerDecl::new(name, TextureDimension::Cube, unit, AddressMode::ClampToEdge)
}

macro_rules! lit_uniforms {
    ($($extra:expr),* $(,)?) => {
        &[
            decl("model", UniformType::Mat4),
            decl("view", UniformType::Mat4),
            decl("projection", UniformType::Mat4),
            decl("normalMatrix", UniformType::Mat3),
            decl("viewPos", UniformType::Vec3),
            decl("light.direction", UniformType::Vec3),
            decl("light.ambient", UniformType::Vec3),
            decl("light.diffuse", UniformType::Vec3),
            decl("light.specular", UniformType::Vec3),
            decl("light.isDirLight", UniformType::Bool),
            decl("lightDirections[0]", UniformType::Vec3),
            decl("lightDirections[1]", UniformType::Vec3),
            decl("lightDirections[2]", UniformType::Vec3),
            decl("lightDirections[3]", UniformType::Vec3),
            $($extra,)*
        ]
    };
}

pub static EQUIRECT_TO_CUBEMAP: ProgramDescriptor = ProgramDescriptor {
    name: "equirect_to_cubemap",
    kind: ProgramKind::EquirectToCubemap,
    source: EQUIRECT_TO_CUBEMAP_SHADER,
    uniforms: &[
        decl("projection", UniformType::Mat4),
        decl("view", UniformType::Mat4),
    ],
    samplers: &[tex2d("equirectangularMap", 0, AddressMode::ClampToEdge)],
};

pub static IRRADIANCE: ProgramDescriptor = ProgramDescriptor {
    name: "irradiance",
    kind: ProgramKind::Irradiance,
    source: IRRADIANCE_SHADER,
    uniforms: &[
        decl("projection", UniformType::Mat4),
        decl("view", UniformType::Mat4),
        decl("sampleDelta", UniformType::Float),
    ],
    samplers: &[cube("environmentMap", 0)],
};

pub static PREFILTER: ProgramDescriptor = ProgramDescriptor {
    name: "prefilter",
    kind: ProgramKind::Prefilter,
    source: PREFILTER_SHADER,
    uniforms: &[
        decl("projection", UniformType::Mat4),
        decl("view", UniformType::Mat4),
        decl("roughness", UniformType::Float),
        decl("sampleCount", UniformType::Int),
    ],
    samplers: &[cube("environmentMap", 0)],
};

pub static BRDF_INTEGRATION: ProgramDescriptor = ProgramDescriptor {
    name: "brdf",
    kind: ProgramKind::BrdfIntegration,
    source: BRDF_SHADER,
    uniforms: &[decl("sampleCount", UniformType::Int)],
    samplers: &[],
};

pub static BACKGROUND: ProgramDescriptor = ProgramDescriptor {
    name: "background",
    kind: ProgramKind::Background,
    source: BACKGROUND_SHADER,
    uniforms: &[
        decl("projection", UniformType::Mat4),
        decl("view", UniformType::Mat4),
    ],
    samplers: &[cube("environmentMap", units::ENVIRONMENT)],
};

pub static PBR: ProgramDescriptor = ProgramDescriptor {
    name: "pbr",
    kind: ProgramKind::Pbr,
    source: PBR_SHADER,
    uniforms: lit_uniforms![],
    samplers: &[
        tex2d("albedo_map", units::ALBEDO, AddressMode::Repeat),
        tex2d("ao_map", units::AO, AddressMode::Repeat),
        tex2d("metallic_map", units::METALLIC, AddressMode::Repeat),
        tex2d("normal_map", units::NORMAL, AddressMode::Repeat),
        tex2d("roughness_map", units::ROUGHNESS, AddressMode::Repeat),
        cube("cube_map", units::ENVIRONMENT),
        cube("irradiance_map", units::IRRADIANCE),
        cube("prefilter_map", units::PREFILTER),
        tex2d("brdfLUT", units::BRDF_LUT, AddressMode::ClampToEdge),
    ],
};

pub static PBR_MODEL: ProgramDescriptor = ProgramDescriptor {
    name: "pbr_model",
    kind: ProgramKind::PbrModel,
    source: PBR_MODEL_SHADER,
    uniforms: lit_uniforms![],
    samplers: &[
        tex2d("albedo_map", units::ALBEDO, AddressMode::Repeat),
        tex2d("arm_map", units::ARM, AddressMode::Repeat),
        tex2d("normal_map", units::NORMAL, AddressMode::Repeat),
        cube("cube_map", units::ENVIRONMENT),
        cube("irradiance_map", units::IRRADIANCE),
        cube("prefilter_map", units::PREFILTER),
        tex2d("brdfLUT", units::BRDF_LUT, AddressMode::ClampToEdge),
    ],
};

pub static SPHERE_GRID: ProgramDescriptor = ProgramDescriptor {
    name: "sphere",
    kind: ProgramKind::SphereGrid,
    source: SPHERE_SHADER,
    uniforms: lit_uniforms![
        decl("color", UniformType::Vec3),
        decl("roughness", UniformType::Float),
        decl("metallic", UniformType::Float),
    ],
    samplers: &[
        cube("cube_map", units::ENVIRONMENT),
        cube("irradiance_map", units::IRRADIANCE),
        cube("prefilter_map", units::PREFILTER),
        tex2d("brdfLUT", units::BRDF_LUT, AddressMode::ClampToEdge),
    ],
};
