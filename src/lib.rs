//! PBR Renderer - a physically based rendering demo with image-based lighting
//!
//! Rendering goes through the [`backend::GraphicsBackend`] device trait:
//! - **wgpu**: the windowed backend used by the demo, also usable headless
//! - **software**: a CPU reference device that records commands, used in tests
//!
//! # Features
//! - IBL precomputation: equirectangular HDR to cubemap, irradiance
//!   convolution, prefiltered specular mips and a BRDF lookup table
//! - Metallic/roughness PBR shading of spheres and glTF models
//! - Named texture and model registries with release on overwrite
//! - Free-fly camera and an egui debug console for light and scene parameters

pub mod app;
pub mod assets;
pub mod backend;
pub mod config;
pub mod egui_integration;
pub mod error;
pub mod ibl;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shaders;
pub mod window;

pub use assets::AssetManifest;
pub use backend::{GraphicsBackend, SoftwareBackend, WgpuBackend};
pub use config::AppConfig;
pub use egui_integration::{DebugConsole, WgpuEguiIntegration};
pub use error::{AppError, AssetError};
pub use ibl::{IblConfig, IblError, IblMaps, IblPipeline};
pub use renderer::{SceneRenderer, SceneResources};
pub use resources::{RegistryError, ResourceRegistry};
pub use scene::{Camera, DemoSelection, SceneState};
pub use window::Window;
