//! Backend abstraction layer
//!
//! Provides the device trait and common types that both the wgpu backend and
//! the CPU reference backend implement.

pub mod software;
pub mod texels;
pub mod traits;
pub mod types;
pub mod uniforms;
pub mod wgpu_backend;

pub use software::{RecordedCommand, SoftwareBackend};
pub use traits::*;
pub use types::*;
pub use uniforms::{UniformBlock, UniformLayout};
pub use wgpu_backend::WgpuBackend;
