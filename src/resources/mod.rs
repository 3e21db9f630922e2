//! Resource management
//!
//! Procedural geometry, uploaded meshes and models, textures and the named
//! registries that connect loaders and pipeline stages to the renderer.

pub mod geometry;
mod mesh;
mod model;
mod registry;
mod texture;

pub use mesh::*;
pub use model::*;
pub use registry::*;
pub use texture::*;
