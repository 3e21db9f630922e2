//! Asset and application errors

use crate::backend::BackendError;
use crate::ibl::IblError;
use crate::resources::RegistryError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading textures, models and manifests
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to import model {path}: {source}")]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("Invalid asset manifest: {0}")]
    Manifest(#[from] toml::de::Error),
    #[error("Invalid asset data: {0}")]
    InvalidData(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Top-level error of the demo application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Failed to create the event loop: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
    #[error("Failed to create the window: {0}")]
    Window(#[from] winit::error::OsError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Image-based lighting precomputation failed: {0}")]
    Ibl(#[from] IblError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
