//! Application configuration

use crate::ibl::IblConfig;
use crate::scene::DemoSelection;
use std::path::PathBuf;

/// Configuration for starting the demo
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Window title
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Directory that manifest paths are relative to
    pub asset_root: PathBuf,
    /// Optional TOML manifest replacing the built-in asset set
    pub manifest: Option<PathBuf>,
    pub demo: DemoSelection,
    /// Environment shown at startup, the manifest's primary one when unset
    pub environment: Option<String>,
    /// Write the faces of the active environment cube here after precomputation
    pub dump_faces: Option<PathBuf>,
    pub ibl: IblConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "PBR Renderer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            asset_root: PathBuf::from("resources"),
            manifest: None,
            demo: DemoSelection::default(),
            environment: None,
            dump_faces: None,
            ibl: IblConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.title, "PBR Renderer");
        assert_eq!(config.demo, DemoSelection::Sphere);
        assert!(config.ibl.validate().is_ok());
    }
}
