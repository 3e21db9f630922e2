//! PBR demo entry point

use clap::Parser;
use pbr_renderer::{AppConfig, DemoSelection};
use std::path::PathBuf;

/// Physically based rendering demo with image-based lighting.
#[derive(Parser, Debug)]
#[command(
    name = "pbr-renderer",
    about = "PBR demo with image-based lighting",
    long_about = "Renders PBR spheres and models lit by a directional light and \
        precomputed image-based lighting.\n\n\
        CONTROLS:\n\
          WASD move, R/F or keypad 1/2 climb and descend\n\
          mouse looks and the wheel zooms while the cursor is captured\n\
          keypad +/- capture and release the cursor, 1-6 pick the demo\n\
          Escape quits",
    version
)]
struct Cli {
    /// Directory the asset paths are relative to.
    #[arg(long, default_value = "resources")]
    assets: PathBuf,

    /// TOML manifest replacing the built-in asset set.
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Demo shown at startup (0 sphere, 1 grid, 2 model, 3 textured, 4 scene, 5 nothing).
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=5))]
    demo: u8,

    /// Environment shown at startup.
    #[arg(long)]
    environment: Option<String>,

    /// Disable vertical sync (may cause tearing).
    #[arg(long)]
    no_vsync: bool,

    /// Write the faces of the startup environment cube as HDR images into this directory.
    #[arg(long)]
    dump_faces: Option<PathBuf>,

    /// Face resolution of the environment cubemap.
    #[arg(long)]
    env_size: Option<u32>,

    /// Face resolution of the irradiance cubemap.
    #[arg(long)]
    irradiance_size: Option<u32>,

    /// Face resolution of the prefiltered cubemap's base mip.
    #[arg(long)]
    prefilter_size: Option<u32>,
}

impl From<Cli> for AppConfig {
    fn from(cli: Cli) -> Self {
        let mut config = AppConfig {
            asset_root: cli.assets,
            manifest: cli.manifest,
            demo: DemoSelection::from_index(cli.demo as usize).unwrap_or_default(),
            environment: cli.environment,
            vsync: !cli.no_vsync,
            dump_faces: cli.dump_faces,
            ..AppConfig::default()
        };
        if let Some(size) = cli.env_size {
            config.ibl.environment_size = size;
        }
        if let Some(size) = cli.irradiance_size {
            config.ibl.irradiance_size = size;
        }
        if let Some(size) = cli.prefilter_size {
            config.ibl.prefilter_size = size;
        }
        config
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from(Cli::parse());
    log::info!("Assets from {}", config.asset_root.display());

    if let Err(e) = pbr_renderer::app::run(config) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_match_config() {
        let config = AppConfig::from(Cli::parse_from(["pbr-renderer"]));
        let defaults = AppConfig::default();
        assert_eq!(config.asset_root, defaults.asset_root);
        assert_eq!(config.demo, DemoSelection::Sphere);
        assert!(config.vsync);
        assert_eq!(config.ibl, defaults.ibl);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "pbr-renderer",
            "--demo",
            "4",
            "--no-vsync",
            "--environment",
            "golden_bay",
            "--env-size",
            "256",
        ]);
        let config = AppConfig::from(cli);
        assert_eq!(config.demo, DemoSelection::Scene);
        assert!(!config.vsync);
        assert_eq!(config.environment.as_deref(), Some("golden_bay"));
        assert_eq!(config.ibl.environment_size, 256);
    }

    #[test]
    fn test_cli_rejects_unknown_demo() {
        assert!(Cli::try_parse_from(["pbr-renderer", "--demo", "6"]).is_err());
    }
}
