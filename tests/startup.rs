//! Startup from a manifest on disk through to the first frame.

mod common;

use common::small_config;
use pbr_renderer::backend::RecordedCommand;
use pbr_renderer::ibl::BRDF_LUT_KEY;
use pbr_renderer::{app, AppConfig, AppError, AssetError, DemoSelection, SceneState, SoftwareBackend};
use std::path::{Path, PathBuf};

struct TempDir(PathBuf);

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!("pbr-renderer-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn write_hdr(path: &Path, width: usize, height: usize, value: f32) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let pixels = vec![image::Rgb([value, value, value]); width * height];
    let file = std::fs::File::create(path).unwrap();
    image::codecs::hdr::HdrEncoder::new(std::io::BufWriter::new(file))
        .encode(&pixels, width, height)
        .unwrap();
}

fn write_manifest(root: &Path) -> PathBuf {
    let manifest = root.join("assets.toml");
    std::fs::write(
        &manifest,
        r#"
        [[materials]]
        name = "gold"
        directory = "textures/gold"
        maps = ["albedo", "normal"]

        [[models]]
        name = "rat"
        path = "objects/rat/rat.gltf"

        [[environments]]
        name = "studio"
        path = "hdr/studio.hdr"
        primary = true

        [[environments]]
        name = "night"
        path = "hdr/night.hdr"
        "#,
    )
    .unwrap();
    manifest
}

fn config(root: &Path) -> AppConfig {
    AppConfig {
        asset_root: root.to_path_buf(),
        manifest: Some(write_manifest(root)),
        ibl: small_config(),
        ..AppConfig::default()
    }
}

#[test]
fn test_startup_precomputes_every_environment() {
    let dir = TempDir::new("startup");
    write_hdr(&dir.0.join("hdr/studio.hdr"), 16, 8, 0.5);
    write_hdr(&dir.0.join("hdr/night.hdr"), 16, 8, 0.05);

    let mut config = config(&dir.0);
    config.dump_faces = Some(dir.0.join("faces"));
    let mut backend = SoftwareBackend::new(32, 32);
    let mut startup = app::initialize(&mut backend, &config).unwrap();

    assert_eq!(startup.renderer.environment_names(), vec!["studio", "night"]);
    assert_eq!(startup.renderer.active_environment().unwrap().name, "studio");
    let textures = &startup.resources.textures;
    assert!(textures.contains(BRDF_LUT_KEY));
    assert!(textures.contains("irradiance_map"));
    assert!(textures.contains("night/prefilter_map"));
    // missing material maps and models are skipped
    assert!(!textures.contains("gold/albedo_map"));
    assert!(startup.resources.models.is_empty());

    for layer in 0..6 {
        assert!(dir.0.join(format!("faces/face_{}.hdr", layer)).exists());
    }

    // capture resources are gone, only the frame remains to draw
    assert_eq!(backend.live_framebuffers(), 0);
    assert_eq!(backend.live_renderbuffers(), 0);
    let scene = SceneState {
        demo: DemoSelection::Sphere,
        ..SceneState::default()
    };
    backend.take_commands();
    startup.renderer.render(&mut backend, &startup.resources, &scene).unwrap();
    let draws = backend
        .take_commands()
        .into_iter()
        .filter(|command| matches!(command, RecordedCommand::Draw { .. }))
        .count();
    assert_eq!(draws, 2);

    startup.resources.release_all(&mut backend);
    startup.renderer.destroy(&mut backend);
    assert_eq!(backend.live_textures(), 0);
}

#[test]
fn test_startup_selects_requested_environment() {
    let dir = TempDir::new("select");
    write_hdr(&dir.0.join("hdr/studio.hdr"), 8, 4, 1.0);
    write_hdr(&dir.0.join("hdr/night.hdr"), 8, 4, 1.0);

    let mut config = config(&dir.0);
    config.environment = Some("night".to_string());
    let mut backend = SoftwareBackend::new(32, 32);
    let startup = app::initialize(&mut backend, &config).unwrap();
    assert_eq!(startup.renderer.active_environment().unwrap().name, "night");
}

#[test]
fn test_missing_environment_is_fatal() {
    let dir = TempDir::new("missing");
    write_hdr(&dir.0.join("hdr/studio.hdr"), 8, 4, 1.0);

    let config = config(&dir.0);
    let mut backend = SoftwareBackend::new(32, 32);
    let result = app::initialize(&mut backend, &config);
    assert!(matches!(result, Err(AppError::Asset(AssetError::Image { .. }))));
    assert_eq!(backend.live_framebuffers(), 0);
    assert_eq!(backend.live_textures(), 0);
}
