//! Asset manifest and loaders
//!
//! Material maps are registered as `"<material>/<map>_map"`, models under
//! their name. A material map or model that fails to load is logged and left
//! unregistered; an environment that fails to load is returned as an error.

use crate::backend::traits::*;
use crate::error::{AssetError, AssetResult};
use crate::ibl::EnvironmentKeys;
use crate::renderer::SceneResources;
use crate::resources::{HdrImage, Model, TextureData};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Maps of a material stored as `<directory>/<map>.<extension>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MaterialEntry {
    pub name: String,
    pub directory: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    pub maps: Vec<String>,
}

fn default_extension() -> String {
    "png".into()
}

impl MaterialEntry {
    fn textured(name: &str, directory: &str, extension: &str, maps: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            directory: PathBuf::from(directory),
            extension: extension.to_string(),
            maps: maps.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn key(&self, map: &str) -> String {
        format!("{}/{}_map", self.name, map)
    }

    pub fn path(&self, map: &str) -> PathBuf {
        self.directory.join(format!("{}.{}", map, self.extension))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnvironmentEntry {
    pub name: String,
    pub path: PathBuf,
    /// Registered under the unprefixed keys
    #[serde(default)]
    pub primary: bool,
}

impl EnvironmentEntry {
    pub fn keys(&self) -> EnvironmentKeys {
        EnvironmentKeys::new(&self.name, self.primary)
    }
}

/// Everything the demo loads at startup, relative to the asset root
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub materials: Vec<MaterialEntry>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
    #[serde(default)]
    pub environments: Vec<EnvironmentEntry>,
}

const SPHERE_MAPS: [&str; 5] = ["albedo", "ao", "metallic", "normal", "roughness"];
const MODEL_MAPS: [&str; 3] = ["albedo", "arm", "normal"];

impl Default for AssetManifest {
    fn default() -> Self {
        let sphere = |name: &str| MaterialEntry::textured(name, &format!("textures/{}", name), "png", &SPHERE_MAPS);
        let object = |name: &str, extension: &str| {
            MaterialEntry::textured(name, &format!("objects/{}/textures", name), extension, &MODEL_MAPS)
        };
        let model = |name: &str| ModelEntry {
            name: name.to_string(),
            path: PathBuf::from(format!("objects/{0}/{0}.gltf", name)),
        };
        let environment = |name: &str, primary: bool| EnvironmentEntry {
            name: name.to_string(),
            path: PathBuf::from(format!("textures/hdr/{}.hdr", name)),
            primary,
        };

        Self {
            materials: vec![
                sphere("gold"),
                sphere("plastic"),
                sphere("rusted_iron"),
                object("boulder", "png"),
                object("cliff", "jpg"),
                object("marble_bust", "jpg"),
                object("chair", "jpg"),
                object("rat", "jpg"),
            ],
            models: vec![model("rat"), model("chair"), model("marble_bust")],
            environments: vec![
                environment("newport_loft", true),
                environment("golden_bay", false),
                environment("satara_night", false),
            ],
        }
    }
}

impl AssetManifest {
    pub fn from_toml(source: &str) -> AssetResult<Self> {
        let manifest: Self = toml::from_str(source)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> AssetResult<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest = Self::from_toml(&source)?;
        log::info!("Loaded asset manifest {}", path.display());
        Ok(manifest)
    }

    /// At most one primary environment, and unique environment names.
    pub fn validate(&self) -> AssetResult<()> {
        let primaries = self.environments.iter().filter(|e| e.primary).count();
        if primaries > 1 {
            return Err(AssetError::InvalidData(format!(
                "{} environments are marked primary",
                primaries
            )));
        }
        for (i, env) in self.environments.iter().enumerate() {
            if self.environments[..i].iter().any(|other| other.name == env.name) {
                return Err(AssetError::InvalidData(format!("environment '{}' is listed twice", env.name)));
            }
        }
        Ok(())
    }

    pub fn environment(&self, name: &str) -> Option<&EnvironmentEntry> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// The primary environment, or the first one listed.
    pub fn primary_environment(&self) -> Option<&EnvironmentEntry> {
        self.environments
            .iter()
            .find(|e| e.primary)
            .or_else(|| self.environments.first())
    }
}

/// Load and register every material map, returning how many were registered.
pub fn load_materials<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    resources: &mut SceneResources,
    manifest: &AssetManifest,
    root: &Path,
) -> BackendResult<usize> {
    let mut loaded = 0;
    for material in &manifest.materials {
        for map in &material.maps {
            let path = root.join(material.path(map));
            let data = match TextureData::from_file(&path) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("{}", e);
                    continue;
                }
            };
            let texture = data.upload(backend)?;
            resources.textures.register_releasing(backend, material.key(map), texture);
            loaded += 1;
        }
    }
    log::info!("Loaded {} material maps", loaded);
    Ok(loaded)
}

/// Import, upload and register every model, returning how many were registered.
pub fn load_models<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    resources: &mut SceneResources,
    manifest: &AssetManifest,
    root: &Path,
) -> BackendResult<usize> {
    let mut loaded = 0;
    for entry in &manifest.models {
        let model = match Model::load(root.join(&entry.path)) {
            Ok(model) => model,
            Err(e) => {
                log::warn!("{}", e);
                continue;
            }
        };
        let gpu = model.upload(backend)?;
        resources.models.register_releasing(backend, entry.name.as_str(), gpu);
        loaded += 1;
    }
    log::info!("Loaded {} models", loaded);
    Ok(loaded)
}

pub fn load_environment(entry: &EnvironmentEntry, root: &Path) -> AssetResult<HdrImage> {
    HdrImage::from_file(root.join(&entry.path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;

    #[test]
    fn test_default_manifest_matches_fixed_asset_set() {
        let manifest = AssetManifest::default();
        assert!(manifest.validate().is_ok());
        assert_eq!(manifest.materials.len(), 8);

        let gold = &manifest.materials[0];
        assert_eq!(gold.key("albedo"), "gold/albedo_map");
        assert_eq!(gold.path("albedo"), PathBuf::from("textures/gold/albedo.png"));

        let cliff = manifest.materials.iter().find(|m| m.name == "cliff").unwrap();
        assert_eq!(cliff.path("arm"), PathBuf::from("objects/cliff/textures/arm.jpg"));

        let names: Vec<&str> = manifest.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["rat", "chair", "marble_bust"]);

        let primary = manifest.primary_environment().unwrap();
        assert_eq!(primary.name, "newport_loft");
        assert_eq!(primary.keys().irradiance, "irradiance_map");
        assert_eq!(
            manifest.environment("satara_night").unwrap().keys().hdr_texture,
            "satara_night/hdr_texture"
        );
    }

    #[test]
    fn test_manifest_from_toml() {
        let manifest = AssetManifest::from_toml(
            r#"
            [[materials]]
            name = "gold"
            directory = "textures/gold"
            maps = ["albedo", "normal"]

            [[environments]]
            name = "studio"
            path = "hdr/studio.hdr"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.materials[0].extension, "png");
        assert!(manifest.models.is_empty());
        assert!(!manifest.environments[0].primary);
        assert_eq!(manifest.primary_environment().unwrap().name, "studio");
    }

    #[test]
    fn test_manifest_rejects_two_primaries_and_bad_toml() {
        let two = r#"
            [[environments]]
            name = "a"
            path = "a.hdr"
            primary = true
            [[environments]]
            name = "b"
            path = "b.hdr"
            primary = true
        "#;
        assert!(matches!(AssetManifest::from_toml(two), Err(AssetError::InvalidData(_))));
        assert!(matches!(AssetManifest::from_toml("materials = 3"), Err(AssetError::Manifest(_))));
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mut resources = SceneResources::new();
        let manifest = AssetManifest::default();
        let root = Path::new("no/such/asset/root");

        assert_eq!(load_materials(&mut backend, &mut resources, &manifest, root).unwrap(), 0);
        assert_eq!(load_models(&mut backend, &mut resources, &manifest, root).unwrap(), 0);
        assert!(resources.textures.is_empty());
        assert_eq!(backend.live_textures(), 0);

        let err = load_environment(manifest.primary_environment().unwrap(), root).err().unwrap();
        assert!(matches!(err, AssetError::Image { .. }));
    }
}
