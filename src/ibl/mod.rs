//! Image-based lighting precomputation
//!
//! An equirectangular HDR image is converted into an environment cubemap,
//! which is then convolved into a diffuse irradiance cubemap and a specular
//! prefiltered cubemap whose mip levels encode roughness. A BRDF lookup table
//! shared by all environments completes the split-sum inputs.
//!
//! Every stage renders through [`capture::CaptureScope`], which owns a
//! transient framebuffer and depth renderbuffer for the duration of the stage.

pub mod capture;
mod pipeline;

pub use capture::{CaptureScope, ViewSet};
pub use pipeline::*;

use crate::backend::{BackendError, TextureHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IblError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("Invalid IBL configuration: {0}")]
    InvalidConfig(String),
}

pub type IblResult<T> = Result<T, IblError>;

/// Registry key of the BRDF integration table
pub const BRDF_LUT_KEY: &str = "brdfLUT";

/// Resolutions and sample counts of the precomputation passes
#[derive(Debug, Clone, PartialEq)]
pub struct IblConfig {
    pub environment_size: u32,
    pub irradiance_size: u32,
    pub prefilter_size: u32,
    pub prefilter_mip_levels: u32,
    pub brdf_lut_size: u32,
    /// Angular step of the irradiance hemisphere integral, in radians
    pub irradiance_sample_delta: f32,
    pub prefilter_sample_count: u32,
    pub brdf_sample_count: u32,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            environment_size: 1024,
            irradiance_size: 32,
            prefilter_size: 128,
            prefilter_mip_levels: 5,
            brdf_lut_size: 512,
            irradiance_sample_delta: 0.025,
            prefilter_sample_count: 1024,
            brdf_sample_count: 1024,
        }
    }
}

impl IblConfig {
    pub fn validate(&self) -> IblResult<()> {
        let sizes = [
            ("environment_size", self.environment_size),
            ("irradiance_size", self.irradiance_size),
            ("prefilter_size", self.prefilter_size),
            ("brdf_lut_size", self.brdf_lut_size),
            ("prefilter_mip_levels", self.prefilter_mip_levels),
            ("prefilter_sample_count", self.prefilter_sample_count),
            ("brdf_sample_count", self.brdf_sample_count),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(IblError::InvalidConfig(format!("{} must be positive", name)));
        }

        let max_levels = u32::BITS - self.prefilter_size.leading_zeros();
        if self.prefilter_mip_levels > max_levels {
            return Err(IblError::InvalidConfig(format!(
                "a {} prefilter map has at most {} mip levels, {} requested",
                self.prefilter_size, max_levels, self.prefilter_mip_levels
            )));
        }
        if !(self.irradiance_sample_delta > 0.0 && self.irradiance_sample_delta.is_finite()) {
            return Err(IblError::InvalidConfig(format!(
                "irradiance_sample_delta {} must be a positive angle",
                self.irradiance_sample_delta
            )));
        }
        Ok(())
    }
}

/// Registry keys of one environment's textures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentKeys {
    pub name: String,
    pub hdr_texture: String,
    pub environment: String,
    pub irradiance: String,
    pub prefilter: String,
}

impl EnvironmentKeys {
    /// Keys of the primary environment, which carry no prefix.
    pub fn primary(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hdr_texture: "hdr_texture".to_string(),
            environment: "hdr_cube_map".to_string(),
            irradiance: "irradiance_map".to_string(),
            prefilter: "prefilter_map".to_string(),
        }
    }

    /// Keys under `<name>/`.
    pub fn prefixed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hdr_texture: format!("{}/hdr_texture", name),
            environment: format!("{}/hdr_cube_map", name),
            irradiance: format!("{}/irradiance_map", name),
            prefilter: format!("{}/prefilter_map", name),
        }
    }

    pub fn new(name: &str, primary: bool) -> Self {
        if primary {
            Self::primary(name)
        } else {
            Self::prefixed(name)
        }
    }
}

/// Textures produced for one environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IblMaps {
    pub hdr_texture: TextureHandle,
    pub environment: TextureHandle,
    pub irradiance: TextureHandle,
    pub prefilter: TextureHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IblConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.irradiance_size, 32);
        assert_eq!(config.prefilter_mip_levels, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = IblConfig {
            irradiance_size: 0,
            ..IblConfig::default()
        };
        assert!(matches!(zero.validate(), Err(IblError::InvalidConfig(_))));

        // 128 supports mips 128 down to 1, which is 8 levels
        let too_many = IblConfig {
            prefilter_mip_levels: 9,
            ..IblConfig::default()
        };
        assert!(too_many.validate().is_err());
        let most = IblConfig {
            prefilter_mip_levels: 8,
            ..IblConfig::default()
        };
        assert!(most.validate().is_ok());

        let delta = IblConfig {
            irradiance_sample_delta: 0.0,
            ..IblConfig::default()
        };
        assert!(delta.validate().is_err());
    }

    #[test]
    fn test_environment_keys() {
        let primary = EnvironmentKeys::new("newport_loft", true);
        assert_eq!(primary.irradiance, "irradiance_map");
        assert_eq!(primary.hdr_texture, "hdr_texture");

        let golden = EnvironmentKeys::new("golden_bay", false);
        let satara = EnvironmentKeys::new("satara_night", false);
        assert_eq!(golden.hdr_texture, "golden_bay/hdr_texture");
        assert_eq!(satara.prefilter, "satara_night/prefilter_map");
        assert_ne!(golden.hdr_texture, satara.hdr_texture);
    }
}
