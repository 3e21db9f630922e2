//! Lighting parameters pushed to the lit programs each frame

use glam::Vec3;

/// Directional light with Phong-style color terms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(1.0, 1.0, -1.0),
            ambient: Vec3::splat(0.1),
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
        }
    }
}

pub const LIGHT_DIRECTION_COUNT: usize = 4;

/// Main light plus the four direct light directions of the PBR programs
#[derive(Debug, Clone, PartialEq)]
pub struct LightRig {
    pub light: DirectionalLight,
    pub directions: [Vec3; LIGHT_DIRECTION_COUNT],
}

impl Default for LightRig {
    fn default() -> Self {
        Self {
            light: DirectionalLight::default(),
            directions: [
                Vec3::new(1.0, 1.0, -1.0),
                Vec3::new(1.0, -1.0, -1.0),
                Vec3::new(-1.0, 1.0, -1.0),
                Vec3::new(-1.0, -1.0, -1.0),
            ],
        }
    }
}

impl LightRig {
    /// Uniform names of the direct light directions, in order.
    pub const DIRECTION_UNIFORMS: [&'static str; LIGHT_DIRECTION_COUNT] = [
        "lightDirections[0]",
        "lightDirections[1]",
        "lightDirections[2]",
        "lightDirections[3]",
    ];

    /// Main light direction follows the first direct light.
    pub fn sync_main_light(&mut self) {
        self.light.direction = self.directions[0];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rig() {
        let rig = LightRig::default();
        assert_eq!(rig.light.ambient, Vec3::splat(0.1));
        assert_eq!(rig.directions[3], Vec3::new(-1.0, -1.0, -1.0));
        assert_eq!(rig.light.direction, rig.directions[0]);
    }
}
