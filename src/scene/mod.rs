//! Scene state: camera, lights and the fixed set of demo draw paths

mod camera;
mod camera_controller;
mod light;

pub use camera::*;
pub use camera_controller::*;
pub use light::*;

use glam::{Mat3, Mat4, Vec3};

/// Which hardcoded draw path runs this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DemoSelection {
    #[default]
    Sphere,
    Spheres,
    Model,
    TexturedSpheres,
    Scene,
    Nothing,
}

impl DemoSelection {
    pub const ALL: [DemoSelection; 6] = [
        DemoSelection::Sphere,
        DemoSelection::Spheres,
        DemoSelection::Model,
        DemoSelection::TexturedSpheres,
        DemoSelection::Scene,
        DemoSelection::Nothing,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn label(&self) -> &'static str {
        match self {
            DemoSelection::Sphere => "Sphere",
            DemoSelection::Spheres => "Spheres",
            DemoSelection::Model => "Model",
            DemoSelection::TexturedSpheres => "Textured Spheres",
            DemoSelection::Scene => "Scene",
            DemoSelection::Nothing => "Nothing",
        }
    }
}

pub const SPHERE_GRID_SIZE: usize = 7;
const GRID_SPACING: f32 = 3.0;
const SCENE_SCALE: f32 = 5.0;

/// Material parameters of one untextured calibration sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSphere {
    pub model: Mat4,
    pub color: Vec3,
    pub roughness: f32,
    pub metallic: f32,
}

/// Row-major 7×7 grid, roughness rising left to right and metallic falling top to bottom.
pub fn sphere_grid() -> Vec<GridSphere> {
    let n = SPHERE_GRID_SIZE as f32;
    let mut spheres = Vec::with_capacity(SPHERE_GRID_SIZE * SPHERE_GRID_SIZE);
    for row in 0..SPHERE_GRID_SIZE {
        for col in 0..SPHERE_GRID_SIZE {
            let offset = Vec3::new(
                -6.0 + GRID_SPACING * col as f32,
                6.0 - GRID_SPACING * row as f32,
                0.0,
            );
            spheres.push(GridSphere {
                model: Mat4::from_translation(offset),
                color: Vec3::X,
                roughness: (col as f32 + 0.5) / n,
                metallic: (n - 1.0 - row as f32) / n,
            });
        }
    }
    spheres
}

/// Inverse transpose of the upper 3×3 of `model`.
pub fn normal_matrix(model: Mat4) -> Mat3 {
    Mat3::from_mat4(model).inverse().transpose()
}

/// User-tweakable scene parameters, edited by the debug console
#[derive(Debug, Clone)]
pub struct SceneState {
    pub camera: Camera,
    pub lights: LightRig,
    /// Euler angles in degrees
    pub rotation: Vec3,
    pub rat_position: Vec3,
    pub demo: DemoSelection,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            camera: Camera::default(),
            lights: LightRig::default(),
            rotation: Vec3::new(-90.0, 0.0, 0.0),
            rat_position: Vec3::new(0.0, 0.0, 0.449),
            demo: DemoSelection::default(),
        }
    }
}

impl SceneState {
    /// Object rotation about x, then y, then the (1,0,1) diagonal.
    pub fn model_matrix(&self) -> Mat4 {
        let diagonal = Vec3::new(1.0, 0.0, 1.0).normalize();
        Mat4::from_rotation_x(self.rotation.x.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_axis_angle(diagonal, self.rotation.z.to_radians())
    }

    /// Gold then rusted iron, one grid step apart.
    pub fn textured_sphere_transforms(&self) -> [Mat4; 2] {
        let model = self.model_matrix();
        [model, model * Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0))]
    }

    /// Chair, rat and bust.
    pub fn scene_transforms(&self) -> [Mat4; 3] {
        let scaled = self.model_matrix() * Mat4::from_scale(Vec3::splat(SCENE_SCALE));
        [
            scaled,
            scaled * Mat4::from_translation(self.rat_position),
            scaled * Mat4::from_translation(Vec3::new(-5.0, 0.0, 0.0)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_from_index() {
        assert_eq!(DemoSelection::from_index(0), Some(DemoSelection::Sphere));
        assert_eq!(DemoSelection::from_index(3), Some(DemoSelection::TexturedSpheres));
        assert_eq!(DemoSelection::from_index(5), Some(DemoSelection::Nothing));
        assert_eq!(DemoSelection::from_index(6), None);
        for demo in DemoSelection::ALL {
            assert_eq!(DemoSelection::from_index(demo.index()), Some(demo));
        }
        assert_eq!(DemoSelection::Spheres.label(), "Spheres");
    }

    #[test]
    fn test_sphere_grid_parameters() {
        let grid = sphere_grid();
        assert_eq!(grid.len(), 49);

        let first = grid[0];
        assert_eq!(first.model.w_axis.truncate(), Vec3::new(-6.0, 6.0, 0.0));
        assert_eq!(first.roughness, 0.5 / 7.0);
        assert_eq!(first.metallic, 6.0 / 7.0);

        let last = grid[48];
        assert_eq!(last.model.w_axis.truncate(), Vec3::new(12.0, -12.0, 0.0));
        assert_eq!(last.roughness, 6.5 / 7.0);
        assert_eq!(last.metallic, 0.0);
        assert!(grid.iter().all(|s| s.color == Vec3::X));
    }

    #[test]
    fn test_default_rotation_turns_z_up() {
        let state = SceneState::default();
        let up = state.model_matrix().transform_vector3(Vec3::Z);
        assert!((up - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_scene_transforms() {
        let state = SceneState {
            rotation: Vec3::ZERO,
            ..SceneState::default()
        };
        let [chair, rat, bust] = state.scene_transforms();
        assert_eq!(chair, Mat4::from_scale(Vec3::splat(5.0)));
        assert!((rat.w_axis.truncate() - Vec3::new(0.0, 0.0, 2.245)).length() < 1e-5);
        assert_eq!(bust.w_axis.truncate(), Vec3::new(-25.0, 0.0, 0.0));

        let [gold, iron] = state.textured_sphere_transforms();
        assert_eq!(gold, Mat4::IDENTITY);
        assert_eq!(iron.w_axis.truncate(), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_normal_matrix_of_uniform_scale() {
        let m = normal_matrix(Mat4::from_scale(Vec3::splat(2.0)));
        assert!((m * Vec3::Y - Vec3::Y * 0.5).length() < 1e-6);
    }
}
