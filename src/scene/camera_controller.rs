//! Keyboard and mouse driven camera movement

use glam::{Vec2, Vec3};

use super::Camera;

/// Input state gathered from window events between frames
#[derive(Debug, Clone, Default)]
pub struct CameraInput {
    /// WASD
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
    /// R/F or keypad 1/2, along world up
    pub up: bool,
    pub down: bool,

    /// Cursor delta in pixels, positive y pointing down the screen
    pub mouse_delta: Vec2,

    /// Scroll delta in lines, positive away from the user
    pub scroll_delta: f32,

    /// Cursor captured: look and zoom are applied only while set
    pub mouse_captured: bool,
}

impl CameraInput {
    pub fn new() -> Self {
        Self {
            mouse_captured: true,
            ..Self::default()
        }
    }

    /// Reset per-frame deltas (call after update)
    pub fn reset_deltas(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = 0.0;
    }
}

pub trait CameraController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32);

    fn name(&self) -> &'static str;
}

/// Walks along the view direction and climbs along world up.
#[derive(Debug, Clone)]
pub struct FreeFlyController {
    /// World units per second of climbing
    pub vertical_speed: f32,
}

impl Default for FreeFlyController {
    fn default() -> Self {
        Self { vertical_speed: 2.0 }
    }
}

impl FreeFlyController {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraController for FreeFlyController {
    fn update(&mut self, camera: &mut Camera, input: &CameraInput, dt: f32) {
        if input.mouse_captured {
            if input.mouse_delta != Vec2::ZERO {
                camera.rotate(input.mouse_delta.x, -input.mouse_delta.y);
            }
            if input.scroll_delta != 0.0 {
                camera.zoom_by(input.scroll_delta);
            }
        }

        let step = camera.movement_speed * dt;
        let (front, right) = (camera.front(), camera.right());
        if input.forward {
            camera.position += front * step;
        }
        if input.backward {
            camera.position -= front * step;
        }
        if input.right {
            camera.position += right * step;
        }
        if input.left {
            camera.position -= right * step;
        }

        let climb = Vec3::Y * self.vertical_speed * dt;
        if input.up {
            camera.position += climb;
        }
        if input.down {
            camera.position -= climb;
        }
    }

    fn name(&self) -> &'static str {
        "FreeFly"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_moves_along_front() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            forward: true,
            ..CameraInput::new()
        };
        controller.update(&mut camera, &input, 1.0);
        assert!((camera.position - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-5);
    }

    #[test]
    fn test_vertical_moves_twice_dt() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            up: true,
            ..CameraInput::new()
        };
        controller.update(&mut camera, &input, 0.25);
        assert!((camera.position.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_released_cursor_ignores_look_and_scroll() {
        let mut camera = Camera::default();
        let mut controller = FreeFlyController::new();
        let input = CameraInput {
            mouse_delta: Vec2::new(100.0, 50.0),
            scroll_delta: 3.0,
            mouse_captured: false,
            ..CameraInput::default()
        };
        controller.update(&mut camera, &input, 0.016);
        assert_eq!(camera.yaw, -90.0);
        assert_eq!(camera.zoom, 45.0);

        let captured = CameraInput {
            mouse_captured: true,
            ..input
        };
        controller.update(&mut camera, &captured, 0.016);
        assert_eq!(camera.yaw, -80.0);
        assert_eq!(camera.pitch, -5.0);
        assert_eq!(camera.zoom, 42.0);
    }
}
