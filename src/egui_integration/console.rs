//! Debug console window

use crate::scene::{DemoSelection, LightRig, SceneState};
use glam::Vec3;

/// Requests from the console the application has to apply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsoleActions {
    /// Environment picked in the selector, when it changed
    pub environment: Option<String>,
}

/// Scene parameters editor, shown every frame
#[derive(Debug, Default)]
pub struct DebugConsole {
    /// Smoothed frames per second
    fps: f32,
}

impl DebugConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn update_fps(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        let instant = 1.0 / dt;
        self.fps = if self.fps == 0.0 {
            instant
        } else {
            self.fps * 0.9 + instant * 0.1
        };
    }

    pub fn show(
        &mut self,
        ctx: &egui::Context,
        state: &mut SceneState,
        environments: &[&str],
        active_environment: Option<&str>,
    ) -> ConsoleActions {
        let mut actions = ConsoleActions::default();

        egui::Window::new("Debug Console").default_width(320.0).show(ctx, |ui| {
            ui.label(format!("FPS: {:.1}", self.fps));
            ui.separator();

            for (i, direction) in state.lights.directions.iter_mut().enumerate() {
                let label = if i == 0 {
                    "Light Direction".to_string()
                } else {
                    format!("Light Direction{}", i)
                };
                drag_vec3(ui, &label, direction, 0.05);
            }
            color_edit(ui, "Light Ambient", &mut state.lights.light.ambient);
            color_edit(ui, "Light Diffuse", &mut state.lights.light.diffuse);
            color_edit(ui, "Light Specular", &mut state.lights.light.specular);
            if ui.button("Reset lights").clicked() {
                state.lights = LightRig::default();
            }
            state.lights.sync_main_light();

            ui.separator();
            drag_vec3(ui, "Object Rotation", &mut state.rotation, 1.0);
            drag_vec3(ui, "Rat Position", &mut state.rat_position, 0.01);

            if !environments.is_empty() {
                ui.separator();
                let current = active_environment.unwrap_or("none");
                egui::ComboBox::from_label("Environment")
                    .selected_text(current)
                    .show_ui(ui, |ui| {
                        for name in environments {
                            if ui.selectable_label(*name == current, *name).clicked() && *name != current {
                                actions.environment = Some(name.to_string());
                            }
                        }
                    });
            }

            ui.separator();
            ui.label("Draw");
            for demo in DemoSelection::ALL {
                ui.selectable_value(&mut state.demo, demo, demo.label());
            }
        });

        actions
    }
}

fn drag_vec3(ui: &mut egui::Ui, label: &str, value: &mut Vec3, speed: f64) {
    ui.horizontal(|ui| {
        ui.add(egui::DragValue::new(&mut value.x).speed(speed));
        ui.add(egui::DragValue::new(&mut value.y).speed(speed));
        ui.add(egui::DragValue::new(&mut value.z).speed(speed));
        ui.label(label);
    });
}

fn color_edit(ui: &mut egui::Ui, label: &str, value: &mut Vec3) {
    ui.horizontal(|ui| {
        let mut rgb = value.to_array();
        if ui.color_edit_button_rgb(&mut rgb).changed() {
            *value = Vec3::from_array(rgb);
        }
        ui.label(label);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_smoothing() {
        let mut console = DebugConsole::new();
        console.update_fps(0.0);
        assert_eq!(console.fps(), 0.0);
        console.update_fps(0.01);
        assert!((console.fps() - 100.0).abs() < 1e-3);
        console.update_fps(0.02);
        assert!((console.fps() - 95.0).abs() < 1e-3);
    }

    #[test]
    fn test_show_keeps_state_without_input() {
        let ctx = egui::Context::default();
        let mut console = DebugConsole::new();
        let mut state = SceneState::default();
        let mut actions = ConsoleActions::default();
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            actions = console.show(ctx, &mut state, &["newport_loft", "golden_bay"], Some("newport_loft"));
        });
        assert_eq!(actions, ConsoleActions::default());
        assert_eq!(state.demo, DemoSelection::Sphere);
        assert_eq!(state.lights, LightRig::default());
    }
}
