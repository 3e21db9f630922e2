//! egui debug UI
//!
//! [`WgpuEguiIntegration`] drives egui on the wgpu backend and
//! [`DebugConsole`] is the window that edits the scene.

mod console;
mod wgpu;

pub use self::console::{ConsoleActions, DebugConsole};
pub use self::wgpu::WgpuEguiIntegration;
