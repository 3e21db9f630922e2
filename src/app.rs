//! Demo application: startup precomputation and the winit frame loop

use crate::assets::{self, AssetManifest};
use crate::backend::traits::*;
use crate::backend::wgpu_backend::WgpuBackend;
use crate::config::AppConfig;
use crate::egui_integration::{ConsoleActions, DebugConsole, WgpuEguiIntegration};
use crate::error::AppError;
use crate::ibl::IblPipeline;
use crate::renderer::{SceneRenderer, SceneResources};
use crate::resources::dump_cube_faces;
use crate::scene::{CameraController, CameraInput, DemoSelection, FreeFlyController, SceneState};
use crate::window::Window;
use std::path::Path;
use std::time::Instant;
use winit::{
    event::{DeviceEvent, ElementState, Event, KeyEvent, MouseScrollDelta, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    keyboard::{KeyCode, PhysicalKey},
};

/// Loaded assets, precomputed environments and the renderer that draws them
pub struct Startup {
    pub renderer: SceneRenderer,
    pub resources: SceneResources,
    pub manifest: AssetManifest,
}

/// Load every asset and run the IBL precomputation for each environment.
///
/// A failing environment is fatal and releases everything created so far.
/// Missing material maps and models are not.
pub fn initialize<B: GraphicsBackend + ?Sized>(backend: &mut B, config: &AppConfig) -> Result<Startup, AppError> {
    let manifest = match &config.manifest {
        Some(path) => AssetManifest::from_file(path)?,
        None => AssetManifest::default(),
    };

    let mut renderer = SceneRenderer::new(backend)?;
    let mut resources = SceneResources::new();
    match prepare(backend, config, &manifest, &mut renderer, &mut resources) {
        Ok(()) => Ok(Startup {
            renderer,
            resources,
            manifest,
        }),
        Err(e) => {
            resources.release_all(backend);
            renderer.destroy(backend);
            Err(e)
        }
    }
}

fn prepare<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    config: &AppConfig,
    manifest: &AssetManifest,
    renderer: &mut SceneRenderer,
    resources: &mut SceneResources,
) -> Result<(), AppError> {
    let root = config.asset_root.as_path();
    assets::load_materials(backend, resources, manifest, root)?;
    assets::load_models(backend, resources, manifest, root)?;

    let pipeline = IblPipeline::new(backend, config.ibl.clone())?;
    let precomputed = precompute(backend, &pipeline, renderer, resources, manifest, root);
    pipeline.destroy(backend);
    precomputed?;

    let active = config
        .environment
        .clone()
        .or_else(|| manifest.primary_environment().map(|e| e.name.clone()));
    if let Some(name) = active {
        if !renderer.set_active_environment(&name) {
            log::warn!(
                "Starting with '{}' instead",
                renderer.environment_names().first().copied().unwrap_or("none")
            );
        }
    }

    if let (Some(dir), Some(keys)) = (&config.dump_faces, renderer.active_environment()) {
        let cube = resources.textures.lookup(&keys.environment)?;
        dump_cube_faces(backend, cube, 0, dir)?;
    }
    Ok(())
}

fn precompute<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    pipeline: &IblPipeline,
    renderer: &mut SceneRenderer,
    resources: &mut SceneResources,
    manifest: &AssetManifest,
    root: &Path,
) -> Result<(), AppError> {
    let started = Instant::now();
    pipeline.process_brdf_lut(backend, &mut resources.textures)?;
    for entry in &manifest.environments {
        let hdr = assets::load_environment(entry, root)?;
        let keys = entry.keys();
        pipeline.process_environment(backend, &mut resources.textures, &keys, &hdr)?;
        renderer.add_environment(keys);
    }
    backend.flush()?;
    log::info!(
        "Precomputed {} environments in {:.2}s",
        manifest.environments.len(),
        started.elapsed().as_secs_f32()
    );
    Ok(())
}

struct App {
    window: Window,
    backend: WgpuBackend,
    egui: WgpuEguiIntegration,
    console: DebugConsole,
    startup: Startup,
    scene: SceneState,
    input: CameraInput,
    controller: FreeFlyController,
    last_frame: Instant,
}

impl App {
    fn handle_window_event(&mut self, event: &WindowEvent, elwt: &EventLoopWindowTarget<()>) {
        self.window.handle_event(event);
        match event {
            WindowEvent::CloseRequested => elwt.exit(),
            WindowEvent::Resized(size) => {
                self.backend.resize(size.width, size.height);
                self.scene.camera.set_aspect(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_frame() {
                    log::error!("Frame failed: {}", e);
                    if matches!(e, BackendError::DeviceLost | BackendError::OutOfMemory) {
                        elwt.exit();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event, elwt),
            WindowEvent::MouseWheel { delta, .. } => {
                self.input.scroll_delta += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
            }
            WindowEvent::Focused(false) => {
                // keys released while unfocused never arrive
                let captured = self.input.mouse_captured;
                self.input = CameraInput {
                    mouse_captured: captured,
                    ..CameraInput::default()
                };
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, event: &KeyEvent, elwt: &EventLoopWindowTarget<()>) {
        let PhysicalKey::Code(key) = event.physical_key else {
            return;
        };
        let pressed = event.state == ElementState::Pressed;
        match key {
            KeyCode::Escape if pressed => elwt.exit(),
            KeyCode::KeyW => self.input.forward = pressed,
            KeyCode::KeyS => self.input.backward = pressed,
            KeyCode::KeyA => self.input.left = pressed,
            KeyCode::KeyD => self.input.right = pressed,
            KeyCode::KeyR | KeyCode::Numpad1 => self.input.up = pressed,
            KeyCode::KeyF | KeyCode::Numpad2 => self.input.down = pressed,
            KeyCode::NumpadAdd if pressed => self.set_captured(true),
            KeyCode::NumpadSubtract if pressed => self.set_captured(false),
            _ if pressed && !event.repeat => {
                if let Some(demo) = demo_for_key(key) {
                    log::info!("Demo: {}", demo.label());
                    self.scene.demo = demo;
                }
            }
            _ => {}
        }
    }

    fn set_captured(&mut self, captured: bool) {
        self.window.set_cursor_captured(captured);
        self.input.mouse_captured = captured;
    }

    fn update(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.console.update_fps(dt);

        self.controller.update(&mut self.scene.camera, &self.input, dt);
        self.input.reset_deltas();
        self.window.request_redraw();
    }

    fn render_frame(&mut self) -> BackendResult<()> {
        if self.window.take_resized() {
            log::debug!("Window resized to {:?}", self.window.dimensions());
        }
        match self.backend.begin_frame() {
            Ok(()) => {}
            Err(BackendError::SurfaceLost) => {
                let (width, height) = self.window.dimensions();
                self.backend.resize(width, height);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        self.startup
            .renderer
            .render(&mut self.backend, &self.startup.resources, &self.scene)?;

        let environments: Vec<String> = self
            .startup
            .renderer
            .environment_names()
            .into_iter()
            .map(String::from)
            .collect();
        let names: Vec<&str> = environments.iter().map(String::as_str).collect();
        let active = self.startup.renderer.active_environment().map(|k| k.name.clone());
        let mut actions = ConsoleActions::default();
        let (console, scene) = (&mut self.console, &mut self.scene);
        self.egui.run(self.window.window(), |ctx| {
            actions = console.show(ctx, scene, &names, active.as_deref());
        });
        if let Some(name) = actions.environment {
            self.startup.renderer.set_active_environment(&name);
        }

        let (width, height) = self.backend.surface_size();
        self.egui.render(&mut self.backend, width, height);
        self.backend.end_frame()
    }

    fn shutdown(mut self) {
        self.startup.resources.release_all(&mut self.backend);
        self.startup.renderer.destroy(&mut self.backend);
        log::info!("Shut down");
    }
}

/// Digit keys 1 to 6 select a demo.
pub fn demo_for_key(key: KeyCode) -> Option<DemoSelection> {
    let index = match key {
        KeyCode::Digit1 => 0,
        KeyCode::Digit2 => 1,
        KeyCode::Digit3 => 2,
        KeyCode::Digit4 => 3,
        KeyCode::Digit5 => 4,
        KeyCode::Digit6 => 5,
        _ => return None,
    };
    DemoSelection::from_index(index)
}

/// Open the window, precompute, then run the frame loop until exit.
pub fn run(config: AppConfig) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    let mut window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let mut backend = WgpuBackend::new(window.window_arc(), config.vsync)?;

    let startup = initialize(&mut backend, &config)?;
    let egui = WgpuEguiIntegration::new(&backend, window.window());

    let mut scene = SceneState {
        demo: config.demo,
        ..SceneState::default()
    };
    let (width, height) = window.dimensions();
    scene.camera.set_aspect(width, height);

    let input = CameraInput::new();
    window.set_cursor_captured(input.mouse_captured);

    let mut app = Some(App {
        window,
        backend,
        egui,
        console: DebugConsole::new(),
        startup,
        scene,
        input,
        controller: FreeFlyController::new(),
        last_frame: Instant::now(),
    });

    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        if let Event::LoopExiting = event {
            if let Some(state) = app.take() {
                state.shutdown();
            }
            return;
        }
        let Some(state) = app.as_mut() else {
            return;
        };
        match event {
            Event::WindowEvent { event, .. } => {
                let consumed = state.egui.on_window_event(state.window.window(), &event);
                let always = matches!(
                    event,
                    WindowEvent::CloseRequested | WindowEvent::Resized(_) | WindowEvent::RedrawRequested
                );
                if !consumed || always {
                    state.handle_window_event(&event, elwt);
                }
            }
            Event::DeviceEvent {
                event: DeviceEvent::MouseMotion { delta },
                ..
            } => {
                if state.input.mouse_captured && !state.egui.wants_pointer_input() {
                    state.input.mouse_delta.x += delta.0 as f32;
                    state.input.mouse_delta.y += delta.1 as f32;
                }
            }
            Event::AboutToWait => state.update(),
            _ => {}
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_keys_select_demos() {
        assert_eq!(demo_for_key(KeyCode::Digit1), Some(DemoSelection::Sphere));
        assert_eq!(demo_for_key(KeyCode::Digit5), Some(DemoSelection::Scene));
        assert_eq!(demo_for_key(KeyCode::Digit6), Some(DemoSelection::Nothing));
        assert_eq!(demo_for_key(KeyCode::Digit7), None);
        assert_eq!(demo_for_key(KeyCode::KeyW), None);
    }
}
