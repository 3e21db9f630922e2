//! Demo window with cursor capture for mouse look

use std::sync::Arc;
use winit::{
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::EventLoop,
    window::{CursorGrabMode, Window as WinitWindow, WindowBuilder},
};

/// The winit window plus its last known size and cursor mode
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
    resized: bool,
    cursor_captured: bool,
}

impl Window {
    /// Open a window with an inner size of `width`x`height` physical pixels.
    pub fn new(event_loop: &EventLoop<()>, title: &str, width: u32, height: u32) -> Result<Self, OsError> {
        let window = Arc::new(
            WindowBuilder::new()
                .with_title(title)
                .with_inner_size(PhysicalSize::new(width, height))
                .build(event_loop)?,
        );
        let size = window.inner_size();

        Ok(Self {
            window,
            width: size.width,
            height: size.height,
            resized: false,
            cursor_captured: false,
        })
    }

    pub fn window(&self) -> &WinitWindow {
        &self.window
    }

    /// Shared handle for surface creation
    pub fn window_arc(&self) -> Arc<WinitWindow> {
        Arc::clone(&self.window)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns and clears the resize flag.
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    pub fn cursor_captured(&self) -> bool {
        self.cursor_captured
    }

    /// Hide and lock the cursor for mouse look, or give it back.
    pub fn set_cursor_captured(&mut self, captured: bool) {
        if captured == self.cursor_captured {
            return;
        }
        if captured {
            let grabbed = self
                .window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
            if let Err(e) = grabbed {
                log::warn!("Cursor grab unavailable: {}", e);
            }
        } else if let Err(e) = self.window.set_cursor_grab(CursorGrabMode::None) {
            log::warn!("Failed to release the cursor: {}", e);
        }
        self.window.set_cursor_visible(!captured);
        self.cursor_captured = captured;
    }

    /// Record the new size from a resize event.
    pub fn handle_event(&mut self, event: &WindowEvent) {
        if let WindowEvent::Resized(size) = event {
            self.width = size.width;
            self.height = size.height;
            self.resized = true;
        }
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}
