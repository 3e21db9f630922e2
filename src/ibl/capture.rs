//! Offscreen capture into cube faces or a single 2D target

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::GpuMesh;
use glam::{Mat4, Vec3};

/// Look-at matrices of the six cube faces with their shared projection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewSet {
    pub projection: Mat4,
    /// Indexed by [`CubeFace::layer`]
    pub views: [Mat4; 6],
}

impl ViewSet {
    /// 90 degree square frustum from the origin toward each face.
    pub fn standard() -> Self {
        let look = |dir: Vec3, up: Vec3| Mat4::look_at_rh(Vec3::ZERO, dir, up);
        Self {
            projection: Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 10.0),
            views: [
                look(Vec3::X, Vec3::NEG_Y),
                look(Vec3::NEG_X, Vec3::NEG_Y),
                look(Vec3::Y, Vec3::Z),
                look(Vec3::NEG_Y, Vec3::NEG_Z),
                look(Vec3::Z, Vec3::NEG_Y),
                look(Vec3::NEG_Z, Vec3::NEG_Y),
            ],
        }
    }

    pub fn view(&self, face: CubeFace) -> Mat4 {
        self.views[face.layer() as usize]
    }
}

/// Framebuffer and depth renderbuffer owned by one precomputation stage
#[derive(Debug)]
pub struct CaptureTarget {
    pub framebuffer: FramebufferHandle,
    pub renderbuffer: RenderbufferHandle,
    pub size: (u32, u32),
}

/// Binds a fresh capture target for the lifetime of the scope.
///
/// Dropping the scope, also on an error path, rebinds the default framebuffer
/// and destroys the target.
pub struct CaptureScope<'a, B: GraphicsBackend + ?Sized> {
    backend: &'a mut B,
    target: CaptureTarget,
}

impl<'a, B: GraphicsBackend + ?Sized> CaptureScope<'a, B> {
    pub fn begin(backend: &'a mut B, width: u32, height: u32) -> BackendResult<Self> {
        let framebuffer = backend.create_framebuffer()?;
        let mut scope = Self {
            backend,
            target: CaptureTarget {
                framebuffer,
                renderbuffer: RenderbufferHandle::UNSET,
                size: (width, height),
            },
        };
        scope.target.renderbuffer = scope.backend.create_renderbuffer(width, height)?;
        scope
            .backend
            .attach_depth(scope.target.framebuffer, scope.target.renderbuffer)?;
        scope.backend.bind_framebuffer(Some(scope.target.framebuffer))?;
        Ok(scope)
    }

    pub fn backend(&mut self) -> &mut B {
        self.backend
    }

    pub fn target(&self) -> &CaptureTarget {
        &self.target
    }

    /// Reallocate the depth storage, for targets that shrink per mip level.
    pub fn resize(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if self.target.size != (width, height) {
            self.backend
                .resize_renderbuffer(self.target.renderbuffer, width, height)?;
            self.target.size = (width, height);
        }
        Ok(())
    }

    /// Render all six faces of `texture` at `mip_level`, setting the "view"
    /// uniform per face. The program's other uniforms and textures must be set.
    pub fn capture_cube(
        &mut self,
        program: ProgramHandle,
        cube: &GpuMesh,
        views: &ViewSet,
        texture: TextureHandle,
        mip_level: u32,
    ) -> BackendResult<()> {
        let (width, height) = self.target.size;
        for face in CubeFace::ALL {
            self.backend
                .set_uniform(program, "view", UniformValue::Mat4(views.view(face)))?;
            self.backend.attach_color(
                self.target.framebuffer,
                ColorAttachment {
                    texture,
                    face: Some(face),
                    mip_level,
                },
            )?;
            self.backend.bind_framebuffer(Some(self.target.framebuffer))?;
            self.backend.set_viewport(width, height);
            self.backend.clear([0.0, 0.0, 0.0, 1.0])?;
            cube.draw(self.backend, program, DepthState::DISABLED)?;
            log::trace!("Captured face {:?} mip {} ({}x{})", face, mip_level, width, height);
        }
        Ok(())
    }

    /// Render a full-screen quad once into mip 0 of a 2D `texture`.
    pub fn capture_quad(&mut self, program: ProgramHandle, quad: &GpuMesh, texture: TextureHandle) -> BackendResult<()> {
        let (width, height) = self.target.size;
        self.backend.attach_color(
            self.target.framebuffer,
            ColorAttachment {
                texture,
                face: None,
                mip_level: 0,
            },
        )?;
        self.backend.bind_framebuffer(Some(self.target.framebuffer))?;
        self.backend.set_viewport(width, height);
        self.backend.clear([0.0, 0.0, 0.0, 1.0])?;
        quad.draw(self.backend, program, DepthState::DISABLED)?;
        log::trace!("Captured quad ({}x{})", width, height);
        Ok(())
    }
}

impl<B: GraphicsBackend + ?Sized> Drop for CaptureScope<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.bind_framebuffer(None) {
            log::error!("Failed to restore the default framebuffer: {}", e);
        }
        self.backend.destroy_framebuffer(self.target.framebuffer);
        self.backend.destroy_renderbuffer(self.target.renderbuffer);
    }
}
