//! Core backend abstraction traits
//!
//! [`GraphicsBackend`] is the immediate-mode device interface the IBL pipeline
//! and the scene renderer are written against. Both the wgpu backend and the
//! software reference backend implement it.

use crate::backend::types::*;
use thiserror::Error;

/// Kind of object a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    VertexArray,
    Program,
    Framebuffer,
    Renderbuffer,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Texture => "texture",
            ResourceKind::VertexArray => "vertex array",
            ResourceKind::Program => "program",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::Renderbuffer => "renderbuffer",
        };
        f.write_str(name)
    }
}

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to acquire next image: {0}")]
    AcquireImageFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Failed to compile program '{name}':\n{log}")]
    ShaderCompilationFailed { name: String, log: String },
    #[error("Invalid {kind} handle {id}")]
    InvalidHandle { kind: ResourceKind, id: u64 },
    #[error("Program '{program}' has no uniform named '{name}'")]
    UnknownUniform { program: String, name: String },
    #[error("Uniform '{name}' expects {expected:?}, got {actual:?}")]
    UniformTypeMismatch {
        name: String,
        expected: UniformType,
        actual: UniformType,
    },
    #[error("Framebuffer is incomplete: {0}")]
    IncompleteFramebuffer(String),
    #[error("Invalid texture access: {0}")]
    InvalidTextureAccess(String),
    #[error("Failed to read back texture: {0}")]
    ReadbackFailed(String),
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        ///
        /// Id 0 is never allocated and is used as the unset sentinel.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub(crate) u64);

        impl $name {
            pub const UNSET: Self = Self(0);
            pub const KIND: ResourceKind = ResourceKind::$kind;

            pub fn is_set(&self) -> bool {
                self.0 != 0
            }

            pub fn id(&self) -> u64 {
                self.0
            }

            pub(crate) fn invalid(&self) -> BackendError {
                BackendError::InvalidHandle {
                    kind: Self::KIND,
                    id: self.0,
                }
            }
        }
    };
}

define_handle!(
    /// Handle to a GPU buffer
    BufferHandle => Buffer
);
define_handle!(
    /// Handle to a 2D or cube texture
    TextureHandle => Texture
);
define_handle!(
    /// Handle to a vertex buffer bound together with its layout and index buffer
    VertexArrayHandle => VertexArray
);
define_handle!(
    /// Handle to a linked shading program
    ProgramHandle => Program
);
define_handle!(
    /// Handle to an offscreen framebuffer
    FramebufferHandle => Framebuffer
);
define_handle!(
    /// Handle to an offscreen depth renderbuffer
    RenderbufferHandle => Renderbuffer
);

/// Allocates handle ids. Ids start at 1 so that 0 stays the unset sentinel.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: u64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Main graphics backend trait
///
/// Commands are issued against an implicit binding state (bound framebuffer,
/// viewport, texture units), the way a GL context works. Operations that
/// receive an unset or destroyed handle fail with
/// [`BackendError::InvalidHandle`]; `destroy_*` calls on such handles are no-ops.
pub trait GraphicsBackend {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Resize the presentation surface
    fn resize(&mut self, width: u32, height: u32);

    /// Current size of the default framebuffer
    fn surface_size(&self) -> (u32, u32);

    /// Begin a new frame on the default framebuffer
    fn begin_frame(&mut self) -> BackendResult<()>;

    /// Submit the frame and present it
    fn end_frame(&mut self) -> BackendResult<()>;

    // === Buffers and vertex arrays ===

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle>;

    fn destroy_buffer(&mut self, buffer: BufferHandle);

    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor) -> BackendResult<VertexArrayHandle>;

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    // === Textures ===

    /// Allocate a texture. Its contents are undefined until written or rendered.
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Upload a full layer/mip image. `data` is tightly packed in the texture's format.
    fn write_texture(
        &mut self,
        texture: TextureHandle,
        subresource: TextureSubresource,
        data: &[u8],
    ) -> BackendResult<()>;

    /// Read back a full layer/mip image, tightly packed in the texture's format.
    ///
    /// Pending work is submitted and waited for first.
    fn read_texture(
        &mut self,
        texture: TextureHandle,
        subresource: TextureSubresource,
    ) -> BackendResult<Vec<u8>>;

    /// Descriptor the texture was created with, if it is alive.
    fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    // === Offscreen targets ===

    /// Allocate a depth renderbuffer
    fn create_renderbuffer(&mut self, width: u32, height: u32) -> BackendResult<RenderbufferHandle>;

    /// Reallocate the renderbuffer storage at a new size
    fn resize_renderbuffer(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()>;

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle);

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle>;

    /// Attach a texture face and mip level as color attachment 0
    fn attach_color(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: ColorAttachment,
    ) -> BackendResult<()>;

    /// Attach a renderbuffer as the depth attachment
    fn attach_depth(
        &mut self,
        framebuffer: FramebufferHandle,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle);

    // === Programs ===

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle>;

    /// Set a uniform by name. The name is resolved on every call.
    ///
    /// Sampler uniforms take an `Int` selecting the texture unit they read.
    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> BackendResult<()>;

    fn destroy_program(&mut self, program: ProgramHandle);

    // === Binding state and commands ===

    /// Bind an offscreen framebuffer, or the default framebuffer with `None`
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> BackendResult<()>;

    fn bound_framebuffer(&self) -> Option<FramebufferHandle>;

    fn set_viewport(&mut self, width: u32, height: u32);

    /// Clear color and depth of the bound framebuffer
    fn clear(&mut self, color: [f32; 4]) -> BackendResult<()>;

    /// Bind a texture to a texture unit. `TextureHandle::UNSET` unbinds it.
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> BackendResult<()>;

    fn draw(&mut self, call: &DrawCall) -> BackendResult<()>;

    /// Submit all recorded work
    fn flush(&mut self) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_handles() {
        assert!(!TextureHandle::UNSET.is_set());
        assert!(!TextureHandle::default().is_set());
        assert!(TextureHandle(3).is_set());
        assert_eq!(ProgramHandle::KIND, ResourceKind::Program);
    }

    #[test]
    fn test_allocator_never_hands_out_unset() {
        let mut allocator = HandleAllocator::new();
        let ids: Vec<u64> = (0..4).map(|_| allocator.allocate()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_invalid_handle_message() {
        let err = FramebufferHandle::UNSET.invalid();
        assert_eq!(err.to_string(), "Invalid framebuffer handle 0");
    }
}
