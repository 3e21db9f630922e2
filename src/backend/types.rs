//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};

use crate::backend::traits::{TextureHandle, VertexArrayHandle, BufferHandle, ProgramHandle};
use crate::shaders::ProgramKind;

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rg16Float,
    Rgba32Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            TextureFormat::Rgba16Float | TextureFormat::Rg16Float | TextureFormat::Rgba32Float
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::Rg16Float
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
            TextureFormat::Rgba32Float => 16,
        }
    }

    /// Number of color channels stored per texel.
    pub fn channel_count(&self) -> usize {
        match self {
            TextureFormat::Rg16Float => 2,
            TextureFormat::Depth32Float => 1,
            _ => 4,
        }
    }
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const TEXTURE_BINDING: Self = Self(1 << 2);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    /// Usage of every texture the capture passes render into.
    pub const CAPTURE_TARGET: Self =
        Self(Self::COPY_SRC.0 | Self::TEXTURE_BINDING.0 | Self::RENDER_ATTACHMENT.0);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_SRC: Self = Self(1 << 2);
    pub const COPY_DST: Self = Self(1 << 3);
    pub const INDEX: Self = Self(1 << 4);
    pub const VERTEX: Self = Self(1 << 5);
    pub const UNIFORM: Self = Self(1 << 6);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Whether a texture is a single 2D image or six cube faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D2,
    Cube,
}

impl TextureDimension {
    pub fn layer_count(&self) -> u32 {
        match self {
            TextureDimension::D2 => 1,
            TextureDimension::Cube => 6,
        }
    }
}

/// One face of a cube texture, in the conventional layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(&self) -> u32 {
        *self as u32
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub dimension: TextureDimension,
    pub mip_levels: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Square cube texture that can be rendered into and sampled.
    pub fn cube(label: &str, size: u32, mip_levels: u32, format: TextureFormat) -> Self {
        Self {
            label: Some(label.to_string()),
            width: size,
            height: size,
            dimension: TextureDimension::Cube,
            mip_levels,
            format,
            usage: TextureUsage::CAPTURE_TARGET,
        }
    }

    /// 2D texture filled from the CPU.
    pub fn sampled_2d(label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            label: Some(label.to_string()),
            width,
            height,
            dimension: TextureDimension::D2,
            mip_levels: 1,
            format,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
        }
    }

    /// Size of the given mip level, never smaller than one texel.
    pub fn mip_size(&self, mip_level: u32) -> (u32, u32) {
        ((self.width >> mip_level).max(1), (self.height >> mip_level).max(1))
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            dimension: TextureDimension::D2,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        }
    }
}

/// Addresses one layer and mip level of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSubresource {
    pub layer: u32,
    pub mip_level: u32,
}

impl TextureSubresource {
    pub const BASE: Self = Self { layer: 0, mip_level: 0 };

    pub fn face(face: CubeFace, mip_level: u32) -> Self {
        Self { layer: face.layer(), mip_level }
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub usage: BufferUsage,
}

/// Vertex attribute format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Vertex attribute description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u64,
}

/// Vertex buffer layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub array_stride: u64,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBufferLayout {
    /// Tightly packed attributes at consecutive locations starting from 0.
    pub fn packed(formats: &[VertexFormat]) -> Self {
        let mut offset = 0;
        let attributes = formats
            .iter()
            .enumerate()
            .map(|(location, &format)| {
                let attribute = VertexAttribute {
                    location: location as u32,
                    format,
                    offset,
                };
                offset += format.size();
                attribute
            })
            .collect();
        Self {
            array_stride: offset,
            attributes,
        }
    }
}

/// Lit vertex with position, normal and UV
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout::packed(&[
            VertexFormat::Float32x3,
            VertexFormat::Float32x3,
            VertexFormat::Float32x2,
        ])
    }
}

/// Vertex of the full-screen quad
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: Vec3,
    pub uv: Vec2,
}

impl QuadVertex {
    pub fn layout() -> VertexBufferLayout {
        VertexBufferLayout::packed(&[VertexFormat::Float32x3, VertexFormat::Float32x2])
    }
}

/// Layout of a position-only vertex stream.
pub fn position_layout() -> VertexBufferLayout {
    VertexBufferLayout::packed(&[VertexFormat::Float32x3])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

/// Vertex buffer plus an optional index buffer, described for the backend.
#[derive(Debug, Clone)]
pub struct VertexArrayDescriptor {
    pub label: Option<String>,
    pub vertex_buffer: BufferHandle,
    pub layout: VertexBufferLayout,
    pub index_buffer: Option<(BufferHandle, IndexFormat)>,
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    LineList,
    TriangleList,
    TriangleStrip,
}

/// Comparison function for depth testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Depth test state of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub test_enabled: bool,
    pub write_enabled: bool,
    pub compare: CompareFunction,
}

impl DepthState {
    pub const DISABLED: Self = Self {
        test_enabled: false,
        write_enabled: false,
        compare: CompareFunction::Always,
    };

    /// Passes where the depth buffer still holds the clear value.
    pub const SKYBOX: Self = Self {
        test_enabled: true,
        write_enabled: true,
        compare: CompareFunction::LessEqual,
    };
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enabled: true,
            write_enabled: true,
            compare: CompareFunction::Less,
        }
    }
}

/// Vertex range of a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRange {
    Arrays { first: u32, count: u32 },
    Indexed { count: u32 },
}

impl DrawRange {
    pub fn count(&self) -> u32 {
        match self {
            DrawRange::Arrays { count, .. } | DrawRange::Indexed { count } => *count,
        }
    }
}

/// Draw call issued against the currently bound framebuffer
#[derive(Debug, Clone, Copy)]
pub struct DrawCall {
    pub program: ProgramHandle,
    pub vertex_array: VertexArrayHandle,
    pub topology: PrimitiveTopology,
    pub range: DrawRange,
    pub depth: DepthState,
}

/// Color attachment of an offscreen framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAttachment {
    pub texture: TextureHandle,
    /// Face to render into when the texture is a cubemap
    pub face: Option<CubeFace>,
    pub mip_level: u32,
}

/// Texture address mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Type of a uniform variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

/// Typed uniform value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn ty(&self) -> UniformType {
        match self {
            UniformValue::Bool(_) => UniformType::Bool,
            UniformValue::Int(_) => UniformType::Int,
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat2(_) => UniformType::Mat2,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Zero value of the given type.
    pub fn zeroed(ty: UniformType) -> Self {
        match ty {
            UniformType::Bool => UniformValue::Bool(false),
            UniformType::Int => UniformValue::Int(0),
            UniformType::Float => UniformValue::Float(0.0),
            UniformType::Vec2 => UniformValue::Vec2(Vec2::ZERO),
            UniformType::Vec3 => UniformValue::Vec3(Vec3::ZERO),
            UniformType::Vec4 => UniformValue::Vec4(Vec4::ZERO),
            UniformType::Mat2 => UniformValue::Mat2(Mat2::ZERO),
            UniformType::Mat3 => UniformValue::Mat3(Mat3::ZERO),
            UniformType::Mat4 => UniformValue::Mat4(Mat4::ZERO),
        }
    }
}

macro_rules! impl_uniform_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UniformValue {
                fn from(value: $ty) -> Self {
                    UniformValue::$variant(value)
                }
            }
        )*
    };
}

impl_uniform_from! {
    bool => Bool,
    i32 => Int,
    f32 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Mat2 => Mat2,
    Mat3 => Mat3,
    Mat4 => Mat4,
}

/// A named uniform variable of a program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: &'static str,
    pub ty: UniformType,
}

impl UniformDecl {
    pub const fn new(name: &'static str, ty: UniformType) -> Self {
        Self { name, ty }
    }
}

/// A named texture sampler of a program. Its value is the texture unit it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDecl {
    pub name: &'static str,
    pub dimension: TextureDimension,
    pub default_unit: u32,
    pub address: AddressMode,
}

impl SamplerDecl {
    pub const fn new(
        name: &'static str,
        dimension: TextureDimension,
        default_unit: u32,
        address: AddressMode,
    ) -> Self {
        Self {
            name,
            dimension,
            default_unit,
            address,
        }
    }
}

/// Everything a backend needs to build a shading program.
///
/// The WGSL source declares one uniform struct at `@group(0) @binding(0)` whose
/// members follow `uniforms` in order, and for each sampler `i` a texture at
/// `@group(1) @binding(2 * i)` with its sampler at `@binding(2 * i + 1)`.
#[derive(Debug, Clone, Copy)]
pub struct ProgramDescriptor {
    pub name: &'static str,
    pub kind: ProgramKind,
    pub source: &'static str,
    pub uniforms: &'static [UniformDecl],
    pub samplers: &'static [SamplerDecl],
}

impl ProgramDescriptor {
    pub fn sampler(&self, name: &str) -> Option<(usize, &SamplerDecl)> {
        self.samplers
            .iter()
            .enumerate()
            .find(|(_, decl)| decl.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layouts_match_struct_sizes() {
        assert_eq!(Vertex::layout().array_stride, std::mem::size_of::<Vertex>() as u64);
        assert_eq!(
            QuadVertex::layout().array_stride,
            std::mem::size_of::<QuadVertex>() as u64
        );
        assert_eq!(position_layout().array_stride, 12);

        let layout = Vertex::layout();
        assert_eq!(layout.attributes[1].offset, 12);
        assert_eq!(layout.attributes[2].offset, 24);
        assert_eq!(layout.attributes[2].location, 2);
    }

    #[test]
    fn test_mip_size_never_reaches_zero() {
        let desc = TextureDescriptor::cube("prefilter", 128, 5, TextureFormat::Rgba16Float);
        assert_eq!(desc.mip_size(0), (128, 128));
        assert_eq!(desc.mip_size(4), (8, 8));
        assert_eq!(desc.mip_size(10), (1, 1));
    }

    #[test]
    fn test_cube_face_layers() {
        for (i, face) in CubeFace::ALL.iter().enumerate() {
            assert_eq!(face.layer(), i as u32);
        }
        assert_eq!(TextureDimension::Cube.layer_count(), 6);
    }

    #[test]
    fn test_uniform_value_types() {
        assert_eq!(UniformValue::from(1.0f32).ty(), UniformType::Float);
        assert_eq!(UniformValue::from(true).ty(), UniformType::Bool);
        assert_eq!(UniformValue::from(Mat3::IDENTITY).ty(), UniformType::Mat3);
        assert_eq!(UniformValue::zeroed(UniformType::Vec3), UniformValue::Vec3(Vec3::ZERO));
    }
}
