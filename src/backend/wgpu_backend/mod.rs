//! wgpu backend implementation
//!
//! The immediate-mode calls of [`GraphicsBackend`] are buffered into one
//! pending render pass per bound target, the same way the commands of an
//! explicit pass would be, and replayed into the command encoder when the
//! binding changes or work is submitted.
//!
//! Uniforms are snapshotted per draw into a dynamic-offset ring owned by each
//! program, so a later `set_uniform` never changes what an earlier draw sees.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::uniforms::UniformBlock;
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Draw slots per program between two submissions.
const RING_SLOTS: u32 = 256;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

struct GpuBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

struct GpuTexture {
    texture: wgpu::Texture,
    desc: TextureDescriptor,
    /// View over every mip and layer, for sampling
    sample_view: Option<wgpu::TextureView>,
}

struct Renderbuffer {
    texture: wgpu::Texture,
    size: (u32, u32),
}

#[derive(Default)]
struct Framebuffer {
    color: Option<ColorAttachment>,
    depth: Option<RenderbufferHandle>,
}

/// Per-program uniform ring with one slot per draw
struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    slot_size: u64,
    staging: Vec<u8>,
    used: u32,
}

impl UniformRing {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, block_size: u64, alignment: u64) -> Self {
        let slot_size = block_size.div_ceil(alignment) * alignment;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniform Ring"),
            size: slot_size * RING_SLOTS as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Uniform Ring"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(block_size),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            slot_size,
            staging: Vec::new(),
            used: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.used >= RING_SLOTS
    }

    /// Copy a block into the next slot and return its dynamic offset.
    fn push(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.used as u64 * self.slot_size;
        self.staging.resize((offset + self.slot_size) as usize, 0);
        self.staging[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
        self.used += 1;
        offset as u32
    }

    fn upload(&mut self, queue: &wgpu::Queue) {
        if self.used > 0 {
            queue.write_buffer(&self.buffer, 0, &self.staging);
        }
        self.staging.clear();
        self.used = 0;
    }
}

struct GpuProgram {
    desc: ProgramDescriptor,
    module: wgpu::ShaderModule,
    uniforms: UniformBlock,
    sampler_units: Vec<u32>,
    texture_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    ring: UniformRing,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    program: u64,
    layout: VertexBufferLayout,
    topology: PrimitiveTopology,
    /// `None` when the target has no depth attachment
    depth: Option<DepthState>,
    color_format: wgpu::TextureFormat,
}

struct PendingDraw {
    pipeline: PipelineKey,
    program: u64,
    uniform_offset: u32,
    textures: Option<wgpu::BindGroup>,
    vertex_buffer: u64,
    index_buffer: Option<(u64, IndexFormat)>,
    range: DrawRange,
    viewport: (u32, u32),
}

/// Render pass being recorded for the bound target
struct PendingPass {
    framebuffer: Option<FramebufferHandle>,
    color_view: wgpu::TextureView,
    color_format: wgpu::TextureFormat,
    depth_view: Option<wgpu::TextureView>,
    extent: (u32, u32),
    clear: Option<[f32; 4]>,
    draws: Vec<PendingDraw>,
}

/// Where the default framebuffer lives
enum Presentation {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        frame: Option<wgpu::SurfaceTexture>,
    },
    Headless {
        texture: wgpu::Texture,
        format: wgpu::TextureFormat,
        size: (u32, u32),
    },
}

impl Presentation {
    fn size(&self) -> (u32, u32) {
        match self {
            Presentation::Surface { config, .. } => (config.width, config.height),
            Presentation::Headless { size, .. } => *size,
        }
    }
}

/// Textures bound where a sampler's unit is empty
struct Fallbacks {
    white_2d: wgpu::TextureView,
    black_cube: wgpu::TextureView,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    presentation: Presentation,
    default_depth: wgpu::Texture,

    // Resource storage
    handles: HandleAllocator,
    buffers: HashMap<u64, GpuBuffer>,
    vertex_arrays: HashMap<u64, VertexArrayDescriptor>,
    textures: HashMap<u64, GpuTexture>,
    renderbuffers: HashMap<u64, Renderbuffer>,
    framebuffers: HashMap<u64, Framebuffer>,
    programs: HashMap<u64, GpuProgram>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    clamp_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
    fallbacks: Fallbacks,

    // Binding state
    bound_framebuffer: Option<FramebufferHandle>,
    viewport: (u32, u32),
    texture_units: HashMap<u32, TextureHandle>,

    // Command encoding
    encoder: Option<wgpu::CommandEncoder>,
    pending_pass: Option<PendingPass>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Bgra8Unorm => wgpu::TextureFormat::Bgra8Unorm,
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rg16Float => wgpu::TextureFormat::Rg16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_SRC) {
            result |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        result
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn convert_vertex_format(format: VertexFormat) -> wgpu::VertexFormat {
        match format {
            VertexFormat::Float32 => wgpu::VertexFormat::Float32,
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }

    fn convert_compare_function(func: CompareFunction) -> wgpu::CompareFunction {
        match func {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::Equal => wgpu::CompareFunction::Equal,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::NotEqual => wgpu::CompareFunction::NotEqual,
            CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }

    fn convert_topology(topology: PrimitiveTopology) -> wgpu::PrimitiveTopology {
        match topology {
            PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }

    fn convert_index_format(format: IndexFormat) -> wgpu::IndexFormat {
        match format {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }

    /// Clamp a surface size to device limits while maintaining aspect ratio
    fn clamp_to_limits(device: &wgpu::Device, width: u32, height: u32) -> (u32, u32) {
        let max_size = device.limits().max_texture_dimension_2d;
        if width > max_size || height > max_size {
            let scale = (max_size as f32 / width as f32).min(max_size as f32 / height as f32);
            (
                ((width as f32 * scale) as u32).max(1),
                ((height as f32 * scale) as u32).max(1),
            )
        } else {
            (width.max(1), height.max(1))
        }
    }

    fn create_depth_texture(device: &wgpu::Device, width: u32, height: u32, label: &str) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    }

    fn create_sampler(device: &wgpu::Device, address: wgpu::AddressMode, label: &str) -> wgpu::Sampler {
        device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        })
    }

    fn create_fallbacks(device: &wgpu::Device, queue: &wgpu::Queue) -> Fallbacks {
        let white = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("Fallback White"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255; 4],
        );
        let black = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("Fallback Black Cube"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 6,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[0; 24],
        );
        Fallbacks {
            white_2d: white.create_view(&wgpu::TextureViewDescriptor::default()),
            black_cube: black.create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::Cube),
                ..Default::default()
            }),
        }
    }

    async fn request_device(adapter: &wgpu::Adapter) -> BackendResult<(wgpu::Device, wgpu::Queue)> {
        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Graphics Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))
    }

    fn from_parts(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        presentation: Presentation,
    ) -> Self {
        let (width, height) = presentation.size();
        let default_depth = Self::create_depth_texture(&device, width, height, "Default Depth");
        let clamp_sampler = Self::create_sampler(&device, wgpu::AddressMode::ClampToEdge, "Clamp Sampler");
        let repeat_sampler = Self::create_sampler(&device, wgpu::AddressMode::Repeat, "Repeat Sampler");
        let fallbacks = Self::create_fallbacks(&device, &queue);

        Self {
            instance,
            adapter,
            device,
            queue,
            presentation,
            default_depth,
            handles: HandleAllocator::new(),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            pipelines: HashMap::new(),
            clamp_sampler,
            repeat_sampler,
            fallbacks,
            bound_framebuffer: None,
            viewport: (width, height),
            texture_units: HashMap::new(),
            encoder: None,
            pending_pass: None,
        }
    }

    /// Create a backend presenting to a window
    pub fn new(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(window, vsync))
    }

    pub async fn new_async(window: Arc<winit::window::Window>, vsync: bool) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| BackendError::SurfaceCreationFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let (device, queue) = Self::request_device(&adapter).await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| BackendError::SurfaceCreationFailed("Surface reports no formats".into()))?;

        let present_mode = if vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        let (width, height) = Self::clamp_to_limits(&device, size.width, size.height);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self::from_parts(
            instance,
            adapter,
            device,
            queue,
            Presentation::Surface {
                surface,
                config,
                frame: None,
            },
        ))
    }

    /// Create a backend without a window. The default framebuffer is an
    /// offscreen sRGB texture of the given size.
    pub fn new_headless(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;
            let (device, queue) = Self::request_device(&adapter).await?;

            let format = wgpu::TextureFormat::Rgba8UnormSrgb;
            let size = Self::clamp_to_limits(&device, width, height);
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Headless Target"),
                size: wgpu::Extent3d {
                    width: size.0,
                    height: size.1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });

            Ok(Self::from_parts(
                instance,
                adapter,
                device,
                queue,
                Presentation::Headless { texture, format, size },
            ))
        })
    }

    fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        })
    }

    /// False on adapters that cannot copy cube layers into a buffer.
    pub fn supports_cube_readback(&self) -> bool {
        cube_readback_supported(self.adapter.get_info().backend)
    }

    fn texture(&self, texture: TextureHandle) -> BackendResult<&GpuTexture> {
        self.textures.get(&texture.0).ok_or_else(|| texture.invalid())
    }

    fn check_subresource(desc: &TextureDescriptor, subresource: TextureSubresource) -> BackendResult<()> {
        if subresource.layer >= desc.dimension.layer_count() || subresource.mip_level >= desc.mip_levels {
            return Err(BackendError::InvalidTextureAccess(format!(
                "layer {} mip {} is outside {:?} with {} mips",
                subresource.layer, subresource.mip_level, desc.label, desc.mip_levels
            )));
        }
        Ok(())
    }

    /// Start recording a pass on the bound target, checking completeness.
    fn begin_pass(&mut self, clear: Option<[f32; 4]>) -> BackendResult<()> {
        let (color_view, color_format, depth_view, extent) = match self.bound_framebuffer {
            None => {
                let (view, format) = match &self.presentation {
                    Presentation::Surface { config, frame, .. } => {
                        let frame = frame
                            .as_ref()
                            .ok_or_else(|| BackendError::AcquireImageFailed("no frame in progress".into()))?;
                        (
                            frame.texture.create_view(&wgpu::TextureViewDescriptor::default()),
                            config.format,
                        )
                    }
                    Presentation::Headless { texture, format, .. } => {
                        (texture.create_view(&wgpu::TextureViewDescriptor::default()), *format)
                    }
                };
                let depth = self.default_depth.create_view(&wgpu::TextureViewDescriptor::default());
                (view, format, Some(depth), self.presentation.size())
            }
            Some(handle) => {
                let framebuffer = self.framebuffers.get(&handle.0).ok_or_else(|| handle.invalid())?;
                let attachment = framebuffer
                    .color
                    .ok_or_else(|| BackendError::IncompleteFramebuffer("no color attachment".into()))?;
                let texture = self.texture(attachment.texture).map_err(|_| {
                    BackendError::IncompleteFramebuffer("color attachment was destroyed".into())
                })?;
                let size = texture.desc.mip_size(attachment.mip_level);
                let depth_view = match framebuffer.depth {
                    Some(depth) => {
                        let rb = self.renderbuffers.get(&depth.0).ok_or_else(|| {
                            BackendError::IncompleteFramebuffer("depth attachment was destroyed".into())
                        })?;
                        if rb.size != size {
                            return Err(BackendError::IncompleteFramebuffer(format!(
                                "depth {}x{} does not match color {}x{}",
                                rb.size.0, rb.size.1, size.0, size.1
                            )));
                        }
                        Some(rb.texture.create_view(&wgpu::TextureViewDescriptor::default()))
                    }
                    None => None,
                };
                let color_view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Capture Attachment"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_mip_level: attachment.mip_level,
                    mip_level_count: Some(1),
                    base_array_layer: attachment.face.map_or(0, |face| face.layer()),
                    array_layer_count: Some(1),
                    ..Default::default()
                });
                (
                    color_view,
                    Self::convert_texture_format(texture.desc.format),
                    depth_view,
                    size,
                )
            }
        };

        self.pending_pass = Some(PendingPass {
            framebuffer: self.bound_framebuffer,
            color_view,
            color_format,
            depth_view,
            extent,
            clear,
            draws: Vec::new(),
        });
        Ok(())
    }

    /// Replay the pending pass into the command encoder.
    fn end_pass(&mut self) {
        let Some(pass) = self.pending_pass.take() else {
            return;
        };
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        });

        let (color_load, depth_load) = match pass.clear {
            Some(color) => (
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: color[0] as f64,
                    g: color[1] as f64,
                    b: color[2] as f64,
                    a: color[3] as f64,
                }),
                wgpu::LoadOp::Clear(1.0),
            ),
            None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
        };

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(if pass.framebuffer.is_some() {
                "Offscreen Pass"
            } else {
                "Main Pass"
            }),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &pass.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: pass.depth_view.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &pass.draws {
            let (Some(pipeline), Some(program), Some(vertex_buffer)) = (
                self.pipelines.get(&draw.pipeline),
                self.programs.get(&draw.program),
                self.buffers.get(&draw.vertex_buffer),
            ) else {
                continue;
            };
            render_pass.set_pipeline(pipeline);
            render_pass.set_viewport(0.0, 0.0, draw.viewport.0 as f32, draw.viewport.1 as f32, 0.0, 1.0);
            render_pass.set_bind_group(0, &program.ring.bind_group, &[draw.uniform_offset]);
            if let Some(textures) = &draw.textures {
                render_pass.set_bind_group(1, textures, &[]);
            }
            render_pass.set_vertex_buffer(0, vertex_buffer.buffer.slice(..));
            match (draw.range, draw.index_buffer) {
                (DrawRange::Indexed { count }, Some((index_buffer, format))) => {
                    let Some(index_buffer) = self.buffers.get(&index_buffer) else {
                        continue;
                    };
                    render_pass.set_index_buffer(
                        index_buffer.buffer.slice(..),
                        Self::convert_index_format(format),
                    );
                    render_pass.draw_indexed(0..count, 0, 0..1);
                }
                (DrawRange::Arrays { first, count }, _) => {
                    render_pass.draw(first..first + count, 0..1);
                }
                (DrawRange::Indexed { .. }, None) => {}
            }
        }
    }

    /// End the pending pass, upload the uniform rings and submit the encoder.
    fn submit(&mut self) {
        self.end_pass();
        for program in self.programs.values_mut() {
            program.ring.upload(&self.queue);
        }
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn pipeline(&mut self, key: &PipelineKey) -> BackendResult<()> {
        if self.pipelines.contains_key(key) {
            return Ok(());
        }
        let program = self.programs.get(&key.program).ok_or_else(|| ProgramHandle(key.program).invalid())?;

        let attributes: Vec<wgpu::VertexAttribute> = key
            .layout
            .attributes
            .iter()
            .map(|a| wgpu::VertexAttribute {
                format: Self::convert_vertex_format(a.format),
                offset: a.offset,
                shader_location: a.location,
            })
            .collect();
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: key.layout.array_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &attributes,
        }];

        let depth_stencil = key.depth.map(|depth| wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: depth.test_enabled && depth.write_enabled,
            depth_compare: if depth.test_enabled {
                Self::convert_compare_function(depth.compare)
            } else {
                wgpu::CompareFunction::Always
            },
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.desc.name),
                layout: Some(&program.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.module,
                    entry_point: "vs_main",
                    buffers: &vertex_buffers,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.module,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.color_format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: Self::convert_topology(key.topology),
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::PipelineCreationFailed(format!(
                "{}: {}",
                program.desc.name, error
            )));
        }

        log::debug!("Created pipeline for '{}' ({:?})", program.desc.name, key.topology);
        self.pipelines.insert(key.clone(), pipeline);
        Ok(())
    }

    /// Bind group of a program's samplers for the current texture units.
    fn texture_bind_group(&self, program: &GpuProgram) -> Option<wgpu::BindGroup> {
        let layout = program.texture_layout.as_ref()?;
        let mut entries = Vec::with_capacity(program.desc.samplers.len() * 2);
        for (i, decl) in program.desc.samplers.iter().enumerate() {
            let unit = program.sampler_units[i];
            let bound = self
                .texture_units
                .get(&unit)
                .and_then(|handle| self.textures.get(&handle.0))
                .filter(|texture| {
                    // 32-bit float textures are not filterable without an extra feature
                    let usable = texture.desc.dimension == decl.dimension
                        && texture.desc.format != TextureFormat::Rgba32Float;
                    if !usable {
                        log::warn!(
                            "'{}' cannot sample {:?} {:?} {:?} through '{}'",
                            program.desc.name,
                            texture.desc.label,
                            texture.desc.dimension,
                            texture.desc.format,
                            decl.name
                        );
                    }
                    usable
                })
                .and_then(|texture| texture.sample_view.as_ref());
            let view = bound.unwrap_or(match decl.dimension {
                TextureDimension::D2 => &self.fallbacks.white_2d,
                TextureDimension::Cube => &self.fallbacks.black_cube,
            });
            let sampler = match decl.address {
                AddressMode::ClampToEdge => &self.clamp_sampler,
                AddressMode::Repeat => &self.repeat_sampler,
            };
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2 * i as u32 + 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.desc.name),
            layout,
            entries: &entries,
        }))
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.end_pass();
        let (width, height) = Self::clamp_to_limits(&self.device, width, height);
        match &mut self.presentation {
            Presentation::Surface { surface, config, .. } => {
                config.width = width;
                config.height = height;
                surface.configure(&self.device, config);
            }
            Presentation::Headless { size, .. } => {
                // The headless target keeps its storage, only the reported size changes
                *size = (width, height);
            }
        }
        self.default_depth = Self::create_depth_texture(&self.device, width, height, "Default Depth");
    }

    fn surface_size(&self) -> (u32, u32) {
        self.presentation.size()
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        if let Presentation::Surface { surface, frame, .. } = &mut self.presentation {
            let output = surface.get_current_texture().map_err(|e| match e {
                wgpu::SurfaceError::Lost => BackendError::SurfaceLost,
                wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
                _ => BackendError::AcquireImageFailed(e.to_string()),
            })?;
            *frame = Some(output);
        }
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.submit();
        if let Presentation::Surface { frame, .. } = &mut self.presentation {
            if let Some(texture) = frame.take() {
                texture.present();
            }
        }
        Ok(())
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle> {
        if data.is_empty() {
            return Err(BackendError::BufferCreationFailed(format!("{:?} is empty", desc.label)));
        }
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: Self::convert_buffer_usage(desc.usage),
        });

        let id = self.handles.allocate();
        self.buffers.insert(
            id,
            GpuBuffer {
                buffer,
                size: data.len() as u64,
            },
        );
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if !buffer.is_set() {
            return;
        }
        self.end_pass();
        if self.buffers.remove(&buffer.0).is_none() {
            log::debug!("WgpuBackend: buffer {} already destroyed", buffer.0);
        }
    }

    fn create_vertex_array(&mut self, desc: &VertexArrayDescriptor) -> BackendResult<VertexArrayHandle> {
        if !self.buffers.contains_key(&desc.vertex_buffer.0) {
            return Err(desc.vertex_buffer.invalid());
        }
        if let Some((index_buffer, _)) = desc.index_buffer {
            if !self.buffers.contains_key(&index_buffer.0) {
                return Err(index_buffer.invalid());
            }
        }
        let id = self.handles.allocate();
        self.vertex_arrays.insert(id, desc.clone());
        Ok(VertexArrayHandle(id))
    }

    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        if vertex_array.is_set() && self.vertex_arrays.remove(&vertex_array.0).is_none() {
            log::debug!("WgpuBackend: vertex array {} already destroyed", vertex_array.0);
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let max_size = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has an empty extent",
                desc.label
            )));
        }
        if desc.width > max_size || desc.height > max_size {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} exceeds the device limit of {}",
                desc.label, max_size
            )));
        }
        if desc.dimension == TextureDimension::Cube && desc.width != desc.height {
            return Err(BackendError::TextureCreationFailed(format!(
                "cube {:?} is not square",
                desc.label
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.dimension.layer_count(),
            },
            mip_level_count: desc.mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let sample_view = desc.usage.contains(TextureUsage::TEXTURE_BINDING).then(|| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: desc.label.as_deref(),
                dimension: Some(match desc.dimension {
                    TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                    TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
                }),
                ..Default::default()
            })
        });

        let id = self.handles.allocate();
        self.textures.insert(
            id,
            GpuTexture {
                texture,
                desc: desc.clone(),
                sample_view,
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(
        &mut self,
        texture: TextureHandle,
        subresource: TextureSubresource,
        data: &[u8],
    ) -> BackendResult<()> {
        let gpu = self.texture(texture)?;
        Self::check_subresource(&gpu.desc, subresource)?;
        if !gpu.desc.usage.contains(TextureUsage::COPY_DST) {
            return Err(BackendError::InvalidTextureAccess(format!(
                "{:?} was not created with COPY_DST",
                gpu.desc.label
            )));
        }
        let (width, height) = gpu.desc.mip_size(subresource.mip_level);
        let bytes_per_row = width * gpu.desc.format.bytes_per_pixel();
        if data.len() != (bytes_per_row * height) as usize {
            return Err(BackendError::InvalidTextureAccess(format!(
                "expected {} bytes for {}x{}, got {}",
                bytes_per_row * height,
                width,
                height,
                data.len()
            )));
        }

        // queue writes run before any recorded work, so submit that first
        self.submit();
        let gpu = self.texture(texture)?;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &gpu.texture,
                mip_level: subresource.mip_level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: subresource.layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_texture(
        &mut self,
        texture: TextureHandle,
        subresource: TextureSubresource,
    ) -> BackendResult<Vec<u8>> {
        let gpu = self.texture(texture)?;
        Self::check_subresource(&gpu.desc, subresource)?;
        if !gpu.desc.usage.contains(TextureUsage::COPY_SRC) {
            return Err(BackendError::InvalidTextureAccess(format!(
                "{:?} was not created with COPY_SRC",
                gpu.desc.label
            )));
        }
        if gpu.desc.dimension == TextureDimension::Cube && !self.supports_cube_readback() {
            return Err(BackendError::ReadbackFailed(format!(
                "{:?}: {:?} adapters cannot copy cube faces to a buffer",
                gpu.desc.label,
                self.adapter.get_info().backend
            )));
        }
        let (width, height) = gpu.desc.mip_size(subresource.mip_level);
        let row_bytes = width * gpu.desc.format.bytes_per_pixel();
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        self.end_pass();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let gpu_texture = &self.textures[&texture.0].texture;
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: gpu_texture,
                mip_level: subresource.mip_level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: subresource.layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.submit();

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks_exact(padded_row as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        staging.unmap();
        Ok(pixels)
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0).map(|t| &t.desc)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if !texture.is_set() {
            return;
        }
        self.end_pass();
        if self.textures.remove(&texture.0).is_none() {
            log::debug!("WgpuBackend: texture {} already destroyed", texture.0);
        }
        self.texture_units.retain(|_, bound| *bound != texture);
    }

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> BackendResult<RenderbufferHandle> {
        if width == 0 || height == 0 {
            return Err(BackendError::TextureCreationFailed("empty renderbuffer".into()));
        }
        let texture = Self::create_depth_texture(&self.device, width, height, "Capture Depth");
        let id = self.handles.allocate();
        self.renderbuffers.insert(
            id,
            Renderbuffer {
                texture,
                size: (width, height),
            },
        );
        Ok(RenderbufferHandle(id))
    }

    fn resize_renderbuffer(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(renderbuffer.invalid());
        }
        if width == 0 || height == 0 {
            return Err(BackendError::TextureCreationFailed("empty renderbuffer".into()));
        }
        self.end_pass();
        let texture = Self::create_depth_texture(&self.device, width, height, "Capture Depth");
        if let Some(rb) = self.renderbuffers.get_mut(&renderbuffer.0) {
            rb.texture = texture;
            rb.size = (width, height);
        }
        Ok(())
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if !renderbuffer.is_set() {
            return;
        }
        self.end_pass();
        if self.renderbuffers.remove(&renderbuffer.0).is_none() {
            log::debug!("WgpuBackend: renderbuffer {} already destroyed", renderbuffer.0);
        }
    }

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle> {
        let id = self.handles.allocate();
        self.framebuffers.insert(id, Framebuffer::default());
        Ok(FramebufferHandle(id))
    }

    fn attach_color(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: ColorAttachment,
    ) -> BackendResult<()> {
        let texture = self.texture(attachment.texture)?;
        let layer = match (texture.desc.dimension, attachment.face) {
            (TextureDimension::Cube, Some(face)) => face.layer(),
            (TextureDimension::D2, None) => 0,
            (dimension, face) => {
                return Err(BackendError::InvalidTextureAccess(format!(
                    "cannot attach face {:?} of a {:?} texture",
                    face, dimension
                )))
            }
        };
        Self::check_subresource(
            &texture.desc,
            TextureSubresource {
                layer,
                mip_level: attachment.mip_level,
            },
        )?;
        if !texture.desc.usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            return Err(BackendError::InvalidTextureAccess(format!(
                "{:?} was not created with RENDER_ATTACHMENT",
                texture.desc.label
            )));
        }
        if !self.framebuffers.contains_key(&framebuffer.0) {
            return Err(framebuffer.invalid());
        }
        self.end_pass();
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer.0) {
            fb.color = Some(attachment);
        }
        Ok(())
    }

    fn attach_depth(
        &mut self,
        framebuffer: FramebufferHandle,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(renderbuffer.invalid());
        }
        if !self.framebuffers.contains_key(&framebuffer.0) {
            return Err(framebuffer.invalid());
        }
        self.end_pass();
        if let Some(fb) = self.framebuffers.get_mut(&framebuffer.0) {
            fb.depth = Some(renderbuffer);
        }
        Ok(())
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if !framebuffer.is_set() {
            return;
        }
        self.end_pass();
        if self.framebuffers.remove(&framebuffer.0).is_none() {
            log::debug!("WgpuBackend: framebuffer {} already destroyed", framebuffer.0);
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(desc.name),
            source: wgpu::ShaderSource::Wgsl(desc.source.into()),
        });
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(BackendError::ShaderCompilationFailed {
                name: desc.name.to_string(),
                log: error.to_string(),
            });
        }

        let uniforms = UniformBlock::new(desc.name, desc.uniforms);
        let block_size = uniforms.layout().size() as u64;
        let uniform_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(desc.name),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(block_size),
                },
                count: None,
            }],
        });

        let texture_layout = (!desc.samplers.is_empty()).then(|| {
            let entries: Vec<wgpu::BindGroupLayoutEntry> = desc
                .samplers
                .iter()
                .enumerate()
                .flat_map(|(i, sampler)| {
                    let view_dimension = match sampler.dimension {
                        TextureDimension::D2 => wgpu::TextureViewDimension::D2,
                        TextureDimension::Cube => wgpu::TextureViewDimension::Cube,
                    };
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: 2 * i as u32,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                                view_dimension,
                                multisampled: false,
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: 2 * i as u32 + 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ]
                })
                .collect();
            self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.name),
                entries: &entries,
            })
        });

        let mut layouts = vec![&uniform_layout];
        if let Some(layout) = &texture_layout {
            layouts.push(layout);
        }
        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.name),
            bind_group_layouts: &layouts,
            push_constant_ranges: &[],
        });

        let alignment = self.device.limits().min_uniform_buffer_offset_alignment as u64;
        let ring = UniformRing::new(&self.device, &uniform_layout, block_size, alignment);

        log::info!("Created program '{}'", desc.name);
        let id = self.handles.allocate();
        self.programs.insert(
            id,
            GpuProgram {
                desc: *desc,
                module,
                uniforms,
                sampler_units: desc.samplers.iter().map(|s| s.default_unit).collect(),
                texture_layout,
                pipeline_layout,
                ring,
            },
        );
        Ok(ProgramHandle(id))
    }

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> BackendResult<()> {
        let gpu = self.programs.get_mut(&program.0).ok_or_else(|| program.invalid())?;
        if let Some((index, _)) = gpu.desc.sampler(name) {
            return match value {
                UniformValue::Int(unit) if unit >= 0 => {
                    gpu.sampler_units[index] = unit as u32;
                    Ok(())
                }
                other => Err(BackendError::UniformTypeMismatch {
                    name: name.to_string(),
                    expected: UniformType::Int,
                    actual: other.ty(),
                }),
            };
        }
        gpu.uniforms.set(name, value)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if !program.is_set() {
            return;
        }
        self.end_pass();
        if self.programs.remove(&program.0).is_none() {
            log::debug!("WgpuBackend: program {} already destroyed", program.0);
        }
        self.pipelines.retain(|key, _| key.program != program.0);
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> BackendResult<()> {
        if let Some(fb) = framebuffer {
            if !self.framebuffers.contains_key(&fb.0) {
                return Err(fb.invalid());
            }
        }
        if self.bound_framebuffer != framebuffer {
            self.end_pass();
        }
        self.bound_framebuffer = framebuffer;
        Ok(())
    }

    fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
    }

    fn clear(&mut self, color: [f32; 4]) -> BackendResult<()> {
        self.end_pass();
        self.begin_pass(Some(color))
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> BackendResult<()> {
        if !texture.is_set() {
            self.texture_units.remove(&unit);
            return Ok(());
        }
        if !self.textures.contains_key(&texture.0) {
            return Err(texture.invalid());
        }
        self.texture_units.insert(unit, texture);
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> BackendResult<()> {
        let program = self.programs.get(&call.program.0).ok_or_else(|| call.program.invalid())?;
        let vertex_array = self
            .vertex_arrays
            .get(&call.vertex_array.0)
            .ok_or_else(|| call.vertex_array.invalid())?
            .clone();
        let vertex_buffer = self
            .buffers
            .get(&vertex_array.vertex_buffer.0)
            .ok_or_else(|| vertex_array.vertex_buffer.invalid())?;
        match call.range {
            DrawRange::Arrays { first, count } => {
                let available = vertex_buffer.size / vertex_array.layout.array_stride.max(1);
                if u64::from(first) + u64::from(count) > available {
                    return Err(BackendError::InvalidTextureAccess(format!(
                        "draw of {} vertices from {} exceeds the {} in the vertex array",
                        count, first, available
                    )));
                }
            }
            DrawRange::Indexed { count } => {
                let (index_buffer, format) = vertex_array
                    .index_buffer
                    .ok_or_else(|| BackendError::InvalidTextureAccess("indexed draw without indices".into()))?;
                let index_size = match format {
                    IndexFormat::Uint16 => 2,
                    IndexFormat::Uint32 => 4,
                };
                let size = self.buffers.get(&index_buffer.0).ok_or_else(|| index_buffer.invalid())?.size;
                if u64::from(count) * index_size > size {
                    return Err(BackendError::InvalidTextureAccess(format!(
                        "indexed draw of {} exceeds the index buffer",
                        count
                    )));
                }
            }
        }
        if program.ring.is_full() {
            log::debug!("Uniform ring of '{}' is full, submitting early", program.desc.name);
            self.submit();
        }

        if self.pending_pass.is_none() {
            self.begin_pass(None)?;
        }
        let (color_format, has_depth, extent) = match &self.pending_pass {
            Some(pass) => (pass.color_format, pass.depth_view.is_some(), pass.extent),
            None => return Err(BackendError::IncompleteFramebuffer("no pass is recording".into())),
        };

        let key = PipelineKey {
            program: call.program.0,
            layout: vertex_array.layout.clone(),
            topology: call.topology,
            depth: has_depth.then_some(call.depth),
            color_format,
        };
        self.pipeline(&key)?;

        let program = self.programs.get(&call.program.0).ok_or_else(|| call.program.invalid())?;
        let textures = self.texture_bind_group(program);
        let Some(program) = self.programs.get_mut(&call.program.0) else {
            return Err(call.program.invalid());
        };
        let uniform_offset = program.ring.push(program.uniforms.bytes());

        let draw = PendingDraw {
            pipeline: key,
            program: call.program.0,
            uniform_offset,
            textures,
            vertex_buffer: vertex_array.vertex_buffer.0,
            index_buffer: vertex_array.index_buffer.map(|(buffer, format)| (buffer.0, format)),
            range: call.range,
            viewport: (
                self.viewport.0.clamp(1, extent.0),
                self.viewport.1.clamp(1, extent.1),
            ),
        };
        if let Some(pass) = self.pending_pass.as_mut() {
            pass.draws.push(draw);
        }
        Ok(())
    }

    fn flush(&mut self) -> BackendResult<()> {
        self.submit();
        Ok(())
    }
}

// Additional methods for egui integration
impl WgpuBackend {
    /// Get reference to the wgpu device (for egui-wgpu Renderer creation)
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to the wgpu queue (for egui-wgpu buffer updates)
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Get the surface format as wgpu type (for egui-wgpu Renderer creation)
    pub fn wgpu_surface_format(&self) -> wgpu::TextureFormat {
        match &self.presentation {
            Presentation::Surface { config, .. } => config.format,
            Presentation::Headless { format, .. } => *format,
        }
    }

    /// Get device, queue, and encoder together for operations that need all three.
    /// Pending scene work is recorded first so the egui pass draws on top of it.
    pub fn device_queue_encoder(&mut self) -> (&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder) {
        self.end_pass();
        let encoder = self.encoder.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                })
        });
        (&self.device, &self.queue, encoder)
    }

    /// Render egui onto the default framebuffer of the current frame.
    pub fn render_egui(
        &mut self,
        renderer: &egui_wgpu::Renderer,
        paint_jobs: &[egui::ClippedPrimitive],
        screen_descriptor: &egui_wgpu::ScreenDescriptor,
    ) {
        self.end_pass();
        let view = match &self.presentation {
            Presentation::Surface { frame: Some(frame), .. } => {
                frame.texture.create_view(&wgpu::TextureViewDescriptor::default())
            }
            Presentation::Surface { frame: None, .. } => return,
            Presentation::Headless { texture, .. } => texture.create_view(&wgpu::TextureViewDescriptor::default()),
        };
        let encoder = self.encoder();

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("egui Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load, // Preserve existing content
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        renderer.render(&mut render_pass, paint_jobs, screen_descriptor);
    }
}

/// The GL backend leaves cube texture to buffer copies unimplemented and
/// returns zeros.
fn cube_readback_supported(backend: wgpu::Backend) -> bool {
    backend != wgpu::Backend::Gl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_readback_excludes_gl() {
        assert!(!cube_readback_supported(wgpu::Backend::Gl));
        for backend in [wgpu::Backend::Vulkan, wgpu::Backend::Metal, wgpu::Backend::Dx12] {
            assert!(cube_readback_supported(backend), "{:?}", backend);
        }
    }
}
