//! CPU reference backend.
//!
//! This backend keeps every texture in system memory and evaluates the capture
//! programs per texel with the same math as their shaders, so the IBL pipeline
//! can run and be inspected without GPU hardware. Draws of the scene programs
//! are only recorded.

mod kernels;

use std::collections::HashMap;

use glam::{Mat4, Vec4};

use crate::backend::texels;
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::backend::uniforms::UniformBlock;
use crate::shaders::ProgramKind;

use kernels::{Levels, TexelView};

/// One command as the software backend saw it
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    BeginFrame,
    EndFrame,
    Clear {
        framebuffer: Option<FramebufferHandle>,
        color: [f32; 4],
    },
    Draw {
        program: &'static str,
        framebuffer: Option<FramebufferHandle>,
        target: Option<ColorAttachment>,
        vertex_count: u32,
        /// Whether the draw was evaluated rather than only recorded
        evaluated: bool,
    },
}

struct SoftTexture {
    desc: TextureDescriptor,
    levels: Levels,
}

struct SoftBuffer {
    len: usize,
}

struct SoftProgram {
    desc: ProgramDescriptor,
    uniforms: UniformBlock,
    sampler_units: Vec<u32>,
}

#[derive(Default)]
struct SoftFramebuffer {
    color: Option<ColorAttachment>,
    depth: Option<RenderbufferHandle>,
}

/// Software backend
pub struct SoftwareBackend {
    handles: HandleAllocator,
    surface_size: (u32, u32),
    buffers: HashMap<u64, SoftBuffer>,
    vertex_arrays: HashMap<u64, VertexArrayDescriptor>,
    textures: HashMap<u64, SoftTexture>,
    programs: HashMap<u64, SoftProgram>,
    framebuffers: HashMap<u64, SoftFramebuffer>,
    renderbuffers: HashMap<u64, (u32, u32)>,
    bound_framebuffer: Option<FramebufferHandle>,
    viewport: (u32, u32),
    texture_units: HashMap<u32, TextureHandle>,
    commands: Vec<RecordedCommand>,
}

impl SoftwareBackend {
    pub fn new(width: u32, height: u32) -> Self {
        log::info!("Software backend created ({}x{})", width, height);
        Self {
            handles: HandleAllocator::new(),
            surface_size: (width, height),
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            programs: HashMap::new(),
            framebuffers: HashMap::new(),
            renderbuffers: HashMap::new(),
            bound_framebuffer: None,
            viewport: (width, height),
            texture_units: HashMap::new(),
            commands: Vec::new(),
        }
    }

    /// Commands recorded since creation or the last [`Self::take_commands`]
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_renderbuffers(&self) -> usize {
        self.renderbuffers.len()
    }

    /// Texture currently bound to a unit
    pub fn texture_unit(&self, unit: u32) -> Option<TextureHandle> {
        self.texture_units.get(&unit).copied()
    }

    /// Current texture unit of a sampler uniform
    pub fn sampler_unit(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        let program = self.programs.get(&program.0)?;
        let (index, _) = program.desc.sampler(name)?;
        Some(program.sampler_units[index])
    }

    /// Current value of a plain uniform
    pub fn uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformValue> {
        self.programs.get(&program.0)?.uniforms.get(name)
    }

    fn texture(&self, texture: TextureHandle) -> BackendResult<&SoftTexture> {
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

    /// Attachment the next draw or clear writes, after checking completeness.
    fn render_target(&self) -> BackendResult<Option<ColorAttachment>> {
        let Some(handle) = self.bound_framebuffer else {
            return Ok(None);
        };
        let framebuffer = self.framebuffers.get(&handle.0).ok_or_else(|| handle.invalid())?;
        let attachment = framebuffer
            .color
            .ok_or_else(|| BackendError::IncompleteFramebuffer("no color attachment".into()))?;
        let texture = self.texture(attachment.texture).map_err(|_| {
            BackendError::IncompleteFramebuffer("color attachment was destroyed".into())
        })?;
        let size = texture.desc.mip_size(attachment.mip_level);
        if let Some(depth) = framebuffer.depth {
            let depth_size = self.renderbuffers.get(&depth.0).ok_or_else(|| {
                BackendError::IncompleteFramebuffer("depth attachment was destroyed".into())
            })?;
            if *depth_size != size {
                return Err(BackendError::IncompleteFramebuffer(format!(
                    "depth {}x{} does not match color {}x{}",
                    depth_size.0, depth_size.1, size.0, size.1
                )));
            }
        }
        Ok(Some(attachment))
    }

    /// Region of the attachment covered by the viewport.
    fn target_extent(&self, attachment: &ColorAttachment) -> BackendResult<(u32, u32, u32)> {
        let texture = self.texture(attachment.texture)?;
        let (width, height) = texture.desc.mip_size(attachment.mip_level);
        Ok((width, self.viewport.0.min(width), self.viewport.1.min(height)))
    }

    fn store(&mut self, attachment: &ColorAttachment, width: u32, texels: Vec<(u32, u32, Vec4)>) -> BackendResult<()> {
        let texture = self
            .textures
            .get_mut(&attachment.texture.0)
            .ok_or_else(|| attachment.texture.invalid())?;
        let format = texture.desc.format;
        let layer = attachment.face.map_or(0, |face| face.layer()) as usize;
        let level = &mut texture.levels[layer][attachment.mip_level as usize];
        for (x, y, texel) in texels {
            level[(y * width + x) as usize] = texels::quantize(format, texel);
        }
        Ok(())
    }

    /// Source texture of a program's sampler, checked against its declared dimension.
    fn sampled(&self, program: &SoftProgram, sampler: usize) -> BackendResult<&SoftTexture> {
        let decl = &program.desc.samplers[sampler];
        let unit = program.sampler_units[sampler];
        let handle = self.texture_units.get(&unit).copied().ok_or_else(|| {
            BackendError::InvalidTextureAccess(format!(
                "'{}' samples unit {} with no texture bound",
                decl.name, unit
            ))
        })?;
        let texture = self.texture(handle)?;
        if texture.desc.dimension != decl.dimension {
            return Err(BackendError::InvalidTextureAccess(format!(
                "'{}' expects a {:?} texture",
                decl.name, decl.dimension
            )));
        }
        Ok(texture)
    }

    /// Run a capture program over the viewport of the bound attachment.
    fn evaluate(&mut self, program: ProgramHandle, attachment: &ColorAttachment) -> BackendResult<()> {
        let (width, w, h) = self.target_extent(attachment)?;
        let soft = self.programs.get(&program.0).ok_or_else(|| program.invalid())?;
        let mut texels = Vec::with_capacity((w * h) as usize);

        match soft.desc.kind {
            ProgramKind::BrdfIntegration => {
                let count = soft.uniforms.get_int("sampleCount").unwrap_or(1024).max(1) as u32;
                for y in 0..h {
                    for x in 0..w {
                        let uv = kernels::quad_uv(x, y, w, h);
                        let scale_bias = kernels::integrate_brdf(uv.x, uv.y, count);
                        texels.push((x, y, Vec4::new(scale_bias.x, scale_bias.y, 0.0, 1.0)));
                    }
                }
            }
            kind => {
                let projection = soft.uniforms.get_mat4("projection").unwrap_or(Mat4::IDENTITY);
                let view = soft.uniforms.get_mat4("view").unwrap_or(Mat4::IDENTITY);
                let inv_view_proj = (projection * view).inverse();
                let source = self.sampled(soft, 0)?;
                let env = TexelView {
                    desc: &source.desc,
                    levels: &source.levels,
                };
                let address = soft.desc.samplers[0].address;
                let delta = soft.uniforms.get_float("sampleDelta").unwrap_or(0.025);
                let roughness = soft.uniforms.get_float("roughness").unwrap_or(0.0);
                let count = soft.uniforms.get_int("sampleCount").unwrap_or(1024).max(1) as u32;

                for y in 0..h {
                    for x in 0..w {
                        let dir = kernels::capture_direction(inv_view_proj, x, y, w, h);
                        let color = match kind {
                            ProgramKind::EquirectToCubemap => env
                                .sample_layer(0, 0, kernels::equirect_uv(dir), address)
                                .truncate(),
                            ProgramKind::Irradiance => kernels::irradiance(&env, dir, delta),
                            _ => kernels::prefilter(&env, dir, roughness, count),
                        };
                        texels.push((x, y, color.extend(1.0)));
                    }
                }
            }
        }

        self.store(attachment, width, texels)
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.surface_size = (width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn begin_frame(&mut self) -> BackendResult<()> {
        self.commands.push(RecordedCommand::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.commands.push(RecordedCommand::EndFrame);
        Ok(())
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle> {
        log::trace!("SoftwareBackend: creating buffer {:?} ({} bytes)", desc.label, data.len());
        let id = self.handles.allocate();
        self.buffers.insert(id, SoftBuffer { len: data.len() });
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if buffer.is_set() && self.buffers.remove(&buffer.0).is_none() {
            log::debug!("SoftwareBackend: buffer {} already destroyed", buffer.0);
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
            log::debug!("SoftwareBackend: vertex array {} already destroyed", vertex_array.0);
        }
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.mip_levels == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has an empty extent",
                desc.label
            )));
        }
        log::trace!(
            "SoftwareBackend: creating texture {:?} ({}x{}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.mip_levels
        );
        let levels = (0..desc.dimension.layer_count())
            .map(|_| {
                (0..desc.mip_levels)
                    .map(|mip| {
                        let (w, h) = desc.mip_size(mip);
                        vec![Vec4::ZERO; (w * h) as usize]
                    })
                    .collect()
            })
            .collect();
        let id = self.handles.allocate();
        self.textures.insert(
            id,
            SoftTexture {
                desc: desc.clone(),
                levels,
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
        let soft = self.textures.get_mut(&texture.0).ok_or_else(|| texture.invalid())?;
        Self::check_subresource(&soft.desc, subresource)?;
        let (w, h) = soft.desc.mip_size(subresource.mip_level);
        let expected = (w * h * soft.desc.format.bytes_per_pixel()) as usize;
        if data.len() != expected {
            return Err(BackendError::InvalidTextureAccess(format!(
                "expected {} bytes for {}x{}, got {}",
                expected,
                w,
                h,
                data.len()
            )));
        }
        soft.levels[subresource.layer as usize][subresource.mip_level as usize] =
            texels::decode(soft.desc.format, data);
        Ok(())
    }

    fn read_texture(
        &mut self,
        texture: TextureHandle,
        subresource: TextureSubresource,
    ) -> BackendResult<Vec<u8>> {
        let soft = self.texture(texture)?;
        Self::check_subresource(&soft.desc, subresource)?;
        let level = &soft.levels[subresource.layer as usize][subresource.mip_level as usize];
        Ok(texels::encode(soft.desc.format, level))
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0).map(|t| &t.desc)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if !texture.is_set() {
            return;
        }
        if self.textures.remove(&texture.0).is_none() {
            log::debug!("SoftwareBackend: texture {} already destroyed", texture.0);
        }
        self.texture_units.retain(|_, bound| *bound != texture);
    }

    fn create_renderbuffer(&mut self, width: u32, height: u32) -> BackendResult<RenderbufferHandle> {
        let id = self.handles.allocate();
        self.renderbuffers.insert(id, (width, height));
        Ok(RenderbufferHandle(id))
    }

    fn resize_renderbuffer(
        &mut self,
        renderbuffer: RenderbufferHandle,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        let size = self
            .renderbuffers
            .get_mut(&renderbuffer.0)
            .ok_or_else(|| renderbuffer.invalid())?;
        *size = (width, height);
        Ok(())
    }

    fn destroy_renderbuffer(&mut self, renderbuffer: RenderbufferHandle) {
        if renderbuffer.is_set() && self.renderbuffers.remove(&renderbuffer.0).is_none() {
            log::debug!("SoftwareBackend: renderbuffer {} already destroyed", renderbuffer.0);
        }
    }

    fn create_framebuffer(&mut self) -> BackendResult<FramebufferHandle> {
        let id = self.handles.allocate();
        self.framebuffers.insert(id, SoftFramebuffer::default());
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
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or_else(|| framebuffer.invalid())?;
        fb.color = Some(attachment);
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
        let fb = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or_else(|| framebuffer.invalid())?;
        fb.depth = Some(renderbuffer);
        Ok(())
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        if !framebuffer.is_set() {
            return;
        }
        if self.framebuffers.remove(&framebuffer.0).is_none() {
            log::debug!("SoftwareBackend: framebuffer {} already destroyed", framebuffer.0);
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        log::trace!("SoftwareBackend: creating program '{}'", desc.name);
        let id = self.handles.allocate();
        self.programs.insert(
            id,
            SoftProgram {
                desc: *desc,
                uniforms: UniformBlock::new(desc.name, desc.uniforms),
                sampler_units: desc.samplers.iter().map(|s| s.default_unit).collect(),
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
        let soft = self.programs.get_mut(&program.0).ok_or_else(|| program.invalid())?;
        if let Some((index, _)) = soft.desc.sampler(name) {
            return match value {
                UniformValue::Int(unit) if unit >= 0 => {
                    soft.sampler_units[index] = unit as u32;
                    Ok(())
                }
                other => Err(BackendError::UniformTypeMismatch {
                    name: name.to_string(),
                    expected: UniformType::Int,
                    actual: other.ty(),
                }),
            };
        }
        soft.uniforms.set(name, value)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if program.is_set() && self.programs.remove(&program.0).is_none() {
            log::debug!("SoftwareBackend: program {} already destroyed", program.0);
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> BackendResult<()> {
        if let Some(fb) = framebuffer {
            if !self.framebuffers.contains_key(&fb.0) {
                return Err(fb.invalid());
            }
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
        if let Some(attachment) = self.render_target()? {
            let (width, w, h) = self.target_extent(&attachment)?;
            let fill = Vec4::from_array(color);
            let texels = (0..h)
                .flat_map(|y| (0..w).map(move |x| (x, y, fill)))
                .collect();
            self.store(&attachment, width, texels)?;
        }
        self.commands.push(RecordedCommand::Clear {
            framebuffer: self.bound_framebuffer,
            color,
        });
        Ok(())
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
        let program_name = program.desc.name;
        let kind = program.desc.kind;
        let vertex_array = self
            .vertex_arrays
            .get(&call.vertex_array.0)
            .ok_or_else(|| call.vertex_array.invalid())?;
        if let DrawRange::Arrays { first, count } = call.range {
            let buffer = self
                .buffers
                .get(&vertex_array.vertex_buffer.0)
                .ok_or_else(|| vertex_array.vertex_buffer.invalid())?;
            let available = buffer.len as u64 / vertex_array.layout.array_stride.max(1);
            if u64::from(first) + u64::from(count) > available {
                return Err(BackendError::InvalidTextureAccess(format!(
                    "draw of {} vertices from {} exceeds the {} in the vertex array",
                    count, first, available
                )));
            }
        }

        let target = self.render_target()?;
        let capture = matches!(
            kind,
            ProgramKind::EquirectToCubemap
                | ProgramKind::Irradiance
                | ProgramKind::Prefilter
                | ProgramKind::BrdfIntegration
        );
        let evaluated = match &target {
            Some(attachment) if capture => {
                self.evaluate(call.program, attachment)?;
                true
            }
            _ => false,
        };

        log::trace!(
            "SoftwareBackend: draw '{}' ({} vertices) into {:?}",
            program_name,
            call.range.count(),
            target
        );
        self.commands.push(RecordedCommand::Draw {
            program: program_name,
            framebuffer: self.bound_framebuffer,
            target,
            vertex_count: call.range.count(),
            evaluated,
        });
        Ok(())
    }

    fn flush(&mut self) -> BackendResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shaders;

    fn cube_array(backend: &mut SoftwareBackend) -> VertexArrayHandle {
        let buffer = backend
            .create_buffer_init(
                &BufferDescriptor {
                    label: None,
                    usage: BufferUsage::VERTEX,
                },
                &[0u8; 36 * 12],
            )
            .unwrap();
        backend
            .create_vertex_array(&VertexArrayDescriptor {
                label: None,
                vertex_buffer: buffer,
                layout: position_layout(),
                index_buffer: None,
            })
            .unwrap()
    }

    #[test]
    fn test_operations_on_unset_handles_fail() {
        let mut backend = SoftwareBackend::new(4, 4);
        let err = backend
            .write_texture(TextureHandle::UNSET, TextureSubresource::BASE, &[])
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidHandle { kind: ResourceKind::Texture, id: 0 }));
        assert!(backend.bind_framebuffer(Some(FramebufferHandle::UNSET)).is_err());
        // destroying unset handles is a no-op
        backend.destroy_texture(TextureHandle::UNSET);
        backend.destroy_framebuffer(FramebufferHandle::UNSET);
    }

    #[test]
    fn test_destroyed_handle_is_invalid() {
        let mut backend = SoftwareBackend::new(4, 4);
        let desc = TextureDescriptor::sampled_2d("t", 2, 2, TextureFormat::Rgba8Unorm);
        let texture = backend.create_texture(&desc).unwrap();
        backend.bind_texture(0, texture).unwrap();
        backend.destroy_texture(texture);
        backend.destroy_texture(texture);
        assert!(backend.read_texture(texture, TextureSubresource::BASE).is_err());
        assert_eq!(backend.texture_unit(0), None);
    }

    #[test]
    fn test_write_then_read_back() {
        let mut backend = SoftwareBackend::new(4, 4);
        let desc = TextureDescriptor::sampled_2d("t", 2, 1, TextureFormat::Rgba8Unorm);
        let texture = backend.create_texture(&desc).unwrap();
        let data = [10, 20, 30, 255, 40, 50, 60, 255];
        backend.write_texture(texture, TextureSubresource::BASE, &data).unwrap();
        assert_eq!(backend.read_texture(texture, TextureSubresource::BASE).unwrap(), data);
        assert!(backend.write_texture(texture, TextureSubresource::BASE, &data[..4]).is_err());
    }

    #[test]
    fn test_depth_size_mismatch_is_incomplete() {
        let mut backend = SoftwareBackend::new(4, 4);
        let cube = backend
            .create_texture(&TextureDescriptor::cube("c", 8, 2, TextureFormat::Rgba16Float))
            .unwrap();
        let fb = backend.create_framebuffer().unwrap();
        let rb = backend.create_renderbuffer(8, 8).unwrap();
        backend.attach_depth(fb, rb).unwrap();
        backend
            .attach_color(
                fb,
                ColorAttachment {
                    texture: cube,
                    face: Some(CubeFace::PositiveX),
                    mip_level: 1,
                },
            )
            .unwrap();
        backend.bind_framebuffer(Some(fb)).unwrap();
        assert!(matches!(backend.clear([0.0; 4]), Err(BackendError::IncompleteFramebuffer(_))));
        backend.resize_renderbuffer(rb, 4, 4).unwrap();
        backend.clear([0.0; 4]).unwrap();
    }

    #[test]
    fn test_sampler_uniforms_select_units() {
        let mut backend = SoftwareBackend::new(4, 4);
        let program = backend.create_program(&shaders::PBR).unwrap();
        assert_eq!(backend.sampler_unit(program, "prefilter_map"), Some(7));
        backend.set_uniform(program, "albedo_map", UniformValue::Int(3)).unwrap();
        assert_eq!(backend.sampler_unit(program, "albedo_map"), Some(3));
        assert!(backend
            .set_uniform(program, "albedo_map", UniformValue::Float(3.0))
            .is_err());
    }

    #[test]
    fn test_equirect_capture_fills_face() {
        let mut backend = SoftwareBackend::new(4, 4);
        let source = backend
            .create_texture(&TextureDescriptor::sampled_2d("hdr", 2, 1, TextureFormat::Rgba32Float))
            .unwrap();
        let color = [0.5f32, 1.5, 3.0, 1.0];
        let bytes: Vec<u8> = color.iter().chain(color.iter()).flat_map(|v| v.to_le_bytes()).collect();
        backend.write_texture(source, TextureSubresource::BASE, &bytes).unwrap();

        let cube = backend
            .create_texture(&TextureDescriptor::cube("env", 4, 1, TextureFormat::Rgba32Float))
            .unwrap();
        let program = backend.create_program(&shaders::EQUIRECT_TO_CUBEMAP).unwrap();
        backend
            .set_uniform(
                program,
                "projection",
                Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 10.0).into(),
            )
            .unwrap();
        backend.bind_texture(0, source).unwrap();
        let fb = backend.create_framebuffer().unwrap();
        backend
            .attach_color(
                fb,
                ColorAttachment {
                    texture: cube,
                    face: Some(CubeFace::NegativeY),
                    mip_level: 0,
                },
            )
            .unwrap();
        backend.bind_framebuffer(Some(fb)).unwrap();
        backend.set_viewport(4, 4);
        let vertex_array = cube_array(&mut backend);
        backend
            .draw(&DrawCall {
                program,
                vertex_array,
                topology: PrimitiveTopology::TriangleList,
                range: DrawRange::Arrays { first: 0, count: 36 },
                depth: DepthState::DISABLED,
            })
            .unwrap();

        let face = backend
            .read_texture(cube, TextureSubresource::face(CubeFace::NegativeY, 0))
            .unwrap();
        for texel in texels::decode(TextureFormat::Rgba32Float, &face) {
            assert!((texel - Vec4::from_array(color)).abs().max_element() < 1e-5);
        }
        assert!(matches!(
            backend.commands().last(),
            Some(RecordedCommand::Draw { evaluated: true, vertex_count: 36, .. })
        ));
    }

    #[test]
    fn test_scene_draws_are_recorded_only() {
        let mut backend = SoftwareBackend::new(4, 4);
        let program = backend.create_program(&shaders::BACKGROUND).unwrap();
        let vertex_array = cube_array(&mut backend);
        backend
            .draw(&DrawCall {
                program,
                vertex_array,
                topology: PrimitiveTopology::TriangleList,
                range: DrawRange::Arrays { first: 0, count: 36 },
                depth: DepthState::SKYBOX,
            })
            .unwrap();
        assert_eq!(
            backend.take_commands(),
            vec![RecordedCommand::Draw {
                program: "background",
                framebuffer: None,
                target: None,
                vertex_count: 36,
                evaluated: false,
            }]
        );
        assert!(backend.commands().is_empty());
    }
}
