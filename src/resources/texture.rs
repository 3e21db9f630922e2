//! Texture loading and management

use crate::backend::texels;
use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{AssetError, AssetResult};
use glam::Vec4;
use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};

/// Loaded 8-bit texture data
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA bytes, row 0 at the top
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AssetResult<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path).map_err(|source| AssetError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_image(img, &name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    /// Upload as a linear `Rgba8Unorm` texture. Shaders decode gamma themselves.
    pub fn upload<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> BackendResult<TextureHandle> {
        let desc = TextureDescriptor::sampled_2d(&self.name, self.width, self.height, TextureFormat::Rgba8Unorm);
        let handle = backend.create_texture(&desc)?;
        if let Err(e) = backend.write_texture(handle, TextureSubresource::BASE, &self.data) {
            backend.destroy_texture(handle);
            return Err(e);
        }
        Ok(handle)
    }
}

/// Floating point equirectangular environment image
#[derive(Debug, Clone)]
pub struct HdrImage {
    pub width: u32,
    pub height: u32,
    /// RGBA texels, row 0 at the top
    pub pixels: Vec<Vec4>,
}

impl HdrImage {
    /// Load a Radiance `.hdr` (or any float-capable format `image` decodes).
    pub fn from_file<P: AsRef<Path>>(path: P) -> AssetResult<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| AssetError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = img.to_rgba32f();
        let (width, height) = rgba.dimensions();
        let pixels = rgba
            .pixels()
            .map(|p| Vec4::new(p.0[0], p.0[1], p.0[2], 1.0))
            .collect();
        log::info!("Loaded HDR image {} ({}x{})", path.display(), width, height);
        Ok(Self { width, height, pixels })
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Vec4>) -> AssetResult<Self> {
        if width == 0 || height == 0 || pixels.len() != (width * height) as usize {
            return Err(AssetError::InvalidData(format!(
                "{} texels do not form a {}x{} image",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self { width, height, pixels })
    }

    /// Image filled with one color.
    pub fn constant(width: u32, height: u32, color: Vec4) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; (width * height) as usize],
        }
    }

    /// Upload as an `Rgba16Float` 2D texture sampled with clamped edges.
    pub fn upload<B: GraphicsBackend + ?Sized>(&self, backend: &mut B, label: &str) -> BackendResult<TextureHandle> {
        let desc = TextureDescriptor::sampled_2d(label, self.width, self.height, TextureFormat::Rgba16Float);
        let handle = backend.create_texture(&desc)?;
        let bytes = texels::encode(TextureFormat::Rgba16Float, &self.pixels);
        if let Err(e) = backend.write_texture(handle, TextureSubresource::BASE, &bytes) {
            backend.destroy_texture(handle);
            return Err(e);
        }
        Ok(handle)
    }
}

/// Neutral textures substituted for anything missing at draw time
#[derive(Debug, Clone, Copy)]
pub struct Placeholders {
    pub white: TextureHandle,
    pub black: TextureHandle,
    pub flat_normal: TextureHandle,
    pub black_cube: TextureHandle,
}

impl Placeholders {
    pub fn create<B: GraphicsBackend + ?Sized>(backend: &mut B) -> BackendResult<Self> {
        let white = TextureData::solid_color([255, 255, 255, 255], "placeholder_white").upload(backend)?;
        let black = TextureData::solid_color([0, 0, 0, 255], "placeholder_black").upload(backend)?;
        // tangent-space +Z
        let flat_normal = TextureData::solid_color([128, 128, 255, 255], "placeholder_normal").upload(backend)?;

        let black_cube = backend.create_texture(&TextureDescriptor {
            label: Some("placeholder_cube".to_string()),
            width: 1,
            height: 1,
            dimension: TextureDimension::Cube,
            mip_levels: 1,
            format: TextureFormat::Rgba16Float,
            usage: TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST,
        })?;
        let black_texel = texels::encode(TextureFormat::Rgba16Float, &[Vec4::W]);
        for face in CubeFace::ALL {
            backend.write_texture(black_cube, TextureSubresource::face(face, 0), &black_texel)?;
        }

        Ok(Self {
            white,
            black,
            flat_normal,
            black_cube,
        })
    }

    pub fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for texture in [self.white, self.black, self.flat_normal, self.black_cube] {
            backend.destroy_texture(texture);
        }
    }
}

/// Read back every face of a cubemap mip and write them as `face_<i>.hdr`.
pub fn dump_cube_faces<B: GraphicsBackend + ?Sized>(
    backend: &mut B,
    texture: TextureHandle,
    mip_level: u32,
    dir: &Path,
) -> AssetResult<Vec<PathBuf>> {
    let desc = backend
        .texture_descriptor(texture)
        .cloned()
        .ok_or_else(|| texture.invalid())?;
    if desc.dimension != TextureDimension::Cube {
        return Err(AssetError::InvalidData(format!("{:?} is not a cubemap", desc.label)));
    }
    // every face is read back before anything touches the disk
    let (width, height) = desc.mip_size(mip_level);
    let mut faces = Vec::with_capacity(6);
    for face in CubeFace::ALL {
        let bytes = backend.read_texture(texture, TextureSubresource::face(face, mip_level))?;
        let pixels: Vec<image::Rgb<f32>> = texels::decode(desc.format, &bytes)
            .into_iter()
            .map(|t| image::Rgb([t.x, t.y, t.z]))
            .collect();
        faces.push((face, pixels));
    }

    std::fs::create_dir_all(dir).map_err(|source| AssetError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut written = Vec::with_capacity(6);
    for (face, pixels) in faces {
        let path = dir.join(format!("face_{}.hdr", face.layer()));
        let file = std::fs::File::create(&path).map_err(|source| AssetError::Io {
            path: path.clone(),
            source,
        })?;
        image::codecs::hdr::HdrEncoder::new(std::io::BufWriter::new(file))
            .encode(&pixels, width as usize, height as usize)
            .map_err(|source| AssetError::Image {
                path: path.clone(),
                source,
            })?;
        log::info!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;

    #[test]
    fn test_hdr_upload_is_half_float() {
        let mut backend = SoftwareBackend::new(4, 4);
        let image = HdrImage::constant(2, 1, Vec4::new(0.5, 2.0, 8.0, 1.0));
        let texture = image.upload(&mut backend, "hdr_texture").unwrap();
        let desc = backend.texture_descriptor(texture).unwrap();
        assert_eq!(desc.format, TextureFormat::Rgba16Float);
        assert_eq!((desc.width, desc.height), (2, 1));

        let bytes = backend.read_texture(texture, TextureSubresource::BASE).unwrap();
        let texels = texels::decode(TextureFormat::Rgba16Float, &bytes);
        assert_eq!(texels, vec![Vec4::new(0.5, 2.0, 8.0, 1.0); 2]);
    }

    #[test]
    fn test_from_pixels_checks_size() {
        assert!(HdrImage::from_pixels(2, 2, vec![Vec4::ONE; 3]).is_err());
        assert!(HdrImage::from_pixels(2, 2, vec![Vec4::ONE; 4]).is_ok());
    }

    #[test]
    fn test_missing_texture_file_is_an_error() {
        let err = TextureData::from_file("does/not/exist.png").err().unwrap();
        assert!(matches!(err, AssetError::Image { .. }));
    }

    #[test]
    fn test_placeholders_are_distinct() {
        let mut backend = SoftwareBackend::new(4, 4);
        let placeholders = Placeholders::create(&mut backend).unwrap();
        assert_eq!(backend.live_textures(), 4);
        assert_eq!(
            backend.texture_descriptor(placeholders.black_cube).unwrap().dimension,
            TextureDimension::Cube
        );
        placeholders.release(&mut backend);
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn test_dump_cube_faces_writes_nothing_when_readback_fails() {
        let mut backend = SoftwareBackend::new(4, 4);
        let cube = backend
            .create_texture(&TextureDescriptor::cube("env", 2, 1, TextureFormat::Rgba16Float))
            .unwrap();
        let dir = std::env::temp_dir().join(format!("pbr-renderer-dump-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        // mip 3 does not exist, so the first face read fails
        let err = dump_cube_faces(&mut backend, cube, 3, &dir).err().unwrap();
        assert!(matches!(err, AssetError::Backend(_)), "{:?}", err);
        assert!(!dir.exists());

        let written = dump_cube_faces(&mut backend, cube, 0, &dir).unwrap();
        assert_eq!(written.len(), 6);
        assert!(written.iter().all(|path| path.exists()));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
