//! Uniform block packing
//!
//! Each program keeps its plain uniforms in one block laid out with WGSL
//! uniform address space rules, so the same bytes can be uploaded to a uniform
//! buffer unchanged. Lookups go by name every time.

use crate::backend::traits::{BackendError, BackendResult};
use crate::backend::types::{UniformDecl, UniformType, UniformValue};

impl UniformType {
    /// (alignment, size) in bytes inside a uniform struct.
    pub fn layout(&self) -> (u32, u32) {
        match self {
            // bool is not host-shareable in WGSL and travels as an i32
            UniformType::Bool | UniformType::Int | UniformType::Float => (4, 4),
            UniformType::Vec2 => (8, 8),
            UniformType::Vec3 => (16, 12),
            UniformType::Vec4 => (16, 16),
            UniformType::Mat2 => (8, 16),
            UniformType::Mat3 => (16, 48),
            UniformType::Mat4 => (16, 64),
        }
    }
}

fn round_up(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

/// Byte offsets of a uniform struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformLayout {
    offsets: Vec<u32>,
    size: u32,
}

impl UniformLayout {
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut offsets = Vec::with_capacity(decls.len());
        let mut cursor = 0;
        let mut struct_align = 16;
        for decl in decls {
            let (align, size) = decl.ty.layout();
            struct_align = struct_align.max(align);
            cursor = round_up(cursor, align);
            offsets.push(cursor);
            cursor += size;
        }
        Self {
            offsets,
            size: round_up(cursor.max(16), struct_align),
        }
    }

    pub fn offset(&self, index: usize) -> u32 {
        self.offsets[index]
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Current uniform values of a program, kept both typed and packed
#[derive(Debug, Clone)]
pub struct UniformBlock {
    program: &'static str,
    decls: &'static [UniformDecl],
    layout: UniformLayout,
    values: Vec<UniformValue>,
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(program: &'static str, decls: &'static [UniformDecl]) -> Self {
        let layout = UniformLayout::new(decls);
        let bytes = vec![0; layout.size() as usize];
        Self {
            program,
            decls,
            values: decls.iter().map(|decl| UniformValue::zeroed(decl.ty)).collect(),
            layout,
            bytes,
        }
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.decls.iter().position(|decl| decl.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Store a value by name, checking it against the declared type.
    pub fn set(&mut self, name: &str, value: UniformValue) -> BackendResult<()> {
        let index = self.index_of(name).ok_or_else(|| BackendError::UnknownUniform {
            program: self.program.to_string(),
            name: name.to_string(),
        })?;
        let expected = self.decls[index].ty;
        if value.ty() != expected {
            return Err(BackendError::UniformTypeMismatch {
                name: name.to_string(),
                expected,
                actual: value.ty(),
            });
        }
        self.values[index] = value;
        let offset = self.layout.offset(index) as usize;
        write_value(&mut self.bytes[offset..], value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        self.index_of(name).map(|index| self.values[index])
    }

    pub fn get_mat4(&self, name: &str) -> Option<glam::Mat4> {
        match self.get(name)? {
            UniformValue::Mat4(m) => Some(m),
            _ => None,
        }
    }

    pub fn get_float(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            UniformValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        match self.get(name)? {
            UniformValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }
}

fn put_floats(dst: &mut [u8], at: usize, floats: &[f32]) {
    let bytes: &[u8] = bytemuck::cast_slice(floats);
    dst[at..at + bytes.len()].copy_from_slice(bytes);
}

fn write_value(dst: &mut [u8], value: UniformValue) {
    match value {
        UniformValue::Bool(v) => dst[..4].copy_from_slice(&(v as i32).to_le_bytes()),
        UniformValue::Int(v) => dst[..4].copy_from_slice(&v.to_le_bytes()),
        UniformValue::Float(v) => put_floats(dst, 0, &[v]),
        UniformValue::Vec2(v) => put_floats(dst, 0, &v.to_array()),
        UniformValue::Vec3(v) => put_floats(dst, 0, &v.to_array()),
        UniformValue::Vec4(v) => put_floats(dst, 0, &v.to_array()),
        UniformValue::Mat2(m) => put_floats(dst, 0, &m.to_cols_array()),
        UniformValue::Mat3(m) => {
            // columns are padded to vec4
            for (i, column) in m.to_cols_array_2d().iter().enumerate() {
                put_floats(dst, i * 16, column);
            }
        }
        UniformValue::Mat4(m) => put_floats(dst, 0, &m.to_cols_array()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat3, Vec3};

    static DECLS: [UniformDecl; 5] = [
        UniformDecl::new("roughness", UniformType::Float),
        UniformDecl::new("color", UniformType::Vec3),
        UniformDecl::new("metallic", UniformType::Float),
        UniformDecl::new("normalMatrix", UniformType::Mat3),
        UniformDecl::new("light.isDirLight", UniformType::Bool),
    ];

    #[test]
    fn test_layout_follows_wgsl_alignment() {
        let layout = UniformLayout::new(&DECLS);
        // vec3 aligns to 16 and leaves room for a trailing scalar
        assert_eq!(layout.offsets(), &[0, 16, 28, 32, 80]);
        assert_eq!(layout.size(), 96);
    }

    #[test]
    fn test_block_writes_by_name() {
        let mut block = UniformBlock::new("test", &DECLS);
        block.set("metallic", UniformValue::Float(0.5)).unwrap();
        block.set("light.isDirLight", UniformValue::Bool(true)).unwrap();
        assert_eq!(&block.bytes()[28..32], &0.5f32.to_le_bytes());
        assert_eq!(&block.bytes()[80..84], &1i32.to_le_bytes());
        assert_eq!(block.get_float("metallic"), Some(0.5));
    }

    #[test]
    fn test_mat3_columns_are_padded() {
        let mut block = UniformBlock::new("test", &DECLS);
        let m = Mat3::from_cols(Vec3::X, Vec3::Y * 2.0, Vec3::Z * 3.0);
        block.set("normalMatrix", m.into()).unwrap();
        let floats: Vec<f32> = block.bytes()[32..80]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[5], 2.0);
        assert_eq!(floats[10], 3.0);
    }

    #[test]
    fn test_unknown_and_mismatched_uniforms() {
        let mut block = UniformBlock::new("test", &DECLS);
        assert!(matches!(
            block.set("missing", UniformValue::Float(1.0)),
            Err(BackendError::UnknownUniform { .. })
        ));
        assert!(matches!(
            block.set("color", UniformValue::Float(1.0)),
            Err(BackendError::UniformTypeMismatch { .. })
        ));
    }
}
