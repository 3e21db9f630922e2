//! glTF model import
//!
//! Only triangle primitives are imported. Each one becomes a [`Mesh`];
//! material maps are loaded separately by key, node transforms are ignored.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::error::{AssetError, AssetResult};
use crate::resources::mesh::{GpuMesh, Mesh};
use crate::resources::registry::BackendResource;
use glam::{Vec2, Vec3};
use std::path::Path;

/// All triangle meshes of a model file
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub meshes: Vec<Mesh>,
}

impl Model {
    pub fn load<P: AsRef<Path>>(path: P) -> AssetResult<Self> {
        let path = path.as_ref();
        let (document, buffers, _) = gltf::import(path).map_err(|source| AssetError::Gltf {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("model")
            .to_string();

        let mut meshes = Vec::new();
        for mesh in document.meshes() {
            for (i, primitive) in mesh.primitives().enumerate() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "{}: skipping primitive {} of mesh {:?} with mode {:?}",
                        name,
                        i,
                        mesh.name(),
                        primitive.mode()
                    );
                    continue;
                }
                let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));
                let positions: Vec<Vec3> = reader
                    .read_positions()
                    .ok_or_else(|| AssetError::InvalidData(format!("{}: primitive without positions", name)))?
                    .map(Vec3::from)
                    .collect();
                let normals: Vec<Vec3> = match reader.read_normals() {
                    Some(normals) => normals.map(Vec3::from).collect(),
                    None => vec![Vec3::Z; positions.len()],
                };
                let uvs: Vec<Vec2> = match reader.read_tex_coords(0) {
                    Some(uvs) => uvs.into_f32().map(Vec2::from).collect(),
                    None => vec![Vec2::ZERO; positions.len()],
                };
                let indices: Vec<u32> = match reader.read_indices() {
                    Some(indices) => indices.into_u32().collect(),
                    None => (0..positions.len() as u32).collect(),
                };

                let vertices = positions
                    .iter()
                    .zip(normals.iter().chain(std::iter::repeat(&Vec3::Z)))
                    .zip(uvs.iter().chain(std::iter::repeat(&Vec2::ZERO)))
                    .map(|((&position, &normal), &uv)| Vertex { position, normal, uv })
                    .collect();

                meshes.push(Mesh {
                    name: format!("{}/{}", name, mesh.name().unwrap_or("mesh")),
                    vertices,
                    indices,
                    topology: PrimitiveTopology::TriangleList,
                });
            }
        }

        if meshes.is_empty() {
            return Err(AssetError::InvalidData(format!("{} has no triangle meshes", path.display())));
        }
        log::info!("Loaded model {} ({} meshes)", path.display(), meshes.len());
        Ok(Self { name, meshes })
    }

    pub fn upload<B: GraphicsBackend + ?Sized>(&self, backend: &mut B) -> BackendResult<GpuModel> {
        let mut uploaded = Vec::with_capacity(self.meshes.len());
        for mesh in &self.meshes {
            match GpuMesh::from_mesh(backend, mesh) {
                Ok(gpu) => uploaded.push(gpu),
                Err(e) => {
                    for gpu in uploaded {
                        gpu.release(backend);
                    }
                    return Err(e);
                }
            }
        }
        Ok(GpuModel {
            name: self.name.clone(),
            meshes: uploaded,
        })
    }
}

/// Uploaded model
#[derive(Debug)]
pub struct GpuModel {
    pub name: String,
    pub meshes: Vec<GpuMesh>,
}

impl GpuModel {
    pub fn draw<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        program: ProgramHandle,
        depth: DepthState,
    ) -> BackendResult<()> {
        for mesh in &self.meshes {
            mesh.draw(backend, program, depth)?;
        }
        Ok(())
    }
}

impl BackendResource for GpuModel {
    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        for mesh in self.meshes {
            mesh.release(backend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_is_a_gltf_error() {
        let err = Model::load("does/not/exist.gltf").err().unwrap();
        assert!(matches!(err, AssetError::Gltf { .. }));
    }
}
