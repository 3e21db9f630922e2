//! Mesh data structures and their GPU upload

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::resources::registry::BackendResource;

/// CPU-side mesh of lit vertices
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    /// Empty for unindexed meshes
    pub indices: Vec<u32>,
    pub topology: PrimitiveTopology,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Get vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Get index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// A vertex array on the backend together with the buffers it owns
#[derive(Debug)]
pub struct GpuMesh {
    pub name: String,
    pub vertex_array: VertexArrayHandle,
    vertex_buffer: BufferHandle,
    index_buffer: Option<BufferHandle>,
    pub topology: PrimitiveTopology,
    pub range: DrawRange,
}

impl GpuMesh {
    /// Upload raw vertex bytes and optional 32-bit indices.
    pub fn upload<B: GraphicsBackend + ?Sized>(
        backend: &mut B,
        name: &str,
        vertex_bytes: &[u8],
        layout: VertexBufferLayout,
        indices: &[u32],
        topology: PrimitiveTopology,
    ) -> BackendResult<Self> {
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} vertices", name)),
                usage: BufferUsage::VERTEX,
            },
            vertex_bytes,
        )?;

        let index_buffer = if indices.is_empty() {
            None
        } else {
            match backend.create_buffer_init(
                &BufferDescriptor {
                    label: Some(format!("{} indices", name)),
                    usage: BufferUsage::INDEX,
                },
                bytemuck::cast_slice(indices),
            ) {
                Ok(buffer) => Some(buffer),
                Err(e) => {
                    backend.destroy_buffer(vertex_buffer);
                    return Err(e);
                }
            }
        };

        let range = if indices.is_empty() {
            DrawRange::Arrays {
                first: 0,
                count: (vertex_bytes.len() as u64 / layout.array_stride.max(1)) as u32,
            }
        } else {
            DrawRange::Indexed {
                count: indices.len() as u32,
            }
        };

        let vertex_array = backend.create_vertex_array(&VertexArrayDescriptor {
            label: Some(name.to_string()),
            vertex_buffer,
            layout,
            index_buffer: index_buffer.map(|buffer| (buffer, IndexFormat::Uint32)),
        });
        let vertex_array = match vertex_array {
            Ok(vertex_array) => vertex_array,
            Err(e) => {
                backend.destroy_buffer(vertex_buffer);
                if let Some(buffer) = index_buffer {
                    backend.destroy_buffer(buffer);
                }
                return Err(e);
            }
        };

        Ok(Self {
            name: name.to_string(),
            vertex_array,
            vertex_buffer,
            index_buffer,
            topology,
            range,
        })
    }

    pub fn from_mesh<B: GraphicsBackend + ?Sized>(backend: &mut B, mesh: &Mesh) -> BackendResult<Self> {
        Self::upload(
            backend,
            &mesh.name,
            mesh.vertex_bytes(),
            Vertex::layout(),
            &mesh.indices,
            mesh.topology,
        )
    }

    /// Draw the whole mesh with `program` into the bound framebuffer.
    pub fn draw<B: GraphicsBackend + ?Sized>(
        &self,
        backend: &mut B,
        program: ProgramHandle,
        depth: DepthState,
    ) -> BackendResult<()> {
        backend.draw(&DrawCall {
            program,
            vertex_array: self.vertex_array,
            topology: self.topology,
            range: self.range,
            depth,
        })
    }
}

impl BackendResource for GpuMesh {
    fn release<B: GraphicsBackend + ?Sized>(self, backend: &mut B) {
        backend.destroy_vertex_array(self.vertex_array);
        backend.destroy_buffer(self.vertex_buffer);
        if let Some(buffer) = self.index_buffer {
            backend.destroy_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SoftwareBackend;
    use crate::resources::geometry;

    #[test]
    fn test_unindexed_mesh_draws_all_vertices() {
        let mut backend = SoftwareBackend::new(4, 4);
        let mesh = GpuMesh::from_mesh(&mut backend, &geometry::unit_cube()).unwrap();
        assert_eq!(mesh.range, DrawRange::Arrays { first: 0, count: 36 });
        assert!(mesh.index_buffer.is_none());
    }

    #[test]
    fn test_indexed_mesh_uses_index_count() {
        let mut backend = SoftwareBackend::new(4, 4);
        let sphere = geometry::uv_sphere(8, 8);
        let mesh = GpuMesh::from_mesh(&mut backend, &sphere).unwrap();
        assert_eq!(
            mesh.range,
            DrawRange::Indexed {
                count: sphere.index_count() as u32
            }
        );
        mesh.release(&mut backend);
    }
}
