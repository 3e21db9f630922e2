//! Procedural geometry
//!
//! The unit cube and skybox are drawn without indices as triangle lists. The
//! quad is a four-vertex triangle strip covering clip space. Spheres are
//! indexed triangle strips whose rows alternate direction so that consecutive
//! rows join without degenerate restarts.

use crate::backend::types::{PrimitiveTopology, QuadVertex, Vertex};
use crate::resources::mesh::Mesh;
use glam::{Vec2, Vec3};
use std::f32::consts::PI;

/// Vertices of the unit cube and the skybox
pub const CUBE_VERTEX_COUNT: u32 = 36;

/// Vertices of the full-screen quad
pub const QUAD_VERTEX_COUNT: u32 = 4;

/// Segments of the demo sphere in both directions
pub const SPHERE_SEGMENTS: u32 = 64;

/// (normal, u axis, v axis) of every cube face
const FACES: [(Vec3, Vec3, Vec3); 6] = [
    (Vec3::Z, Vec3::X, Vec3::Y),
    (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    (Vec3::X, Vec3::NEG_Z, Vec3::Y),
    (Vec3::NEG_X, Vec3::Z, Vec3::Y),
    (Vec3::Y, Vec3::X, Vec3::NEG_Z),
    (Vec3::NEG_Y, Vec3::X, Vec3::Z),
];

/// Corner (u, v) of the two counter-clockwise triangles of a face
const FACE_CORNERS: [(f32, f32); 6] = [
    (-1.0, -1.0),
    (1.0, -1.0),
    (1.0, 1.0),
    (1.0, 1.0),
    (-1.0, 1.0),
    (-1.0, -1.0),
];

/// Cube spanning [-1, 1] on every axis with outward normals.
pub fn unit_cube() -> Mesh {
    let mut vertices = Vec::with_capacity(CUBE_VERTEX_COUNT as usize);
    for (normal, u_axis, v_axis) in FACES {
        for (u, v) in FACE_CORNERS {
            vertices.push(Vertex {
                position: normal + u_axis * u + v_axis * v,
                normal,
                uv: Vec2::new((u + 1.0) * 0.5, (v + 1.0) * 0.5),
            });
        }
    }
    Mesh {
        name: "cube".to_string(),
        vertices,
        indices: Vec::new(),
        topology: PrimitiveTopology::TriangleList,
    }
}

/// Positions of the unit cube, used by the skybox and every cube capture.
pub fn skybox_cube() -> Vec<Vec3> {
    unit_cube().vertices.iter().map(|v| v.position).collect()
}

/// Clip-space quad for a triangle strip, with uv (0, 0) at the bottom left.
pub fn quad() -> [QuadVertex; 4] {
    [
        QuadVertex {
            position: Vec3::new(-1.0, 1.0, 0.0),
            uv: Vec2::new(0.0, 1.0),
        },
        QuadVertex {
            position: Vec3::new(-1.0, -1.0, 0.0),
            uv: Vec2::new(0.0, 0.0),
        },
        QuadVertex {
            position: Vec3::new(1.0, 1.0, 0.0),
            uv: Vec2::new(1.0, 1.0),
        },
        QuadVertex {
            position: Vec3::new(1.0, -1.0, 0.0),
            uv: Vec2::new(1.0, 0.0),
        },
    ]
}

/// Unit sphere with `x_segments + 1` by `y_segments + 1` vertices.
pub fn uv_sphere(x_segments: u32, y_segments: u32) -> Mesh {
    let mut vertices = Vec::with_capacity(((x_segments + 1) * (y_segments + 1)) as usize);
    for y in 0..=y_segments {
        for x in 0..=x_segments {
            let x_seg = x as f32 / x_segments as f32;
            let y_seg = y as f32 / y_segments as f32;
            let position = Vec3::new(
                (x_seg * 2.0 * PI).cos() * (y_seg * PI).sin(),
                (y_seg * PI).cos(),
                (x_seg * 2.0 * PI).sin() * (y_seg * PI).sin(),
            );
            vertices.push(Vertex {
                position,
                normal: position,
                uv: Vec2::new(x_seg, y_seg),
            });
        }
    }

    let row = x_segments + 1;
    let mut indices = Vec::with_capacity((y_segments * row * 2) as usize);
    for y in 0..y_segments {
        if y % 2 == 0 {
            for x in 0..=x_segments {
                indices.push(y * row + x);
                indices.push((y + 1) * row + x);
            }
        } else {
            for x in (0..=x_segments).rev() {
                indices.push((y + 1) * row + x);
                indices.push(y * row + x);
            }
        }
    }

    Mesh {
        name: "sphere".to_string(),
        vertices,
        indices,
        topology: PrimitiveTopology::TriangleStrip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_has_36_unindexed_vertices() {
        let cube = unit_cube();
        assert_eq!(cube.vertices.len(), CUBE_VERTEX_COUNT as usize);
        assert!(cube.indices.is_empty());
        assert_eq!(cube.topology, PrimitiveTopology::TriangleList);
        assert_eq!(skybox_cube().len(), 36);
    }

    #[test]
    fn test_cube_triangles_face_outward() {
        let cube = unit_cube();
        for triangle in cube.vertices.chunks_exact(3) {
            let [a, b, c] = [triangle[0].position, triangle[1].position, triangle[2].position];
            let winding = (b - a).cross(c - a);
            assert!(winding.dot(triangle[0].normal) > 0.0);
            for v in triangle {
                assert_eq!(v.position.abs().max_element(), 1.0);
            }
        }
    }

    #[test]
    fn test_quad_is_four_vertex_strip() {
        let quad = quad();
        assert_eq!(quad.len(), QUAD_VERTEX_COUNT as usize);
        // uv follows position so the top row samples v = 1
        for v in &quad {
            assert_eq!(v.uv, (v.position.truncate() + Vec2::ONE) * 0.5);
        }
    }

    #[test]
    fn test_sphere_counts_and_radius() {
        let sphere = uv_sphere(SPHERE_SEGMENTS, SPHERE_SEGMENTS);
        assert_eq!(sphere.vertices.len(), 65 * 65);
        assert_eq!(sphere.indices.len(), 64 * 65 * 2);
        assert_eq!(sphere.topology, PrimitiveTopology::TriangleStrip);
        for v in &sphere.vertices {
            assert!((v.position.length() - 1.0).abs() < 1e-5);
        }
        assert!(sphere.indices.iter().all(|&i| (i as usize) < sphere.vertices.len()));
    }

    #[test]
    fn test_sphere_rows_alternate_direction() {
        let sphere = uv_sphere(4, 2);
        // row 0 runs forward, row 1 runs backward starting from its far end
        assert_eq!(&sphere.indices[..4], &[0, 5, 1, 6]);
        assert_eq!(&sphere.indices[10..14], &[14, 9, 13, 8]);
    }
}
