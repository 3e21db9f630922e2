//! CPU evaluation of the capture programs
//!
//! These mirror the WGSL fragment stages texel for texel so the software
//! backend produces the same maps as the GPU, up to filtering differences at
//! cube seams.

use std::f32::consts::PI;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::types::{AddressMode, TextureDescriptor};

/// Texel storage of one texture: `[layer][mip][row-major texel]`
pub(crate) type Levels = Vec<Vec<Vec<Vec4>>>;

/// Read-only view used by the kernels to sample a texture.
pub(crate) struct TexelView<'a> {
    pub desc: &'a TextureDescriptor,
    pub levels: &'a Levels,
}

impl TexelView<'_> {
    fn texel(&self, layer: usize, mip: usize, x: i64, y: i64, address: AddressMode) -> Vec4 {
        let (width, height) = self.desc.mip_size(mip as u32);
        let (w, h) = (width as i64, height as i64);
        let (x, y) = match address {
            AddressMode::ClampToEdge => (x.clamp(0, w - 1), y.clamp(0, h - 1)),
            AddressMode::Repeat => (x.rem_euclid(w), y.rem_euclid(h)),
        };
        self.levels[layer][mip][(y * w + x) as usize]
    }

    /// Bilinear sample of one layer, with texel centers at half-integer coordinates.
    pub fn sample_layer(&self, layer: usize, mip: usize, uv: Vec2, address: AddressMode) -> Vec4 {
        let mip = mip.min(self.desc.mip_levels as usize - 1);
        let (width, height) = self.desc.mip_size(mip as u32);
        let x = uv.x * width as f32 - 0.5;
        let y = uv.y * height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self
            .texel(layer, mip, x0, y0, address)
            .lerp(self.texel(layer, mip, x0 + 1, y0, address), fx);
        let bottom = self
            .texel(layer, mip, x0, y0 + 1, address)
            .lerp(self.texel(layer, mip, x0 + 1, y0 + 1, address), fx);
        top.lerp(bottom, fy)
    }

    /// Cube lookup by direction, using the standard major-axis face selection.
    pub fn sample_cube(&self, dir: Vec3, mip: usize) -> Vec4 {
        let (face, uv) = cube_face_uv(dir);
        self.sample_layer(face, mip, uv, AddressMode::ClampToEdge)
    }
}

/// Face index and face uv addressed by a direction.
pub(crate) fn cube_face_uv(dir: Vec3) -> (usize, Vec2) {
    let abs = dir.abs();
    let (face, ma, sc, tc) = if abs.x >= abs.y && abs.x >= abs.z {
        if dir.x > 0.0 {
            (0, abs.x, -dir.z, -dir.y)
        } else {
            (1, abs.x, dir.z, -dir.y)
        }
    } else if abs.y >= abs.z {
        if dir.y > 0.0 {
            (2, abs.y, dir.x, dir.z)
        } else {
            (3, abs.y, dir.x, -dir.z)
        }
    } else if dir.z > 0.0 {
        (4, abs.z, dir.x, -dir.y)
    } else {
        (5, abs.z, -dir.x, -dir.y)
    };
    let ma = ma.max(f32::MIN_POSITIVE);
    (face, Vec2::new(0.5 * (sc / ma + 1.0), 0.5 * (tc / ma + 1.0)))
}

/// World direction through the center of pixel (x, y) of a capture.
///
/// Row 0 maps to clip-space y = -1, matching the flipped capture vertex stage.
pub(crate) fn capture_direction(inv_view_proj: Mat4, x: u32, y: u32, width: u32, height: u32) -> Vec3 {
    let ndc_x = 2.0 * (x as f32 + 0.5) / width as f32 - 1.0;
    let ndc_y = 2.0 * (y as f32 + 0.5) / height as f32 - 1.0;
    let p = inv_view_proj * Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
    (p.truncate() / p.w).normalize()
}

/// Quad uv of the center of pixel (x, y).
pub(crate) fn quad_uv(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

const INV_ATAN: Vec2 = Vec2::new(0.1591, 0.3183);

pub(crate) fn equirect_uv(dir: Vec3) -> Vec2 {
    Vec2::new(dir.z.atan2(dir.x), -dir.y.asin()) * INV_ATAN + Vec2::splat(0.5)
}

/// Cosine-weighted hemisphere convolution with a fixed angular step.
pub(crate) fn irradiance(env: &TexelView, normal: Vec3, sample_delta: f32) -> Vec3 {
    let up = if normal.y.abs() > 0.9999 { Vec3::Z } else { Vec3::Y };
    let right = up.cross(normal).normalize();
    let up = normal.cross(right).normalize();

    let delta = sample_delta.max(0.001);
    let mut irradiance = Vec3::ZERO;
    let mut sample_count = 0.0;

    let mut phi = 0.0f32;
    while phi < 2.0 * PI {
        let mut theta = 0.0f32;
        while theta < 0.5 * PI {
            let tangent_sample = Vec3::new(
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                theta.cos(),
            );
            let sample_vec =
                tangent_sample.x * right + tangent_sample.y * up + tangent_sample.z * normal;
            let radiance = env.sample_cube(sample_vec, 0).truncate();
            irradiance += radiance * theta.cos() * theta.sin();
            sample_count += 1.0;
            theta += delta;
        }
        phi += delta;
    }

    PI * irradiance / sample_count
}

/// GGX-prefiltered radiance around `normal`, with view = reflection = normal.
pub(crate) fn prefilter(env: &TexelView, normal: Vec3, roughness: f32, sample_count: u32) -> Vec3 {
    let n = normal;
    let v = n;
    let count = sample_count.max(1);

    let mut color = Vec3::ZERO;
    let mut total_weight = 0.0;
    for i in 0..count {
        let xi = hammersley(i, count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize();
        let n_dot_l = n.dot(l).max(0.0);
        if n_dot_l > 0.0 {
            color += env.sample_cube(l, 0).truncate() * n_dot_l;
            total_weight += n_dot_l;
        }
    }

    if total_weight > 0.0 {
        color / total_weight
    } else {
        color
    }
}

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    n_dot_v / (n_dot_v * (1.0 - k) + k)
}

/// Split-sum scale and bias for the given view angle and roughness.
pub(crate) fn integrate_brdf(n_dot_v: f32, roughness: f32, sample_count: u32) -> Vec2 {
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);
    let n = Vec3::Z;
    let count = sample_count.max(1);

    let mut a = 0.0;
    let mut b = 0.0;
    for i in 0..count {
        let xi = hammersley(i, count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = (2.0 * v.dot(h) * h - v).normalize();
        let n_dot_l = l.z.max(0.0);
        let n_dot_h = h.z.max(0.0);
        let v_dot_h = v.dot(h).max(0.0);
        if n_dot_l > 0.0 {
            let g = geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v).max(1e-6);
            let fc = (1.0 - v_dot_h).powi(5);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    Vec2::new(a, b) / count as f32
}

/// Hammersley sequence for low-discrepancy sampling.
fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

fn radical_inverse_vdc(bits: u32) -> f32 {
    bits.reverse_bits() as f32 * 2.328_306_4e-10
}

/// GGX importance sampling.
fn importance_sample_ggx(xi: Vec2, n: Vec3, roughness: f32) -> Vec3 {
    let a = roughness * roughness;

    let phi = 2.0 * PI * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();

    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);

    let up = if n.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = up.cross(n).normalize();
    let bitangent = n.cross(tangent);

    (tangent * h.x + bitangent * h.y + n * h.z).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::types::{TextureDimension, TextureFormat};

    fn constant_cube(color: Vec4) -> (TextureDescriptor, Levels) {
        let desc = TextureDescriptor::cube("env", 4, 1, TextureFormat::Rgba32Float);
        let levels = (0..6).map(|_| vec![vec![color; 16]]).collect();
        (desc, levels)
    }

    #[test]
    fn test_face_selection_matches_view_directions() {
        assert_eq!(cube_face_uv(Vec3::X).0, 0);
        assert_eq!(cube_face_uv(-Vec3::X).0, 1);
        assert_eq!(cube_face_uv(Vec3::Y).0, 2);
        assert_eq!(cube_face_uv(-Vec3::Y).0, 3);
        assert_eq!(cube_face_uv(Vec3::Z).0, 4);
        assert_eq!(cube_face_uv(-Vec3::Z).0, 5);
        let (_, uv) = cube_face_uv(Vec3::X);
        assert!((uv - Vec2::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn test_upper_rows_of_side_faces_look_up() {
        // +X face: row 0 holds directions with positive y
        let (face, uv) = cube_face_uv(Vec3::new(1.0, 0.9, 0.0));
        assert_eq!(face, 0);
        assert!(uv.y < 0.1);
    }

    #[test]
    fn test_equirect_uv_poles_and_horizon() {
        let up = equirect_uv(Vec3::Y);
        assert!((up.y - (0.5 - 0.3183 * PI / 2.0)).abs() < 1e-5);
        let forward = equirect_uv(Vec3::X);
        assert!((forward - Vec2::splat(0.5)).length() < 1e-6);
    }

    #[test]
    fn test_bilinear_clamps_constant_texture() {
        let (desc, levels) = constant_cube(Vec4::new(0.25, 0.5, 0.75, 1.0));
        let view = TexelView { desc: &desc, levels: &levels };
        let sampled = view.sample_layer(3, 0, Vec2::new(0.0, 1.0), AddressMode::ClampToEdge);
        assert_eq!(sampled, Vec4::new(0.25, 0.5, 0.75, 1.0));
        assert_eq!(desc.dimension, TextureDimension::Cube);
    }

    #[test]
    fn test_constant_environment_is_preserved() {
        let color = Vec4::new(2.0, 1.0, 0.5, 1.0);
        let (desc, levels) = constant_cube(color);
        let view = TexelView { desc: &desc, levels: &levels };
        let n = Vec3::new(0.3, -0.2, 0.9).normalize();

        let diffuse = irradiance(&view, n, 0.1);
        let ratio = diffuse / color.truncate();
        assert!((ratio - Vec3::ONE).abs().max_element() < 0.03, "{diffuse}");

        let specular = prefilter(&view, n, 0.5, 64);
        assert!((specular - color.truncate()).abs().max_element() < 1e-4, "{specular}");
    }

    #[test]
    fn test_brdf_smooth_head_on_reflects_everything() {
        let scale_bias = integrate_brdf(0.999, 0.0, 16);
        assert!((scale_bias.x + scale_bias.y - 1.0).abs() < 0.02, "{scale_bias}");
        let rough = integrate_brdf(0.5, 1.0, 256);
        assert!(rough.x + rough.y < 1.0);
    }

    #[test]
    fn test_capture_direction_center_pixel() {
        let projection = Mat4::perspective_rh(90f32.to_radians(), 1.0, 0.1, 10.0);
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::X, -Vec3::Y);
        let inv = (projection * view).inverse();
        let dir = capture_direction(inv, 1, 1, 3, 3);
        assert!((dir - Vec3::X).length() < 1e-5);
        // row 0 of the +X face looks towards +Y
        let top = capture_direction(inv, 1, 0, 3, 3);
        assert!(top.y > 0.0);
    }
}
