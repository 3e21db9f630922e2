//! Shaders of the IBL precomputation passes
//!
//! Cube captures flip clip-space y so every face is stored with texture v
//! growing with the row index, the layout cube sampling expects.

macro_rules! capture_vertex {
    () => {
        r#"
struct CaptureOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) local_position: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> CaptureOutput {
    var out: CaptureOutput;
    out.local_position = position;
    let clip = u.projection * u.view * vec4<f32>(position, 1.0);
    out.clip_position = vec4<f32>(clip.x, -clip.y, clip.z, clip.w);
    return out;
}
"#
    };
}

macro_rules! importance_sampling {
    () => {
        r#"
const PI: f32 = 3.14159265359;

fn radical_inverse_vdc(bits: u32) -> f32 {
    return f32(reverseBits(bits)) * 2.3283064365386963e-10;
}

fn hammersley(i: u32, n: u32) -> vec2<f32> {
    return vec2<f32>(f32(i) / f32(n), radical_inverse_vdc(i));
}

fn importance_sample_ggx(xi: vec2<f32>, n: vec3<f32>, roughness: f32) -> vec3<f32> {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = sqrt((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y));
    let sin_theta = sqrt(max(1.0 - cos_theta * cos_theta, 0.0));
    let h = vec3<f32>(cos(phi) * sin_theta, sin(phi) * sin_theta, cos_theta);

    var up = vec3<f32>(1.0, 0.0, 0.0);
    if (abs(n.z) < 0.999) {
        up = vec3<f32>(0.0, 0.0, 1.0);
    }
    let tangent = normalize(cross(up, n));
    let bitangent = cross(n, tangent);
    return normalize(tangent * h.x + bitangent * h.y + n * h.z);
}
"#
    };
}

pub const EQUIRECT_TO_CUBEMAP_SHADER: &str = concat!(
    r#"
struct Uniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var equirectangular_map: texture_2d<f32>;
@group(1) @binding(1) var equirectangular_sampler: sampler;

const INV_ATAN: vec2<f32> = vec2<f32>(0.1591, 0.3183);

fn sample_spherical_map(v: vec3<f32>) -> vec2<f32> {
    let uv = vec2<f32>(atan2(v.z, v.x), -asin(v.y)) * INV_ATAN;
    return uv + vec2<f32>(0.5);
}

@fragment
fn fs_main(in: CaptureOutput) -> @location(0) vec4<f32> {
    let uv = sample_spherical_map(normalize(in.local_position));
    let color = textureSample(equirectangular_map, equirectangular_sampler, uv).rgb;
    return vec4<f32>(color, 1.0);
}
"#,
    capture_vertex!()
);

pub const IRRADIANCE_SHADER: &str = concat!(
    r#"
struct Uniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    sample_delta: f32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var environment_map: texture_cube<f32>;
@group(1) @binding(1) var environment_sampler: sampler;

const PI: f32 = 3.14159265359;

@fragment
fn fs_main(in: CaptureOutput) -> @location(0) vec4<f32> {
    let normal = normalize(in.local_position);
    var up = vec3<f32>(0.0, 1.0, 0.0);
    if (abs(normal.y) > 0.9999) {
        up = vec3<f32>(0.0, 0.0, 1.0);
    }
    let right = normalize(cross(up, normal));
    up = normalize(cross(normal, right));

    var irradiance = vec3<f32>(0.0);
    var sample_count = 0.0;
    let delta = max(u.sample_delta, 0.001);
    for (var phi = 0.0; phi < 2.0 * PI; phi += delta) {
        for (var theta = 0.0; theta < 0.5 * PI; theta += delta) {
            let tangent_sample = vec3<f32>(sin(theta) * cos(phi), sin(theta) * sin(phi), cos(theta));
            let sample_vec = tangent_sample.x * right + tangent_sample.y * up + tangent_sample.z * normal;
            let radiance = textureSampleLevel(environment_map, environment_sampler, sample_vec, 0.0).rgb;
            irradiance += radiance * cos(theta) * sin(theta);
            sample_count += 1.0;
        }
    }
    irradiance = PI * irradiance / sample_count;
    return vec4<f32>(irradiance, 1.0);
}
"#,
    capture_vertex!()
);

pub const PREFILTER_SHADER: &str = concat!(
    r#"
struct Uniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
    roughness: f32,
    sample_count: i32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var environment_map: texture_cube<f32>;
@group(1) @binding(1) var environment_sampler: sampler;

@fragment
fn fs_main(in: CaptureOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.local_position);
    let v = n;
    let count = u32(max(u.sample_count, 1));

    var color = vec3<f32>(0.0);
    var total_weight = 0.0;
    for (var i = 0u; i < count; i += 1u) {
        let xi = hammersley(i, count);
        let h = importance_sample_ggx(xi, n, u.roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);
        let n_dot_l = max(dot(n, l), 0.0);
        if (n_dot_l > 0.0) {
            color += textureSampleLevel(environment_map, environment_sampler, l, 0.0).rgb * n_dot_l;
            total_weight += n_dot_l;
        }
    }
    if (total_weight > 0.0) {
        color = color / total_weight;
    }
    return vec4<f32>(color, 1.0);
}
"#,
    importance_sampling!(),
    capture_vertex!()
);

pub const BRDF_SHADER: &str = concat!(
    r#"
struct Uniforms {
    sample_count: i32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

struct QuadOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> QuadOutput {
    var out: QuadOutput;
    out.uv = uv;
    out.clip_position = vec4<f32>(position.x, -position.y, position.z, 1.0);
    return out;
}

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    return n_dot_v / (n_dot_v * (1.0 - k) + k);
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    return geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
}

fn integrate_brdf(n_dot_v: f32, roughness: f32) -> vec2<f32> {
    let v = vec3<f32>(sqrt(1.0 - n_dot_v * n_dot_v), 0.0, n_dot_v);
    let n = vec3<f32>(0.0, 0.0, 1.0);
    let count = u32(max(u.sample_count, 1));

    var a = 0.0;
    var b = 0.0;
    for (var i = 0u; i < count; i += 1u) {
        let xi = hammersley(i, count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);
        let n_dot_l = max(l.z, 0.0);
        let n_dot_h = max(h.z, 0.0);
        let v_dot_h = max(dot(v, h), 0.0);
        if (n_dot_l > 0.0) {
            let g = geometry_smith(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / max(n_dot_h * n_dot_v, 1e-6);
            let fc = pow(1.0 - v_dot_h, 5.0);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    return vec2<f32>(a, b) / f32(count);
}

@fragment
fn fs_main(in: QuadOutput) -> @location(0) vec2<f32> {
    return integrate_brdf(in.uv.x, in.uv.y);
}
"#,
    importance_sampling!()
);
