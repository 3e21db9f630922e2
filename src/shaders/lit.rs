//! Shaders of the per-frame scene passes

macro_rules! lit_uniform_members {
    () => {
        r#"
    model: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    normal_matrix: mat3x3<f32>,
    view_pos: vec3<f32>,
    light_direction: vec3<f32>,
    light_ambient: vec3<f32>,
    light_diffuse: vec3<f32>,
    light_specular: vec3<f32>,
    light_is_dir_light: i32,
    light_direction0: vec3<f32>,
    light_direction1: vec3<f32>,
    light_direction2: vec3<f32>,
    light_direction3: vec3<f32>,
"#
    };
}

macro_rules! lit_vertex {
    () => {
        r#"
struct LitOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
) -> LitOutput {
    var out: LitOutput;
    let world = u.model * vec4<f32>(position, 1.0);
    out.world_position = world.xyz;
    out.normal = u.normal_matrix * normal;
    out.uv = uv;
    out.clip_position = u.projection * u.view * world;
    return out;
}
"#
    };
}

// `shade` expects irradiance_map, prefilter_map and brdf_lut (with their
// samplers) to be declared by the including shader.
macro_rules! pbr_lighting {
    () => {
        r#"
const PI: f32 = 3.14159265359;
const MAX_REFLECTION_LOD: f32 = 4.0;

fn distribution_ggx(n: vec3<f32>, h: vec3<f32>, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let n_dot_h = max(dot(n, h), 0.0);
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / max(PI * denom * denom, 1e-6);
}

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = (r * r) / 8.0;
    return n_dot_v / (n_dot_v * (1.0 - k) + k);
}

fn geometry_smith(n: vec3<f32>, v: vec3<f32>, l: vec3<f32>, roughness: f32) -> f32 {
    let n_dot_v = max(dot(n, v), 0.0);
    let n_dot_l = max(dot(n, l), 0.0);
    return geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (vec3<f32>(1.0) - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

fn fresnel_schlick_roughness(cos_theta: f32, f0: vec3<f32>, roughness: f32) -> vec3<f32> {
    let r = max(vec3<f32>(1.0 - roughness), f0);
    return f0 + (r - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

fn shade(
    world_position: vec3<f32>,
    n: vec3<f32>,
    albedo: vec3<f32>,
    metallic: f32,
    roughness: f32,
    ao: f32,
) -> vec3<f32> {
    let v = normalize(u.view_pos - world_position);
    let r = reflect(-v, n);
    let f0 = mix(vec3<f32>(0.04), albedo, metallic);

    var directions = array<vec3<f32>, 4>(
        u.light_direction0,
        u.light_direction1,
        u.light_direction2,
        u.light_direction3,
    );

    var lo = vec3<f32>(0.0);
    if (u.light_is_dir_light != 0) {
        for (var i = 0; i < 4; i += 1) {
            let l = normalize(-directions[i]);
            let h = normalize(v + l);
            let ndf = distribution_ggx(n, h, roughness);
            let g = geometry_smith(n, v, l, roughness);
            let f = fresnel_schlick(max(dot(h, v), 0.0), f0);

            let n_dot_l = max(dot(n, l), 0.0);
            let denominator = 4.0 * max(dot(n, v), 0.0) * n_dot_l + 0.0001;
            let specular = (ndf * g * f) / denominator * u.light_specular;
            let k_d = (vec3<f32>(1.0) - f) * (1.0 - metallic);
            lo += (k_d * albedo / PI + specular) * u.light_diffuse * n_dot_l;
        }
    }

    let n_dot_v = max(dot(n, v), 0.0);
    let f = fresnel_schlick_roughness(n_dot_v, f0, roughness);
    let k_d = (vec3<f32>(1.0) - f) * (1.0 - metallic);

    let irradiance = textureSampleLevel(irradiance_map, irradiance_sampler, n, 0.0).rgb;
    let diffuse = irradiance * albedo;

    let prefiltered = textureSampleLevel(prefilter_map, prefilter_sampler, r, roughness * MAX_REFLECTION_LOD).rgb;
    let brdf = textureSampleLevel(brdf_lut, brdf_sampler, vec2<f32>(n_dot_v, roughness), 0.0).rg;
    let specular = prefiltered * (f * brdf.x + brdf.y);

    let ambient = (k_d * diffuse + specular) * ao + u.light_ambient * albedo * ao;
    let color = ambient + lo;
    return color / (color + vec3<f32>(1.0));
}

fn perturb_normal(
    sampled: vec3<f32>,
    world_position: vec3<f32>,
    normal: vec3<f32>,
    uv: vec2<f32>,
) -> vec3<f32> {
    let tangent_normal = sampled * 2.0 - 1.0;
    // screen-space y grows downwards here, derivatives are taken upwards
    let q1 = dpdx(world_position);
    let q2 = -dpdy(world_position);
    let st1 = dpdx(uv);
    let st2 = -dpdy(uv);

    let n = normalize(normal);
    let t = normalize(q1 * st2.y - q2 * st1.y);
    let b = -normalize(cross(n, t));
    let tbn = mat3x3<f32>(t, b, n);
    return normalize(tbn * tangent_normal);
}
"#
    };
}

pub const BACKGROUND_SHADER: &str = r#"
struct Uniforms {
    projection: mat4x4<f32>,
    view: mat4x4<f32>,
}

@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var environment_map: texture_cube<f32>;
@group(1) @binding(1) var environment_sampler: sampler;

struct SkyOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) local_position: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> SkyOutput {
    var out: SkyOutput;
    out.local_position = position;
    let clip = u.projection * u.view * vec4<f32>(position, 1.0);
    out.clip_position = clip.xyww;
    return out;
}

@fragment
fn fs_main(in: SkyOutput) -> @location(0) vec4<f32> {
    let hdr = textureSampleLevel(environment_map, environment_sampler, normalize(in.local_position), 0.0).rgb;
    // the surface is sRGB, only tone mapping is applied here
    return vec4<f32>(hdr / (hdr + vec3<f32>(1.0)), 1.0);
}
"#;

pub const PBR_SHADER: &str = concat!(
    "struct Uniforms {",
    lit_uniform_members!(),
    "}\n",
    r#"
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var albedo_map: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;
@group(1) @binding(2) var ao_map: texture_2d<f32>;
@group(1) @binding(3) var ao_sampler: sampler;
@group(1) @binding(4) var metallic_map: texture_2d<f32>;
@group(1) @binding(5) var metallic_sampler: sampler;
@group(1) @binding(6) var normal_map: texture_2d<f32>;
@group(1) @binding(7) var normal_sampler: sampler;
@group(1) @binding(8) var roughness_map: texture_2d<f32>;
@group(1) @binding(9) var roughness_sampler: sampler;
@group(1) @binding(10) var cube_map: texture_cube<f32>;
@group(1) @binding(11) var cube_sampler: sampler;
@group(1) @binding(12) var irradiance_map: texture_cube<f32>;
@group(1) @binding(13) var irradiance_sampler: sampler;
@group(1) @binding(14) var prefilter_map: texture_cube<f32>;
@group(1) @binding(15) var prefilter_sampler: sampler;
@group(1) @binding(16) var brdf_lut: texture_2d<f32>;
@group(1) @binding(17) var brdf_sampler: sampler;

@fragment
fn fs_main(in: LitOutput) -> @location(0) vec4<f32> {
    let albedo = pow(textureSample(albedo_map, albedo_sampler, in.uv).rgb, vec3<f32>(2.2));
    let ao = textureSample(ao_map, ao_sampler, in.uv).r;
    let metallic = textureSample(metallic_map, metallic_sampler, in.uv).r;
    let roughness = textureSample(roughness_map, roughness_sampler, in.uv).r;
    let sampled_normal = textureSample(normal_map, normal_sampler, in.uv).xyz;
    let n = perturb_normal(sampled_normal, in.world_position, in.normal, in.uv);
    return vec4<f32>(shade(in.world_position, n, albedo, metallic, roughness, ao), 1.0);
}
"#,
    lit_vertex!(),
    pbr_lighting!()
);

pub const PBR_MODEL_SHADER: &str = concat!(
    "struct Uniforms {",
    lit_uniform_members!(),
    "}\n",
    r#"
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var albedo_map: texture_2d<f32>;
@group(1) @binding(1) var albedo_sampler: sampler;
@group(1) @binding(2) var arm_map: texture_2d<f32>;
@group(1) @binding(3) var arm_sampler: sampler;
@group(1) @binding(4) var normal_map: texture_2d<f32>;
@group(1) @binding(5) var normal_sampler: sampler;
@group(1) @binding(6) var cube_map: texture_cube<f32>;
@group(1) @binding(7) var cube_sampler: sampler;
@group(1) @binding(8) var irradiance_map: texture_cube<f32>;
@group(1) @binding(9) var irradiance_sampler: sampler;
@group(1) @binding(10) var prefilter_map: texture_cube<f32>;
@group(1) @binding(11) var prefilter_sampler: sampler;
@group(1) @binding(12) var brdf_lut: texture_2d<f32>;
@group(1) @binding(13) var brdf_sampler: sampler;

@fragment
fn fs_main(in: LitOutput) -> @location(0) vec4<f32> {
    let albedo = pow(textureSample(albedo_map, albedo_sampler, in.uv).rgb, vec3<f32>(2.2));
    // ambient occlusion, roughness, metallic
    let arm = textureSample(arm_map, arm_sampler, in.uv).rgb;
    let sampled_normal = textureSample(normal_map, normal_sampler, in.uv).xyz;
    let n = perturb_normal(sampled_normal, in.world_position, in.normal, in.uv);
    return vec4<f32>(shade(in.world_position, n, albedo, arm.b, arm.g, arm.r), 1.0);
}
"#,
    lit_vertex!(),
    pbr_lighting!()
);

pub const SPHERE_SHADER: &str = concat!(
    "struct Uniforms {",
    lit_uniform_members!(),
    r#"
    color: vec3<f32>,
    roughness: f32,
    metallic: f32,
}
"#,
    r#"
@group(0) @binding(0) var<uniform> u: Uniforms;
@group(1) @binding(0) var cube_map: texture_cube<f32>;
@group(1) @binding(1) var cube_sampler: sampler;
@group(1) @binding(2) var irradiance_map: texture_cube<f32>;
@group(1) @binding(3) var irradiance_sampler: sampler;
@group(1) @binding(4) var prefilter_map: texture_cube<f32>;
@group(1) @binding(5) var prefilter_sampler: sampler;
@group(1) @binding(6) var brdf_lut: texture_2d<f32>;
@group(1) @binding(7) var brdf_sampler: sampler;

@fragment
fn fs_main(in: LitOutput) -> @location(0) vec4<f32> {
    let roughness = clamp(u.roughness, 0.05, 1.0);
    let n = normalize(in.normal);
    return vec4<f32>(shade(in.world_position, n, u.color, u.metallic, roughness, 1.0), 1.0);
}
"#,
    lit_vertex!(),
    pbr_lighting!()
);
