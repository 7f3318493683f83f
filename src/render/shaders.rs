//! WGSL programs. Every program is prefixed with [`COMMON`], which declares
//! the three bind groups (globals, material, object) and the noise helpers.

pub(crate) const COMMON: &str = r#"
struct Globals {
    view_proj: mat4x4<f32>,
    view: mat4x4<f32>,
    projection: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
    viewport: vec4<f32>,
}

struct Shading {
    color: vec4<f32>,
    color_start: vec4<f32>,
    color_end: vec4<f32>,
    emissive: vec4<f32>,
    // time, pixel ratio, size
    params: vec4<f32>,
    // metalness, roughness
    surface: vec4<f32>,
    // magnitude, lacunarity, gain
    fire: vec4<f32>,
    camera: vec4<f32>,
}

struct Object {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: Globals;

@group(1) @binding(0)
var<uniform> shading: Shading;
@group(1) @binding(1)
var shading_map: texture_2d<f32>;
@group(1) @binding(2)
var shading_sampler: sampler;

@group(2) @binding(0)
var<uniform> object: Object;

struct MeshInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

fn hash3(p: vec3<f32>) -> vec3<f32> {
    let q = vec3<f32>(
        dot(p, vec3<f32>(127.1, 311.7, 74.7)),
        dot(p, vec3<f32>(269.5, 183.3, 246.1)),
        dot(p, vec3<f32>(113.5, 271.9, 124.6))
    );
    return fract(sin(q) * 43758.5453123) * 2.0 - 1.0;
}

fn corner_gradient(cell: vec3<f32>, local: vec3<f32>, corner: vec3<f32>) -> f32 {
    return dot(hash3(cell + corner), local - corner);
}

// Gradient noise in roughly [-1, 1].
fn gradient_noise(p: vec3<f32>) -> f32 {
    let cell = floor(p);
    let local = fract(p);
    let u = local * local * (3.0 - 2.0 * local);

    let n000 = corner_gradient(cell, local, vec3<f32>(0.0, 0.0, 0.0));
    let n100 = corner_gradient(cell, local, vec3<f32>(1.0, 0.0, 0.0));
    let n010 = corner_gradient(cell, local, vec3<f32>(0.0, 1.0, 0.0));
    let n110 = corner_gradient(cell, local, vec3<f32>(1.0, 1.0, 0.0));
    let n001 = corner_gradient(cell, local, vec3<f32>(0.0, 0.0, 1.0));
    let n101 = corner_gradient(cell, local, vec3<f32>(1.0, 0.0, 1.0));
    let n011 = corner_gradient(cell, local, vec3<f32>(0.0, 1.0, 1.0));
    let n111 = corner_gradient(cell, local, vec3<f32>(1.0, 1.0, 1.0));

    let x00 = mix(n000, n100, u.x);
    let x10 = mix(n010, n110, u.x);
    let x01 = mix(n001, n101, u.x);
    let x11 = mix(n011, n111, u.x);
    return mix(mix(x00, x10, u.y), mix(x01, x11, u.y), u.z);
}
"#;

pub(crate) const BASIC: &str = r#"
struct BasicOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(input: MeshInput) -> BasicOutput {
    var out: BasicOutput;
    out.clip = globals.view_proj * object.model * vec4<f32>(input.position, 1.0);
    out.uv = input.uv;
    return out;
}

@fragment
fn fs_main(input: BasicOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(shading_map, shading_sampler, input.uv);
    return vec4<f32>(shading.color.rgb * texel.rgb, shading.color.a * texel.a);
}
"#;

pub(crate) const STANDARD: &str = r#"
struct LitOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: MeshInput) -> LitOutput {
    var out: LitOutput;
    let world = object.model * vec4<f32>(input.position, 1.0);
    out.clip = globals.view_proj * world;
    out.world_pos = world.xyz;
    let normal_matrix = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    );
    out.normal = normalize(normal_matrix * input.normal);
    return out;
}

@fragment
fn fs_main(input: LitOutput) -> @location(0) vec4<f32> {
    let normal = normalize(input.normal);
    let light_dir = normalize(globals.light_position.xyz - input.world_pos);
    let view_dir = normalize(globals.camera_position.xyz - input.world_pos);
    let half_dir = normalize(light_dir + view_dir);

    let base = shading.color.rgb;
    let metalness = shading.surface.x;
    let roughness = max(shading.surface.y, 0.03);

    let diffuse = max(dot(normal, light_dir), 0.0) * base * (1.0 - metalness);
    let shininess = 2.0 / (roughness * roughness);
    let specular_color = mix(vec3<f32>(0.04), base, metalness);
    let specular = pow(max(dot(normal, half_dir), 0.0), shininess) * specular_color;
    let ambient = 0.15 * base;

    let light = globals.light_color.rgb * globals.light_color.w;
    let lit = ambient + (diffuse + specular) * light + shading.emissive.rgb;
    return vec4<f32>(lit, 1.0);
}
"#;

pub(crate) const PORTAL: &str = r#"
struct PortalOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(input: MeshInput) -> PortalOutput {
    var out: PortalOutput;
    out.clip = globals.view_proj * object.model * vec4<f32>(input.position, 1.0);
    out.uv = input.uv;
    return out;
}

@fragment
fn fs_main(input: PortalOutput) -> @location(0) vec4<f32> {
    let time = shading.params.x;
    let uv = input.uv;

    let displaced_uv = uv + gradient_noise(vec3<f32>(uv * 7.0, time * 0.1));
    var strength = gradient_noise(vec3<f32>(displaced_uv * 5.0, time * 0.2));

    let outer_glow = distance(uv, vec2<f32>(0.5)) * 5.0 - 1.4;
    strength += outer_glow;
    strength += step(-0.2, strength) * 0.8;
    strength = clamp(strength, 0.0, 1.0);

    let color = mix(shading.color_start.rgb, shading.color_end.rgb, strength);
    return vec4<f32>(color, 1.0);
}
"#;

pub(crate) const FIREFLIES: &str = r#"
struct FireflyInput {
    @location(0) corner: vec2<f32>,
    // xyz position, w scale
    @location(1) point: vec4<f32>,
}

struct FireflyOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) point_coord: vec2<f32>,
}

@vertex
fn vs_main(input: FireflyInput) -> FireflyOutput {
    let time = shading.params.x;
    let pixel_ratio = shading.params.y;
    let size = shading.params.z;
    let scale = input.point.w;

    var model_position = object.model * vec4<f32>(input.point.xyz, 1.0);
    model_position.y += sin(time + model_position.x * 100.0) * scale * 0.2;
    let view_position = globals.view * model_position;
    let clip = globals.projection * view_position;

    // Point size in framebuffer pixels, shrinking with distance.
    let point_size = size * pixel_ratio * scale * (1.0 / -view_position.z);
    let extent = input.corner * 2.0 * point_size / max(globals.viewport.xy, vec2<f32>(1.0));

    var out: FireflyOutput;
    out.clip = vec4<f32>(clip.xy + extent * clip.w, clip.zw);
    out.point_coord = input.corner + vec2<f32>(0.5);
    return out;
}

@fragment
fn fs_main(input: FireflyOutput) -> @location(0) vec4<f32> {
    let distance_to_center = distance(input.point_coord, vec2<f32>(0.5));
    let strength = 0.05 / max(distance_to_center, 0.0001) - 0.1;
    return vec4<f32>(1.0, 1.0, 1.0, clamp(strength, 0.0, 1.0));
}
"#;

pub(crate) const FIRE: &str = r#"
struct FireOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) volume: vec3<f32>,
}

@vertex
fn vs_main(input: MeshInput) -> FireOutput {
    var out: FireOutput;
    out.clip = globals.view_proj * object.model * vec4<f32>(input.position, 1.0);
    // Slices carry their volume coordinate in the normal slot.
    out.volume = input.normal;
    return out;
}

@fragment
fn fs_main(input: FireOutput) -> @location(0) vec4<f32> {
    let time = shading.params.x;
    let magnitude = shading.fire.x;
    let lacunarity = shading.fire.y;
    let gain = shading.fire.z;

    let p = clamp(input.volume, vec3<f32>(0.0), vec3<f32>(1.0));
    let centered = vec3<f32>(p.x * 2.0 - 1.0, p.y, p.z * 2.0 - 1.0);
    let rising = vec3<f32>(centered.x, centered.y - time * 1.2, centered.z) * 2.0;

    var turbulence = 0.0;
    var amplitude = 1.0;
    var frequency = 1.0;
    for (var octave = 0; octave < 4; octave += 1) {
        turbulence += abs(gradient_noise(rising * frequency)) * amplitude;
        frequency *= lacunarity;
        amplitude *= gain;
    }

    let radius = length(centered.xz) + turbulence * magnitude * 0.35 * p.y;
    let width = max(1.0 - p.y * 0.85, 0.001);
    let body = clamp(1.0 - radius / width, 0.0, 1.0);
    let heat = body * (1.0 - p.y);

    let ember = vec3<f32>(0.8, 0.12, 0.0);
    let flame = vec3<f32>(1.0, 0.75, 0.25);
    let color = mix(ember, flame, clamp(heat * 1.5, 0.0, 1.0));
    return vec4<f32>(color, clamp(heat * 1.2, 0.0, 1.0));
}
"#;

/// Copies the resolved drawing buffer onto the swap chain. Standalone,
/// not prefixed with [`COMMON`].
pub(crate) const BLIT: &str = r#"
@group(0) @binding(0)
var source: texture_2d<f32>;
@group(0) @binding(1)
var source_sampler: sampler;

struct BlitOutput {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

// One triangle covering the whole target.
@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> BlitOutput {
    let corner = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: BlitOutput;
    out.clip = vec4<f32>(corner * 2.0 - 1.0, 0.0, 1.0);
    out.uv = vec2<f32>(corner.x, 1.0 - corner.y);
    return out;
}

@fragment
fn fs_main(input: BlitOutput) -> @location(0) vec4<f32> {
    return textureSample(source, source_sampler, input.uv);
}
"#;
