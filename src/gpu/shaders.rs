// ============================================================================
// GPU SHADERS — all WGSL code kept inline for containment
// ============================================================================
//
// All three passes draw the same full-screen quad: unit positions mapped so
// uv (0,0) lands at the top-left of the render target.  Texture row 0 is the
// top scanline, so buffer readbacks come out top-to-bottom with no CPU flip.
//
// Displacement encode/decode: the pair's texture format stores raw values;
// the shader maps raw -> displacement via `(raw - bias) * scale`.  Float
// formats use (scale=1, bias=0); the 8-bit fallback uses (2, 0.5) so the
// [0,1] texel range covers ±1 UV of displacement.

// ============================================================================
// BRUSH SHADER — falloff-weighted displacement accumulation
// ============================================================================
//
// Reads the authoritative displacement buffer, adds the stroke delta inside
// the brush radius, writes the other buffer of the pair.  Distances are
// measured with the x axis scaled by the image aspect so the brush stays
// circular on screen for non-square images.
//
// The strength/edge coupling is intentional: strength drives both the delta
// magnitude and the falloff exponent (1 = soft linear edge, 8 = hard peak).
pub const BRUSH_SHADER: &str = r#"
struct BrushUniforms {
    prev_uv:    vec2<f32>,
    curr_uv:    vec2<f32>,
    radius_uv:  f32,
    strength:   f32,
    aspect:     f32,
    disp_scale: f32,
    disp_bias:  f32,
    _pad0:      f32,
    _pad1:      f32,
    _pad2:      f32,
};

@group(0) @binding(0) var<uniform> u: BrushUniforms;
@group(1) @binding(0) var disp_tex: texture_2d<f32>;
@group(1) @binding(1) var disp_samp: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_brush(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let pos = positions[vi];
    var out: VertexOutput;
    out.position = vec4<f32>(pos.x * 2.0 - 1.0, 1.0 - pos.y * 2.0, 0.0, 1.0);
    out.uv = pos;
    return out;
}

@fragment
fn fs_brush(in: VertexOutput) -> @location(0) vec4<f32> {
    let old = textureSample(disp_tex, disp_samp, in.uv);
    var d = (old.xy - vec2<f32>(u.disp_bias)) * u.disp_scale;

    let offset = (in.uv - u.curr_uv) * vec2<f32>(u.aspect, 1.0);
    let dist = length(offset);
    if (dist < u.radius_uv) {
        let n = dist / u.radius_uv;
        let expo = mix(1.0, 8.0, clamp(u.strength, 0.0, 1.0));
        let falloff = pow(clamp(1.0 - n, 0.0, 1.0), expo);
        d = d + (u.curr_uv - u.prev_uv) * falloff * u.strength;
    }

    let enc = d / u.disp_scale + vec2<f32>(u.disp_bias);
    return vec4<f32>(enc.x, enc.y, 0.0, 1.0);
}
"#;

// ============================================================================
// WARP SHADER — displaced sampling + color-managed tone pipeline
// ============================================================================
//
// Samples the source at `uv - displacement(uv)`, linearizes the sRGB input,
// then (modes 0/1) applies exposure, black point, Reinhard white-point
// compression, and tint in linear light before re-encoding to sRGB.
// Mode 2 (HDR) skips every tone op and the gamma encode — raw linear out.
//
// Modes: 0 = preview, 1 = standard export, 2 = HDR export.
pub const WARP_SHADER: &str = r#"
struct WarpUniforms {
    tint:        vec4<f32>,
    exposure:    f32,
    black_point: f32,
    white_point: f32,
    mode:        u32,
    disp_scale:  f32,
    disp_bias:   f32,
    _pad0:       f32,
    _pad1:       f32,
};

@group(0) @binding(0) var<uniform> u: WarpUniforms;

// Source image (sRGB-encoded RGBA8)
@group(1) @binding(0) var source_tex: texture_2d<f32>;
@group(1) @binding(1) var source_samp: sampler;

// Displacement map
@group(2) @binding(0) var disp_tex: texture_2d<f32>;
@group(2) @binding(1) var disp_samp: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_warp(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let pos = positions[vi];
    var out: VertexOutput;
    out.position = vec4<f32>(pos.x * 2.0 - 1.0, 1.0 - pos.y * 2.0, 0.0, 1.0);
    out.uv = pos;
    return out;
}

fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    let lo = c / 12.92;
    let hi = pow((c + vec3<f32>(0.055)) / 1.055, vec3<f32>(2.4));
    return select(hi, lo, c <= vec3<f32>(0.04045));
}

fn linear_to_srgb(c: vec3<f32>) -> vec3<f32> {
    let lo = c * 12.92;
    let hi = 1.055 * pow(c, vec3<f32>(1.0 / 2.4)) - vec3<f32>(0.055);
    return select(hi, lo, c <= vec3<f32>(0.0031308));
}

@fragment
fn fs_warp(in: VertexOutput) -> @location(0) vec4<f32> {
    let raw = textureSample(disp_tex, disp_samp, in.uv);
    let d = (raw.xy - vec2<f32>(u.disp_bias)) * u.disp_scale;
    let src = textureSample(source_tex, source_samp, in.uv - d);

    var color = srgb_to_linear(src.rgb);
    if (u.mode != 2u) {
        color = color * u.exposure;
        color = max(color - vec3<f32>(u.black_point), vec3<f32>(0.0));
        color = color / (vec3<f32>(1.0) + color / vec3<f32>(u.white_point));
        color = color * u.tint.rgb;
        color = linear_to_srgb(color);
    }
    return vec4<f32>(color, 1.0);
}
"#;

// ============================================================================
// BLIT SHADER — raw resample pass
// ============================================================================
//
// Copies/resamples one texture into a render target of any size via linear
// filtering.  Used for history snapshots (downsample the displacement
// buffer) and restores (upsample a snapshot back into both pair buffers).
// Values pass through untouched, so the displacement encoding survives.
pub const BLIT_SHADER: &str = r#"
@group(0) @binding(0) var src_tex: texture_2d<f32>;
@group(0) @binding(1) var src_samp: sampler;

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_blit(@builtin(vertex_index) vi: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let pos = positions[vi];
    var out: VertexOutput;
    out.position = vec4<f32>(pos.x * 2.0 - 1.0, 1.0 - pos.y * 2.0, 0.0, 1.0);
    out.uv = pos;
    return out;
}

@fragment
fn fs_blit(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(src_tex, src_samp, in.uv);
}
"#;
