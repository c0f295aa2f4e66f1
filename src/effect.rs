// src/effect.rs
//! The bar effect: shader injections for both variants, the uniform block they
//! read, and CPU versions of the reveal formulas.
//!
//! The CPU functions mirror `bars/reveal_vertex_pars.wgsl` and
//! `bars/reveal_fragment_pars.wgsl` one to one.

use bytemuck::{Pod, Zeroable};
use std::f32::consts::SQRT_2;

use crate::config::{EffectConfig, Rgb, Variant};
use crate::shader_library::ShaderLibrary;
use crate::shader_patch::{PatchSet, ShaderPatch, Stage};

const BAR_UNIFORMS: &str = include_str!("shaders/bars/bar_uniforms.wgsl");
const PUV_ATTRIBUTE: &str = include_str!("shaders/bars/puv_attribute.wgsl");
const UV_VARYINGS: &str = include_str!("shaders/bars/uv_varyings.wgsl");
const UV_VERTEX: &str = include_str!("shaders/bars/uv_vertex.wgsl");
const UV_FRAGMENT: &str = include_str!("shaders/bars/uv_fragment.wgsl");
const REVEAL_VARYINGS: &str = include_str!("shaders/bars/reveal_varyings.wgsl");
const REVEAL_VERTEX_PARS: &str = include_str!("shaders/bars/reveal_vertex_pars.wgsl");
const REVEAL_VERTEX: &str = include_str!("shaders/bars/reveal_vertex.wgsl");
const REVEAL_FRAGMENT_PARS: &str = include_str!("shaders/bars/reveal_fragment_pars.wgsl");
const REVEAL_FRAGMENT: &str = include_str!("shaders/bars/reveal_fragment.wgsl");

const COMMON: &str = "#include <common>";
const ATTRIBUTES: &str = "#include <attributes>";
const VARYINGS: &str = "#include <varyings>";
const BEGIN_VERTEX: &str = "#include <begin_vertex>";
const CLIPPING_PLANES: &str = "#include <clipping_planes_fragment>";

/// Adds the chunks the bar injections include.
pub fn register_chunks(library: &mut ShaderLibrary) {
    library.register("bar_uniforms", BAR_UNIFORMS);
}

/// Bars colored by `(u, v, 0.1)`.
pub fn uv_patches() -> PatchSet {
    PatchSet::new("bars_uv")
        .with(ShaderPatch::declaration(Stage::Vertex, ATTRIBUTES, PUV_ATTRIBUTE))
        .with(ShaderPatch::declaration(Stage::Vertex, VARYINGS, UV_VARYINGS))
        .with(ShaderPatch::logic(Stage::Vertex, BEGIN_VERTEX, UV_VERTEX))
        .with(ShaderPatch::declaration(Stage::Fragment, VARYINGS, UV_VARYINGS))
        .with(ShaderPatch::logic(Stage::Fragment, CLIPPING_PLANES, UV_FRAGMENT))
}

/// Mask/noise displacement, reveal ring and height color ramp.
pub fn reveal_patches() -> PatchSet {
    PatchSet::new("bars_reveal")
        .with(ShaderPatch::declaration(Stage::Vertex, COMMON, REVEAL_VERTEX_PARS))
        .with(ShaderPatch::declaration(Stage::Vertex, ATTRIBUTES, PUV_ATTRIBUTE))
        .with(ShaderPatch::declaration(Stage::Vertex, VARYINGS, REVEAL_VARYINGS))
        .with(ShaderPatch::logic(Stage::Vertex, BEGIN_VERTEX, REVEAL_VERTEX))
        .with(ShaderPatch::declaration(Stage::Fragment, COMMON, REVEAL_FRAGMENT_PARS))
        .with(ShaderPatch::declaration(Stage::Fragment, VARYINGS, REVEAL_VARYINGS))
        .with(ShaderPatch::logic(Stage::Fragment, CLIPPING_PLANES, REVEAL_FRAGMENT))
}

pub fn patches_for(variant: Variant) -> PatchSet {
    match variant {
        Variant::Uv => uv_patches(),
        Variant::Reveal => reveal_patches(),
    }
}

/// GLSL/WGSL `smoothstep`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn mix(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [0, 1, 2].map(|k| a[k] + (b[k] - a[k]) * t)
}

/// Radial fields at distance `len` from the grid center (UV space).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RevealFields {
    /// 1 inside the revealed disc, 0 outside.
    pub progress: f32,
    /// Pulse riding on the reveal front.
    pub ring: f32,
}

pub fn reveal_fields(len: f32, progress: f32, width: f32) -> RevealFields {
    let d = len * SQRT_2;
    let front = progress * (1.0 + width);
    let half = width * 0.5;
    RevealFields {
        progress: 1.0 - smoothstep(front - width, front, d),
        ring: smoothstep(front - width, front - half, d) * (1.0 - smoothstep(front - half, front, d)),
    }
}

/// Vertical offset of a bar given the sampled mask texels and noise value.
pub fn displacement(u: &BarUniforms, puv: [f32; 2], mask_texel: f32, reveal_texel: f32, noise: f32) -> f32 {
    let len = ((puv[0] - 0.5).powi(2) + (puv[1] - 0.5).powi(2)).sqrt();
    let fields = reveal_fields(len, u.progress, u.ring_width);
    let start = mask_texel * u.start_prog;
    let mask = start + (reveal_texel - start) * fields.progress;
    noise * u.noise_mul * mask * (1.0 - fields.ring) + fields.ring * u.ring_pop
}

/// Height to color, in the uniforms' (linear) color space.
pub fn color_ramp(u: &BarUniforms, height: f32) -> [f32; 3] {
    let rgb = |c: [f32; 4]| [c[0], c[1], c[2]];
    let low = mix(rgb(u.color_two), rgb(u.color_three), smoothstep(u.band_low, u.band_mid, height));
    mix(low, rgb(u.color_four), smoothstep(u.band_mid, u.band_high, height))
}

/// `BarUniforms` in `bars/bar_uniforms.wgsl`.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct BarUniforms {
    pub time: f32,
    pub start_prog: f32,
    pub progress: f32,
    pub noise_mul: f32,
    pub noise_scale: f32,
    pub noise_speed: f32,
    pub ring_pop: f32,
    pub ring_width: f32,
    pub band_low: f32,
    pub band_mid: f32,
    pub band_high: f32,
    pub _pad0: f32,
    pub color_two: [f32; 4],
    pub color_three: [f32; 4],
    pub color_four: [f32; 4],
}

fn linear4(c: Rgb) -> [f32; 4] {
    let [r, g, b] = c.to_linear();
    [r, g, b, 1.0]
}

impl BarUniforms {
    /// Initial values: `time`, `start_prog` and `progress` start at zero.
    pub fn from_config(effect: &EffectConfig) -> Self {
        Self {
            time: 0.0,
            start_prog: 0.0,
            progress: 0.0,
            noise_mul: effect.noise_mul,
            noise_scale: effect.noise_scale,
            noise_speed: effect.noise_speed,
            ring_pop: effect.ring_pop,
            ring_width: effect.ring_width,
            band_low: effect.band_low,
            band_mid: effect.band_mid,
            band_high: effect.band_high,
            _pad0: 0.0,
            color_two: linear4(effect.color_two),
            color_three: linear4(effect.color_three),
            color_four: linear4(effect.color_four),
        }
    }
}

/// Scalar entries of the uniform set, addressable by the timeline and panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformField {
    Time,
    StartProg,
    Progress,
    NoiseMul,
    NoiseScale,
    NoiseSpeed,
    RingPop,
    RingWidth,
    BandLow,
    BandMid,
    BandHigh,
}

impl UniformField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::StartProg => "start_prog",
            Self::Progress => "progress",
            Self::NoiseMul => "noise_mul",
            Self::NoiseScale => "noise_scale",
            Self::NoiseSpeed => "noise_speed",
            Self::RingPop => "ring_pop",
            Self::RingWidth => "ring_width",
            Self::BandLow => "band_low",
            Self::BandMid => "band_mid",
            Self::BandHigh => "band_high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSlot {
    Two,
    Three,
    Four,
}

/// The one uniform set of the instanced mesh. Every setter that changes a
/// value marks the set dirty; the renderer uploads and clears it.
#[derive(Debug, Clone)]
pub struct UniformSet {
    values: BarUniforms,
    dirty: bool,
}

impl UniformSet {
    pub fn new(effect: &EffectConfig) -> Self {
        Self { values: BarUniforms::from_config(effect), dirty: true }
    }

    #[inline]
    pub fn values(&self) -> &BarUniforms {
        &self.values
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns whether an upload is due and clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    fn slot(&mut self, field: UniformField) -> &mut f32 {
        let v = &mut self.values;
        match field {
            UniformField::Time => &mut v.time,
            UniformField::StartProg => &mut v.start_prog,
            UniformField::Progress => &mut v.progress,
            UniformField::NoiseMul => &mut v.noise_mul,
            UniformField::NoiseScale => &mut v.noise_scale,
            UniformField::NoiseSpeed => &mut v.noise_speed,
            UniformField::RingPop => &mut v.ring_pop,
            UniformField::RingWidth => &mut v.ring_width,
            UniformField::BandLow => &mut v.band_low,
            UniformField::BandMid => &mut v.band_mid,
            UniformField::BandHigh => &mut v.band_high,
        }
    }

    pub fn get(&self, field: UniformField) -> f32 {
        let v = &self.values;
        match field {
            UniformField::Time => v.time,
            UniformField::StartProg => v.start_prog,
            UniformField::Progress => v.progress,
            UniformField::NoiseMul => v.noise_mul,
            UniformField::NoiseScale => v.noise_scale,
            UniformField::NoiseSpeed => v.noise_speed,
            UniformField::RingPop => v.ring_pop,
            UniformField::RingWidth => v.ring_width,
            UniformField::BandLow => v.band_low,
            UniformField::BandMid => v.band_mid,
            UniformField::BandHigh => v.band_high,
        }
    }

    pub fn set(&mut self, field: UniformField, value: f32) {
        let slot = self.slot(field);
        if *slot != value {
            *slot = value;
            self.dirty = true;
        }
    }

    /// Linear RGB.
    pub fn color(&self, slot: ColorSlot) -> [f32; 3] {
        let c = match slot {
            ColorSlot::Two => self.values.color_two,
            ColorSlot::Three => self.values.color_three,
            ColorSlot::Four => self.values.color_four,
        };
        [c[0], c[1], c[2]]
    }

    pub fn set_color(&mut self, slot: ColorSlot, rgb: [f32; 3]) {
        let c = match slot {
            ColorSlot::Two => &mut self.values.color_two,
            ColorSlot::Three => &mut self.values.color_three,
            ColorSlot::Four => &mut self.values.color_four,
        };
        let next = [rgb[0], rgb[1], rgb[2], 1.0];
        if *c != next {
            *c = next;
            self.dirty = true;
        }
    }

    #[inline]
    pub fn set_time(&mut self, seconds: f32) {
        self.set(UniformField::Time, seconds);
    }

    #[inline]
    pub fn set_start_prog(&mut self, value: f32) {
        self.set(UniformField::StartProg, value);
    }

    #[inline]
    pub fn set_progress(&mut self, value: f32) {
        self.set(UniformField::Progress, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoConfig;
    use crate::shader_library::validate_wgsl;
    use crate::shader_patch::PatchError;

    fn uniforms() -> BarUniforms {
        BarUniforms::from_config(&DemoConfig::for_variant(Variant::Reveal).effect)
    }

    #[test]
    fn test_uniform_block_size() {
        assert_eq!(std::mem::size_of::<BarUniforms>(), 96);
        assert_eq!(std::mem::offset_of!(BarUniforms, color_two), 48);
    }

    #[test]
    fn test_fields_zero_at_center_before_start() {
        let f = reveal_fields(0.0, 0.0, 0.3);
        assert_eq!(f.progress, 0.0);
        assert_eq!(f.ring, 0.0);
    }

    #[test]
    fn test_progress_sweep() {
        let width = 0.3;
        for len in [0.0, 0.1, 0.35, 0.7] {
            let mut last_progress = -1.0;
            let mut peak: f32 = 0.0;
            for step in 0..=200 {
                let f = reveal_fields(len, step as f32 / 200.0, width);
                assert!(f.progress >= last_progress - 1e-6, "progress field went down at len {len}");
                assert!((0.0..=1.0).contains(&f.ring));
                last_progress = f.progress;
                peak = peak.max(f.ring);
            }
            let end = reveal_fields(len, 1.0, width);
            assert!((end.progress - 1.0).abs() < 1e-6);
            assert!(end.ring.abs() < 1e-6);
            assert!(peak > 0.5, "ring never rose at len {len}");
        }
    }

    #[test]
    fn test_displacement_is_ring_pop_on_the_front() {
        let mut u = uniforms();
        u.progress = 0.5;
        // d = len·√2 sits between the two ring edges at front - w/2
        let front = u.progress * (1.0 + u.ring_width);
        let len = (front - u.ring_width * 0.5) / SQRT_2;
        let y = displacement(&u, [0.5 + len, 0.5], 1.0, 1.0, 0.0);
        let ring = reveal_fields(len, u.progress, u.ring_width).ring;
        assert!((y - ring * u.ring_pop).abs() < 1e-4);
        assert!(ring > 0.9);
    }

    #[test]
    fn test_displacement_masked_before_start() {
        let u = uniforms();
        assert_eq!(displacement(&u, [0.9, 0.1], 1.0, 0.0, 0.8), 0.0);
    }

    #[test]
    fn test_color_ramp_regions() {
        let u = uniforms();
        let two = [u.color_two[0], u.color_two[1], u.color_two[2]];
        let three = [u.color_three[0], u.color_three[1], u.color_three[2]];
        let four = [u.color_four[0], u.color_four[1], u.color_four[2]];

        for y in [-30.0, -15.0, -7.5, 0.0] {
            let c = color_ramp(&u, y);
            for k in 0..3 {
                let (lo, hi) = (two[k].min(three[k]), two[k].max(three[k]));
                assert!(c[k] >= lo - 1e-6 && c[k] <= hi + 1e-6);
            }
        }
        for y in [35.0, 80.0] {
            let c = color_ramp(&u, y);
            assert!((0..3).all(|k| (c[k] - four[k]).abs() < 1e-6));
        }

        let mut prev = color_ramp(&u, 0.0);
        for step in 1..=70 {
            let c = color_ramp(&u, step as f32 * 0.5);
            for k in 0..3 {
                let rising = four[k] >= three[k];
                let ok = if rising { c[k] >= prev[k] - 1e-6 } else { c[k] <= prev[k] + 1e-6 };
                assert!(ok, "channel {k} not monotonic at {}", step as f32 * 0.5);
            }
            prev = c;
        }
    }

    #[test]
    fn test_uniform_set_dirty_tracking() {
        let mut set = UniformSet::new(&DemoConfig::default().effect);
        assert!(set.take_dirty());
        assert!(!set.is_dirty());
        set.set_time(0.0);
        assert!(!set.is_dirty());
        set.set_time(1.5);
        assert!(set.take_dirty());
        assert_eq!(set.get(UniformField::Time), 1.5);
        set.set_color(ColorSlot::Four, [1.0, 0.0, 0.0]);
        assert!(set.is_dirty());
        assert_eq!(set.color(ColorSlot::Four), [1.0, 0.0, 0.0]);
    }

    fn build(variant: Variant) -> crate::shader_library::ShaderProgram {
        let mut library = ShaderLibrary::standard();
        register_chunks(&mut library);
        let mut source = ShaderLibrary::standard_source();
        patches_for(variant).apply(&mut source).unwrap();
        library.build(&source).unwrap()
    }

    #[test]
    fn test_uv_program_validates() {
        let program = build(Variant::Uv);
        assert!(program.vertex.contains("@location(7) puv: vec2<f32>"));
        assert!(program.fragment.contains("in.v_puv, 0.1"));
        validate_wgsl(&program.vertex).unwrap();
        validate_wgsl(&program.fragment).unwrap();
    }

    #[test]
    fn test_reveal_program_validates() {
        let program = build(Variant::Reveal);
        assert!(program.vertex.contains("fn snoise"));
        assert!(program.fragment.contains("fn color_ramp"));
        validate_wgsl(&program.vertex).unwrap();
        validate_wgsl(&program.fragment).unwrap();
    }

    #[test]
    fn test_patch_sets_validate_against_template() {
        let source = ShaderLibrary::standard_source();
        uv_patches().validate(&source).unwrap();
        reveal_patches().validate(&source).unwrap();
    }

    #[test]
    fn test_variants_do_not_stack() {
        let mut source = ShaderLibrary::standard_source();
        reveal_patches().apply(&mut source).unwrap();
        let revealed = source.clone();
        let err = uv_patches().apply(&mut source).unwrap_err();
        assert!(matches!(err, PatchError::AlreadyDeclared { stage: Stage::Vertex, .. }), "{err}");
        assert_eq!(source, revealed);
        assert_eq!(source.vertex().matches("@location(7) puv").count(), 1);
    }
}
