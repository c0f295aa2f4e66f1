// src/config.rs
//! Demo configuration: grid, camera, lights, material, effect uniforms and the
//! reveal timeline. Every tuned constant lives here instead of in shader text.
//!
//! JSON files only need to name what they change. Missing fields are filled in
//! from the defaults of the selected [`Variant`].

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

use crate::timeline::Ease;
use crate::{ensure, Context, Error, Result};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "BARS_CONFIG";

/// Which flavour of the demo to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Bars colored by their grid UV.
    Uv,
    /// Mask/noise displacement, reveal ring, color ramp, timeline and panel.
    #[default]
    Reveal,
}

/// sRGB color written as `"#rrggbb"` in config files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn from_hex(hex: u32) -> Self {
        Self::new((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }

    /// sRGB components in [0, 1].
    pub fn to_srgb(self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|c| c as f32 / 255.0)
    }

    /// Linear-light components, what shaders and clear colors expect.
    pub fn to_linear(self) -> [f32; 3] {
        self.to_srgb().map(srgb_to_linear)
    }
}

#[inline]
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        let digits = value.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return Err(format!("expected #rrggbb, got {value:?}"));
        }
        u32::from_str_radix(digits, 16)
            .map(Rgb::from_hex)
            .map_err(|e| format!("bad color {value:?}: {e}"))
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// Asset locations, relative to `root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetConfig {
    pub root: PathBuf,
    pub model: String,
    pub ao_map: String,
    pub mask: Option<String>,
    pub reveal: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridConfig {
    /// Bars per side; the mesh holds `side²` instances.
    pub side: u32,
    /// Distance between neighbouring cells, in base-geometry units.
    pub spacing: f32,
    /// Uniform scale baked into the base geometry before instancing.
    pub geometry_scale: f32,
    /// Uniform scale of the instanced object.
    pub mesh_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraConfig {
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub zoom: f32,
    /// World-space vertical extent kept constant across aspect ratios.
    pub frustum_height: f32,
    pub near: f32,
    pub far: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AmbientConfig {
    pub color: Rgb,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpotConfig {
    pub color: Rgb,
    pub intensity: f32,
    /// Cone half-angle, radians.
    pub angle: f32,
    pub penumbra: f32,
    pub decay: f32,
    /// 0 means unlimited range.
    pub distance: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialConfig {
    pub color: Rgb,
    pub metalness: f32,
    pub roughness: f32,
    pub ao_map_intensity: f32,
    /// Also bind the AO texture as the color map.
    pub ao_as_color_map: bool,
}

/// Initial values of the bar uniform set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EffectConfig {
    pub noise_mul: f32,
    pub noise_scale: f32,
    pub noise_speed: f32,
    pub ring_pop: f32,
    pub ring_width: f32,
    pub band_low: f32,
    pub band_mid: f32,
    pub band_high: f32,
    pub color_two: Rgb,
    pub color_three: Rgb,
    pub color_four: Rgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TweenConfig {
    pub delay: f32,
    pub duration: f32,
    pub ease: Ease,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimelineConfig {
    pub start: TweenConfig,
    pub progress: TweenConfig,
    /// Orbit target at the beginning and end of the start tween.
    pub camera_from: [f32; 3],
    pub camera_to: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DemoConfig {
    pub variant: Variant,
    pub window: WindowConfig,
    pub assets: AssetConfig,
    pub grid: GridConfig,
    pub camera: CameraConfig,
    pub ambient: AmbientConfig,
    pub spot: SpotConfig,
    pub material: MaterialConfig,
    pub effect: EffectConfig,
    pub timeline: Option<TimelineConfig>,
    pub panel: bool,
    pub clear_color: Rgb,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self::for_variant(Variant::default())
    }
}

impl DemoConfig {
    /// Built-in defaults for a variant.
    pub fn for_variant(variant: Variant) -> Self {
        let reveal = variant == Variant::Reveal;
        Self {
            variant,
            window: WindowConfig {
                title: "Instanced Bars".into(),
                width: 1280,
                height: 720,
            },
            assets: AssetConfig {
                root: PathBuf::from("assets"),
                model: "models/bar.glb".into(),
                ao_map: "models/ao-map.png".into(),
                mask: reveal.then(|| "textures/mask.png".into()),
                reveal: reveal.then(|| "textures/reveal.png".into()),
            },
            grid: if reveal {
                GridConfig { side: 50, spacing: 60.0, geometry_scale: 50.0, mesh_scale: 0.005 }
            } else {
                GridConfig { side: 50, spacing: 1.5, geometry_scale: 1.0, mesh_scale: 0.1 }
            },
            camera: CameraConfig {
                position: [-80.0, 40.0, 80.0],
                target: [0.0, 0.0, 0.0],
                zoom: if reveal { 0.75 } else { 7.0 },
                frustum_height: 10.0,
                near: 0.1,
                far: 2000.0,
            },
            ambient: AmbientConfig { color: Rgb::from_hex(0xffffff), intensity: 1.0 },
            spot: SpotConfig {
                color: Rgb::from_hex(0xff0000),
                intensity: 100.0,
                angle: PI / 2.5,
                penumbra: 1.0,
                decay: 2.0,
                distance: 0.0,
                position: [0.577, 0.477, -0.577],
                target: [0.0, 1000.0, 1020.0],
            },
            material: MaterialConfig {
                color: Rgb::from_hex(0x0000ff),
                metalness: 0.3,
                roughness: 0.5,
                ao_map_intensity: 0.8,
                ao_as_color_map: true,
            },
            effect: EffectConfig {
                noise_mul: 30.0,
                noise_scale: 4.0,
                noise_speed: 0.3,
                ring_pop: 50.0,
                ring_width: 0.3,
                band_low: -15.0,
                band_mid: 0.0,
                band_high: 35.0,
                color_two: Rgb::from_hex(0x1b1f3b),
                color_three: Rgb::from_hex(0x3a7bd5),
                color_four: Rgb::from_hex(0xf7f7ff),
            },
            timeline: reveal.then_some(TimelineConfig {
                start: TweenConfig { delay: 1.0, duration: 3.0, ease: Ease::Power2InOut },
                progress: TweenConfig { delay: 0.0, duration: 4.0, ease: Ease::Power3Out },
                camera_from: [0.0, 3.0, 0.0],
                camera_to: [0.0, 0.0, 0.0],
            }),
            panel: reveal,
            clear_color: Rgb::from_hex(0x00f0ff),
        }
    }

    /// Parses JSON, filling unspecified fields from the variant defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let overrides: serde_json::Value = serde_json::from_str(text)?;
        let variant = match overrides.get("variant") {
            Some(v) => serde_json::from_value(v.clone())?,
            None => Variant::default(),
        };
        let mut merged = serde_json::to_value(Self::for_variant(variant))?;
        merge_json(&mut merged, overrides);
        let config: Self = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Error::Config(msg);
        if self.grid.side == 0 {
            return Err(invalid("grid.side must be at least 1".into()));
        }
        if !(self.grid.spacing > 0.0) || !(self.grid.geometry_scale > 0.0) || !(self.grid.mesh_scale > 0.0) {
            return Err(invalid(format!("grid spacing and scales must be positive: {:?}", self.grid)));
        }
        if !(self.camera.zoom > 0.0) || !(self.camera.frustum_height > 0.0) {
            return Err(invalid("camera zoom and frustum_height must be positive".into()));
        }
        if !(self.camera.far > self.camera.near) {
            return Err(invalid("camera.far must exceed camera.near".into()));
        }
        if !(self.effect.ring_width > 0.0) {
            return Err(invalid("effect.ring_width must be positive".into()));
        }
        let e = &self.effect;
        if !(e.band_low < e.band_mid && e.band_mid < e.band_high) {
            return Err(invalid(format!(
                "color bands must increase: {} < {} < {}",
                e.band_low, e.band_mid, e.band_high
            )));
        }
        if let Some(t) = &self.timeline {
            for (name, tween) in [("start", &t.start), ("progress", &t.progress)] {
                ensure!(
                    tween.delay >= 0.0 && tween.duration >= 0.0,
                    "timeline.{} delay/duration must not be negative",
                    name
                );
            }
        }
        if self.variant == Variant::Reveal && (self.assets.mask.is_none() || self.assets.reveal.is_none()) {
            return Err(invalid("reveal variant needs assets.mask and assets.reveal".into()));
        }
        Ok(())
    }

    #[inline]
    pub fn instance_count(&self) -> u32 {
        self.grid.side * self.grid.side
    }
}

/// Recursively overlays `patch` onto `base`. Objects merge key by key, any
/// other value replaces what was there.
fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) if value.is_object() && slot.is_object() => merge_json(slot, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
