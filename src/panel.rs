// src/panel.rs
//! Live parameter panel model.
//!
//! A [`Panel`] is a flat list of [`Control`]s. Each control binds a label to
//! one field of the [`Scene`] and says how it is edited. Reads and writes go
//! through [`Binding`], so the GUI layer never touches scene fields directly
//! and the side effects of an edit live in one place:
//! - light edits mark the light uniform dirty,
//! - spot-target edits also refresh the target's world matrix,
//! - material edits mark the material uniform dirty,
//! - grid edits regenerate the instance buffers.

use crate::effect::{ColorSlot, UniformField};
use crate::instancing::GridLayout;
use crate::scene::Scene;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Scene field a control reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    SpotPosition(Axis),
    SpotTarget(Axis),
    SpotAngle,
    SpotPenumbra,
    SpotIntensity,
    Uniform(UniformField),
    Color(ColorSlot),
    Metalness,
    Roughness,
    GridSide,
    GridSpacing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Editor {
    Slider { min: f32, max: f32, step: f32 },
    /// Linear RGB color picker.
    Color,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Scalar(f32),
    Color([f32; 3]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub folder: &'static str,
    pub label: &'static str,
    pub binding: Binding,
    pub editor: Editor,
}

impl Control {
    pub fn slider(folder: &'static str, label: &'static str, binding: Binding, min: f32, max: f32, step: f32) -> Self {
        Self { folder, label, binding, editor: Editor::Slider { min, max, step } }
    }

    pub fn color(folder: &'static str, label: &'static str, slot: ColorSlot) -> Self {
        Self { folder, label, binding: Binding::Color(slot), editor: Editor::Color }
    }

    pub fn read(&self, scene: &Scene) -> Option<Value> {
        self.binding.read(scene)
    }

    /// Writes `value`, clamped and snapped to the editor's range. Returns
    /// whether the scene changed.
    pub fn write(&self, scene: &mut Scene, value: Value) -> bool {
        let value = match (self.editor, value) {
            (Editor::Slider { min, max, step }, Value::Scalar(v)) => {
                let v = if step > 0.0 { min + ((v - min) / step).round() * step } else { v };
                Value::Scalar(v.clamp(min, max))
            }
            (Editor::Color, Value::Color(c)) => Value::Color(c.map(|x| x.clamp(0.0, 1.0))),
            _ => return false,
        };
        if self.binding.read(scene) == Some(value) {
            return false;
        }
        self.binding.write(scene, value)
    }
}

impl Binding {
    pub fn read(&self, scene: &Scene) -> Option<Value> {
        let scalar = |v: f32| Some(Value::Scalar(v));
        match *self {
            Binding::SpotPosition(axis) => scalar(scene.spot.position[axis.index()]),
            Binding::SpotTarget(axis) => scalar(scene.spot.target.position[axis.index()]),
            Binding::SpotAngle => scalar(scene.spot.angle),
            Binding::SpotPenumbra => scalar(scene.spot.penumbra),
            Binding::SpotIntensity => scalar(scene.spot.intensity),
            Binding::Uniform(field) => scene.uniforms.as_ref().map(|u| Value::Scalar(u.get(field))),
            Binding::Color(slot) => scene.uniforms.as_ref().map(|u| Value::Color(u.color(slot))),
            Binding::Metalness => scalar(scene.material.metalness),
            Binding::Roughness => scalar(scene.material.roughness),
            Binding::GridSide => scalar(scene.grid.side as f32),
            Binding::GridSpacing => scalar(scene.grid.spacing),
        }
    }

    pub fn write(&self, scene: &mut Scene, value: Value) -> bool {
        match (*self, value) {
            (Binding::SpotPosition(axis), Value::Scalar(v)) => {
                scene.spot.position[axis.index()] = v;
                scene.dirty.lights = true;
            }
            (Binding::SpotTarget(axis), Value::Scalar(v)) => {
                scene.spot.target.position[axis.index()] = v;
                // The spot direction reads the target's world matrix.
                scene.spot.target.update_world();
                scene.dirty.lights = true;
            }
            (Binding::SpotAngle, Value::Scalar(v)) => {
                scene.spot.angle = v;
                scene.dirty.lights = true;
            }
            (Binding::SpotPenumbra, Value::Scalar(v)) => {
                scene.spot.penumbra = v;
                scene.dirty.lights = true;
            }
            (Binding::SpotIntensity, Value::Scalar(v)) => {
                scene.spot.intensity = v;
                scene.dirty.lights = true;
            }
            (Binding::Uniform(field), Value::Scalar(v)) => {
                let Some(u) = scene.uniforms.as_mut() else { return false };
                let v = match field {
                    UniformField::BandLow => v.min(u.get(UniformField::BandMid) - BAND_GAP),
                    UniformField::BandMid => {
                        band_mid(v, u.get(UniformField::BandLow), u.get(UniformField::BandHigh))
                    }
                    UniformField::BandHigh => v.max(u.get(UniformField::BandMid) + BAND_GAP),
                    UniformField::RingWidth => v.max(BAND_GAP),
                    _ => v,
                };
                u.set(field, v);
            }
            (Binding::Color(slot), Value::Color(c)) => {
                let Some(u) = scene.uniforms.as_mut() else { return false };
                u.set_color(slot, c);
            }
            (Binding::Metalness, Value::Scalar(v)) => {
                scene.material.metalness = v;
                scene.dirty.material = true;
            }
            (Binding::Roughness, Value::Scalar(v)) => {
                scene.material.roughness = v;
                scene.dirty.material = true;
            }
            (Binding::GridSide, Value::Scalar(v)) => {
                let side = v.round().max(1.0) as u32;
                scene.set_grid(GridLayout::new(side, scene.grid.spacing));
            }
            (Binding::GridSpacing, Value::Scalar(v)) => {
                scene.set_grid(GridLayout::new(scene.grid.side, v));
            }
            _ => return false,
        }
        true
    }
}

/// Smallest gap kept between color band edges.
const BAND_GAP: f32 = 0.01;

/// Keeps the middle band edge strictly between `low` and `high`. Bands closer
/// than two gaps leave no room, so the middle sits halfway between them.
fn band_mid(v: f32, low: f32, high: f32) -> f32 {
    let (lo, hi) = (low + BAND_GAP, high - BAND_GAP);
    if lo <= hi {
        v.max(lo).min(hi)
    } else {
        low + (high - low) * 0.5
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub visible: bool,
    controls: Vec<Control>,
}

impl Panel {
    pub fn new(controls: Vec<Control>) -> Self {
        Self { visible: true, controls }
    }

    /// Controls of the reveal variant.
    pub fn reveal() -> Self {
        use Binding as B;
        use std::f32::consts::FRAC_PI_2;
        let mut c = vec![
            Control::slider("Spot light", "x", B::SpotPosition(Axis::X), -10.0, 10.0, 0.001),
            Control::slider("Spot light", "y", B::SpotPosition(Axis::Y), -10.0, 10.0, 0.001),
            Control::slider("Spot light", "z", B::SpotPosition(Axis::Z), -10.0, 10.0, 0.001),
            Control::slider("Spot light", "angle", B::SpotAngle, 0.0, FRAC_PI_2, 0.001),
            Control::slider("Spot light", "penumbra", B::SpotPenumbra, 0.0, 1.0, 0.01),
            Control::slider("Spot light", "intensity", B::SpotIntensity, 0.0, 500.0, 1.0),
            Control::slider("Spot target", "x", B::SpotTarget(Axis::X), -2000.0, 2000.0, 1.0),
            Control::slider("Spot target", "y", B::SpotTarget(Axis::Y), -2000.0, 2000.0, 1.0),
            Control::slider("Spot target", "z", B::SpotTarget(Axis::Z), -2000.0, 2000.0, 1.0),
        ];
        let uniform = |label, field, min, max, step| Control::slider("Effect", label, B::Uniform(field), min, max, step);
        c.extend([
            uniform("start_prog", UniformField::StartProg, 0.0, 1.0, 0.001),
            uniform("progress", UniformField::Progress, 0.0, 1.0, 0.001),
            uniform("noise_mul", UniformField::NoiseMul, 0.0, 100.0, 0.1),
            uniform("noise_scale", UniformField::NoiseScale, 0.0, 20.0, 0.01),
            uniform("noise_speed", UniformField::NoiseSpeed, 0.0, 2.0, 0.01),
            uniform("ring_pop", UniformField::RingPop, 0.0, 200.0, 0.5),
            uniform("ring_width", UniformField::RingWidth, 0.01, 1.0, 0.01),
            uniform("band_low", UniformField::BandLow, -50.0, 100.0, 0.5),
            uniform("band_mid", UniformField::BandMid, -50.0, 100.0, 0.5),
            uniform("band_high", UniformField::BandHigh, -50.0, 100.0, 0.5),
        ]);
        c.extend([
            Control::color("Colors", "color_two", ColorSlot::Two),
            Control::color("Colors", "color_three", ColorSlot::Three),
            Control::color("Colors", "color_four", ColorSlot::Four),
            Control::slider("Material", "metalness", B::Metalness, 0.0, 1.0, 0.01),
            Control::slider("Material", "roughness", B::Roughness, 0.0, 1.0, 0.01),
            Control::slider("Grid", "side", B::GridSide, 1.0, 200.0, 1.0),
            Control::slider("Grid", "spacing", B::GridSpacing, 0.1, 200.0, 0.1),
        ]);
        Self::new(c)
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Folder names in first-appearance order.
    pub fn folders(&self) -> Vec<&'static str> {
        let mut out: Vec<&'static str> = Vec::new();
        for control in &self.controls {
            if !out.contains(&control.folder) {
                out.push(control.folder);
            }
        }
        out
    }

    pub fn find(&self, folder: &str, label: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.folder == folder && c.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemoConfig, Variant};
    use glam::Vec3;

    fn scene() -> Scene {
        let mut scene = Scene::new(&DemoConfig::for_variant(Variant::Reveal), 800, 600);
        scene.initialize_bars();
        scene.dirty = Default::default();
        scene
    }

    #[test]
    fn test_target_write_refreshes_world_matrix() {
        let mut scene = scene();
        let panel = Panel::reveal();
        let before = scene.spot.direction();
        let control = panel.find("Spot target", "y").unwrap();
        assert!(control.write(&mut scene, Value::Scalar(-1000.0)));
        assert!(!scene.spot.target.is_stale());
        assert_ne!(scene.spot.direction(), before);
        assert_eq!(scene.spot.target.world_position().y, -1000.0);
        assert!(scene.dirty.lights);
    }

    #[test]
    fn test_direct_target_edit_stays_stale() {
        let mut scene = scene();
        let before = scene.spot.direction();
        scene.spot.target.position = Vec3::new(0.0, -1000.0, 0.0);
        assert_eq!(scene.spot.direction(), before);
    }

    #[test]
    fn test_slider_clamps_and_snaps() {
        let mut scene = scene();
        let panel = Panel::reveal();
        let progress = panel.find("Effect", "progress").unwrap();
        progress.write(&mut scene, Value::Scalar(3.0));
        assert_eq!(progress.read(&scene), Some(Value::Scalar(1.0)));
        let side = panel.find("Grid", "side").unwrap();
        side.write(&mut scene, Value::Scalar(20.4));
        assert_eq!(scene.grid.side, 20);
        assert!(scene.dirty.grid);
    }

    #[test]
    fn test_uniform_write_marks_set_dirty() {
        let mut scene = scene();
        scene.uniforms.as_mut().unwrap().take_dirty();
        let panel = Panel::reveal();
        assert!(panel.find("Effect", "ring_pop").unwrap().write(&mut scene, Value::Scalar(80.0)));
        let u = scene.uniforms.as_mut().unwrap();
        assert_eq!(u.get(UniformField::RingPop), 80.0);
        assert!(u.take_dirty());
    }

    #[test]
    fn test_bands_keep_their_order() {
        let mut scene = scene();
        let panel = Panel::reveal();
        panel.find("Effect", "band_mid").unwrap().write(&mut scene, Value::Scalar(60.0));
        let u = scene.uniforms.as_ref().unwrap();
        assert!(u.get(UniformField::BandMid) < u.get(UniformField::BandHigh));
    }

    #[test]
    fn test_band_mid_between_squeezed_bands() {
        let mut scene = scene();
        let panel = Panel::reveal();
        let u = scene.uniforms.as_mut().unwrap();
        u.set(UniformField::BandLow, -0.001);
        u.set(UniformField::BandMid, 0.0);
        u.set(UniformField::BandHigh, 0.001);
        assert!(panel.find("Effect", "band_mid").unwrap().write(&mut scene, Value::Scalar(0.5)));
        let u = scene.uniforms.as_ref().unwrap();
        assert_eq!(u.get(UniformField::BandMid), 0.0);

        // low and high pushed right up against the middle edge
        for mid in [32.0, -32.0] {
            let mut scene = self::scene();
            panel.find("Effect", "band_mid").unwrap().write(&mut scene, Value::Scalar(mid));
            panel.find("Effect", "band_low").unwrap().write(&mut scene, Value::Scalar(100.0));
            panel.find("Effect", "band_high").unwrap().write(&mut scene, Value::Scalar(-50.0));
            panel.find("Effect", "band_mid").unwrap().write(&mut scene, Value::Scalar(mid + 5.0));
            let u = scene.uniforms.as_ref().unwrap();
            assert!(u.get(UniformField::BandLow) <= u.get(UniformField::BandMid));
            assert!(u.get(UniformField::BandMid) <= u.get(UniformField::BandHigh));
        }
    }

    #[test]
    fn test_uniform_controls_need_loaded_bars() {
        let mut scene = Scene::new(&DemoConfig::for_variant(Variant::Reveal), 800, 600);
        let panel = Panel::reveal();
        let control = panel.find("Effect", "noise_mul").unwrap();
        assert_eq!(control.read(&scene), None);
        assert!(!control.write(&mut scene, Value::Scalar(1.0)));
    }

    #[test]
    fn test_color_and_material_writes() {
        let mut scene = scene();
        let panel = Panel::reveal();
        assert!(panel.find("Colors", "color_four").unwrap().write(&mut scene, Value::Color([2.0, 0.5, -1.0])));
        assert_eq!(scene.uniforms.as_ref().unwrap().color(ColorSlot::Four), [1.0, 0.5, 0.0]);
        assert!(panel.find("Material", "roughness").unwrap().write(&mut scene, Value::Scalar(0.9)));
        assert!(scene.dirty.material);
        // mismatched value kinds are ignored
        assert!(!panel.find("Material", "roughness").unwrap().write(&mut scene, Value::Color([0.0; 3])));
    }

    #[test]
    fn test_folders() {
        let panel = Panel::reveal();
        assert_eq!(panel.folders(), ["Spot light", "Spot target", "Effect", "Colors", "Material", "Grid"]);
        assert!(panel.controls().iter().all(|c| c.read(&scene()).is_some()));
    }
}
