// src/lighting.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::config::{AmbientConfig, SpotConfig};

/// A positioned object whose world matrix is cached.
///
/// Writing `position` does not touch the cached matrix; call
/// [`Object3D::update_world`] to refresh it. Objects that are not part of
/// the drawn scene (the spot light target) are never refreshed implicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct Object3D {
    pub position: Vec3,
    world: Mat4,
}

impl Object3D {
    pub fn new(position: Vec3) -> Self {
        Self { position, world: Mat4::from_translation(position) }
    }

    pub fn update_world(&mut self) {
        self.world = Mat4::from_translation(self.position);
    }

    #[inline]
    pub fn world_position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        self.world.w_axis.truncate() != self.position
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmbientLight {
    /// Linear RGB.
    pub color: [f32; 3],
    pub intensity: f32,
}

impl AmbientLight {
    pub fn new(config: &AmbientConfig) -> Self {
        Self { color: config.color.to_linear(), intensity: config.intensity }
    }

    pub fn radiance(&self) -> Vec3 {
        Vec3::from(self.color) * self.intensity
    }
}

/// Cone light aimed at a separate target object.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    /// Linear RGB.
    pub color: [f32; 3],
    pub intensity: f32,
    /// Half-angle of the cone, radians.
    pub angle: f32,
    /// Fraction of the cone that fades out, [0, 1].
    pub penumbra: f32,
    pub decay: f32,
    /// Cutoff distance; 0 means unlimited.
    pub distance: f32,
    pub target: Object3D,
}

impl SpotLight {
    pub fn new(config: &SpotConfig) -> Self {
        Self {
            position: Vec3::from(config.position),
            color: config.color.to_linear(),
            intensity: config.intensity,
            angle: config.angle,
            penumbra: config.penumbra,
            decay: config.decay,
            distance: config.distance,
            target: Object3D::new(Vec3::from(config.target)),
        }
    }

    /// Unit vector from the target's world position towards the light.
    pub fn direction(&self) -> Vec3 {
        (self.position - self.target.world_position()).normalize_or_zero()
    }

    /// `(cos outer, cos inner)` of the cone.
    pub fn cone_cos(&self) -> (f32, f32) {
        (self.angle.cos(), (self.angle * (1.0 - self.penumbra)).cos())
    }

    /// Cone attenuation for a surface seen at `angle_cos` from the axis.
    pub fn spot_factor(&self, angle_cos: f32) -> f32 {
        let (outer, inner) = self.cone_cos();
        crate::effect::smoothstep(outer, inner, angle_cos)
    }
}

/// `Lights` in the material fragment shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LightsUniform {
    pub ambient: [f32; 4],
    pub spot_position: [f32; 4],
    pub spot_direction: [f32; 4],
    pub spot_color: [f32; 4],
    /// x: cone cos, y: penumbra cos, z: distance, w: decay
    pub spot_params: [f32; 4],
}

impl LightsUniform {
    pub fn new(ambient: &AmbientLight, spot: &SpotLight) -> Self {
        let (outer, inner) = spot.cone_cos();
        Self {
            ambient: ambient.radiance().extend(1.0).to_array(),
            spot_position: spot.position.extend(1.0).to_array(),
            spot_direction: spot.direction().extend(0.0).to_array(),
            spot_color: (Vec3::from(spot.color) * spot.intensity).extend(1.0).to_array(),
            spot_params: [outer, inner, spot.distance, spot.decay],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoConfig;

    fn spot() -> SpotLight {
        SpotLight::new(&DemoConfig::default().spot)
    }

    #[test]
    fn test_target_edit_needs_world_refresh() {
        let mut light = spot();
        let before = light.direction();
        light.target.position = Vec3::new(0.0, -1000.0, 0.0);
        assert!(light.target.is_stale());
        assert_eq!(light.direction(), before);

        light.target.update_world();
        assert!(!light.target.is_stale());
        let after = light.direction();
        assert!(after.y > 0.99, "light now points down at the target: {after:?}");
    }

    #[test]
    fn test_penumbra_one_spans_whole_cone() {
        let light = spot();
        let (outer, inner) = light.cone_cos();
        assert!((inner - 1.0).abs() < 1e-6);
        assert!((outer - (std::f32::consts::PI / 2.5).cos()).abs() < 1e-6);
        assert_eq!(light.spot_factor(outer - 0.01), 0.0);
        assert!((light.spot_factor(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_packs_intensity_into_color() {
        let config = DemoConfig::default();
        let u = LightsUniform::new(&AmbientLight::new(&config.ambient), &spot());
        assert_eq!(u.spot_color[0], 100.0);
        assert_eq!(u.spot_color[1], 0.0);
        assert_eq!(u.ambient[..3], [1.0, 1.0, 1.0]);
        assert_eq!(u.spot_params[3], 2.0);
        assert_eq!(std::mem::size_of::<LightsUniform>(), 80);
    }
}
