// src/camera_controller.rs
// Orbit controls for the orthographic demo camera.
//
// Example usage:
// let mut controls = OrbitControls::new(&camera);
// controls.pointer_button(true);
// controls.pointer_moved(x, y);
// controls.update(&mut camera);

use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

use crate::camera::OrthographicCamera;

/// Drag to orbit around `target`, wheel to zoom.
///
/// Rotation is expressed as yaw/pitch deltas accumulated from pointer events
/// and applied once per `update`, so event order does not matter within a
/// frame. The camera keeps its distance to the target; zoom changes the
/// orthographic `zoom` instead.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub target: Vec3,
    pub enabled: bool,

    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    /// Polar angle limits (radians from +Y).
    pub min_polar: f32,
    pub max_polar: f32,

    viewport_height: f32,
    dragging: bool,
    last_pointer: Option<Vec2>,
    yaw_delta: f32,
    pitch_delta: f32,
    zoom_scale: f32,
}

impl OrbitControls {
    pub fn new(camera: &OrthographicCamera) -> Self {
        Self {
            target: camera.target,
            enabled: true,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            min_zoom: 0.01,
            max_zoom: 1000.0,
            min_polar: 0.0,
            max_polar: PI,
            viewport_height: 1.0,
            dragging: false,
            last_pointer: None,
            yaw_delta: 0.0,
            pitch_delta: 0.0,
            zoom_scale: 1.0,
        }
    }

    /// Rotation speed is relative to the viewport height.
    pub fn set_viewport(&mut self, _width: u32, height: u32) {
        if height > 0 {
            self.viewport_height = height as f32;
        }
    }

    /// Primary button pressed/released.
    pub fn pointer_button(&mut self, pressed: bool) {
        self.dragging = pressed && self.enabled;
        if !pressed {
            self.last_pointer = None;
        }
    }

    pub fn pointer_moved(&mut self, x: f32, y: f32) {
        let pos = Vec2::new(x, y);
        if self.dragging {
            if let Some(last) = self.last_pointer {
                let delta = pos - last;
                self.yaw_delta -= TAU * delta.x / self.viewport_height * self.rotate_speed;
                self.pitch_delta -= TAU * delta.y / self.viewport_height * self.rotate_speed;
            }
        }
        self.last_pointer = Some(pos);
    }

    /// Positive `lines` zooms in.
    pub fn wheel(&mut self, lines: f32) {
        if !self.enabled || lines == 0.0 {
            return;
        }
        self.zoom_scale *= 0.95f32.powf(self.zoom_speed).powf(-lines);
    }

    /// Applies pending input to `camera` and aims it at `target`.
    /// Returns whether anything changed.
    pub fn update(&mut self, camera: &mut OrthographicCamera) -> bool {
        let rotate = self.yaw_delta != 0.0 || self.pitch_delta != 0.0;
        let zoom = self.zoom_scale != 1.0;
        let retarget = camera.target != self.target;

        if rotate {
            let offset = camera.position - self.target;
            let radius = offset.length();
            if radius > f32::EPSILON {
                let mut theta = offset.x.atan2(offset.z);
                let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();
                theta += self.yaw_delta;
                phi = (phi + self.pitch_delta).clamp(self.min_polar.max(1e-6), self.max_polar.min(PI - 1e-6));
                let offset = Vec3::new(radius * phi.sin() * theta.sin(), radius * phi.cos(), radius * phi.sin() * theta.cos());
                camera.position = self.target + offset;
            }
        }
        if zoom {
            camera.zoom = (camera.zoom * self.zoom_scale).clamp(self.min_zoom, self.max_zoom);
        }
        camera.look_at(self.target);

        self.yaw_delta = 0.0;
        self.pitch_delta = 0.0;
        self.zoom_scale = 1.0;
        rotate || zoom || retarget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemoConfig;

    fn setup() -> (OrthographicCamera, OrbitControls) {
        let mut camera = OrthographicCamera::new(&DemoConfig::default().camera, 1.0);
        camera.resize(800, 600);
        let mut controls = OrbitControls::new(&camera);
        controls.set_viewport(800, 600);
        (camera, controls)
    }

    #[test]
    fn test_drag_orbits_at_constant_distance() {
        let (mut camera, mut controls) = setup();
        let radius = (camera.position - controls.target).length();
        controls.pointer_button(true);
        controls.pointer_moved(100.0, 100.0);
        controls.pointer_moved(160.0, 130.0);
        assert!(controls.update(&mut camera));
        assert!(((camera.position - controls.target).length() - radius).abs() < 1e-3);
        assert_eq!(camera.target, controls.target);
    }

    #[test]
    fn test_move_without_drag_does_nothing() {
        let (mut camera, mut controls) = setup();
        let before = camera.position;
        controls.pointer_moved(10.0, 10.0);
        controls.pointer_moved(200.0, 50.0);
        assert!(!controls.update(&mut camera));
        assert_eq!(camera.position, before);
    }

    #[test]
    fn test_wheel_zooms() {
        let (mut camera, mut controls) = setup();
        let zoom = camera.zoom;
        controls.wheel(1.0);
        controls.update(&mut camera);
        assert!(camera.zoom > zoom);
        controls.wheel(-2.0);
        controls.update(&mut camera);
        assert!(camera.zoom < zoom);
    }

    #[test]
    fn test_disabled_ignores_input() {
        let (mut camera, mut controls) = setup();
        controls.enabled = false;
        controls.pointer_button(true);
        controls.pointer_moved(0.0, 0.0);
        controls.pointer_moved(50.0, 0.0);
        controls.wheel(3.0);
        assert!(!controls.update(&mut camera));
    }

    #[test]
    fn test_retarget_is_applied() {
        let (mut camera, mut controls) = setup();
        controls.target = Vec3::new(0.0, 1.5, 0.0);
        assert!(controls.update(&mut camera));
        assert_eq!(camera.target, Vec3::new(0.0, 1.5, 0.0));
    }
}
