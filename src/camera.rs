// src/camera.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::config::CameraConfig;

/// Orthographic camera with a fixed world-space vertical extent.
///
/// The frustum is `frustum_height` tall and `frustum_height * aspect` wide,
/// both divided by `zoom` when the projection is built.
#[derive(Debug, Clone, PartialEq)]
pub struct OrthographicCamera {
    pub position: Vec3,
    /// Point the camera looks at.
    pub target: Vec3,
    pub up: Vec3,

    pub zoom: f32,
    pub frustum_height: f32,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,

    pub left: f32,
    pub right: f32,
    pub top: f32,
    pub bottom: f32,
}

impl OrthographicCamera {
    pub fn new(config: &CameraConfig, aspect: f32) -> Self {
        let mut camera = Self {
            position: Vec3::from(config.position),
            target: Vec3::from(config.target),
            up: Vec3::Y,
            zoom: config.zoom,
            frustum_height: config.frustum_height,
            aspect,
            znear: config.near,
            zfar: config.far,
            left: -1.0,
            right: 1.0,
            top: 1.0,
            bottom: -1.0,
        };
        camera.update_frustum();
        camera
    }

    /// Recomputes the frustum planes for a `width`×`height` viewport.
    /// Zero-sized viewports (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
        self.update_frustum();
    }

    fn update_frustum(&mut self) {
        let half_height = self.frustum_height / 2.0;
        let half_width = self.frustum_height * self.aspect / 2.0;
        self.left = -half_width;
        self.right = half_width;
        self.top = half_height;
        self.bottom = -half_height;
    }

    /// Points the camera at `target`.
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Orthographic projection into wgpu clip space (depth 0..1).
    pub fn proj_matrix(&self) -> Mat4 {
        let zoom = self.zoom.max(f32::EPSILON);
        Mat4::orthographic_rh(
            self.left / zoom,
            self.right / zoom,
            self.bottom / zoom,
            self.top / zoom,
            self.znear,
            self.zfar,
        )
    }

    pub fn view_proj_matrix(&self) -> Mat4 {
        self.proj_matrix() * self.view_matrix()
    }

    /// Visible world extent `(width, height)` after zoom.
    pub fn visible_extent(&self) -> (f32, f32) {
        ((self.right - self.left) / self.zoom, (self.top - self.bottom) / self.zoom)
    }
}

/// GPU camera uniform (matches `Camera` in the material shaders).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    /// Column-major 4x4 matrix
    pub view_proj: [[f32; 4]; 4],
    pub position: [f32; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            position: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl CameraUniform {
    pub fn from_camera(camera: &OrthographicCamera) -> Self {
        Self {
            view_proj: camera.view_proj_matrix().to_cols_array_2d(),
            position: camera.position.extend(1.0).to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemoConfig, Variant};

    fn camera() -> OrthographicCamera {
        OrthographicCamera::new(&DemoConfig::for_variant(Variant::Uv).camera, 1.0)
    }

    #[test]
    fn test_resize_keeps_vertical_extent() {
        let mut cam = camera();
        for (w, h) in [(800u32, 600u32), (1920, 1080), (300, 900)] {
            cam.resize(w, h);
            let (width, height) = cam.visible_extent();
            assert!((height - 10.0 / 7.0).abs() < 1e-5);
            assert!((width / height - w as f32 / h as f32).abs() < 1e-5);
            assert_eq!(cam.top, 5.0);
            assert_eq!(cam.left, -cam.right);
        }
    }

    #[test]
    fn test_zero_size_is_ignored() {
        let mut cam = camera();
        cam.resize(640, 480);
        let before = cam.clone();
        cam.resize(0, 480);
        cam.resize(640, 0);
        assert_eq!(cam, before);
    }

    #[test]
    fn test_target_projects_to_center() {
        let mut cam = camera();
        cam.resize(1280, 720);
        let clip = cam.view_proj_matrix().project_point3(Vec3::ZERO);
        assert!(clip.x.abs() < 1e-5 && clip.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&clip.z));
    }

    #[test]
    fn test_zoom_scales_projection() {
        let mut cam = camera();
        cam.resize(100, 100);
        let a = cam.proj_matrix().x_axis.x;
        cam.zoom *= 2.0;
        let b = cam.proj_matrix().x_axis.x;
        assert!((b - 2.0 * a).abs() < 1e-6);
    }
}
