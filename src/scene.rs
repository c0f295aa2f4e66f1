// src/scene.rs
// Application state of the bars demo.
//
// One `Scene` owns everything the render loop, the timeline and the panel
// mutate: camera, controls, lights, material description and the uniform
// set. GPU objects live in the renderer; the scene only says what to draw.

use glam::{Mat4, Vec3};

use crate::camera::OrthographicCamera;
use crate::camera_controller::OrbitControls;
use crate::config::{DemoConfig, EffectConfig, TimelineConfig, Variant};
use crate::effect::UniformSet;
use crate::instancing::GridLayout;
use crate::lighting::{AmbientLight, LightsUniform, SpotLight};
use crate::pbr_materials::StandardMaterial;
use crate::timeline::{Timeline, Tween};

/// Flags telling the renderer which GPU copies are out of date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dirty {
    pub lights: bool,
    pub material: bool,
    pub grid: bool,
}

pub struct Scene {
    pub variant: Variant,
    pub camera: OrthographicCamera,
    pub controls: OrbitControls,
    pub ambient: AmbientLight,
    pub spot: SpotLight,
    pub material: StandardMaterial,
    pub grid: GridLayout,
    /// Uniform scale of the instanced object.
    pub mesh_scale: f32,
    /// Linear RGB.
    pub clear_color: [f32; 3],
    /// Exists once the bars are initialized, reveal variant only.
    pub uniforms: Option<UniformSet>,
    pub dirty: Dirty,
    effect: EffectConfig,
    bars_ready: bool,
}

impl Scene {
    pub fn new(config: &DemoConfig, width: u32, height: u32) -> Self {
        let aspect = if height == 0 { 1.0 } else { width as f32 / height as f32 };
        let camera = OrthographicCamera::new(&config.camera, aspect);
        let mut controls = OrbitControls::new(&camera);
        controls.set_viewport(width, height);
        let material = StandardMaterial::new(&config.material).with_patches(crate::effect::patches_for(config.variant));

        Self {
            variant: config.variant,
            camera,
            controls,
            ambient: AmbientLight::new(&config.ambient),
            spot: SpotLight::new(&config.spot),
            material,
            grid: GridLayout::new(config.grid.side, config.grid.spacing),
            mesh_scale: config.grid.mesh_scale,
            clear_color: config.clear_color.to_linear(),
            uniforms: None,
            dirty: Dirty { lights: true, material: true, grid: false },
            effect: config.effect,
            bars_ready: false,
        }
    }

    /// Called once when the assets arrived. Creates the uniform set for the
    /// reveal variant. A second call is a no-op.
    pub fn initialize_bars(&mut self) {
        if self.bars_ready {
            return;
        }
        if self.variant == Variant::Reveal {
            self.uniforms = Some(UniformSet::new(&self.effect));
        }
        self.bars_ready = true;
        log::info!("bars initialized: {} instances", self.grid.instance_count());
    }

    #[inline]
    pub fn bars_ready(&self) -> bool {
        self.bars_ready
    }

    /// Model matrix of the instanced object.
    pub fn object_matrix(&self) -> Mat4 {
        Mat4::from_scale(Vec3::splat(self.mesh_scale))
    }

    pub fn lights_uniform(&self) -> LightsUniform {
        LightsUniform::new(&self.ambient, &self.spot)
    }

    pub fn set_grid(&mut self, grid: GridLayout) {
        if grid != self.grid && grid.side > 0 {
            self.grid = grid;
            self.dirty.grid = true;
        }
    }

    /// Viewport resize: camera frustum and control speed.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.camera.resize(width, height);
        self.controls.set_viewport(width, height);
    }

    /// Builds the reveal timeline: ease `start_prog` 0→1 while moving the
    /// orbit target from `camera_from` to `camera_to`, then ease `progress`.
    pub fn reveal_timeline(config: &TimelineConfig) -> Timeline<Scene> {
        let from = Vec3::from(config.camera_from);
        let to = Vec3::from(config.camera_to);

        let start = Tween::new("start_prog", 0.0, 1.0, config.start.duration, |scene: &mut Scene, v| {
            if let Some(u) = scene.uniforms.as_mut() {
                u.set_start_prog(v);
            }
        })
        .delay(config.start.delay)
        .ease(config.start.ease)
        .on_update(move |scene: &mut Scene, v| {
            scene.controls.target = from.lerp(to, v);
            let target = scene.controls.target;
            scene.camera.look_at(target);
        });

        let progress = Tween::new("progress", 0.0, 1.0, config.progress.duration, |scene: &mut Scene, v| {
            if let Some(u) = scene.uniforms.as_mut() {
                u.set_progress(v);
            }
        })
        .delay(config.progress.delay)
        .ease(config.progress.ease);

        Timeline::new().then(start).then(progress)
    }
}
