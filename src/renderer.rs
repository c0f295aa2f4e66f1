// src/renderer.rs
// Frame driver and the wgpu renderer.
//
// `RenderLoop` owns the per-frame order (load polling, time uniform,
// timeline, draw) and talks to the GPU through `FrameRenderer`, so the
// order can be exercised without a device. `GpuRenderer` is the real
// implementation: one surface, one depth buffer, one pipeline built from the
// material's patched program, and the egui overlay.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;
use winit::event::{ElementState, WindowEvent};
use winit::window::Window;

use crate::asset::{AssetLoader, LoadState, LoadedAssets};
use crate::camera::CameraUniform;
use crate::config::{DemoConfig, TimelineConfig};
use crate::effect::{self, BarUniforms};
use crate::gui::GuiManager;
use crate::instancing::InstancedMesh;
use crate::panel::Panel;
use crate::pbr_materials::{MaterialGpu, StandardMaterial};
use crate::scene::Scene;
use crate::shader_library::ShaderLibrary;
use crate::texture::{self, Texture};
use crate::time::{Clock, Time};
use crate::timeline::Timeline;
use crate::{Context, Error, OptionContext, Result};

/// What the frame driver needs from a renderer.
pub trait FrameRenderer {
    /// Uploads a complete asset bundle. Called once, before the bars exist.
    fn upload_assets(&mut self, scene: &Scene, assets: &LoadedAssets) -> Result<()>;

    /// Draws one frame: clear, the bars if loaded, then the overlay.
    /// `loading` is the asset progress while a load is pending.
    fn draw_scene(&mut self, scene: &mut Scene, loading: Option<f32>) -> Result<()>;
}

// ============================================================================
// Frame driver
// ============================================================================

pub struct RenderLoop {
    clock: Clock,
    loader: Option<AssetLoader>,
    timeline_config: Option<TimelineConfig>,
    timeline: Option<Timeline<Scene>>,
}

impl RenderLoop {
    pub fn new(config: &DemoConfig, loader: AssetLoader) -> Self {
        Self {
            clock: Clock::new(),
            loader: Some(loader),
            timeline_config: config.timeline,
            timeline: None,
        }
    }

    /// Runs one frame at the current wall-clock time.
    pub fn frame(&mut self, scene: &mut Scene, renderer: &mut dyn FrameRenderer) -> Result<Time> {
        let now = self.clock.elapsed();
        self.frame_at(now, scene, renderer)
    }

    /// Runs one frame at `now` seconds since the loop started.
    pub fn frame_at(&mut self, now: f64, scene: &mut Scene, renderer: &mut dyn FrameRenderer) -> Result<Time> {
        let time = self.clock.tick_at(now);
        self.poll_assets(scene, renderer)?;

        // The uniform set only exists once the bars are initialized.
        if let Some(uniforms) = scene.uniforms.as_mut() {
            uniforms.set_time(time.elapsed as f32);
        }
        if let Some(timeline) = self.timeline.as_mut() {
            timeline.advance(scene, time.delta);
        }
        scene.controls.update(&mut scene.camera);

        renderer.draw_scene(scene, self.loading_progress())?;
        Ok(time)
    }

    fn poll_assets(&mut self, scene: &mut Scene, renderer: &mut dyn FrameRenderer) -> Result<()> {
        let Some(loader) = self.loader.as_mut() else { return Ok(()) };
        match loader.poll() {
            Some(Ok(assets)) => {
                renderer.upload_assets(scene, &assets)?;
                scene.initialize_bars();
                if let Some(config) = &self.timeline_config {
                    self.timeline = Some(Scene::reveal_timeline(config));
                }
                log::info!("assets ready after {:.2}s", self.clock.elapsed());
            }
            Some(Err(e)) => {
                log::error!("bars will not be shown: {e}");
            }
            None => return Ok(()),
        }
        self.loader = None;
        Ok(())
    }

    /// Asset progress in [0, 1] while a load is pending.
    pub fn loading_progress(&self) -> Option<f32> {
        self.loader
            .as_ref()
            .filter(|l| l.state() == LoadState::Loading)
            .map(|l| l.progress())
    }

    pub fn timeline_finished(&self) -> bool {
        self.timeline.as_ref().is_some_and(|t| t.is_finished())
    }
}

// ============================================================================
// wgpu renderer
// ============================================================================

/// Antialiasing samples for the scene pass, lowered when the adapter cannot
/// multisample the surface or depth format.
const MSAA_SAMPLES: u32 = 4;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ObjectUniform {
    model: [[f32; 4]; 4],
}

/// GPU objects that exist only once the assets arrived.
struct BarsGpu {
    mesh: InstancedMesh,
    material: MaterialGpu,
    effect_group: wgpu::BindGroup,
    // Kept alive for the bind groups.
    _textures: Vec<Texture>,
}

pub struct GpuRenderer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,
    /// Multisampled color target, absent when `sample_count` is 1.
    msaa: Option<wgpu::TextureView>,
    depth: Texture,
    pipeline: wgpu::RenderPipeline,
    frame_group: wgpu::BindGroup,
    material_layout: wgpu::BindGroupLayout,
    effect_layout: wgpu::BindGroupLayout,
    camera_buffer: wgpu::Buffer,
    object_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    bars_buffer: wgpu::Buffer,
    bars: Option<BarsGpu>,
    gui: Option<GuiManager>,
}

impl GpuRenderer {
    /// Creates the device, surface and pipeline for `window`. Compiles the
    /// scene material's program.
    pub async fn new(window: Arc<Window>, scene: &mut Scene, panel: Option<Panel>) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| Error::Surface(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no compatible graphics adapter")?;
        log::info!("adapter: {:?}", adapter.get_info());

        let required_limits = if cfg!(target_arch = "wasm32") {
            wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
        } else {
            wgpu::Limits::default()
        };
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("bars_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits,
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| Error::Surface(format!("requesting device: {e}")))?;

        let size = window.inner_size();
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let sample_count = texture::supported_sample_count(
            MSAA_SAMPLES,
            &[
                adapter.get_texture_format_features(config.format).flags,
                adapter.get_texture_format_features(Texture::DEPTH_FORMAT).flags,
            ],
        );
        log::info!("scene pass uses {sample_count}x MSAA");
        let msaa = msaa_view(&device, &config, sample_count);
        let depth = Texture::create_depth_texture(&device, config.width, config.height, sample_count, "depth");

        let frame_layout = frame_bind_group_layout(&device);
        let material_layout = StandardMaterial::bind_group_layout(&device);
        let effect_layout = effect_bind_group_layout(&device);

        let uniform = |label, contents: &[u8]| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            })
        };
        let camera_buffer = uniform("camera", bytemuck::bytes_of(&CameraUniform::from_camera(&scene.camera)));
        let object_buffer = uniform(
            "object",
            bytemuck::bytes_of(&ObjectUniform { model: scene.object_matrix().to_cols_array_2d() }),
        );
        let lights_buffer = uniform("lights", bytemuck::bytes_of(&scene.lights_uniform()));
        let bars_values = scene.uniforms.as_ref().map_or_else(BarUniforms::zeroed, |u| *u.values());
        let bars_buffer = uniform("bar_uniforms", bytemuck::bytes_of(&bars_values));

        let frame_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout: &frame_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: camera_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: object_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: lights_buffer.as_entire_binding() },
            ],
        });

        let mut library = ShaderLibrary::standard();
        effect::register_chunks(&mut library);
        let program = crate::timed!("compile_material", scene.material.program(&library))?;
        let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bars_vertex"),
            source: wgpu::ShaderSource::Wgsl(program.vertex.as_str().into()),
        });
        let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("bars_fragment"),
            source: wgpu::ShaderSource::Wgsl(program.fragment.as_str().into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("bars_pipeline_layout"),
            bind_group_layouts: &[&frame_layout, &material_layout, &effect_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("bars_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: "vs_main",
                buffers: &InstancedMesh::vertex_layouts(),
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: Texture::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState { count: sample_count, ..Default::default() },
            multiview: None,
            cache: None,
        });

        let gui = panel.map(|panel| GuiManager::new(&device, config.format, &window, panel));

        Ok(Self {
            window,
            surface,
            device,
            queue,
            config,
            sample_count,
            msaa,
            depth,
            pipeline,
            frame_group,
            material_layout,
            effect_layout,
            camera_buffer,
            object_buffer,
            lights_buffer,
            bars_buffer,
            bars: None,
            gui,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Forwards a window event to the overlay. Returns true if the scene
    /// should not see it. Button releases always reach the orbit controls.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        let Some(gui) = self.gui.as_mut() else { return false };
        let consumed = gui.handle_event(&self.window, event);
        match event {
            WindowEvent::MouseInput { state: ElementState::Released, .. }
            | WindowEvent::Resized(_)
            | WindowEvent::RedrawRequested
            | WindowEvent::CloseRequested => false,
            _ => consumed,
        }
    }

    pub fn toggle_panel(&mut self) {
        if let Some(gui) = self.gui.as_mut() {
            gui.toggle_panel();
        }
    }

    /// Reconfigures the surface and depth buffer. Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.msaa = msaa_view(&self.device, &self.config, self.sample_count);
        self.depth = Texture::create_depth_texture(&self.device, width, height, self.sample_count, "depth");
        if let Some(gui) = self.gui.as_mut() {
            gui.resize(winit::dpi::PhysicalSize::new(width, height), self.window.scale_factor() as f32);
        }
    }

    fn sync_uniforms(&mut self, scene: &mut Scene) {
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&CameraUniform::from_camera(&scene.camera)));
        self.queue.write_buffer(
            &self.object_buffer,
            0,
            bytemuck::bytes_of(&ObjectUniform { model: scene.object_matrix().to_cols_array_2d() }),
        );
        if std::mem::take(&mut scene.dirty.lights) {
            self.queue.write_buffer(&self.lights_buffer, 0, bytemuck::bytes_of(&scene.lights_uniform()));
        }
        if let Some(uniforms) = scene.uniforms.as_mut() {
            if uniforms.take_dirty() {
                self.queue.write_buffer(&self.bars_buffer, 0, bytemuck::bytes_of(uniforms.values()));
            }
        }
        let Some(bars) = self.bars.as_mut() else { return };
        if std::mem::take(&mut scene.dirty.material) {
            scene.material.write_uniform(&self.queue, &bars.material);
        }
        if std::mem::take(&mut scene.dirty.grid) {
            bars.mesh.set_layout(&self.device, scene.grid);
            log::info!("grid now {} instances", bars.mesh.instance_count());
        }
    }

    fn acquire(&mut self) -> Result<Option<wgpu::SurfaceTexture>> {
        match self.surface.get_current_texture() {
            Ok(frame) => Ok(Some(frame)),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                Ok(None)
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface acquire timed out");
                Ok(None)
            }
            Err(e) => Err(Error::Surface(e.to_string())),
        }
    }
}

impl FrameRenderer for GpuRenderer {
    fn upload_assets(&mut self, scene: &Scene, assets: &LoadedAssets) -> Result<()> {
        let _span = tracing::info_span!("upload_assets").entered();
        let (device, queue) = (&self.device, &self.queue);
        let image = |img, label: &str| Texture::from_image(device, queue, img, label);

        let white = Texture::white(device, queue)?;
        let ao_map = image(&assets.ao_map, "ao_map").with_context(|| "uploading ao map")?;
        let mask = assets.mask.as_ref().map(|img| image(img, "mask")).transpose()?;
        let reveal = assets.reveal.as_ref().map(|img| image(img, "reveal")).transpose()?;

        let material = scene.material.create_gpu(device, &self.material_layout, Some(&ao_map), Some(&ao_map), &white);
        let mask_view = mask.as_ref().unwrap_or(&white);
        let reveal_view = reveal.as_ref().unwrap_or(&white);
        let effect_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bar_effect_bind_group"),
            layout: &self.effect_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: self.bars_buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&mask_view.view) },
                wgpu::BindGroupEntry { binding: 2, resource: wgpu::BindingResource::TextureView(&reveal_view.view) },
                wgpu::BindGroupEntry { binding: 3, resource: wgpu::BindingResource::Sampler(&mask_view.sampler) },
            ],
        });

        let mesh = InstancedMesh::new(device, &assets.mesh, scene.grid);
        let textures = [Some(white), Some(ao_map), mask, reveal].into_iter().flatten().collect();
        self.bars = Some(BarsGpu { mesh, material, effect_group, _textures: textures });
        Ok(())
    }

    fn draw_scene(&mut self, scene: &mut Scene, loading: Option<f32>) -> Result<()> {
        self.sync_uniforms(scene);
        let Some(frame) = self.acquire()? else { return Ok(()) };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });

        {
            let [r, g, b] = scene.clear_color;
            // With MSAA the samples resolve into the swapchain view and are
            // then dropped.
            let (target, resolve_target, store) = match self.msaa.as_ref() {
                Some(msaa) => (msaa, Some(&view), wgpu::StoreOp::Discard),
                None => (&view, None, wgpu::StoreOp::Store),
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r: r as f64, g: g as f64, b: b as f64, a: 1.0 }),
                        store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations { load: wgpu::LoadOp::Clear(1.0), store: wgpu::StoreOp::Store }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let Some(bars) = self.bars.as_ref().filter(|_| scene.bars_ready()) {
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &self.frame_group, &[]);
                pass.set_bind_group(1, &bars.material.bind_group, &[]);
                pass.set_bind_group(2, &bars.effect_group, &[]);
                bars.mesh.draw(&mut pass);
            }
        }

        if let Some(gui) = self.gui.as_mut() {
            let output = gui.run(&self.window, scene, loading);
            gui.render(&self.device, &self.queue, &mut encoder, &view, &self.window, output);
        }

        self.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        Ok(())
    }
}

fn msaa_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration, sample_count: u32) -> Option<wgpu::TextureView> {
    (sample_count > 1).then(|| texture::create_msaa_view(device, config.format, config.width, config.height, sample_count))
}

/// Group 0: camera, object and lights.
fn frame_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let buffer = |binding, visibility| wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("frame_bind_group_layout"),
        entries: &[
            buffer(0, wgpu::ShaderStages::VERTEX_FRAGMENT),
            buffer(1, wgpu::ShaderStages::VERTEX),
            buffer(2, wgpu::ShaderStages::FRAGMENT),
        ],
    })
}

/// Group 2: bar uniforms plus the mask and reveal textures, read in the
/// vertex stage.
fn effect_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("bar_effect_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            texture(1),
            texture(2),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetManifest, AssetSource, MemorySource};
    use crate::config::Variant;
    use crate::effect::UniformField;
    use crate::gltf_loader::fixtures;
    use crossbeam::channel::{self, Receiver, Sender};
    use image::RgbaImage;
    use std::io::Cursor;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct FrameRecord {
        bars_drawn: bool,
        instance_count: u32,
        time: Option<f32>,
        loading: Option<f32>,
    }

    /// Records what would have been drawn.
    #[derive(Default)]
    struct RecordingRenderer {
        uploads: usize,
        uploaded_instances: Option<u32>,
        frames: Vec<FrameRecord>,
    }

    impl FrameRenderer for RecordingRenderer {
        fn upload_assets(&mut self, scene: &Scene, assets: &LoadedAssets) -> Result<()> {
            assert!(!scene.bars_ready(), "upload happens before the bars exist");
            assert!(assets.mesh.triangle_count() > 0);
            self.uploads += 1;
            self.uploaded_instances = Some(scene.grid.generate().len() as u32);
            Ok(())
        }

        fn draw_scene(&mut self, scene: &mut Scene, loading: Option<f32>) -> Result<()> {
            let bars_drawn = scene.bars_ready() && self.uploaded_instances.is_some();
            self.frames.push(FrameRecord {
                bars_drawn,
                instance_count: if bars_drawn { self.uploaded_instances.unwrap_or(0) } else { 0 },
                time: scene.uniforms.as_ref().map(|u| u.get(UniformField::Time)),
                loading,
            });
            Ok(())
        }
    }

    fn png(value: u8) -> Vec<u8> {
        let img = RgbaImage::from_pixel(2, 2, image::Rgba([value, value, value, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn source() -> MemorySource {
        MemorySource::new()
            .with("models/bar.glb", fixtures::triangle_glb())
            .with("models/ao-map.png", png(200))
            .with("textures/mask.png", png(255))
            .with("textures/reveal.png", png(0))
    }

    /// Holds every read until the gate's sender is dropped.
    struct GatedSource {
        inner: MemorySource,
        gate: Receiver<()>,
    }

    impl AssetSource for GatedSource {
        fn read(&self, path: &str) -> Result<Vec<u8>> {
            let _ = self.gate.recv();
            self.inner.read(path)
        }

        fn exists(&self, path: &str) -> bool {
            self.inner.exists(path)
        }
    }

    fn setup(variant: Variant) -> (DemoConfig, Scene, AssetManifest) {
        let config = DemoConfig::for_variant(variant);
        let scene = Scene::new(&config, 1280, 720);
        let manifest = AssetManifest::new(&config.assets, config.grid.geometry_scale);
        (config, scene, manifest)
    }

    #[test]
    fn test_no_bar_draw_before_load_completes() {
        let (config, mut scene, manifest) = setup(Variant::Reveal);
        let (gate, rx): (Sender<()>, _) = channel::unbounded();
        let loader = AssetLoader::spawn(GatedSource { inner: source(), gate: rx }, manifest).unwrap();
        let mut render_loop = RenderLoop::new(&config, loader);
        let mut renderer = RecordingRenderer::default();

        for i in 0..5 {
            render_loop.frame_at(i as f64 * 0.016, &mut scene, &mut renderer).unwrap();
        }
        assert!(renderer.frames.iter().all(|f| !f.bars_drawn && f.time.is_none()));
        assert!(renderer.frames.iter().all(|f| f.loading == Some(0.0)));

        drop(gate);
        let mut now = 0.1;
        while !scene.bars_ready() {
            std::thread::sleep(std::time::Duration::from_millis(5));
            render_loop.frame_at(now, &mut scene, &mut renderer).unwrap();
            now += 0.016;
            assert!(now < 100.0, "loader never finished");
        }

        let last = *renderer.frames.last().unwrap();
        assert!(last.bars_drawn);
        assert_eq!(last.instance_count, config.instance_count());
        assert_eq!(last.instance_count, 2500);
        assert_eq!(last.loading, None);
        assert_eq!(renderer.uploads, 1);
    }

    #[test]
    fn test_time_written_only_after_load() {
        let (config, mut scene, manifest) = setup(Variant::Reveal);
        let mut render_loop = RenderLoop::new(&config, AssetLoader::blocking(source(), manifest));
        let mut renderer = RecordingRenderer::default();

        render_loop.frame_at(0.25, &mut scene, &mut renderer).unwrap();
        render_loop.frame_at(0.5, &mut scene, &mut renderer).unwrap();
        assert_eq!(renderer.frames[0].time, Some(0.25));
        assert_eq!(renderer.frames[1].time, Some(0.5));
        assert!(renderer.frames.iter().all(|f| f.bars_drawn));
    }

    #[test]
    fn test_timeline_starts_on_load_and_finishes() {
        let (config, mut scene, manifest) = setup(Variant::Reveal);
        let mut render_loop = RenderLoop::new(&config, AssetLoader::blocking(source(), manifest));
        let mut renderer = RecordingRenderer::default();

        let mut now = 0.0;
        while now < 10.0 {
            render_loop.frame_at(now, &mut scene, &mut renderer).unwrap();
            now += 0.1;
        }
        assert!(render_loop.timeline_finished());
        let u = scene.uniforms.as_ref().unwrap();
        assert_eq!(u.get(UniformField::StartProg), 1.0);
        assert_eq!(u.get(UniformField::Progress), 1.0);
    }

    #[test]
    fn test_uv_variant_draws_without_uniforms_or_timeline() {
        let (config, mut scene, manifest) = setup(Variant::Uv);
        let mut render_loop = RenderLoop::new(&config, AssetLoader::blocking(source(), manifest));
        let mut renderer = RecordingRenderer::default();

        render_loop.frame_at(1.0, &mut scene, &mut renderer).unwrap();
        let frame = renderer.frames[0];
        assert!(frame.bars_drawn);
        assert_eq!(frame.time, None);
        assert!(!render_loop.timeline_finished());
    }

    #[test]
    fn test_failed_load_keeps_clearing() {
        let (config, mut scene, manifest) = setup(Variant::Reveal);
        let broken = MemorySource::new().with("models/bar.glb", fixtures::triangle_glb());
        let mut render_loop = RenderLoop::new(&config, AssetLoader::blocking(broken, manifest));
        let mut renderer = RecordingRenderer::default();

        for i in 0..3 {
            render_loop.frame_at(i as f64, &mut scene, &mut renderer).unwrap();
        }
        assert_eq!(renderer.uploads, 0);
        assert!(!scene.bars_ready());
        assert!(renderer.frames.iter().all(|f| !f.bars_drawn && f.loading.is_none()));
    }
}
