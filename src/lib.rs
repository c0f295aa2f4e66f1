// src/lib.rs
//! Instanced bars demo: a grid of GPU-instanced bars rendered with a patched
//! PBR material, in a UV-colored and a mask/noise "reveal" variant.

pub mod asset;
pub mod camera;
pub mod camera_controller;
pub mod config;
pub mod context;
pub mod effect;
pub mod error;
pub mod gltf_loader;
pub mod gui;
pub mod instancing;
pub mod lighting;
pub mod panel;
pub mod pbr_materials;
pub mod renderer;
pub mod scene;
pub mod shader_library;
pub mod shader_patch;
pub mod texture;
pub mod time;
pub mod timeline;

pub use context::{Context, OptionContext};
pub use error::{Error, Result};

use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use crate::asset::{AssetLoader, AssetManifest};
use crate::config::{DemoConfig, Variant};
use crate::panel::Panel;
use crate::renderer::{GpuRenderer, RenderLoop};
use crate::scene::Scene;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run() {
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
    let _ = console_log::init_with_level(log::Level::Info);

    let config = DemoConfig::default();
    let manifest = AssetManifest::new(&config.assets, config.grid.geometry_scale);
    let base_url = config.assets.root.to_string_lossy().into_owned();
    let loader = AssetLoader::spawn_fetch(base_url, manifest);

    match EventLoop::new() {
        Ok(event_loop) => {
            use winit::platform::web::EventLoopExtWebSys;
            event_loop.spawn_app(BarsApp::new(config, loader));
        }
        Err(e) => log::error!("creating event loop: {e}"),
    }
}

/// Runs the demo until the window closes.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_native(config: DemoConfig) -> Result<()> {
    config.validate()?;
    let manifest = AssetManifest::new(&config.assets, config.grid.geometry_scale);
    let loader = AssetLoader::spawn(asset::FsSource::new(&config.assets.root), manifest)?;

    let event_loop = EventLoop::new().map_err(|e| Error::Surface(e.to_string()))?;
    let mut app = BarsApp::new(config, loader);
    event_loop.run_app(&mut app).map_err(|e| Error::Surface(e.to_string()))?;
    Ok(())
}

// ----------------------------------------------------------------------------
// winit 0.30 application
// ----------------------------------------------------------------------------

/// Renderer and scene, created together once the window exists.
struct Running {
    renderer: GpuRenderer,
    scene: Scene,
}

#[cfg(target_arch = "wasm32")]
type Pending = std::rc::Rc<std::cell::RefCell<Option<Running>>>;

struct BarsApp {
    config: DemoConfig,
    render_loop: RenderLoop,
    window: Option<Arc<Window>>,
    running: Option<Running>,
    #[cfg(target_arch = "wasm32")]
    pending: Pending,
}

impl BarsApp {
    fn new(config: DemoConfig, loader: AssetLoader) -> Self {
        Self {
            render_loop: RenderLoop::new(&config, loader),
            config,
            window: None,
            running: None,
            #[cfg(target_arch = "wasm32")]
            pending: Default::default(),
        }
    }

    fn panel(&self) -> Option<Panel> {
        (self.config.panel && self.config.variant == Variant::Reveal).then(Panel::reveal)
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn start(&mut self, window: Arc<Window>, mut scene: Scene, event_loop: &ActiveEventLoop) {
        match pollster::block_on(GpuRenderer::new(window.clone(), &mut scene, self.panel())) {
            Ok(renderer) => {
                self.running = Some(Running { renderer, scene });
                window.request_redraw();
            }
            Err(e) => {
                log::error!("renderer setup failed: {e}");
                event_loop.exit();
            }
        }
    }

    #[cfg(target_arch = "wasm32")]
    fn start(&mut self, window: Arc<Window>, mut scene: Scene, _event_loop: &ActiveEventLoop) {
        let pending = self.pending.clone();
        let panel = self.panel();
        wasm_bindgen_futures::spawn_local(async move {
            match GpuRenderer::new(window.clone(), &mut scene, panel).await {
                Ok(renderer) => {
                    *pending.borrow_mut() = Some(Running { renderer, scene });
                    window.request_redraw();
                }
                Err(e) => log::error!("renderer setup failed: {e}"),
            }
        });
    }

    /// Picks up the renderer once async setup finished.
    #[cfg(target_arch = "wasm32")]
    fn adopt_pending(&mut self) {
        if self.running.is_none() {
            self.running = self.pending.borrow_mut().take();
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn adopt_pending(&mut self) {}
}

impl ApplicationHandler for BarsApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if self.window.is_some() {
            return;
        }

        let window_config = &self.config.window;
        let attrs = Window::default_attributes()
            .with_title(window_config.title.as_str())
            .with_inner_size(winit::dpi::LogicalSize::new(window_config.width, window_config.height));
        #[cfg(target_arch = "wasm32")]
        let attrs = {
            use winit::platform::web::WindowAttributesExtWebSys;
            attrs.with_append(true)
        };

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("creating window: {e}");
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        let size = window.inner_size();
        let scene = Scene::new(&self.config, size.width.max(1), size.height.max(1));
        log::info!("{:?} variant, {} instances", self.config.variant, self.config.instance_count());
        self.start(window, scene, event_loop);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        self.adopt_pending();
        let Some(Running { renderer, scene }) = self.running.as_mut() else { return };
        if renderer.window().id() != window_id {
            return;
        }
        if renderer.handle_event(&event) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                renderer.resize(size.width, size.height);
                scene.resize(size.width, size.height);
                renderer.window().request_redraw();
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render_loop.frame(scene, renderer) {
                    log::error!("frame failed: {e}");
                }
                renderer.window().request_redraw();
            }
            WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                scene.controls.pointer_button(state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                scene.controls.pointer_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32 / 50.0,
                };
                scene.controls.wheel(lines);
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent { physical_key: PhysicalKey::Code(KeyCode::KeyH), state: ElementState::Pressed, .. },
                ..
            } => renderer.toggle_panel(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.adopt_pending();
    }
}
