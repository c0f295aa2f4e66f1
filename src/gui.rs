// src/gui.rs
//! egui overlay: the parameter panel and the loading indicator.
//!
//! The overlay is drawn after the scene into the same surface texture with
//! `LoadOp::Load`. Widgets edit the [`Scene`] only through the [`Panel`]
//! bindings.

use egui::{Color32, Context as EguiContext, Margin, Rounding, Visuals};
use egui_wgpu::{Renderer as EguiRenderer, ScreenDescriptor};
use egui_winit::State as EguiWinitState;
use tracing::{debug_span, instrument};
use wgpu::{CommandEncoder, Device, Queue, RenderPassDescriptor, TextureFormat, TextureView};
use winit::{event::WindowEvent, window::Window};

use crate::panel::{Control, Editor, Panel, Value};
use crate::scene::Scene;

pub struct GuiManager {
    ctx: EguiContext,
    winit_state: EguiWinitState,
    renderer: EguiRenderer,
    screen_desc: ScreenDescriptor,
    panel: Panel,
}

impl GuiManager {
    #[instrument(skip_all)]
    pub fn new(device: &Device, surface_format: TextureFormat, window: &Window, panel: Panel) -> Self {
        let ctx = EguiContext::default();
        setup_theme(&ctx);

        let winit_state = EguiWinitState::new(
            ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(device.limits().max_texture_dimension_2d as usize),
        );
        let renderer = EguiRenderer::new(device, surface_format, None, 1, false);

        let size = window.inner_size();
        let screen_desc = ScreenDescriptor {
            size_in_pixels: [size.width, size.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        Self { ctx, winit_state, renderer, screen_desc, panel }
    }

    /// Returns true if egui consumed the event.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let _guard = debug_span!("gui_handle_event").entered();
        self.winit_state.on_window_event(window, event).consumed
    }

    pub fn resize(&mut self, size: winit::dpi::PhysicalSize<u32>, scale: f32) {
        self.screen_desc = ScreenDescriptor {
            size_in_pixels: [size.width, size.height],
            pixels_per_point: scale,
        };
    }

    pub fn toggle_panel(&mut self) {
        self.panel.visible = !self.panel.visible;
    }

    /// Runs one egui frame. `loading` is the asset progress while loading.
    pub fn run(&mut self, window: &Window, scene: &mut Scene, loading: Option<f32>) -> egui::FullOutput {
        let raw_input = self.winit_state.take_egui_input(window);
        let panel = &self.panel;
        self.ctx.run(raw_input, |ctx| {
            if let Some(progress) = loading {
                loading_window(ctx, progress);
            }
            if panel.visible && !panel.controls().is_empty() {
                panel_window(ctx, panel, scene);
            }
        })
    }

    #[instrument(skip_all)]
    pub fn render(
        &mut self,
        device: &Device,
        queue: &Queue,
        encoder: &mut CommandEncoder,
        view: &TextureView,
        window: &Window,
        full_output: egui::FullOutput,
    ) {
        self.winit_state.handle_platform_output(window, full_output.platform_output);

        for (id, delta) in &full_output.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }

        let clipped = self.ctx.tessellate(full_output.shapes, full_output.pixels_per_point);
        let user_cmds = self.renderer.update_buffers(device, queue, encoder, &clipped, &self.screen_desc);
        if !user_cmds.is_empty() {
            queue.submit(user_cmds);
        }

        {
            let rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("egui_render"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.renderer.render(&mut rpass.forget_lifetime(), &clipped, &self.screen_desc);
        }

        for &id in &full_output.textures_delta.free {
            self.renderer.free_texture(&id);
        }
    }
}

fn loading_window(ctx: &EguiContext, progress: f32) {
    egui::Area::new(egui::Id::new("loading"))
        .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
        .show(ctx, |ui| {
            ui.add(egui::ProgressBar::new(progress).desired_width(240.0).show_percentage());
        });
}

fn panel_window(ctx: &EguiContext, panel: &Panel, scene: &mut Scene) {
    egui::Window::new("Controls")
        .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-8.0, 8.0))
        .resizable(false)
        .default_width(260.0)
        .show(ctx, |ui| {
            for folder in panel.folders() {
                egui::CollapsingHeader::new(folder).default_open(folder == "Effect").show(ui, |ui| {
                    for control in panel.controls().iter().filter(|c| c.folder == folder) {
                        control_ui(ui, control, scene);
                    }
                });
            }
        });
}

fn control_ui(ui: &mut egui::Ui, control: &Control, scene: &mut Scene) {
    let Some(current) = control.read(scene) else {
        // Bound value does not exist yet (bars still loading).
        ui.add_enabled_ui(false, |ui| ui.label(control.label));
        return;
    };
    let edited = match (control.editor, current) {
        (Editor::Slider { min, max, step }, Value::Scalar(mut v)) => {
            let slider = egui::Slider::new(&mut v, min..=max).step_by(step as f64).text(control.label);
            ui.add(slider).changed().then_some(Value::Scalar(v))
        }
        (Editor::Color, Value::Color(mut rgb)) => ui
            .horizontal(|ui| {
                let changed = egui::color_picker::color_edit_button_rgb(ui, &mut rgb).changed();
                ui.label(control.label);
                changed
            })
            .inner
            .then_some(Value::Color(rgb)),
        _ => None,
    };
    if let Some(value) = edited {
        control.write(scene, value);
    }
}

fn setup_theme(ctx: &EguiContext) {
    let mut style = (*ctx.style()).clone();

    let mut visuals = Visuals::dark();
    visuals.window_fill = Color32::from_rgba_unmultiplied(15, 16, 24, 230);
    visuals.extreme_bg_color = Color32::from_rgb(8, 9, 14);
    visuals.selection.bg_fill = Color32::from_rgb(0, 160, 180);
    visuals.widgets.noninteractive.rounding = Rounding::same(6.0);
    visuals.widgets.inactive.rounding = Rounding::same(6.0);
    visuals.widgets.hovered.rounding = Rounding::same(6.0);
    visuals.widgets.active.rounding = Rounding::same(6.0);

    style.visuals = visuals;
    style.spacing.window_margin = Margin::same(10.0);
    style.spacing.slider_width = 140.0;

    ctx.set_style(style);
}
