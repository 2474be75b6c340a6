// ============================================================================
// WARP APP — eframe application shell
// ============================================================================
//
// The shell stays thin: it owns the renderer, the canvas state and the
// settings, translates egui input into interaction-machine calls, and keeps
// the preview texture fresh.  All displacement/history/export semantics live
// in `gpu::renderer` and `canvas` — nothing in here touches a wgpu object
// directly.

use std::time::{Duration, Instant};

use eframe::egui;
use egui::{Color32, Pos2, Rect, Stroke, Vec2};

use crate::canvas::{InputAction, InteractionState, PointerKind, WarpCanvas};
use crate::gpu::compositor::ToneParams;
use crate::gpu::WarpRenderer;
use crate::io::{self, FileHandler, SaveFormat};
use crate::settings::{
    Settings, BRUSH_SIZE_MAX, BRUSH_SIZE_MIN, BRUSH_STRENGTH_MAX, BRUSH_STRENGTH_MIN,
};
use crate::{log_err, log_info};

/// How long a status line stays visible.
const STATUS_TTL: Duration = Duration::from_secs(4);

pub struct WarpApp {
    renderer: Option<WarpRenderer>,
    canvas: WarpCanvas,
    settings: Settings,
    files: FileHandler,

    preview_tex: Option<egui::TextureHandle>,
    preview_dirty: bool,
    /// Fit the view to the window on the next frame (set after image load,
    /// when the viewport size is known).
    fit_requested: bool,
    /// Compare state last frame, to catch toggles from any code path.
    compare_was: bool,

    status: Option<(String, Instant)>,
}

impl WarpApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = Settings::load();
        let renderer = WarpRenderer::new(
            &settings.preferred_gpu,
            settings.history_capacity,
            settings.snapshot_budget_px(),
        );
        if renderer.is_none() {
            log_err!("no usable GPU adapter — warping disabled");
        }
        let canvas = WarpCanvas::new(
            settings.max_zoom(),
            settings.brush_size,
            settings.brush_strength,
        );
        Self {
            renderer,
            canvas,
            settings,
            files: FileHandler::new(),
            preview_tex: None,
            preview_dirty: false,
            fit_requested: false,
            compare_was: false,
            status: None,
        }
    }

    fn tone(&self) -> ToneParams {
        ToneParams {
            exposure: self.settings.exposure,
            black_point: self.settings.black_point,
            white_point: self.settings.white_point,
            tint: self.settings.tint,
        }
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        self.status = Some((msg.into(), Instant::now()));
    }

    // ========================================================================
    // FILE ACTIONS
    // ========================================================================

    fn open_image(&mut self) {
        let Some((img, path)) = self.files.open_image() else {
            return;
        };
        let Some(renderer) = self.renderer.as_mut() else {
            self.set_status("No GPU available — cannot load images");
            return;
        };
        renderer.load_image(&img);
        self.canvas.compare = false;
        self.preview_dirty = true;
        self.fit_requested = true;
        self.set_status(format!("Opened {}", path.display()));
    }

    fn open_dropped(&mut self, path: std::path::PathBuf) {
        match io::load_image_rgba(&path) {
            Ok(img) => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                renderer.load_image(&img);
                self.files.current_path = Some(path.clone());
                self.canvas.compare = false;
                self.preview_dirty = true;
                self.fit_requested = true;
                self.set_status(format!("Opened {}", path.display()));
            }
            Err(e) => {
                log_err!("drop open failed: {}", e);
                self.set_status(format!("Could not open image: {}", e));
            }
        }
    }

    /// Export at the source resolution, decoupled from the on-screen view.
    ///
    /// The standard path returns the bitmap from the GPU and encodes it in
    /// the source file's format; the HDR path writes the Radiance file as a
    /// side effect and reports only success or failure.
    fn export(&mut self, hdr: bool) {
        let tone = self.tone();
        let Some(renderer) = self.renderer.as_mut() else {
            self.set_status("No GPU available — cannot export");
            return;
        };
        let Some((width, height)) = renderer.image_dims() else {
            self.set_status("Nothing to export — open an image first");
            return;
        };
        let Some(path) = self.files.pick_export_path(hdr) else {
            return; // dialog cancelled
        };

        let result = if hdr {
            renderer
                .export_hdr(width, height)
                .and_then(|pixels| io::write_radiance_hdr(&path, width, height, &pixels))
        } else {
            renderer.export_standard(width, height, &tone).and_then(|bitmap| {
                io::encode_and_write(&bitmap, &path, SaveFormat::from_path(&path), 90)
            })
        };

        match result {
            Ok(()) => {
                log_info!("exported {}x{} to {}", width, height, path.display());
                self.set_status(format!("Exported {}", path.display()));
            }
            Err(e) => {
                // The displacement/history state is untouched by a failed
                // export — last good state stays on screen.
                log_err!("export failed: {}", e);
                self.set_status(format!("Export failed: {}", e));
            }
        }
    }

    fn undo(&mut self) {
        if let Some(r) = self.renderer.as_mut()
            && r.undo()
        {
            self.preview_dirty = true;
        }
    }

    fn redo(&mut self) {
        if let Some(r) = self.renderer.as_mut()
            && r.redo()
        {
            self.preview_dirty = true;
        }
    }

    fn restore_all(&mut self) {
        if let Some(r) = self.renderer.as_mut()
            && r.restore_all()
        {
            self.preview_dirty = true;
            self.set_status("Restored original");
        }
    }

    // ========================================================================
    // TOOLBAR
    // ========================================================================

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Open…").clicked() {
                self.open_image();
            }
            let has_image = self.renderer.as_ref().is_some_and(|r| r.has_image());
            if ui
                .add_enabled(has_image, egui::Button::new("Export"))
                .clicked()
            {
                self.export(false);
            }
            if ui
                .add_enabled(has_image, egui::Button::new("Export HDR"))
                .clicked()
            {
                self.export(true);
            }

            ui.separator();

            let can_undo = self.renderer.as_ref().is_some_and(|r| r.can_undo());
            let can_redo = self.renderer.as_ref().is_some_and(|r| r.can_redo());
            if ui.add_enabled(can_undo, egui::Button::new("⟲ Undo")).clicked() {
                self.undo();
            }
            if ui.add_enabled(can_redo, egui::Button::new("⟳ Redo")).clicked() {
                self.redo();
            }
            if ui
                .add_enabled(can_undo, egui::Button::new("Restore All"))
                .clicked()
            {
                self.restore_all();
            }

            ui.separator();

            let compare = ui.selectable_label(self.canvas.compare, "Compare");
            if compare.clicked() {
                self.canvas.compare = !self.canvas.compare;
            }
            compare.on_hover_text("Show the unwarped original (C)");

            ui.separator();
            if let Some(r) = self.renderer.as_ref()
                && r.has_image()
            {
                ui.weak(format!(
                    "history {}/{}",
                    r.history_index() + 1,
                    r.history_len()
                ));
            }
        });
    }

    fn side_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Brush");
        let size = ui.add(
            egui::Slider::new(
                &mut self.canvas.brush.size,
                BRUSH_SIZE_MIN..=BRUSH_SIZE_MAX,
            )
            .text("Size"),
        );
        let strength = ui.add(
            egui::Slider::new(
                &mut self.canvas.brush.strength_pct,
                BRUSH_STRENGTH_MIN..=BRUSH_STRENGTH_MAX,
            )
            .text("Strength"),
        );
        if size.changed() || strength.changed() {
            self.settings.brush_size = self.canvas.brush.size;
            self.settings.brush_strength = self.canvas.brush.strength_pct;
        }

        ui.separator();
        ui.heading("Tone");
        let mut tone_changed = false;
        tone_changed |= ui
            .add(egui::Slider::new(&mut self.settings.exposure, 0.0..=4.0).text("Exposure"))
            .changed();
        tone_changed |= ui
            .add(
                egui::Slider::new(&mut self.settings.black_point, 0.0..=0.5).text("Black point"),
            )
            .changed();
        tone_changed |= ui
            .add(
                egui::Slider::new(&mut self.settings.white_point, 1.0..=1000.0)
                    .logarithmic(true)
                    .text("White point"),
            )
            .changed();
        for (i, label) in ["Tint R", "Tint G", "Tint B"].iter().enumerate() {
            tone_changed |= ui
                .add(egui::Slider::new(&mut self.settings.tint[i], 0.0..=2.0).text(*label))
                .changed();
        }
        let neutral = self.settings.tone_is_neutral();
        if ui
            .add_enabled(!neutral, egui::Button::new("Neutral tone"))
            .clicked()
        {
            let d = Settings::default();
            self.settings.exposure = d.exposure;
            self.settings.black_point = d.black_point;
            self.settings.white_point = d.white_point;
            self.settings.tint = d.tint;
            tone_changed = true;
        }
        if tone_changed {
            self.preview_dirty = true;
        }

        ui.separator();
        ui.heading("View");
        ui.label(format!("Zoom {:.0}%", self.canvas.view.zoom * 100.0));
        ui.horizontal(|ui| {
            if ui.button("Fit").clicked() {
                self.fit_requested = true;
            }
            if ui.button("100%").clicked() {
                self.canvas.view.reset();
            }
        });

        ui.separator();
        ui.collapsing("Settings", |ui| {
            if ui
                .checkbox(&mut self.settings.constrained, "Constrained device")
                .on_hover_text("Lower zoom ceiling and smaller history snapshots")
                .changed()
            {
                // The zoom ceiling applies immediately; the snapshot budget
                // applies to the next loaded image.
                self.canvas.view.max_zoom = self.settings.max_zoom();
                self.canvas.view.apply_zoom(1.0);
            }
            ui.label("GPU preference (takes effect on restart):");
            for option in ["high performance", "low power"] {
                if ui
                    .radio(self.settings.preferred_gpu == option, option)
                    .clicked()
                {
                    self.settings.preferred_gpu = option.to_string();
                }
            }
        });

        if let Some(r) = self.renderer.as_ref() {
            ui.separator();
            ui.weak(format!("GPU: {}", r.ctx.adapter_name));
        }
    }

    // ========================================================================
    // CANVAS INPUT + PAINT
    // ========================================================================

    fn canvas_panel(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        let viewport = ui.available_rect_before_wrap();
        // Claim the region so egui knows the canvas consumes drags.
        let _response = ui.allocate_rect(viewport, egui::Sense::click_and_drag());

        let Some((img_w, img_h)) = self.renderer.as_ref().and_then(|r| r.image_dims()) else {
            ui.painter().text(
                viewport.center(),
                egui::Align2::CENTER_CENTER,
                "Open an image (Ctrl+O) or drop one here",
                egui::FontId::proportional(16.0),
                ui.visuals().weak_text_color(),
            );
            return;
        };

        if self.fit_requested {
            self.canvas.view.fit(viewport, img_w, img_h);
            self.fit_requested = false;
        }

        let image_rect = self.canvas.view.image_rect(viewport, img_w, img_h);
        self.handle_input(ctx, viewport, image_rect, img_h);
        self.refresh_preview(ctx);

        // ---- paint ----
        let painter = ui.painter_at(viewport);
        if let Some(tex) = &self.preview_tex {
            painter.image(
                tex.id(),
                image_rect,
                Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                Color32::WHITE,
            );
        }
        painter.rect_stroke(image_rect, 0.0, Stroke::new(1.0, Color32::from_gray(70)));

        if self.canvas.compare {
            painter.text(
                image_rect.left_top() + Vec2::new(8.0, 8.0),
                egui::Align2::LEFT_TOP,
                "ORIGINAL",
                egui::FontId::proportional(13.0),
                Color32::from_gray(200),
            );
        }

        // Brush cursor circle.
        if let Some((pos, diameter)) = self.canvas.pointer_preview(img_h) {
            if viewport.contains(pos) {
                painter.circle_stroke(
                    pos,
                    diameter / 2.0,
                    Stroke::new(1.5, Color32::from_white_alpha(180)),
                );
            }
        }

        // Status line, bottom-left, with a TTL.
        let mut expire_status = false;
        if let Some((msg, since)) = &self.status {
            if since.elapsed() < STATUS_TTL {
                painter.text(
                    viewport.left_bottom() + Vec2::new(8.0, -8.0),
                    egui::Align2::LEFT_BOTTOM,
                    msg,
                    egui::FontId::proportional(13.0),
                    ui.visuals().text_color(),
                );
            } else {
                expire_status = true;
            }
        }
        if expire_status {
            self.status = None;
        }
    }

    fn handle_input(
        &mut self,
        ctx: &egui::Context,
        viewport: Rect,
        image_rect: Rect,
        img_h: u32,
    ) {
        let now = Instant::now();
        let over_widget = ctx.is_pointer_over_area();

        let (
            hover_pos,
            primary_pressed,
            primary_released,
            pointer_gone,
            any_touches,
            multi_touch,
            space_down,
            scroll_y,
            ctrl,
        ) = ctx.input(|i| {
            (
                i.pointer.hover_pos(),
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                !i.pointer.has_pointer(),
                i.any_touches(),
                i.multi_touch(),
                i.key_down(egui::Key::Space),
                i.scroll_delta.y,
                i.modifiers.ctrl,
            )
        });

        let over_canvas = hover_pos.is_some_and(|p| viewport.contains(p)) && !over_widget;
        self.canvas.hover_pos = hover_pos.filter(|p| viewport.contains(*p));

        // ---- two-finger gesture: always preempts ----
        if let Some(mt) = multi_touch {
            if self.canvas.machine.state() != InteractionState::TwoFingerGesture {
                if self.canvas.machine.second_touch_down() == InputAction::CommitStroke {
                    if let Some(r) = self.renderer.as_mut() {
                        r.commit_stroke();
                    }
                }
            }
            // Pinch zoom + two-finger pan; displacement state untouched.
            if let Some(center) = hover_pos {
                self.canvas.view.zoom_around(mt.zoom_delta, center, viewport);
            } else {
                self.canvas.view.apply_zoom(mt.zoom_delta);
            }
            self.canvas.view.pan += mt.translation_delta;
            return;
        }
        self.canvas.machine.gesture_end();

        // ---- wheel zoom (ctrl = finer step); never touches displacement ----
        if scroll_y != 0.0 && over_canvas {
            let step = if ctrl { 0.001 } else { 0.005 };
            let factor = 1.0 + scroll_y * step;
            if let Some(pos) = hover_pos {
                self.canvas.view.zoom_around(factor, pos, viewport);
            } else {
                self.canvas.view.apply_zoom(factor);
            }
        }

        // ---- single pointer ----
        if primary_pressed && over_canvas {
            let kind = if any_touches {
                PointerKind::Touch
            } else {
                PointerKind::Mouse
            };
            if let Some(pos) = hover_pos {
                self.canvas.machine.pointer_down(
                    pos,
                    kind,
                    space_down,
                    self.canvas.compare,
                    now,
                );
            }
        }

        if let Some(pos) = hover_pos {
            let action = self.canvas.machine.pointer_move(pos, now);
            self.apply_action(action, image_rect, img_h);
        }
        // The time gate can open without pointer movement.
        self.canvas.machine.tick(now);

        if primary_released {
            let action = self.canvas.machine.pointer_up();
            self.apply_action(action, image_rect, img_h);
        } else if pointer_gone && self.canvas.machine.state() != InteractionState::Idle {
            let action = self.canvas.machine.pointer_cancel();
            self.apply_action(action, image_rect, img_h);
            self.canvas.hover_pos = None;
        }

        // Warping needs a repaint per frame even with a still pointer, so
        // the delay gate and preview stay live.
        if self.canvas.machine.state() != InteractionState::Idle {
            ctx.request_repaint();
        }
    }

    fn apply_action(&mut self, action: InputAction, image_rect: Rect, img_h: u32) {
        match action {
            InputAction::None => {}
            InputAction::Pan(delta) => {
                self.canvas.view.pan += delta;
            }
            InputAction::WarpStep { prev, curr } => {
                let Some(renderer) = self.renderer.as_mut() else {
                    return;
                };
                let prev_uv = self.canvas.view.screen_to_uv(prev, image_rect);
                let curr_uv = self.canvas.view.screen_to_uv(curr, image_rect);
                let radius_uv = self
                    .canvas
                    .brush
                    .radius_uv(self.canvas.view.zoom, img_h);
                renderer.accumulate(
                    [prev_uv.0, prev_uv.1],
                    [curr_uv.0, curr_uv.1],
                    radius_uv,
                    self.canvas.brush.strength(),
                );
                self.preview_dirty = true;
            }
            InputAction::CommitStroke => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.commit_stroke();
                }
            }
        }
    }

    /// Re-render and upload the preview texture when displacement, tone or
    /// compare state changed since the last frame.
    fn refresh_preview(&mut self, ctx: &egui::Context) {
        if self.canvas.compare != self.compare_was {
            self.compare_was = self.canvas.compare;
            self.preview_dirty = true;
        }
        if !self.preview_dirty {
            return;
        }
        let tone = self.tone();
        let compare = self.canvas.compare;
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if !renderer.has_image() {
            return;
        }

        match renderer.render_preview(&tone, compare) {
            Ok((pixels, w, h)) => {
                let img = egui::ColorImage::from_rgba_unmultiplied(
                    [w as usize, h as usize],
                    &pixels,
                );
                if let Some(tex) = self.preview_tex.as_mut() {
                    tex.set(img, egui::TextureOptions::LINEAR);
                } else {
                    self.preview_tex = Some(ctx.load_texture(
                        "warp_preview",
                        img,
                        egui::TextureOptions::LINEAR,
                    ));
                }
                self.preview_dirty = false;
            }
            Err(e) => {
                // Unready state — keep the last good texture, report once.
                log_err!("preview render failed: {}", e);
                self.preview_dirty = false;
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        let (undo, redo, open, export, export_hdr, compare, fit, reset_zoom) = ctx.input(|i| {
            (
                i.modifiers.command && !i.modifiers.shift && i.key_pressed(egui::Key::Z),
                i.modifiers.command
                    && (i.key_pressed(egui::Key::Y)
                        || (i.modifiers.shift && i.key_pressed(egui::Key::Z))),
                i.modifiers.command && i.key_pressed(egui::Key::O),
                i.modifiers.command && !i.modifiers.shift && i.key_pressed(egui::Key::E),
                i.modifiers.command && i.modifiers.shift && i.key_pressed(egui::Key::E),
                i.key_pressed(egui::Key::C) && !i.modifiers.command,
                i.key_pressed(egui::Key::F) && !i.modifiers.command,
                i.key_pressed(egui::Key::Num0) && !i.modifiers.command,
            )
        });

        if undo {
            self.undo();
        }
        if redo {
            self.redo();
        }
        if open {
            self.open_image();
        }
        if export {
            self.export(false);
        }
        if export_hdr {
            self.export(true);
        }
        if compare {
            self.canvas.compare = !self.canvas.compare;
        }
        if fit {
            self.fit_requested = true;
        }
        if reset_zoom {
            self.canvas.view.reset();
        }
    }
}

impl eframe::App for WarpApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Dropped files open like the Open… dialog.
        let dropped: Vec<_> = ctx.input(|i| i.raw.dropped_files.clone());
        if let Some(file) = dropped.into_iter().find_map(|f| f.path) {
            self.open_dropped(file);
        }

        self.handle_shortcuts(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ui);
        });
        egui::SidePanel::right("controls")
            .resizable(false)
            .default_width(230.0)
            .show(ctx, |ui| {
                self.side_panel(ui);
            });
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::from_gray(24)))
            .show(ctx, |ui| {
                self.canvas_panel(ctx, ui);
            });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.settings.save();
        if let Some(r) = self.renderer.as_mut() {
            r.unload();
        }
    }
}
