// ============================================================================
// WARP RENDERER — top-level coordinator for the displacement pipeline
// ============================================================================
//
// Owns the GPU context, the two render pipelines, and everything tied to the
// lifetime of the currently loaded image: source texture, displacement
// buffer pair, the immutable original-state reference, and the history log.
//
// All operations run on the caller's thread inside the repaint loop; GPU
// work is issued synchronously and only readback points block.  On image
// replacement every prior GPU resource is explicitly destroyed before the
// new ones are installed — nothing is left to garbage collection, because
// there is none for GPU memory.

use image::RgbaImage;

use crate::components::history::{snapshot_dims, HistoryLog, HistorySnapshot};
use crate::log_info;

use super::brush::BrushPipeline;
use super::compositor::{RenderMode, ToneParams, WarpCompositor};
use super::context::GpuContext;
use super::displacement::{clear_to_zero, DisplacementPair, WarpTarget};

/// GPU-side state for one loaded image.
struct LoadedImage {
    source_tex: wgpu::Texture,
    source_view: wgpu::TextureView,
    /// Working resolution: the source clamped to the device texture limit.
    /// Exports default to exactly these dimensions.
    width: u32,
    height: u32,
    pair: DisplacementPair,
    /// Always-zero displacement; ground truth for compare and restore-all.
    /// Created once per image, never written again, excluded from eviction.
    original_ref: WarpTarget,
    /// Cached preview target — re-rendered every dirty frame, so it is kept
    /// rather than recreated.
    preview: WarpTarget,
    history: HistoryLog<HistorySnapshot>,
}

impl LoadedImage {
    fn dispose(&mut self) {
        self.history.clear(HistorySnapshot::dispose);
        self.pair.dispose();
        self.original_ref.dispose();
        self.preview.dispose();
        self.source_tex.destroy();
    }
}

pub struct WarpRenderer {
    pub ctx: GpuContext,
    brush: BrushPipeline,
    compositor: WarpCompositor,
    image: Option<LoadedImage>,
    /// Cached staging buffer shared by all readbacks.
    staging: Option<(wgpu::Buffer, u64)>,
    history_capacity: usize,
    snapshot_budget_px: u32,
}

impl WarpRenderer {
    /// Returns None only when no adapter at all (hardware or software) is
    /// available — the app surfaces that as a fatal startup error.
    pub fn new(
        preferred_gpu: &str,
        history_capacity: usize,
        snapshot_budget_px: u32,
    ) -> Option<Self> {
        let ctx = GpuContext::new(preferred_gpu)?;
        log_info!(
            "GPU ready: {} (max texture {}, displacement {:?})",
            ctx.adapter_name,
            ctx.max_texture_dim,
            ctx.displacement_format
        );
        let brush = BrushPipeline::new(&ctx.device, ctx.displacement_format.texture_format());
        let compositor = WarpCompositor::new(&ctx.device, ctx.displacement_format);
        Some(Self {
            ctx,
            brush,
            compositor,
            image: None,
            staging: None,
            history_capacity,
            snapshot_budget_px,
        })
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    /// Working (GPU-clamped) dimensions of the loaded image.
    pub fn image_dims(&self) -> Option<(u32, u32)> {
        self.image.as_ref().map(|img| (img.width, img.height))
    }

    pub fn history_len(&self) -> usize {
        self.image.as_ref().map_or(0, |i| i.history.len())
    }

    pub fn history_index(&self) -> usize {
        self.image.as_ref().map_or(0, |i| i.history.index())
    }

    pub fn can_undo(&self) -> bool {
        self.image.as_ref().is_some_and(|i| i.history.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.image.as_ref().is_some_and(|i| i.history.can_redo())
    }

    // ========================================================================
    // IMAGE LIFECYCLE
    // ========================================================================

    /// Install a new source image, replacing (and disposing) any previous
    /// one.  Oversized sources are downscaled on the CPU to the device's
    /// texture limit, aspect preserved, before upload.
    pub fn load_image(&mut self, img: &RgbaImage) {
        // Dispose previous image's GPU state first.
        if let Some(mut old) = self.image.take() {
            old.dispose();
        }

        let (src_w, src_h) = img.dimensions();
        let (width, height) = self.ctx.clamp_dims(src_w, src_h);
        let resized;
        let upload: &RgbaImage = if (width, height) != (src_w, src_h) {
            log_info!(
                "source {}x{} exceeds device limit — working at {}x{}",
                src_w,
                src_h,
                width,
                height
            );
            resized = image::imageops::resize(
                img,
                width,
                height,
                image::imageops::FilterType::CatmullRom,
            );
            &resized
        } else {
            img
        };

        let device = &self.ctx.device;
        let source_tex = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("source_image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &source_tex,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            upload.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        let source_view = source_tex.create_view(&wgpu::TextureViewDescriptor::default());

        let pair = DisplacementPair::new(&self.ctx, width, height);
        let format = self.ctx.displacement_format;

        let original_ref = WarpTarget::new(
            device,
            format.texture_format(),
            width,
            height,
            "original_state_ref",
        );

        // The preview shares the snapshot pixel budget: the on-screen
        // composite never needs more resolution than the display can use.
        let (snap_w, snap_h) = snapshot_dims(width, height, self.snapshot_budget_px);
        let preview = WarpTarget::new(
            device,
            wgpu::TextureFormat::Rgba8Unorm,
            snap_w,
            snap_h,
            "preview_target",
        );

        // Zero the original reference and the baseline snapshot in one
        // submission.
        let baseline = WarpTarget::new(
            device,
            format.texture_format(),
            snap_w,
            snap_h,
            "history_baseline",
        );
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("image_init_encoder"),
        });
        clear_to_zero(&mut encoder, &original_ref, format);
        clear_to_zero(&mut encoder, &baseline, format);
        self.ctx.submit_one(encoder);

        let mut history = HistoryLog::new(self.history_capacity);
        history.reset_with_baseline(HistorySnapshot { target: baseline }, HistorySnapshot::dispose);

        self.image = Some(LoadedImage {
            source_tex,
            source_view,
            width,
            height,
            pair,
            original_ref,
            preview,
            history,
        });
        log_info!("image loaded at {}x{}", width, height);
    }

    /// Drop the current image and every GPU resource tied to it.
    pub fn unload(&mut self) {
        if let Some(mut old) = self.image.take() {
            old.dispose();
        }
    }

    // ========================================================================
    // BRUSH ACCUMULATION
    // ========================================================================

    /// Issue one accumulation pass.  A no-op (not an error) when no image is
    /// loaded — pointer events can race image teardown.
    pub fn accumulate(
        &mut self,
        prev_uv: [f32; 2],
        curr_uv: [f32; 2],
        radius_uv: f32,
        strength: f32,
    ) {
        let Some(img) = self.image.as_mut() else {
            return;
        };
        let aspect = img.width as f32 / img.height as f32;
        self.brush.accumulate(
            &self.ctx,
            &mut img.pair,
            prev_uv,
            curr_uv,
            radius_uv,
            strength,
            aspect,
        );
    }

    // ========================================================================
    // HISTORY
    // ========================================================================

    /// Snapshot the authoritative buffer (downsampled) and append it.
    /// Called by the interaction layer strictly after it leaves Warping.
    pub fn commit_stroke(&mut self) {
        let Some(img) = self.image.as_mut() else {
            return;
        };
        let format = img.pair.format;
        let (snap_w, snap_h) = snapshot_dims(img.width, img.height, self.snapshot_budget_px);
        let snap = WarpTarget::new(
            &self.ctx.device,
            format.texture_format(),
            snap_w,
            snap_h,
            "history_snapshot",
        );

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("snapshot_encoder"),
            });
        self.compositor
            .blit(&self.ctx, &mut encoder, &img.pair.authoritative().view, &snap.view);
        self.ctx.submit_one(encoder);

        img.history
            .commit(HistorySnapshot { target: snap }, HistorySnapshot::dispose);
    }

    pub fn undo(&mut self) -> bool {
        let moved = match self.image.as_mut() {
            Some(img) => img.history.undo(),
            None => false,
        };
        if moved {
            self.restore_current_snapshot();
        }
        moved
    }

    pub fn redo(&mut self) -> bool {
        let moved = match self.image.as_mut() {
            Some(img) => img.history.redo(),
            None => false,
        };
        if moved {
            self.restore_current_snapshot();
        }
        moved
    }

    pub fn restore_all(&mut self) -> bool {
        let moved = match self.image.as_mut() {
            Some(img) => img.history.restore_all(),
            None => false,
        };
        if moved {
            self.restore_current_snapshot();
        }
        moved
    }

    /// Copy the history entry at the cursor into BOTH buffers of the pair,
    /// so the next stroke continues from consistent state whichever buffer
    /// the ping-pong reads first.
    fn restore_current_snapshot(&mut self) {
        let Some(img) = self.image.as_ref() else {
            return;
        };
        let Some(snapshot) = img.history.current() else {
            return;
        };

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("restore_encoder"),
            });
        for target in img.pair.both() {
            self.compositor
                .blit(&self.ctx, &mut encoder, &snapshot.target.view, &target.view);
        }
        self.ctx.submit_one(encoder);
    }

    // ========================================================================
    // PREVIEW
    // ========================================================================

    /// Re-render the on-screen preview and read it back as packed RGBA8.
    ///
    /// `compare` substitutes the original-state reference for the
    /// displacement input — the unwarped image with the same tone pipeline.
    /// Returns (pixels, width, height).
    pub fn render_preview(
        &mut self,
        tone: &ToneParams,
        compare: bool,
    ) -> Result<(Vec<u8>, u32, u32), String> {
        let Some(img) = self.image.as_ref() else {
            return Err("no image loaded".into());
        };

        let displacement = if compare {
            &img.original_ref
        } else {
            img.pair.authoritative()
        };
        self.compositor.render(
            &self.ctx,
            &img.source_view,
            displacement,
            img.pair.format,
            &img.preview,
            RenderMode::Preview,
            tone,
        );

        let (w, h) = (img.preview.width, img.preview.height);
        let pixels = WarpCompositor::readback_texture(
            &self.ctx,
            &img.preview.texture,
            w,
            h,
            4,
            &mut self.staging,
        );
        if pixels.is_empty() {
            return Err("preview readback failed".into());
        }
        Ok((pixels, w, h))
    }

    // ========================================================================
    // EXPORT
    // ========================================================================

    /// Render the standard (8-bit, display-referred) export at exactly
    /// `width` x `height`, independent of the on-screen viewport.
    pub fn export_standard(
        &mut self,
        width: u32,
        height: u32,
        tone: &ToneParams,
    ) -> Result<RgbaImage, String> {
        self.check_export_args(width, height)?;
        let bytes = self.render_export(width, height, RenderMode::StandardExport, tone)?;
        RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(|| "export produced a malformed pixel buffer".to_string())
    }

    /// Render the HDR export: linear float RGBA at exactly `width` x
    /// `height`, tone pipeline bypassed.  The caller encodes to RGBE.
    pub fn export_hdr(&mut self, width: u32, height: u32) -> Result<Vec<f32>, String> {
        self.check_export_args(width, height)?;
        let bytes =
            self.render_export(width, height, RenderMode::HdrExport, &ToneParams::default())?;
        Ok(bytemuck::pod_collect_to_vec::<u8, f32>(&bytes))
    }

    /// Invalid arguments and unready state are rejected here, before any
    /// GPU object is created; internal state is left untouched.
    fn check_export_args(&self, width: u32, height: u32) -> Result<(), String> {
        if self.image.is_none() {
            return Err("export requested with no image loaded".into());
        }
        if width == 0 || height == 0 {
            return Err(format!("invalid export dimensions {}x{}", width, height));
        }
        if width > self.ctx.max_texture_dim || height > self.ctx.max_texture_dim {
            return Err(format!(
                "export dimensions {}x{} exceed device limit {}",
                width, height, self.ctx.max_texture_dim
            ));
        }
        Ok(())
    }

    fn render_export(
        &mut self,
        width: u32,
        height: u32,
        mode: RenderMode,
        tone: &ToneParams,
    ) -> Result<Vec<u8>, String> {
        let img = self.image.as_ref().expect("checked by check_export_args");

        let target = WarpTarget::new(
            &self.ctx.device,
            mode.target_format(),
            width,
            height,
            "export_target",
        );
        self.compositor.render(
            &self.ctx,
            &img.source_view,
            img.pair.authoritative(),
            img.pair.format,
            &target,
            mode,
            tone,
        );

        let bpp = if mode == RenderMode::HdrExport { 16 } else { 4 };
        let bytes = WarpCompositor::readback_texture(
            &self.ctx,
            &target.texture,
            width,
            height,
            bpp,
            &mut self.staging,
        );
        target.dispose();

        if bytes.is_empty() {
            return Err("export readback failed".into());
        }
        Ok(bytes)
    }
}

impl Drop for WarpRenderer {
    fn drop(&mut self) {
        self.unload();
    }
}
