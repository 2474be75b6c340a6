// ============================================================================
// DISPLACEMENT BUFFERS — ping-pong pair + immutable original reference
// ============================================================================
//
// Two equally-sized render targets hold the accumulated (dx, dy)
// displacement in the source image's UV space.  One of the pair is
// authoritative at any moment; the brush pass reads it, writes the other,
// then authority swaps.  The compositor always binds the post-swap
// authoritative buffer, so the display never lags a frame behind.
//
// GPU memory is not tracked by Rust's allocator: every target here has an
// explicit `dispose()` that must run when the image is replaced, a history
// entry is evicted, or the renderer is torn down.

use super::context::{DisplacementFormat, GpuContext};

/// One GPU render target with its sampling view.  Dropping the struct does
/// NOT free the GPU memory promptly — call `dispose()`.
pub struct WarpTarget {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl WarpTarget {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Release the GPU memory now instead of waiting for all handles to drop.
    pub fn dispose(&self) {
        self.texture.destroy();
    }
}

/// Zero displacement encoded for the pair's texture format.  Float formats
/// store 0 directly; the 8-bit fallback stores the bias (0.5).
pub fn encoded_zero(format: DisplacementFormat) -> wgpu::Color {
    let (_, bias) = format.decode_scale_bias();
    wgpu::Color {
        r: bias as f64,
        g: bias as f64,
        b: 0.0,
        a: 1.0,
    }
}

/// Clear a target to encoded-zero displacement with a bare render pass.
pub fn clear_to_zero(
    encoder: &mut wgpu::CommandEncoder,
    target: &WarpTarget,
    format: DisplacementFormat,
) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("displacement_clear"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &target.view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(encoded_zero(format)),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

// ============================================================================
// DISPLACEMENT PAIR
// ============================================================================

pub struct DisplacementPair {
    targets: [WarpTarget; 2],
    /// Index of the buffer that is authoritative for display.
    authority: usize,
    pub format: DisplacementFormat,
}

impl DisplacementPair {
    /// Allocate both buffers at the (already GPU-clamped) resolution and
    /// clear them to zero displacement.  Authority starts at 0.
    pub fn new(ctx: &GpuContext, width: u32, height: u32) -> Self {
        let format = ctx.displacement_format;
        let tex_format = format.texture_format();
        let pair = Self {
            targets: [
                WarpTarget::new(&ctx.device, tex_format, width, height, "displacement_ping"),
                WarpTarget::new(&ctx.device, tex_format, width, height, "displacement_pong"),
            ],
            authority: 0,
            format,
        };

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("displacement_init"),
            });
        clear_to_zero(&mut encoder, &pair.targets[0], format);
        clear_to_zero(&mut encoder, &pair.targets[1], format);
        ctx.submit_one(encoder);

        pair
    }

    /// The buffer the compositor should sample and the brush pass reads.
    pub fn authoritative(&self) -> &WarpTarget {
        &self.targets[self.authority]
    }

    /// The write destination of the next accumulation pass.
    pub fn inactive(&self) -> &WarpTarget {
        &self.targets[1 - self.authority]
    }

    /// Flip authority after an accumulation pass has been issued.
    pub fn swap(&mut self) {
        self.authority = 1 - self.authority;
    }

    /// Both buffers, for restore passes that must leave the pair consistent.
    pub fn both(&self) -> [&WarpTarget; 2] {
        [&self.targets[0], &self.targets[1]]
    }

    pub fn width(&self) -> u32 {
        self.targets[0].width
    }

    pub fn height(&self) -> u32 {
        self.targets[0].height
    }

    /// Release both buffers' GPU memory.
    pub fn dispose(&self) {
        self.targets[0].dispose();
        self.targets[1].dispose();
    }
}
