// ============================================================================
// WARP COMPOSITOR — color-managed display/export compositing + readback
// ============================================================================
//
// One shader, three modes (preview / standard export / HDR export), two
// pipelines: an 8-bit target for everything display-referred and a 32-bit
// float target for HDR.  The same displacement buffer feeds all three, so
// what the user previews is what exports, modulo resolution and tone path.
//
// Also owns the blit pipeline used by history snapshot/restore resampling.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::context::{DisplacementFormat, GpuContext};
use super::displacement::WarpTarget;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RenderMode {
    Preview,
    StandardExport,
    HdrExport,
}

impl RenderMode {
    fn to_u32(self) -> u32 {
        match self {
            RenderMode::Preview => 0,
            RenderMode::StandardExport => 1,
            RenderMode::HdrExport => 2,
        }
    }

    pub fn target_format(self) -> wgpu::TextureFormat {
        match self {
            RenderMode::HdrExport => wgpu::TextureFormat::Rgba32Float,
            _ => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// Tone adjustments applied in linear light (preview/standard only).
/// Defaults are neutral: the compositor is a superset of the plain warp.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ToneParams {
    pub exposure: f32,
    pub black_point: f32,
    pub white_point: f32,
    pub tint: [f32; 3],
}

impl Default for ToneParams {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            black_point: 0.0,
            white_point: 1000.0,
            tint: [1.0, 1.0, 1.0],
        }
    }
}

/// CPU mirror of `WarpUniforms` in shaders.rs — keep field order in sync.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct WarpUniforms {
    tint: [f32; 4],
    exposure: f32,
    black_point: f32,
    white_point: f32,
    mode: u32,
    disp_scale: f32,
    disp_bias: f32,
    _pad: [f32; 2],
}

pub struct WarpCompositor {
    /// 8-bit pipeline: preview + standard export.
    pipeline_rgba8: wgpu::RenderPipeline,
    /// Float pipeline: HDR export.
    pipeline_f32: wgpu::RenderPipeline,
    tex_bgl: wgpu::BindGroupLayout,

    blit_pipeline: wgpu::RenderPipeline,
    blit_bgl: wgpu::BindGroupLayout,

    pub sampler_linear: wgpu::Sampler,

    uniform_buf: wgpu::Buffer,
    uniform_bg: wgpu::BindGroup,
}

impl WarpCompositor {
    /// `displacement_format` fixes the blit pipeline's target format (blit
    /// only ever writes displacement-typed targets).
    pub fn new(device: &wgpu::Device, displacement_format: DisplacementFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("warp_shader"),
            source: wgpu::ShaderSource::Wgsl(super::shaders::WARP_SHADER.into()),
        });

        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("warp_uniform_bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        // Texture + sampler pair, reused for group 1 (source) and 2 (displacement).
        let tex_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("warp_tex_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("warp_pipeline_layout"),
            bind_group_layouts: &[&uniform_bgl, &tex_bgl, &tex_bgl],
            push_constant_ranges: &[],
        });

        let make_pipeline = |format: wgpu::TextureFormat, label: &str| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_warp",
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_warp",
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: None, // opaque full-quad output
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                multiview: None,
            })
        };

        let pipeline_rgba8 = make_pipeline(wgpu::TextureFormat::Rgba8Unorm, "warp_pipeline_rgba8");
        let pipeline_f32 = make_pipeline(wgpu::TextureFormat::Rgba32Float, "warp_pipeline_f32");

        // ---- Blit pipeline (snapshot/restore resampling) ----
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blit_shader"),
            source: wgpu::ShaderSource::Wgsl(super::shaders::BLIT_SHADER.into()),
        });
        let blit_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blit_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let blit_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blit_pipeline_layout"),
            bind_group_layouts: &[&blit_bgl],
            push_constant_ranges: &[],
        });
        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blit_pipeline"),
            layout: Some(&blit_layout),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: "vs_blit",
                buffers: &[],
                compilation_options: Default::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: "fs_blit",
                targets: &[Some(wgpu::ColorTargetState {
                    format: displacement_format.texture_format(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });

        let sampler_linear = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("warp_sampler_linear"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("warp_uniform_buf"),
            contents: bytemuck::bytes_of(&WarpUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("warp_uniform_bg"),
            layout: &uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buf.as_entire_binding(),
            }],
        });

        Self {
            pipeline_rgba8,
            pipeline_f32,
            tex_bgl,
            blit_pipeline,
            blit_bgl,
            sampler_linear,
            uniform_buf,
            uniform_bg,
        }
    }

    /// Render the warped composite into `target`.
    ///
    /// `displacement` must be the pair's post-swap authoritative buffer (or
    /// the original-state reference for compare mode).  HDR mode ignores
    /// `tone` entirely — the shader bypasses the tone path.
    pub fn render(
        &self,
        ctx: &GpuContext,
        source_view: &wgpu::TextureView,
        displacement: &WarpTarget,
        disp_format: DisplacementFormat,
        target: &WarpTarget,
        mode: RenderMode,
        tone: &ToneParams,
    ) {
        let (scale, bias) = disp_format.decode_scale_bias();
        let uniforms = WarpUniforms {
            tint: [tone.tint[0], tone.tint[1], tone.tint[2], 1.0],
            exposure: tone.exposure,
            black_point: tone.black_point,
            white_point: tone.white_point.max(1e-3),
            mode: mode.to_u32(),
            disp_scale: scale,
            disp_bias: bias,
            _pad: [0.0; 2],
        };
        ctx.queue
            .write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(&uniforms));

        let source_bg = self.tex_bind_group(ctx, source_view, "warp_source_bg");
        let disp_bg = self.tex_bind_group(ctx, &displacement.view, "warp_disp_bg");

        let pipeline = match mode {
            RenderMode::HdrExport => &self.pipeline_f32,
            _ => &self.pipeline_rgba8,
        };

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("warp_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("warp_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.uniform_bg, &[]);
            pass.set_bind_group(1, &source_bg, &[]);
            pass.set_bind_group(2, &disp_bg, &[]);
            pass.draw(0..6, 0..1);
        }
        ctx.submit_one(encoder);
    }

    /// Resample `src` into `dst` (both displacement-typed), linear filtered.
    /// Used to downsample history snapshots and to restore them into the
    /// full-size pair buffers.
    pub fn blit(&self, ctx: &GpuContext, encoder: &mut wgpu::CommandEncoder, src: &wgpu::TextureView, dst: &wgpu::TextureView) {
        let bg = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blit_bg"),
            layout: &self.blit_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler_linear),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blit_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.blit_pipeline);
        pass.set_bind_group(0, &bg, &[]);
        pass.draw(0..6, 0..1);
    }

    fn tex_bind_group(
        &self,
        ctx: &GpuContext,
        view: &wgpu::TextureView,
        label: &str,
    ) -> wgpu::BindGroup {
        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.tex_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler_linear),
                },
            ],
        })
    }

    // ========================================================================
    // READBACK
    // ========================================================================

    /// Copy a texture to the CPU and strip row-alignment padding.
    ///
    /// Blocks the calling frame until the GPU finishes — acceptable because
    /// readback only happens at snapshot/export/preview-refresh points.
    /// `bytes_per_pixel` is 4 for RGBA8 targets, 16 for RGBA32Float.
    pub fn readback_texture(
        ctx: &GpuContext,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        cached_staging: &mut Option<(wgpu::Buffer, u64)>,
    ) -> Vec<u8> {
        let device = &ctx.device;
        let queue = &ctx.queue;

        let bytes_per_row = super::aligned_bytes_per_row(width, bytes_per_pixel);
        let buffer_size = (bytes_per_row * height) as u64;

        // Reuse the cached staging buffer when it is large enough.
        let need_new = match cached_staging {
            Some((_, sz)) if *sz >= buffer_size => false,
            _ => true,
        };
        if need_new {
            let new_buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("readback_staging"),
                size: buffer_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            *cached_staging = Some((new_buf, buffer_size));
        }
        let staging = &cached_staging.as_ref().unwrap().0;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("[GPU] readback map error: {:?}", e);
                return vec![];
            }
            Err(e) => {
                eprintln!("[GPU] readback channel error: {:?}", e);
                return vec![];
            }
        }

        let mapped = slice.get_mapped_range();
        let actual_row = (width * bytes_per_pixel) as usize;
        let mut result = Vec::with_capacity(actual_row * height as usize);
        for y in 0..height {
            let start = (y * bytes_per_row) as usize;
            result.extend_from_slice(&mapped[start..start + actual_row]);
        }
        drop(mapped);
        staging.unmap();

        result
    }
}
