// ============================================================================
// BRUSH PIPELINE — one accumulation pass per accepted pointer move
// ============================================================================
//
// Each pass reads the authoritative displacement buffer and the last two
// pointer UV positions, adds the falloff-weighted delta inside the brush
// radius, writes the inactive buffer, and swaps authority.  Strokes
// compound: the delta is added to whatever displacement is already there.

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::displacement::DisplacementPair;

/// CPU mirror of `BrushUniforms` in shaders.rs — keep field order in sync.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct BrushUniforms {
    prev_uv: [f32; 2],
    curr_uv: [f32; 2],
    radius_uv: f32,
    strength: f32,
    aspect: f32,
    disp_scale: f32,
    disp_bias: f32,
    _pad: [f32; 3],
}

pub struct BrushPipeline {
    pipeline: wgpu::RenderPipeline,
    tex_bgl: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    /// Reused across passes via `queue.write_buffer`.
    uniform_buf: wgpu::Buffer,
    uniform_bg: wgpu::BindGroup,
}

impl BrushPipeline {
    /// `target_format` is the displacement pair's texture format, fixed at
    /// context creation.
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("brush_shader"),
            source: wgpu::ShaderSource::Wgsl(super::shaders::BRUSH_SHADER.into()),
        });

        let uniform_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brush_uniform_bgl"),
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

        let tex_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brush_tex_bgl"),
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
            label: Some("brush_pipeline_layout"),
            bind_group_layouts: &[&uniform_bgl, &tex_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("brush_pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_brush",
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
                entry_point: "fs_brush",
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None, // full-quad overwrite, shader does the math
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            multiview: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("brush_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("brush_uniform_buf"),
            contents: bytemuck::bytes_of(&BrushUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let uniform_bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brush_uniform_bg"),
            layout: &uniform_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buf.as_entire_binding(),
            }],
        });

        Self {
            pipeline,
            tex_bgl,
            sampler,
            uniform_buf,
            uniform_bg,
        }
    }

    /// Issue one accumulation pass and swap the pair's authority.
    ///
    /// `strength` is normalized to [0, 1]; `radius_uv` is the brush radius
    /// in v-axis UV units; `aspect` is width/height of the source image.
    /// Both are clamped here so a miscomputed caller value cannot push
    /// garbage into the shader.
    pub fn accumulate(
        &self,
        ctx: &GpuContext,
        pair: &mut DisplacementPair,
        prev_uv: [f32; 2],
        curr_uv: [f32; 2],
        radius_uv: f32,
        strength: f32,
        aspect: f32,
    ) {
        let (scale, bias) = pair.format.decode_scale_bias();
        let uniforms = BrushUniforms {
            prev_uv,
            curr_uv,
            radius_uv: radius_uv.max(1e-6),
            strength: strength.clamp(0.0, 1.0),
            aspect: aspect.max(1e-6),
            disp_scale: scale,
            disp_bias: bias,
            _pad: [0.0; 3],
        };
        ctx.queue
            .write_buffer(&self.uniform_buf, 0, bytemuck::bytes_of(&uniforms));

        let read_bg = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("brush_read_bg"),
            layout: &self.tex_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&pair.authoritative().view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("brush_encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("brush_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &pair.inactive().view,
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
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.uniform_bg, &[]);
            pass.set_bind_group(1, &read_bg, &[]);
            pass.draw(0..6, 0..1);
        }
        ctx.submit_one(encoder);

        // Authority flips only after the pass is issued; the compositor
        // binds the post-swap buffer in the same frame.
        pair.swap();
    }
}
