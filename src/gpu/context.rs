// ============================================================================
// GPU CONTEXT — wgpu Device, Queue, and adapter initialization
// ============================================================================

use std::sync::Arc;

/// Texture format used for the displacement buffer pair, chosen from what
/// the adapter actually supports.  Half-float is preferred; when float
/// render targets or float filtering are missing we silently degrade to
/// 8-bit with a scale/bias encoding (displacement range limited to ±1 UV,
/// precision 1/127) — reduced quality, not an error.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DisplacementFormat {
    HalfFloat,
    Unorm8,
}

impl DisplacementFormat {
    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            DisplacementFormat::HalfFloat => wgpu::TextureFormat::Rgba16Float,
            DisplacementFormat::Unorm8 => wgpu::TextureFormat::Rgba8Unorm,
        }
    }

    /// Shader-side decode is `(raw - bias) * scale`; encode is the inverse.
    /// Float formats store displacement directly.
    pub fn decode_scale_bias(self) -> (f32, f32) {
        match self {
            DisplacementFormat::HalfFloat => (1.0, 0.0),
            DisplacementFormat::Unorm8 => (2.0, 0.5),
        }
    }
}

/// Holds the core wgpu resources shared across the entire application.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_name: String,
    /// Maximum texture dimension supported by this device.
    pub max_texture_dim: u32,
    /// Probed once at startup; every displacement target uses this format.
    pub displacement_format: DisplacementFormat,
}

impl GpuContext {
    /// Attempt to create a GPU context.  Tries hardware first, then falls
    /// back to a software rasterizer (`force_fallback_adapter`) so the warp
    /// pipeline works even without a real GPU.
    ///
    /// We use `pollster::block_on` because eframe doesn't expose its wgpu
    /// device to application code and the offscreen warp passes need one.
    pub fn new(preferred_gpu: &str) -> Option<Self> {
        if let Some(ctx) = pollster::block_on(Self::new_async(preferred_gpu, false)) {
            return Some(ctx);
        }
        eprintln!("[GPU] Hardware adapter unavailable — trying software fallback");
        pollster::block_on(Self::new_async(preferred_gpu, true))
    }

    async fn new_async(preferred_gpu: &str, force_fallback: bool) -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power = match preferred_gpu.to_lowercase().as_str() {
            "low power" | "integrated" => wgpu::PowerPreference::LowPower,
            "high performance" | "discrete" => wgpu::PowerPreference::HighPerformance,
            _ => wgpu::PowerPreference::HighPerformance,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: power,
                compatible_surface: None, // headless — offscreen passes only
                force_fallback_adapter: force_fallback,
            })
            .await?;

        let adapter_name = adapter.get_info().name.clone();
        let limits = adapter.limits();
        let displacement_format = probe_displacement_format(&adapter);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("WarpFE GPU"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits {
                        max_texture_dimension_2d: limits.max_texture_dimension_2d,
                        ..wgpu::Limits::downlevel_defaults()
                    },
                },
                None,
            )
            .await
            .ok()?;

        Some(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_name,
            max_texture_dim: limits.max_texture_dimension_2d,
            displacement_format,
        })
    }

    /// Shrink `(width, height)` to fit the device's texture limit while
    /// preserving aspect ratio.  Returns the input unchanged when it fits.
    pub fn clamp_dims(&self, width: u32, height: u32) -> (u32, u32) {
        clamp_dims_to(width, height, self.max_texture_dim)
    }

    /// Submit a single encoder's commands.
    pub fn submit_one(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// Half-float needs to be renderable AND filterable for the ping-pong
/// accumulation pass; anything less degrades to 8-bit.
fn probe_displacement_format(adapter: &wgpu::Adapter) -> DisplacementFormat {
    let feats = adapter.get_texture_format_features(wgpu::TextureFormat::Rgba16Float);
    let renderable = feats
        .allowed_usages
        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT);
    let filterable = feats
        .flags
        .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE);
    if renderable && filterable {
        DisplacementFormat::HalfFloat
    } else {
        eprintln!("[GPU] Rgba16Float unsupported — displacement degrades to 8-bit");
        DisplacementFormat::Unorm8
    }
}

pub(crate) fn clamp_dims_to(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dim || longest == 0 {
        return (width.max(1), height.max(1));
    }
    let scale = max_dim as f64 / longest as f64;
    (
        ((width as f64 * scale).round() as u32).clamp(1, max_dim),
        ((height as f64 * scale).round() as u32).clamp(1, max_dim),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_preserves_aspect_ratio() {
        let (w, h) = clamp_dims_to(16384, 8192, 8192);
        assert_eq!((w, h), (8192, 4096));
        let (w, h) = clamp_dims_to(3000, 9000, 4096);
        assert_eq!(h, 4096);
        assert_eq!(w, 1365); // 3000 * 4096/9000, rounded
    }

    #[test]
    fn clamp_leaves_small_images_alone() {
        assert_eq!(clamp_dims_to(640, 480, 8192), (640, 480));
    }

    #[test]
    fn clamp_never_returns_zero() {
        assert_eq!(clamp_dims_to(0, 0, 8192), (1, 1));
        let (w, h) = clamp_dims_to(100000, 1, 4096);
        assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn unorm8_scale_bias_covers_plus_minus_one() {
        let (scale, bias) = DisplacementFormat::Unorm8.decode_scale_bias();
        // raw 0.0 -> -1.0, raw 0.5 -> 0.0, raw 1.0 -> +1.0
        assert_eq!((0.0 - bias) * scale, -1.0);
        assert_eq!((0.5 - bias) * scale, 0.0);
        assert_eq!((1.0 - bias) * scale, 1.0);
    }
}
