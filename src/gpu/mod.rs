// ============================================================================
// GPU MODULE — displacement accumulation and warp rendering for WarpFE
// ============================================================================
//
// Architecture:
//   context.rs      — wgpu Device, Queue, adapter init + capability probing
//   shaders.rs      — all WGSL shader source (inline strings)
//   displacement.rs — ping-pong displacement buffer pair + original reference
//   brush.rs        — brush accumulation render pass
//   compositor.rs   — warp compositor (preview / standard / HDR) + readback
//   renderer.rs     — top-level WarpRenderer coordinator
// ============================================================================

pub mod brush;
pub mod compositor;
pub mod context;
pub mod displacement;
pub mod renderer;
pub mod shaders;

pub use renderer::WarpRenderer;

/// WGPU requires `bytes_per_row` in buffer copies to be a multiple of 256.
pub const COPY_BYTES_PER_ROW_ALIGNMENT: u32 = 256;

/// Round a row of `width` pixels at `bytes_per_pixel` up to the copy
/// alignment.  The RGBA8 path uses 4, the float HDR readback 16.
pub fn aligned_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let unaligned = width * bytes_per_pixel;
    let align = COPY_BYTES_PER_ROW_ALIGNMENT;
    (unaligned + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_alignment_rounds_up_to_256() {
        assert_eq!(aligned_bytes_per_row(64, 4), 256);
        assert_eq!(aligned_bytes_per_row(65, 4), 512);
        assert_eq!(aligned_bytes_per_row(100, 16), 1792);
        // Already aligned rows pass through unchanged.
        assert_eq!(aligned_bytes_per_row(128, 4), 512);
        assert_eq!(aligned_bytes_per_row(16, 16), 256);
    }
}
