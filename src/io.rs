// ============================================================================
// IO — image decode, standard-format encode, Radiance RGBE writer, dialogs
// ============================================================================
//
// Everything here is CPU-side.  The GPU export path hands its readback
// pixels to `encode_and_write` / `write_radiance_hdr`; the headless CLI
// reuses the same functions so GUI and batch output are byte-identical.

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use rayon::prelude::*;
use rfd::FileDialog;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

// ============================================================================
// LOADING
// ============================================================================

/// Decode any supported image file into an sRGB RGBA8 raster.
///
/// The GPU pipeline assumes display-referred sRGB input; the `image` crate
/// delivers exactly that for the formats we enable.  ICC-profiled and HEIF
/// sources are a collaborator concern, not handled here.
pub fn load_image_rgba(path: &Path) -> Result<RgbaImage, String> {
    let img = image::open(path).map_err(|e| format!("decode failed: {}", e))?;
    Ok(img.into_rgba8())
}

// ============================================================================
// STANDARD EXPORT ENCODING
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SaveFormat {
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tiff,
    /// Radiance RGBE — routed to `write_radiance_hdr`, not `encode_and_write`.
    Hdr,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tiff => "tiff",
            SaveFormat::Hdr => "hdr",
        }
    }

    /// Infer the format from a file extension, defaulting to PNG.
    pub fn from_extension(ext: &str) -> SaveFormat {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => SaveFormat::Jpeg,
            "webp" => SaveFormat::Webp,
            "bmp" => SaveFormat::Bmp,
            "tiff" | "tif" => SaveFormat::Tiff,
            "hdr" => SaveFormat::Hdr,
            _ => SaveFormat::Png,
        }
    }

    pub fn from_path(path: &Path) -> SaveFormat {
        Self::from_extension(
            path.extension().and_then(|e| e.to_str()).unwrap_or(""),
        )
    }
}

/// Encode an RGBA8 bitmap to `path` in the given standard format.
///
/// `quality` applies to JPEG only (1–100).  HDR is rejected here — callers
/// must route float pixels through `write_radiance_hdr` instead.
pub fn encode_and_write(
    img: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
) -> Result<(), String> {
    if format == SaveFormat::Hdr {
        return Err("HDR output requires linear float pixels — use write_radiance_hdr".into());
    }

    let file = File::create(path).map_err(|e| format!("create '{}': {}", path.display(), e))?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            let encoder = PngEncoder::new(&mut writer);
            #[allow(deprecated)]
            encoder
                .encode(img.as_raw(), img.width(), img.height(), image::ColorType::Rgba8)
                .map_err(|e| format!("PNG encode failed: {}", e))?;
        }
        SaveFormat::Jpeg => {
            // JPEG has no alpha — flatten onto opaque before encoding.
            let rgb_image = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder
                .encode(
                    rgb_image.as_raw(),
                    rgb_image.width(),
                    rgb_image.height(),
                    image::ColorType::Rgb8,
                )
                .map_err(|e| format!("JPEG encode failed: {}", e))?;
        }
        SaveFormat::Webp => {
            let dyn_img = DynamicImage::ImageRgba8(img.clone());
            dyn_img
                .save(path)
                .map_err(|e| format!("WEBP encode failed: {}", e))?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder
                .encode(img.as_raw(), img.width(), img.height(), image::ColorType::Rgba8)
                .map_err(|e| format!("BMP encode failed: {}", e))?;
        }
        SaveFormat::Tiff => {
            // TiffEncoder needs Seek; encode through a cursor, then write out.
            let mut buf = std::io::Cursor::new(Vec::new());
            image::codecs::tiff::TiffEncoder::new(&mut buf)
                .write_image(
                    img.as_raw(),
                    img.width(),
                    img.height(),
                    image::ColorType::Rgba8,
                )
                .map_err(|e| format!("TIFF encode failed: {}", e))?;
            writer
                .write_all(buf.get_ref())
                .map_err(|e| format!("TIFF write failed: {}", e))?;
        }
        SaveFormat::Hdr => unreachable!("rejected above"),
    }

    writer
        .flush()
        .map_err(|e| format!("write '{}': {}", path.display(), e))
}

// ============================================================================
// RADIANCE RGBE (.hdr) WRITER
// ============================================================================
//
// Flat (non-run-length-encoded) RGBE, scanlines top-to-bottom as declared
// by the `-Y <height>` resolution line.  The byte layout is fixed; the
// round-trip tests below pin it.

/// Encode one linear RGB pixel as an RGBE quadruplet.
///
/// `max < 1e-32` maps to (0,0,0,0).  Otherwise the shared exponent is
/// `floor(log2(max)) + 1` clamped to [-128, 127], each mantissa is
/// `round(channel * 2^-e * 256)` clamped to a byte, and the stored
/// exponent byte is `e + 128`.
pub fn rgbe_encode(r: f32, g: f32, b: f32) -> [u8; 4] {
    let max = r.max(g).max(b);
    if max < 1e-32 {
        return [0, 0, 0, 0];
    }
    let exponent = (max.log2().floor() + 1.0).clamp(-128.0, 127.0);
    let scale = (-exponent).exp2() * 256.0;
    [
        (r * scale).round().clamp(0.0, 255.0) as u8,
        (g * scale).round().clamp(0.0, 255.0) as u8,
        (b * scale).round().clamp(0.0, 255.0) as u8,
        (exponent as i32 + 128) as u8,
    ]
}

/// Serialize a linear RGBA float buffer (row-major, top-to-bottom) as a
/// Radiance `.hdr` byte stream.  Alpha is ignored.
pub fn radiance_hdr_bytes(width: u32, height: u32, pixels: &[f32]) -> Result<Vec<u8>, String> {
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        return Err(format!(
            "HDR pixel buffer mismatch: expected {} floats, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut out = Vec::with_capacity(128 + expected);
    out.extend_from_slice(b"#?RADIANCE\n");
    out.extend_from_slice(b"# Written by WarpFE\n");
    out.extend_from_slice(b"FORMAT=32-bit_rle_rgbe\n");
    out.extend_from_slice(b"EXPOSURE=1.0\n");
    out.extend_from_slice(b"GAMMA=1.0\n");
    out.extend_from_slice(b"\n");
    out.extend_from_slice(format!("-Y {} +X {}\n", height, width).as_bytes());
    out.extend_from_slice(b"\n");

    // Rows are independent — encode them in parallel, then splice in order.
    let row_floats = width as usize * 4;
    let rows: Vec<Vec<u8>> = pixels
        .par_chunks(row_floats)
        .map(|row| {
            let mut encoded = Vec::with_capacity(row_floats);
            for px in row.chunks(4) {
                encoded.extend_from_slice(&rgbe_encode(
                    px[0].max(0.0),
                    px[1].max(0.0),
                    px[2].max(0.0),
                ));
            }
            encoded
        })
        .collect();
    for row in rows {
        out.extend_from_slice(&row);
    }

    Ok(out)
}

/// Write a linear RGBA float buffer to `path` as Radiance `.hdr`.
pub fn write_radiance_hdr(
    path: &Path,
    width: u32,
    height: u32,
    pixels: &[f32],
) -> Result<(), String> {
    let bytes = radiance_hdr_bytes(width, height, pixels)?;
    std::fs::write(path, bytes).map_err(|e| format!("write '{}': {}", path.display(), e))
}

// ============================================================================
// sRGB <-> LINEAR
// ============================================================================
//
// CPU mirror of the conversion pair in the warp shader (gpu/shaders.rs).
// Used by the headless HDR path and the tests; keep the two in sync.

pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Convert an sRGB RGBA8 raster to a linear RGBA f32 buffer (alpha copied
/// through unchanged).  This is the zero-displacement HDR export: with no
/// strokes the GPU path produces exactly these values.
pub fn srgb_image_to_linear_f32(img: &RgbaImage) -> Vec<f32> {
    img.as_raw()
        .par_chunks(4)
        .flat_map_iter(|px| {
            [
                srgb_to_linear(px[0] as f32 / 255.0),
                srgb_to_linear(px[1] as f32 / 255.0),
                srgb_to_linear(px[2] as f32 / 255.0),
                px[3] as f32 / 255.0,
            ]
        })
        .collect()
}

// ============================================================================
// FILE DIALOGS
// ============================================================================

/// Wraps the native open/save dialogs and remembers the last-used paths so
/// exports default next to the source image with its extension.
pub struct FileHandler {
    pub current_path: Option<PathBuf>,
}

impl FileHandler {
    pub fn new() -> Self {
        Self { current_path: None }
    }

    /// Open-image dialog.  Returns the decoded raster and its path.
    pub fn open_image(&mut self) -> Option<(RgbaImage, PathBuf)> {
        let path = FileDialog::new()
            .add_filter(
                "Images",
                &["png", "jpg", "jpeg", "webp", "bmp", "tif", "tiff"],
            )
            .pick_file()?;

        match load_image_rgba(&path) {
            Ok(img) => {
                self.current_path = Some(path.clone());
                Some((img, path))
            }
            Err(e) => {
                eprintln!("[io] open failed: {}", e);
                None
            }
        }
    }

    /// Save dialog for the standard export.  Defaults to the source file's
    /// stem with a `_warped` suffix and the source format's extension.
    pub fn pick_export_path(&self, hdr: bool) -> Option<PathBuf> {
        let (stem, ext) = match &self.current_path {
            Some(p) => (
                p.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "untitled".into()),
                if hdr {
                    "hdr".to_string()
                } else {
                    SaveFormat::from_path(p).extension().to_string()
                },
            ),
            None => ("untitled".into(), if hdr { "hdr".into() } else { "png".into() }),
        };

        let mut dialog = FileDialog::new().set_file_name(format!("{}_warped.{}", stem, ext));
        if hdr {
            dialog = dialog.add_filter("Radiance HDR", &["hdr"]);
        } else {
            dialog = dialog.add_filter("Images", &["png", "jpg", "jpeg", "webp", "bmp", "tiff"]);
        }
        if let Some(dir) = self.current_path.as_ref().and_then(|p| p.parent()) {
            dialog = dialog.set_directory(dir);
        }
        dialog.save_file()
    }
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgbe_black_is_all_zero() {
        assert_eq!(rgbe_encode(0.0, 0.0, 0.0), [0, 0, 0, 0]);
        assert_eq!(rgbe_encode(1e-38, 0.0, 0.0), [0, 0, 0, 0]);
    }

    #[test]
    fn rgbe_bright_red_pixel() {
        // max = 4.0 -> exponent = floor(log2 4) + 1 = 3, scale = 2^-3 * 256 = 32
        // r mantissa = round(4 * 32) = 128, stored exponent = 3 + 128 = 131
        assert_eq!(rgbe_encode(4.0, 0.0, 0.0), [128, 0, 0, 131]);
    }

    #[test]
    fn rgbe_unit_white() {
        // max = 1.0 -> exponent = 1, scale = 128; mantissas 128 each.
        assert_eq!(rgbe_encode(1.0, 1.0, 1.0), [128, 128, 128, 129]);
    }

    #[test]
    fn hdr_stream_matches_template() {
        // 2x2: bright red, black, mid gray, green.
        let px = [
            4.0, 0.0, 0.0, 1.0, //
            0.0, 0.0, 0.0, 1.0, //
            0.5, 0.5, 0.5, 1.0, //
            0.0, 1.0, 0.0, 1.0,
        ];
        let bytes = radiance_hdr_bytes(2, 2, &px).unwrap();

        let header = b"#?RADIANCE\n# Written by WarpFE\nFORMAT=32-bit_rle_rgbe\n\
EXPOSURE=1.0\nGAMMA=1.0\n\n-Y 2 +X 2\n\n";
        assert_eq!(&bytes[..header.len()], &header[..]);

        let body = &bytes[header.len()..];
        assert_eq!(body.len(), 4 * 4);
        assert_eq!(&body[0..4], &[128, 0, 0, 131]); // bright red
        assert_eq!(&body[4..8], &[0, 0, 0, 0]); // black is exactly zero
        assert_eq!(&body[12..16], &rgbe_encode(0.0, 1.0, 0.0));
    }

    #[test]
    fn hdr_rejects_wrong_buffer_length() {
        assert!(radiance_hdr_bytes(2, 2, &[0.0; 3]).is_err());
    }

    #[test]
    fn srgb_linear_round_trip() {
        for i in 0..=255u32 {
            let c = i as f32 / 255.0;
            let back = linear_to_srgb(srgb_to_linear(c));
            assert!((back - c).abs() < 1e-5, "channel {} drifted: {}", i, back);
        }
    }

    #[test]
    fn srgb_endpoints_are_exact() {
        assert_eq!(srgb_to_linear(0.0), 0.0);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn format_inference_from_extension() {
        assert_eq!(SaveFormat::from_extension("JPG"), SaveFormat::Jpeg);
        assert_eq!(SaveFormat::from_extension("hdr"), SaveFormat::Hdr);
        assert_eq!(SaveFormat::from_extension("unknown"), SaveFormat::Png);
        assert_eq!(
            SaveFormat::from_path(Path::new("photo.webp")),
            SaveFormat::Webp
        );
    }
}
