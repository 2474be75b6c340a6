// ============================================================================
// WarpFE CLI — headless batch conversion via command-line arguments
// ============================================================================
//
// Usage examples:
//   warpfe --input photo.jpg --output photo.hdr
//   warpfe -i photo.png -o out.jpg --quality 85
//   warpfe -i *.jpg --output-dir converted/ --format hdr
//   warpfe -i scan.tiff -o small.png --width 1920
//
// No GUI is opened in CLI mode.  Everything runs synchronously on the
// current thread using CPU-only paths (no wgpu): with no strokes painted
// the displacement map is zero, so the HDR output here is the linearized
// source — byte-identical to what the GPU path produces for a zero map.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::io::{
    encode_and_write, load_image_rgba, srgb_image_to_linear_f32, write_radiance_hdr, SaveFormat,
};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// WarpFE headless image converter.
///
/// Convert between standard formats and Radiance HDR without opening the GUI.
#[derive(Parser, Debug)]
#[command(
    name = "warpfe",
    about = "WarpFE headless batch image converter",
    long_about = "Convert images between formats — including linear Radiance\n\
                  HDR (.hdr) output — without opening the GUI.  Supports PNG,\n\
                  JPEG, WEBP, BMP and TIFF input.\n\n\
                  Example:\n  \
                  warpfe --input photo.jpg --output photo.hdr\n  \
                  warpfe -i *.png --output-dir hdr/ --format hdr"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tiff, hdr.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Resize to this width before writing (aspect preserved unless --height
    /// is also given).
    #[arg(long, value_name = "PX")]
    pub width: Option<u32>,

    /// Resize to this height before writing (aspect preserved unless --width
    /// is also given).
    #[arg(long, value_name = "PX")]
    pub height: Option<u32>,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process
    /// arguments.  Used by `main()` to route before creating a window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());

    if let Some(dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "error: could not create output directory '{}': {}",
                dir.display(),
                e
            );
            return ExitCode::FAILURE;
        }
    }

    if args.width == Some(0) || args.height == Some(0) {
        eprintln!("error: --width/--height must be positive.");
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let output_path = match build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            save_format,
        ) {
            Some(p) => p,
            None => {
                eprintln!(
                    "  error: cannot determine output path for '{}'.",
                    input_path.display()
                );
                any_failure = true;
                continue;
            }
        };

        match run_one(
            input_path,
            &output_path,
            save_format,
            args.quality,
            args.width,
            args.height,
        ) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    format: SaveFormat,
    quality: u8,
    width: Option<u32>,
    height: Option<u32>,
) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let mut img = load_image_rgba(input).map_err(|e| format!("load failed: {}", e))?;

    // -- Step 2: Resize (optional) ---------------------------------------
    if width.is_some() || height.is_some() {
        let (w0, h0) = img.dimensions();
        let (w, h) = match (width, height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, ((h0 as u64 * w as u64) / w0.max(1) as u64).max(1) as u32),
            (None, Some(h)) => (((w0 as u64 * h as u64) / h0.max(1) as u64).max(1) as u32, h),
            (None, None) => unreachable!(),
        };
        if (w, h) != (w0, h0) {
            img = image::imageops::resize(&img, w, h, image::imageops::FilterType::CatmullRom);
        }
    }

    // -- Step 3: Save ----------------------------------------------------
    match format {
        SaveFormat::Hdr => {
            let (w, h) = img.dimensions();
            let linear = srgb_image_to_linear_f32(&img);
            write_radiance_hdr(output, w, h, &linear)
                .map_err(|e| format!("HDR save failed: {}", e))?;
        }
        _ => {
            encode_and_write(&img, output, format, quality)
                .map_err(|e| format!("save failed: {}", e))?;
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            // Literal path — use directly
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension.  Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return SaveFormat::from_extension(f);
    }
    if let Some(out) = output {
        return SaveFormat::from_path(out);
    }
    SaveFormat::Png
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_prefers_explicit_output() {
        let p = build_output_path(
            Path::new("a/photo.jpg"),
            Some(Path::new("out/result.png")),
            None,
            SaveFormat::Png,
        );
        assert_eq!(p, Some(PathBuf::from("out/result.png")));
    }

    #[test]
    fn output_path_derives_stem_in_output_dir() {
        let p = build_output_path(
            Path::new("a/photo.jpg"),
            None,
            Some(Path::new("converted")),
            SaveFormat::Hdr,
        );
        assert_eq!(p, Some(PathBuf::from("converted/photo.hdr")));
    }

    #[test]
    fn output_path_avoids_clobbering_input() {
        let p = build_output_path(Path::new("a/photo.png"), None, None, SaveFormat::Png);
        assert_eq!(p, Some(PathBuf::from("a/photo_out.png")));
    }

    #[test]
    fn format_parse_prefers_explicit_flag() {
        assert_eq!(
            parse_format(Some("hdr"), Some(Path::new("x.png"))),
            SaveFormat::Hdr
        );
        assert_eq!(parse_format(None, Some(Path::new("x.webp"))), SaveFormat::Webp);
        assert_eq!(parse_format(None, None), SaveFormat::Png);
    }
}
