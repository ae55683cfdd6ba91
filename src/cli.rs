// ============================================================================
// LayerFE CLI: headless layer stacking via command-line arguments
// ============================================================================
//
// Usage examples:
//   layerfe -i base.png overlay.png --opacity 0.5 -o out.png
//   layerfe -i "shots/*.jpg" --width 1024 --height 768 --blend multiply -o stack.png
//   layerfe -i photo.png --resize 400x300 --rotate cw --flip h -o small.png
//   layerfe -i photo.png --crop 10,10,200,100 -o crop.png
//
// Every input becomes one layer fitted into the canvas. Transforms run on the
// whole stack in the order resize, crop, rotate, flip; the composite is then
// written as PNG.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use egui::{Rect, pos2, vec2};

use crate::canvas::BlendMode;
use crate::error::EditResult;
use crate::io;
use crate::ops::transform::Rotation;
use crate::project::EditorSession;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// LayerFE headless compositor.
#[derive(Parser, Debug)]
#[command(
    name = "layerfe",
    about = "LayerFE headless layer compositor",
    long_about = "Stack images as layers, apply canvas transforms and write the\n\
                  composite as PNG without opening an editor.\n\n\
                  Example:\n  \
                  layerfe -i base.png overlay.png --blend screen --opacity 0.7 -o out.png"
)]
pub struct CliArgs {
    /// Input file(s), bottom layer first. Glob patterns accepted (e.g. "*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output PNG path.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Canvas width. Defaults to the first image's width.
    #[arg(long, requires = "height")]
    pub width: Option<u32>,

    /// Canvas height. Defaults to the first image's height.
    #[arg(long, requires = "width")]
    pub height: Option<u32>,

    /// Resize the finished stack, e.g. "640x480".
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub resize: Option<(u32, u32)>,

    /// Crop the canvas, e.g. "10,10,200,100".
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_crop)]
    pub crop: Option<Rect>,

    /// Rotate the canvas: cw, ccw or 180.
    #[arg(long, value_name = "DIR", value_parser = parse_rotation)]
    pub rotate: Option<Rotation>,

    /// Flip the canvas: h (left-right) or v (top-bottom).
    #[arg(long, value_name = "AXIS", value_parser = parse_flip)]
    pub flip: Option<FlipAxis>,

    /// Blend mode for every input layer (normal, multiply, screen, ...).
    #[arg(long, value_name = "MODE", value_parser = parse_blend)]
    pub blend: Option<BlendMode>,

    /// Opacity 0.0–1.0 for every input layer.
    #[arg(long, value_name = "F")]
    pub opacity: Option<f32>,

    /// Print per-step timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

// ============================================================================
// Argument parsers
// ============================================================================

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
    let w = w.trim().parse::<u32>().map_err(|e| format!("bad width '{w}': {e}"))?;
    let h = h.trim().parse::<u32>().map_err(|e| format!("bad height '{h}': {e}"))?;
    Ok((w, h))
}

fn parse_crop(s: &str) -> Result<Rect, String> {
    let parts: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>().map_err(|e| format!("bad crop value '{p}': {e}")))
        .collect::<Result<_, _>>()?;
    match parts[..] {
        [x, y, w, h] => Ok(Rect::from_min_size(pos2(x, y), vec2(w, h))),
        _ => Err(format!("expected X,Y,W,H, got '{s}'")),
    }
}

fn parse_rotation(s: &str) -> Result<Rotation, String> {
    Rotation::from_name(s).ok_or_else(|| format!("unknown rotation '{s}' (use cw, ccw or 180)"))
}

fn parse_flip(s: &str) -> Result<FlipAxis, String> {
    match s.to_lowercase().as_str() {
        "h" | "horizontal" => Ok(FlipAxis::Horizontal),
        "v" | "vertical" => Ok(FlipAxis::Vertical),
        _ => Err(format!("unknown flip axis '{s}' (use h or v)")),
    }
}

fn parse_blend(s: &str) -> Result<BlendMode, String> {
    BlendMode::from_name(s).ok_or_else(|| format!("unknown blend mode '{s}'"))
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
/// `0` = composite written, `1` = anything failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let start = Instant::now();
    match run_stack(&args, &inputs) {
        Ok(()) => {
            if args.verbose {
                println!(
                    "  → {} ({:.0}ms)",
                    args.output.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("CLI run failed: {e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Processing pipeline
// ============================================================================

fn run_stack(args: &CliArgs, inputs: &[PathBuf]) -> EditResult<()> {
    // -- Step 1: Load ----------------------------------------------------
    let mut images = Vec::with_capacity(inputs.len());
    for path in inputs {
        if args.verbose {
            println!("[load] {}", path.display());
        }
        images.push(io::load_image_file(path)?);
    }

    // -- Step 2: Stack ---------------------------------------------------
    let mut settings = EditorSettings::load();
    let (width, height) = match (args.width, args.height) {
        (Some(w), Some(h)) => (w, h),
        _ => images.first().map(|(s, _)| s.dimensions()).unwrap_or((settings.default_width, settings.default_height)),
    };
    settings.default_width = width;
    settings.default_height = height;
    let mut session = EditorSession::new(settings)?;

    for (surface, name) in &images {
        let id = session.add_image_layer(surface, name)?;
        if let Some(mode) = args.blend {
            session.set_blend_mode(id, mode)?;
        }
        if let Some(opacity) = args.opacity {
            session.set_opacity(id, opacity)?;
        }
    }

    // -- Step 3: Transform -----------------------------------------------
    if let Some((w, h)) = args.resize {
        session.resize_image(w, h)?;
    }
    if let Some(rect) = args.crop {
        session.crop(rect)?;
    }
    if let Some(rotation) = args.rotate {
        session.rotate(rotation)?;
    }
    match args.flip {
        Some(FlipAxis::Horizontal) => session.flip_horizontal()?,
        Some(FlipAxis::Vertical) => session.flip_vertical()?,
        None => {}
    }

    // -- Step 4: Save ----------------------------------------------------
    let composite = session.composite()?;
    if args.verbose {
        println!(
            "[save] {} layer(s), {}×{}",
            session.document.layer_count(),
            composite.width(),
            composite.height()
        );
    }
    io::write_png(&args.output, &composite)
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
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_and_crop_parse() {
        assert_eq!(parse_size("640x480"), Ok((640, 480)));
        assert!(parse_size("640").is_err());
        let rect = parse_crop("1, 2, 30, 40").unwrap();
        assert_eq!(rect, Rect::from_min_size(pos2(1.0, 2.0), vec2(30.0, 40.0)));
        assert!(parse_crop("1,2,3").is_err());
    }

    #[test]
    fn transform_names_parse() {
        assert_eq!(parse_rotation("cw"), Ok(Rotation::Cw90));
        assert_eq!(parse_flip("V"), Ok(FlipAxis::Vertical));
        assert_eq!(parse_blend("multiply"), Ok(BlendMode::Multiply));
        assert!(parse_flip("z").is_err());
    }

    #[test]
    fn args_parse_from_command_line() {
        let args = CliArgs::try_parse_from([
            "layerfe", "-i", "a.png", "b.png", "-o", "out.png", "--rotate", "180", "--opacity", "0.5",
        ])
        .unwrap();
        assert_eq!(args.input, vec!["a.png", "b.png"]);
        assert_eq!(args.rotate, Some(Rotation::Half));
        assert_eq!(args.opacity, Some(0.5));
        assert!(CliArgs::try_parse_from(["layerfe", "-o", "out.png"]).is_err());
    }

    #[test]
    fn stack_is_written_as_png() {
        let dir = std::env::temp_dir().join(format!("layerfe-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("red.png");
        let output = dir.join("out.png");
        let red = crate::surface::PixelSurface::filled(8, 4, image::Rgba([255, 0, 0, 255])).unwrap();
        io::write_png(&input, &red).unwrap();

        let args = CliArgs::try_parse_from([
            "layerfe",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--rotate",
            "cw",
        ])
        .unwrap();
        run_stack(&args, &resolve_inputs(&args.input)).unwrap();
        let written = io::decode_image(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(written.dimensions(), (4, 8));
        assert_eq!(written.get_pixel(1, 1), image::Rgba([255, 0, 0, 255]));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
