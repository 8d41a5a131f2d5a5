// ============================================================================
// ComicFE CLI: headless raster operations via command-line arguments
// ============================================================================
//
// Usage examples:
//   ComicFE remove-color scan.png --color "#ffffff" --tolerance 40 -o clean.png
//   ComicFE fill panels/*.png --at 120,80 --color "#ff0000" --output-dir filled/
//   ComicFE crop photo.jpg --rect 10,10,200,150 -o cropped.png
//   ComicFE draw --shape circle --from 50,50 --to 150,120 -o circle.png
//   ComicFE export story.cfe --output-dir pages/ --format jpg --quality 85
//   ComicFE settings --reset
//
// Image inputs are treated as an image layer placed at the origin with its
// natural size, so element-local coordinates are bitmap pixels. Flags left out
// fall back to the saved tool settings.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};

use crate::canvas::{CanvasElement, CanvasSpec, ElementPatch};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::io::{ExportFormat, FileResolver, ImageAsset, InlineOnly, decode_asset, decode_bytes, write_export};
use crate::ops::color::Rgb;
use crate::ops::crop::CropRect;
use crate::ops::export::export_pages;
use crate::ops::flood_fill::FillMode;
use crate::ops::shapes::{ShapeDescriptor, ShapeKind};
use crate::project::load_project;
use crate::settings::Settings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// ComicFE headless raster tools.
#[derive(Parser, Debug)]
#[command(
    name = "ComicFE",
    about = "ComicFE headless raster tools",
    long_about = "Remove colors, flood fill, crop and draw shapes on image files, or\n\
                  flatten the pages of a .cfe project, without opening the editor.\n\n\
                  Example:\n  \
                  ComicFE remove-color scan.png --color \"#ffffff\" -o clean.png\n  \
                  ComicFE export story.cfe --output-dir pages/ --format png"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Print per-file timing information.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Make every pixel close to a color transparent.
    RemoveColor {
        #[command(flatten)]
        io: BatchArgs,
        /// Color to clear (#rrggbb).
        #[arg(short, long)]
        color: Option<String>,
        /// Euclidean RGB distance (0–100 typical).
        #[arg(short, long)]
        tolerance: Option<f32>,
    },
    /// Recolor the region around a point, or every similar pixel.
    Fill {
        #[command(flatten)]
        io: BatchArgs,
        /// Seed point in image pixels, "x,y".
        #[arg(long, value_parser = parse_point, value_name = "X,Y")]
        at: (f32, f32),
        /// Fill color (#rrggbb).
        #[arg(short, long)]
        color: Option<String>,
        #[arg(short, long)]
        tolerance: Option<f32>,
        /// adjacent or all.
        #[arg(short, long)]
        mode: Option<FillMode>,
    },
    /// Cut each image to a rectangle.
    Crop {
        #[command(flatten)]
        io: BatchArgs,
        /// "x,y,width,height" in image pixels.
        #[arg(long, value_parser = parse_rect, value_name = "X,Y,W,H")]
        rect: CropRect,
    },
    /// Rasterize a single shape to a tight PNG.
    Draw {
        #[arg(short, long)]
        shape: Option<ShapeKind>,
        /// Start point in logical canvas units, "x,y".
        #[arg(long, value_parser = parse_point, value_name = "X,Y")]
        from: (f32, f32),
        /// End point in logical canvas units, "x,y".
        #[arg(long, value_parser = parse_point, value_name = "X,Y")]
        to: (f32, f32),
        #[arg(short, long)]
        color: Option<String>,
        #[arg(short, long)]
        thickness: Option<f32>,
        /// Fill rectangles and circles.
        #[arg(long)]
        fill: bool,
        /// Canvas preset, e.g. 1080x1080 or 1080x1350.
        #[arg(long)]
        canvas: Option<String>,
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
    /// Flatten every page of .cfe projects into page-N images.
    Export {
        /// Project file(s). Glob patterns accepted.
        #[arg(required = true, num_args = 1..)]
        input: Vec<String>,
        /// Directory the pages are written to. Defaults to the project's directory.
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        /// png or jpg.
        #[arg(short, long)]
        format: Option<ExportFormat>,
        /// JPEG quality (1–100).
        #[arg(short, long, value_name = "1-100")]
        quality: Option<u8>,
    },
    /// Show the saved tool settings, or reset them to the defaults.
    Settings {
        #[arg(long)]
        reset: bool,
    },
}

/// Inputs and destinations shared by the per-image commands.
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.png", "panels/*.jpg").
    #[arg(required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

fn parse_numbers(s: &str, n: usize) -> Result<Vec<f32>, String> {
    let values: Vec<f32> = s
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("'{}': {}", s, e))?;
    if values.len() != n {
        return Err(format!("'{}': expected {} comma-separated numbers", s, n));
    }
    Ok(values)
}

fn parse_point(s: &str) -> Result<(f32, f32), String> {
    let v = parse_numbers(s, 2)?;
    Ok((v[0], v[1]))
}

fn parse_rect(s: &str) -> Result<CropRect, String> {
    let v = parse_numbers(s, 4)?;
    Ok(CropRect { x: v[0], y: v[1], width: v[2], height: v[3] })
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the command and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let settings = Settings::load();
    let verbose = args.verbose;

    match args.command {
        Command::RemoveColor { io, color, tolerance } => {
            let hex = color.unwrap_or_else(|| settings.remover.target.to_hex());
            let tolerance = tolerance.unwrap_or(settings.remover.tolerance);
            run_batch(&io, verbose, |engine, element| {
                engine.remove_color(Some(element), &hex, tolerance)
            })
        }
        Command::Fill { io, at, color, tolerance, mode } => {
            let hex = color.unwrap_or_else(|| settings.fill.color.to_hex());
            let tolerance = tolerance.unwrap_or(settings.fill.tolerance);
            let mode = mode.unwrap_or(settings.fill.mode);
            run_batch(&io, verbose, |engine, element| {
                engine.flood_fill(Some(element), at.0, at.1, &hex, tolerance, mode)
            })
        }
        Command::Crop { io, rect } => run_batch(&io, verbose, |engine, element| {
            engine.crop(Some(element), Some(rect))
        }),
        Command::Draw { shape, from, to, color, thickness, fill, canvas, output } => {
            let mut drawing = settings.drawing.clone();
            if let Some(kind) = shape {
                drawing.shape = kind;
            }
            if let Some(t) = thickness {
                drawing.set_thickness(t);
            }
            let color = match color.as_deref().map(str::parse::<Rgb>).transpose() {
                Ok(c) => c.unwrap_or(drawing.color),
                Err(e) => return fail(&e.to_string()),
            };
            let canvas = match canvas.as_deref().map(str::parse::<CanvasSpec>).transpose() {
                Ok(c) => c.unwrap_or(settings.canvas),
                Err(e) => return fail(&e.to_string()),
            };
            let mut desc = ShapeDescriptor::begin(
                drawing.shape,
                from.0,
                from.1,
                color,
                drawing.thickness,
                fill || drawing.fill,
            );
            desc.update(to.0, to.1);
            match draw_one(&desc, canvas, &output) {
                Ok(()) => {
                    if verbose {
                        println!("  → {}", output.display());
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&e),
            }
        }
        Command::Export { input, output_dir, format, quality } => {
            let format = format.unwrap_or(settings.export_format);
            let quality = quality.unwrap_or(settings.export_quality);
            run_export(&input, output_dir.as_deref(), format, quality, verbose)
        }
        Command::Settings { reset } => {
            let settings = if reset {
                let defaults = Settings::default();
                defaults.save();
                defaults
            } else {
                settings
            };
            if let Some(path) = Settings::settings_path() {
                println!("# {}", path.display());
            }
            print!("{}", settings.to_config_string());
            ExitCode::SUCCESS
        }
    }
}

fn fail(msg: &str) -> ExitCode {
    eprintln!("error: {}", msg);
    log_err!("CLI: {}", msg);
    ExitCode::FAILURE
}

// ============================================================================
// Per-file processing pipelines
// ============================================================================

/// Apply `op` to every input image and write the patched bitmap.
fn run_batch<F>(args: &BatchArgs, verbose: bool, op: F) -> ExitCode
where
    F: Fn(&Engine, &CanvasElement) -> Result<ElementPatch, EngineError>,
{
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        return fail("no input files matched the given pattern(s).");
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        return fail(&format!(
            "{} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        ));
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        return fail(&format!("could not create output directory '{}': {}", dir.display(), e));
    }

    let engine = Engine::new(CanvasSpec::default(), InlineOnly);
    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let format = args
            .output
            .as_deref()
            .map(ExportFormat::from_extension)
            .unwrap_or(ExportFormat::Png);
        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        let result = image_element(input_path).and_then(|element| {
            let patch = op(&engine, &element).map_err(|e| e.to_string())?;
            let pixels = decode_asset(&patch.content, &InlineOnly).map_err(|e| e.to_string())?;
            write_export(&pixels, &output_path, format, 100).map_err(|e| e.to_string())
        });
        match result {
            Ok(()) => {
                if verbose || multi {
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

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

/// An image file as a layer at the origin, one logical unit per pixel.
fn image_element(path: &Path) -> Result<CanvasElement, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("load failed: {}", e))?;
    let img = decode_bytes(&bytes).map_err(|e| format!("load failed: {}", e))?;
    Ok(CanvasElement::image_at(
        ImageAsset::Inline(bytes),
        0.0,
        0.0,
        img.width() as f32,
        img.height() as f32,
    ))
}

fn draw_one(desc: &ShapeDescriptor, canvas: CanvasSpec, output: &Path) -> Result<(), String> {
    let engine = Engine::new(canvas, InlineOnly);
    let patch = engine
        .finish_drawing(desc)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "shape is too small to draw".to_string())?;
    let pixels = decode_asset(&patch.content, &InlineOnly).map_err(|e| e.to_string())?;
    write_export(&pixels, output, ExportFormat::Png, 100).map_err(|e| e.to_string())
}

fn run_export(
    patterns: &[String],
    output_dir: Option<&Path>,
    format: ExportFormat,
    quality: u8,
    verbose: bool,
) -> ExitCode {
    let inputs = resolve_inputs(patterns);
    if inputs.is_empty() {
        return fail("no project files matched the given pattern(s).");
    }

    let mut any_failure = false;
    for input_path in &inputs {
        let project_dir = input_path.parent().map(Path::to_path_buf);
        let stem = input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string());
        // Several projects into one directory get a subdirectory each.
        let dir = match output_dir {
            Some(d) if inputs.len() > 1 => d.join(&stem),
            Some(d) => d.to_path_buf(),
            None => project_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
        };

        let result = load_project(input_path)
            .map_err(|e| format!("load failed: {}", e))
            .and_then(|project| {
                std::fs::create_dir_all(&dir).map_err(|e| format!("{}: {}", dir.display(), e))?;
                let resolver = FileResolver::new(project_dir);
                export_pages(
                    &project.pages,
                    &project.canvas,
                    project.background,
                    &dir,
                    format,
                    quality,
                    &resolver,
                )
                .map_err(|e| e.to_string())
            });
        match result {
            Ok(paths) => {
                if verbose || inputs.len() > 1 {
                    println!("{}: {} page(s) → {}", input_path.display(), paths.len(), dir.display());
                }
            }
            Err(e) => {
                eprintln!("  error: {}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
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

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input with an `_out` suffix
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: ExportFormat,
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
    Some(parent.join(format!("{}_out.{}", stem, ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_points_and_rects() {
        assert_eq!(parse_point("12, 7.5"), Ok((12.0, 7.5)));
        assert!(parse_point("12").is_err());
        assert!(parse_point("a,b").is_err());
        assert_eq!(
            parse_rect("1,2,30,40"),
            Ok(CropRect { x: 1.0, y: 2.0, width: 30.0, height: 40.0 })
        );
    }

    #[test]
    fn output_paths() {
        let input = Path::new("shots/panel.jpg");
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out")), ExportFormat::Png),
            Some(PathBuf::from("out/panel.png"))
        );
        assert_eq!(
            build_output_path(input, None, None, ExportFormat::Png),
            Some(PathBuf::from("shots/panel_out.png"))
        );
        assert_eq!(
            build_output_path(input, Some(Path::new("x.jpg")), None, ExportFormat::Jpeg),
            Some(PathBuf::from("x.jpg"))
        );
    }

    #[test]
    fn subcommands_parse() {
        let args = CliArgs::try_parse_from([
            "ComicFE", "fill", "a.png", "--at", "3,4", "--mode", "all", "-o", "b.png",
        ])
        .unwrap();
        match args.command {
            Command::Fill { io, at, mode, color, .. } => {
                assert_eq!(io.input, vec!["a.png".to_string()]);
                assert_eq!(at, (3.0, 4.0));
                assert_eq!(mode, Some(FillMode::All));
                assert!(color.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(CliArgs::try_parse_from(["ComicFE", "crop", "a.png"]).is_err());
    }
}
