// ============================================================================
// PixelFE CLI: headless selection transforms on image files
// ============================================================================
//
// Usage examples:
//   pixelfe -i sprite.png --select 8,8,16,16 --scale 2 -o big.png
//   pixelfe -i sheet.png --select 0,0,32,32 --rotate 90 --move 32,0 -o out.png
//   pixelfe -i "frames/*.png" --rotate 45 --rotation-mode rotsprite --output-dir rot/
//   pixelfe -i doc.pxs --select 4,4,10,10 --delete -o doc.pxs
//
// Every input goes through the same engine as interactive editing: select,
// lift, transform (each step baked and recorded), commit, save.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::canvas::{CanvasState, PixRect};
use crate::components::gesture::GestureController;
use crate::components::history::HistoryManager;
use crate::io::{SaveFormat, load_image_sync, save_document};
use crate::ops::resample::{RotationMode, ScaleFilter};
use crate::selection::SelectionMode;
use crate::settings::SelectionSettings;

#[derive(Parser, Debug)]
#[command(
    name = "pixelfe",
    version,
    about = "PixelFE headless floating-selection transformer",
    long_about = "Select a region of a pixel-art image, lift it, move / scale / rotate / flip\n\
                  it and commit it back, without opening an editor. Reads PNG, BMP, TGA\n\
                  and PXS project files; writes PNG, BMP, TGA or PXS.\n\n\
                  Example:\n  \
                  pixelfe -i sprite.png --select 8,8,16,16 --scale 2 --filter scale2x -o big.png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "frames/*.png").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing (keeps the input stem).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, bmp, tga, pxs. Inferred from --output when omitted.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Rectangle to select before transforming. Defaults to the whole image
    /// (or the selection stored in a .pxs project).
    #[arg(long, value_name = "X,Y,W,H")]
    pub select: Option<String>,

    /// Translate the floating selection by whole pixels.
    #[arg(long = "move", value_name = "DX,DY", allow_hyphen_values = true)]
    pub move_by: Option<String>,

    /// Scale factor, uniform or per axis.
    #[arg(long, value_name = "SX[,SY]")]
    pub scale: Option<String>,

    /// Scale filter: nearest, bilinear, epx, scale2x.
    #[arg(long, value_name = "FILTER")]
    pub filter: Option<String>,

    /// Clockwise rotation in degrees.
    #[arg(long, value_name = "DEG", allow_hyphen_values = true)]
    pub rotate: Option<f32>,

    /// Rotation sampling: nearest, rotsprite.
    #[arg(long, value_name = "MODE")]
    pub rotation_mode: Option<String>,

    /// Mirror the selection: h (horizontal) or v (vertical).
    #[arg(long, value_name = "h|v")]
    pub flip: Option<String>,

    /// Clear the selected pixels instead of transforming them.
    #[arg(long)]
    pub delete: bool,

    /// Settings file (defaults to the per-user selection.cfg).
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print per-file steps and timing.
    #[arg(short, long)]
    pub verbose: bool,
}

/// The transform pipeline parsed from the command line, shared by every file.
#[derive(Clone, Debug, Default, PartialEq)]
struct Pipeline {
    select: Option<PixRect>,
    move_by: Option<(i32, i32)>,
    scale: Option<(f32, f32)>,
    rotate: Option<f32>,
    flip: Option<bool>,
    delete: bool,
}

impl Pipeline {
    fn from_args(args: &CliArgs) -> Result<Self, String> {
        let select = match &args.select {
            Some(s) => {
                let [x, y, w, h] = parse_ints::<4>(s).ok_or_else(|| format!("invalid --select '{}'", s))?;
                if w <= 0 || h <= 0 {
                    return Err(format!("--select needs a positive width and height, got {}x{}", w, h));
                }
                Some(PixRect::new(x, y, w as u32, h as u32))
            }
            None => None,
        };
        let move_by = match &args.move_by {
            Some(s) => {
                let [dx, dy] = parse_ints::<2>(s).ok_or_else(|| format!("invalid --move '{}'", s))?;
                Some((dx, dy))
            }
            None => None,
        };
        let scale = match &args.scale {
            Some(s) => Some(parse_scale(s).ok_or_else(|| format!("invalid --scale '{}'", s))?),
            None => None,
        };
        let flip = match args.flip.as_deref().map(str::to_lowercase).as_deref() {
            None => None,
            Some("h") | Some("horizontal") => Some(true),
            Some("v") | Some("vertical") => Some(false),
            Some(other) => return Err(format!("invalid --flip '{}' (expected h or v)", other)),
        };
        Ok(Self { select, move_by, scale, rotate: args.rotate, flip, delete: args.delete })
    }

    fn transforms(&self) -> bool {
        self.move_by.is_some() || self.scale.is_some() || self.rotate.is_some() || self.flip.is_some()
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let pipeline = match Pipeline::from_args(&args) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let settings = load_settings(&args);

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

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
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

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), save_format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &pipeline, &settings, args.verbose) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  -> {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                log_err!("CLI: {}: {}", input_path.display(), e);
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn load_settings(args: &CliArgs) -> SelectionSettings {
    let mut settings = match args.settings.clone().or_else(SelectionSettings::settings_path) {
        Some(path) => SelectionSettings::load_from(&path),
        None => SelectionSettings::default(),
    };
    if let Some(f) = &args.filter {
        settings.scale_filter = ScaleFilter::from_name(f);
    }
    if let Some(m) = &args.rotation_mode {
        settings.rotation_mode = RotationMode::from_name(m);
    }
    settings
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    pipeline: &Pipeline,
    settings: &SelectionSettings,
    verbose: bool,
) -> Result<(), String> {
    let mut canvas = load_image_sync(input).map_err(|e| format!("load failed: {}", e))?;
    apply_pipeline(&mut canvas, pipeline, settings, verbose)?;
    save_document(&canvas, output).map_err(|e| format!("save failed: {}", e))
}

/// Drive the gesture controller through the requested steps and commit.
fn apply_pipeline(
    canvas: &mut CanvasState,
    pipeline: &Pipeline,
    settings: &SelectionSettings,
    verbose: bool,
) -> Result<(), String> {
    let mut controller = GestureController::new(settings.clone());
    let mut history = HistoryManager::new(settings.max_undo_steps).with_memory_limit(Some(settings.max_history_bytes()));

    if let Some(rect) = pipeline.select {
        controller.select_rect(canvas, &mut history, rect, SelectionMode::Replace);
        if !canvas.has_selection() {
            return Err(format!(
                "--select {},{},{},{} lies outside the {}x{} image",
                rect.x, rect.y, rect.w, rect.h, canvas.width, canvas.height
            ));
        }
    } else if !canvas.has_selection() && (pipeline.transforms() || pipeline.delete) {
        controller.select_all(canvas, &mut history);
    }

    if pipeline.delete {
        controller.delete(canvas, &mut history);
        if verbose {
            println!("  delete");
        }
        return Ok(());
    }

    if let Some((sx, sy)) = pipeline.scale {
        step(verbose, "scale", controller.set_scale(canvas, &mut history, sx, sy));
    }
    if let Some(deg) = pipeline.rotate {
        step(verbose, "rotate", controller.rotate_by(canvas, &mut history, deg));
    }
    if let Some(horizontal) = pipeline.flip {
        let done = if horizontal {
            controller.flip_horizontal(canvas, &mut history)
        } else {
            controller.flip_vertical(canvas, &mut history)
        };
        step(verbose, "flip", done);
    }
    if let Some((dx, dy)) = pipeline.move_by {
        step(verbose, "move", controller.nudge(canvas, &mut history, dx, dy));
    }

    if controller.is_floating() && !controller.commit(canvas, &mut history) {
        return Err("could not commit the floating selection".to_string());
    }
    if verbose {
        println!("  {} history step(s)", history.undo_count());
    }
    Ok(())
}

fn step(verbose: bool, name: &str, applied: bool) {
    if verbose {
        println!("  {}{}", name, if applied { "" } else { " (no change)" });
    }
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

/// `--format` wins, then the --output extension, then PNG.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    if let Some(f) = format_arg {
        return SaveFormat::from_extension(f).unwrap_or(SaveFormat::Png);
    }
    output.and_then(SaveFormat::from_path).unwrap_or(SaveFormat::Png)
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: next to the input with `_out` appended to the stem
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
    Some(parent.join(format!("{}_out.{}", stem, ext)))
}

/// Parse exactly `N` comma-separated integers.
fn parse_ints<const N: usize>(s: &str) -> Option<[i32; N]> {
    let mut out = [0; N];
    let mut parts = s.split(',');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(out)
}

/// `2` → (2, 2); `2,0.5` → (2, 0.5). Factors must be positive and finite.
fn parse_scale(s: &str) -> Option<(f32, f32)> {
    let mut parts = s.split(',').map(|p| p.trim().parse::<f32>());
    let sx = parts.next()?.ok()?;
    let sy = match parts.next() {
        Some(p) => p.ok()?,
        None => sx,
    };
    if parts.next().is_some() || !(sx.is_finite() && sy.is_finite() && sx > 0.0 && sy > 0.0) {
        return None;
    }
    Some((sx, sy))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["pixelfe", "-i", "in.png"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn parses_number_lists() {
        assert_eq!(parse_ints::<4>("1, 2,3,4"), Some([1, 2, 3, 4]));
        assert_eq!(parse_ints::<2>("-3,5"), Some([-3, 5]));
        assert_eq!(parse_ints::<2>("1,2,3"), None);
        assert_eq!(parse_ints::<4>("1,2"), None);
        assert_eq!(parse_scale("2"), Some((2.0, 2.0)));
        assert_eq!(parse_scale("2,0.5"), Some((2.0, 0.5)));
        assert_eq!(parse_scale("0"), None);
        assert_eq!(parse_scale("1,x"), None);
    }

    #[test]
    fn pipeline_from_args() {
        let p = Pipeline::from_args(&args(&["--select", "1,2,3,4", "--move", "-2,3", "--flip", "v"])).unwrap();
        assert_eq!(p.select, Some(PixRect::new(1, 2, 3, 4)));
        assert_eq!(p.move_by, Some((-2, 3)));
        assert_eq!(p.flip, Some(false));
        assert!(p.transforms());

        assert!(Pipeline::from_args(&args(&["--select", "0,0,0,4"])).is_err());
        assert!(Pipeline::from_args(&args(&["--flip", "diagonal"])).is_err());
    }

    #[test]
    fn output_path_priority() {
        let input = Path::new("art/sprite.png");
        assert_eq!(
            build_output_path(input, Some(Path::new("x.bmp")), None, SaveFormat::Png),
            Some(PathBuf::from("x.bmp"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out")), SaveFormat::Pxs),
            Some(PathBuf::from("out/sprite.pxs"))
        );
        assert_eq!(
            build_output_path(input, None, None, SaveFormat::Png),
            Some(PathBuf::from("art/sprite_out.png"))
        );
    }

    #[test]
    fn format_choice() {
        assert_eq!(parse_format(Some("TGA"), Some(Path::new("a.png"))), SaveFormat::Tga);
        assert_eq!(parse_format(None, Some(Path::new("a.pxs"))), SaveFormat::Pxs);
        assert_eq!(parse_format(Some("webp"), None), SaveFormat::Png);
        assert_eq!(parse_format(None, None), SaveFormat::Png);
    }

    #[test]
    fn pipeline_moves_selected_pixels() {
        let mut canvas = CanvasState::new(8, 8);
        canvas.layers[0].pixels.put_pixel(1, 1, [9, 9, 9, 255]);
        let p = Pipeline { select: Some(PixRect::new(0, 0, 3, 3)), move_by: Some((4, 2)), ..Default::default() };
        apply_pipeline(&mut canvas, &p, &SelectionSettings::default(), false).unwrap();
        assert_eq!(canvas.layers[0].pixels.get_pixel(1, 1), [0, 0, 0, 0]);
        assert_eq!(canvas.layers[0].pixels.get_pixel(5, 3), [9, 9, 9, 255]);
    }

    #[test]
    fn selection_off_canvas_is_an_error() {
        let mut canvas = CanvasState::new(4, 4);
        let p = Pipeline { select: Some(PixRect::new(10, 10, 2, 2)), scale: Some((2.0, 2.0)), ..Default::default() };
        assert!(apply_pipeline(&mut canvas, &p, &SelectionSettings::default(), false).is_err());
    }
}
