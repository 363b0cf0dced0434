//! CLI binary for a3-stitch.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `StitchConfig` and prints a batch summary.

use a3_stitch::runner::tail_lines;
use a3_stitch::{
    check_tools, process_batch, BatchProgressCallback, BatchReport, DocumentError, DocumentReport,
    Orientation, ProgressCallback, SearchRegion, Stage, StitchConfig,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Lines of tool stderr shown per failure without `--debug`.
const STDERR_TAIL: usize = 5;

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the documents of the batch plus
/// a log line per finished document. Documents finish out of order when
/// `--jobs` > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-document start time and display name.
    running: Mutex<HashMap<usize, (Instant, String)>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} scans  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Stitching");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            running: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed(&self, index: usize) -> f64 {
        self.running
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|(t, _)| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Stitching {total} scan(s)…"))
        ));
    }

    fn on_document_start(&self, index: usize, input: &Path, _total: usize) {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        if let Ok(mut m) = self.running.lock() {
            m.insert(index, (Instant::now(), name));
        }
    }

    fn on_stage(&self, index: usize, stage: Stage) {
        let name = self
            .running
            .lock()
            .ok()
            .and_then(|m| m.get(&index).map(|(_, n)| n.clone()))
            .unwrap_or_default();
        self.bar.set_message(format!("{name}: {stage}"));
    }

    fn on_document_complete(&self, report: &DocumentReport, _total: usize) {
        let secs = self.elapsed(report.index);
        let detail = report
            .outputs
            .as_ref()
            .map(|o| format!("{}x{}", o.width, o.height))
            .unwrap_or_default();
        self.bar.println(format!(
            "  {} {:<28} {:<12} {}",
            green("✓"),
            report.input.display(),
            dim(&detail),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, report: &DocumentReport, error: &DocumentError, _total: usize) {
        let secs = self.elapsed(report.index);
        let first = error.message.lines().next().unwrap_or_default();
        // Truncate very long error messages to keep output tidy.
        let msg = if first.chars().count() > 80 {
            format!("{}\u{2026}", first.chars().take(79).collect::<String>())
        } else {
            first.to_string()
        };
        self.bar.println(format!(
            "  {} {:<28} {}  {}",
            red("✗"),
            report.input.display(),
            red(&format!("[{}] {msg}", error.stage)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Stitch one scan; 131-A3.png and 131-A3-square.png land next to it
  a3stitch 131.pdf

  # A whole folder, four at a time, results in ./out
  a3stitch -j 4 -o out scans/*.pdf

  # Keep page images, macro and raw stitch output for inspection
  a3stitch --keep-files --debug 131.pdf

  # Pages stacked top/bottom instead of side by side
  a3stitch --orientation vertical --band 0.3 poster.pdf

  # Check that Fiji, ImageMagick and pdfium are usable
  a3stitch --check-tools

OUTPUT FILES (per input <name>.pdf):
  <name>-A3.png          stitched, level-adjusted image
  <name>-A3-square.png   the same, centred on a square canvas
  <name>-1.png, <name>-2.png, <name>-stitch.ijm, <name>-stitched.png
                         intermediates, removed unless --keep-files

ENVIRONMENT VARIABLES:
  A3STITCH_FIJI           Fiji launcher (default ImageJ-linux64)
  A3STITCH_MAGICK         ImageMagick executable (default magick)
  A3STITCH_PDFIUM_LIB     Explicit libpdfium path
  PDFIUM_LIB_PATH         Same, read by the library when no option is given
  RUST_LOG                Overrides the log filter chosen by --debug/--quiet
"#;

/// Reassemble A3 sheets from two-page A4 scans.
#[derive(Parser, Debug)]
#[command(
    name = "a3stitch",
    version,
    about = "Reassemble A3 sheets from two-page A4 scans",
    long_about = "Reassemble A3 sheets from two-page PDF scans: extract both pages, rotate the \
second by 180°, stitch them with Fiji's pairwise stitching plugin, normalise levels with \
ImageMagick and write a full-size and a square PNG.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Two-page PDF scans to process.
    #[arg(required_unless_present = "check_tools")]
    inputs: Vec<PathBuf>,

    /// Keep intermediate files (page images, macro, raw stitch output).
    #[arg(long, env = "A3STITCH_KEEP_FILES")]
    keep_files: bool,

    /// Enable DEBUG-level logs and print full tool output on failure.
    #[arg(long, env = "A3STITCH_DEBUG")]
    debug: bool,

    /// Number of scans processed at once.
    #[arg(short, long, env = "A3STITCH_JOBS", default_value_t = 2,
          value_parser = clap::value_parser!(u16).range(1..))]
    jobs: u16,

    /// Rendering DPI (72–600).
    #[arg(long, env = "A3STITCH_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Directory for the final images (default: next to each input).
    #[arg(short, long, env = "A3STITCH_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Directory for intermediates (default: the output directory).
    #[arg(long, env = "A3STITCH_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Fiji / ImageJ launcher used for stitching.
    #[arg(long, env = "A3STITCH_FIJI", default_value = "ImageJ-linux64")]
    fiji: PathBuf,

    /// ImageMagick executable used for level adjustment.
    #[arg(long, env = "A3STITCH_MAGICK", default_value = "magick")]
    magick: PathBuf,

    /// Explicit pdfium shared library.
    #[arg(long, env = "A3STITCH_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Stitch timeout in seconds.
    #[arg(long, env = "A3STITCH_STITCH_TIMEOUT", default_value_t = 600)]
    stitch_timeout: u64,

    /// Level adjustment timeout in seconds.
    #[arg(long, env = "A3STITCH_LEVELS_TIMEOUT", default_value_t = 120)]
    levels_timeout: u64,

    /// How the two halves lie on the sheet.
    #[arg(long, env = "A3STITCH_ORIENTATION", value_enum, default_value = "horizontal")]
    orientation: OrientationArg,

    /// Fraction of each page along the joining edge searched for overlap.
    #[arg(long, env = "A3STITCH_BAND", default_value_t = 0.25)]
    band: f32,

    /// Scale the square variant to this side length in pixels.
    #[arg(long, env = "A3STITCH_SQUARE_SIZE")]
    square_size: Option<u32>,

    /// Square canvas colour as RRGGBB or RRGGBBAA hex.
    #[arg(long, env = "A3STITCH_BACKGROUND", default_value = "ffffff",
          value_parser = parse_background)]
    background: [u8; 4],

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "A3STITCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "A3STITCH_NO_PROGRESS")]
    no_progress: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "A3STITCH_QUIET")]
    quiet: bool,

    /// Probe the external tools and exit.
    #[arg(long)]
    check_tools: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OrientationArg {
    Horizontal,
    Vertical,
}

impl From<OrientationArg> for Orientation {
    fn from(v: OrientationArg) -> Self {
        match v {
            OrientationArg::Horizontal => Orientation::Horizontal,
            OrientationArg::Vertical => Orientation::Vertical,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.check_tools;
    let filter = if cli.debug {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Tool probe ───────────────────────────────────────────────────────
    if cli.check_tools {
        let statuses = check_tools(&config).await;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&statuses).context("Failed to serialise tool status")?
            );
        } else {
            for s in &statuses {
                let location = s
                    .location
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(search)".into());
                println!(
                    "{} {:<7} {:<32} {}",
                    if s.available { green("✓") } else { red("✗") },
                    s.name,
                    location,
                    dim(&s.detail)
                );
            }
        }
        let all_ok = statuses.iter().all(|s| s.available);
        return Ok(if all_ok {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let report = process_batch(&cli.inputs, &config).await;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    }
    if !cli.quiet {
        print_summary(&report, cli.debug);
    } else {
        // Failures are never silent.
        print_failures(&report, cli.debug);
    }

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Map CLI args to `StitchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<StitchConfig> {
    let mut builder = StitchConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.jobs as usize)
        .keep_files(cli.keep_files)
        .fiji_program(&cli.fiji)
        .magick_program(&cli.magick)
        .stitch_timeout_secs(cli.stitch_timeout)
        .levels_timeout_secs(cli.levels_timeout)
        .search_region(SearchRegion {
            orientation: cli.orientation.into(),
            band_fraction: cli.band,
        })
        .square_background(cli.background);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(side) = cli.square_size {
        builder = builder.square_size(side);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--background` hex into RGBA.
fn parse_background(s: &str) -> Result<[u8; 4], String> {
    let hex = s.trim().trim_start_matches('#');
    if !(hex.len() == 6 || hex.len() == 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("expected RRGGBB or RRGGBBAA hex, got '{s}'"));
    }
    let mut rgba = [255u8; 4];
    for (i, slot) in rgba.iter_mut().enumerate().take(hex.len() / 2) {
        *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|e| e.to_string())?;
    }
    Ok(rgba)
}

fn print_summary(report: &BatchReport, debug: bool) {
    for doc in report.succeeded() {
        if let Some(ref out) = doc.outputs {
            eprintln!(
                "{} {}  →  {}  {}",
                green("✔"),
                doc.input.display(),
                bold(&out.final_image.display().to_string()),
                dim(&format!("{}x{}, square {}", out.width, out.height, out.square_side)),
            );
        }
        print_cleanup(doc);
    }
    print_failures(report, debug);

    let total = report.documents.len();
    let ok = report.success_count();
    eprintln!(
        "{} {}/{} scans stitched in {:.1}s",
        if ok == total { green("✔") } else { cyan("⚠") },
        bold(&ok.to_string()),
        total,
        report.total_duration_ms as f64 / 1000.0
    );
}

fn print_failures(report: &BatchReport, debug: bool) {
    for doc in report.failed() {
        let Some(ref err) = doc.error else { continue };
        eprintln!(
            "{} {}  {} {}",
            red("✘"),
            doc.input.display(),
            red(&format!("[{}]", err.stage)),
            err.message
        );
        if debug {
            if let Some(ref out) = err.stdout {
                eprintln!("{}\n{}", dim("── stdout ──"), out.trim_end());
            }
            if let Some(ref e) = err.stderr {
                eprintln!("{}\n{}", dim("── stderr ──"), e.trim_end());
            }
        } else if let Some(ref e) = err.stderr {
            eprintln!("{}", dim(&tail_lines(e, STDERR_TAIL)));
        }
        print_cleanup(doc);
    }
}

fn print_cleanup(doc: &DocumentReport) {
    for w in &doc.cleanup_warnings {
        eprintln!("  {} {}", cyan("⚠"), w);
    }
    if !doc.kept_files.is_empty() {
        eprintln!(
            "  {}",
            dim(&format!("kept {} intermediate file(s)", doc.kept_files.len()))
        );
    }
}
