//! Fakes shared by the unit tests: a rasteriser that needs no pdfium and a
//! tool runner that imitates Fiji and ImageMagick on small PNGs.

use crate::error::PipelineError;
use crate::pipeline::extract::{PageRasterizer, RenderSettings};
use crate::runner::{ExternalToolRunner, ToolError, ToolInvocation, ToolOutput};
use async_trait::async_trait;
use image::{imageops, DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Columns the fake stitcher treats as overlap between the two pages.
pub const FAKE_OVERLAP: u32 = 4;

pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb(rgb)))
}

/// Write a file that passes the `%PDF` magic check. The body is read by
/// [`FakeRasterizer::from_content`]: `pages=N` and `encrypted` markers.
pub fn write_fake_pdf_with(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("%PDF-1.7\n{body}\n%%EOF\n")).unwrap();
    path
}

pub fn write_fake_pdf(dir: &Path, name: &str) -> PathBuf {
    write_fake_pdf_with(dir, name, "pages=2")
}

enum RasterMode {
    Fixed(Vec<DynamicImage>),
    Encrypted,
    FromContent,
}

pub struct FakeRasterizer {
    mode: RasterMode,
    calls: AtomicUsize,
}

impl FakeRasterizer {
    pub fn pages(pages: Vec<DynamicImage>) -> Self {
        Self::with_mode(RasterMode::Fixed(pages))
    }

    pub fn encrypted() -> Self {
        Self::with_mode(RasterMode::Encrypted)
    }

    /// Page count and encryption are read from the fake PDF body; page `i`
    /// is `40 + i` pixels wide and 60 high.
    pub fn from_content() -> Self {
        Self::with_mode(RasterMode::FromContent)
    }

    fn with_mode(mode: RasterMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageRasterizer for FakeRasterizer {
    fn rasterize(
        &self,
        pdf_path: &Path,
        _settings: &RenderSettings,
    ) -> Result<Vec<DynamicImage>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            RasterMode::Fixed(pages) => Ok(pages.clone()),
            RasterMode::Encrypted => Err(PipelineError::Encrypted {
                path: pdf_path.to_path_buf(),
            }),
            RasterMode::FromContent => {
                let body = std::fs::read_to_string(pdf_path).unwrap_or_default();
                if body.contains("encrypted") {
                    return Err(PipelineError::Encrypted {
                        path: pdf_path.to_path_buf(),
                    });
                }
                let pages = body
                    .split_whitespace()
                    .find_map(|w| w.strip_prefix("pages="))
                    .and_then(|n| n.parse::<u32>().ok())
                    .unwrap_or(0);
                Ok((0..pages)
                    .map(|i| solid(40 + i, 60, [20 * i as u8, 100, 200]))
                    .collect())
            }
        }
    }
}

/// How one fake tool behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolBehaviour {
    /// Produce the expected output and exit 0.
    Succeed,
    /// Exit with this code after printing to stderr.
    Exit(i32),
    /// Exit 0 without writing anything.
    NoOutput,
    /// Behave like a hung process that hit its timeout.
    Hang,
}

/// Imitates both external tools and records every invocation.
pub struct FakeRunner {
    stitch: ToolBehaviour,
    levels: ToolBehaviour,
    invocations: Mutex<Vec<ToolInvocation>>,
    macros: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new(stitch: ToolBehaviour, levels: ToolBehaviour) -> Self {
        Self {
            stitch,
            levels,
            invocations: Mutex::new(Vec::new()),
            macros: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(ToolBehaviour::Succeed, ToolBehaviour::Succeed)
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Macro sources seen by the fake stitcher, in call order.
    pub fn macros(&self) -> Vec<String> {
        self.macros.lock().unwrap().clone()
    }

    fn finish(behaviour: ToolBehaviour, inv: &ToolInvocation, produce: impl FnOnce()) -> Result<ToolOutput, ToolError> {
        match behaviour {
            ToolBehaviour::Succeed => {
                produce();
                Ok(ToolOutput {
                    exit_code: Some(0),
                    stdout: "done".into(),
                    stderr: String::new(),
                })
            }
            ToolBehaviour::Exit(code) => Ok(ToolOutput {
                exit_code: Some(code),
                stdout: "partial log".into(),
                stderr: format!("fake failure with code {code}"),
            }),
            ToolBehaviour::NoOutput => Ok(ToolOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }),
            ToolBehaviour::Hang => Err(ToolError::Timeout {
                program: inv.program.display().to_string(),
                timeout: Duration::from_secs(1),
            }),
        }
    }

    fn run_stitch(&self, inv: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let macro_path = inv
            .args
            .iter()
            .position(|a| a == "-macro")
            .and_then(|i| inv.args.get(i + 1))
            .expect("stitch invocation carries -macro <path>");
        let source = std::fs::read_to_string(macro_path).expect("macro file exists");
        self.macros.lock().unwrap().push(source.clone());

        let opened: Vec<String> = source
            .lines()
            .filter_map(|l| quoted_after(l, "open(\""))
            .collect();
        let output = source
            .lines()
            .find_map(|l| quoted_after(l, "saveAs(\"PNG\", \""))
            .expect("macro saves a PNG");

        Self::finish(self.stitch, inv, || {
            let left = image::open(&opened[0]).unwrap().to_rgb8();
            let right = image::open(&opened[1]).unwrap().to_rgb8();
            let width = left.width() + right.width() - FAKE_OVERLAP;
            let height = left.height().max(right.height());
            let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
            imageops::overlay(&mut canvas, &right, (left.width() - FAKE_OVERLAP) as i64, 0);
            imageops::overlay(&mut canvas, &left, 0, 0);
            canvas.save(&output).unwrap();
        })
    }

    fn run_levels(&self, inv: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let input = inv.args.first().expect("input path").clone();
        let output = inv.args.last().expect("output path").clone();
        Self::finish(self.levels, inv, || {
            let img = image::open(&input).unwrap();
            img.save_with_format(&output, image::ImageFormat::Png).unwrap();
        })
    }
}

#[async_trait]
impl ExternalToolRunner for FakeRunner {
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        if invocation.args.iter().any(|a| a == "-macro") {
            self.run_stitch(invocation)
        } else {
            self.run_levels(invocation)
        }
    }
}

/// The double-quoted string following `prefix` in `line`, unescaped.
fn quoted_after(line: &str, prefix: &str) -> Option<String> {
    let start = line.find(prefix)? + prefix.len();
    let mut out = String::new();
    let mut chars = line[start..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '"' => return Some(out),
            c => out.push(c),
        }
    }
    None
}
