//! Configuration types for the A3 stitching pipeline.
//!
//! Every stage reads its settings from one [`StitchConfig`], built via
//! [`StitchConfigBuilder`]. Directories, external tool paths and timeouts are
//! explicit fields rather than ambient process state, so a test can point a
//! whole batch at a temp directory and a fake tool runner.

use crate::error::PipelineError;
use crate::pipeline::extract::{PageRasterizer, PdfiumRasterizer};
use crate::progress::ProgressCallback;
use crate::runner::{ExternalToolRunner, ProcessRunner};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Number of pages a scan must contain: the two A4 halves of one A3 sheet.
pub const EXPECTED_PAGES: usize = 2;

/// Configuration for processing one or more scans.
///
/// Built via [`StitchConfig::builder()`] or using [`StitchConfig::default()`].
///
/// # Example
/// ```rust
/// use a3_stitch::{Orientation, SearchRegion, StitchConfig};
///
/// let config = StitchConfig::builder()
///     .dpi(300)
///     .concurrency(4)
///     .keep_files(true)
///     .search_region(SearchRegion {
///         orientation: Orientation::Horizontal,
///         band_fraction: 0.2,
///     })
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct StitchConfig {
    /// Rasterisation DPI for the PDF pages. Range: 72–600. Default: 300.
    ///
    /// The stitcher needs fine texture in the overlap band; at 150 DPI
    /// phase correlation locks onto noise more often on near-empty pages.
    pub dpi: u32,

    /// Cap on either edge of a rendered page, in pixels. Default: 12000.
    pub max_rendered_pixels: u32,

    /// Number of documents processed at once. Default: 2.
    ///
    /// Each document starts its own JVM for stitching, which easily takes
    /// a couple of GB of RAM; keep this low on small machines.
    pub concurrency: usize,

    /// Directory for the final images. `None` = next to each input PDF.
    pub output_dir: Option<PathBuf>,

    /// Directory for intermediates. `None` = the output directory.
    pub work_dir: Option<PathBuf>,

    /// Keep page images, macro and raw stitch output after the run.
    pub keep_files: bool,

    /// Fiji / ImageJ launcher used for stitching. Default: `ImageJ-linux64`.
    pub fiji_program: PathBuf,

    /// ImageMagick executable used for level adjustment. Default: `magick`.
    pub magick_program: PathBuf,

    /// Stitch tool timeout in seconds. Default: 600.
    pub stitch_timeout_secs: u64,

    /// Level tool timeout in seconds. Default: 120.
    pub levels_timeout_secs: u64,

    /// Where the stitcher looks for the overlap between the two pages.
    pub search_region: SearchRegion,

    /// RGBA fill of the square canvas. Default: opaque white.
    pub square_background: [u8; 4],

    /// Scale the square variant to this side length. Default: `None`
    /// (side = longer edge of the final image).
    pub square_size: Option<u32>,

    /// Explicit pdfium shared library. `None` = current directory, then
    /// the system library path.
    pub pdfium_library: Option<PathBuf>,

    /// Pre-constructed rasteriser. Takes precedence over `pdfium_library`.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Pre-constructed tool runner. Default: [`ProcessRunner`].
    pub runner: Option<Arc<dyn ExternalToolRunner>>,

    /// Receives per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            max_rendered_pixels: 12_000,
            concurrency: 2,
            output_dir: None,
            work_dir: None,
            keep_files: false,
            fiji_program: PathBuf::from("ImageJ-linux64"),
            magick_program: PathBuf::from("magick"),
            stitch_timeout_secs: 600,
            levels_timeout_secs: 120,
            search_region: SearchRegion::default(),
            square_background: [255, 255, 255, 255],
            square_size: None,
            pdfium_library: None,
            rasterizer: None,
            runner: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for StitchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StitchConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("output_dir", &self.output_dir)
            .field("work_dir", &self.work_dir)
            .field("keep_files", &self.keep_files)
            .field("fiji_program", &self.fiji_program)
            .field("magick_program", &self.magick_program)
            .field("stitch_timeout_secs", &self.stitch_timeout_secs)
            .field("levels_timeout_secs", &self.levels_timeout_secs)
            .field("search_region", &self.search_region)
            .field("square_background", &self.square_background)
            .field("square_size", &self.square_size)
            .field("pdfium_library", &self.pdfium_library)
            .field("rasterizer", &self.rasterizer.as_ref().map(|_| "<dyn PageRasterizer>"))
            .field("runner", &self.runner.as_ref().map(|_| "<dyn ExternalToolRunner>"))
            .finish()
    }
}

impl StitchConfig {
    /// Create a new builder for `StitchConfig`.
    pub fn builder() -> StitchConfigBuilder {
        StitchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory the final images of `input` are written to.
    pub fn output_dir_for(&self, input: &Path) -> PathBuf {
        match &self.output_dir {
            Some(dir) => dir.clone(),
            None => match input.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        }
    }

    /// Directory the intermediates of `input` are written to.
    pub fn work_dir_for(&self, input: &Path) -> PathBuf {
        match &self.work_dir {
            Some(dir) => dir.clone(),
            None => self.output_dir_for(input),
        }
    }

    pub fn stitch_timeout(&self) -> Duration {
        Duration::from_secs(self.stitch_timeout_secs)
    }

    pub fn levels_timeout(&self) -> Duration {
        Duration::from_secs(self.levels_timeout_secs)
    }

    /// The configured runner, or a [`ProcessRunner`].
    pub fn resolve_runner(&self) -> Arc<dyn ExternalToolRunner> {
        match &self.runner {
            Some(runner) => Arc::clone(runner),
            None => Arc::new(ProcessRunner),
        }
    }

    /// The configured rasteriser, or pdfium bound per `pdfium_library`.
    pub fn resolve_rasterizer(&self) -> Arc<dyn PageRasterizer> {
        match &self.rasterizer {
            Some(rasterizer) => Arc::clone(rasterizer),
            None => Arc::new(PdfiumRasterizer::new(self.pdfium_library.clone())),
        }
    }
}

/// Builder for [`StitchConfig`].
#[derive(Debug)]
pub struct StitchConfigBuilder {
    config: StitchConfig,
}

impl StitchConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_dir = Some(dir.into());
        self
    }

    pub fn keep_files(mut self, v: bool) -> Self {
        self.config.keep_files = v;
        self
    }

    pub fn fiji_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.fiji_program = program.into();
        self
    }

    pub fn magick_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.magick_program = program.into();
        self
    }

    pub fn stitch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stitch_timeout_secs = secs;
        self
    }

    pub fn levels_timeout_secs(mut self, secs: u64) -> Self {
        self.config.levels_timeout_secs = secs;
        self
    }

    pub fn search_region(mut self, region: SearchRegion) -> Self {
        self.config.search_region = region;
        self
    }

    pub fn square_background(mut self, rgba: [u8; 4]) -> Self {
        self.config.square_background = rgba;
        self
    }

    pub fn square_size(mut self, side: u32) -> Self {
        self.config.square_size = Some(side);
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn ExternalToolRunner>) -> Self {
        self.config.runner = Some(runner);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<StitchConfig, PipelineError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        let band = c.search_region.band_fraction;
        if !(band > 0.0 && band <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "Search band must be in (0, 1], got {band}"
            )));
        }
        if c.stitch_timeout_secs == 0 || c.levels_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "Tool timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.square_size == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "Square size must be ≥ 1 pixel".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Search region ────────────────────────────────────────────────────────

/// How the two half pages lie next to each other on the A3 sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Page 1 on the left, page 2 on the right. (default)
    #[default]
    Horizontal,
    /// Page 1 on top, page 2 below.
    Vertical,
}

/// Region of each page the stitcher searches for the overlap.
///
/// Page centres are mostly blank paper and give phase correlation nothing to
/// lock onto, so only a band along the joining edge is searched: the right
/// band of page 1 and the left band of page 2 (bottom/top when
/// [`Orientation::Vertical`]). The right width depends on how far the scanner
/// lid lets the sheet overlap and was tuned empirically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchRegion {
    pub orientation: Orientation,
    /// Fraction of the page width (height) searched, in `(0, 1]`. Default: 0.25.
    pub band_fraction: f32,
}

impl Default for SearchRegion {
    fn default() -> Self {
        Self {
            orientation: Orientation::Horizontal,
            band_fraction: 0.25,
        }
    }
}
