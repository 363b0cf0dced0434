//! # a3-stitch
//!
//! Reassemble A3 sheets from two-page A4 scans.
//!
//! ## Why this crate?
//!
//! Flatbed scanners that only take A4 can still capture an A3 sheet: scan
//! one half, turn the sheet around, scan the other half. The result is a
//! two-page PDF whose second page is upside down and overlaps the first by a
//! few centimetres. This crate turns such a PDF back into one image by
//! rasterising both pages, rotating the second, letting Fiji's pairwise
//! stitching plugin find the overlap, and normalising the paper tone with
//! ImageMagick.
//!
//! ## Pipeline Overview
//!
//! ```text
//! scan.pdf (2 pages)
//!  │
//!  ├─ 1. Extract  rasterise both pages via pdfium (spawn_blocking)
//!  ├─ 2. Rotate   turn page 2 by 180°
//!  ├─ 3. Stitch   Fiji headless macro, "Pairwise stitching"
//!  ├─ 4. Levels   magick -negate -auto-level -negate
//!  └─ 5. Square   centre on a max(w, h) square canvas
//! ```
//!
//! Documents of a batch run concurrently on a bounded pool; stages of one
//! document run in order. A failing document is reported and the rest of
//! the batch carries on.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a3_stitch::{process_batch, StitchConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StitchConfig::builder()
//!         .fiji_program("/opt/Fiji.app/ImageJ-linux64")
//!         .concurrency(2)
//!         .build()?;
//!     let report = process_batch(&[PathBuf::from("131.pdf")], &config).await;
//!     for doc in report.succeeded() {
//!         let out = doc.outputs.as_ref().unwrap();
//!         println!("{} → {}", doc.input.display(), out.final_image.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `a3stitch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! a3-stitch = { version = "0.1", default-features = false }
//! ```
//!
//! ## External tools
//!
//! | Tool | Used for | Default program |
//! |------|----------|-----------------|
//! | pdfium | page rasterisation (in-process) | `./libpdfium.so`, then system |
//! | Fiji | stitching | `ImageJ-linux64` |
//! | ImageMagick | level adjustment | `magick` |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifacts;
pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod runner;
pub mod stream;
pub mod tools;

#[cfg(test)]
mod test_support;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{process_batch, process_batch_sync};
pub use config::{Orientation, SearchRegion, StitchConfig, StitchConfigBuilder};
pub use document::process_document;
pub use error::{CleanupWarning, DocumentError, ErrorKind, PipelineError};
pub use output::{BatchReport, DocumentOutputs, DocumentReport, Stage};
pub use pipeline::extract::{PageRasterizer, PdfiumRasterizer, RenderSettings};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use runner::{ExternalToolRunner, ProcessRunner, ToolError, ToolInvocation, ToolOutput};
pub use stream::{process_stream, DocumentStream};
pub use tools::{check_tools, ToolStatus};
