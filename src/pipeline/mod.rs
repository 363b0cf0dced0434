//! Pipeline stages for turning one two-page scan into an A3 image.
//!
//! Each submodule implements exactly one transformation step and reads its
//! settings from [`crate::config::StitchConfig`]. The stages run strictly in
//! order for one document; [`crate::document`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! scan.pdf ──▶ extract ──▶ rotate ──▶ stitch ──▶ levels ──▶ square
//!              (pdfium)   (page 2)   (Fiji)    (magick)   (canvas)
//! ```
//!
//! 1. [`extract`]: validate the PDF and rasterise its two pages to PNG;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 2. [`rotate`]: turn page 2 by 180° in place
//! 3. [`stitch`]: generate an ImageJ macro and run Fiji headless on it
//! 4. [`levels`]: `-negate -auto-level -negate` via ImageMagick
//! 5. [`square`]: centre the final image on a square canvas

pub mod extract;
pub mod levels;
pub mod rotate;
pub mod square;
pub mod stitch;

use crate::error::PipelineError;
use crate::output::Stage;
use std::path::Path;
use tracing::debug;

/// Delete a leftover `output` from an earlier run before a tool is asked to
/// write it, so that only a fresh file passes the existence check.
pub(crate) async fn remove_stale_output(output: &Path, stage: Stage) -> Result<(), PipelineError> {
    match tokio::fs::remove_file(output).await {
        Ok(()) => {
            debug!("Removed stale {}", output.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PipelineError::WriteFailed {
            path: output.to_path_buf(),
            stage,
            source,
        }),
    }
}
