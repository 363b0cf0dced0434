//! Error types for the a3-stitch library.
//!
//! Three types reflect three failure modes:
//!
//! * [`PipelineError`] is **fatal for one document**. A stage could not
//!   produce its artifact (bad PDF, corrupt image, external tool failure).
//!   The document is abandoned; other documents of the batch carry on.
//!
//! * [`DocumentError`] is a serialisable snapshot of a `PipelineError`,
//!   stored in [`crate::output::DocumentReport`] so a batch report can be
//!   printed, compared or dumped as JSON after the run.
//!
//! * [`CleanupWarning`] is **non-fatal**. An intermediate file could not be
//!   deleted. Logged and reported, never aborts anything.

use crate::output::Stage;
use crate::runner::ToolError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Broad classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The PDF could not be opened, rasterised, or has the wrong page count.
    Extraction,
    /// An image could not be read, transformed or written.
    ImageProcessing,
    /// The external stitch tool failed.
    Stitch,
    /// The external level tool failed.
    LevelAdjustment,
    /// Invalid configuration.
    Config,
    /// Unexpected failure (panicked task, runtime error).
    Internal,
}

/// All fatal per-document errors returned by the a3-stitch library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Extraction errors ─────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The PDF is password protected.
    #[error("PDF '{path}' is encrypted.\nRemove the protection first, e.g. qpdf --decrypt in.pdf out.pdf")]
    Encrypted { path: PathBuf },

    /// The scan does not consist of exactly two half pages.
    #[error("Expected a {expected}-page PDF, but '{path}' has {found} page(s)")]
    WrongPageCount {
        path: PathBuf,
        expected: usize,
        found: usize,
    },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium from https://github.com/bblanchon/pdfium-binaries and either:\n\
  • place it in the current directory,\n\
  • put it on the system library path, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib).\n"
    )]
    PdfiumBindingFailed(String),

    // ── Image errors ──────────────────────────────────────────────────────
    /// An image could not be decoded, transformed or encoded.
    #[error("Image processing failed for '{path}': {detail}")]
    ImageProcessing {
        path: PathBuf,
        stage: Stage,
        detail: String,
    },

    // ── External tool errors ──────────────────────────────────────────────
    /// The stitch tool failed or did not produce its output.
    #[error("Stitching failed: {reason}")]
    StitchFailed {
        reason: String,
        stdout: String,
        stderr: String,
    },

    /// The level tool failed or did not produce its output.
    #[error("Level adjustment failed: {reason}")]
    LevelAdjustmentFailed {
        reason: String,
        stdout: String,
        stderr: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create a directory or write a working file.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        stage: Stage,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The pipeline stage this error aborted.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::FileNotFound { .. }
            | PipelineError::PermissionDenied { .. }
            | PipelineError::NotAPdf { .. }
            | PipelineError::CorruptPdf { .. }
            | PipelineError::Encrypted { .. }
            | PipelineError::WrongPageCount { .. }
            | PipelineError::RasterisationFailed { .. }
            | PipelineError::PdfiumBindingFailed(_) => Stage::Extract,
            PipelineError::ImageProcessing { stage, .. } => *stage,
            PipelineError::StitchFailed { .. } => Stage::Stitch,
            PipelineError::LevelAdjustmentFailed { .. } => Stage::AdjustLevels,
            PipelineError::WriteFailed { stage, .. } => *stage,
            PipelineError::InvalidConfig(_) | PipelineError::Internal(_) => Stage::Setup,
        }
    }

    /// The broad error kind, independent of the stage.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::FileNotFound { .. }
            | PipelineError::PermissionDenied { .. }
            | PipelineError::NotAPdf { .. }
            | PipelineError::CorruptPdf { .. }
            | PipelineError::Encrypted { .. }
            | PipelineError::WrongPageCount { .. }
            | PipelineError::RasterisationFailed { .. }
            | PipelineError::PdfiumBindingFailed(_) => ErrorKind::Extraction,
            PipelineError::ImageProcessing { .. } => ErrorKind::ImageProcessing,
            PipelineError::StitchFailed { .. } => ErrorKind::Stitch,
            PipelineError::LevelAdjustmentFailed { .. } => ErrorKind::LevelAdjustment,
            PipelineError::WriteFailed { stage, .. } => match stage {
                Stage::Extract => ErrorKind::Extraction,
                Stage::Stitch => ErrorKind::Stitch,
                Stage::AdjustLevels => ErrorKind::LevelAdjustment,
                Stage::Rotate | Stage::Square => ErrorKind::ImageProcessing,
                Stage::Setup => ErrorKind::Internal,
            },
            PipelineError::InvalidConfig(_) => ErrorKind::Config,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Captured `(stdout, stderr)` of the external tool, if any.
    pub fn tool_output(&self) -> Option<(&str, &str)> {
        match self {
            PipelineError::StitchFailed { stdout, stderr, .. }
            | PipelineError::LevelAdjustmentFailed { stdout, stderr, .. } => {
                Some((stdout.as_str(), stderr.as_str()))
            }
            _ => None,
        }
    }

    /// Helper for image-crate failures.
    pub(crate) fn image(stage: Stage, path: &Path, err: impl std::fmt::Display) -> Self {
        PipelineError::ImageProcessing {
            path: path.to_path_buf(),
            stage,
            detail: err.to_string(),
        }
    }

    pub(crate) fn stitch(err: ToolError) -> Self {
        PipelineError::StitchFailed {
            reason: err.to_string(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub(crate) fn levels(err: ToolError) -> Self {
        PipelineError::LevelAdjustmentFailed {
            reason: err.to_string(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// Serialisable record of why a document failed.
///
/// Stored in [`crate::output::DocumentReport`] in place of the
/// [`PipelineError`] itself, which holds `io::Error`s and is neither
/// `Clone` nor `Serialize`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{stage}: {message}")]
pub struct DocumentError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl From<&PipelineError> for DocumentError {
    fn from(err: &PipelineError) -> Self {
        let (stdout, stderr) = match err.tool_output() {
            Some((out, errs)) => (non_empty(out), non_empty(errs)),
            None => (None, None),
        };
        DocumentError {
            stage: err.stage(),
            kind: err.kind(),
            message: err.to_string(),
            stdout,
            stderr,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// An intermediate file that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("could not remove '{path}': {reason}")]
pub struct CleanupWarning {
    pub path: PathBuf,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn wrong_page_count_display() {
        let e = PipelineError::WrongPageCount {
            path: PathBuf::from("scan.pdf"),
            expected: 2,
            found: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("2-page"), "got: {msg}");
        assert!(msg.contains("3 page(s)"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Extraction);
        assert_eq!(e.stage(), Stage::Extract);
    }

    #[test]
    fn encrypted_is_an_extraction_error() {
        let e = PipelineError::Encrypted {
            path: PathBuf::from("locked.pdf"),
        };
        assert_eq!(e.kind(), ErrorKind::Extraction);
        assert!(e.to_string().contains("encrypted"));
    }

    #[test]
    fn stitch_failure_keeps_tool_output() {
        let e = PipelineError::StitchFailed {
            reason: "exit code 1".into(),
            stdout: "".into(),
            stderr: "java.lang.OutOfMemoryError".into(),
        };
        assert_eq!(e.stage(), Stage::Stitch);
        assert_eq!(e.kind(), ErrorKind::Stitch);
        let (_, stderr) = e.tool_output().unwrap();
        assert!(stderr.contains("OutOfMemoryError"));

        let doc = DocumentError::from(&e);
        assert_eq!(doc.stdout, None);
        assert_eq!(doc.stderr.as_deref(), Some("java.lang.OutOfMemoryError"));
    }

    #[test]
    fn timeout_maps_to_level_failure() {
        let e = PipelineError::levels(ToolError::Timeout {
            program: "magick".into(),
            timeout: Duration::from_secs(5),
        });
        assert_eq!(e.kind(), ErrorKind::LevelAdjustment);
        assert!(e.to_string().contains("timed out"), "got: {e}");
    }

    #[test]
    fn write_failure_inherits_stage_kind() {
        let e = PipelineError::WriteFailed {
            path: PathBuf::from("/x/scan-stitch.ijm"),
            stage: Stage::Stitch,
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(e.kind(), ErrorKind::Stitch);
        assert!(e.to_string().contains("disk full"));
    }

    #[test]
    fn document_error_serialises_without_empty_output() {
        let e = PipelineError::CorruptPdf {
            path: PathBuf::from("bad.pdf"),
            detail: "xref".into(),
        };
        let json = serde_json::to_string(&DocumentError::from(&e)).unwrap();
        assert!(json.contains("\"kind\":\"extraction\""), "got: {json}");
        assert!(!json.contains("stdout"));
    }
}
