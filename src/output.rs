//! Report types returned by the batch driver.

use crate::error::{CleanupWarning, DocumentError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Pipeline stage of a single document, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Directory creation and configuration checks before extraction.
    Setup,
    Extract,
    Rotate,
    Stitch,
    AdjustLevels,
    Square,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Extract => "extract pages",
            Stage::Rotate => "rotate page 2",
            Stage::Stitch => "stitch",
            Stage::AdjustLevels => "adjust levels",
            Stage::Square => "square variant",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Final images of a successfully processed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentOutputs {
    /// Full-size, level-adjusted A3 image.
    pub final_image: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Square variant of `final_image`.
    pub square_image: PathBuf,
    pub square_side: u32,
}

/// Outcome of one input document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReport {
    /// Position of the document in the batch input list (0-indexed).
    pub index: usize,
    pub input: PathBuf,
    /// Prefix of every artifact produced for this document.
    pub tag: String,
    /// `Some` on success.
    pub outputs: Option<DocumentOutputs>,
    /// `Some` on failure.
    pub error: Option<DocumentError>,
    /// Intermediates left on disk (`keep_files`).
    pub kept_files: Vec<PathBuf>,
    /// Intermediates deleted at the end of the run.
    pub removed_files: Vec<PathBuf>,
    pub cleanup_warnings: Vec<CleanupWarning>,
    pub duration_ms: u64,
}

impl DocumentReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.outputs.is_some()
    }
}

/// Outcome of a whole batch, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub documents: Vec<DocumentReport>,
    pub total_duration_ms: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| d.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DocumentReport> {
        self.documents.iter().filter(|d| !d.succeeded())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// `true` when every document succeeded (vacuously true when empty).
    pub fn all_succeeded(&self) -> bool {
        self.failure_count() == 0
    }
}
