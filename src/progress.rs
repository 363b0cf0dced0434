//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::StitchConfigBuilder::progress_callback`] to receive
//! events as the batch driver works through its documents. The CLI uses it
//! to drive a terminal progress bar; library users can forward events to a
//! channel, a log, or nothing at all.
//!
//! # Example
//!
//! ```rust
//! use a3_stitch::{BatchProgressCallback, DocumentReport, StitchConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, report: &DocumentReport, total: usize) {
//!         let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{}/{} done: {}", done, total, report.input.display());
//!     }
//! }
//!
//! let config = StitchConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { finished: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::DocumentError;
use crate::output::{DocumentReport, Stage};
use std::path::Path;
use std::sync::Arc;

/// Called by the batch driver as it processes each document.
///
/// Documents run concurrently, so every method may be called from several
/// threads at once; protect shared state with `Mutex` or atomics. All
/// methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document starts.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called when a worker picks up a document.
    fn on_document_start(&self, index: usize, input: &Path, total_documents: usize) {
        let _ = (index, input, total_documents);
    }

    /// Called as a document enters each stage.
    fn on_stage(&self, index: usize, stage: Stage) {
        let _ = (index, stage);
    }

    /// Called when a document produced both final images.
    fn on_document_complete(&self, report: &DocumentReport, total_documents: usize) {
        let _ = (report, total_documents);
    }

    /// Called when a document was abandoned.
    fn on_document_error(&self, report: &DocumentReport, error: &DocumentError, total_documents: usize) {
        let _ = (report, error, total_documents);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total_documents: usize, success_count: usize) {
        let _ = (total_documents, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::StitchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
