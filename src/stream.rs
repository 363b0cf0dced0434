//! Streaming batch API: emit document reports as they complete.
//!
//! Unlike [`crate::batch::process_batch`], which returns only after every
//! document finished, [`process_stream`] yields each [`DocumentReport`] as
//! soon as its pipeline ends. With `concurrency > 1` reports arrive in
//! completion order; sort by `index` if input order matters.

use crate::artifacts::assign_tags;
use crate::config::StitchConfig;
use crate::document::process_document;
use crate::output::DocumentReport;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of document reports.
pub type DocumentStream = Pin<Box<dyn Stream<Item = DocumentReport> + Send>>;

/// Process `inputs` with at most `config.concurrency` documents in flight.
///
/// Every input yields exactly one report; a failing document never stops
/// the others. Per-document progress callbacks fire from here.
pub fn process_stream(inputs: &[PathBuf], config: &StitchConfig) -> DocumentStream {
    let total = inputs.len();
    let tags = assign_tags(inputs);
    info!(
        "Processing {} document(s), {} at a time",
        total, config.concurrency
    );

    let jobs: Vec<(usize, PathBuf, String)> = inputs
        .iter()
        .cloned()
        .zip(tags)
        .enumerate()
        .map(|(index, (input, tag))| (index, input, tag))
        .collect();
    let concurrency = config.concurrency.max(1);
    let config = config.clone();

    let s = stream::iter(jobs.into_iter().map(move |(index, input, tag)| {
        let cfg = config.clone();
        async move {
            if let Some(ref cb) = cfg.progress_callback {
                cb.on_document_start(index, &input, total);
            }
            let report = process_document(index, &input, &tag, &cfg).await;
            if let Some(ref cb) = cfg.progress_callback {
                match &report.error {
                    None => cb.on_document_complete(&report, total),
                    Some(e) => cb.on_document_error(&report, e, total),
                }
            }
            report
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
