//! Batch driver: run many scans through the pipeline with a bounded pool.

use crate::config::StitchConfig;
use crate::error::PipelineError;
use crate::output::BatchReport;
use crate::stream::process_stream;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Process every input and return the reports in input order.
///
/// # Example
/// ```rust,no_run
/// use a3_stitch::{process_batch, StitchConfig};
/// use std::path::PathBuf;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = StitchConfig::builder().keep_files(true).build()?;
/// let report = process_batch(&[PathBuf::from("131.pdf")], &config).await;
/// for doc in report.failed() {
///     eprintln!("{}: {}", doc.input.display(), doc.error.as_ref().unwrap());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn process_batch(inputs: &[PathBuf], config: &StitchConfig) -> BatchReport {
    let start = Instant::now();
    let total = inputs.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut documents: Vec<_> = process_stream(inputs, config).collect().await;
    documents.sort_by_key(|d| d.index);

    let report = BatchReport {
        documents,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };
    let ok = report.success_count();
    if ok == total {
        info!(
            "Batch complete: {}/{} document(s) in {}ms",
            ok, total, report.total_duration_ms
        );
    } else {
        warn!(
            "Batch complete: {}/{} document(s) succeeded, {} failed",
            ok,
            total,
            total - ok
        );
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, ok);
    }
    report
}

/// Synchronous wrapper around [`process_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_batch_sync(
    inputs: &[PathBuf],
    config: &StitchConfig,
) -> Result<BatchReport, PipelineError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?;
    Ok(runtime.block_on(process_batch(inputs, config)))
}
