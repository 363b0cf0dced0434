//! Single-document driver: run every stage for one scan and clean up.

use crate::artifacts::DocumentArtifacts;
use crate::config::StitchConfig;
use crate::error::{DocumentError, PipelineError};
use crate::output::{DocumentOutputs, DocumentReport, Stage};
use crate::pipeline::{extract, levels, rotate, square, stitch};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info};

/// Process one scan into its final and square images.
///
/// Never fails as a whole: a stage error ends up in
/// [`DocumentReport::error`]. Intermediates are removed afterwards, on
/// success and failure alike, unless `config.keep_files` is set.
pub async fn process_document(
    index: usize,
    input: &Path,
    tag: &str,
    config: &StitchConfig,
) -> DocumentReport {
    let start = Instant::now();
    let artifacts = DocumentArtifacts::new(
        tag,
        &config.work_dir_for(input),
        &config.output_dir_for(input),
    );
    info!("[{}] Processing {}", tag, input.display());

    let result = run_stages(index, input, &artifacts, config).await;

    let (kept_files, removed_files, cleanup_warnings) = if config.keep_files {
        let kept = artifacts.existing_intermediates();
        debug!("[{}] Keeping {} intermediate file(s)", tag, kept.len());
        (kept, Vec::new(), Vec::new())
    } else {
        let (removed, warnings) = artifacts.remove_intermediates();
        (Vec::new(), removed, warnings)
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let (outputs, error) = match result {
        Ok(outputs) => {
            info!(
                "[{}] Done in {}ms → {}",
                tag,
                duration_ms,
                outputs.final_image.display()
            );
            (Some(outputs), None)
        }
        Err(e) => {
            error!("[{}] Failed at {}: {}", tag, e.stage(), e);
            (None, Some(DocumentError::from(&e)))
        }
    };

    DocumentReport {
        index,
        input: input.to_path_buf(),
        tag: tag.to_string(),
        outputs,
        error,
        kept_files,
        removed_files,
        cleanup_warnings,
        duration_ms,
    }
}

async fn run_stages(
    index: usize,
    input: &Path,
    artifacts: &DocumentArtifacts,
    config: &StitchConfig,
) -> Result<DocumentOutputs, PipelineError> {
    let enter = |stage: Stage| {
        debug!("[{}] Stage: {}", artifacts.tag, stage);
        if let Some(ref cb) = config.progress_callback {
            cb.on_stage(index, stage);
        }
    };

    enter(Stage::Setup);
    let output_dir = config.output_dir_for(input);
    let work_dir = config.work_dir_for(input);
    for dir in [&output_dir, &work_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| PipelineError::WriteFailed {
                path: dir.clone(),
                stage: Stage::Setup,
                source,
            })?;
    }
    let runner = config.resolve_runner();

    enter(Stage::Extract);
    extract::extract_pages(input, artifacts, config).await?;

    enter(Stage::Rotate);
    rotate::rotate_in_place(&artifacts.page_two).await?;

    enter(Stage::Stitch);
    stitch::stitch_pages(artifacts, config, runner.as_ref()).await?;

    enter(Stage::AdjustLevels);
    levels::adjust_levels(artifacts, config, runner.as_ref()).await?;

    enter(Stage::Square);
    let sq = square::make_square(
        &artifacts.final_image,
        &artifacts.square_image,
        config.square_background,
        config.square_size,
    )
    .await?;

    Ok(DocumentOutputs {
        final_image: artifacts.final_image.clone(),
        width: sq.width,
        height: sq.height,
        square_image: artifacts.square_image.clone(),
        square_side: sq.side,
    })
}
