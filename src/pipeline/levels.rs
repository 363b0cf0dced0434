//! Level adjustment with ImageMagick.
//!
//! Scans of white paper rarely reach true white, and the stitcher's blending
//! leaves the two halves at slightly different levels. Stretching the
//! histogram of the *negated* image and negating back anchors the stretch
//! at the paper end: the brightest paper tone maps to white while dark ink
//! keeps its weight.

use crate::artifacts::DocumentArtifacts;
use crate::config::StitchConfig;
use crate::error::PipelineError;
use crate::output::Stage;
use crate::pipeline::remove_stale_output;
use crate::runner::{ExternalToolRunner, ToolInvocation};
use std::path::Path;
use tracing::{debug, info};

/// ImageMagick operators applied between input and output, in order.
pub const LEVEL_OPERATORS: [&str; 3] = ["-negate", "-auto-level", "-negate"];

/// `magick <input> -negate -auto-level -negate <output>` arguments.
pub fn level_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args = Vec::with_capacity(LEVEL_OPERATORS.len() + 2);
    args.push(input.to_string_lossy().into_owned());
    args.extend(LEVEL_OPERATORS.iter().map(|op| op.to_string()));
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Level-adjust `artifacts.stitched` into `artifacts.final_image`.
pub async fn adjust_levels(
    artifacts: &DocumentArtifacts,
    config: &StitchConfig,
    runner: &dyn ExternalToolRunner,
) -> Result<(), PipelineError> {
    remove_stale_output(&artifacts.final_image, Stage::AdjustLevels).await?;

    let invocation = ToolInvocation::new(
        &config.magick_program,
        level_args(&artifacts.stitched, &artifacts.final_image),
        config.levels_timeout(),
    );
    info!("[{}] Adjusting levels", artifacts.tag);
    let output = runner
        .run(&invocation)
        .await
        .map_err(PipelineError::levels)?;

    if !output.success() {
        return Err(PipelineError::LevelAdjustmentFailed {
            reason: format!(
                "{} returned {}",
                config.magick_program.display(),
                output.status_text()
            ),
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    if !artifacts.final_image.is_file() {
        return Err(PipelineError::LevelAdjustmentFailed {
            reason: format!(
                "{} exited successfully but did not write '{}'",
                config.magick_program.display(),
                artifacts.final_image.display()
            ),
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    debug!("Final image written to {}", artifacts.final_image.display());
    Ok(())
}
