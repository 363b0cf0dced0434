//! Stitching: merge the two half pages with Fiji's pairwise stitching plugin.
//!
//! A small ImageJ macro is generated per document and handed to the Fiji
//! launcher in headless mode. The macro opens both pages, restricts the
//! overlap search to a band along the joining edge, runs "Pairwise
//! stitching" with linear blending and saves the fused image as PNG.
//!
//! Fiji frequently reports macro errors on stdout and still exits 0, so a
//! zero exit code alone is not trusted: the output file must exist too.

use crate::artifacts::DocumentArtifacts;
use crate::config::{Orientation, SearchRegion, StitchConfig};
use crate::error::PipelineError;
use crate::output::Stage;
use crate::pipeline::remove_stale_output;
use crate::runner::{ExternalToolRunner, ToolInvocation};
use std::path::Path;
use tracing::{debug, info};

/// ImageJ window title of the first page.
const FIRST_TITLE: &str = "page1";
/// ImageJ window title of the second page.
const SECOND_TITLE: &str = "page2";
/// ImageJ window title of the fused result.
const FUSED_TITLE: &str = "fused";

/// Escape `s` for use inside a double-quoted ImageJ macro string.
pub fn escape_macro_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c => out.push(c),
        }
    }
    out
}

fn quoted(path: &Path) -> String {
    format!("\"{}\"", escape_macro_string(&path.to_string_lossy()))
}

/// `makeRectangle` call selecting the search band of the open image.
///
/// `first` selects the band of the first page (right or bottom edge),
/// otherwise the band of the second page (left or top edge).
fn band_selection(region: &SearchRegion, first: bool) -> String {
    let band = region.band_fraction;
    match (region.orientation, first) {
        (Orientation::Horizontal, true) => format!(
            "makeRectangle(round(getWidth() * {:.4}), 0, round(getWidth() * {band:.4}), getHeight());",
            1.0 - band
        ),
        (Orientation::Horizontal, false) => {
            format!("makeRectangle(0, 0, round(getWidth() * {band:.4}), getHeight());")
        }
        (Orientation::Vertical, true) => format!(
            "makeRectangle(0, round(getHeight() * {:.4}), getWidth(), round(getHeight() * {band:.4}));",
            1.0 - band
        ),
        (Orientation::Vertical, false) => {
            format!("makeRectangle(0, 0, getWidth(), round(getHeight() * {band:.4}));")
        }
    }
}

/// Generate the ImageJ macro stitching `first` and `second` into `output`.
pub fn build_macro(first: &Path, second: &Path, output: &Path, region: &SearchRegion) -> String {
    let lines = [
        "// a3-stitch pairwise stitching macro".to_string(),
        format!("open({});", quoted(first)),
        format!("rename(\"{FIRST_TITLE}\");"),
        band_selection(region, true),
        format!("open({});", quoted(second)),
        format!("rename(\"{SECOND_TITLE}\");"),
        band_selection(region, false),
        format!(
            "run(\"Pairwise stitching\", \"first_image={FIRST_TITLE} second_image={SECOND_TITLE} \
fusion_method=[Linear Blending] fused_image={FUSED_TITLE} check_peaks=5 compute_overlap \
subpixel_accuracy x=0.0000 y=0.0000 registration_channel_image_1=[Average all channels] \
registration_channel_image_2=[Average all channels]\");"
        ),
        format!("selectWindow(\"{FUSED_TITLE}\");"),
        format!("saveAs(\"PNG\", {});", quoted(output)),
        "close(\"*\");".to_string(),
        "eval(\"script\", \"System.exit(0);\");".to_string(),
    ];
    let mut source = lines.join("\n");
    source.push('\n');
    source
}

/// Arguments passed to the Fiji launcher to run `macro_path` headless.
pub fn stitch_args(macro_path: &Path) -> Vec<String> {
    vec![
        "--headless".into(),
        "--console".into(),
        "-macro".into(),
        macro_path.to_string_lossy().into_owned(),
    ]
}

/// Stitch `artifacts.page_one` and the rotated `artifacts.page_two` into
/// `artifacts.stitched`.
pub async fn stitch_pages(
    artifacts: &DocumentArtifacts,
    config: &StitchConfig,
    runner: &dyn ExternalToolRunner,
) -> Result<(), PipelineError> {
    let source = build_macro(
        &artifacts.page_one,
        &artifacts.page_two,
        &artifacts.stitched,
        &config.search_region,
    );
    tokio::fs::write(&artifacts.stitch_macro, source)
        .await
        .map_err(|source| PipelineError::WriteFailed {
            path: artifacts.stitch_macro.clone(),
            stage: Stage::Stitch,
            source,
        })?;

    remove_stale_output(&artifacts.stitched, Stage::Stitch).await?;

    let invocation = ToolInvocation::new(
        &config.fiji_program,
        stitch_args(&artifacts.stitch_macro),
        config.stitch_timeout(),
    );
    info!("[{}] Stitching pages", artifacts.tag);
    let output = runner
        .run(&invocation)
        .await
        .map_err(PipelineError::stitch)?;

    if !output.success() {
        return Err(PipelineError::StitchFailed {
            reason: format!(
                "{} returned {}",
                config.fiji_program.display(),
                output.status_text()
            ),
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    if !artifacts.stitched.is_file() {
        return Err(PipelineError::StitchFailed {
            reason: format!(
                "{} exited successfully but did not write '{}'",
                config.fiji_program.display(),
                artifacts.stitched.display()
            ),
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }
    debug!("Stitched image written to {}", artifacts.stitched.display());
    Ok(())
}
