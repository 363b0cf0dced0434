//! Availability probe for the external collaborators.
//!
//! A batch of fifty scans that fails fifty times with "could not launch
//! ImageJ-linux64" is a poor way to learn Fiji is not installed, so the CLI
//! offers `--check-tools`, and library users can call [`check_tools`] before
//! queuing work.

use crate::config::StitchConfig;
use crate::pipeline::extract::PdfiumRasterizer;
use crate::runner::{tail_lines, ExternalToolRunner, ToolInvocation};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Fiji starts a JVM even for `--help`.
const FIJI_PROBE_TIMEOUT: Duration = Duration::from_secs(60);
const MAGICK_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of probing one collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolStatus {
    /// Short name: `fiji`, `magick` or `pdfium`.
    pub name: &'static str,
    /// Executable or library that was probed. `None` for a search.
    pub location: Option<PathBuf>,
    pub available: bool,
    /// First line of the tool's banner, or the failure reason.
    pub detail: String,
}

/// Probe Fiji, ImageMagick and (unless a rasteriser was injected) pdfium.
pub async fn check_tools(config: &StitchConfig) -> Vec<ToolStatus> {
    let runner = config.resolve_runner();
    let mut statuses = vec![
        // Fiji's launcher exits non-zero for --help on some builds; starting
        // at all is enough.
        probe(
            runner.as_ref(),
            "fiji",
            ToolInvocation::new(
                &config.fiji_program,
                vec!["--headless".into(), "--help".into()],
                FIJI_PROBE_TIMEOUT,
            ),
            false,
        )
        .await,
        probe(
            runner.as_ref(),
            "magick",
            ToolInvocation::new(&config.magick_program, vec!["-version".into()], MAGICK_PROBE_TIMEOUT),
            true,
        )
        .await,
    ];

    if config.rasterizer.is_none() {
        let library = config.pdfium_library.clone();
        let rasterizer = PdfiumRasterizer::new(library.clone());
        let result = tokio::task::spawn_blocking(move || rasterizer.check()).await;
        let (available, detail) = match result {
            Ok(Ok(())) => (true, "library bound".to_string()),
            Ok(Err(e)) => (false, first_line(&e.to_string())),
            Err(e) => (false, format!("probe panicked: {e}")),
        };
        statuses.push(ToolStatus {
            name: "pdfium",
            location: library,
            available,
            detail,
        });
    }
    statuses
}

async fn probe(
    runner: &dyn ExternalToolRunner,
    name: &'static str,
    invocation: ToolInvocation,
    require_success: bool,
) -> ToolStatus {
    debug!("Probing {}: {}", name, invocation.command_line());
    let (available, detail) = match runner.run(&invocation).await {
        Ok(out) if out.success() || !require_success => {
            let banner = if out.stdout.trim().is_empty() {
                &out.stderr
            } else {
                &out.stdout
            };
            (true, first_line(banner))
        }
        Ok(out) => (
            false,
            format!("{}: {}", out.status_text(), tail_lines(&out.stderr, 1)),
        ),
        Err(e) => (false, e.to_string()),
    };
    ToolStatus {
        name,
        location: Some(invocation.program),
        available,
        detail,
    }
}

fn first_line(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
