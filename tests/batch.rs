//! Batch integration tests against the public API.
//!
//! The external collaborators are replaced through the two public seams,
//! [`PageRasterizer`] and [`ExternalToolRunner`], so these tests need neither
//! pdfium nor Fiji nor ImageMagick and always run.

use a3_stitch::{
    process_batch, process_stream, BatchReport, ExternalToolRunner, PageRasterizer, PipelineError,
    RenderSettings, Stage, StitchConfig, ToolError, ToolInvocation, ToolOutput,
};
use async_trait::async_trait;
use futures::StreamExt;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Renders two pages for any PDF whose body says `ok`, one page otherwise.
struct TwoPages;

impl PageRasterizer for TwoPages {
    fn rasterize(&self, path: &Path, _s: &RenderSettings) -> Result<Vec<DynamicImage>, PipelineError> {
        let body = std::fs::read_to_string(path).unwrap_or_default();
        let n = if body.contains("ok") { 2 } else { 1 };
        Ok((0..n)
            .map(|i| DynamicImage::ImageRgb8(RgbImage::from_pixel(30 + i, 50, Rgb([200, 200, 200]))))
            .collect())
    }
}

/// Stitches by side-by-side concatenation, levels by copying. Tracks the
/// peak number of concurrently running tools.
#[derive(Default)]
struct ConcatRunner {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcatRunner {
    fn stitch(inv: &ToolInvocation) -> ToolOutput {
        let macro_path = inv.args.last().unwrap();
        let source = std::fs::read_to_string(macro_path).unwrap();
        let quoted: Vec<String> = source
            .lines()
            .filter(|l| l.starts_with("open(") || l.starts_with("saveAs("))
            .map(|l| l.rsplit_once(", ").map(|(_, r)| r).unwrap_or(l))
            .map(|l| l.trim_start_matches("open(").trim_end_matches(");").trim_matches('"').to_string())
            .collect();
        let (a, b, out) = (&quoted[0], &quoted[1], &quoted[2]);
        let a = image::open(a).unwrap().to_rgb8();
        let b = image::open(b).unwrap().to_rgb8();
        let mut canvas = RgbImage::new(a.width() + b.width(), a.height().max(b.height()));
        image::imageops::overlay(&mut canvas, &a, 0, 0);
        image::imageops::overlay(&mut canvas, &b, a.width() as i64, 0);
        canvas.save(out).unwrap();
        ToolOutput {
            exit_code: Some(0),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ExternalToolRunner for ConcatRunner {
    async fn run(&self, inv: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let out = if inv.args.iter().any(|a| a == "-macro") {
            Self::stitch(inv)
        } else {
            std::fs::copy(&inv.args[0], inv.args.last().unwrap()).unwrap();
            ToolOutput {
                exit_code: Some(0),
                ..Default::default()
            }
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(out)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn scans(dir: &Path, bodies: &[&str]) -> Vec<PathBuf> {
    bodies
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let p = dir.join(format!("scan{i}.pdf"));
            std::fs::write(&p, format!("%PDF-1.4\n{body}\n%%EOF\n")).unwrap();
            p
        })
        .collect()
}

fn config(out: &Path, runner: Arc<ConcatRunner>, jobs: usize) -> StitchConfig {
    StitchConfig::builder()
        .output_dir(out)
        .concurrency(jobs)
        .rasterizer(Arc::new(TwoPages))
        .runner(runner)
        .build()
        .unwrap()
}

fn leftover_intermediates(out: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy().into_owned();
            !name.ends_with("-A3.png") && !name.ends_with("-A3-square.png")
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_reports_failures_and_keeps_going() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let inputs = scans(dir.path(), &["ok", "ok", "single page", "ok"]);
    let runner = Arc::new(ConcatRunner::default());

    let report: BatchReport = process_batch(&inputs, &config(&out, runner, 2)).await;

    assert_eq!(report.success_count(), 3);
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].input, inputs[2]);
    assert_eq!(failed[0].error.as_ref().unwrap().stage, Stage::Extract);
    assert!(leftover_intermediates(&out).is_empty());

    for doc in report.succeeded() {
        let o = doc.outputs.as_ref().unwrap();
        // 30 + 31 wide, 50 high.
        assert_eq!((o.width, o.height), (61, 50));
        let square = image::open(&o.square_image).unwrap();
        assert_eq!(square.dimensions(), (61, 61));
    }
}

#[tokio::test]
async fn worker_pool_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let inputs = scans(dir.path(), &["ok"; 6]);
    let runner = Arc::new(ConcatRunner::default());

    let report = process_batch(&inputs, &config(&out, runner.clone(), 2)).await;
    assert!(report.all_succeeded());
    assert!(runner.peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn stream_yields_every_document() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let inputs = scans(dir.path(), &["ok", "broken", "ok"]);
    let cfg = config(&out, Arc::new(ConcatRunner::default()), 3);

    let mut indices: Vec<usize> = process_stream(&inputs, &cfg)
        .map(|r| r.index)
        .collect()
        .await;
    indices.sort();
    assert_eq!(indices, vec![0, 1, 2]);
}
