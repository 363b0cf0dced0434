//! Square variant: the final image centred on a square canvas.

use crate::error::PipelineError;
use crate::output::Stage;
use crate::pipeline::rotate::write_atomically;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::path::Path;
use tracing::debug;

/// Dimensions reported by [`make_square`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareResult {
    /// Width of the source image.
    pub width: u32,
    /// Height of the source image.
    pub height: u32,
    /// Side of the written square.
    pub side: u32,
}

/// Centre `image` on a `max(w, h)` square filled with `background`.
///
/// Odd leftovers go to the right/bottom margin.
pub fn square_canvas(image: &DynamicImage, background: [u8; 4]) -> RgbaImage {
    let (w, h) = (image.width(), image.height());
    let side = w.max(h);
    let mut canvas = RgbaImage::from_pixel(side, side, Rgba(background));
    let x = (side - w) / 2;
    let y = (side - h) / 2;
    imageops::overlay(&mut canvas, &image.to_rgba8(), x as i64, y as i64);
    canvas
}

/// Write the square variant of `source` to `target`.
///
/// With `resize_to` set the square is scaled (Lanczos3) to that side.
pub async fn make_square(
    source: &Path,
    target: &Path,
    background: [u8; 4],
    resize_to: Option<u32>,
) -> Result<SquareResult, PipelineError> {
    let source = source.to_path_buf();
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || square_file(&source, &target, background, resize_to))
        .await
        .map_err(|e| PipelineError::Internal(format!("Square task panicked: {}", e)))?
}

fn square_file(
    source: &Path,
    target: &Path,
    background: [u8; 4],
    resize_to: Option<u32>,
) -> Result<SquareResult, PipelineError> {
    let image = image::open(source).map_err(|e| PipelineError::image(Stage::Square, source, e))?;
    let (width, height) = (image.width(), image.height());

    let mut square = square_canvas(&image, background);
    if let Some(side) = resize_to.filter(|&s| s != square.width()) {
        square = imageops::resize(&square, side, side, FilterType::Lanczos3);
    }
    let side = square.width();

    write_atomically(
        target,
        &DynamicImage::ImageRgba8(square),
        ImageFormat::Png,
        Stage::Square,
    )?;
    debug!(
        "Square variant {} ({}x{} → {}²)",
        target.display(),
        width,
        height,
        side
    );
    Ok(SquareResult {
        width,
        height,
        side,
    })
}
