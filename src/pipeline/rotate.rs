//! Page rotation: turn the second half-page scan the right way up.
//!
//! The second A4 capture of an A3 sheet comes out upside down, because the
//! sheet is turned around on the scanner bed to reach its other half. A 180°
//! rotation is a pure pixel permutation, so the PNG is rewritten losslessly.

use crate::error::PipelineError;
use crate::output::Stage;
use image::{DynamicImage, ImageFormat};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Rotate the image at `path` by 180° and replace the file atomically.
pub async fn rotate_in_place(path: &Path) -> Result<(), PipelineError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || rotate_file(&path))
        .await
        .map_err(|e| PipelineError::Internal(format!("Rotate task panicked: {}", e)))?
}

/// 180° rotation of an in-memory image.
pub fn rotate_half_turn(image: &DynamicImage) -> DynamicImage {
    image.rotate180()
}

fn rotate_file(path: &Path) -> Result<(), PipelineError> {
    let image = image::open(path).map_err(|e| PipelineError::image(Stage::Rotate, path, e))?;
    let rotated = rotate_half_turn(&image);
    let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);
    write_atomically(path, &rotated, format, Stage::Rotate)?;
    debug!(
        "Rotated {} by 180° ({}x{})",
        path.display(),
        rotated.width(),
        rotated.height()
    );
    Ok(())
}

/// Encode `image` to a temp file next to `path`, then rename it over `path`.
///
/// A crash mid-write leaves the previous file intact instead of a truncated
/// one that a later stage would choke on.
pub(crate) fn write_atomically(
    path: &Path,
    image: &DynamicImage,
    format: ImageFormat,
    stage: Stage,
) -> Result<(), PipelineError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_err = |source: std::io::Error| PipelineError::WriteFailed {
        path: path.to_path_buf(),
        stage,
        source,
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".a3stitch-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        image
            .write_to(&mut writer, format)
            .map_err(|e| PipelineError::image(stage, path, e))?;
        writer.flush().map_err(write_err)?;
    }
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn half_turn_moves_corners() {
        let img = gradient(5, 3);
        let rotated = rotate_half_turn(&img);
        assert_eq!(rotated.dimensions(), (5, 3));
        assert_eq!(rotated.get_pixel(0, 0), img.get_pixel(4, 2));
        assert_eq!(rotated.get_pixel(4, 2), img.get_pixel(0, 0));
    }

    #[test]
    fn two_half_turns_restore_the_original() {
        for (w, h) in [(1, 1), (6, 4), (3, 9)] {
            let img = gradient(w, h);
            let back = rotate_half_turn(&rotate_half_turn(&img));
            assert_eq!(back.to_rgb8(), img.to_rgb8(), "{w}x{h}");
        }
    }

    #[tokio::test]
    async fn rotating_a_file_twice_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page-2.png");
        let original = gradient(17, 11);
        original.save(&path).unwrap();

        rotate_in_place(&path).await.unwrap();
        let once = image::open(&path).unwrap();
        assert_eq!(once.get_pixel(0, 0), original.get_pixel(16, 10));

        rotate_in_place(&path).await.unwrap();
        let twice = image::open(&path).unwrap();
        assert_eq!(twice.to_rgb8(), original.to_rgb8());

        // Only the page itself is left in the directory.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn corrupt_image_is_an_image_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();

        let err = rotate_in_place(&path).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ImageProcessing {
                stage: Stage::Rotate,
                ..
            }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::ImageProcessing);
    }
}
