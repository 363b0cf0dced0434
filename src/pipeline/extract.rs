//! PDF page extraction: validate the scan and write its two pages as PNGs.
//!
//! Rasterisation sits behind [`PageRasterizer`] so the page-count and
//! file-naming rules here can be exercised without a pdfium library. The
//! production [`PdfiumRasterizer`] wraps the pdfium C++ library, which is
//! CPU-bound and not async-safe, so [`extract_pages`] runs it inside
//! `tokio::task::spawn_blocking`.

use crate::artifacts::DocumentArtifacts;
use crate::config::{StitchConfig, EXPECTED_PAGES};
use crate::error::PipelineError;
use crate::output::Stage;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Rendering parameters handed to a [`PageRasterizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSettings {
    pub dpi: u32,
    /// Cap on either edge, in pixels.
    pub max_pixels: u32,
    /// Page count the document must have; checked before rendering.
    pub expected_pages: usize,
}

/// Turns every page of a PDF into an image, in page order.
///
/// Called from a blocking thread. Implementations must fail with
/// [`PipelineError::WrongPageCount`] rather than render a document whose
/// page count differs from `settings.expected_pages`.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(
        &self,
        pdf_path: &Path,
        settings: &RenderSettings,
    ) -> Result<Vec<DynamicImage>, PipelineError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// `library` is an explicit pdfium shared library; `None` falls back to
    /// `PDFIUM_LIB_PATH`, then the current directory, then the system path.
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }

    fn bind(&self) -> Result<Pdfium, PipelineError> {
        let explicit = self
            .library
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => {
                debug!("Binding pdfium from {}", path.display());
                Pdfium::bind_to_library(&path)
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }

    /// Bind the library once without opening a document.
    pub fn check(&self) -> Result<(), PipelineError> {
        self.bind().map(|_| ())
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        pdf_path: &Path,
        settings: &RenderSettings,
    ) -> Result<Vec<DynamicImage>, PipelineError> {
        let pdfium = self.bind()?;

        let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                PipelineError::Encrypted {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                PipelineError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);
        ensure_page_count(pdf_path, total_pages, settings.expected_pages)?;

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(settings.dpi as f32 / 72.0)
            .set_maximum_width(settings.max_pixels as i32)
            .set_maximum_height(settings.max_pixels as i32);

        let mut images = Vec::with_capacity(total_pages);
        for idx in 0..total_pages {
            let page = pages
                .get(idx as u16)
                .map_err(|e| PipelineError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                PipelineError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

/// Fail unless the document has exactly `expected` pages.
pub fn ensure_page_count(path: &Path, found: usize, expected: usize) -> Result<(), PipelineError> {
    if found == expected {
        Ok(())
    } else {
        Err(PipelineError::WrongPageCount {
            path: path.to_path_buf(),
            expected,
            found,
        })
    }
}

/// Check that `path` exists, is readable and starts with the `%PDF` magic.
pub fn validate_input(path: &Path) -> Result<(), PipelineError> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                Ok(()) => {
                    return Err(PipelineError::NotAPdf {
                        path: path.to_path_buf(),
                        magic,
                    })
                }
                // Shorter than the magic itself.
                Err(_) => {
                    return Err(PipelineError::CorruptPdf {
                        path: path.to_path_buf(),
                        detail: "file is truncated".into(),
                    })
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(PipelineError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated PDF input: {}", path.display());
    Ok(())
}

/// Rasterise both pages of `pdf_path` into `artifacts.page_one` and
/// `artifacts.page_two`, in document order.
pub async fn extract_pages(
    pdf_path: &Path,
    artifacts: &DocumentArtifacts,
    config: &StitchConfig,
) -> Result<(), PipelineError> {
    validate_input(pdf_path)?;

    let rasterizer = config.resolve_rasterizer();
    let settings = RenderSettings {
        dpi: config.dpi,
        max_pixels: config.max_rendered_pixels,
        expected_pages: EXPECTED_PAGES,
    };
    let path = pdf_path.to_path_buf();
    let targets = [artifacts.page_one.clone(), artifacts.page_two.clone()];

    tokio::task::spawn_blocking(move || extract_blocking(rasterizer, &path, &settings, &targets))
        .await
        .map_err(|e| PipelineError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn extract_blocking(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf_path: &Path,
    settings: &RenderSettings,
    targets: &[PathBuf; EXPECTED_PAGES],
) -> Result<(), PipelineError> {
    let images = rasterizer.rasterize(pdf_path, settings)?;
    ensure_page_count(pdf_path, images.len(), settings.expected_pages)?;

    for (image, target) in images.iter().zip(targets) {
        image
            .save_with_format(target, ImageFormat::Png)
            .map_err(|e| PipelineError::image(Stage::Extract, target, e))?;
        debug!(
            "Wrote {} ({}x{})",
            target.display(),
            image.width(),
            image.height()
        );
    }
    Ok(())
}
