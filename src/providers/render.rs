//! PDF rasterisation for optical extraction of multi-page documents.
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and is CPU-bound, so rendering runs inside
//! `tokio::task::spawn_blocking` rather than on a runtime worker.
//!
//! Pages are capped by pixel count on the longest edge, not DPI: page sizes
//! vary wildly, and vision models read text best around 1,000–2,000 px.

use crate::error::ProviderError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const PROVIDER: &str = "pdfium";

/// Longest-edge cap for rendered pages.
pub const DEFAULT_MAX_PIXELS: u32 = 2000;

/// Rasterise every page of the PDF at `pdf_path`, in page order.
pub async fn render_all_pages(
    pdf_path: &Path,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, ProviderError> {
    let path: PathBuf = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || render_pages_blocking(&path, max_pixels))
        .await
        .map_err(|e| ProviderError::invalid_response(PROVIDER, format!("render task panicked: {e}")))?
}

fn render_pages_blocking(pdf_path: &Path, max_pixels: u32) -> Result<Vec<DynamicImage>, ProviderError> {
    let pdfium = Pdfium::default();

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| ProviderError::invalid_response(PROVIDER, format!("cannot open PDF: {e:?}")))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total_pages);
    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("page {}: {e:?}", idx + 1))
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
