//! Page rasterisation through pdfium. The library is loaded per call, so a
//! missing pdfium only affects the tools that render.

use std::path::Path;

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::debug;

use super::ConversionError;

/// Render resolution for slide images.
const RENDER_DPI: f32 = 150.0;

fn pdfium_error(e: PdfiumError) -> ConversionError {
    ConversionError::Library(format!("pdfium: {:?}", e))
}

/// Bind to pdfium at `library` (a library file or the directory holding it),
/// or to the system library when no location is configured.
fn bind(library: Option<&Path>) -> Result<Pdfium, ConversionError> {
    let bindings = match library {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(pdfium_error)?;
    Ok(Pdfium::new(bindings))
}

/// Every page of `input` as an image at 150 dpi, in page order.
pub(crate) fn render_pages(
    library: Option<&Path>,
    input: &Path,
) -> Result<Vec<DynamicImage>, ConversionError> {
    let pdfium = bind(library)?;
    let document = pdfium
        .load_pdf_from_file(input, None)
        .map_err(pdfium_error)?;

    let config = PdfRenderConfig::new().scale_page_by_factor(RENDER_DPI / 72.0);
    let mut images = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let bitmap = page.render_with_config(&config).map_err(pdfium_error)?;
        let image = bitmap.as_image();
        debug!(page = idx + 1, width = image.width(), height = image.height(), "page rendered");
        images.push(image);
    }
    Ok(images)
}
