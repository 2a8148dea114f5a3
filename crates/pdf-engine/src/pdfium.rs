//! Full rasterization through PDFium.

use crate::{
    Document, DocumentBackend, DocumentLoader, IoError, OpenError, PageRenderer, RasterImage,
    RenderError, POINTS_PER_INCH,
};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
#[error("failed to bind PDFium: {0}")]
pub struct BindError(String);

/// Loader backed by a process-wide PDFium binding.
pub struct PdfiumEngine {
    pdfium: &'static Pdfium,
}

impl PdfiumEngine {
    /// Binds PDFium, looking next to the executable, then in the working
    /// directory, then in the system library paths.
    pub fn bind() -> Result<Self, BindError> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));

        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = exe_dir {
            candidates.push(dir);
        }
        candidates.push(PathBuf::from("./"));

        for dir in &candidates {
            if let Ok(bindings) =
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            {
                log::debug!("bound PDFium from {}", dir.display());
                return Ok(Self::leak(Pdfium::new(bindings)));
            }
        }

        let bindings =
            Pdfium::bind_to_system_library().map_err(|err| BindError(err.to_string()))?;
        log::debug!("bound PDFium from system library");
        Ok(Self::leak(Pdfium::new(bindings)))
    }

    fn leak(pdfium: Pdfium) -> Self {
        Self { pdfium: Box::leak(Box::new(pdfium)) }
    }
}

impl DocumentLoader for PdfiumEngine {
    fn load(&self, path: &Path) -> Result<Document, OpenError> {
        if !path.is_file() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }

        let document = self.pdfium.load_pdf_from_file(path, None).map_err(|err| {
            OpenError::DecodeFailure { path: path.to_path_buf(), detail: err.to_string() }
        })?;

        Ok(Document::new(path, Box::new(PdfiumBackend { document })))
    }
}

struct PdfiumBackend {
    document: PdfDocument<'static>,
}

impl PageRenderer for PdfiumBackend {
    fn render(&self, page_index: u32, dpi: u32) -> Result<RasterImage, RenderError> {
        let page_count = self.page_count();
        let index = u16::try_from(page_index)
            .map_err(|_| RenderError::PageOutOfRange { page_index, page_count })?;
        let page = self
            .document
            .pages()
            .get(index)
            .map_err(|_| RenderError::PageOutOfRange { page_index, page_count })?;

        let scale = dpi.max(1) as f32 / POINTS_PER_INCH;
        let width = (page.width().value * scale).round().max(1.0) as i32;
        let height = (page.height().value * scale).round().max(1.0) as i32;

        let config = PdfRenderConfig::new().set_target_width(width).set_target_height(height);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|err| RenderError::decode(page_index, err))?;

        let (out_width, out_height) = (bitmap.width() as u32, bitmap.height() as u32);
        RasterImage::from_raw(out_width, out_height, bitmap.as_rgba_bytes().to_vec())
            .ok_or_else(|| RenderError::decode(page_index, "bitmap size mismatch"))
    }
}

impl DocumentBackend for PdfiumBackend {
    fn page_count(&self) -> u32 {
        u32::from(self.document.pages().len())
    }

    fn extract_text(&self) -> Result<String, RenderError> {
        let mut text = String::new();

        for page in self.document.pages().iter() {
            let page_text =
                page.text().map_err(|err| RenderError::TextExtraction(err.to_string()))?;
            text.push_str(&page_text.all());
            text.push('\n');
        }

        Ok(text)
    }

    fn save(&self, path: &Path) -> Result<(), IoError> {
        self.document.save_to_file(path).map_err(|err| IoError::write_failure(path, err))
    }
}
