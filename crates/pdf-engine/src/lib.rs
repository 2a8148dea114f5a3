//! Document handles and the rendering seam used by the viewer.
//!
//! Everything above this crate talks to a decoded document through
//! [`Document`], which serializes calls into the underlying backend. Backends
//! implement [`DocumentBackend`] and are produced by a [`DocumentLoader`].

use image::{ImageBuffer, Rgba};
use lopdf::{Dictionary, Document as LopdfDocument, Object};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "pdfium")]
pub mod pdfium;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub type RasterImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

pub const POINTS_PER_INCH: f32 = 72.0;

const FRAME_COLOR: Rgba<u8> = Rgba([220, 220, 220, 255]);
const PAPER_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

    /// Pixel dimensions of the page rasterized at `dpi`.
    pub fn pixels_at(self, dpi: u32) -> (u32, u32) {
        let scale = dpi.max(1) as f32 / POINTS_PER_INCH;
        let width = (self.width_pt * scale).round().max(1.0) as u32;
        let height = (self.height_pt * scale).round().max(1.0) as u32;
        (width, height)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to decode {}: {detail}", path.display())]
    DecodeFailure { path: PathBuf, detail: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to render page {}: {detail}", page_index + 1)]
    DecodeFailure { page_index: u32, detail: String },
    #[error("page {page_index} out of range (page_count={page_count})")]
    PageOutOfRange { page_index: u32, page_count: u32 },
    #[error("failed to extract text: {0}")]
    TextExtraction(String),
}

impl RenderError {
    pub fn decode(page_index: u32, detail: impl fmt::Display) -> Self {
        Self::DecodeFailure { page_index, detail: detail.to_string() }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("failed to write {}: {detail}", path.display())]
    WriteFailure { path: PathBuf, detail: String },
}

impl IoError {
    pub fn write_failure(path: &Path, detail: impl fmt::Display) -> Self {
        Self::WriteFailure { path: path.to_path_buf(), detail: detail.to_string() }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::WriteFailure { path, .. } => path,
        }
    }
}

/// Rasterizes one page of an already decoded document.
///
/// Implementations may be slow and are not assumed to tolerate concurrent
/// calls; [`Document`] guarantees at most one call in flight per handle.
pub trait PageRenderer: Send {
    fn render(&self, page_index: u32, dpi: u32) -> Result<RasterImage, RenderError>;
}

pub trait DocumentBackend: PageRenderer {
    fn page_count(&self) -> u32;

    /// Text of the whole document.
    fn extract_text(&self) -> Result<String, RenderError>;

    /// Writes the loaded document to `path` unchanged.
    fn save(&self, path: &Path) -> Result<(), IoError>;
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, OpenError>;
}

/// Shared handle to a decoded document.
///
/// Clones refer to the same backend. Every backend call takes the handle's
/// lock, so a background job and the interactive thread never decode on the
/// same handle at the same time.
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

struct DocumentInner {
    source_path: PathBuf,
    page_count: u32,
    backend: Mutex<Box<dyn DocumentBackend>>,
}

impl Document {
    pub fn new(source_path: impl Into<PathBuf>, backend: Box<dyn DocumentBackend>) -> Self {
        let page_count = backend.page_count();

        Self {
            inner: Arc::new(DocumentInner {
                source_path: source_path.into(),
                page_count,
                backend: Mutex::new(backend),
            }),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.inner.source_path
    }

    pub fn page_count(&self) -> u32 {
        self.inner.page_count
    }

    pub fn contains_page(&self, page_index: u32) -> bool {
        page_index < self.inner.page_count
    }

    /// Indices of every page, in order.
    pub fn all_pages(&self) -> Vec<u32> {
        (0..self.inner.page_count).collect()
    }

    pub fn render_page(&self, page_index: u32, dpi: u32) -> Result<RasterImage, RenderError> {
        if !self.contains_page(page_index) {
            return Err(RenderError::PageOutOfRange {
                page_index,
                page_count: self.inner.page_count,
            });
        }

        self.backend().render(page_index, dpi)
    }

    pub fn extract_text(&self) -> Result<String, RenderError> {
        self.backend().extract_text()
    }

    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        self.backend().save(path)
    }

    fn backend(&self) -> MutexGuard<'_, Box<dyn DocumentBackend>> {
        self.inner.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("source_path", &self.inner.source_path)
            .field("page_count", &self.inner.page_count)
            .finish()
    }
}

/// Default backend built on lopdf.
///
/// lopdf parses the page tree, page boxes and text; it has no rasterizer, so
/// pages render as blank paper with a frame at the requested resolution.
/// Enable the `pdfium` feature for full rasterization.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfEngine;

impl LopdfEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn open_bytes(
        &self,
        source_path: impl Into<PathBuf>,
        bytes: Vec<u8>,
    ) -> Result<Document, OpenError> {
        let source_path = source_path.into();
        let page_sizes = parse_page_sizes(&bytes).map_err(|detail| {
            OpenError::DecodeFailure { path: source_path.clone(), detail }
        })?;

        log::debug!("decoded {} ({} pages)", source_path.display(), page_sizes.len());

        Ok(Document::new(source_path, Box::new(LopdfBackend { bytes, page_sizes })))
    }
}

impl DocumentLoader for LopdfEngine {
    fn load(&self, path: &Path) -> Result<Document, OpenError> {
        if !path.is_file() {
            return Err(OpenError::NotFound(path.to_path_buf()));
        }

        let bytes = fs::read(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => OpenError::NotFound(path.to_path_buf()),
            _ => OpenError::DecodeFailure { path: path.to_path_buf(), detail: err.to_string() },
        })?;

        self.open_bytes(path, bytes)
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

struct LopdfBackend {
    bytes: Vec<u8>,
    page_sizes: Vec<PageSize>,
}

impl PageRenderer for LopdfBackend {
    fn render(&self, page_index: u32, dpi: u32) -> Result<RasterImage, RenderError> {
        let size = self.page_sizes.get(page_index as usize).copied().ok_or(
            RenderError::PageOutOfRange { page_index, page_count: self.page_sizes.len() as u32 },
        )?;

        let (width, height) = size.pixels_at(dpi);
        let mut image = RasterImage::from_pixel(width, height, PAPER_COLOR);

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, FRAME_COLOR);
                image.put_pixel(x, height - 1, FRAME_COLOR);
            }
            for y in 0..height {
                image.put_pixel(0, y, FRAME_COLOR);
                image.put_pixel(width - 1, y, FRAME_COLOR);
            }
        }

        Ok(image)
    }
}

impl DocumentBackend for LopdfBackend {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn extract_text(&self) -> Result<String, RenderError> {
        let doc = LopdfDocument::load_mem(&self.bytes)
            .map_err(|err| RenderError::TextExtraction(err.to_string()))?;
        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();

        if page_numbers.is_empty() {
            return Ok(String::new());
        }

        doc.extract_text(&page_numbers).map_err(|err| RenderError::TextExtraction(err.to_string()))
    }

    fn save(&self, path: &Path) -> Result<(), IoError> {
        fs::write(path, &self.bytes).map_err(|err| IoError::write_failure(path, err))
    }
}

fn parse_page_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, String> {
    if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err("encrypted documents are not supported by the default backend".to_owned());
    }

    let doc = LopdfDocument::load_mem(bytes).map_err(|err| err.to_string())?;
    let pages = doc.get_pages();
    let mut sizes = Vec::with_capacity(pages.len());

    for (_, object_id) in pages {
        let dict = doc.get_dictionary(object_id).map_err(|err| err.to_string())?;
        sizes.push(inherited_media_box(&doc, dict).unwrap_or(PageSize::LETTER));
    }

    Ok(sizes)
}

/// Looks up `/MediaBox` on the page, then up the `/Parent` chain.
fn inherited_media_box(doc: &LopdfDocument, page: &Dictionary) -> Option<PageSize> {
    let mut dict = page;

    for _ in 0..32 {
        if let Some(size) = dict.get(b"MediaBox").ok().and_then(media_box_size) {
            return Some(size);
        }

        let parent = dict.get(b"Parent").ok()?.as_reference().ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn media_box_size(obj: &Object) -> Option<PageSize> {
    let array = obj.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;

    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_pdf_bytes, write_sample_pdf, ScriptedBackend};

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let doc = LopdfEngine::new()
            .open_bytes("sample.pdf", sample_pdf_bytes(3))
            .expect("open should succeed");

        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.source_path(), Path::new("sample.pdf"));
    }

    #[test]
    fn load_reports_missing_file_as_not_found() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let err = LopdfEngine::new()
            .load(&temp.path().join("missing.pdf"))
            .expect_err("missing file should fail");

        assert!(matches!(err, OpenError::NotFound(_)));
        assert!(err.to_string().contains("file does not exist"));
    }

    #[test]
    fn load_reports_garbage_as_decode_failure() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("invalid.pdf");
        fs::write(&path, b"this is not a pdf").expect("fixture should be written");

        let err = LopdfEngine::new().load(&path).expect_err("garbage should fail");
        assert!(matches!(err, OpenError::DecodeFailure { .. }));
    }

    #[test]
    fn render_scales_page_box_by_dpi() {
        let doc = LopdfEngine::new()
            .open_bytes("sample.pdf", sample_pdf_bytes(1))
            .expect("open should succeed");

        let at_72 = doc.render_page(0, 72).expect("render should succeed");
        assert_eq!(at_72.dimensions(), (612, 792));

        let at_36 = doc.render_page(0, 36).expect("render should succeed");
        assert_eq!(at_36.dimensions(), (306, 396));
    }

    #[test]
    fn render_rejects_out_of_range_page() {
        let doc = LopdfEngine::new()
            .open_bytes("sample.pdf", sample_pdf_bytes(2))
            .expect("open should succeed");

        let err = doc.render_page(2, 72).expect_err("page 2 does not exist");
        assert!(matches!(err, RenderError::PageOutOfRange { page_index: 2, page_count: 2 }));
    }

    #[test]
    fn save_writes_original_bytes_verbatim() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let source = write_sample_pdf(temp.path(), "source.pdf", 2);
        let doc = LopdfEngine::new().load(&source).expect("open should succeed");

        let copy = temp.path().join("copy.pdf");
        doc.save(&copy).expect("save should succeed");

        assert_eq!(fs::read(&source).unwrap(), fs::read(&copy).unwrap());
    }

    #[test]
    fn save_into_missing_directory_is_write_failure() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let doc = LopdfEngine::new()
            .open_bytes("sample.pdf", sample_pdf_bytes(1))
            .expect("open should succeed");

        let target = temp.path().join("no-such-dir").join("out.pdf");
        let err = doc.save(&target).expect_err("save should fail");
        assert_eq!(err.path(), target.as_path());
    }

    #[test]
    fn clones_share_one_backend() {
        let backend = ScriptedBackend::new(4);
        let log = backend.log();
        let doc = backend.into_document("scripted.pdf");
        let clone = doc.clone();

        doc.render_page(1, 72).expect("render should succeed");
        clone.render_page(3, 72).expect("render should succeed");

        assert_eq!(clone.page_count(), 4);
        assert_eq!(clone.source_path(), Path::new("scripted.pdf"));
        assert_eq!(log.calls(), vec![(1, 72), (3, 72)]);
    }

    #[test]
    fn page_size_pixels_never_collapse_to_zero() {
        let tiny = PageSize { width_pt: 0.1, height_pt: 0.1 };
        assert_eq!(tiny.pixels_at(72), (1, 1));
        assert_eq!(PageSize::LETTER.pixels_at(0), PageSize::LETTER.pixels_at(1));
    }

    #[test]
    fn error_messages_use_one_based_pages() {
        let err = RenderError::decode(2, "bad stream");
        assert_eq!(err.to_string(), "failed to render page 3: bad stream");
    }
}
