//! Fixtures for exercising the engine and everything built on it.

use crate::{
    Document, DocumentBackend, DocumentLoader, IoError, OpenError, PageRenderer, PageSize,
    RasterImage, RenderError,
};
use image::Rgba;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document as LopdfDocument, Object, Stream};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Builds a letter-sized PDF whose page `n` reads "Page n".
pub fn sample_pdf_bytes(page_count: u32) -> Vec<u8> {
    let mut doc = LopdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for index in 0..page_count {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::string_literal(format!("Page {}", index + 1))],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content.encode().expect("content stream should encode");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => i64::from(page_count),
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("sample pdf should serialize");
    bytes
}

pub fn write_sample_pdf(dir: &Path, name: &str, page_count: u32) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, sample_pdf_bytes(page_count)).expect("sample pdf should be written");
    path
}

/// Shared record of what a [`ScriptedBackend`] was asked to do.
#[derive(Debug, Default)]
pub struct RenderLog {
    calls: Mutex<Vec<(u32, u32)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RenderLog {
    /// `(page_index, dpi)` of every render call, in call order.
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn pages_requested(&self) -> Vec<u32> {
        self.calls().into_iter().map(|(page, _)| page).collect()
    }

    pub fn max_concurrent_renders(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self, page_index: u32, dpi: u32) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push((page_index, dpi));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory backend with programmable failures and latency.
///
/// Rendered pages are solid images whose size follows the page box and dpi,
/// and whose red channel carries the page index.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    page_count: u32,
    page_size: PageSize,
    failing_pages: HashSet<u32>,
    delay: Duration,
    text: Option<String>,
    fail_save: bool,
    log: Arc<RenderLog>,
}

impl ScriptedBackend {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            page_size: PageSize { width_pt: 72.0, height_pt: 144.0 },
            failing_pages: HashSet::new(),
            delay: Duration::ZERO,
            text: None,
            fail_save: false,
            log: Arc::new(RenderLog::default()),
        }
    }

    pub fn with_page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn fail_on(mut self, page_index: u32) -> Self {
        self.failing_pages.insert(page_index);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn fail_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    pub fn log(&self) -> Arc<RenderLog> {
        Arc::clone(&self.log)
    }

    pub fn into_document(self, source_path: impl Into<PathBuf>) -> Document {
        Document::new(source_path, Box::new(self))
    }
}

impl PageRenderer for ScriptedBackend {
    fn render(&self, page_index: u32, dpi: u32) -> Result<RasterImage, RenderError> {
        self.log.enter(page_index, dpi);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.log.leave();

        if self.failing_pages.contains(&page_index) {
            return Err(RenderError::decode(page_index, "scripted failure"));
        }

        let (width, height) = self.page_size.pixels_at(dpi);
        let marker = (page_index % 256) as u8;
        Ok(RasterImage::from_pixel(width, height, Rgba([marker, 0, 0, 255])))
    }
}

impl DocumentBackend for ScriptedBackend {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn extract_text(&self) -> Result<String, RenderError> {
        match &self.text {
            Some(text) => Ok(text.clone()),
            None => Ok((1..=self.page_count).map(|n| format!("Page {n}\n")).collect()),
        }
    }

    fn save(&self, path: &Path) -> Result<(), IoError> {
        if self.fail_save {
            return Err(IoError::write_failure(path, "scripted failure"));
        }

        fs::write(path, format!("%PDF-scripted {} pages", self.page_count))
            .map_err(|err| IoError::write_failure(path, err))
    }
}

/// Loader that serves registered [`ScriptedBackend`]s by path.
///
/// Unregistered paths are reported as missing; paths marked corrupt fail to
/// decode.
#[derive(Debug, Default)]
pub struct ScriptedLoader {
    documents: HashMap<PathBuf, ScriptedBackend>,
    corrupt: HashSet<PathBuf>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, path: impl Into<PathBuf>, backend: ScriptedBackend) -> Self {
        self.documents.insert(path.into(), backend);
        self
    }

    pub fn with_corrupt(mut self, path: impl Into<PathBuf>) -> Self {
        self.corrupt.insert(path.into());
        self
    }
}

impl DocumentLoader for ScriptedLoader {
    fn load(&self, path: &Path) -> Result<Document, OpenError> {
        if self.corrupt.contains(path) {
            return Err(OpenError::DecodeFailure {
                path: path.to_path_buf(),
                detail: "scripted corruption".to_owned(),
            });
        }

        self.documents
            .get(path)
            .cloned()
            .map(|backend| backend.into_document(path))
            .ok_or_else(|| OpenError::NotFound(path.to_path_buf()))
    }
}
