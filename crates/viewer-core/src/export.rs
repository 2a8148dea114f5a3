//! Export of the open document to PDF, page images or text.
//!
//! PDF and TXT exports run synchronously. PNG and JPEG exports run as a
//! background render job whose stage encodes and writes each page on the
//! worker; the interactive side only tracks progress.

use image::{DynamicImage, ImageError, ImageFormat};
use pageview_engine::{Document, IoError, RasterImage, RenderError};
use pageview_scheduler::{JobError, JobHandle, RenderEvent, RenderPipeline};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Png,
    Jpeg,
    Txt,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [Self::Pdf, Self::Png, Self::Jpeg, Self::Txt];

    /// Picks a format from the destination's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        extension.parse().ok()
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Txt => "txt",
        }
    }

    /// Whether the export writes one image per page in the background.
    pub fn is_image(self) -> bool {
        matches!(self, Self::Png | Self::Jpeg)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pdf => "PDF",
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::Txt => "TXT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown export format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for ExportFormat {
    type Err = UnknownFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "png" => Ok(Self::Png),
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "txt" | "text" => Ok(Self::Txt),
            _ => Err(UnknownFormat(value.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no document is open")]
    NoDocument,

    #[error("an image export is already running")]
    Busy,

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to encode page {}: {detail}", page_index + 1)]
    Encode { page_index: u32, detail: String },

    #[error("failed to start export job: {0}")]
    Spawn(#[from] io::Error),
}

impl From<JobError> for ExportError {
    fn from(error: JobError) -> Self {
        match error {
            JobError::Render(error) => Self::Render(error),
            JobError::Write(error) => Self::Io(error),
            JobError::Encode { page_index, detail } => Self::Encode { page_index, detail },
        }
    }
}

/// State of the modal progress surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportProgress {
    pub completed: usize,
    pub total: usize,
}

impl ExportProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }

        self.completed as f64 / self.total as f64
    }
}

/// Result of starting an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The export ran synchronously and wrote these files.
    Finished { written: Vec<PathBuf> },
    /// A background job was launched for `total` pages.
    Started { total: usize },
}

/// Change in a running image export, applied on the interactive thread.
#[derive(Debug)]
pub enum ExportUpdate {
    Progress(ExportProgress),
    Finished { format: ExportFormat, written: Vec<PathBuf> },
    Failed { error: ExportError, written: Vec<PathBuf> },
    Cancelled { written: Vec<PathBuf> },
}

impl ExportUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// `<destination dir>/<stem>_<n>.<ext>` for the 0-based `page_index`.
pub fn page_file_path(destination: &Path, page_index: u32, format: ExportFormat) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    let file_name = format!("{stem}_{}.{}", page_index + 1, format.extension());

    match destination.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file_name),
        _ => PathBuf::from(file_name),
    }
}

fn write_page_image(
    destination: &Path,
    page_index: u32,
    format: ExportFormat,
    image: RasterImage,
) -> Result<PathBuf, JobError> {
    let path = page_file_path(destination, page_index, format);

    let result = match format {
        ExportFormat::Jpeg => {
            DynamicImage::ImageRgba8(image).to_rgb8().save_with_format(&path, ImageFormat::Jpeg)
        }
        _ => image.save_with_format(&path, ImageFormat::Png),
    };

    result.map_err(|err| match err {
        ImageError::IoError(source) => JobError::Write(IoError::write_failure(&path, source)),
        other => JobError::encode(page_index, other),
    })?;

    Ok(path)
}

struct ImageExport {
    format: ExportFormat,
    job: JobHandle<PathBuf>,
    progress: ExportProgress,
    written: Vec<PathBuf>,
}

/// Runs exports and owns at most one background image export.
#[derive(Default)]
pub struct ExportCoordinator {
    active: Option<ImageExport>,
}

impl ExportCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an image export is running, which keeps the progress modal up.
    pub fn is_blocking(&self) -> bool {
        self.active.is_some()
    }

    pub fn progress(&self) -> Option<ExportProgress> {
        self.active.as_ref().map(|export| export.progress)
    }

    pub fn export(
        &mut self,
        pipeline: &RenderPipeline,
        document: &Document,
        format: ExportFormat,
        destination: &Path,
        dpi: u32,
    ) -> Result<ExportOutcome, ExportError> {
        if self.active.is_some() {
            return Err(ExportError::Busy);
        }

        match format {
            ExportFormat::Pdf => {
                document.save(destination)?;
                log::info!(
                    "saved {} to {}",
                    document.source_path().display(),
                    destination.display()
                );
                Ok(ExportOutcome::Finished { written: vec![destination.to_path_buf()] })
            }
            ExportFormat::Txt => {
                let text = document.extract_text()?;
                fs::write(destination, text)
                    .map_err(|err| IoError::write_failure(destination, err))?;
                log::info!(
                    "wrote text of {} to {}",
                    document.source_path().display(),
                    destination.display()
                );
                Ok(ExportOutcome::Finished { written: vec![destination.to_path_buf()] })
            }
            ExportFormat::Png | ExportFormat::Jpeg => {
                let target = destination.to_path_buf();
                let job = pipeline.submit_with(
                    document,
                    document.all_pages(),
                    dpi,
                    move |page_index, image| write_page_image(&target, page_index, format, image),
                )?;

                let total = job.total();
                log::info!("{}: exporting {total} pages as {format}", job.id());
                self.active = Some(ImageExport {
                    format,
                    job,
                    progress: ExportProgress { completed: 0, total },
                    written: Vec::new(),
                });

                Ok(ExportOutcome::Started { total })
            }
        }
    }

    /// Applies every event the export job has sent so far.
    pub fn poll(&mut self) -> Vec<ExportUpdate> {
        let events = match self.active.as_mut() {
            Some(export) => export.job.try_events(),
            None => return Vec::new(),
        };

        let mut updates = Vec::with_capacity(events.len());
        for event in events {
            updates.push(self.apply(event));
            if self.active.is_none() {
                break;
            }
        }
        updates
    }

    /// Blocks until the running export ends, returning every update.
    pub fn wait(&mut self) -> Vec<ExportUpdate> {
        let mut updates = Vec::new();

        while let Some(export) = self.active.as_mut() {
            match export.job.next_event() {
                Some(event) => updates.push(self.apply(event)),
                None => {
                    // Worker exited without a terminal event.
                    if let Some(export) = self.active.take() {
                        updates.push(ExportUpdate::Cancelled { written: export.written });
                    }
                }
            }
        }

        updates
    }

    /// Cancels the running export and waits for its worker.
    ///
    /// Files already written stay on disk.
    pub fn cancel(&mut self) -> Option<ExportUpdate> {
        let export = self.active.take()?;
        log::info!("{}: export cancelled", export.job.id());
        export.job.cancel_and_wait();
        Some(ExportUpdate::Cancelled { written: export.written })
    }

    fn apply(&mut self, event: RenderEvent<PathBuf>) -> ExportUpdate {
        if event.is_terminal() {
            let Some(ImageExport { format, job, written, .. }) = self.active.take() else {
                return ExportUpdate::Cancelled { written: Vec::new() };
            };
            // The worker has sent its last event, so joining returns promptly.
            job.cancel_and_wait();

            return match event {
                RenderEvent::Failed { error, .. } => {
                    log::warn!("image export failed: {error}");
                    ExportUpdate::Failed { error: error.into(), written }
                }
                RenderEvent::Completed { .. } => {
                    log::info!("image export wrote {} files", written.len());
                    ExportUpdate::Finished { format, written }
                }
                _ => ExportUpdate::Cancelled { written },
            };
        }

        let Some(export) = self.active.as_mut() else {
            return ExportUpdate::Cancelled { written: Vec::new() };
        };
        if let RenderEvent::Delivered { output, .. } = event {
            export.written.push(output);
            export.progress.completed += 1;
        }
        ExportUpdate::Progress(export.progress)
    }
}
