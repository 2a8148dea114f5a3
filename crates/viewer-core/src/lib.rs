//! Viewer core: modes, viewport and export on top of the render pipeline.

mod config;
mod controls;
mod export;
mod surface;
mod viewer;
mod viewport;

pub use config::{ConfigError, ViewerConfig};
pub use controls::{ActionState, NavControls, Notice, NoticeKind};
pub use export::{
    page_file_path, ExportCoordinator, ExportError, ExportFormat, ExportOutcome, ExportProgress,
    ExportUpdate, UnknownFormat,
};
pub use surface::{ContinuousStrip, PageView, Surface, ThumbnailGrid, PAGE_SPACING};
pub use viewer::{ViewMode, ViewerStateMachine};
pub use viewport::{ViewportTransform, ZoomControl};

pub use pageview_engine::{Document, DocumentLoader, OpenError, RasterImage, RenderError};
