//! The view-mode state machine.
//!
//! [`ViewerStateMachine`] owns everything the interactive thread touches: the
//! open document, the active mode, the mounted surface, the viewport and the
//! controls. Background jobs only send events; [`ViewerStateMachine::pump`]
//! applies them.

use crate::controls::{ActionState, NavControls, Notice};
use crate::export::{
    ExportCoordinator, ExportError, ExportFormat, ExportOutcome, ExportProgress, ExportUpdate,
};
use crate::surface::{ContinuousStrip, PageView, Surface, ThumbnailGrid};
use crate::viewport::{ViewportTransform, ZoomControl};
use crate::ViewerConfig;
use pageview_engine::{Document, DocumentLoader, OpenError, RenderError};
use pageview_scheduler::{JobHandle, RenderEvent, RenderPipeline};
use serde::Serialize;
use std::fmt;
use std::mem;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViewMode {
    PageByPage,
    Slideshow,
    Thumbnails,
    ContinuousScroll,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] =
        [Self::PageByPage, Self::Slideshow, Self::Thumbnails, Self::ContinuousScroll];

    /// Whether the mode fills its surface with a background job.
    pub fn is_bulk(self) -> bool {
        matches!(self, Self::Thumbnails | Self::ContinuousScroll)
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PageByPage => "page by page",
            Self::Slideshow => "slideshow",
            Self::Thumbnails => "thumbnails",
            Self::ContinuousScroll => "continuous scroll",
        };
        f.write_str(name)
    }
}

struct BulkJob {
    mode: ViewMode,
    handle: JobHandle,
}

pub struct ViewerStateMachine {
    config: ViewerConfig,
    loader: Box<dyn DocumentLoader>,
    pipeline: RenderPipeline,
    document: Option<Document>,
    active_mode: Option<ViewMode>,
    current_page: u32,
    surface: Surface,
    nav: NavControls,
    actions: ActionState,
    viewport: ViewportTransform,
    zoom_control: ZoomControl,
    bulk: Option<BulkJob>,
    export: ExportCoordinator,
    notices: Vec<Notice>,
}

impl ViewerStateMachine {
    pub fn new(loader: Box<dyn DocumentLoader>, config: ViewerConfig) -> Self {
        let viewport = ViewportTransform::new(
            config.zoom_intensity,
            config.initial_scale,
            config.viewport_width,
            config.viewport_height,
        );
        let zoom_control = ZoomControl::new(viewport.scale());

        Self {
            config,
            loader,
            pipeline: RenderPipeline::new(),
            document: None,
            active_mode: None,
            current_page: 0,
            surface: Surface::Empty,
            nav: NavControls::default(),
            actions: ActionState::default(),
            viewport,
            zoom_control,
            bulk: None,
            export: ExportCoordinator::new(),
            notices: Vec::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, Document::page_count)
    }

    pub fn active_mode(&self) -> Option<ViewMode> {
        self.active_mode
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn nav(&self) -> &NavControls {
        &self.nav
    }

    pub fn actions(&self) -> ActionState {
        self.actions
    }

    pub fn viewport(&self) -> &ViewportTransform {
        &self.viewport
    }

    pub fn zoom_control(&self) -> &ZoomControl {
        &self.zoom_control
    }

    /// Whether a Thumbnails or ContinuousScroll job is still running.
    pub fn is_rendering(&self) -> bool {
        self.bulk.is_some()
    }

    /// Progress of the running image export, shown in a modal.
    pub fn export_progress(&self) -> Option<ExportProgress> {
        self.export.progress()
    }

    pub fn is_export_blocking(&self) -> bool {
        self.export.is_blocking()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        mem::take(&mut self.notices)
    }

    /// Opens `path`, replacing any open document, and enters PageByPage.
    ///
    /// A running image export is allowed to finish first.
    pub fn open_document(&mut self, path: &Path) -> Result<Document, OpenError> {
        if self.export.is_blocking() {
            log::info!("waiting for image export before opening {}", path.display());
            self.finish_export();
        }

        let document = match self.loader.load(path) {
            Ok(document) => document,
            Err(err) => {
                self.notify_error(format!("Could not open {}: {err}", path.display()));
                return Err(err);
            }
        };

        log::info!("opened {} ({} pages)", path.display(), document.page_count());

        self.cancel_bulk();
        self.document = Some(document.clone());
        self.current_page = 0;
        self.actions = ActionState { modes_enabled: true, export_enabled: true };
        self.nav.fill_entries(document.page_count());

        // Re-entering PageByPage must re-render even when it is already active.
        self.active_mode = None;
        self.enter_mode_at(&document, ViewMode::PageByPage, 0);

        Ok(document)
    }

    pub fn enter_mode(&mut self, mode: ViewMode) {
        if self.export_blocks("enter mode") {
            return;
        }

        let Some(document) = self.document.clone() else {
            log::warn!("cannot enter {mode}: no document is open");
            return;
        };

        if self.active_mode == Some(mode) {
            return;
        }

        self.enter_mode_at(&document, mode, 0);
    }

    fn enter_mode_at(&mut self, document: &Document, mode: ViewMode, start_page: u32) {
        log::debug!("entering {mode}");

        self.cancel_bulk();
        self.surface = Surface::Empty;
        self.active_mode = Some(mode);
        self.viewport.set_content_size(0.0, 0.0);
        self.viewport.reset(self.config.initial_scale);
        self.zoom_control.sync_from(self.viewport.scale());
        self.current_page = 0;
        self.nav.disable();

        match mode {
            ViewMode::PageByPage => {
                self.nav.visible = true;
                // Failures surface as notices.
                let _ = self.show_page(start_page, true);
            }
            ViewMode::Slideshow => {
                self.nav.visible = false;
                let _ = self.show_page(start_page, false);
            }
            ViewMode::Thumbnails => {
                self.nav.visible = false;
                self.surface = Surface::Thumbnails(ThumbnailGrid::new(
                    self.config.thumbnail_item_width,
                    self.viewport.viewport_size().0,
                ));
                self.start_bulk(document, mode, document.all_pages());
            }
            ViewMode::ContinuousScroll => {
                self.nav.visible = false;
                self.surface = Surface::Continuous(ContinuousStrip::new());
                self.start_bulk(document, mode, document.all_pages());
            }
        }
    }

    /// Renders `page_index` at display resolution and mounts it.
    ///
    /// Out-of-range indices are ignored and leave `current_page` unchanged.
    /// With `affects_nav` the previous/next buttons and the page selector
    /// follow the new page.
    pub fn show_page(&mut self, page_index: u32, affects_nav: bool) -> Result<(), RenderError> {
        if self.export_blocks("show page") {
            return Ok(());
        }

        let Some(document) = self.document.as_ref() else {
            return Ok(());
        };

        let slideshow = match self.active_mode {
            Some(ViewMode::PageByPage) => false,
            Some(ViewMode::Slideshow) => true,
            _ => {
                log::debug!("ignoring show_page outside single-page modes");
                return Ok(());
            }
        };

        if !document.contains_page(page_index) {
            log::debug!("ignoring out-of-range page {page_index}");
            return Ok(());
        }

        let page_count = document.page_count();
        let image = match document.render_page(page_index, self.config.display_dpi) {
            Ok(image) => image,
            Err(err) => {
                self.notify_error(format!("Could not render page {}: {err}", page_index + 1));
                return Err(err);
            }
        };

        let view = PageView::new(page_index, image);
        let (width, height) = view.size();
        self.surface = if slideshow { Surface::Slideshow(view) } else { Surface::SinglePage(view) };
        self.viewport.set_content_size(width, height);
        self.viewport.reset_scroll();
        self.current_page = page_index;

        if affects_nav {
            self.nav.update(page_index, page_count);
        }

        Ok(())
    }

    pub fn next_page(&mut self) -> Result<(), RenderError> {
        match self.active_mode {
            Some(ViewMode::PageByPage) if self.nav.next_enabled => {
                self.show_page(self.current_page + 1, true)
            }
            Some(ViewMode::Slideshow) => self.show_page(self.current_page.saturating_add(1), false),
            _ => Ok(()),
        }
    }

    pub fn prev_page(&mut self) -> Result<(), RenderError> {
        match self.active_mode {
            Some(ViewMode::PageByPage) if self.nav.prev_enabled => {
                self.show_page(self.current_page - 1, true)
            }
            Some(ViewMode::Slideshow) if self.current_page > 0 => {
                self.show_page(self.current_page - 1, false)
            }
            _ => Ok(()),
        }
    }

    /// Page selector picked the 0-based `entry`.
    pub fn select_page(&mut self, entry: usize) -> Result<(), RenderError> {
        if self.active_mode != Some(ViewMode::PageByPage) {
            return Ok(());
        }

        match u32::try_from(entry) {
            Ok(page_index) => self.show_page(page_index, true),
            Err(_) => Ok(()),
        }
    }

    /// Wheel gesture over the surface with the cursor at `cursor`.
    pub fn zoom_gesture(&mut self, delta: f64, cursor: (f64, f64)) {
        if self.export_blocks("zoom") {
            return;
        }

        let scale = self.viewport.zoom_at(delta, cursor);
        self.zoom_control.sync_from(scale);
    }

    /// Zoom control dragged to `value`.
    pub fn set_zoom_control(&mut self, value: f64) {
        if self.export_blocks("zoom") {
            return;
        }

        if let Some(scale) = self.zoom_control.changed(value) {
            self.viewport.set_scale(scale);
        }
    }

    pub fn resize_viewport(&mut self, width: f64, height: f64) {
        self.viewport.set_viewport_size(width, height);

        if let Surface::Thumbnails(grid) = &mut self.surface {
            grid.resize(width);
        }
    }

    /// Toggles the selected marker; returns whether the page is now selected.
    pub fn click_thumbnail(&mut self, page_index: u32) -> bool {
        match &mut self.surface {
            Surface::Thumbnails(grid) => grid.toggle_selected(page_index),
            _ => false,
        }
    }

    /// Opens the page in PageByPage once the grid's job has finished.
    pub fn double_click_thumbnail(&mut self, page_index: u32) {
        if self.export_blocks("open thumbnail") {
            return;
        }

        let ready = match &self.surface {
            Surface::Thumbnails(grid) => grid.is_finished() && grid.contains(page_index),
            _ => false,
        };
        if !ready {
            log::debug!("ignoring double click on thumbnail {page_index}");
            return;
        }

        if let Some(document) = self.document.clone() {
            self.enter_mode_at(&document, ViewMode::PageByPage, page_index);
        }
    }

    /// Exports the open document. Image exports continue in the background
    /// and report through [`pump`](Self::pump).
    pub fn export(&mut self, format: ExportFormat, destination: &Path) -> Result<(), ExportError> {
        let Some(document) = self.document.clone() else {
            self.notify_error("Nothing to export: no document is open");
            return Err(ExportError::NoDocument);
        };

        if self.export.is_blocking() {
            self.notify_error(ExportError::Busy.to_string());
            return Err(ExportError::Busy);
        }

        if format.is_image() {
            // The bulk job resumes once the export ends.
            self.pause_bulk();
        }

        let result = self.export.export(
            &self.pipeline,
            &document,
            format,
            destination,
            self.config.export_dpi,
        );

        match result {
            Ok(ExportOutcome::Finished { .. }) => {
                self.notify_info(format!("Exported {format} to {}", destination.display()));
                Ok(())
            }
            Ok(ExportOutcome::Started { total }) => {
                log::debug!("image export started for {total} pages");
                Ok(())
            }
            Err(err) => {
                self.notify_error(format!("{format} export failed: {err}"));
                self.resume_bulk();
                Err(err)
            }
        }
    }

    /// Cancels a running image export. Files already written stay on disk.
    pub fn cancel_export(&mut self) {
        if let Some(update) = self.export.cancel() {
            self.apply_export_update(update);
        }
    }

    /// Applies every event the background jobs have sent so far and returns
    /// how many were applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;

        let events = match self.bulk.as_mut() {
            Some(bulk) => bulk.handle.try_events(),
            None => Vec::new(),
        };
        for event in events {
            self.apply_bulk_event(event);
            applied += 1;
        }

        for update in self.export.poll() {
            self.apply_export_update(update);
            applied += 1;
        }

        applied
    }

    /// Blocks until the bulk job and any image export have ended, applying
    /// their events along the way.
    pub fn wait_for_background(&mut self) {
        loop {
            if self.export.is_blocking() {
                self.finish_export();
                continue;
            }

            let Some(bulk) = self.bulk.as_mut() else {
                break;
            };

            match bulk.handle.next_event() {
                Some(event) => self.apply_bulk_event(event),
                None => self.bulk = None,
            }
        }
    }

    fn finish_export(&mut self) {
        for update in self.export.wait() {
            self.apply_export_update(update);
        }
    }

    fn export_blocks(&self, action: &str) -> bool {
        if self.export.is_blocking() {
            log::warn!("ignoring {action}: image export in progress");
            return true;
        }
        false
    }

    fn start_bulk(&mut self, document: &Document, mode: ViewMode, pages: Vec<u32>) {
        let dpi = match mode {
            ViewMode::Thumbnails => self.config.thumbnail_dpi,
            _ => self.config.continuous_dpi,
        };

        match self.pipeline.submit(document, pages, dpi) {
            Ok(handle) => self.bulk = Some(BulkJob { mode, handle }),
            Err(err) => self.notify_error(format!("Could not start rendering: {err}")),
        }
    }

    fn cancel_bulk(&mut self) {
        if let Some(bulk) = self.bulk.take() {
            log::debug!("{}: cancelling {} job", bulk.handle.id(), bulk.mode);
            bulk.handle.cancel_and_wait();
        }
    }

    /// Stops the bulk job and applies whatever it had already sent, so a
    /// queued failure still ends the surface instead of being retried.
    fn pause_bulk(&mut self) {
        let Some(bulk) = self.bulk.take() else {
            return;
        };

        log::debug!("{}: pausing {} job", bulk.handle.id(), bulk.mode);
        for event in bulk.handle.cancel_and_drain() {
            self.apply_bulk_event(event);
        }
    }

    /// Restarts the surface's job after the pages it already holds.
    fn resume_bulk(&mut self) {
        if self.bulk.is_some() {
            return;
        }
        let Some(document) = self.document.clone() else {
            return;
        };

        let (mode, rendered) = match &self.surface {
            Surface::Thumbnails(grid) if !grid.is_finished() => (ViewMode::Thumbnails, grid.len()),
            Surface::Continuous(strip) if !strip.is_finished() => {
                (ViewMode::ContinuousScroll, strip.len())
            }
            _ => return,
        };

        let pages = (rendered as u32..document.page_count()).collect();
        log::debug!("resuming {mode} from page {}", rendered + 1);
        self.start_bulk(&document, mode, pages);
    }

    fn apply_bulk_event(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::Delivered { page_index, output, .. } => match &mut self.surface {
                Surface::Thumbnails(grid) => grid.push(page_index, output),
                Surface::Continuous(strip) => {
                    strip.push(page_index, output);
                    let (width, height) = strip.size();
                    self.viewport.set_content_size(width, height);
                }
                _ => log::debug!("dropping page {page_index}: surface was replaced"),
            },
            RenderEvent::Failed { page_index, error, .. } => {
                self.notify_error(format!("Could not render page {}: {error}", page_index + 1));
                self.mark_surface_finished();
                self.cancel_bulk();
            }
            RenderEvent::Completed { .. } => {
                self.mark_surface_finished();
                self.cancel_bulk();
            }
            RenderEvent::Cancelled { .. } => {
                self.cancel_bulk();
            }
        }
    }

    fn mark_surface_finished(&mut self) {
        match &mut self.surface {
            Surface::Thumbnails(grid) => grid.mark_finished(),
            Surface::Continuous(strip) => strip.mark_finished(),
            _ => {}
        }
    }

    fn apply_export_update(&mut self, update: ExportUpdate) {
        let terminal = update.is_terminal();

        match update {
            ExportUpdate::Progress(progress) => {
                log::debug!("export progress {}/{}", progress.completed, progress.total);
            }
            ExportUpdate::Finished { format, written } => {
                self.notify_info(format!("Exported {} {format} file(s)", written.len()));
            }
            ExportUpdate::Failed { error, written } => {
                self.notify_error(format!(
                    "Export failed after {} file(s): {error}",
                    written.len()
                ));
            }
            ExportUpdate::Cancelled { written } => {
                self.notify_info(format!("Export cancelled after {} file(s)", written.len()));
            }
        }

        if terminal {
            self.resume_bulk();
        }
    }

    fn notify_error(&mut self, message: impl Into<String>) {
        let notice = Notice::error(message);
        log::warn!("{}", notice.message);
        self.notices.push(notice);
    }

    fn notify_info(&mut self, message: impl Into<String>) {
        let notice = Notice::info(message);
        log::info!("{}", notice.message);
        self.notices.push(notice);
    }
}

impl Drop for ViewerStateMachine {
    fn drop(&mut self) {
        self.cancel_bulk();
        self.export.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::NoticeKind;
    use pageview_engine::testing::{RenderLog, ScriptedBackend, ScriptedLoader};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const DOC: &str = "doc.pdf";

    fn viewer_with(backend: ScriptedBackend) -> (ViewerStateMachine, Arc<RenderLog>) {
        let log = backend.log();
        let loader = ScriptedLoader::new().with_document(DOC, backend).with_corrupt("corrupt.pdf");
        let viewer = ViewerStateMachine::new(Box::new(loader), ViewerConfig::default());
        (viewer, log)
    }

    fn opened(backend: ScriptedBackend) -> (ViewerStateMachine, Arc<RenderLog>) {
        let (mut viewer, log) = viewer_with(backend);
        viewer.open_document(Path::new(DOC)).unwrap();
        (viewer, log)
    }

    fn pages_at(log: &RenderLog, dpi: u32) -> Vec<u32> {
        log.calls().into_iter().filter(|(_, d)| *d == dpi).map(|(page, _)| page).collect()
    }

    fn assert_nav_matches(viewer: &ViewerStateMachine) {
        let nav = viewer.nav();
        assert_eq!(nav.prev_enabled, viewer.current_page() > 0);
        assert_eq!(nav.next_enabled, viewer.current_page() + 1 < viewer.page_count());
    }

    #[test]
    fn three_page_navigation_scenario() {
        let (mut viewer, _) = opened(ScriptedBackend::new(3));

        assert_eq!(viewer.active_mode(), Some(ViewMode::PageByPage));
        assert_eq!(viewer.current_page(), 0);
        assert!(!viewer.nav().prev_enabled);
        assert!(viewer.nav().next_enabled);

        viewer.show_page(2, true).unwrap();
        assert_eq!(viewer.current_page(), 2);
        assert!(viewer.nav().prev_enabled);
        assert!(!viewer.nav().next_enabled);
        assert_eq!(viewer.nav().selected_entry, Some(2));

        viewer.show_page(5, true).unwrap();
        assert_eq!(viewer.current_page(), 2);
        assert_eq!(viewer.surface().page_view().map(PageView::page_index), Some(2));
    }

    #[test]
    fn open_enables_actions_and_fills_selector() {
        let (viewer, log) = opened(ScriptedBackend::new(4));

        assert_eq!(viewer.actions(), ActionState { modes_enabled: true, export_enabled: true });
        assert_eq!(viewer.nav().entries, vec!["1", "2", "3", "4"]);
        assert!(viewer.nav().visible);
        assert_eq!(log.calls(), vec![(0, 300)]);
        // Scripted pages are 1x2 inches
        assert_eq!(viewer.viewport().content_size(), (300.0, 600.0));
        assert_eq!(viewer.viewport().scale(), 0.5);
    }

    #[test]
    fn show_page_accepts_every_valid_index() {
        let (mut viewer, _) = opened(ScriptedBackend::new(4));

        for page in [3, 0, 2, 1, 3] {
            viewer.show_page(page, true).unwrap();
            assert_eq!(viewer.current_page(), page);
            assert_nav_matches(&viewer);
        }

        viewer.show_page(4, true).unwrap();
        viewer.show_page(u32::MAX, true).unwrap();
        assert_eq!(viewer.current_page(), 3);
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let (mut viewer, _) = viewer_with(ScriptedBackend::new(1));

        let err = viewer.open_document(Path::new("missing.pdf")).unwrap_err();
        assert!(matches!(err, OpenError::NotFound(_)));
        assert_eq!(viewer.active_mode(), None);
        assert!(!viewer.actions().modes_enabled);

        let notices = viewer.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Error);
        assert!(notices[0].message.contains("missing.pdf"));
        assert!(viewer.take_notices().is_empty());
    }

    #[test]
    fn open_corrupt_file_is_decode_failure() {
        let (mut viewer, _) = viewer_with(ScriptedBackend::new(1));

        let err = viewer.open_document(Path::new("corrupt.pdf")).unwrap_err();
        assert!(matches!(err, OpenError::DecodeFailure { .. }));
        assert!(viewer.take_notices()[0].message.contains("scripted corruption"));
    }

    #[test]
    fn render_failure_keeps_current_page() {
        let (mut viewer, _) = opened(ScriptedBackend::new(3).fail_on(1));

        let err = viewer.show_page(1, true).unwrap_err();
        assert!(matches!(err, RenderError::DecodeFailure { page_index: 1, .. }));
        assert_eq!(viewer.current_page(), 0);
        assert_nav_matches(&viewer);

        let notices = viewer.take_notices();
        assert!(notices[0].is_error());
        assert!(notices[0].message.contains("page 2"));
    }

    #[test]
    fn next_and_prev_respect_enablement() {
        let (mut viewer, _) = opened(ScriptedBackend::new(2));

        viewer.prev_page().unwrap();
        assert_eq!(viewer.current_page(), 0);

        viewer.next_page().unwrap();
        assert_eq!(viewer.current_page(), 1);
        viewer.next_page().unwrap();
        assert_eq!(viewer.current_page(), 1);

        viewer.prev_page().unwrap();
        assert_eq!(viewer.current_page(), 0);

        viewer.select_page(1).unwrap();
        assert_eq!(viewer.current_page(), 1);
        assert_nav_matches(&viewer);
    }

    #[test]
    fn entering_active_mode_is_noop() {
        let (mut viewer, log) = opened(ScriptedBackend::new(3));
        viewer.show_page(2, true).unwrap();
        let calls = log.calls().len();

        viewer.enter_mode(ViewMode::PageByPage);

        assert_eq!(viewer.current_page(), 2);
        assert_eq!(log.calls().len(), calls);
    }

    #[test]
    fn slideshow_tracks_page_without_nav_bookkeeping() {
        let (mut viewer, _) = opened(ScriptedBackend::new(3));
        viewer.show_page(2, true).unwrap();

        viewer.enter_mode(ViewMode::Slideshow);
        assert_eq!(viewer.current_page(), 0);
        assert!(!viewer.nav().visible);
        assert!(matches!(viewer.surface(), Surface::Slideshow(_)));

        viewer.next_page().unwrap();
        viewer.next_page().unwrap();
        assert_eq!(viewer.current_page(), 2);
        assert!(!viewer.nav().prev_enabled);

        viewer.next_page().unwrap();
        assert_eq!(viewer.current_page(), 2);

        viewer.prev_page().unwrap();
        assert_eq!(viewer.current_page(), 1);

        // The page selector belongs to PageByPage
        viewer.select_page(0).unwrap();
        assert_eq!(viewer.current_page(), 1);
    }

    #[test]
    fn thumbnails_fill_grid_in_order() {
        let (mut viewer, log) = opened(ScriptedBackend::new(7));

        viewer.enter_mode(ViewMode::Thumbnails);
        assert!(viewer.surface().page_view().is_none());
        viewer.wait_for_background();

        let grid = viewer.surface().thumbnails().unwrap();
        assert_eq!(grid.pages(), (0..7).collect::<Vec<_>>());
        assert!(grid.is_finished());
        assert_eq!(grid.columns(), 5);
        assert_eq!(grid.rows(), 2);
        assert_eq!(pages_at(&log, 72), (0..7).collect::<Vec<_>>());
        assert!(!viewer.is_rendering());

        viewer.resize_viewport(320.0, 600.0);
        assert_eq!(viewer.surface().thumbnails().unwrap().columns(), 2);
    }

    #[test]
    fn thumbnail_failure_stops_grid() {
        let (mut viewer, log) = opened(ScriptedBackend::new(5).fail_on(3));

        viewer.enter_mode(ViewMode::Thumbnails);
        viewer.wait_for_background();

        let grid = viewer.surface().thumbnails().unwrap();
        assert_eq!(grid.pages(), vec![0, 1, 2]);

        let errors: Vec<_> = viewer.take_notices().into_iter().filter(Notice::is_error).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("page 4"));

        // Page 3 was the failing request; page 4 was never asked for
        assert_eq!(pages_at(&log, 72), vec![0, 1, 2, 3]);
    }

    #[test]
    fn switching_modes_cancels_previous_job() {
        let backend = ScriptedBackend::new(30).with_delay(Duration::from_millis(5));
        let (mut viewer, log) = opened(backend);

        viewer.enter_mode(ViewMode::Thumbnails);
        viewer.enter_mode(ViewMode::ContinuousScroll);

        assert!(matches!(viewer.surface(), Surface::Continuous(_)));
        viewer.wait_for_background();

        let strip = viewer.surface().continuous().unwrap();
        assert_eq!(strip.len(), 30);
        assert!(strip.is_finished());
        assert_eq!(pages_at(&log, 150), (0..30).collect::<Vec<_>>());
        assert!(pages_at(&log, 72).len() < 30);
        assert_eq!(log.max_concurrent_renders(), 1);
    }

    #[test]
    fn double_click_waits_for_finished_grid() {
        let backend = ScriptedBackend::new(3).with_delay(Duration::from_millis(20));
        let (mut viewer, _) = opened(backend);

        viewer.enter_mode(ViewMode::Thumbnails);
        viewer.double_click_thumbnail(0);
        assert_eq!(viewer.active_mode(), Some(ViewMode::Thumbnails));

        viewer.wait_for_background();
        assert!(viewer.click_thumbnail(1));
        assert_eq!(viewer.surface().thumbnails().unwrap().selected(), Some(1));

        viewer.double_click_thumbnail(2);
        assert_eq!(viewer.active_mode(), Some(ViewMode::PageByPage));
        assert_eq!(viewer.current_page(), 2);
        assert!(viewer.nav().visible);
        assert_nav_matches(&viewer);
    }

    #[test]
    fn pump_applies_events_incrementally() {
        let (mut viewer, _) = opened(ScriptedBackend::new(4));

        viewer.enter_mode(ViewMode::ContinuousScroll);

        let mut applied = 0;
        for _ in 0..5_000 {
            applied += viewer.pump();
            if !viewer.is_rendering() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }

        // Four pages plus the completion event
        assert_eq!(applied, 5);
        assert_eq!(viewer.surface().continuous().unwrap().len(), 4);
        // 150 dpi pages of 150x300 stacked with three gaps
        assert_eq!(viewer.viewport().content_size(), (150.0, 1248.0));
    }

    #[test]
    fn zoom_control_and_gesture_stay_in_sync() {
        let (mut viewer, _) = opened(ScriptedBackend::new(2));

        viewer.zoom_gesture(5.0, (100.0, 100.0));
        let scale = viewer.viewport().scale();
        assert!(scale > 0.5);
        assert_eq!(viewer.zoom_control().value(), scale);

        viewer.set_zoom_control(0.25);
        assert_eq!(viewer.viewport().scale(), 0.25);

        viewer.zoom_gesture(1e9, (0.0, 0.0));
        assert_eq!(viewer.viewport().scale(), 1.0);
        assert_eq!(viewer.zoom_control().value(), 1.0);

        viewer.enter_mode(ViewMode::Slideshow);
        assert_eq!(viewer.viewport().scale(), 0.5);
        assert_eq!(viewer.zoom_control().value(), 0.5);
    }

    #[test]
    fn enter_mode_without_document_does_nothing() {
        let (mut viewer, log) = viewer_with(ScriptedBackend::new(2));

        viewer.enter_mode(ViewMode::Thumbnails);
        viewer.show_page(0, true).unwrap();

        assert_eq!(viewer.active_mode(), None);
        assert!(viewer.surface().is_empty());
        assert!(log.calls().is_empty());
    }

    #[test]
    fn image_export_pauses_and_resumes_thumbnails() {
        let temp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(10).with_delay(Duration::from_millis(5));
        let (mut viewer, log) = opened(backend);

        viewer.enter_mode(ViewMode::Thumbnails);
        viewer.export(ExportFormat::Png, &temp.path().join("page.png")).unwrap();
        assert!(viewer.is_export_blocking());
        assert_eq!(viewer.export_progress().map(|progress| progress.total), Some(10));

        // The modal blocks interaction
        viewer.enter_mode(ViewMode::Slideshow);
        viewer.zoom_gesture(10.0, (0.0, 0.0));
        assert_eq!(viewer.active_mode(), Some(ViewMode::Thumbnails));
        assert_eq!(viewer.viewport().scale(), 0.5);

        viewer.wait_for_background();

        assert!(!viewer.is_export_blocking());
        for number in 1..=10 {
            assert!(temp.path().join(format!("page_{number}.png")).exists());
        }
        let grid = viewer.surface().thumbnails().unwrap();
        assert_eq!(grid.pages(), (0..10).collect::<Vec<_>>());
        assert!(grid.is_finished());
        assert_eq!(log.max_concurrent_renders(), 1);

        let notices = viewer.take_notices();
        assert!(notices.iter().any(|notice| notice.kind == NoticeKind::Info));
        assert!(notices.iter().all(|notice| !notice.is_error()));
    }

    #[test]
    fn second_image_export_is_busy() {
        let temp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(20).with_delay(Duration::from_millis(10));
        let (mut viewer, _) = opened(backend);

        viewer.export(ExportFormat::Png, &temp.path().join("a.png")).unwrap();
        let err = viewer.export(ExportFormat::Jpeg, &temp.path().join("b.jpg")).unwrap_err();
        assert!(matches!(err, ExportError::Busy));

        viewer.cancel_export();
        assert!(!viewer.is_export_blocking());
        assert!(!temp.path().join("b_1.jpg").exists());
    }

    #[test]
    fn queued_thumbnail_failure_is_not_retried_after_export() {
        let temp = tempfile::tempdir().unwrap();
        let (mut viewer, log) = opened(ScriptedBackend::new(3).fail_on(1));

        viewer.enter_mode(ViewMode::Thumbnails);
        // The grid job fails before anything applies its events.
        thread::sleep(Duration::from_millis(200));

        viewer.export(ExportFormat::Png, &temp.path().join("page.png")).unwrap();
        viewer.wait_for_background();

        assert_eq!(pages_at(&log, 72), vec![0, 1]);
        let grid = viewer.surface().thumbnails().unwrap();
        assert_eq!(grid.pages(), vec![0]);
        assert!(grid.is_finished());
        assert!(viewer
            .take_notices()
            .iter()
            .any(|notice| notice.is_error() && notice.message.starts_with("Could not render page 2")));
    }

    #[test]
    fn document_exports_are_refused_during_image_export() {
        let temp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend::new(20).with_delay(Duration::from_millis(10));
        let (mut viewer, _) = opened(backend);
        let text = temp.path().join("doc.txt");
        let copy = temp.path().join("doc.pdf");

        viewer.export(ExportFormat::Png, &temp.path().join("a.png")).unwrap();
        viewer.take_notices();

        let err = viewer.export(ExportFormat::Txt, &text).unwrap_err();
        assert!(matches!(err, ExportError::Busy));
        let err = viewer.export(ExportFormat::Pdf, &copy).unwrap_err();
        assert!(matches!(err, ExportError::Busy));
        assert_eq!(viewer.take_notices().iter().filter(|notice| notice.is_error()).count(), 2);

        viewer.cancel_export();
        assert!(!text.exists());
        assert!(!copy.exists());

        viewer.export(ExportFormat::Txt, &text).unwrap();
        assert!(text.exists());
    }

    #[test]
    fn image_export_failure_surfaces_error() {
        let temp = tempfile::tempdir().unwrap();
        let (mut viewer, _) = opened(ScriptedBackend::new(4).fail_on(2));

        viewer.export(ExportFormat::Png, &temp.path().join("out.png")).unwrap();
        viewer.wait_for_background();

        assert!(temp.path().join("out_2.png").exists());
        assert!(!temp.path().join("out_3.png").exists());
        let notices = viewer.take_notices();
        assert!(notices.iter().any(|notice| notice.is_error()));
    }

    #[test]
    fn export_without_document_fails() {
        let temp = tempfile::tempdir().unwrap();
        let (mut viewer, _) = viewer_with(ScriptedBackend::new(1));

        let err = viewer.export(ExportFormat::Pdf, &temp.path().join("x.pdf")).unwrap_err();
        assert!(matches!(err, ExportError::NoDocument));
        assert!(viewer.take_notices()[0].is_error());
    }

    #[test]
    fn text_export_reports_success() {
        let temp = tempfile::tempdir().unwrap();
        let (mut viewer, _) = opened(ScriptedBackend::new(2));
        let destination = temp.path().join("doc.txt");

        viewer.export(ExportFormat::Txt, &destination).unwrap();

        assert_eq!(std::fs::read_to_string(&destination).unwrap(), "Page 1\nPage 2\n");
        assert_eq!(viewer.take_notices()[0].kind, NoticeKind::Info);
    }

    #[test]
    fn reopening_returns_to_page_by_page() {
        let backend = ScriptedBackend::new(20).with_delay(Duration::from_millis(5));
        let (mut viewer, _) = opened(backend);
        viewer.enter_mode(ViewMode::Thumbnails);

        viewer.open_document(Path::new(DOC)).unwrap();

        assert_eq!(viewer.active_mode(), Some(ViewMode::PageByPage));
        assert_eq!(viewer.current_page(), 0);
        assert!(!viewer.is_rendering());
        assert!(matches!(viewer.surface(), Surface::SinglePage(_)));
    }

    #[test]
    fn empty_document_opens_without_pages() {
        let (viewer, log) = opened(ScriptedBackend::new(0));

        assert_eq!(viewer.active_mode(), Some(ViewMode::PageByPage));
        assert!(viewer.surface().is_empty());
        assert!(!viewer.nav().prev_enabled && !viewer.nav().next_enabled);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn dropping_viewer_stops_background_job() {
        let backend = ScriptedBackend::new(50).with_delay(Duration::from_millis(5));
        let (mut viewer, log) = opened(backend);
        viewer.enter_mode(ViewMode::ContinuousScroll);

        drop(viewer);
        let requested = log.calls().len();
        thread::sleep(Duration::from_millis(30));

        assert_eq!(log.calls().len(), requested);
        assert!(requested < 51);
    }
}
