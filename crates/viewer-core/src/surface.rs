//! What the display surface currently has mounted.
//!
//! Exactly one [`Surface`] variant is mounted at a time, so switching modes
//! replaces the previous mode's artifacts wholesale.

use pageview_engine::RasterImage;

/// Vertical gap between pages in continuous scroll, in pixels.
pub const PAGE_SPACING: f64 = 16.0;

#[derive(Debug, Clone)]
pub struct PageView {
    page_index: u32,
    image: RasterImage,
}

impl PageView {
    pub fn new(page_index: u32, image: RasterImage) -> Self {
        Self { page_index, image }
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn image(&self) -> &RasterImage {
        &self.image
    }

    pub fn size(&self) -> (f64, f64) {
        (f64::from(self.image.width()), f64::from(self.image.height()))
    }
}

/// Grid of thumbnails that grows as pages arrive.
///
/// The column count is re-derived on every insertion and every resize:
/// `max(1, floor(available_width / item_width))`.
#[derive(Debug, Clone)]
pub struct ThumbnailGrid {
    item_width: u32,
    available_width: f64,
    columns: usize,
    items: Vec<PageView>,
    selected: Option<u32>,
    finished: bool,
}

impl ThumbnailGrid {
    pub fn new(item_width: u32, available_width: f64) -> Self {
        let mut grid = Self {
            item_width: item_width.max(1),
            available_width,
            columns: 1,
            items: Vec::new(),
            selected: None,
            finished: false,
        };
        grid.relayout();
        grid
    }

    pub fn push(&mut self, page_index: u32, image: RasterImage) {
        self.items.push(PageView::new(page_index, image));
        self.relayout();
    }

    pub fn resize(&mut self, available_width: f64) {
        self.available_width = available_width;
        self.relayout();
    }

    fn relayout(&mut self) {
        let fit = (self.available_width / f64::from(self.item_width)).floor();
        self.columns = if fit.is_finite() && fit >= 1.0 { fit as usize } else { 1 };
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.items.len().div_ceil(self.columns)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[PageView] {
        &self.items
    }

    pub fn pages(&self) -> Vec<u32> {
        self.items.iter().map(PageView::page_index).collect()
    }

    pub fn contains(&self, page_index: u32) -> bool {
        self.items.iter().any(|item| item.page_index == page_index)
    }

    /// Toggles the selected marker on `page_index`. Returns whether the page
    /// is selected afterwards.
    pub fn toggle_selected(&mut self, page_index: u32) -> bool {
        if !self.contains(page_index) {
            return false;
        }

        if self.selected == Some(page_index) {
            self.selected = None;
            false
        } else {
            self.selected = Some(page_index);
            true
        }
    }

    pub fn selected(&self) -> Option<u32> {
        self.selected
    }

    /// Marks the job that fills the grid as terminated.
    pub fn mark_finished(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Pages stacked vertically in page order.
#[derive(Debug, Clone, Default)]
pub struct ContinuousStrip {
    pages: Vec<PageView>,
    finished: bool,
}

impl ContinuousStrip {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, page_index: u32, image: RasterImage) {
        self.pages.push(PageView::new(page_index, image));
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn pages(&self) -> &[PageView] {
        &self.pages
    }

    /// Size of the stacked content: widest page by summed heights plus gaps.
    pub fn size(&self) -> (f64, f64) {
        let width = self.pages.iter().map(|page| page.size().0).fold(0.0, f64::max);
        let heights: f64 = self.pages.iter().map(|page| page.size().1).sum();
        let gaps = PAGE_SPACING * self.pages.len().saturating_sub(1) as f64;
        (width, heights + gaps)
    }

    pub fn mark_finished(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

#[derive(Debug, Clone, Default)]
pub enum Surface {
    #[default]
    Empty,
    SinglePage(PageView),
    Slideshow(PageView),
    Thumbnails(ThumbnailGrid),
    Continuous(ContinuousStrip),
}

impl Surface {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Unscaled size of the mounted content.
    pub fn content_size(&self) -> (f64, f64) {
        match self {
            Self::Empty | Self::Thumbnails(_) => (0.0, 0.0),
            Self::SinglePage(view) | Self::Slideshow(view) => view.size(),
            Self::Continuous(strip) => strip.size(),
        }
    }

    pub fn page_view(&self) -> Option<&PageView> {
        match self {
            Self::SinglePage(view) | Self::Slideshow(view) => Some(view),
            _ => None,
        }
    }

    pub fn thumbnails(&self) -> Option<&ThumbnailGrid> {
        match self {
            Self::Thumbnails(grid) => Some(grid),
            _ => None,
        }
    }

    pub fn continuous(&self) -> Option<&ContinuousStrip> {
        match self {
            Self::Continuous(strip) => Some(strip),
            _ => None,
        }
    }
}
