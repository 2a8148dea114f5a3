use serde::Serialize;

/// Previous/next buttons and the page selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NavControls {
    pub visible: bool,
    pub prev_enabled: bool,
    pub next_enabled: bool,
    /// One 1-based label per page.
    pub entries: Vec<String>,
    pub selected_entry: Option<usize>,
}

impl NavControls {
    pub fn fill_entries(&mut self, page_count: u32) {
        self.entries = (1..=page_count).map(|number| number.to_string()).collect();
        self.selected_entry = None;
    }

    pub fn disable(&mut self) {
        self.prev_enabled = false;
        self.next_enabled = false;
    }

    /// Recomputes button enablement for `current_page` and selects its entry.
    pub fn update(&mut self, current_page: u32, page_count: u32) {
        self.prev_enabled = current_page > 0;
        self.next_enabled = current_page.saturating_add(1) < page_count;
        self.selected_entry = Some(current_page as usize);
    }
}

/// Menu actions that need an open document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionState {
    pub modes_enabled: bool,
    pub export_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Error,
    Info,
}

/// User-facing message raised by a failed or finished operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Error, message: message.into() }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Info, message: message.into() }
    }

    pub fn is_error(&self) -> bool {
        self.kind == NoticeKind::Error
    }
}
