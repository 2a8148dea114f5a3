//! Job identity and the events a job delivers.

use pageview_engine::{IoError, RasterImage, RenderError};
use std::fmt;

/// Unique identifier of a submitted job
///
/// Identifiers are handed out in submission order by one [`RenderPipeline`],
/// so a consumer can tell events of a superseded job from the current one.
///
/// [`RenderPipeline`]: crate::RenderPipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl JobId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Why a job stopped before finishing its pages.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Write(#[from] IoError),

    #[error("failed to encode page {}: {detail}", page_index + 1)]
    Encode { page_index: u32, detail: String },
}

impl JobError {
    pub fn encode(page_index: u32, detail: impl fmt::Display) -> Self {
        Self::Encode { page_index, detail: detail.to_string() }
    }
}

/// Event sent from a job's worker to the interactive thread
///
/// A job emits zero or more `Delivered` events in ascending page order,
/// followed by exactly one terminal event: `Completed`, `Failed` or
/// `Cancelled`. Nothing is sent after the terminal event.
#[derive(Debug)]
pub enum RenderEvent<T = RasterImage> {
    /// A page finished; `output` is the rendered image or whatever the
    /// job's stage produced from it.
    Delivered { job: JobId, page_index: u32, output: T },

    /// A page failed. The job stops and no further pages are requested.
    Failed { job: JobId, page_index: u32, error: JobError },

    /// Every page was delivered.
    Completed { job: JobId, delivered: usize },

    /// The job observed its cancellation token. This is not an error.
    Cancelled { job: JobId, delivered: usize },
}

impl<T> RenderEvent<T> {
    pub fn job(&self) -> JobId {
        match self {
            Self::Delivered { job, .. }
            | Self::Failed { job, .. }
            | Self::Completed { job, .. }
            | Self::Cancelled { job, .. } => *job,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delivered { .. })
    }
}
