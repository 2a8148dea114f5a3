//! Pageview Scheduler Library
//!
//! Background render jobs with cooperative cancellation and ordered delivery.
//!
//! Each job renders an ordered list of pages of one [`Document`] on a
//! dedicated worker thread and streams one [`RenderEvent`] per page back to
//! the interactive thread, which drains them from the returned [`JobHandle`].
//! Workers never touch interactive state; they only send events.
//!
//! # Example
//!
//! ```
//! use pageview_engine::{DocumentLoader, LopdfEngine};
//! use pageview_scheduler::{RenderEvent, RenderPipeline};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let dir = std::env::temp_dir();
//! # let path = dir.join(format!("pageview-doc-{}.pdf", std::process::id()));
//! # std::fs::write(&path, pageview_engine::testing::sample_pdf_bytes(3))?;
//! let document = LopdfEngine::new().load(&path)?;
//! let pipeline = RenderPipeline::new();
//!
//! // Render every page at thumbnail resolution
//! let mut job = pipeline.submit(&document, document.all_pages(), 72)?;
//!
//! while let Some(event) = job.next_event() {
//!     match event {
//!         RenderEvent::Delivered { page_index, output, .. } => {
//!             println!("page {} is {}x{}", page_index + 1, output.width(), output.height());
//!         }
//!         RenderEvent::Failed { error, .. } => eprintln!("{error}"),
//!         RenderEvent::Completed { .. } | RenderEvent::Cancelled { .. } => break,
//!     }
//! }
//! # std::fs::remove_file(&path)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`Document`]: pageview_engine::Document

mod cancel;
mod job;
mod pipeline;

// Re-export public API
pub use cancel::CancellationToken;
pub use job::{JobError, JobId, RenderEvent};
pub use pipeline::{JobHandle, RenderPipeline};
