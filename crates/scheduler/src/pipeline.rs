//! Render pipeline: one dedicated worker thread per job.
//!
//! A job walks its pages in ascending order. Before and after each page the
//! worker checks the job's cancellation token; a cancelled job sends
//! [`RenderEvent::Cancelled`] and nothing else. The first failing page sends
//! [`RenderEvent::Failed`] and ends the job without requesting later pages.

use crate::{CancellationToken, JobError, JobId, RenderEvent};
use pageview_engine::{Document, RasterImage};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

/// Launches render jobs against loaded documents.
///
/// The pipeline itself holds no per-job state beyond the id counter; each
/// job is owned by the [`JobHandle`] returned from `submit`.
///
/// # Example
///
/// ```
/// use pageview_engine::testing::ScriptedBackend;
/// use pageview_scheduler::{RenderEvent, RenderPipeline};
///
/// let document = ScriptedBackend::new(3).into_document("scripted.pdf");
/// let pipeline = RenderPipeline::new();
///
/// let mut job = pipeline.submit(&document, vec![2, 0, 1], 72).unwrap();
/// let mut pages = Vec::new();
/// while let Some(event) = job.next_event() {
///     if let RenderEvent::Delivered { page_index, .. } = event {
///         pages.push(page_index);
///     }
/// }
///
/// // Pages are always delivered in ascending order
/// assert_eq!(pages, vec![0, 1, 2]);
/// ```
#[derive(Debug)]
pub struct RenderPipeline {
    next_id: AtomicU64,
}

impl RenderPipeline {
    /// Create a new render pipeline.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }

    /// Submit a job that delivers the rendered images themselves.
    ///
    /// # Arguments
    ///
    /// * `document` - Document to render; the job keeps its own clone of the handle
    /// * `pages` - Page indices to render; sorted and de-duplicated before the job starts
    /// * `dpi` - Target resolution in dots per inch
    ///
    /// # Errors
    ///
    /// Returns an error only if the worker thread could not be spawned.
    pub fn submit(
        &self,
        document: &Document,
        pages: Vec<u32>,
        dpi: u32,
    ) -> io::Result<JobHandle<RasterImage>> {
        self.submit_with(document, pages, dpi, |_, image| Ok(image))
    }

    /// Submit a job that runs `stage` on the worker after every render.
    ///
    /// The stage receives the page index and its image and produces the
    /// value delivered to the interactive thread. A stage error stops the job
    /// exactly like a render failure.
    ///
    /// # Arguments
    ///
    /// * `document` - Document to render; the job keeps its own clone of the handle
    /// * `pages` - Page indices to render; sorted and de-duplicated before the job starts
    /// * `dpi` - Target resolution in dots per inch
    /// * `stage` - Per-page work to run off the interactive thread
    pub fn submit_with<T, F>(
        &self,
        document: &Document,
        mut pages: Vec<u32>,
        dpi: u32,
        stage: F,
    ) -> io::Result<JobHandle<T>>
    where
        T: Send + 'static,
        F: FnMut(u32, RasterImage) -> Result<T, JobError> + Send + 'static,
    {
        pages.sort_unstable();
        pages.dedup();

        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = CancellationToken::new();
        let (sender, receiver) = flume::unbounded();
        let total = pages.len();

        let worker = Worker {
            id,
            document: document.clone(),
            pages,
            dpi,
            token: token.clone(),
            sender,
        };

        let thread = thread::Builder::new()
            .name(format!("pageview-render-{}", id.raw()))
            .spawn(move || worker.run(stage))?;

        log::debug!(
            "{id}: started for {} ({total} pages at {dpi} dpi)",
            document.source_path().display()
        );

        Ok(JobHandle {
            id,
            total,
            token,
            receiver,
            thread: Some(thread),
        })
    }
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Interactive-thread side of a running job.
///
/// Dropping the handle cancels the job without waiting for the worker; use
/// [`JobHandle::cancel_and_wait`] when the worker must be quiescent before
/// the next job may touch the document.
pub struct JobHandle<T = RasterImage> {
    id: JobId,
    total: usize,
    token: CancellationToken,
    receiver: flume::Receiver<RenderEvent<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T> JobHandle<T> {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Number of pages the job was submitted with.
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the worker thread has exited.
    ///
    /// Events may still be queued after this returns `true`.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel the job and block until its worker has exited.
    ///
    /// Events still queued are discarded.
    pub fn cancel_and_wait(mut self) {
        self.token.cancel();
        self.join();
    }

    /// Cancel the job, block until its worker has exited, and return the
    /// events it sent that were not received yet.
    ///
    /// A terminal event the worker sent before observing the cancellation is
    /// kept, so a failure is never mistaken for an interruption.
    pub fn cancel_and_drain(mut self) -> Vec<RenderEvent<T>> {
        self.token.cancel();
        self.join();
        self.receiver.try_iter().collect()
    }

    /// Drain every event available right now without blocking.
    pub fn try_events(&mut self) -> Vec<RenderEvent<T>> {
        self.receiver.try_iter().collect()
    }

    /// Block until the next event arrives.
    ///
    /// Returns `None` once the worker has exited and every event has been
    /// received.
    pub fn next_event(&mut self) -> Option<RenderEvent<T>> {
        self.receiver.recv().ok()
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("{}: worker panicked", self.id);
            }
        }
    }
}

impl<T> Drop for JobHandle<T> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Worker<T> {
    id: JobId,
    document: Document,
    pages: Vec<u32>,
    dpi: u32,
    token: CancellationToken,
    sender: flume::Sender<RenderEvent<T>>,
}

impl<T> Worker<T> {
    fn run<F>(self, mut stage: F)
    where
        F: FnMut(u32, RasterImage) -> Result<T, JobError>,
    {
        let job = self.id;
        let mut delivered = 0;

        for &page_index in &self.pages {
            if self.token.is_cancelled() {
                self.finish_cancelled(delivered);
                return;
            }

            let result = self
                .document
                .render_page(page_index, self.dpi)
                .map_err(JobError::from)
                .and_then(|image| stage(page_index, image));

            if self.token.is_cancelled() {
                self.finish_cancelled(delivered);
                return;
            }

            match result {
                Ok(output) => {
                    let event = RenderEvent::Delivered { job, page_index, output };
                    if self.sender.send(event).is_err() {
                        log::debug!("{job}: receiver gone, stopping");
                        return;
                    }
                    delivered += 1;
                }
                Err(error) => {
                    log::warn!("{job}: page {} failed: {error}", page_index + 1);
                    let _ = self.sender.send(RenderEvent::Failed { job, page_index, error });
                    return;
                }
            }
        }

        log::debug!("{job}: completed ({delivered} pages)");
        let _ = self.sender.send(RenderEvent::Completed { job, delivered });
    }

    fn finish_cancelled(&self, delivered: usize) {
        log::debug!("{}: cancelled after {delivered} pages", self.id);
        let _ = self.sender.send(RenderEvent::Cancelled { job: self.id, delivered });
    }
}
