//! Worker context for threaded backends
//!
//! Backends declaring `THREADED` decode off the coordinating context. The
//! scheduler marshals one job at a time to this worker thread and receives
//! completions over a channel; the worker never touches the cache or any
//! other shared state.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use vellum_generator::{Generator, Pixmap, PixmapRequest, RenderError, RequestKey};

use crate::cancel::CancellationToken;

/// A render handed to the worker thread.
pub(crate) struct WorkerJob {
    pub request: PixmapRequest,
    pub generation: u64,
    pub token: CancellationToken,
}

/// What happened to a job on the worker thread.
pub(crate) enum CompletionKind {
    Rendered(Result<Pixmap, RenderError>),
    /// The job was cancelled before the backend was invoked.
    Skipped,
}

pub(crate) struct Completion {
    pub key: RequestKey,
    pub generation: u64,
    pub kind: CompletionKind,
}

/// Owns the worker thread for a threaded generator.
///
/// Shutdown happens by dropping the job sender; the thread exits when its
/// receive loop disconnects and is joined in `shutdown`/`Drop`.
pub(crate) struct RenderWorker {
    job_tx: Option<Sender<WorkerJob>>,
    handle: Option<JoinHandle<()>>,
}

impl RenderWorker {
    pub fn spawn(generator: Arc<dyn Generator>) -> (Self, Receiver<Completion>) {
        let (job_tx, job_rx) = mpsc::channel::<WorkerJob>();
        let (done_tx, done_rx) = mpsc::channel::<Completion>();

        let handle = thread::spawn(move || worker_loop(generator, job_rx, done_tx));

        (
            Self {
                job_tx: Some(job_tx),
                handle: Some(handle),
            },
            done_rx,
        )
    }

    /// Hand a job to the worker. Returns `false` if the worker has shut
    /// down.
    pub fn dispatch(&self, job: WorkerJob) -> bool {
        match &self.job_tx {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    pub fn shutdown(&mut self) {
        self.job_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    generator: Arc<dyn Generator>,
    jobs: Receiver<WorkerJob>,
    completions: Sender<Completion>,
) {
    while let Ok(job) = jobs.recv() {
        let key = job.request.key();
        let kind = if job.token.is_cancelled() {
            CompletionKind::Skipped
        } else {
            CompletionKind::Rendered(generator.render(&job.request))
        };
        // A send error means the scheduler is gone; stop quietly.
        if completions
            .send(Completion {
                key,
                generation: job.generation,
                kind,
            })
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;
    use vellum_generator::{
        FormatDescriptor, GeneratorCaps, OpenError, OpenHint, PageGeometry, RenderPurpose,
        RequesterId,
    };

    struct SolidGenerator;

    impl Generator for SolidGenerator {
        fn capabilities(&self) -> GeneratorCaps {
            GeneratorCaps::THREADED
        }

        fn describe(&self) -> FormatDescriptor {
            FormatDescriptor::new("solid", vec!["image/x-solid".to_owned()])
        }

        fn open(&self, _path: &Path, _hint: &OpenHint) -> Result<Vec<PageGeometry>, OpenError> {
            Ok(Vec::new())
        }

        fn render(&self, request: &PixmapRequest) -> Result<Pixmap, RenderError> {
            Ok(Pixmap::filled(request.width, request.height, [7, 7, 7, 255]))
        }
    }

    fn job(page: usize, token: CancellationToken) -> WorkerJob {
        WorkerJob {
            request: PixmapRequest::new(RequesterId(1), page, 4, 4, RenderPurpose::Visible),
            generation: 0,
            token,
        }
    }

    #[test]
    fn renders_and_reports_completion() {
        let (worker, done_rx) = RenderWorker::spawn(Arc::new(SolidGenerator));
        assert!(worker.dispatch(job(2, CancellationToken::new())));

        let completion = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should complete the job");
        assert_eq!(completion.key.page_index, 2);
        assert!(matches!(completion.kind, CompletionKind::Rendered(Ok(_))));
    }

    #[test]
    fn skips_jobs_cancelled_before_start() {
        let (worker, done_rx) = RenderWorker::spawn(Arc::new(SolidGenerator));
        let token = CancellationToken::new();
        token.cancel();
        assert!(worker.dispatch(job(0, token)));

        let completion = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should report the skip");
        assert!(matches!(completion.kind, CompletionKind::Skipped));
    }

    #[test]
    fn shutdown_joins_the_thread() {
        let (mut worker, _done_rx) = RenderWorker::spawn(Arc::new(SolidGenerator));
        worker.shutdown();
        assert!(!worker.dispatch(job(0, CancellationToken::new())));
    }
}
