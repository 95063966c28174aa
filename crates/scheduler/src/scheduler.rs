//! Render scheduler
//!
//! Accepts pixmap requests, de-duplicates in-flight work, dispatches to
//! the bound generator (inline or on the worker context depending on its
//! capabilities), and publishes results into the pixmap cache from the
//! coordinating context.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::{debug, warn};
use vellum_cache::PixmapCache;
use vellum_generator::{
    Generator, GeneratorCaps, PixmapRequest, RenderError, RenderPurpose, RequestKey, RequesterId,
};

use crate::cancel::CancellationToken;
use crate::queue::RequestQueue;
use crate::worker::{Completion, CompletionKind, RenderWorker, WorkerJob};

/// Scheduler tunables.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// How many times a failing `(page, purpose)` is re-attempted before
    /// it is reported as persistently failed.
    pub retry_budget: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { retry_budget: 3 }
    }
}

/// Scheduler counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Requests that joined an identical in-flight render instead of
    /// invoking the backend again.
    pub deduplicated: u64,
    /// Completions dropped because the page was invalidated while the
    /// render was in flight.
    pub discarded: u64,
}

/// What `pump` reports back to the document layer.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// A pixmap was rendered and published into the cache.
    Ready {
        key: RequestKey,
        requesters: Vec<RequesterId>,
    },

    /// Rendering failed. `permanent` is set once the retry budget for the
    /// `(page, purpose)` pair is exhausted; the page then stays in the
    /// failed state until it is invalidated.
    Failed {
        key: RequestKey,
        error: RenderError,
        permanent: bool,
        requesters: Vec<RequesterId>,
    },
}

/// Result of submitting a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// Queued as new work.
    Queued,

    /// Joined an identical in-flight render; no extra backend call will
    /// happen.
    Joined,

    /// Refused: this `(page, purpose)` has exhausted its retry budget and
    /// is persistently failed until the page is invalidated.
    RejectedFailed,
}

struct Flight {
    requesters: Vec<RequesterId>,
    token: CancellationToken,
    generation: u64,
    dispatched: bool,
}

/// The render-request scheduler.
///
/// All methods must be called from the coordinating context. For threaded
/// generators the actual decode happens on the worker thread; results are
/// marshaled back through a channel and applied during [`pump`].
///
/// [`pump`]: RenderScheduler::pump
pub struct RenderScheduler {
    generator: Arc<dyn Generator>,
    threaded: bool,
    config: SchedulerConfig,
    queue: RequestQueue,
    flights: HashMap<RequestKey, Flight>,
    page_generations: HashMap<usize, u64>,
    attempts: HashMap<(usize, RenderPurpose), u32>,
    failed_pages: HashSet<(usize, RenderPurpose)>,
    worker: Option<RenderWorker>,
    completions: Option<Receiver<Completion>>,
    worker_busy: bool,
    stats: SchedulerStats,
}

impl RenderScheduler {
    pub fn new(generator: Arc<dyn Generator>, config: SchedulerConfig) -> Self {
        let threaded = generator.capabilities().contains(GeneratorCaps::THREADED);
        let (worker, completions) = if threaded {
            let (worker, rx) = RenderWorker::spawn(Arc::clone(&generator));
            (Some(worker), Some(rx))
        } else {
            (None, None)
        };

        Self {
            generator,
            threaded,
            config,
            queue: RequestQueue::new(),
            flights: HashMap::new(),
            page_generations: HashMap::new(),
            attempts: HashMap::new(),
            failed_pages: HashSet::new(),
            worker,
            completions,
            worker_busy: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Submit a render request.
    ///
    /// An identical request already in flight (same page, size, rotation,
    /// purpose) is joined rather than re-dispatched: the new requester is
    /// added to the flight's interest set and the backend is not invoked
    /// again.
    pub fn submit(&mut self, request: PixmapRequest) -> SubmitStatus {
        self.stats.submitted += 1;
        let key = request.key();

        if self
            .failed_pages
            .contains(&(key.page_index, key.purpose))
        {
            return SubmitStatus::RejectedFailed;
        }

        if let Some(flight) = self.flights.get_mut(&key) {
            if !flight.requesters.contains(&request.requester) {
                flight.requesters.push(request.requester);
            }
            self.stats.deduplicated += 1;
            return SubmitStatus::Joined;
        }

        let generation = self.generation(key.page_index);
        self.flights.insert(
            key,
            Flight {
                requesters: vec![request.requester],
                token: CancellationToken::new(),
                generation,
                dispatched: false,
            },
        );
        self.queue.push(request, generation);
        SubmitStatus::Queued
    }

    /// Drop a requester's interest in all of its outstanding requests.
    ///
    /// Queued work nobody else wants is removed outright; running work is
    /// flagged for cooperative cancellation and its eventual result is
    /// published to the cache but not delivered. Cancelling a requester
    /// with nothing outstanding is a no-op.
    pub fn cancel_requester(&mut self, requester: RequesterId) {
        let mut doomed: Vec<RequestKey> = Vec::new();
        for (key, flight) in self.flights.iter_mut() {
            flight.requesters.retain(|r| *r != requester);
            if flight.requesters.is_empty() {
                if flight.dispatched {
                    flight.token.cancel();
                } else {
                    doomed.push(*key);
                }
            }
        }
        for key in doomed {
            self.queue.remove_if(|queued| queued.key() == key);
            self.flights.remove(&key);
            self.stats.cancelled += 1;
        }
    }

    /// Cancel everything. Completions still in the pipe are ignored when
    /// they arrive. Used on document close; idempotent.
    pub fn cancel_all(&mut self) {
        let pending = self.queue.len();
        self.queue.clear();
        for flight in self.flights.values() {
            flight.token.cancel();
        }
        self.flights.clear();
        self.stats.cancelled += pending as u64;
    }

    /// Record that a page's content changed.
    ///
    /// Bumps the page generation so in-flight renders started before the
    /// change are discarded on arrival, refreshes queued (not yet
    /// dispatched) requests to the new generation since they will render
    /// the new content, and resets the page's failure bookkeeping.
    pub fn invalidate_page(&mut self, page_index: usize) {
        let generation = self.page_generations.entry(page_index).or_insert(0);
        *generation += 1;
        let generation = *generation;

        self.queue.refresh_generation(page_index, generation);
        for (key, flight) in self.flights.iter_mut() {
            if key.page_index == page_index && !flight.dispatched {
                flight.generation = generation;
            }
        }

        self.attempts.retain(|(page, _), _| *page != page_index);
        self.failed_pages.retain(|(page, _)| *page != page_index);
    }

    /// Dispatch queued work and apply arrived results.
    ///
    /// For a synchronous generator every queued request renders inline on
    /// this call (the caller blocks for the duration). For a threaded
    /// generator this drains completed work from the worker and feeds it
    /// the next most urgent request; the backend processes one job at a
    /// time, so a visible request submitted late still runs before queued
    /// prefetch work.
    pub fn pump(&mut self, cache: &mut PixmapCache) -> Vec<RenderOutcome> {
        let mut outcomes = Vec::new();
        if self.threaded {
            self.pump_threaded(cache, &mut outcomes);
        } else {
            self.pump_inline(cache, &mut outcomes);
        }
        outcomes
    }

    /// Whether any request is queued or in flight.
    pub fn has_work(&self) -> bool {
        !self.queue.is_empty() || !self.flights.is_empty()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Shut down the worker context and drop all pending work.
    pub fn close(&mut self) {
        self.cancel_all();
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
        self.completions = None;
        self.worker_busy = false;
    }

    fn generation(&self, page_index: usize) -> u64 {
        self.page_generations.get(&page_index).copied().unwrap_or(0)
    }

    fn pump_inline(&mut self, cache: &mut PixmapCache, outcomes: &mut Vec<RenderOutcome>) {
        while let Some(queued) = self.queue.pop() {
            let key = queued.key();
            let generation = match self.flights.get_mut(&key) {
                Some(flight) => {
                    flight.dispatched = true;
                    flight.generation
                }
                // Cancelled while queued.
                None => continue,
            };
            let result = self.generator.render(&queued.request);
            self.apply_result(key, generation, result, cache, outcomes);
        }
    }

    fn pump_threaded(&mut self, cache: &mut PixmapCache, outcomes: &mut Vec<RenderOutcome>) {
        loop {
            let completion = match &self.completions {
                Some(rx) => rx.try_recv().ok(),
                None => None,
            };
            let Some(completion) = completion else { break };
            self.worker_busy = false;
            match completion.kind {
                CompletionKind::Rendered(result) => {
                    self.apply_result(completion.key, completion.generation, result, cache, outcomes)
                }
                CompletionKind::Skipped => {
                    if self.flights.remove(&completion.key).is_some() {
                        self.stats.cancelled += 1;
                    }
                }
            }
        }

        while !self.worker_busy {
            let Some(queued) = self.queue.pop() else { break };
            let key = queued.key();
            let job = match self.flights.get_mut(&key) {
                Some(flight) => {
                    flight.dispatched = true;
                    WorkerJob {
                        request: queued.request,
                        generation: flight.generation,
                        token: flight.token.clone(),
                    }
                }
                None => continue,
            };
            let dispatched = match &self.worker {
                Some(worker) => worker.dispatch(job),
                None => false,
            };
            if dispatched {
                self.worker_busy = true;
            } else {
                // Worker is gone (close() raced a pump); drop the work.
                self.flights.remove(&key);
            }
        }
    }

    fn apply_result(
        &mut self,
        key: RequestKey,
        generation: u64,
        result: Result<vellum_generator::Pixmap, RenderError>,
        cache: &mut PixmapCache,
        outcomes: &mut Vec<RenderOutcome>,
    ) {
        let Some(flight) = self.flights.remove(&key) else {
            // cancel_all() ran while this render was in flight.
            return;
        };

        if generation != self.generation(key.page_index) {
            debug!(
                "discarding stale render for page {} (purpose {:?})",
                key.page_index, key.purpose
            );
            self.stats.discarded += 1;
            return;
        }

        match result {
            Ok(pixmap) => {
                cache.insert(key, pixmap);
                self.stats.completed += 1;
                self.attempts.remove(&(key.page_index, key.purpose));
                // A cancelled flight still publishes (the work is done),
                // but nobody is told about it.
                if !flight.requesters.is_empty() {
                    outcomes.push(RenderOutcome::Ready {
                        key,
                        requesters: flight.requesters,
                    });
                }
            }
            Err(error) => {
                if flight.requesters.is_empty() {
                    // Cancelled mid-flight and failed anyway; nobody to
                    // tell and nothing worth a retry.
                    return;
                }
                let attempts = self
                    .attempts
                    .entry((key.page_index, key.purpose))
                    .or_insert(0);
                *attempts += 1;
                let attempts = *attempts;

                if attempts < self.config.retry_budget {
                    warn!(
                        "render of page {} failed (attempt {attempts}): {error}; retrying",
                        key.page_index
                    );
                    let retry = PixmapRequest {
                        requester: flight.requesters[0],
                        page_index: key.page_index,
                        width: key.width,
                        height: key.height,
                        rotation: key.rotation,
                        purpose: key.purpose,
                    };
                    self.flights.insert(
                        key,
                        Flight {
                            requesters: flight.requesters,
                            token: CancellationToken::new(),
                            generation,
                            dispatched: false,
                        },
                    );
                    self.queue.push(retry, generation);
                } else {
                    warn!(
                        "render of page {} failed permanently after {attempts} attempts: {error}",
                        key.page_index
                    );
                    self.failed_pages.insert((key.page_index, key.purpose));
                    self.stats.failed += 1;
                    outcomes.push(RenderOutcome::Failed {
                        key,
                        error,
                        permanent: true,
                        requesters: flight.requesters,
                    });
                }
            }
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use vellum_generator::{
        FormatDescriptor, OpenError, OpenHint, PageGeometry, Pixmap, RenderPurpose,
    };

    /// Test backend; counts render invocations and can be told to fail
    /// specific pages.
    struct CountingGenerator {
        caps: GeneratorCaps,
        renders: AtomicUsize,
        fail_page: Option<usize>,
        delay: Duration,
    }

    impl CountingGenerator {
        fn sync() -> Self {
            Self {
                caps: GeneratorCaps::empty(),
                renders: AtomicUsize::new(0),
                fail_page: None,
                delay: Duration::ZERO,
            }
        }

        fn threaded(delay: Duration) -> Self {
            Self {
                caps: GeneratorCaps::THREADED,
                renders: AtomicUsize::new(0),
                fail_page: None,
                delay,
            }
        }

        fn failing_on(page: usize) -> Self {
            Self {
                fail_page: Some(page),
                ..Self::sync()
            }
        }

        fn render_count(&self) -> usize {
            self.renders.load(Ordering::SeqCst)
        }
    }

    impl Generator for CountingGenerator {
        fn capabilities(&self) -> GeneratorCaps {
            self.caps
        }

        fn describe(&self) -> FormatDescriptor {
            FormatDescriptor::new("counting", vec!["application/x-counting".to_owned()])
        }

        fn open(&self, _path: &Path, _hint: &OpenHint) -> Result<Vec<PageGeometry>, OpenError> {
            Ok(Vec::new())
        }

        fn render(&self, request: &PixmapRequest) -> Result<Pixmap, RenderError> {
            self.renders.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.fail_page == Some(request.page_index) {
                return Err(RenderError::Decode {
                    page: request.page_index,
                    message: "synthetic failure".to_owned(),
                });
            }
            Ok(Pixmap::filled(request.width, request.height, [1, 2, 3, 255]))
        }
    }

    fn request(page: usize, requester: u64, purpose: RenderPurpose) -> PixmapRequest {
        PixmapRequest::new(RequesterId(requester), page, 8, 8, purpose)
    }

    fn pump_until_idle(
        scheduler: &mut RenderScheduler,
        cache: &mut PixmapCache,
    ) -> Vec<RenderOutcome> {
        let mut outcomes = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(10);
        while scheduler.has_work() {
            outcomes.extend(scheduler.pump(cache));
            assert!(Instant::now() < deadline, "scheduler never drained");
            std::thread::sleep(Duration::from_millis(1));
        }
        outcomes
    }

    #[test]
    fn identical_requests_invoke_backend_once() {
        let _ = env_logger::builder().is_test(true).try_init();
        let generator = Arc::new(CountingGenerator::sync());
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        assert_eq!(
            scheduler.submit(request(3, 1, RenderPurpose::Visible)),
            SubmitStatus::Queued
        );
        assert_eq!(
            scheduler.submit(request(3, 2, RenderPurpose::Visible)),
            SubmitStatus::Joined
        );

        let outcomes = scheduler.pump(&mut cache);
        assert_eq!(generator.render_count(), 1);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            RenderOutcome::Ready { requesters, .. } => {
                assert_eq!(requesters.len(), 2);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
        assert_eq!(scheduler.stats().deduplicated, 1);
    }

    #[test]
    fn dedup_holds_for_threaded_backends() {
        let generator = Arc::new(CountingGenerator::threaded(Duration::from_millis(20)));
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        scheduler.submit(request(0, 1, RenderPurpose::Visible));
        // Start the render, then submit the identical request while the
        // worker is still busy with the first.
        scheduler.pump(&mut cache);
        assert_eq!(
            scheduler.submit(request(0, 2, RenderPurpose::Visible)),
            SubmitStatus::Joined
        );

        let outcomes = pump_until_idle(&mut scheduler, &mut cache);
        assert_eq!(generator.render_count(), 1);
        assert_eq!(outcomes.len(), 1);
    }

    #[test]
    fn results_are_published_into_the_cache() {
        let mut scheduler = RenderScheduler::new(
            Arc::new(CountingGenerator::sync()),
            SchedulerConfig::default(),
        );
        let mut cache = PixmapCache::with_mb_budget(16);

        let req = request(1, 1, RenderPurpose::Visible);
        scheduler.submit(req);
        scheduler.pump(&mut cache);
        assert!(cache.contains(&req.key()));
    }

    #[test]
    fn visible_requests_run_before_queued_prefetch() {
        let generator = Arc::new(CountingGenerator::threaded(Duration::from_millis(5)));
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        scheduler.submit(request(0, 1, RenderPurpose::Prefetch));
        scheduler.submit(request(1, 1, RenderPurpose::Prefetch));
        scheduler.submit(request(2, 1, RenderPurpose::Visible));

        let outcomes = pump_until_idle(&mut scheduler, &mut cache);
        let pages: Vec<usize> = outcomes
            .iter()
            .map(|outcome| match outcome {
                RenderOutcome::Ready { key, .. } => key.page_index,
                RenderOutcome::Failed { key, .. } => key.page_index,
            })
            .collect();
        // The first prefetch may already be on the worker, but the visible
        // request must beat the remaining prefetch.
        let visible_at = pages.iter().position(|&p| p == 2).unwrap();
        let last_prefetch_at = pages.iter().position(|&p| p == 1).unwrap();
        assert!(visible_at < last_prefetch_at);
    }

    #[test]
    fn cancelling_queued_work_prevents_rendering() {
        let generator = Arc::new(CountingGenerator::sync());
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        scheduler.submit(request(0, 1, RenderPurpose::Prefetch));
        scheduler.cancel_requester(RequesterId(1));

        let outcomes = scheduler.pump(&mut cache);
        assert!(outcomes.is_empty());
        assert_eq!(generator.render_count(), 0);
        assert_eq!(scheduler.stats().cancelled, 1);
    }

    #[test]
    fn cancelling_a_shared_flight_keeps_it_for_the_other_requester() {
        let generator = Arc::new(CountingGenerator::sync());
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        scheduler.submit(request(0, 1, RenderPurpose::Visible));
        scheduler.submit(request(0, 2, RenderPurpose::Visible));
        scheduler.cancel_requester(RequesterId(1));

        let outcomes = scheduler.pump(&mut cache);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            RenderOutcome::Ready { requesters, .. } => {
                assert_eq!(requesters, &[RequesterId(2)]);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_running_render_publishes_but_is_not_delivered() {
        let generator = Arc::new(CountingGenerator::threaded(Duration::from_millis(30)));
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        let req = request(0, 1, RenderPurpose::Visible);
        scheduler.submit(req);
        scheduler.pump(&mut cache); // dispatch to worker

        // Wait until the worker is actually inside render() so the
        // cancellation arrives mid-flight, not before the job starts.
        let deadline = Instant::now() + Duration::from_secs(5);
        while generator.render_count() == 0 {
            assert!(Instant::now() < deadline, "render never started");
            std::thread::sleep(Duration::from_millis(1));
        }
        scheduler.cancel_requester(RequesterId(1));

        let outcomes = pump_until_idle(&mut scheduler, &mut cache);
        assert!(outcomes.is_empty());
        // The decode work is not wasted; the result still landed in the
        // cache even though nobody was told.
        assert!(cache.contains(&req.key()));
    }

    #[test]
    fn cancelling_after_completion_is_a_noop() {
        let mut scheduler = RenderScheduler::new(
            Arc::new(CountingGenerator::sync()),
            SchedulerConfig::default(),
        );
        let mut cache = PixmapCache::with_mb_budget(16);

        scheduler.submit(request(0, 1, RenderPurpose::Visible));
        scheduler.pump(&mut cache);

        scheduler.cancel_requester(RequesterId(1));
        scheduler.cancel_requester(RequesterId(99));
        assert!(!scheduler.has_work());
    }

    #[test]
    fn failures_retry_then_become_permanent() {
        let generator = Arc::new(CountingGenerator::failing_on(4));
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        scheduler.submit(request(4, 1, RenderPurpose::Visible));
        let outcomes = scheduler.pump(&mut cache);

        assert_eq!(generator.render_count(), 3);
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            RenderOutcome::Failed { permanent, .. } => assert!(*permanent),
            other => panic!("expected Failed, got {other:?}"),
        }

        // Further submissions are refused until the page is invalidated.
        assert_eq!(
            scheduler.submit(request(4, 1, RenderPurpose::Visible)),
            SubmitStatus::RejectedFailed
        );
        scheduler.invalidate_page(4);
        assert_eq!(
            scheduler.submit(request(4, 1, RenderPurpose::Visible)),
            SubmitStatus::Queued
        );
    }

    #[test]
    fn invalidation_discards_stale_in_flight_results() {
        let generator = Arc::new(CountingGenerator::threaded(Duration::from_millis(30)));
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        let req = request(0, 1, RenderPurpose::Visible);
        scheduler.submit(req);
        scheduler.pump(&mut cache); // worker is rendering the old content
        scheduler.invalidate_page(0);

        let outcomes = pump_until_idle(&mut scheduler, &mut cache);
        assert!(outcomes.is_empty());
        assert!(!cache.contains(&req.key()));
        assert_eq!(scheduler.stats().discarded, 1);
    }

    #[test]
    fn queued_requests_survive_invalidation_and_publish_fresh() {
        let generator = Arc::new(CountingGenerator::sync());
        let mut scheduler =
            RenderScheduler::new(Arc::clone(&generator) as _, SchedulerConfig::default());
        let mut cache = PixmapCache::with_mb_budget(16);

        let req = request(0, 1, RenderPurpose::Visible);
        scheduler.submit(req);
        // The mutation lands before the queued request is dispatched; the
        // render will see the new content, so its result is current.
        scheduler.invalidate_page(0);

        let outcomes = scheduler.pump(&mut cache);
        assert_eq!(outcomes.len(), 1);
        assert!(cache.contains(&req.key()));
    }

    #[test]
    fn close_is_idempotent() {
        let mut scheduler = RenderScheduler::new(
            Arc::new(CountingGenerator::threaded(Duration::from_millis(1))),
            SchedulerConfig::default(),
        );
        scheduler.submit(request(0, 1, RenderPurpose::Visible));
        scheduler.close();
        scheduler.close();
        assert!(!scheduler.has_work());
    }
}
