//! Vellum Render Scheduler
//!
//! Turns pixmap requests into cache entries with minimal duplicate work:
//! at most one in-flight render per `(page, size, rotation, purpose)` key,
//! purpose-priority dispatch, advisory cancellation, and a per-page retry
//! budget. Backends that declare the `THREADED` capability decode on a
//! scheduler-owned worker context; everything else runs inline on the
//! coordinating context. Cache and bookkeeping are only ever mutated from
//! the coordinating context via [`RenderScheduler::pump`].

mod cancel;
mod queue;
mod scheduler;
mod worker;

pub use cancel::CancellationToken;
pub use queue::{QueuedRequest, RequestQueue};
pub use scheduler::{
    RenderOutcome, RenderScheduler, SchedulerConfig, SchedulerStats, SubmitStatus,
};
