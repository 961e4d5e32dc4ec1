//! Job ledger: status state machine, idempotent creation and the
//! higher-order runner orchestrators wrap their work in.

mod ledger;
mod models;
mod sweep;
mod tracked;

pub use ledger::{DEFAULT_LIST_LIMIT, JobLedger};
pub use models::{DeadLetter, Job, JobHandle, JobStatus, JobType, NewJob};
pub use sweep::{STALE_TIMEOUT_CODE, SweepStats, sweep_stale_jobs};
pub use tracked::{
    AUDIT_UNAVAILABLE_CODE, INVALID_RESULT_CODE, JobContext, TrackedJob, TrackedOutcome, WorkError,
    WorkOutput, run_tracked,
};
