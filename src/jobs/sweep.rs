/// Reconciliation sweep for jobs stuck in `processing`
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::audit::{AuditEventType, AuditLedger, NewAuditEvent};
use crate::error::{LedgerError, Result};

use super::ledger::JobLedger;

pub const STALE_TIMEOUT_CODE: &str = "STALE_TIMEOUT";

/// Sweep statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub examined: usize,
    pub failed: usize,
    /// Finished between the scan and the transition.
    pub raced: usize,
    pub audit_failures: usize,
}

/// Fail every `processing` job whose last update is older than `max_age`.
///
/// Each failure is audited as `JOB_FAILED`. A job that reaches a terminal
/// state while the sweep runs is left alone.
pub fn sweep_stale_jobs(jobs: &JobLedger, audit: &AuditLedger, max_age: Duration) -> Result<SweepStats> {
    let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(max_age)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let mut stats = SweepStats::default();
    for stale in jobs.stale_jobs(cutoff)? {
        stats.examined += 1;

        let job = match jobs.fail_job(
            &stale.job_id,
            STALE_TIMEOUT_CODE,
            "Job exceeded the processing timeout",
            None,
        ) {
            Ok(job) => job,
            Err(LedgerError::InvalidTransition { .. }) => {
                stats.raced += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        stats.failed += 1;
        warn!(job_id = %job.job_id, updated_at = %stale.updated_at, "Stale job failed");

        let event = NewAuditEvent::new(
            AuditEventType::JobFailed,
            "Job failed by stale-job sweep",
            &job.tenant_id,
            &job.project_id,
        )
        .resource("job", &job.job_id)
        .meta("job_id", job.job_id.as_str())
        .meta("job_type", job.job_type.as_str())
        .meta("error_code", STALE_TIMEOUT_CODE);

        if let Err(e) = audit.log(event) {
            stats.audit_failures += 1;
            error!(job_id = %job.job_id, error = %e, "Failed to audit stale job");
        }
    }

    info!("Stale job sweep complete: {:?}", stats);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::audit::{AuditPolicy, AuditQuery};
    use crate::jobs::{JobStatus, JobType, NewJob};
    use crate::observability::Metrics;
    use crate::store::LedgerStore;
    use tempfile::TempDir;

    #[test]
    fn test_sweep_fails_stale_processing_jobs() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(temp_dir.path().join("ledger")).unwrap());
        let metrics = Arc::new(Metrics::new());
        let jobs = JobLedger::new(store.clone(), metrics.clone());
        let audit = AuditLedger::new(store, AuditPolicy::default(), metrics);

        let running = jobs
            .create_job(NewJob::new("t1", "p1", JobType::RagIndex, "req-1"))
            .unwrap();
        jobs.start_processing(&running.job_id).unwrap();
        let pending = jobs
            .create_job(NewJob::new("t1", "p1", JobType::RagIndex, "req-2"))
            .unwrap();

        let stats = sweep_stale_jobs(&jobs, &audit, Duration::ZERO).unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.audit_failures, 0);

        let job = jobs.get_status(&running.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_code.as_deref(), Some(STALE_TIMEOUT_CODE));
        assert_eq!(jobs.get_status(&pending.job_id).unwrap().status, JobStatus::Pending);

        let events = audit
            .query_events(&AuditQuery::new("t1", "p1").event_type(AuditEventType::JobFailed))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_id.as_deref(), Some(running.job_id.as_str()));
    }

    #[test]
    fn test_sweep_leaves_recent_jobs() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(temp_dir.path().join("ledger")).unwrap());
        let metrics = Arc::new(Metrics::new());
        let jobs = JobLedger::new(store.clone(), metrics.clone());
        let audit = AuditLedger::new(store, AuditPolicy::default(), metrics);

        let handle = jobs
            .create_job(NewJob::new("t1", "p1", JobType::RagIndex, "req-1"))
            .unwrap();
        jobs.start_processing(&handle.job_id).unwrap();

        let stats = sweep_stale_jobs(&jobs, &audit, Duration::from_secs(3600)).unwrap();
        assert_eq!(stats, SweepStats::default());
    }
}
