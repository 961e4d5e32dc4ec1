use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::observability::Metrics;
use crate::store::{JobInsert, LedgerStore};
use crate::validation::{
    sanitize_safe_message, validate_entity_id, validate_error_code, validate_idempotency_key,
    validate_progress, validate_scope_id,
};

use super::models::{DeadLetter, Job, JobHandle, JobStatus, NewJob};

/// Default page size for list queries.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Single source of truth for asynchronous work status.
#[derive(Clone)]
pub struct JobLedger {
    store: Arc<LedgerStore>,
    metrics: Arc<Metrics>,
}

impl JobLedger {
    pub fn new(store: Arc<LedgerStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Create a job, or resolve onto the job already holding the idempotency key.
    ///
    /// A `completed` holder yields a `skipped` handle carrying its results; a
    /// `pending`/`processing` holder is returned as-is; a `failed` holder is
    /// superseded by a fresh pending job.
    pub fn create_job(&self, new: NewJob) -> Result<JobHandle> {
        validate_scope_id("tenant_id", &new.tenant_id)?;
        validate_scope_id("project_id", &new.project_id)?;
        validate_entity_id("request_id", &new.request_id)?;
        if let Some(key) = &new.idempotency_key {
            validate_idempotency_key(key)?;
        }
        for artifact_id in &new.input_artifact_ids {
            validate_entity_id("input_artifact_id", artifact_id)?;
        }

        if let Some(key) = &new.idempotency_key {
            if let Some(existing) =
                self.store
                    .find_idempotent(&new.tenant_id, &new.project_id, new.job_type, key)?
            {
                if existing.status != JobStatus::Failed {
                    return Ok(self.resolve(&existing));
                }
            }
        }

        let now = Utc::now();
        let job = Job {
            job_id: Uuid::now_v7().to_string(),
            tenant_id: new.tenant_id,
            project_id: new.project_id,
            job_type: new.job_type,
            status: JobStatus::Pending,
            progress: 0,
            idempotency_key: new.idempotency_key,
            request_id: new.request_id,
            input_artifact_ids: new.input_artifact_ids,
            result_artifact_ids: Vec::new(),
            error_code: None,
            error_message_safe: None,
            error_debug_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
        };

        match self.store.insert_job(&job)? {
            JobInsert::Inserted => {
                self.metrics.job_created();
                info!(
                    job_id = %job.job_id,
                    tenant_id = %job.tenant_id,
                    project_id = %job.project_id,
                    job_type = %job.job_type,
                    request_id = %job.request_id,
                    "Job created"
                );
                Ok(JobHandle::created(&job))
            }
            JobInsert::Duplicate(winner_id) => {
                warn!(
                    winner = %winner_id,
                    job_type = %job.job_type,
                    "Lost idempotency race, resolving onto winner"
                );
                let winner = self.store.get_job(&winner_id)?.ok_or_else(|| {
                    LedgerError::Conflict(format!(
                        "idempotency key held by job {winner_id}, which could not be read"
                    ))
                })?;
                Ok(self.resolve(&winner))
            }
        }
    }

    fn resolve(&self, existing: &Job) -> JobHandle {
        let handle = JobHandle::resolved(existing);
        if handle.is_skipped() {
            self.metrics.job_skipped();
            info!(job_id = %existing.job_id, "Duplicate submission skipped, job already completed");
        } else {
            debug!(job_id = %existing.job_id, status = %existing.status, "Duplicate submission resolved onto in-flight job");
        }
        handle
    }

    /// `pending -> processing`
    pub fn start_processing(&self, job_id: &str) -> Result<Job> {
        let job = self.transition(job_id, JobStatus::Processing, |_| Ok(()))?;
        info!(job_id, "Job processing");
        Ok(job)
    }

    /// Record progress (0..=100) on a `processing` job.
    pub fn update_progress(&self, job_id: &str, progress: u8) -> Result<Job> {
        validate_entity_id("job_id", job_id)?;
        validate_progress(progress)?;

        let job = self
            .store
            .update_job(job_id, |job| {
                if job.status != JobStatus::Processing {
                    return Err(LedgerError::InvalidTransition {
                        job_id: job.job_id.clone(),
                        from: job.status,
                        to: JobStatus::Processing,
                    });
                }
                job.progress = progress;
                job.updated_at = Utc::now();
                Ok(())
            })?
            .ok_or_else(|| not_found(job_id))?;

        debug!(job_id, progress, "Job progress");
        Ok(job)
    }

    /// `processing -> completed`, linking the result artifacts.
    pub fn complete_job(&self, job_id: &str, result_artifact_ids: Vec<String>) -> Result<Job> {
        for artifact_id in &result_artifact_ids {
            validate_entity_id("result_artifact_id", artifact_id)?;
        }

        let job = self.transition(job_id, JobStatus::Completed, |job| {
            job.progress = 100;
            job.result_artifact_ids = result_artifact_ids;
            job.completed_at = Some(job.updated_at);
            Ok(())
        })?;

        self.metrics.job_completed();
        info!(job_id, results = job.result_artifact_ids.len(), "Job completed");
        Ok(job)
    }

    /// `pending|processing -> failed`.
    ///
    /// The message is sanitized before storage. A debug id is generated when
    /// the caller has none, so the failure can always be correlated with logs.
    pub fn fail_job(
        &self,
        job_id: &str,
        error_code: &str,
        error_message_safe: &str,
        error_debug_id: Option<&str>,
    ) -> Result<Job> {
        validate_error_code(error_code)?;
        let message = sanitize_safe_message(error_message_safe);
        let debug_id = match error_debug_id {
            Some(id) => {
                validate_entity_id("error_debug_id", id)?;
                id.to_string()
            }
            None => short_debug_id(),
        };

        let job = self.transition(job_id, JobStatus::Failed, |job| {
            job.error_code = Some(error_code.to_string());
            job.error_message_safe = Some(message);
            job.error_debug_id = Some(debug_id);
            job.failed_at = Some(job.updated_at);
            Ok(())
        })?;

        self.metrics.job_failed();
        info!(
            job_id,
            error_code,
            error_debug_id = job.error_debug_id.as_deref().unwrap_or_default(),
            "Job failed"
        );
        Ok(job)
    }

    fn transition<F>(&self, job_id: &str, to: JobStatus, apply: F) -> Result<Job>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        validate_entity_id("job_id", job_id)?;

        self.store
            .update_job(job_id, |job| {
                if !job.status.can_transition_to(to) {
                    return Err(LedgerError::InvalidTransition {
                        job_id: job.job_id.clone(),
                        from: job.status,
                        to,
                    });
                }
                job.status = to;
                job.updated_at = Utc::now();
                apply(job)
            })?
            .ok_or_else(|| not_found(job_id))
    }

    pub fn get_status(&self, job_id: &str) -> Result<Job> {
        validate_entity_id("job_id", job_id)?;
        self.store.get_job(job_id)?.ok_or_else(|| not_found(job_id))
    }

    /// Jobs of one tenant/project, newest first.
    pub fn list_by_tenant_project(
        &self,
        tenant_id: &str,
        project_id: &str,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        validate_scope_id("tenant_id", tenant_id)?;
        validate_scope_id("project_id", project_id)?;
        Ok(self.store.list_jobs(tenant_id, project_id, status, limit)?)
    }

    /// `processing` jobs whose last update is older than `cutoff`.
    pub fn stale_jobs(&self, cutoff: DateTime<Utc>) -> Result<Vec<Job>> {
        Ok(self
            .store
            .jobs_matching(|job| job.status == JobStatus::Processing && job.updated_at < cutoff)?)
    }

    /// Park a permanently failed job in the dead-letter queue.
    pub fn dead_letter(
        &self,
        job_id: &str,
        error_code: &str,
        error_message_safe: &str,
        attempts: u32,
    ) -> Result<DeadLetter> {
        validate_error_code(error_code)?;
        let job = self.get_status(job_id)?;

        let letter = DeadLetter {
            job_id: job.job_id,
            tenant_id: job.tenant_id,
            project_id: job.project_id,
            job_type: job.job_type,
            error_code: error_code.to_string(),
            error_message_safe: sanitize_safe_message(error_message_safe),
            attempts,
            failed_at: Utc::now(),
        };
        self.store.push_dead_letter(&letter)?;

        warn!(job_id, error_code, attempts, "Job moved to dead-letter queue");
        Ok(letter)
    }

    pub fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        Ok(self.store.dead_letters(limit)?)
    }
}

fn not_found(job_id: &str) -> LedgerError {
    LedgerError::NotFound(format!("job {job_id}"))
}

/// Eight hex characters, enough to grep diagnostic logs by.
fn short_debug_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobType;
    use tempfile::TempDir;

    fn create_ledger() -> (JobLedger, Arc<Metrics>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(temp_dir.path().join("ledger")).unwrap());
        let metrics = Arc::new(Metrics::new());
        (JobLedger::new(store, metrics.clone()), metrics, temp_dir)
    }

    fn new_job() -> NewJob {
        NewJob::new("t1", "p1", JobType::IngestionDocument, "req-1")
    }

    #[test]
    fn test_full_lifecycle() {
        let (ledger, metrics, _temp) = create_ledger();
        let handle = ledger.create_job(new_job()).unwrap();
        assert!(handle.created);
        assert_eq!(handle.status, JobStatus::Pending);

        ledger.start_processing(&handle.job_id).unwrap();
        ledger.update_progress(&handle.job_id, 40).unwrap();
        let job = ledger
            .complete_job(&handle.job_id, vec!["A1".to_string()])
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.result_artifact_ids, vec!["A1".to_string()]);
        assert!(job.completed_at.is_some());
        assert_eq!(metrics.snapshot().jobs_completed, 1);
    }

    #[test]
    fn test_complete_pending_job_is_invalid() {
        let (ledger, _metrics, _temp) = create_ledger();
        let handle = ledger.create_job(new_job()).unwrap();

        let err = ledger.complete_job(&handle.job_id, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed,
                ..
            }
        ));
        assert_eq!(ledger.get_status(&handle.job_id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_terminal_job_never_mutates() {
        let (ledger, _metrics, _temp) = create_ledger();
        let handle = ledger.create_job(new_job()).unwrap();
        ledger.start_processing(&handle.job_id).unwrap();
        let completed = ledger.complete_job(&handle.job_id, Vec::new()).unwrap();

        assert!(ledger.start_processing(&handle.job_id).is_err());
        assert!(ledger.update_progress(&handle.job_id, 10).is_err());
        assert!(ledger.fail_job(&handle.job_id, "LATE", "late", None).is_err());
        assert_eq!(ledger.get_status(&handle.job_id).unwrap(), completed);
    }

    #[test]
    fn test_progress_requires_processing_and_range() {
        let (ledger, _metrics, _temp) = create_ledger();
        let handle = ledger.create_job(new_job()).unwrap();

        assert!(matches!(
            ledger.update_progress(&handle.job_id, 10).unwrap_err(),
            LedgerError::InvalidTransition { .. }
        ));
        ledger.start_processing(&handle.job_id).unwrap();
        assert!(matches!(
            ledger.update_progress(&handle.job_id, 101).unwrap_err(),
            LedgerError::Validation(_)
        ));
    }

    #[test]
    fn test_fail_job_sanitizes_and_generates_debug_id() {
        let (ledger, _metrics, _temp) = create_ledger();
        let handle = ledger.create_job(new_job()).unwrap();

        let long = format!("line one\nline two {}", "x".repeat(400));
        let job = ledger
            .fail_job(&handle.job_id, "EXTRACTION_FAILED", &long, None)
            .unwrap();

        let message = job.error_message_safe.unwrap();
        assert!(!message.contains('\n'));
        assert!(message.chars().count() <= 256);
        assert_eq!(job.error_debug_id.unwrap().len(), 8);
        assert!(job.failed_at.is_some());

        assert!(matches!(
            ledger
                .fail_job(&handle.job_id, "bad code", "x", None)
                .unwrap_err(),
            LedgerError::Validation(_)
        ));
    }

    #[test]
    fn test_missing_job() {
        let (ledger, _metrics, _temp) = create_ledger();
        assert!(matches!(
            ledger.get_status("nope").unwrap_err(),
            LedgerError::NotFound(_)
        ));
        assert!(matches!(
            ledger.start_processing("nope").unwrap_err(),
            LedgerError::NotFound(_)
        ));
    }

    #[test]
    fn test_in_flight_duplicate_returns_existing() {
        let (ledger, _metrics, _temp) = create_ledger();
        let first = ledger.create_job(new_job().with_idempotency_key("k1")).unwrap();
        ledger.start_processing(&first.job_id).unwrap();

        let second = ledger.create_job(new_job().with_idempotency_key("k1")).unwrap();
        assert!(!second.created);
        assert_eq!(second.job_id, first.job_id);
        assert_eq!(second.status, JobStatus::Processing);
        assert_eq!(second.existing_job_id.as_deref(), Some(first.job_id.as_str()));
    }

    #[test]
    fn test_key_scope_includes_job_type() {
        let (ledger, _metrics, _temp) = create_ledger();
        let a = ledger.create_job(new_job().with_idempotency_key("k1")).unwrap();
        let b = ledger
            .create_job(
                NewJob::new("t1", "p1", JobType::ComplianceTranscript, "req-2")
                    .with_idempotency_key("k1"),
            )
            .unwrap();
        assert!(b.created);
        assert_ne!(a.job_id, b.job_id);
    }

    #[test]
    fn test_dead_letters() {
        let (ledger, _metrics, _temp) = create_ledger();
        let handle = ledger.create_job(new_job()).unwrap();
        ledger
            .fail_job(&handle.job_id, "EMBEDDING_FAILED", "upstream timeout", None)
            .unwrap();
        ledger
            .dead_letter(&handle.job_id, "EMBEDDING_FAILED", "upstream timeout", 3)
            .unwrap();

        let letters = ledger.dead_letters(10).unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].job_id, handle.job_id);
        assert_eq!(letters[0].attempts, 3);
    }
}
