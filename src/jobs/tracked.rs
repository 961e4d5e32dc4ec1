//! Higher-order wrapper that runs a unit of work under full ledger tracking.
//!
//! ```rust,ignore
//! let outcome = run_tracked(&services, TrackedJob::new("acme", "claims", JobType::IngestionDocument, "req-1")
//!     .with_content(&upload), |ctx| async move {
//!         let id = ctx
//!             .write_artifact(ArtifactType::IngestionResult, "result.json", "application/json", body)
//!             .await?;
//!         Ok(WorkOutput::new(vec![id]))
//!     })
//!     .await?;
//! ```
//!
//! Duplicate submissions short-circuit before the work function is called.
//! Every ledger call runs on tokio's blocking pool.

use std::collections::BTreeMap;
use std::future::Future;

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::artifacts::{ArtifactType, NewArtifact};
use crate::audit::{AuditEvent, AuditEventType, NewAuditEvent};
use crate::error::{LedgerError, Result};
use crate::idempotency::{IdempotencyKey, content_hash};
use crate::state::Services;
use crate::store::StoreError;
use crate::validation::validate_entity_id;

use super::models::{Job, JobStatus, JobType, NewJob};

/// Error code recorded when a required audit event could not be written.
pub const AUDIT_UNAVAILABLE_CODE: &str = "AUDIT_UNAVAILABLE";

/// Error code recorded when work succeeds but reports unusable result ids.
pub const INVALID_RESULT_CODE: &str = "INVALID_RESULT";

/// A work request, plus what is needed to derive its idempotency key.
#[derive(Debug, Clone)]
pub struct TrackedJob {
    pub tenant_id: String,
    pub project_id: String,
    pub job_type: JobType,
    pub request_id: String,
    pub input_artifact_ids: Vec<String>,
    content_hash: Option<String>,
    params: BTreeMap<String, String>,
    idempotency_key: Option<String>,
}

impl TrackedJob {
    pub fn new(
        tenant_id: impl Into<String>,
        project_id: impl Into<String>,
        job_type: JobType,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
            job_type,
            request_id: request_id.into(),
            input_artifact_ids: Vec::new(),
            content_hash: None,
            params: BTreeMap::new(),
            idempotency_key: None,
        }
    }

    /// Derive the idempotency key from this content.
    pub fn with_content(mut self, content: &[u8]) -> Self {
        self.content_hash = Some(content_hash(content));
        self
    }

    /// Behaviour-affecting parameter folded into the derived key.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Use a caller-supplied key instead of deriving one.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_inputs(mut self, artifact_ids: Vec<String>) -> Self {
        self.input_artifact_ids = artifact_ids;
        self
    }

    pub fn idempotency_key(&self) -> Option<String> {
        if let Some(key) = &self.idempotency_key {
            return Some(key.clone());
        }
        self.content_hash.as_deref().map(|hash| {
            IdempotencyKey::from_content_hash(
                hash,
                &self.tenant_id,
                &self.project_id,
                self.job_type,
                &self.params,
            )
            .into_string()
        })
    }

    fn into_new_job(self) -> NewJob {
        let key = self.idempotency_key();
        let new = NewJob::new(self.tenant_id, self.project_id, self.job_type, self.request_id)
            .with_inputs(self.input_artifact_ids);
        match key {
            Some(key) => new.with_idempotency_key(key),
            None => new,
        }
    }
}

/// What the work function produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkOutput {
    pub result_artifact_ids: Vec<String>,
}

impl WorkOutput {
    pub fn new(result_artifact_ids: Vec<String>) -> Self {
        Self {
            result_artifact_ids,
        }
    }
}

/// Failure reported by a work function. The message is sanitized before it
/// is stored, but should still be written for an operator, not copied from input.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct WorkError {
    code: String,
    message: String,
}

impl WorkError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: normalize_code(code),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<LedgerError> for WorkError {
    fn from(err: LedgerError) -> Self {
        WorkError::new(err.code(), "Ledger operation failed during work")
    }
}

fn normalize_code(code: &str) -> String {
    let normalized: String = code
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .map(|c| {
            if c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if normalized.is_empty() {
        "WORK_FAILED".to_string()
    } else {
        normalized
    }
}

/// Result of [`run_tracked`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedOutcome {
    Completed {
        job_id: String,
        result_artifact_ids: Vec<String>,
    },
    /// Identical work already completed; nothing was run.
    Skipped {
        job_id: String,
        result_artifact_ids: Vec<String>,
    },
    /// Identical work is pending or running under another caller.
    InFlight { job_id: String, status: JobStatus },
    Failed {
        job_id: String,
        error_code: String,
        error_debug_id: Option<String>,
    },
}

impl TrackedOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            TrackedOutcome::Completed { job_id, .. }
            | TrackedOutcome::Skipped { job_id, .. }
            | TrackedOutcome::InFlight { job_id, .. }
            | TrackedOutcome::Failed { job_id, .. } => job_id,
        }
    }
}

/// Handle given to the work function for the job it is running.
#[derive(Clone)]
pub struct JobContext {
    services: Services,
    job: Job,
}

impl JobContext {
    pub fn job_id(&self) -> &str {
        &self.job.job_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.job.tenant_id
    }

    pub fn project_id(&self) -> &str {
        &self.job.project_id
    }

    pub fn job_type(&self) -> JobType {
        self.job.job_type
    }

    pub fn request_id(&self) -> &str {
        &self.job.request_id
    }

    pub fn input_artifact_ids(&self) -> &[String] {
        &self.job.input_artifact_ids
    }

    pub async fn report_progress(&self, progress: u8) -> Result<()> {
        let jobs = self.services.jobs.clone();
        let job_id = self.job.job_id.clone();
        blocking(move || jobs.update_progress(&job_id, progress)).await?;
        Ok(())
    }

    /// Store bytes under `{job_id}/{name}` in the tenant's namespace and
    /// register them as an artifact created by this job.
    pub async fn write_artifact(
        &self,
        artifact_type: ArtifactType,
        name: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<String> {
        let object = format!("{}/{}", self.job.job_id, name);
        let pointer = self
            .services
            .layout
            .pointer(&self.job.tenant_id, &self.job.project_id, &object)?;
        let sha256 = content_hash(&data);
        let byte_size = data.len() as u64;

        self.services.blobs.put(&pointer, data).await?;

        let new = NewArtifact::new(
            &self.job.tenant_id,
            &self.job.project_id,
            artifact_type,
            self.services.blobs.backend(),
            pointer,
        )
        .with_content(content_type, byte_size)
        .with_sha256(sha256)
        .created_by(&self.job.job_id);

        let registry = self.services.artifacts.clone();
        let artifact_id = blocking(move || registry.register(new)).await?;

        let event = NewAuditEvent::new(
            AuditEventType::ArtifactRegistered,
            "Artifact registered",
            &self.job.tenant_id,
            &self.job.project_id,
        )
        .resource("artifact", &artifact_id)
        .meta("artifact_id", artifact_id.as_str())
        .meta("artifact_type", artifact_type.as_str())
        .meta("job_id", self.job.job_id.as_str())
        .meta("byte_size", byte_size);
        let audit = self.services.audit.clone();
        blocking(move || audit.log(event)).await?;

        Ok(artifact_id)
    }
}

/// Run `work` as a tracked job.
///
/// Creation, the status transitions, dead-lettering and the audit trail are
/// handled here; `work` only does the domain processing. Audit writes are
/// fail-closed: if one cannot be recorded the job is failed with
/// [`AUDIT_UNAVAILABLE_CODE`] and the audit error is returned.
///
/// Result ids are checked before `JOB_COMPLETED` is written; bad ids fail the
/// job with [`INVALID_RESULT_CODE`]. If the job cannot be completed after the
/// audit write it is failed and the ledger error is returned.
pub async fn run_tracked<F, Fut>(services: &Services, request: TrackedJob, work: F) -> Result<TrackedOutcome>
where
    F: FnOnce(JobContext) -> Fut,
    Fut: Future<Output = std::result::Result<WorkOutput, WorkError>>,
{
    let new = request.into_new_job();
    let jobs = services.jobs.clone();
    let handle = blocking(move || jobs.create_job(new)).await?;

    if handle.is_skipped() {
        return Ok(TrackedOutcome::Skipped {
            job_id: handle.job_id,
            result_artifact_ids: handle.result_artifact_ids,
        });
    }
    if !handle.created {
        info!(job_id = %handle.job_id, status = %handle.status, "Identical work already in flight");
        return Ok(TrackedOutcome::InFlight {
            job_id: handle.job_id,
            status: handle.status,
        });
    }

    let jobs = services.jobs.clone();
    let job_id = handle.job_id.clone();
    let job = blocking(move || jobs.get_status(&job_id)).await?;
    audit_or_fail(services, AuditEventType::JobCreated, &job).await?;

    let jobs = services.jobs.clone();
    let job_id = handle.job_id.clone();
    let job = blocking(move || jobs.start_processing(&job_id)).await?;
    audit_or_fail(services, AuditEventType::JobStarted, &job).await?;

    let ctx = JobContext {
        services: services.clone(),
        job: job.clone(),
    };

    let outcome = work(ctx).await.and_then(|output| {
        for artifact_id in &output.result_artifact_ids {
            if validate_entity_id("result_artifact_id", artifact_id).is_err() {
                return Err(WorkError::new(
                    INVALID_RESULT_CODE,
                    "Work returned an invalid result artifact id",
                ));
            }
        }
        Ok(output)
    });

    match outcome {
        Ok(output) => {
            audit_or_fail(services, AuditEventType::JobCompleted, &job).await?;

            let jobs = services.jobs.clone();
            let job_id = job.job_id.clone();
            let completed =
                match blocking(move || jobs.complete_job(&job_id, output.result_artifact_ids)).await {
                    Ok(completed) => completed,
                    Err(e) => {
                        fail_uncompleted(services, &job, &e).await;
                        return Err(e);
                    }
                };

            Ok(TrackedOutcome::Completed {
                job_id: completed.job_id,
                result_artifact_ids: completed.result_artifact_ids,
            })
        }
        Err(work_error) => {
            warn!(job_id = %job.job_id, error_code = %work_error.code(), "Tracked work failed");

            let jobs = services.jobs.clone();
            let job_id = job.job_id.clone();
            let code = work_error.code().to_string();
            let message = work_error.message().to_string();
            let failed = blocking(move || {
                let failed = jobs.fail_job(&job_id, &code, &message, None)?;
                if let Err(e) = jobs.dead_letter(&job_id, &code, &message, 1) {
                    error!(job_id = %job_id, error = %e, "Dead-letter push failed");
                }
                Ok(failed)
            })
            .await?;

            log_job_event(services, AuditEventType::JobFailed, &failed, Some(work_error.code())).await?;

            Ok(TrackedOutcome::Failed {
                job_id: failed.job_id,
                error_code: work_error.code().to_string(),
                error_debug_id: failed.error_debug_id,
            })
        }
    }
}

async fn audit_or_fail(services: &Services, event_type: AuditEventType, job: &Job) -> Result<()> {
    let Err(audit_error) = log_job_event(services, event_type, job, None).await else {
        return Ok(());
    };

    error!(job_id = %job.job_id, event_type = %event_type, error = %audit_error, "Audit unavailable, failing job");
    let jobs = services.jobs.clone();
    let job_id = job.job_id.clone();
    let failed = blocking(move || {
        jobs.fail_job(&job_id, AUDIT_UNAVAILABLE_CODE, "Audit trail unavailable", None)
    })
    .await;
    if let Err(e) = failed {
        error!(job_id = %job.job_id, error = %e, "Could not fail job after audit failure");
    }
    Err(audit_error)
}

/// `complete_job` failed after `JOB_COMPLETED` was recorded. A job that is
/// still live is failed, and `JOB_FAILED` is appended for whichever failure
/// the ledger holds, so the trail ends on the job's actual state.
async fn fail_uncompleted(services: &Services, job: &Job, cause: &LedgerError) {
    error!(job_id = %job.job_id, error = %cause, "Job could not be completed");

    let jobs = services.jobs.clone();
    let job_id = job.job_id.clone();
    let code = cause.code();
    let current = blocking(move || {
        let current = jobs.get_status(&job_id)?;
        if current.status.is_terminal() {
            return Ok(current);
        }
        jobs.fail_job(&job_id, code, "Job could not be marked completed", None)
    })
    .await;

    match current {
        Ok(current) if current.status == JobStatus::Failed => {
            let error_code = current.error_code.as_deref().unwrap_or(code);
            if let Err(e) =
                log_job_event(services, AuditEventType::JobFailed, &current, Some(error_code)).await
            {
                error!(job_id = %job.job_id, error = %e, "Could not audit failed completion");
            }
        }
        Ok(_) => {}
        Err(e) => error!(job_id = %job.job_id, error = %e, "Could not fail job after completion error"),
    }
}

async fn log_job_event(
    services: &Services,
    event_type: AuditEventType,
    job: &Job,
    error_code: Option<&str>,
) -> Result<AuditEvent> {
    let description = match event_type {
        AuditEventType::JobCreated => "Job created",
        AuditEventType::JobStarted => "Job started",
        AuditEventType::JobCompleted => "Job completed",
        _ => "Job failed",
    };

    let mut event = NewAuditEvent::new(event_type, description, &job.tenant_id, &job.project_id)
        .resource("job", &job.job_id)
        .meta("job_id", job.job_id.as_str())
        .meta("job_type", job.job_type.as_str())
        .meta("request_id", job.request_id.as_str());
    if let Some(code) = error_code {
        event = event.meta("error_code", code);
    }

    let audit = services.audit.clone();
    blocking(move || audit.log(event)).await
}

async fn blocking<T, F>(op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| LedgerError::Storage(StoreError::Task(e.to_string())))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_error_codes_are_normalized() {
        assert_eq!(WorkError::new("extraction-failed", "x").code(), "EXTRACTION_FAILED");
        assert_eq!(WorkError::new("", "x").code(), "WORK_FAILED");
        assert_eq!(WorkError::new(&"a".repeat(100), "x").code().len(), 64);
    }

    #[test]
    fn derived_key_matches_deriver() {
        let request = TrackedJob::new("t1", "p1", JobType::IngestionDocument, "req")
            .with_content(b"document bytes")
            .with_param("chunk_size", "512");
        let expected = IdempotencyKey::derive(
            b"document bytes",
            "t1",
            "p1",
            JobType::IngestionDocument,
            &BTreeMap::from([("chunk_size".to_string(), "512".to_string())]),
        );
        assert_eq!(request.idempotency_key().as_deref(), Some(expected.as_str()));

        let explicit = request.with_idempotency_key("manual");
        assert_eq!(explicit.idempotency_key().as_deref(), Some("manual"));

        assert!(
            TrackedJob::new("t1", "p1", JobType::RagQuery, "req")
                .idempotency_key()
                .is_none()
        );
    }
}
