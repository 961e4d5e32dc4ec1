//! Job records and the status state machine.
//!
//! ```text
//! pending ──► processing ──► completed
//!    │             │
//!    │             └───────► failed
//!    ├─────────────────────► failed
//!    └ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ► skipped   (handle only, never persisted)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    IngestionDocument,
    IngestionRegulation,
    ComplianceTranscript,
    RagIndex,
    RagQuery,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::IngestionDocument => "ingestion_document",
            JobType::IngestionRegulation => "ingestion_regulation",
            JobType::ComplianceTranscript => "compliance_transcript",
            JobType::RagIndex => "rag_index",
            JobType::RagQuery => "rag_query",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ingestion_document" => Ok(JobType::IngestionDocument),
            "ingestion_regulation" => Ok(JobType::IngestionRegulation),
            "compliance_transcript" => Ok(JobType::ComplianceTranscript),
            "rag_index" => Ok(JobType::RagIndex),
            "rag_query" => Ok(JobType::RagQuery),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Idempotent short-circuit, only ever returned in a [`JobHandle`].
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Pending, JobStatus::Skipped)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "skipped" => Ok(JobStatus::Skipped),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A tracked unit of asynchronous work, as persisted in the `jobs` partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: u8,
    pub idempotency_key: Option<String>,
    pub request_id: String,
    #[serde(default)]
    pub input_artifact_ids: Vec<String>,
    #[serde(default)]
    pub result_artifact_ids: Vec<String>,
    pub error_code: Option<String>,
    pub error_message_safe: Option<String>,
    pub error_debug_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

/// Parameters for [`crate::jobs::JobLedger::create_job`].
#[derive(Debug, Clone)]
pub struct NewJob {
    pub tenant_id: String,
    pub project_id: String,
    pub job_type: JobType,
    pub idempotency_key: Option<String>,
    pub input_artifact_ids: Vec<String>,
    pub request_id: String,
}

impl NewJob {
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
            idempotency_key: None,
            input_artifact_ids: Vec::new(),
            request_id: request_id.into(),
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_inputs(mut self, artifact_ids: Vec<String>) -> Self {
        self.input_artifact_ids = artifact_ids;
        self
    }
}

/// What `create_job` hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub status: JobStatus,
    /// Set when the call resolved onto a job that already existed.
    pub existing_job_id: Option<String>,
    pub result_artifact_ids: Vec<String>,
    /// True only for the call that inserted the row.
    pub created: bool,
}

impl JobHandle {
    pub(crate) fn created(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            status: job.status,
            existing_job_id: None,
            result_artifact_ids: Vec::new(),
            created: true,
        }
    }

    /// Resolve an existing job with the same idempotency key.
    pub(crate) fn resolved(existing: &Job) -> Self {
        let status = if existing.status == JobStatus::Completed {
            JobStatus::Skipped
        } else {
            existing.status
        };
        Self {
            job_id: existing.job_id.clone(),
            status,
            existing_job_id: Some(existing.job_id.clone()),
            result_artifact_ids: existing.result_artifact_ids.clone(),
            created: false,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status == JobStatus::Skipped
    }
}

/// Permanently failed work, kept for operator inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub job_id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub job_type: JobType,
    pub error_code: String,
    pub error_message_safe: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}
