use thiserror::Error;

use crate::jobs::JobStatus;
use crate::storage::StorageError;
use crate::store::StoreError;
use crate::validation::ValidationError;

/// Error taxonomy shared by the job ledger, artifact registry and audit ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed scope, key or argument; nothing was written.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A concurrent race could not be resolved transparently.
    #[error("conflict: {0}")]
    Conflict(String),

    /// State-machine violation. Caller bug, never retried.
    #[error("invalid transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },

    /// Attempt to alter an already registered artifact.
    #[error("artifact {artifact_id} is immutable: {field} differs from the registered value")]
    ImmutabilityViolation {
        artifact_id: String,
        field: &'static str,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// Transient persistence failure; safe to retry with backoff.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Transient blob backend failure; safe to retry with backoff.
    #[error("blob storage error: {0}")]
    Blob(#[from] StorageError),

    /// Audit chain mismatch. Requires manual investigation.
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Storage(_) | LedgerError::Blob(_) | LedgerError::Conflict(_)
        )
    }

    /// Stable machine-readable code, suitable for `error_code` columns.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LedgerError::ImmutabilityViolation { .. } => "IMMUTABILITY_VIOLATION",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::Blob(_) => "BLOB_STORAGE_ERROR",
            LedgerError::Integrity(_) => "INTEGRITY_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
