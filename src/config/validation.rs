use super::models::{Config, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("Storage bucket must not be empty")]
    EmptyBucket,

    #[error("Database blob storage needs a positive max_inline_bytes")]
    InvalidInlineLimit,

    #[error("Retention value must be positive: {field} = {value}")]
    InvalidRetention { field: &'static str, value: u64 },

    #[error("runtime.blocking_threads must be positive")]
    InvalidBlockingThreads,

    #[error("Audit metadata allowlist entry is invalid: {key:?}")]
    InvalidAllowlistKey { key: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_storage(config)?;
    validate_retention(config)?;
    validate_runtime(config)?;
    validate_audit(config)?;
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    let storage = &config.storage;
    if storage.bucket.trim_matches('/').is_empty() {
        return Err(ValidationError::EmptyBucket);
    }

    match storage.provider {
        StorageProvider::S3 if storage.access_key.is_none() || storage.secret_key.is_none() => {
            Err(ValidationError::MissingS3Credentials)
        }
        StorageProvider::Database if storage.max_inline_bytes.as_u64() == 0 => {
            Err(ValidationError::InvalidInlineLimit)
        }
        _ => Ok(()),
    }
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    let retention = &config.retention;
    if retention.raw_upload_ttl_days == 0 {
        return Err(ValidationError::InvalidRetention {
            field: "raw_upload_ttl_days",
            value: 0,
        });
    }
    if retention.stale_job_timeout_secs == 0 {
        return Err(ValidationError::InvalidRetention {
            field: "stale_job_timeout_secs",
            value: 0,
        });
    }
    Ok(())
}

fn validate_runtime(config: &Config) -> Result<(), ValidationError> {
    if config.runtime.blocking_threads == 0 {
        return Err(ValidationError::InvalidBlockingThreads);
    }
    Ok(())
}

fn validate_audit(config: &Config) -> Result<(), ValidationError> {
    for key in &config.audit.metadata_allowlist {
        if key.is_empty() || !key.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_') {
            return Err(ValidationError::InvalidAllowlistKey { key: key.clone() });
        }
    }
    Ok(())
}
