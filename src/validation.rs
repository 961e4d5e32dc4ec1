//! Structural checks applied before any write touches the store.
//!
//! Identifiers double as key segments in the fjall partitions, so they are
//! restricted to a character set that can never contain the `:` separator.

use thiserror::Error;

/// Longest idempotency key accepted by the ledger.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 256;

/// Longest `error_message_safe` kept on a job or dead letter.
pub const MAX_SAFE_MESSAGE_LEN: usize = 256;

const MAX_SCOPE_ID_LEN: usize = 64;
const MAX_ENTITY_ID_LEN: usize = 128;
const MAX_ERROR_CODE_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} contains characters outside [A-Za-z0-9_.-]")]
    InvalidCharacters { field: &'static str },
    #[error("idempotency key must be printable ASCII without whitespace")]
    InvalidIdempotencyKey,
    #[error("error code must match [A-Z0-9_]{{1,64}}")]
    InvalidErrorCode,
    #[error("progress must be between 0 and 100, got {0}")]
    ProgressOutOfRange(u8),
    #[error("storage pointer must not be empty")]
    EmptyPointer,
}

/// Validate a tenant or project identifier.
pub fn validate_scope_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
    validate_token(field, value, MAX_SCOPE_ID_LEN)
}

/// Validate a job, artifact, or other entity identifier.
pub fn validate_entity_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
    validate_token(field, value, MAX_ENTITY_ID_LEN)
}

fn validate_token(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.len() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ValidationError::InvalidCharacters { field });
    }
    Ok(())
}

/// Audit resource ids are stored as values, never as key segments, so any
/// non-empty id within the entity length is accepted.
pub fn validate_resource_id(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty {
            field: "resource_id",
        });
    }
    if value.len() > MAX_ENTITY_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "resource_id",
            max: MAX_ENTITY_ID_LEN,
        });
    }
    Ok(())
}

/// The ledger never computes idempotency keys, it only checks their shape.
pub fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
    if key.is_empty() {
        return Err(ValidationError::Empty {
            field: "idempotency_key",
        });
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: "idempotency_key",
            max: MAX_IDEMPOTENCY_KEY_LEN,
        });
    }
    if !key.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ValidationError::InvalidIdempotencyKey);
    }
    Ok(())
}

pub fn validate_error_code(code: &str) -> Result<(), ValidationError> {
    let well_formed = !code.is_empty()
        && code.len() <= MAX_ERROR_CODE_LEN
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');

    if well_formed {
        Ok(())
    } else {
        Err(ValidationError::InvalidErrorCode)
    }
}

pub fn validate_progress(progress: u8) -> Result<(), ValidationError> {
    if progress > 100 {
        return Err(ValidationError::ProgressOutOfRange(progress));
    }
    Ok(())
}

/// Normalize a caller-provided safe message for storage.
///
/// Control characters (including newlines, which tend to smuggle stack traces
/// and payload excerpts) become spaces and the result is capped at
/// [`MAX_SAFE_MESSAGE_LEN`] characters.
pub fn sanitize_safe_message(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(MAX_SAFE_MESSAGE_LEN)
        .collect();
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_ids_reject_separator() {
        assert!(validate_scope_id("tenant_id", "acme").is_ok());
        assert!(validate_scope_id("tenant_id", "acme-prod_01").is_ok());
        assert_eq!(
            validate_scope_id("tenant_id", "acme:globex"),
            Err(ValidationError::InvalidCharacters { field: "tenant_id" })
        );
        assert_eq!(
            validate_scope_id("project_id", ""),
            Err(ValidationError::Empty { field: "project_id" })
        );
        assert!(matches!(
            validate_scope_id("tenant_id", &"a".repeat(65)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn resource_ids_allow_any_printable_form() {
        assert!(validate_resource_id("claims/2024/form.pdf").is_ok());
        assert!(validate_resource_id("jane@example.org").is_ok());
        assert_eq!(
            validate_resource_id(""),
            Err(ValidationError::Empty {
                field: "resource_id"
            })
        );
        assert!(matches!(
            validate_resource_id(&"r".repeat(129)),
            Err(ValidationError::TooLong { .. })
        ));
    }

    #[test]
    fn idempotency_key_shape() {
        assert!(validate_idempotency_key(&"f".repeat(64)).is_ok());
        assert!(validate_idempotency_key("sha:abc:t1").is_ok());
        assert_eq!(
            validate_idempotency_key("has space"),
            Err(ValidationError::InvalidIdempotencyKey)
        );
        assert!(validate_idempotency_key("").is_err());
        assert!(validate_idempotency_key(&"k".repeat(257)).is_err());
    }

    #[test]
    fn error_codes() {
        assert!(validate_error_code("STALE_TIMEOUT").is_ok());
        assert!(validate_error_code("E42").is_ok());
        assert!(validate_error_code("stale").is_err());
        assert!(validate_error_code("").is_err());
        assert!(validate_error_code("BAD-CODE").is_err());
    }

    #[test]
    fn progress_bounds() {
        assert!(validate_progress(0).is_ok());
        assert!(validate_progress(100).is_ok());
        assert_eq!(
            validate_progress(101),
            Err(ValidationError::ProgressOutOfRange(101))
        );
    }

    #[test]
    fn sanitize_strips_control_and_truncates() {
        assert_eq!(
            sanitize_safe_message("parse failed\nTraceback: /srv/uploads/x.pdf"),
            "parse failed Traceback: /srv/uploads/x.pdf"
        );
        let long = "x".repeat(1000);
        assert_eq!(sanitize_safe_message(&long).len(), MAX_SAFE_MESSAGE_LEN);
    }
}
