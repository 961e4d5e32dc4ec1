//! Idempotency key derivation.
//!
//! Every orchestrator that submits work must agree on this formula, otherwise
//! identical submissions stop collapsing onto one job:
//!
//! ```text
//! key = hex(sha256("{hex(sha256(content))}:{tenant}:{project}:{job_type}[:{k}={v}]..."))
//! ```
//!
//! Behaviour-affecting parameters are appended in key order, so the caller's
//! map ordering never changes the result.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::jobs::JobType;

/// Hex-encoded SHA-256 of raw content bytes.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Deterministic key identifying "the same logical work".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn derive(
        content: &[u8],
        tenant_id: &str,
        project_id: &str,
        job_type: JobType,
        params: &BTreeMap<String, String>,
    ) -> Self {
        Self::from_content_hash(&content_hash(content), tenant_id, project_id, job_type, params)
    }

    /// Same as [`IdempotencyKey::derive`] when the content hash is already known,
    /// e.g. taken from a registered artifact's `sha256`.
    pub fn from_content_hash(
        content_hash: &str,
        tenant_id: &str,
        project_id: &str,
        job_type: JobType,
        params: &BTreeMap<String, String>,
    ) -> Self {
        let mut base = format!(
            "{}:{}:{}:{}",
            content_hash,
            tenant_id,
            project_id,
            job_type.as_str()
        );
        for (key, value) in params {
            base.push(':');
            base.push_str(key);
            base.push('=');
            base.push_str(value);
        }

        IdempotencyKey(hex::encode(Sha256::digest(base.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
