/// Key layout and encoding utilities for fjall partitions
///
/// Partition structure:
/// - `jobs`: job:{job_id} -> Job (JSON)
/// - `job_scope`: {tenant}:{project}:{created_micros:020}:{job_id} -> ()
/// - `job_idem`: {tenant}:{project}:{job_type}:{idempotency_key} -> job_id
/// - `artifacts`: art:{artifact_id} -> Artifact (JSON)
/// - `artifact_job`: {job_id}:{created_micros:020}:{artifact_id} -> ()
/// - `artifact_type`: {tenant}:{project}:{type}:{created_micros:020}:{artifact_id} -> ()
/// - `audit`: {chain_scope}:{sequence:020} -> AuditEvent (JSON)
/// - `audit_index`: {tenant}:{project}:{timestamp_micros:020}:{sequence:020} -> audit key
/// - `audit_heads`: {chain_scope} -> ChainHead (JSON)
/// - `dlq`: {job_id}:{failed_micros:020} -> DeadLetter (JSON)
/// - `blobs`: {storage_pointer} -> raw bytes
///
/// Identifiers are validated to exclude `:` before they reach this module.
use chrono::{DateTime, Utc};

use crate::artifacts::Artifact;
use crate::jobs::{Job, JobType};

/// Microseconds since the epoch, clamped at zero so it zero-pads cleanly.
pub fn micros(ts: &DateTime<Utc>) -> u64 {
    u64::try_from(ts.timestamp_micros()).unwrap_or(0)
}

pub fn encode_job_key(job_id: &str) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

pub fn encode_job_scope_key(job: &Job) -> Vec<u8> {
    format!(
        "{}:{}:{:020}:{}",
        job.tenant_id,
        job.project_id,
        micros(&job.created_at),
        job.job_id
    )
    .into_bytes()
}

pub fn encode_job_scope_prefix(tenant_id: &str, project_id: &str) -> Vec<u8> {
    format!("{}:{}:", tenant_id, project_id).into_bytes()
}

pub fn encode_idem_key(
    tenant_id: &str,
    project_id: &str,
    job_type: JobType,
    idempotency_key: &str,
) -> Vec<u8> {
    format!(
        "{}:{}:{}:{}",
        tenant_id,
        project_id,
        job_type.as_str(),
        idempotency_key
    )
    .into_bytes()
}

pub fn encode_artifact_key(artifact_id: &str) -> Vec<u8> {
    format!("art:{}", artifact_id).into_bytes()
}

pub fn encode_artifact_job_key(job_id: &str, artifact: &Artifact) -> Vec<u8> {
    format!(
        "{}:{:020}:{}",
        job_id,
        micros(&artifact.created_at),
        artifact.artifact_id
    )
    .into_bytes()
}

pub fn encode_artifact_job_prefix(job_id: &str) -> Vec<u8> {
    format!("{}:", job_id).into_bytes()
}

pub fn encode_artifact_type_key(artifact: &Artifact) -> Vec<u8> {
    format!(
        "{}:{}:{}:{:020}:{}",
        artifact.tenant_id,
        artifact.project_id,
        artifact.artifact_type.as_str(),
        micros(&artifact.created_at),
        artifact.artifact_id
    )
    .into_bytes()
}

pub fn encode_artifact_type_prefix(tenant_id: &str, project_id: &str, artifact_type: &str) -> Vec<u8> {
    format!("{}:{}:{}:", tenant_id, project_id, artifact_type).into_bytes()
}

/// Decode the trailing id of a `job_scope`, `artifact_job` or `artifact_type` key.
pub fn decode_trailing_id(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.rsplit(':').next().map(String::from)
}

pub fn encode_audit_key(chain_scope: &str, sequence_number: u64) -> Vec<u8> {
    format!("{}:{:020}", chain_scope, sequence_number).into_bytes()
}

pub fn encode_audit_prefix(chain_scope: &str) -> Vec<u8> {
    format!("{}:", chain_scope).into_bytes()
}

pub fn encode_audit_index_key(
    tenant_id: &str,
    project_id: &str,
    timestamp: &DateTime<Utc>,
    sequence_number: u64,
) -> Vec<u8> {
    format!(
        "{}:{}:{:020}:{:020}",
        tenant_id,
        project_id,
        micros(timestamp),
        sequence_number
    )
    .into_bytes()
}

pub fn encode_audit_index_prefix(tenant_id: &str, project_id: &str) -> Vec<u8> {
    format!("{}:{}:", tenant_id, project_id).into_bytes()
}

pub fn encode_dlq_key(job_id: &str, failed_at: &DateTime<Utc>) -> Vec<u8> {
    format!("{}:{:020}", job_id, micros(failed_at)).into_bytes()
}
