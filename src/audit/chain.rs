//! Canonical serialization and SHA-256 hash-chain primitives.
//!
//! Each event hash is computed over `previous_hash_hex || canonical_json`, where
//! the genesis event of a chain uses the empty string as its previous hash.

use std::fmt;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::models::{AuditEvent, AuditEventType, AuditMetadata};

/// How audit events are partitioned into independent hash chains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainScope {
    /// One chain across every tenant: a single total order.
    #[default]
    Global,
    /// One chain per tenant.
    Tenant,
    /// One chain per tenant/project pair.
    TenantProject,
}

impl ChainScope {
    /// Storage key of the chain an event for `tenant_id`/`project_id` joins.
    pub fn key(&self, tenant_id: &str, project_id: &str) -> String {
        match self {
            ChainScope::Global => "global".to_string(),
            ChainScope::Tenant => format!("t:{tenant_id}"),
            ChainScope::TenantProject => format!("tp:{tenant_id}/{project_id}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChainScope::Global => "global",
            ChainScope::Tenant => "tenant",
            ChainScope::TenantProject => "tenant_project",
        }
    }
}

impl fmt::Display for ChainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChainScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global" => Ok(ChainScope::Global),
            "tenant" => Ok(ChainScope::Tenant),
            "tenant_project" => Ok(ChainScope::TenantProject),
            other => Err(format!("unknown chain scope: {other}")),
        }
    }
}

/// Hashed view of an event. Field order here is the canonical order.
#[derive(Serialize)]
struct CanonicalEvent<'a> {
    id: &'a str,
    sequence_number: u64,
    event_type: AuditEventType,
    description: &'a str,
    tenant_id: &'a str,
    project_id: &'a str,
    user_id: Option<&'a str>,
    user_ip: Option<&'a str>,
    resource_type: Option<&'a str>,
    resource_id: Option<&'a str>,
    timestamp: String,
    metadata: &'a AuditMetadata,
}

/// Deterministic serialization of every hashed field (excludes the two hash
/// fields and `chain_scope`, which is derived from tenant/project).
pub fn canonicalize(event: &AuditEvent) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&CanonicalEvent {
        id: &event.id,
        sequence_number: event.sequence_number,
        event_type: event.event_type,
        description: &event.description,
        tenant_id: &event.tenant_id,
        project_id: &event.project_id,
        user_id: event.user_id.as_deref(),
        user_ip: event.user_ip.as_deref(),
        resource_type: event.resource_type.as_deref(),
        resource_id: event.resource_id.as_deref(),
        timestamp: event.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        metadata: &event.metadata,
    })
}

/// `hex(sha256(previous_hash || canonical))`
pub fn compute_hash(previous_hash: Option<&str>, canonical: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.unwrap_or_default().as_bytes());
    hasher.update(canonical);
    hex::encode(hasher.finalize())
}

/// Recompute an event's hash as if it followed `previous_hash`.
pub fn expected_hash(event: &AuditEvent, previous_hash: Option<&str>) -> serde_json::Result<String> {
    Ok(compute_hash(previous_hash, &canonicalize(event)?))
}
