//! Tamper-evident audit trail
//!
//! Events are appended to SHA-256 hash chains whose partitioning is chosen by
//! [`ChainScope`]. Every read is bound to a tenant/project, and verification
//! recomputes each chain from its first event.

pub mod chain;
mod ledger;
mod models;

pub use chain::ChainScope;
pub use ledger::{AuditLedger, AuditPolicy, DEFAULT_METADATA_ALLOWLIST};
pub use models::{
    AuditEvent, AuditEventType, AuditMetadata, AuditQuery, ChainHead, ChainVerification,
    NewAuditEvent,
};
