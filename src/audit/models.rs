use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    PhiDetected,
    PhiAccessed,
    PhiExported,
    ComplianceDecision,
    ReportGenerated,
    UserLogin,
    TranscriptUploaded,
    DocumentIngested,
    ComplianceReportGenerated,
    JobCreated,
    JobStarted,
    JobCompleted,
    JobFailed,
    ArtifactRegistered,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::PhiDetected => "PHI_DETECTED",
            AuditEventType::PhiAccessed => "PHI_ACCESSED",
            AuditEventType::PhiExported => "PHI_EXPORTED",
            AuditEventType::ComplianceDecision => "COMPLIANCE_DECISION",
            AuditEventType::ReportGenerated => "REPORT_GENERATED",
            AuditEventType::UserLogin => "USER_LOGIN",
            AuditEventType::TranscriptUploaded => "TRANSCRIPT_UPLOADED",
            AuditEventType::DocumentIngested => "DOCUMENT_INGESTED",
            AuditEventType::ComplianceReportGenerated => "COMPLIANCE_REPORT_GENERATED",
            AuditEventType::JobCreated => "JOB_CREATED",
            AuditEventType::JobStarted => "JOB_STARTED",
            AuditEventType::JobCompleted => "JOB_COMPLETED",
            AuditEventType::JobFailed => "JOB_FAILED",
            AuditEventType::ArtifactRegistered => "ARTIFACT_REGISTERED",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuditEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_ascii_uppercase()))
            .map_err(|_| format!("unknown audit event type: {s}"))
    }
}

pub type AuditMetadata = BTreeMap<String, serde_json::Value>;

/// Append-only, hash-chained audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    /// Strictly increasing within the event's chain scope, starting at 1.
    pub sequence_number: u64,
    pub chain_scope: String,
    pub event_type: AuditEventType,
    pub description: String,
    pub tenant_id: String,
    pub project_id: String,
    pub user_id: Option<String>,
    pub user_ip: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AuditMetadata,
    pub previous_hash: Option<String>,
    pub event_hash: String,
}

/// Input to [`crate::audit::AuditLedger::log`].
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub event_type: AuditEventType,
    pub description: String,
    pub tenant_id: String,
    pub project_id: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub user_id: Option<String>,
    pub user_ip: Option<String>,
    pub metadata: AuditMetadata,
}

impl NewAuditEvent {
    pub fn new(
        event_type: AuditEventType,
        description: impl Into<String>,
        tenant_id: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            description: description.into(),
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
            resource_type: None,
            resource_id: None,
            user_id: None,
            user_ip: None,
            metadata: AuditMetadata::new(),
        }
    }

    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>, user_ip: Option<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.user_ip = user_ip;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Filters for [`crate::audit::AuditLedger::query_events`]. Tenant and project
/// are mandatory so a cross-tenant query cannot be expressed.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    pub tenant_id: String,
    pub project_id: String,
    pub event_type: Option<AuditEventType>,
    pub resource_id: Option<String>,
    pub limit: usize,
}

impl AuditQuery {
    pub fn new(tenant_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
            event_type: None,
            resource_id: None,
            limit: 100,
        }
    }

    pub fn event_type(mut self, event_type: AuditEventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub(crate) fn matches(&self, event: &AuditEvent) -> bool {
        event.tenant_id == self.tenant_id
            && event.project_id == self.project_id
            && self.event_type.is_none_or(|t| t == event.event_type)
            && self
                .resource_id
                .as_deref()
                .is_none_or(|r| event.resource_id.as_deref() == Some(r))
    }
}

/// Last link of a chain, kept beside the events so appends never scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub sequence_number: u64,
    pub event_hash: String,
}

/// Outcome of [`crate::audit::AuditLedger::verify_chain_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub is_valid: bool,
    pub events_checked: u64,
    pub violations: Vec<String>,
}
