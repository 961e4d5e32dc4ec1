use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    RawUpload,
    IngestionResult,
    ProcessedDocument,
    ProcessedResult,
    Transcript,
    ComplianceReport,
    RedactedText,
    RagRetrievalResult,
    IndexSummary,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::RawUpload => "raw_upload",
            ArtifactType::IngestionResult => "ingestion_result",
            ArtifactType::ProcessedDocument => "processed_document",
            ArtifactType::ProcessedResult => "processed_result",
            ArtifactType::Transcript => "transcript",
            ArtifactType::ComplianceReport => "compliance_report",
            ArtifactType::RedactedText => "redacted_text",
            ArtifactType::RagRetrievalResult => "rag_retrieval_result",
            ArtifactType::IndexSummary => "index_summary",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an artifact's bytes live. The registry never dereferences pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    ObjectStore,
    Filesystem,
    Database,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::ObjectStore => "object_store",
            StorageBackend::Filesystem => "filesystem",
            StorageBackend::Database => "database",
        }
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable input/output record. "Updating" an artifact means registering a
/// new one under a new id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: String,
    pub tenant_id: String,
    pub project_id: String,
    pub artifact_type: ArtifactType,
    pub storage_backend: StorageBackend,
    pub storage_pointer: String,
    pub content_type: Option<String>,
    pub byte_size: Option<u64>,
    pub sha256: Option<String>,
    pub schema_version: Option<String>,
    pub created_by_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registration request. `artifact_id` is optional so retries can reuse a
/// pre-generated id.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub tenant_id: String,
    pub project_id: String,
    pub artifact_type: ArtifactType,
    pub storage_backend: StorageBackend,
    pub storage_pointer: String,
    pub content_type: Option<String>,
    pub byte_size: Option<u64>,
    pub sha256: Option<String>,
    pub schema_version: Option<String>,
    pub created_by_job_id: Option<String>,
    pub artifact_id: Option<String>,
}

impl NewArtifact {
    pub fn new(
        tenant_id: impl Into<String>,
        project_id: impl Into<String>,
        artifact_type: ArtifactType,
        storage_backend: StorageBackend,
        storage_pointer: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
            artifact_type,
            storage_backend,
            storage_pointer: storage_pointer.into(),
            content_type: None,
            byte_size: None,
            sha256: None,
            schema_version: None,
            created_by_job_id: None,
            artifact_id: None,
        }
    }

    pub fn with_id(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    pub fn with_content(mut self, content_type: impl Into<String>, byte_size: u64) -> Self {
        self.content_type = Some(content_type.into());
        self.byte_size = Some(byte_size);
        self
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    pub fn created_by(mut self, job_id: impl Into<String>) -> Self {
        self.created_by_job_id = Some(job_id.into());
        self
    }
}
