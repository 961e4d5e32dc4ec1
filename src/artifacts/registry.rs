use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::observability::Metrics;
use crate::store::{ArtifactInsert, LedgerStore};
use crate::validation::{ValidationError, validate_entity_id, validate_scope_id};

use super::models::{Artifact, ArtifactType, NewArtifact};

/// Catalogue of immutable artifact records.
#[derive(Clone)]
pub struct ArtifactRegistry {
    store: Arc<LedgerStore>,
    metrics: Arc<Metrics>,
}

impl ArtifactRegistry {
    pub fn new(store: Arc<LedgerStore>, metrics: Arc<Metrics>) -> Self {
        Self { store, metrics }
    }

    /// Register an artifact and return its id.
    ///
    /// Re-registering an existing id is a no-op when the record matches, and an
    /// [`LedgerError::ImmutabilityViolation`] when the pointer, hash or scope
    /// differ.
    pub fn register(&self, new: NewArtifact) -> Result<String> {
        validate_scope_id("tenant_id", &new.tenant_id)?;
        validate_scope_id("project_id", &new.project_id)?;
        if new.storage_pointer.trim().is_empty() {
            return Err(ValidationError::EmptyPointer.into());
        }
        if let Some(sha256) = &new.sha256 {
            if sha256.len() != 64 || !sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ValidationError::InvalidCharacters { field: "sha256" }.into());
            }
        }
        if let Some(artifact_id) = &new.artifact_id {
            validate_entity_id("artifact_id", artifact_id)?;
        }
        if let Some(job_id) = &new.created_by_job_id {
            validate_entity_id("created_by_job_id", job_id)?;
        }

        let artifact = Artifact {
            artifact_id: new
                .artifact_id
                .unwrap_or_else(|| Uuid::now_v7().to_string()),
            tenant_id: new.tenant_id,
            project_id: new.project_id,
            artifact_type: new.artifact_type,
            storage_backend: new.storage_backend,
            storage_pointer: new.storage_pointer,
            content_type: new.content_type,
            byte_size: new.byte_size,
            sha256: new.sha256.map(|h| h.to_ascii_lowercase()),
            schema_version: new.schema_version,
            created_by_job_id: new.created_by_job_id,
            created_at: Utc::now(),
        };

        match self.store.insert_artifact(&artifact)? {
            ArtifactInsert::Inserted => {
                self.metrics.artifact_registered();
                info!(
                    artifact_id = %artifact.artifact_id,
                    tenant_id = %artifact.tenant_id,
                    artifact_type = %artifact.artifact_type,
                    backend = %artifact.storage_backend,
                    "Artifact registered"
                );
                Ok(artifact.artifact_id)
            }
            ArtifactInsert::Existing(existing) => {
                check_unchanged(&existing, &artifact)?;
                debug!(artifact_id = %existing.artifact_id, "Artifact already registered");
                Ok(existing.artifact_id)
            }
        }
    }

    pub fn get_by_id(&self, artifact_id: &str) -> Result<Artifact> {
        validate_entity_id("artifact_id", artifact_id)?;
        self.store
            .get_artifact(artifact_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("artifact {artifact_id}")))
    }

    /// Artifacts created by a job, oldest first.
    pub fn get_by_job(&self, job_id: &str) -> Result<Vec<Artifact>> {
        validate_entity_id("job_id", job_id)?;
        Ok(self.store.artifacts_for_job(job_id)?)
    }

    /// Artifacts of one type, newest first.
    pub fn get_by_type(
        &self,
        tenant_id: &str,
        project_id: &str,
        artifact_type: ArtifactType,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        validate_scope_id("tenant_id", tenant_id)?;
        validate_scope_id("project_id", project_id)?;
        Ok(self
            .store
            .artifacts_by_type(tenant_id, project_id, artifact_type, limit)?)
    }

    /// Artifacts of a type created before `cutoff`, across all tenants.
    pub(crate) fn expired(&self, artifact_type: ArtifactType, cutoff: DateTime<Utc>) -> Result<Vec<Artifact>> {
        Ok(self
            .store
            .artifacts_matching(|a| a.artifact_type == artifact_type && a.created_at < cutoff)?)
    }

    /// Drop a record whose bytes are already gone. Retention only.
    pub(crate) fn remove(&self, artifact: &Artifact) -> Result<()> {
        self.store.remove_artifact(artifact)?;
        Ok(())
    }
}

fn check_unchanged(existing: &Artifact, attempted: &Artifact) -> Result<()> {
    let field = if existing.storage_pointer != attempted.storage_pointer {
        Some("storage_pointer")
    } else if attempted.sha256.is_some() && existing.sha256 != attempted.sha256 {
        Some("sha256")
    } else if existing.tenant_id != attempted.tenant_id || existing.project_id != attempted.project_id {
        Some("scope")
    } else {
        None
    };

    match field {
        Some(field) => {
            warn!(artifact_id = %existing.artifact_id, field, "Rejected artifact mutation");
            Err(LedgerError::ImmutabilityViolation {
                artifact_id: existing.artifact_id.clone(),
                field,
            })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::StorageBackend;
    use tempfile::TempDir;

    fn create_registry() -> (ArtifactRegistry, Arc<Metrics>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(LedgerStore::open(temp_dir.path().join("ledger")).unwrap());
        let metrics = Arc::new(Metrics::new());
        (ArtifactRegistry::new(store, metrics.clone()), metrics, temp_dir)
    }

    fn raw(pointer: &str) -> NewArtifact {
        NewArtifact::new("t1", "p1", ArtifactType::RawUpload, StorageBackend::ObjectStore, pointer)
    }

    #[test]
    fn test_reregistration_semantics() {
        let (registry, metrics, _temp) = create_registry();

        assert_eq!(registry.register(raw("p1").with_id("A1")).unwrap(), "A1");
        assert_eq!(registry.register(raw("p1").with_id("A1")).unwrap(), "A1");

        let err = registry.register(raw("p2").with_id("A1")).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ImmutabilityViolation {
                field: "storage_pointer",
                ..
            }
        ));
        assert_eq!(registry.get_by_id("A1").unwrap().storage_pointer, "p1");
        assert_eq!(metrics.snapshot().artifacts_registered, 1);
    }

    #[test]
    fn test_sha_is_immutable() {
        let (registry, _metrics, _temp) = create_registry();
        let sha_a = "a".repeat(64);
        let sha_b = "b".repeat(64);

        registry.register(raw("p1").with_id("A1").with_sha256(&sha_a)).unwrap();
        assert!(registry.register(raw("p1").with_id("A1").with_sha256(&sha_a)).is_ok());
        assert!(matches!(
            registry
                .register(raw("p1").with_id("A1").with_sha256(&sha_b))
                .unwrap_err(),
            LedgerError::ImmutabilityViolation { field: "sha256", .. }
        ));
    }

    #[test]
    fn test_validation() {
        let (registry, _metrics, _temp) = create_registry();
        assert!(matches!(
            registry.register(raw("  ")).unwrap_err(),
            LedgerError::Validation(ValidationError::EmptyPointer)
        ));
        assert!(registry.register(raw("p").with_sha256("not-a-hash")).is_err());
        assert!(matches!(
            registry.get_by_id("missing").unwrap_err(),
            LedgerError::NotFound(_)
        ));
    }

    #[test]
    fn test_lookup_by_job_and_type() {
        let (registry, _metrics, _temp) = create_registry();
        let a = registry.register(raw("p/a").created_by("job-1")).unwrap();
        let b = registry
            .register(
                NewArtifact::new("t1", "p1", ArtifactType::Transcript, StorageBackend::Database, "p/b")
                    .created_by("job-1")
                    .with_content("application/json", 12),
            )
            .unwrap();
        registry.register(raw("p/c").created_by("job-2")).unwrap();

        let by_job: Vec<String> = registry
            .get_by_job("job-1")
            .unwrap()
            .into_iter()
            .map(|a| a.artifact_id)
            .collect();
        assert_eq!(by_job.len(), 2);
        assert!(by_job.contains(&a) && by_job.contains(&b));

        let transcripts = registry
            .get_by_type("t1", "p1", ArtifactType::Transcript, 10)
            .unwrap();
        assert_eq!(transcripts.len(), 1);
        assert_eq!(transcripts[0].byte_size, Some(12));
        assert!(registry
            .get_by_type("t2", "p1", ArtifactType::Transcript, 10)
            .unwrap()
            .is_empty());
    }
}
