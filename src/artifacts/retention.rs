/// Retention for raw uploads: the bytes go first, then the registry row.
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::BlobStore;

use super::models::ArtifactType;
use super::registry::ArtifactRegistry;

/// Pruning statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    pub examined: usize,
    pub pruned: usize,
    /// Blob deletes that failed; those rows are kept for the next run.
    pub blob_failures: usize,
    /// Rows stored on a different backend than the configured one.
    pub skipped: usize,
}

/// Delete every `raw_upload` older than `ttl`.
pub async fn prune_raw_uploads(
    registry: &ArtifactRegistry,
    blobs: &dyn BlobStore,
    ttl: Duration,
) -> Result<PruneStats> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(ttl)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

    let mut stats = PruneStats::default();
    for artifact in registry.expired(ArtifactType::RawUpload, cutoff)? {
        stats.examined += 1;

        if artifact.storage_backend != blobs.backend() {
            stats.skipped += 1;
            continue;
        }

        if let Err(e) = blobs.delete(&artifact.storage_pointer).await {
            stats.blob_failures += 1;
            warn!(artifact_id = %artifact.artifact_id, error = %e, "Raw upload blob delete failed");
            continue;
        }

        registry.remove(&artifact)?;
        stats.pruned += 1;
    }

    info!("Raw upload retention complete: {:?}", stats);
    Ok(stats)
}
