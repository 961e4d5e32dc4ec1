use std::sync::Arc;

use crate::artifacts::ArtifactRegistry;
use crate::audit::{AuditLedger, AuditPolicy};
use crate::config::Config;
use crate::error::Result;
use crate::jobs::JobLedger;
use crate::observability::Metrics;
use crate::storage::{self, BlobLayout, BlobStore};
use crate::store::LedgerStore;

/// Everything an orchestrator needs, built once at startup and passed down
/// explicitly. Cloning is cheap.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<LedgerStore>,
    pub jobs: JobLedger,
    pub artifacts: ArtifactRegistry,
    pub audit: AuditLedger,
    pub blobs: Arc<dyn BlobStore>,
    pub layout: BlobLayout,
    pub metrics: Arc<Metrics>,
}

impl Services {
    /// Open the ledger and blob store described by `config`.
    pub fn open(config: &Config) -> Result<Self> {
        let store = Arc::new(LedgerStore::open(&config.ledger.path)?);
        let blobs = storage::from_config(&config.storage, store.clone())?;
        Ok(Self::new(
            store,
            blobs,
            BlobLayout::from(&config.storage),
            config.audit.policy(),
        ))
    }

    pub fn new(
        store: Arc<LedgerStore>,
        blobs: Arc<dyn BlobStore>,
        layout: BlobLayout,
        policy: AuditPolicy,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        Self {
            jobs: JobLedger::new(store.clone(), metrics.clone()),
            artifacts: ArtifactRegistry::new(store.clone(), metrics.clone()),
            audit: AuditLedger::new(store.clone(), policy, metrics.clone()),
            store,
            blobs,
            layout,
            metrics,
        }
    }
}
