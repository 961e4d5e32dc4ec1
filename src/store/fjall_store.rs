use std::path::Path;

use fjall::{
    Config, PartitionCreateOptions, PersistMode, ReadTransaction, TransactionalPartitionHandle,
    TxKeyspace,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::artifacts::{Artifact, ArtifactType};
use crate::audit::{AuditEvent, ChainHead};
use crate::jobs::{DeadLetter, Job, JobStatus, JobType};

use super::error::{Result, StoreError};
use super::keys::{
    decode_trailing_id, encode_artifact_job_key, encode_artifact_job_prefix,
    encode_artifact_key, encode_artifact_type_key, encode_artifact_type_prefix, encode_audit_index_key,
    encode_audit_index_prefix, encode_audit_key, encode_audit_prefix, encode_dlq_key, encode_idem_key,
    encode_job_key, encode_job_scope_key, encode_job_scope_prefix,
};

/// Result of inserting a job row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobInsert {
    Inserted,
    /// The idempotency index already points at a live job. Carries its id.
    Duplicate(String),
}

/// Result of inserting an artifact row.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactInsert {
    Inserted,
    Existing(Artifact),
}

/// fjall-backed transactional storage for the ledger
#[derive(Clone)]
pub struct LedgerStore {
    keyspace: TxKeyspace,
    jobs: TransactionalPartitionHandle,
    job_scope: TransactionalPartitionHandle,
    job_idem: TransactionalPartitionHandle,
    artifacts: TransactionalPartitionHandle,
    artifact_job: TransactionalPartitionHandle,
    artifact_type: TransactionalPartitionHandle,
    audit: TransactionalPartitionHandle,
    audit_index: TransactionalPartitionHandle,
    audit_heads: TransactionalPartitionHandle,
    dlq: TransactionalPartitionHandle,
    blobs: TransactionalPartitionHandle,
}

impl LedgerStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening ledger store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open_transactional()?;

        let open = |name: &str| keyspace.open_partition(name, PartitionCreateOptions::default());
        let jobs = open("jobs")?;
        let job_scope = open("job_scope")?;
        let job_idem = open("job_idem")?;
        let artifacts = open("artifacts")?;
        let artifact_job = open("artifact_job")?;
        let artifact_type = open("artifact_type")?;
        let audit = open("audit")?;
        let audit_index = open("audit_index")?;
        let audit_heads = open("audit_heads")?;
        let dlq = open("dlq")?;
        let blobs = open("blobs")?;

        info!("Ledger store opened successfully");
        Ok(Self {
            keyspace,
            jobs,
            job_scope,
            job_idem,
            artifacts,
            artifact_job,
            artifact_type,
            audit,
            audit_index,
            audit_heads,
            dlq,
            blobs,
        })
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Insert a new job row, enforcing idempotency-key uniqueness.
    ///
    /// The key check and the insert share one write transaction. A key held by
    /// a `failed` job is re-pointed at the new job; any other holder wins.
    pub fn insert_job(&self, job: &Job) -> Result<JobInsert> {
        let mut tx = self.keyspace.write_tx();

        if let Some(idempotency_key) = &job.idempotency_key {
            let idem_key = encode_idem_key(
                &job.tenant_id,
                &job.project_id,
                job.job_type,
                idempotency_key,
            );

            if let Some(holder) = tx.get(&self.job_idem, &idem_key)? {
                let holder_id = String::from_utf8_lossy(&holder).to_string();
                let holder_live = match tx.get(&self.jobs, encode_job_key(&holder_id))? {
                    Some(raw) => serde_json::from_slice::<Job>(&raw)?.status != JobStatus::Failed,
                    None => false,
                };

                if holder_live {
                    debug!(job_id = %job.job_id, holder = %holder_id, "Idempotency key already held");
                    return Ok(JobInsert::Duplicate(holder_id));
                }
                debug!(job_id = %job.job_id, superseded = %holder_id, "Re-pointing idempotency key");
            }

            tx.insert(&self.job_idem, idem_key, job.job_id.as_bytes());
        }

        tx.insert(&self.jobs, encode_job_key(&job.job_id), serde_json::to_vec(job)?);
        tx.insert(&self.job_scope, encode_job_scope_key(job), Vec::<u8>::new());
        tx.commit()?;

        debug!("Inserted job: {}", job.job_id);
        Ok(JobInsert::Inserted)
    }

    /// Get a job by ID
    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        match self.jobs.get(encode_job_key(job_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Look up the job currently holding an idempotency key
    pub fn find_idempotent(
        &self,
        tenant_id: &str,
        project_id: &str,
        job_type: JobType,
        idempotency_key: &str,
    ) -> Result<Option<Job>> {
        let idem_key = encode_idem_key(tenant_id, project_id, job_type, idempotency_key);
        match self.job_idem.get(idem_key)? {
            Some(job_id) => self.get_job(&String::from_utf8_lossy(&job_id)),
            None => Ok(None),
        }
    }

    /// Read-modify-write a job inside one write transaction.
    ///
    /// Returns `Ok(None)` when the job does not exist. If `apply` fails the
    /// transaction is dropped and the stored row is left untouched.
    pub fn update_job<F, E>(&self, job_id: &str, apply: F) -> std::result::Result<Option<Job>, E>
    where
        F: FnOnce(&mut Job) -> std::result::Result<(), E>,
        E: From<StoreError>,
    {
        let key = encode_job_key(job_id);
        let mut tx = self.keyspace.write_tx();

        let Some(raw) = tx.get(&self.jobs, &key).map_err(StoreError::from)? else {
            return Ok(None);
        };
        let mut job: Job = serde_json::from_slice(&raw).map_err(StoreError::from)?;

        apply(&mut job)?;

        let value = serde_json::to_vec(&job).map_err(StoreError::from)?;
        tx.insert(&self.jobs, key, value);
        tx.commit().map_err(StoreError::from)?;

        debug!(job_id, status = %job.status, "Updated job");
        Ok(Some(job))
    }

    /// Jobs for a tenant/project, newest first
    pub fn list_jobs(
        &self,
        tenant_id: &str,
        project_id: &str,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>> {
        let rtx = self.keyspace.read_tx();
        let mut jobs = Vec::new();

        for item in rtx
            .prefix(&self.job_scope, encode_job_scope_prefix(tenant_id, project_id))
            .rev()
        {
            if jobs.len() >= limit {
                break;
            }
            let (key, _) = item?;
            let job_id = decode_trailing_id(&key).ok_or_else(|| corrupt("job_scope", &key))?;
            if let Some(job) = read_json::<Job>(&rtx, &self.jobs, encode_job_key(&job_id))? {
                if status.is_none_or(|s| s == job.status) {
                    jobs.push(job);
                }
            }
        }

        Ok(jobs)
    }

    /// Full scan over job rows. Used by reconciliation sweeps only.
    pub fn jobs_matching<P>(&self, predicate: P) -> Result<Vec<Job>>
    where
        P: Fn(&Job) -> bool,
    {
        let rtx = self.keyspace.read_tx();
        let mut jobs = Vec::new();
        for item in rtx.iter(&self.jobs) {
            let (_, value) = item?;
            let job: Job = serde_json::from_slice(&value)?;
            if predicate(&job) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    pub fn push_dead_letter(&self, letter: &DeadLetter) -> Result<()> {
        let key = encode_dlq_key(&letter.job_id, &letter.failed_at);
        self.dlq.insert(key, serde_json::to_vec(letter)?)?;
        debug!(job_id = %letter.job_id, code = %letter.error_code, "Dead letter recorded");
        Ok(())
    }

    pub fn dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let rtx = self.keyspace.read_tx();
        let mut letters = Vec::new();
        for item in rtx.iter(&self.dlq).take(limit) {
            let (_, value) = item?;
            letters.push(serde_json::from_slice(&value)?);
        }
        Ok(letters)
    }

    // ------------------------------------------------------------------
    // Artifacts
    // ------------------------------------------------------------------

    /// Insert an artifact unless its id is already registered.
    pub fn insert_artifact(&self, artifact: &Artifact) -> Result<ArtifactInsert> {
        let key = encode_artifact_key(&artifact.artifact_id);
        let mut tx = self.keyspace.write_tx();

        if let Some(raw) = tx.get(&self.artifacts, &key)? {
            return Ok(ArtifactInsert::Existing(serde_json::from_slice(&raw)?));
        }

        tx.insert(&self.artifacts, key, serde_json::to_vec(artifact)?);
        if let Some(job_id) = &artifact.created_by_job_id {
            tx.insert(
                &self.artifact_job,
                encode_artifact_job_key(job_id, artifact),
                Vec::<u8>::new(),
            );
        }
        tx.insert(
            &self.artifact_type,
            encode_artifact_type_key(artifact),
            Vec::<u8>::new(),
        );
        tx.commit()?;

        debug!("Inserted artifact: {}", artifact.artifact_id);
        Ok(ArtifactInsert::Inserted)
    }

    pub fn get_artifact(&self, artifact_id: &str) -> Result<Option<Artifact>> {
        match self.artifacts.get(encode_artifact_key(artifact_id))? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Artifacts created by a job, oldest first
    pub fn artifacts_for_job(&self, job_id: &str) -> Result<Vec<Artifact>> {
        let rtx = self.keyspace.read_tx();
        let mut artifacts = Vec::new();
        for item in rtx.prefix(&self.artifact_job, encode_artifact_job_prefix(job_id)) {
            let (key, _) = item?;
            let artifact_id = decode_trailing_id(&key).ok_or_else(|| corrupt("artifact_job", &key))?;
            if let Some(artifact) =
                read_json::<Artifact>(&rtx, &self.artifacts, encode_artifact_key(&artifact_id))?
            {
                artifacts.push(artifact);
            }
        }
        Ok(artifacts)
    }

    /// Artifacts of one type in a tenant/project, newest first
    pub fn artifacts_by_type(
        &self,
        tenant_id: &str,
        project_id: &str,
        artifact_type: ArtifactType,
        limit: usize,
    ) -> Result<Vec<Artifact>> {
        let prefix = encode_artifact_type_prefix(tenant_id, project_id, artifact_type.as_str());
        let rtx = self.keyspace.read_tx();
        let mut artifacts = Vec::new();
        for item in rtx.prefix(&self.artifact_type, prefix).rev().take(limit) {
            let (key, _) = item?;
            let artifact_id =
                decode_trailing_id(&key).ok_or_else(|| corrupt("artifact_type", &key))?;
            if let Some(artifact) =
                read_json::<Artifact>(&rtx, &self.artifacts, encode_artifact_key(&artifact_id))?
            {
                artifacts.push(artifact);
            }
        }
        Ok(artifacts)
    }

    pub fn artifacts_matching<P>(&self, predicate: P) -> Result<Vec<Artifact>>
    where
        P: Fn(&Artifact) -> bool,
    {
        let rtx = self.keyspace.read_tx();
        let mut artifacts = Vec::new();
        for item in rtx.iter(&self.artifacts) {
            let (_, value) = item?;
            let artifact: Artifact = serde_json::from_slice(&value)?;
            if predicate(&artifact) {
                artifacts.push(artifact);
            }
        }
        Ok(artifacts)
    }

    /// Remove an artifact row and its index entries (retention only).
    pub fn remove_artifact(&self, artifact: &Artifact) -> Result<()> {
        let mut tx = self.keyspace.write_tx();
        tx.remove(&self.artifacts, encode_artifact_key(&artifact.artifact_id));
        if let Some(job_id) = &artifact.created_by_job_id {
            tx.remove(&self.artifact_job, encode_artifact_job_key(job_id, artifact));
        }
        tx.remove(&self.artifact_type, encode_artifact_type_key(artifact));
        tx.commit()?;
        debug!("Removed artifact: {}", artifact.artifact_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Audit chain
    // ------------------------------------------------------------------

    /// Append the next event of a chain.
    ///
    /// The head read, the event insert and the head update share one write
    /// transaction, so two writers can never chain off the same predecessor.
    pub fn append_audit_event<F>(&self, chain_scope: &str, build: F) -> Result<AuditEvent>
    where
        F: FnOnce(Option<&ChainHead>) -> Result<AuditEvent>,
    {
        let mut tx = self.keyspace.write_tx();

        let head: Option<ChainHead> = match tx.get(&self.audit_heads, chain_scope.as_bytes())? {
            Some(raw) => Some(serde_json::from_slice(&raw)?),
            None => None,
        };

        let event = build(head.as_ref())?;
        let audit_key = encode_audit_key(chain_scope, event.sequence_number);
        let new_head = ChainHead {
            sequence_number: event.sequence_number,
            event_hash: event.event_hash.clone(),
        };

        tx.insert(&self.audit, audit_key.clone(), serde_json::to_vec(&event)?);
        tx.insert(
            &self.audit_index,
            encode_audit_index_key(
                &event.tenant_id,
                &event.project_id,
                &event.timestamp,
                event.sequence_number,
            ),
            audit_key,
        );
        tx.insert(
            &self.audit_heads,
            chain_scope.as_bytes(),
            serde_json::to_vec(&new_head)?,
        );
        tx.commit()?;

        debug!(chain_scope, seq = event.sequence_number, "Appended audit event");
        Ok(event)
    }

    /// Every chain scope that has at least one event
    pub fn chain_scopes(&self) -> Result<Vec<String>> {
        let rtx = self.keyspace.read_tx();
        let mut scopes = Vec::new();
        for item in rtx.iter(&self.audit_heads) {
            let (key, _) = item?;
            scopes.push(String::from_utf8_lossy(&key).to_string());
        }
        Ok(scopes)
    }

    /// Events of one chain in ascending sequence order, with the chain head
    /// read from the same snapshot.
    pub fn chain_snapshot(&self, chain_scope: &str) -> Result<(Vec<AuditEvent>, Option<ChainHead>)> {
        let rtx = self.keyspace.read_tx();
        let mut events = Vec::new();
        for item in rtx.prefix(&self.audit, encode_audit_prefix(chain_scope)) {
            let (_, value) = item?;
            events.push(serde_json::from_slice(&value)?);
        }
        let head = read_json::<ChainHead>(&rtx, &self.audit_heads, chain_scope.as_bytes())?;
        Ok((events, head))
    }

    /// Events of one tenant/project, newest first.
    ///
    /// Only the `{tenant}:{project}:` index range is scanned.
    pub fn recent_audit_events<P>(
        &self,
        tenant_id: &str,
        project_id: &str,
        predicate: P,
        limit: usize,
    ) -> Result<Vec<AuditEvent>>
    where
        P: Fn(&AuditEvent) -> bool,
    {
        let rtx = self.keyspace.read_tx();
        let mut events = Vec::new();
        for item in rtx
            .prefix(&self.audit_index, encode_audit_index_prefix(tenant_id, project_id))
            .rev()
        {
            if events.len() >= limit {
                break;
            }
            let (_, audit_key) = item?;
            let Some(event) = read_json::<AuditEvent>(&rtx, &self.audit, audit_key)? else {
                continue;
            };
            if predicate(&event) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Overwrite a stored audit row without touching the chain, simulating
    /// tampering at the storage layer.
    #[cfg(test)]
    pub(crate) fn overwrite_audit_event(&self, event: &AuditEvent) -> Result<()> {
        let key = encode_audit_key(&event.chain_scope, event.sequence_number);
        self.audit.insert(key, serde_json::to_vec(event)?)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn delete_audit_event(&self, chain_scope: &str, sequence_number: u64) -> Result<()> {
        self.audit.remove(encode_audit_key(chain_scope, sequence_number))?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inline blobs (database storage backend)
    // ------------------------------------------------------------------

    pub fn put_blob(&self, pointer: &str, data: &[u8]) -> Result<()> {
        self.blobs.insert(pointer.as_bytes(), data)?;
        Ok(())
    }

    pub fn get_blob(&self, pointer: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(pointer.as_bytes())?.map(|value| value.to_vec()))
    }

    pub fn delete_blob(&self, pointer: &str) -> Result<()> {
        self.blobs.remove(pointer.as_bytes())?;
        Ok(())
    }

    pub fn blob_exists(&self, pointer: &str) -> Result<bool> {
        Ok(self.blobs.contains_key(pointer.as_bytes())?)
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Persist all pending writes to disk
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    /// Row counts per partition (for debugging/monitoring)
    pub fn stats(&self) -> Result<StoreStats> {
        let rtx = self.keyspace.read_tx();
        Ok(StoreStats {
            job_count: count(&rtx, &self.jobs)?,
            artifact_count: count(&rtx, &self.artifacts)?,
            audit_event_count: count(&rtx, &self.audit)?,
            chain_count: count(&rtx, &self.audit_heads)?,
            dead_letter_count: count(&rtx, &self.dlq)?,
            blob_count: count(&rtx, &self.blobs)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub job_count: usize,
    pub artifact_count: usize,
    pub audit_event_count: usize,
    pub chain_count: usize,
    pub dead_letter_count: usize,
    pub blob_count: usize,
}

fn count(rtx: &ReadTransaction, partition: &TransactionalPartitionHandle) -> Result<usize> {
    let mut n = 0;
    for item in rtx.iter(partition) {
        item?;
        n += 1;
    }
    Ok(n)
}

fn read_json<T: DeserializeOwned>(
    rtx: &ReadTransaction,
    partition: &TransactionalPartitionHandle,
    key: impl AsRef<[u8]>,
) -> Result<Option<T>> {
    match rtx.get(partition, key)? {
        Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
        None => Ok(None),
    }
}

fn corrupt(partition: &'static str, key: &[u8]) -> StoreError {
    StoreError::CorruptIndex {
        partition,
        key: String::from_utf8_lossy(key).to_string(),
    }
}
