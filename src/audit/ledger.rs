use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{LedgerError, Result};
use crate::observability::Metrics;
use crate::store::{LedgerStore, StoreError};
use crate::validation::{ValidationError, validate_resource_id, validate_scope_id};

use super::chain::{self, ChainScope};
use super::models::{AuditEvent, AuditMetadata, AuditQuery, ChainVerification, NewAuditEvent};

/// Metadata keys accepted when no allowlist is configured. Values under these
/// keys are identifiers, counts and codes, never document content.
pub const DEFAULT_METADATA_ALLOWLIST: &[&str] = &[
    "artifact_id",
    "artifact_type",
    "byte_size",
    "content_type",
    "decision",
    "entity_count",
    "entity_types",
    "error_code",
    "error_debug_id",
    "job_id",
    "job_type",
    "report_id",
    "request_id",
    "status",
];

/// Chain partitioning and metadata policy for an [`AuditLedger`].
#[derive(Debug, Clone)]
pub struct AuditPolicy {
    pub chain_scope: ChainScope,
    pub metadata_allowlist: BTreeSet<String>,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self {
            chain_scope: ChainScope::default(),
            metadata_allowlist: DEFAULT_METADATA_ALLOWLIST
                .iter()
                .map(|key| key.to_string())
                .collect(),
        }
    }
}

/// Append-only, hash-chained audit log.
#[derive(Clone)]
pub struct AuditLedger {
    store: Arc<LedgerStore>,
    policy: AuditPolicy,
    metrics: Arc<Metrics>,
}

impl AuditLedger {
    pub fn new(store: Arc<LedgerStore>, policy: AuditPolicy, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            policy,
            metrics,
        }
    }

    /// Append an event to its chain.
    ///
    /// Metadata keys outside the allowlist are dropped before hashing; the
    /// caller is not told, the drop is logged and counted instead.
    pub fn log(&self, new: NewAuditEvent) -> Result<AuditEvent> {
        validate_scope_id("tenant_id", &new.tenant_id)?;
        validate_scope_id("project_id", &new.project_id)?;
        if let Some(resource_id) = &new.resource_id {
            validate_resource_id(resource_id)?;
        }

        let metadata = self.filter_metadata(&new);
        let chain_scope = self.policy.chain_scope.key(&new.tenant_id, &new.project_id);

        let event = self
            .store
            .append_audit_event(&chain_scope, |head| {
                // Read under the writer lock so timestamps never run backwards
                // along a chain. Truncated to the microsecond canonical form.
                let timestamp = Utc::now().trunc_subsecs(6);
                let previous_hash = head.map(|h| h.event_hash.clone());
                let mut event = AuditEvent {
                    id: Uuid::new_v4().to_string(),
                    sequence_number: head.map_or(1, |h| h.sequence_number + 1),
                    chain_scope: chain_scope.clone(),
                    event_type: new.event_type,
                    description: new.description,
                    tenant_id: new.tenant_id,
                    project_id: new.project_id,
                    user_id: new.user_id,
                    user_ip: new.user_ip,
                    resource_type: new.resource_type,
                    resource_id: new.resource_id,
                    timestamp,
                    metadata,
                    previous_hash,
                    event_hash: String::new(),
                };
                event.event_hash = chain::expected_hash(&event, event.previous_hash.as_deref())?;
                Ok(event)
            })
            .inspect_err(|e| error!(chain_scope = %chain_scope, error = %e, "Audit append failed"))?;

        self.metrics.audit_event_appended();
        info!(
            event_id = %event.id,
            chain_scope = %event.chain_scope,
            seq = event.sequence_number,
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            "Audit event appended"
        );
        Ok(event)
    }

    fn filter_metadata(&self, new: &NewAuditEvent) -> AuditMetadata {
        let (kept, dropped): (AuditMetadata, AuditMetadata) = new
            .metadata
            .clone()
            .into_iter()
            .partition(|(key, _)| self.policy.metadata_allowlist.contains(key));

        if !dropped.is_empty() {
            let keys: Vec<&str> = dropped.keys().map(String::as_str).collect();
            warn!(
                tenant_id = %new.tenant_id,
                event_type = %new.event_type,
                dropped_keys = ?keys,
                "Audit metadata keys outside allowlist dropped"
            );
            self.metrics.audit_metadata_dropped(keys.len() as u64);
        }
        kept
    }

    /// Events for one tenant/project, newest first.
    pub fn query_events(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        validate_scope_id("tenant_id", &query.tenant_id)?;
        validate_scope_id("project_id", &query.project_id)?;
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let events = self.store.recent_audit_events(
            &query.tenant_id,
            &query.project_id,
            |event| query.matches(event),
            query.limit,
        )?;
        debug!(
            tenant_id = %query.tenant_id,
            project_id = %query.project_id,
            count = events.len(),
            "Audit query"
        );
        Ok(events)
    }

    /// Recompute every hash of the chain(s) covering the given scope.
    ///
    /// Without a tenant every chain is verified. With the `global` chain scope
    /// any tenant maps onto the single global chain.
    pub fn verify_chain_integrity(
        &self,
        tenant_id: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<ChainVerification> {
        let scopes = self.scopes_for(tenant_id, project_id)?;

        let mut report = ChainVerification {
            is_valid: true,
            events_checked: 0,
            violations: Vec::new(),
        };
        for scope in &scopes {
            self.verify_scope(scope, &mut report)?;
        }
        report.is_valid = report.violations.is_empty();

        if report.is_valid {
            info!(chains = scopes.len(), events = report.events_checked, "Audit chain verified");
        } else {
            error!(
                chains = scopes.len(),
                events = report.events_checked,
                violations = report.violations.len(),
                "Audit chain verification failed"
            );
        }
        Ok(report)
    }

    fn scopes_for(&self, tenant_id: Option<&str>, project_id: Option<&str>) -> Result<Vec<String>> {
        let Some(tenant_id) = tenant_id else {
            if project_id.is_some() {
                return Err(ValidationError::Empty { field: "tenant_id" }.into());
            }
            return Ok(self.store.chain_scopes()?);
        };
        validate_scope_id("tenant_id", tenant_id)?;

        let scope = self.policy.chain_scope;
        match (scope, project_id) {
            (ChainScope::TenantProject, None) => {
                let prefix = format!("tp:{tenant_id}/");
                Ok(self
                    .store
                    .chain_scopes()?
                    .into_iter()
                    .filter(|s| s.starts_with(&prefix))
                    .collect())
            }
            (_, project_id) => {
                if let Some(project_id) = project_id {
                    validate_scope_id("project_id", project_id)?;
                }
                Ok(vec![scope.key(tenant_id, project_id.unwrap_or_default())])
            }
        }
    }

    fn verify_scope(&self, scope: &str, report: &mut ChainVerification) -> Result<()> {
        let (events, head) = self.store.chain_snapshot(scope)?;

        // Recomputed hash of the predecessor, so one bad row taints the rest.
        let mut carried: Option<String> = None;
        let mut stored_previous: Option<String> = None;
        let mut expected_seq = 1;

        for event in &events {
            let seq = event.sequence_number;
            if seq != expected_seq {
                report.violations.push(format!(
                    "chain={scope} seq={seq}: sequence gap, expected {expected_seq}"
                ));
            }
            if event.previous_hash != stored_previous {
                report.violations.push(format!(
                    "chain={scope} seq={seq}: previous_hash does not match predecessor"
                ));
            }

            let recomputed = chain::expected_hash(event, carried.as_deref()).map_err(StoreError::from)?;
            if recomputed != event.event_hash {
                report
                    .violations
                    .push(format!("chain={scope} seq={seq}: event_hash mismatch"));
            }

            carried = Some(recomputed);
            stored_previous = Some(event.event_hash.clone());
            expected_seq = seq + 1;
            report.events_checked += 1;
        }

        match (head, events.last()) {
            (Some(head), Some(last)) => {
                if head.sequence_number != last.sequence_number || head.event_hash != last.event_hash {
                    report.violations.push(format!(
                        "chain={scope}: head at seq={} does not match last stored event seq={}",
                        head.sequence_number, last.sequence_number
                    ));
                }
            }
            (Some(head), None) => report.violations.push(format!(
                "chain={scope}: head at seq={} but no events stored",
                head.sequence_number
            )),
            (None, Some(_)) => report
                .violations
                .push(format!("chain={scope}: events stored without a chain head")),
            (None, None) => {}
        }

        Ok(())
    }
}

impl ChainVerification {
    /// Turn a failed verification into an [`LedgerError::Integrity`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(LedgerError::Integrity(format!(
                "{} violation(s), first: {}",
                self.violations.len(),
                self.violations.first().map(String::as_str).unwrap_or_default()
            )))
        }
    }
}
