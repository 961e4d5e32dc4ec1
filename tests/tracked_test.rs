//! End-to-end runs of tracked work against an isolated ledger.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use tempfile::TempDir;

use workledger::{LedgerError, Services};
use workledger::artifacts::ArtifactType;
use workledger::audit::{AuditEventType, AuditQuery};
use workledger::config::Config;
use workledger::jobs::{
    INVALID_RESULT_CODE, JobStatus, JobType, NewJob, TrackedJob, TrackedOutcome, WorkError,
    WorkOutput, run_tracked,
};

/// Builds services on a temp ledger with in-memory blobs
fn build_test_services() -> (Services, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_toml = format!(
        r#"
[ledger]
path = '{}'

[storage]
provider = "memory"
bucket = "test-bucket"
prefix = "artifacts"

[audit]
chain_scope = "tenant"
        "#,
        temp_dir.path().join("ledger").display()
    );
    let config: Config = toml::from_str(&config_toml).expect("Failed to parse test config");
    let services = Services::open(&config).expect("Failed to open services");
    (services, temp_dir)
}

fn upload_request() -> TrackedJob {
    TrackedJob::new("acme", "claims", JobType::IngestionDocument, "req-42")
        .with_content(b"%PDF-1.7 scanned claim form")
        .with_param("ocr", "true")
}

fn event_types(services: &Services) -> Vec<AuditEventType> {
    let mut events = services
        .audit
        .query_events(&AuditQuery::new("acme", "claims"))
        .unwrap();
    events.reverse();
    events.into_iter().map(|e| e.event_type).collect()
}

#[tokio::test]
async fn successful_work_is_recorded() {
    let (services, _temp) = build_test_services();

    let outcome = run_tracked(&services, upload_request(), |ctx| async move {
        ctx.report_progress(50).await?;
        let artifact_id = ctx
            .write_artifact(
                ArtifactType::IngestionResult,
                "result.json",
                "application/json",
                Bytes::from_static(b"{\"pages\":3}"),
            )
            .await?;
        Ok::<_, WorkError>(WorkOutput::new(vec![artifact_id]))
    })
    .await
    .unwrap();

    let TrackedOutcome::Completed {
        job_id,
        result_artifact_ids,
    } = outcome
    else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(result_artifact_ids.len(), 1);

    let job = services.jobs.get_status(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.result_artifact_ids, result_artifact_ids);

    let artifact = services.artifacts.get_by_id(&result_artifact_ids[0]).unwrap();
    assert_eq!(artifact.created_by_job_id.as_deref(), Some(job_id.as_str()));
    assert_eq!(
        artifact.storage_pointer,
        format!("test-bucket/artifacts/acme/claims/{job_id}/result.json")
    );
    assert_eq!(artifact.byte_size, Some(11));
    let stored = services.blobs.get(&artifact.storage_pointer).await.unwrap();
    assert_eq!(stored, Bytes::from_static(b"{\"pages\":3}"));

    assert_eq!(
        event_types(&services),
        vec![
            AuditEventType::JobCreated,
            AuditEventType::JobStarted,
            AuditEventType::ArtifactRegistered,
            AuditEventType::JobCompleted,
        ]
    );
    let report = services
        .audit
        .verify_chain_integrity(Some("acme"), None)
        .unwrap();
    assert!(report.is_valid, "{:?}", report.violations);
}

#[tokio::test]
async fn identical_work_is_skipped() {
    let (services, _temp) = build_test_services();
    let calls = AtomicUsize::new(0);

    let first = run_tracked(&services, upload_request(), |_ctx| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, WorkError>(WorkOutput::new(vec!["art-9".to_string()]))
    })
    .await
    .unwrap();

    let second = run_tracked(&services, upload_request(), |_ctx| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, WorkError>(WorkOutput::default())
    })
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        second,
        TrackedOutcome::Skipped {
            job_id: first.job_id().to_string(),
            result_artifact_ids: vec!["art-9".to_string()],
        }
    );
    assert_eq!(services.metrics.snapshot().jobs_skipped, 1);

    // a different parameter is different work
    let other = run_tracked(
        &services,
        upload_request().with_param("ocr", "false"),
        |_ctx| async { Ok::<_, WorkError>(WorkOutput::default()) },
    )
    .await
    .unwrap();
    assert!(matches!(other, TrackedOutcome::Completed { .. }));
    assert_ne!(other.job_id(), first.job_id());
}

#[tokio::test]
async fn in_flight_work_is_not_started_twice() {
    let (services, _temp) = build_test_services();

    let key = upload_request().idempotency_key().unwrap();
    let holder = services
        .jobs
        .create_job(
            NewJob::new("acme", "claims", JobType::IngestionDocument, "req-41")
                .with_idempotency_key(key),
        )
        .unwrap();
    services.jobs.start_processing(&holder.job_id).unwrap();

    let calls = AtomicUsize::new(0);
    let outcome = run_tracked(&services, upload_request(), |_ctx| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok::<_, WorkError>(WorkOutput::default())
    })
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(
        outcome,
        TrackedOutcome::InFlight {
            job_id: holder.job_id,
            status: JobStatus::Processing,
        }
    );
}

#[tokio::test]
async fn failed_work_is_dead_lettered_and_retryable() {
    let (services, _temp) = build_test_services();

    let outcome = run_tracked(&services, upload_request(), |_ctx| async {
        Err::<WorkOutput, _>(WorkError::new("ocr-timeout", "OCR engine did not answer in time"))
    })
    .await
    .unwrap();

    let TrackedOutcome::Failed {
        job_id,
        error_code,
        error_debug_id,
    } = outcome
    else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(error_code, "OCR_TIMEOUT");
    assert!(error_debug_id.is_some());

    let job = services.jobs.get_status(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_code.as_deref(), Some("OCR_TIMEOUT"));

    let letters = services.jobs.dead_letters(10).unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].job_id, job_id);
    assert_eq!(letters[0].attempts, 1);

    let failed_events = services
        .audit
        .query_events(&AuditQuery::new("acme", "claims").event_type(AuditEventType::JobFailed))
        .unwrap();
    assert_eq!(failed_events.len(), 1);
    assert_eq!(
        failed_events[0].metadata.get("error_code"),
        Some(&serde_json::json!("OCR_TIMEOUT"))
    );

    let retry = run_tracked(&services, upload_request(), |_ctx| async {
        Ok::<_, WorkError>(WorkOutput::default())
    })
    .await
    .unwrap();
    assert!(matches!(retry, TrackedOutcome::Completed { .. }));
    assert_ne!(retry.job_id(), job_id);
}

#[tokio::test]
async fn ledger_errors_inside_work_fail_the_job() {
    let (services, _temp) = build_test_services();

    let outcome = run_tracked(&services, upload_request(), |ctx| async move {
        ctx.report_progress(150).await?;
        Ok::<_, WorkError>(WorkOutput::default())
    })
    .await
    .unwrap();

    assert!(matches!(
        outcome,
        TrackedOutcome::Failed { ref error_code, .. } if error_code == "VALIDATION_ERROR"
    ));
}

#[tokio::test]
async fn invalid_result_ids_fail_before_completion_is_audited() {
    let (services, _temp) = build_test_services();

    let outcome = run_tracked(&services, upload_request(), |_ctx| async {
        Ok::<_, WorkError>(WorkOutput::new(vec!["bad id/with slash".to_string()]))
    })
    .await
    .unwrap();

    let TrackedOutcome::Failed {
        job_id, error_code, ..
    } = outcome
    else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(error_code, INVALID_RESULT_CODE);

    let job = services.jobs.get_status(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.result_artifact_ids.is_empty());
    assert_eq!(services.jobs.dead_letters(10).unwrap().len(), 1);

    assert_eq!(
        event_types(&services),
        vec![
            AuditEventType::JobCreated,
            AuditEventType::JobStarted,
            AuditEventType::JobFailed,
        ]
    );
}

#[tokio::test]
async fn job_failed_during_work_is_not_left_completed_in_the_trail() {
    let (services, _temp) = build_test_services();

    let result = run_tracked(&services, upload_request(), |ctx| {
        let jobs = services.jobs.clone();
        async move {
            jobs.fail_job(ctx.job_id(), "OPERATOR_CANCELLED", "cancelled", None)
                .unwrap();
            Ok::<_, WorkError>(WorkOutput::default())
        }
    })
    .await;

    assert!(matches!(
        result,
        Err(LedgerError::InvalidTransition {
            from: JobStatus::Failed,
            to: JobStatus::Completed,
            ..
        })
    ));

    let jobs = services
        .jobs
        .list_by_tenant_project("acme", "claims", None, 10)
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Failed);
    assert_eq!(jobs[0].error_code.as_deref(), Some("OPERATOR_CANCELLED"));

    let events = event_types(&services);
    assert_eq!(events.last(), Some(&AuditEventType::JobFailed));
    let failed = services
        .audit
        .query_events(&AuditQuery::new("acme", "claims").event_type(AuditEventType::JobFailed))
        .unwrap();
    assert_eq!(
        failed[0].metadata.get("error_code"),
        Some(&serde_json::json!("OPERATOR_CANCELLED"))
    );
}
