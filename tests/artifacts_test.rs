use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;

use workledger::artifacts::{ArtifactType, NewArtifact, StorageBackend, prune_raw_uploads};
use workledger::config::{ByteSize, Config, StorageProvider};
use workledger::idempotency::content_hash;
use workledger::storage::StorageError;
use workledger::{LedgerError, Services};

fn database_services(temp_dir: &TempDir, max_inline: u64) -> Services {
    let mut config = Config::default();
    config.ledger.path = temp_dir.path().join("ledger");
    config.storage.provider = StorageProvider::Database;
    config.storage.max_inline_bytes = ByteSize(max_inline);
    Services::open(&config).expect("Failed to open services")
}

#[tokio::test]
async fn inline_blobs_share_the_ledger() {
    let temp_dir = TempDir::new().unwrap();
    let services = database_services(&temp_dir, 1024);
    assert_eq!(services.blobs.backend(), StorageBackend::Database);

    let content = Bytes::from_static(b"speaker 1: hello");
    let pointer = services
        .layout
        .pointer("acme", "calls", "raw/call-1.txt")
        .unwrap();
    services.blobs.put(&pointer, content.clone()).await.unwrap();

    let artifact_id = services
        .artifacts
        .register(
            NewArtifact::new(
                "acme",
                "calls",
                ArtifactType::RawUpload,
                StorageBackend::Database,
                &pointer,
            )
            .with_content("text/plain", content.len() as u64)
            .with_sha256(content_hash(&content)),
        )
        .unwrap();

    let artifact = services.artifacts.get_by_id(&artifact_id).unwrap();
    assert_eq!(services.blobs.get(&artifact.storage_pointer).await.unwrap(), content);
    assert_eq!(services.store.stats().unwrap().blob_count, 1);

    let too_big = services
        .blobs
        .put(&pointer, Bytes::from(vec![0u8; 2048]))
        .await
        .unwrap_err();
    assert!(matches!(too_big, StorageError::TooLarge { size: 2048, max: 1024 }));

    let stats = prune_raw_uploads(&services.artifacts, services.blobs.as_ref(), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(stats.pruned, 1);
    assert!(!services.blobs.exists(&pointer).await.unwrap());
    assert!(matches!(
        services.artifacts.get_by_id(&artifact_id),
        Err(LedgerError::NotFound(_))
    ));
}

#[tokio::test]
async fn registered_artifacts_stay_immutable_across_restarts() {
    let temp_dir = TempDir::new().unwrap();
    let sha = content_hash(b"report v1");

    let register = |services: &Services, pointer: &str| {
        services.artifacts.register(
            NewArtifact::new(
                "acme",
                "claims",
                ArtifactType::ComplianceReport,
                StorageBackend::Database,
                pointer,
            )
            .with_id("report-1")
            .with_sha256(&sha)
            .with_schema_version("2"),
        )
    };

    {
        let services = database_services(&temp_dir, 1024);
        assert_eq!(register(&services, "workledger/reports/1.json").unwrap(), "report-1");
        services.store.persist().unwrap();
    }

    let services = database_services(&temp_dir, 1024);
    assert_eq!(register(&services, "workledger/reports/1.json").unwrap(), "report-1");

    let err = register(&services, "workledger/reports/2.json").unwrap_err();
    assert!(matches!(
        err,
        LedgerError::ImmutabilityViolation {
            field: "storage_pointer",
            ..
        }
    ));

    let reports = services
        .artifacts
        .get_by_type("acme", "claims", ArtifactType::ComplianceReport, 10)
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].schema_version.as_deref(), Some("2"));
    assert!(
        services
            .artifacts
            .get_by_type("globex", "claims", ArtifactType::ComplianceReport, 10)
            .unwrap()
            .is_empty()
    );
}
