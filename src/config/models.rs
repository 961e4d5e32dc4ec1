use crate::audit::{AuditPolicy, ChainScope, DEFAULT_METADATA_ALLOWLIST};
use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Embedded store location
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Blob storage provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    /// In-process object store; contents vanish on exit.
    Memory,
    S3,
    /// Files under `storage.root`.
    #[default]
    Local,
    /// Inline in the ledger's own keyspace.
    Database,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// S3 access key (loaded from environment, not from config file)
    #[serde(skip)]
    pub access_key: Option<String>,
    /// S3 secret key (loaded from environment, not from config file)
    #[serde(skip)]
    pub secret_key: Option<String>,
    /// Upper bound for blobs kept by the database provider.
    #[serde(default = "default_max_inline_bytes")]
    pub max_inline_bytes: ByteSize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::default(),
            bucket: default_bucket(),
            prefix: default_prefix(),
            root: default_root(),
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
            max_inline_bytes: default_max_inline_bytes(),
        }
    }
}

fn default_bucket() -> String {
    "workledger".to_string()
}

fn default_prefix() -> String {
    "artifacts".to_string()
}

fn default_root() -> PathBuf {
    PathBuf::from("data/blobs")
}

fn default_max_inline_bytes() -> ByteSize {
    ByteSize::mib(1)
}

/// Audit chain configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub chain_scope: ChainScope,
    #[serde(default = "default_metadata_allowlist")]
    pub metadata_allowlist: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            chain_scope: ChainScope::default(),
            metadata_allowlist: default_metadata_allowlist(),
        }
    }
}

impl AuditConfig {
    pub fn policy(&self) -> AuditPolicy {
        AuditPolicy {
            chain_scope: self.chain_scope,
            metadata_allowlist: self.metadata_allowlist.iter().cloned().collect(),
        }
    }
}

fn default_metadata_allowlist() -> Vec<String> {
    DEFAULT_METADATA_ALLOWLIST
        .iter()
        .map(|key| key.to_string())
        .collect()
}

/// Retention configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_raw_upload_ttl_days")]
    pub raw_upload_ttl_days: u32,
    #[serde(default = "default_stale_job_timeout_secs")]
    pub stale_job_timeout_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            raw_upload_ttl_days: default_raw_upload_ttl_days(),
            stale_job_timeout_secs: default_stale_job_timeout_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn raw_upload_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.raw_upload_ttl_days) * 86_400)
    }

    pub fn stale_job_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_job_timeout_secs)
    }
}

fn default_raw_upload_ttl_days() -> u32 {
    30
}

fn default_stale_job_timeout_secs() -> u64 {
    3600
}

/// Tokio runtime sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Bound on the blocking pool that runs ledger transactions.
    #[serde(default = "default_blocking_threads")]
    pub blocking_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            blocking_threads: default_blocking_threads(),
        }
    }
}

fn default_blocking_threads() -> usize {
    16
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info,fjall=warn".to_string()
}
