/// fjall-based persistence for jobs, artifacts, the audit chain and the DLQ
///
/// One transactional keyspace holds every partition (see [`keys`] for the
/// layout). fjall's single-writer transactions serialize all writers, which is
/// what gives the idempotency index its uniqueness and lets the audit ledger
/// read the chain head and append the next event atomically.
///
/// ## Usage
///
/// ```rust,ignore
/// use workledger::store::LedgerStore;
///
/// let store = LedgerStore::open("data/ledger")?;
/// let job = store.get_job("0192...")?;
/// ```
pub mod error;
pub mod fjall_store;
pub mod keys;

pub use error::{Result, StoreError};
pub use fjall_store::{ArtifactInsert, JobInsert, LedgerStore, StoreStats};
