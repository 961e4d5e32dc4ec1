pub mod artifacts;
pub mod audit;
pub mod config;
pub mod error;
pub mod humanize;
pub mod idempotency;
pub mod jobs;
pub mod observability;
pub mod state;
pub mod storage;
pub mod store;
pub mod validation;

pub use error::{LedgerError, Result};
pub use state::Services;
