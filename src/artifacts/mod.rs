//! Artifact registry: immutable records of every input and output
//!
//! The registry stores and indexes opaque storage pointers; it never reads
//! the bytes behind them. Raw uploads age out through [`prune_raw_uploads`].

mod models;
mod registry;
mod retention;

pub use models::{Artifact, ArtifactType, NewArtifact, StorageBackend};
pub use registry::ArtifactRegistry;
pub use retention::{PruneStats, prune_raw_uploads};
