//! Snapshot persistence abstractions plus filesystem and in-memory backends.
//!
//! One serialized runtime-state blob per bridge configuration, keyed by a
//! fingerprint of that configuration. The bootstrap sequencer is the only
//! writer; put is atomic from the reader's point of view.

mod fs_store;
mod mem_store;

pub use fs_store::FsSnapshotStore;
pub use mem_store::MemSnapshotStore;

use bridge_protocol::Snapshot;
use sha2::{Digest, Sha256};
use std::{fmt, io, path::PathBuf, sync::Arc};

pub type StoreResult<T> = Result<T, StoreError>;
pub type DynSnapshotStore = Arc<dyn SnapshotStore>;

/// Key/value persistence for one snapshot per bridge configuration.
pub trait SnapshotStore: Send + Sync {
    fn get(&self, key: &SnapshotKey) -> StoreResult<Option<Snapshot>>;
    fn put(&self, key: &SnapshotKey, snapshot: &Snapshot) -> StoreResult<()>;
    fn invalidate(&self, key: &SnapshotKey) -> StoreResult<()>;
}

/// Identifies the snapshot slot for one bootstrap configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey(String);

impl SnapshotKey {
    /// Fingerprint an arbitrary configuration descriptor into a stable key.
    pub fn for_config(descriptor: &str) -> Self {
        let digest = Sha256::digest(descriptor.as_bytes());
        Self(format!("cfg-{}", hex::encode(digest)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SnapshotKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("CBOR serialization error: {0}")]
    Cbor(#[from] serde_cbor::Error),
}

pub(crate) fn io_error(path: impl Into<PathBuf>, err: io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source: err,
    }
}
