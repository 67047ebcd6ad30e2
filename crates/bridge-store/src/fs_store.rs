use crate::{SnapshotKey, SnapshotStore, StoreResult, io_error};
use bridge_protocol::Snapshot;
use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

/// Filesystem-backed store keeping one CBOR file per key under
/// `<root>/.snapshots`.
///
/// Writes go to a temp file first and are renamed into place, so a reader
/// never observes a partially written snapshot. A file that fails to decode
/// is treated as absent and removed.
#[derive(Clone)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl fmt::Debug for FsSnapshotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsSnapshotStore")
            .field("dir", &self.dir)
            .finish()
    }
}

impl FsSnapshotStore {
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = root.as_ref().join(".snapshots");
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir })
    }

    fn entry_path(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(format!("{}.snapshot", key.as_str()))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
        let tmp = path.with_extension("snapshot.tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)
                .map_err(|e| io_error(&tmp, e))?;
            file.write_all(bytes).map_err(|e| io_error(&tmp, e))?;
            file.sync_all().map_err(|e| io_error(&tmp, e))?;
        }
        fs::rename(&tmp, path).map_err(|e| io_error(path, e))
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn get(&self, key: &SnapshotKey) -> StoreResult<Option<Snapshot>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(path, err)),
        };
        match serde_cbor::from_slice(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "discarding undecodable snapshot");
                let _ = fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &SnapshotKey, snapshot: &Snapshot) -> StoreResult<()> {
        let bytes = serde_cbor::to_vec(snapshot)?;
        Self::write_atomic(&self.entry_path(key), &bytes)
    }

    fn invalidate(&self, key: &SnapshotKey) -> StoreResult<()> {
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(path, err)),
        }
    }
}
