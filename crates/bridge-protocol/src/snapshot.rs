use serde::{Deserialize, Serialize};

/// Serialized capture of guest-runtime state enabling fast warm-start.
///
/// Created once per distinct bootstrap configuration after a successful cold
/// bootstrap; discarded whenever a restore attempt fails. The blob is opaque
/// to the host. `post_load_code` runs inside the guest immediately after the
/// blob is restored to rehydrate transient bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(with = "serde_bytes")]
    pub blob: Vec<u8>,
    pub post_load_code: String,
    /// Format/bootstrap revision the blob was produced under. A stored
    /// snapshot whose version no longer matches the running bridge is
    /// treated as absent and invalidated.
    pub version: String,
    pub created_at_ms: u64,
}

impl Snapshot {
    pub fn new(blob: Vec<u8>, post_load_code: impl Into<String>, version: impl Into<String>) -> Self {
        let created_at_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            blob,
            post_load_code: post_load_code.into(),
            version: version.into(),
            created_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_as_cbor() {
        let snapshot = Snapshot::new(vec![0xde, 0xad, 0xbe, 0xef], "attach()", "rev-3");
        let bytes = serde_cbor::to_vec(&snapshot).expect("encode");
        let decoded: Snapshot = serde_cbor::from_slice(&bytes).expect("decode");
        assert_eq!(snapshot, decoded);
    }
}
