use bridge_store::SnapshotKey;
use std::time::Duration;

/// Visual appearance baked into the guest bootstrap. Changing it requires a
/// rebuild of the sandbox session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appearance {
    Light,
    Dark,
}

impl Appearance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Appearance::Light => "light",
            Appearance::Dark => "dark",
        }
    }
}

/// Configuration for one bridge session.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub appearance: Appearance,
    /// Revision of the generated bootstrap scripts. Snapshots taken under a
    /// different revision are invalidated on query.
    pub bootstrap_revision: String,
    /// How long to wait for `ready` before surfacing a loading error. The
    /// session stays alive past the deadline in case a late `ready` arrives.
    pub ready_timeout: Duration,
    pub bus_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            appearance: Appearance::Light,
            bootstrap_revision: "r1".into(),
            ready_timeout: Duration::from_secs(15),
            bus_capacity: 64,
        }
    }
}

impl BridgeConfig {
    /// Version stamp stored inside snapshots produced under this config.
    pub fn snapshot_version(&self) -> String {
        self.bootstrap_revision.clone()
    }

    /// Store key for this configuration's snapshot slot. Appearance is part
    /// of the key: a dark-theme snapshot is not reused for a light session.
    pub fn snapshot_key(&self) -> SnapshotKey {
        SnapshotKey::for_config(&format!(
            "appearance={};revision={}",
            self.appearance.as_str(),
            self.bootstrap_revision
        ))
    }
}
