//! Host-side generation of the guest-side bootstrap snippets.
//!
//! The guest interpreter is opaque; these functions only decide *what* it is
//! told to run at each lifecycle step. The entry script is deliberately
//! minimal: its single job is to ask the host whether a snapshot exists, so
//! the expensive setup work can be skipped on a warm start.

use crate::config::BridgeConfig;

/// Marker embedded in the snapshot-dump push so the guest can recognize it
/// without a dedicated message kind.
pub const SNAPSHOT_DUMP_MARKER: &str = "__dump_snapshot__";

/// Minimal script the sandbox is launched with. Attaches the bus listener
/// and posts `snapshot-query`; everything else arrives over the bus.
pub fn entry_script(config: &BridgeConfig) -> String {
    format!(
        "import bridge\n\
         bridge.configure(appearance='{appearance}')\n\
         bridge.attach_bus_listener()\n\
         bridge.post('snapshot-query')\n",
        appearance = config.appearance.as_str()
    )
}

/// Full cold-start setup: install packages, register the interaction hooks,
/// signal ready. Sent when the snapshot query misses.
pub fn cold_bootstrap_code(config: &BridgeConfig) -> String {
    format!(
        "import bridge\n\
         bridge.install_runtime_packages()\n\
         bridge.register_interaction_hooks()\n\
         bridge.apply_appearance('{appearance}')\n\
         bridge.attach_bus_listener()\n\
         bridge.post('ready')\n",
        appearance = config.appearance.as_str()
    )
}

/// Runs immediately after a snapshot restore. Bus handles do not survive
/// serialization, so the listener must be re-attached before `ready`.
pub fn post_load_code(config: &BridgeConfig) -> String {
    format!(
        "import bridge\n\
         bridge.apply_appearance('{appearance}')\n\
         bridge.attach_bus_listener()\n\
         bridge.post('ready')\n",
        appearance = config.appearance.as_str()
    )
}

/// Asks the guest to serialize its warm state and post `save-snapshot`.
pub fn snapshot_dump_code() -> String {
    format!(
        "import bridge  # {SNAPSHOT_DUMP_MARKER}\n\
         bridge.post_snapshot(bridge.dump_state())\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Appearance;

    #[test]
    fn entry_script_queries_for_a_snapshot() {
        let code = entry_script(&BridgeConfig::default());
        assert!(code.contains("snapshot-query"));
        assert!(code.contains("appearance='light'"));
    }

    #[test]
    fn appearance_is_threaded_through_every_snippet() {
        let config = BridgeConfig {
            appearance: Appearance::Dark,
            ..BridgeConfig::default()
        };
        assert!(entry_script(&config).contains("dark"));
        assert!(cold_bootstrap_code(&config).contains("dark"));
        assert!(post_load_code(&config).contains("dark"));
    }

    #[test]
    fn post_load_reattaches_the_listener_before_ready() {
        let code = post_load_code(&BridgeConfig::default());
        let listener = code.find("attach_bus_listener").expect("listener");
        let ready = code.find("'ready'").expect("ready");
        assert!(listener < ready);
    }

    #[test]
    fn dump_code_carries_the_marker() {
        assert!(snapshot_dump_code().contains(SNAPSHOT_DUMP_MARKER));
    }
}
