//! Scripted guest runtime for tests.
//!
//! [`ScriptedGuest`] stands in for the real sandboxed interpreter: it
//! subscribes to the bus, plays the guest half of the bootstrap handshake
//! according to a [`GuestScript`], and records everything it observed so
//! tests can assert on the exact traffic. The guest task exits on its own
//! once the host side of the bus is gone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bridge_protocol::{
    BridgeMessage, CorrelationId, Direction, InteractionKind, InteractionValue,
};

use crate::bootstrap::SNAPSHOT_DUMP_MARKER;
use crate::bus::BusHandle;
use crate::interaction::PromptService;
use crate::launcher::{SandboxHandle, SandboxLauncher};

/// How the guest reacts to a `snapshot-load`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Succeed,
    /// Report `snapshot-query-failed` and wait for the cold bootstrap.
    Fail,
}

/// One guest-originated interaction the scripted guest raises after it
/// reports ready.
#[derive(Clone)]
pub struct ScriptedInteraction {
    pub id: CorrelationId,
    pub kind: InteractionKind,
    pub payload: serde_json::Value,
}

impl ScriptedInteraction {
    pub fn new(kind: InteractionKind) -> Self {
        Self {
            id: CorrelationId::new(),
            kind,
            payload: serde_json::json!({}),
        }
    }
}

/// Behaviour of one scripted session.
#[derive(Clone)]
pub struct GuestScript {
    pub restore: RestoreOutcome,
    /// Whether the guest ever reports ready. `false` simulates a hung
    /// bootstrap for timeout tests.
    pub answer_ready: bool,
    /// Report ready twice, as redelivery on the broadcast bus can.
    pub duplicate_ready: bool,
    /// Blob posted back when the host asks for a snapshot dump.
    pub snapshot_blob: Vec<u8>,
    /// Interactions raised once ready.
    pub interactions: Vec<ScriptedInteraction>,
    /// Raise each interaction twice to exercise host-side dedupe.
    pub repeat_requests: bool,
}

impl Default for GuestScript {
    fn default() -> Self {
        Self {
            restore: RestoreOutcome::Succeed,
            answer_ready: true,
            duplicate_ready: false,
            snapshot_blob: b"warm-state".to_vec(),
            interactions: Vec::new(),
            repeat_requests: false,
        }
    }
}

/// Sandbox launcher that runs a [`GuestScript`] per launch.
#[derive(Clone, Default)]
pub struct ScriptedGuest {
    script: Arc<Mutex<GuestScript>>,
    launches: Arc<AtomicUsize>,
    entry_scripts: Arc<Mutex<Vec<String>>>,
    observed: Arc<Mutex<Vec<BridgeMessage>>>,
    executed: Arc<Mutex<Vec<String>>>,
    responses: Arc<Mutex<Vec<(CorrelationId, InteractionValue)>>>,
    bus: Arc<Mutex<Option<BusHandle>>>,
}

impl ScriptedGuest {
    pub fn new(script: GuestScript) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            ..Self::default()
        }
    }

    /// Replace the script used by the *next* launch. Handy for relaunch
    /// tests where the second session should behave differently.
    pub fn set_script(&self, script: GuestScript) {
        *self.script.lock().unwrap() = script;
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn entry_scripts(&self) -> Vec<String> {
        self.entry_scripts.lock().unwrap().clone()
    }

    /// Every host-to-guest message the guest saw, across launches.
    pub fn observed(&self) -> Vec<BridgeMessage> {
        self.observed.lock().unwrap().clone()
    }

    /// Code bodies delivered over the bus push channel.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Interaction responses the guest received, in arrival order.
    pub fn responses(&self) -> Vec<(CorrelationId, InteractionValue)> {
        self.responses.lock().unwrap().clone()
    }

    /// Bus handle of the most recent launch, for tests that inject extra
    /// guest traffic by hand (e.g. a late ready).
    pub fn bus_handle(&self) -> Option<BusHandle> {
        self.bus.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxLauncher for ScriptedGuest {
    async fn launch(&self, entry_script: &str, bus: BusHandle) -> anyhow::Result<SandboxHandle> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.entry_scripts
            .lock()
            .unwrap()
            .push(entry_script.to_string());
        *self.bus.lock().unwrap() = Some(bus.clone());

        let script = self.script.lock().unwrap().clone();
        let observed = self.observed.clone();
        let executed = self.executed.clone();
        let responses = self.responses.clone();

        // Subscribe before the query goes out, like the entry script does.
        let mut sub = bus.subscribe();
        tokio::spawn(async move {
            if bus.send(BridgeMessage::SnapshotQuery).is_err() {
                return;
            }
            while let Some(message) = sub.recv().await {
                if message.direction() == Direction::GuestToHost {
                    continue;
                }
                observed.lock().unwrap().push(message.clone());
                let ok = match message {
                    BridgeMessage::SnapshotLoad { .. } => match script.restore {
                        RestoreOutcome::Succeed => report_ready(&bus, &script),
                        RestoreOutcome::Fail => {
                            bus.send(BridgeMessage::SnapshotQueryFailed).is_ok()
                        }
                    },
                    BridgeMessage::Bootstrap { .. } => report_ready(&bus, &script),
                    BridgeMessage::Execute { code, .. } => {
                        executed.lock().unwrap().push(code.clone());
                        if code.contains(SNAPSHOT_DUMP_MARKER) {
                            bus.send(BridgeMessage::SaveSnapshot {
                                blob: script.snapshot_blob.clone(),
                            })
                            .is_ok()
                        } else {
                            true
                        }
                    }
                    BridgeMessage::InteractionResponse { id, value } => {
                        responses.lock().unwrap().push((id, value));
                        true
                    }
                    _ => true,
                };
                if !ok {
                    return;
                }
            }
        });

        Ok(SandboxHandle::new())
    }
}

fn report_ready(bus: &BusHandle, script: &GuestScript) -> bool {
    if !script.answer_ready {
        return true;
    }
    if bus.send(BridgeMessage::Ready).is_err() {
        return false;
    }
    if script.duplicate_ready && bus.send(BridgeMessage::Ready).is_err() {
        return false;
    }
    for interaction in &script.interactions {
        let request = BridgeMessage::InteractionRequest {
            id: interaction.id.clone(),
            interaction_type: interaction.kind,
            payload: interaction.payload.clone(),
        };
        if bus.send(request.clone()).is_err() {
            return false;
        }
        if script.repeat_requests && bus.send(request).is_err() {
            return false;
        }
    }
    true
}

/// Prompt service answering from canned values. `None` plays a dismissal.
pub struct StaticPrompts {
    pub confirm: Option<bool>,
    pub value: Option<String>,
}

impl Default for StaticPrompts {
    fn default() -> Self {
        Self {
            confirm: Some(true),
            value: Some("answer".into()),
        }
    }
}

#[async_trait]
impl PromptService for StaticPrompts {
    async fn prompt_pause(&self, _payload: &serde_json::Value) -> anyhow::Result<Option<()>> {
        Ok(Some(()))
    }

    async fn prompt_confirm(&self, _payload: &serde_json::Value) -> anyhow::Result<Option<bool>> {
        Ok(self.confirm)
    }

    async fn prompt_value(&self, _payload: &serde_json::Value) -> anyhow::Result<Option<String>> {
        Ok(self.value.clone())
    }
}

/// Prompt service whose dialogs never resolve, for teardown tests.
pub struct HangingPrompts;

#[async_trait]
impl PromptService for HangingPrompts {
    async fn prompt_pause(&self, _payload: &serde_json::Value) -> anyhow::Result<Option<()>> {
        std::future::pending().await
    }

    async fn prompt_confirm(&self, _payload: &serde_json::Value) -> anyhow::Result<Option<bool>> {
        std::future::pending().await
    }

    async fn prompt_value(&self, _payload: &serde_json::Value) -> anyhow::Result<Option<String>> {
        std::future::pending().await
    }
}
