//! Bootstrap sequencer: owns one sandbox session end to end.
//!
//! The session task runs a single select loop over the bus subscription, the
//! control channel, the broker's completion queue, and the ready deadline,
//! so the host stays responsive to new messages while any round-trip is
//! outstanding. Cold-start vs snapshot-restore is decided when the guest's
//! `snapshot-query` arrives.

use std::sync::Arc;

use bridge_protocol::{BridgeMessage, Direction, ReadyProbe, Snapshot};
use bridge_store::DynSnapshotStore;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Duration, Instant};

use crate::bootstrap;
use crate::bus::{BusSubscription, MessageBus};
use crate::config::BridgeConfig;
use crate::error::HostError;
use crate::inject::{CodeInjector, InjectionPath};
use crate::interaction::{InteractionBroker, PromptService};
use crate::launcher::{SandboxHandle, SandboxLauncher};

const CONTROL_CAPACITY: usize = 16;
/// Idle tick used when no ready deadline is armed.
const IDLE_TICK: Duration = Duration::from_secs(60);

/// Bootstrap state machine. `Ready` is terminal-success; errors are carried
/// separately on [`BridgeStatus`] because a timed-out session stays alive in
/// case a late `ready` arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingQuery,
    Restoring,
    Bootstrapping,
    Ready,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeStatus {
    pub state: SessionState,
    pub error: Option<String>,
}

enum SessionMsg {
    Execute {
        code: String,
        label: Option<String>,
        resp: oneshot::Sender<Result<InjectionPath, HostError>>,
    },
    Relaunch {
        config: Option<BridgeConfig>,
        resp: oneshot::Sender<Result<(), HostError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

/// Clonable handle to a running bridge session.
#[derive(Clone)]
pub struct BridgeHandle {
    control_tx: mpsc::Sender<SessionMsg>,
    status_rx: watch::Receiver<BridgeStatus>,
}

impl BridgeHandle {
    /// Push code into the session for immediate execution. Returns once the
    /// code is handed off, not once it has executed.
    pub async fn execute(
        &self,
        code: &str,
        label: Option<&str>,
    ) -> Result<InjectionPath, HostError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(SessionMsg::Execute {
                code: code.to_string(),
                label: label.map(str::to_string),
                resp: tx,
            })
            .await
            .map_err(|_| HostError::SessionClosed)?;
        rx.await.map_err(|_| HostError::SessionClosed)?
    }

    /// Tear down the current sandbox and start over from `Idle`, keeping the
    /// current configuration. Pending interactions are cancelled first.
    pub async fn relaunch(&self) -> Result<(), HostError> {
        self.relaunch_inner(None).await
    }

    /// Rebuild with a new configuration (e.g. an appearance change).
    pub async fn relaunch_with(&self, config: BridgeConfig) -> Result<(), HostError> {
        self.relaunch_inner(Some(config)).await
    }

    async fn relaunch_inner(&self, config: Option<BridgeConfig>) -> Result<(), HostError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(SessionMsg::Relaunch { config, resp: tx })
            .await
            .map_err(|_| HostError::SessionClosed)?;
        rx.await.map_err(|_| HostError::SessionClosed)?
    }

    /// Dispose of the session: cancels pending interactions and releases the
    /// channel handle. The snapshot store is left untouched.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(SessionMsg::Shutdown { resp: tx })
            .await
            .map_err(|_| HostError::SessionClosed)?;
        rx.await.map_err(|_| HostError::SessionClosed)
    }

    pub fn status(&self) -> BridgeStatus {
        self.status_rx.borrow().clone()
    }

    /// Wait until the status satisfies `pred`. Resolves immediately if it
    /// already does.
    pub async fn wait_for(
        &self,
        mut pred: impl FnMut(&BridgeStatus) -> bool,
    ) -> Result<BridgeStatus, HostError> {
        let mut rx = self.status_rx.clone();
        loop {
            {
                let status = rx.borrow_and_update();
                if pred(&status) {
                    return Ok((*status).clone());
                }
            }
            rx.changed().await.map_err(|_| HostError::SessionClosed)?;
        }
    }

    pub async fn wait_for_state(&self, state: SessionState) -> Result<(), HostError> {
        self.wait_for(|status| status.state == state).await.map(|_| ())
    }
}

impl ReadyProbe for BridgeHandle {
    fn is_ready(&self) -> bool {
        self.status_rx.borrow().state == SessionState::Ready
    }
}

/// Entry point: launch a sandbox session and return its handle.
pub struct InterpreterBridge;

impl InterpreterBridge {
    pub async fn launch(
        config: BridgeConfig,
        store: DynSnapshotStore,
        launcher: Arc<dyn SandboxLauncher>,
        prompts: Arc<dyn PromptService>,
    ) -> Result<BridgeHandle, HostError> {
        let bus = MessageBus::new(config.bus_capacity);
        let subscription = bus.handle().subscribe();
        let sandbox = launcher
            .launch(&bootstrap::entry_script(&config), bus.handle())
            .await
            .map_err(|e| HostError::Launch(e.to_string()))?;

        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(BridgeStatus {
            state: SessionState::AwaitingQuery,
            error: None,
        });

        let injector = CodeInjector::new(bus.handle(), sandbox.direct());
        let broker = InteractionBroker::new(bus.handle(), prompts.clone());
        let ready_deadline = Some(Instant::now() + config.ready_timeout);

        let session = Session {
            config,
            store,
            launcher,
            prompts,
            bus,
            subscription,
            _sandbox: sandbox,
            broker,
            injector,
            control_rx,
            status_tx,
            state: SessionState::AwaitingQuery,
            error: None,
            initialized: false,
            cold_boot: false,
            snapshot_saved: false,
            restore_fallback_used: false,
            ready_deadline,
        };
        tokio::spawn(session.run());

        Ok(BridgeHandle {
            control_tx,
            status_rx,
        })
    }
}

struct Session {
    config: BridgeConfig,
    store: DynSnapshotStore,
    launcher: Arc<dyn SandboxLauncher>,
    prompts: Arc<dyn PromptService>,
    /// Keeps the channel alive; replaced wholesale on rebuild.
    bus: MessageBus,
    subscription: BusSubscription,
    /// Kept to hold the host side of the sandbox wiring alive.
    _sandbox: SandboxHandle,
    broker: InteractionBroker,
    injector: CodeInjector,
    control_rx: mpsc::Receiver<SessionMsg>,
    status_tx: watch::Sender<BridgeStatus>,
    state: SessionState,
    error: Option<String>,
    /// One-shot guard: the broadcast bus can deliver the same lifecycle
    /// event to more than one registration.
    initialized: bool,
    cold_boot: bool,
    snapshot_saved: bool,
    restore_fallback_used: bool,
    ready_deadline: Option<Instant>,
}

impl Session {
    async fn run(mut self) {
        tracing::info!("bridge session started");
        loop {
            let deadline_sleep = match self.ready_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline),
                None => tokio::time::sleep(IDLE_TICK),
            };

            tokio::select! {
                message = self.subscription.recv() => match message {
                    Some(message) => self.on_bus_message(message),
                    None => {
                        tracing::warn!("bus closed underneath the session");
                        break;
                    }
                },
                control = self.control_rx.recv() => match control {
                    Some(msg) => {
                        if self.apply_control(msg).await {
                            break;
                        }
                    }
                    None => {
                        tracing::debug!("all bridge handles dropped; shutting down");
                        self.broker.cancel_all();
                        break;
                    }
                },
                done = self.broker.recv_done() => {
                    if let Some((id, value)) = done {
                        self.broker.complete(&id, value);
                    }
                }
                _ = deadline_sleep, if self.ready_deadline.is_some() => {
                    self.on_ready_timeout();
                }
            }
        }
        tracing::info!("bridge session ended");
    }

    fn publish(&self) {
        let _ = self.status_tx.send(BridgeStatus {
            state: self.state,
            error: self.error.clone(),
        });
    }

    fn send_to_guest(&mut self, message: BridgeMessage) {
        if let Err(err) = self.bus.handle().send(message) {
            tracing::warn!(error = %err, "send to guest failed");
            self.error = Some(err.to_string());
            self.publish();
        }
    }

    fn on_bus_message(&mut self, message: BridgeMessage) {
        // Own sends echo back on the broadcast bus.
        if message.direction() == Direction::HostToGuest {
            return;
        }
        tracing::debug!(kind = message.kind(), state = ?self.state, "bus message");
        match message {
            BridgeMessage::SnapshotQuery => self.on_snapshot_query(),
            BridgeMessage::SnapshotQueryFailed => self.on_restore_failed(),
            BridgeMessage::Ready => self.on_ready(),
            BridgeMessage::SaveSnapshot { blob } => self.on_save_snapshot(blob),
            BridgeMessage::InteractionRequest {
                id,
                interaction_type,
                payload,
            } => self.broker.handle_request(id, interaction_type, payload),
            _ => {}
        }
    }

    fn on_snapshot_query(&mut self) {
        if self.initialized || self.state != SessionState::AwaitingQuery {
            tracing::debug!(state = ?self.state, "snapshot query ignored");
            return;
        }
        match self.lookup_valid_snapshot() {
            Some(snapshot) => {
                tracing::info!("snapshot hit; restoring warm state");
                self.state = SessionState::Restoring;
                self.send_to_guest(BridgeMessage::SnapshotLoad {
                    blob: snapshot.blob,
                    post_load_code: snapshot.post_load_code,
                });
            }
            None => {
                tracing::info!("snapshot miss; cold bootstrap");
                self.begin_cold_bootstrap();
            }
        }
        self.publish();
    }

    /// Store lookup with the validate-or-invalidate version check: a
    /// snapshot taken under a different bootstrap revision is discarded.
    fn lookup_valid_snapshot(&mut self) -> Option<Snapshot> {
        let key = self.config.snapshot_key();
        let snapshot = match self.store.get(&key) {
            Ok(found) => found?,
            Err(err) => {
                tracing::warn!(error = %err, "snapshot lookup failed; treating as miss");
                return None;
            }
        };
        if snapshot.version != self.config.snapshot_version() {
            tracing::info!(
                stored = %snapshot.version,
                current = %self.config.snapshot_version(),
                "snapshot version mismatch; invalidating"
            );
            if let Err(err) = self.store.invalidate(&key) {
                tracing::warn!(error = %err, "snapshot invalidation failed");
            }
            return None;
        }
        Some(snapshot)
    }

    fn begin_cold_bootstrap(&mut self) {
        self.cold_boot = true;
        self.state = SessionState::Bootstrapping;
        self.send_to_guest(BridgeMessage::Bootstrap {
            code: bootstrap::cold_bootstrap_code(&self.config),
        });
    }

    fn on_restore_failed(&mut self) {
        if self.state != SessionState::Restoring || self.restore_fallback_used {
            tracing::warn!(state = ?self.state, "stray snapshot-query-failed dropped");
            return;
        }
        tracing::warn!("snapshot restore failed; invalidating and cold-bootstrapping");
        self.restore_fallback_used = true;
        if let Err(err) = self.store.invalidate(&self.config.snapshot_key()) {
            tracing::warn!(error = %err, "snapshot invalidation failed");
        }
        // One retry only; a second failure surfaces as a timeout.
        self.begin_cold_bootstrap();
        self.publish();
    }

    fn on_ready(&mut self) {
        if self.initialized {
            tracing::debug!("duplicate ready ignored");
            return;
        }
        self.initialized = true;
        self.state = SessionState::Ready;
        self.error = None;
        self.ready_deadline = None;
        tracing::info!(cold_boot = self.cold_boot, "guest runtime ready");
        if self.cold_boot && !self.snapshot_saved {
            // Ask the freshly bootstrapped guest for a snapshot so the next
            // session can warm-start.
            self.send_to_guest(BridgeMessage::Execute {
                code: bootstrap::snapshot_dump_code(),
                label: Some("snapshot-dump".into()),
            });
        }
        self.publish();
    }

    fn on_save_snapshot(&mut self, blob: Vec<u8>) {
        if !self.cold_boot || self.snapshot_saved {
            tracing::warn!("unsolicited save-snapshot dropped");
            return;
        }
        let snapshot = Snapshot::new(
            blob,
            bootstrap::post_load_code(&self.config),
            self.config.snapshot_version(),
        );
        match self.store.put(&self.config.snapshot_key(), &snapshot) {
            Ok(()) => {
                self.snapshot_saved = true;
                tracing::info!("snapshot persisted for next warm start");
            }
            Err(err) => tracing::warn!(error = %err, "snapshot persist failed"),
        }
    }

    fn on_ready_timeout(&mut self) {
        self.ready_deadline = None;
        if self.initialized {
            return;
        }
        // Surfaced as an error but the session stays alive; the host cannot
        // forcibly kill the sandbox and a late ready is still honored.
        tracing::warn!(
            timeout = ?self.config.ready_timeout,
            "guest did not become ready in time"
        );
        self.error = Some("bootstrap timeout; relaunch to retry".into());
        self.publish();
    }

    /// Returns `true` when the session should stop.
    async fn apply_control(&mut self, msg: SessionMsg) -> bool {
        match msg {
            SessionMsg::Execute { code, label, resp } => {
                if self.state != SessionState::Ready {
                    let _ = resp.send(Err(HostError::NotReady));
                    return false;
                }
                let injector = self.injector.clone();
                tokio::spawn(async move {
                    let result = injector.inject(&code, label.as_deref()).await;
                    let _ = resp.send(result.map_err(HostError::from));
                });
                false
            }
            SessionMsg::Relaunch { config, resp } => {
                let result = self.relaunch(config).await;
                let _ = resp.send(result);
                false
            }
            SessionMsg::Shutdown { resp } => {
                tracing::info!("bridge session shutdown requested");
                self.broker.cancel_all();
                self.state = SessionState::Idle;
                self.error = None;
                self.publish();
                let _ = resp.send(());
                true
            }
        }
    }

    /// Tear down the current sandbox wiring and start over. The old channel
    /// handle is replaced, never reused; pending interactions are resolved
    /// with the cancellation value before the new launch. The snapshot store
    /// is untouched.
    async fn relaunch(&mut self, config: Option<BridgeConfig>) -> Result<(), HostError> {
        tracing::info!("rebuilding bridge session");
        self.broker.cancel_all();
        if let Some(config) = config {
            self.config = config;
        }
        self.state = SessionState::Idle;
        self.error = None;
        self.publish();

        let bus = MessageBus::new(self.config.bus_capacity);
        let subscription = bus.handle().subscribe();
        let sandbox = match self
            .launcher
            .launch(&bootstrap::entry_script(&self.config), bus.handle())
            .await
        {
            Ok(sandbox) => sandbox,
            Err(err) => {
                let err = HostError::Launch(err.to_string());
                self.error = Some(err.to_string());
                self.publish();
                return Err(err);
            }
        };

        self.injector = CodeInjector::new(bus.handle(), sandbox.direct());
        self.broker = InteractionBroker::new(bus.handle(), self.prompts.clone());
        self.subscription = subscription;
        self.bus = bus;
        self._sandbox = sandbox;
        self.initialized = false;
        self.cold_boot = false;
        self.snapshot_saved = false;
        self.restore_fallback_used = false;
        self.state = SessionState::AwaitingQuery;
        self.ready_deadline = Some(Instant::now() + self.config.ready_timeout);
        self.publish();
        Ok(())
    }
}
