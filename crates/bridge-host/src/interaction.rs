//! Request/response correlator for guest-originated interaction requests.
//!
//! Every `interaction-request` gets exactly one `interaction-response` on
//! the same correlation id: a real answer, the defined default when the
//! prompt is dismissed, or `Cancelled` when the session is torn down first.
//! The broker alone emits responses: prompt tasks only hand the collected
//! value back over the completion channel, so an id is answered either on
//! completion or on teardown, never both.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::{BridgeMessage, CorrelationId, InteractionKind, InteractionValue};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bus::BusHandle;

/// Duplicate-delivery window: request ids seen recently are dropped, since
/// the broadcast bus can hand the same logical request to more than one
/// listener registration.
const SEEN_WINDOW: usize = 128;

/// UI collaborator that obtains a value from the human operator.
///
/// Each method resolves eventually: `Ok(Some(_))` with the collected value,
/// `Ok(None)` when the dialog was dismissed without an answer. Errors are
/// treated as dismissal so the guest never hangs.
#[async_trait]
pub trait PromptService: Send + Sync {
    async fn prompt_pause(&self, payload: &serde_json::Value) -> anyhow::Result<Option<()>>;
    async fn prompt_confirm(&self, payload: &serde_json::Value) -> anyhow::Result<Option<bool>>;
    async fn prompt_value(&self, payload: &serde_json::Value) -> anyhow::Result<Option<String>>;
}

struct PendingInteraction {
    kind: InteractionKind,
    task: JoinHandle<()>,
}

pub(crate) struct InteractionBroker {
    bus: BusHandle,
    prompts: Arc<dyn PromptService>,
    pending: HashMap<CorrelationId, PendingInteraction>,
    seen: VecDeque<CorrelationId>,
    done_tx: mpsc::UnboundedSender<(CorrelationId, InteractionValue)>,
    done_rx: mpsc::UnboundedReceiver<(CorrelationId, InteractionValue)>,
}

impl InteractionBroker {
    pub(crate) fn new(bus: BusHandle, prompts: Arc<dyn PromptService>) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            bus,
            prompts,
            pending: HashMap::new(),
            seen: VecDeque::new(),
            done_tx,
            done_rx,
        }
    }

    /// Completion notice from a finished prompt task, carrying the collected
    /// value. Never resolves to `None`: the broker keeps its own sender
    /// alive.
    pub(crate) async fn recv_done(&mut self) -> Option<(CorrelationId, InteractionValue)> {
        self.done_rx.recv().await
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Track a new request and spawn the prompt. Duplicate ids (redelivery
    /// or an id still in flight) are dropped.
    pub(crate) fn handle_request(
        &mut self,
        id: CorrelationId,
        kind: InteractionKind,
        payload: serde_json::Value,
    ) {
        if self.pending.contains_key(&id) || self.seen.contains(&id) {
            tracing::debug!(%id, "duplicate interaction request dropped");
            return;
        }
        self.seen.push_back(id.clone());
        if self.seen.len() > SEEN_WINDOW {
            self.seen.pop_front();
        }

        tracing::info!(%id, ?kind, "interaction requested");
        let prompts = self.prompts.clone();
        let done_tx = self.done_tx.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            let value = collect_value(prompts.as_ref(), kind, &payload).await;
            let _ = done_tx.send((task_id, value));
        });
        self.pending.insert(id, PendingInteraction { kind, task });
    }

    /// Emit the response for a completed request and clear it. A completion
    /// whose id is unknown (already cancelled on teardown, or stale) is
    /// logged and dropped without touching any other pending request.
    pub(crate) fn complete(&mut self, id: &CorrelationId, value: InteractionValue) {
        match self.pending.remove(id) {
            Some(_) => {
                if self
                    .bus
                    .send(BridgeMessage::InteractionResponse {
                        id: id.clone(),
                        value,
                    })
                    .is_err()
                {
                    tracing::warn!(%id, "interaction response undeliverable; bus closed");
                }
                tracing::debug!(%id, "interaction resolved");
            }
            None => tracing::warn!(%id, "completion for unknown or cancelled interaction dropped"),
        }
    }

    /// Session teardown: abort in-flight prompts and answer every pending
    /// id with the cancellation value so no resolver is left dangling on
    /// either side.
    pub(crate) fn cancel_all(&mut self) {
        for (id, pending) in self.pending.drain() {
            pending.task.abort();
            tracing::info!(%id, kind = ?pending.kind, "cancelling pending interaction");
            let _ = self.bus.send(BridgeMessage::InteractionResponse {
                id,
                value: InteractionValue::Cancelled,
            });
        }
    }
}

async fn collect_value(
    prompts: &dyn PromptService,
    kind: InteractionKind,
    payload: &serde_json::Value,
) -> InteractionValue {
    match kind {
        InteractionKind::Pause => match prompts.prompt_pause(payload).await {
            // Any dismissal of a pause notice counts as acknowledgement.
            Ok(_) => InteractionValue::Unit,
            Err(err) => {
                tracing::warn!(error = %err, "pause prompt failed; acknowledging anyway");
                InteractionValue::Unit
            }
        },
        InteractionKind::Confirm => match prompts.prompt_confirm(payload).await {
            Ok(Some(answer)) => InteractionValue::Bool(answer),
            Ok(None) => InteractionValue::Bool(false),
            Err(err) => {
                tracing::warn!(error = %err, "confirm prompt failed; answering false");
                InteractionValue::Bool(false)
            }
        },
        InteractionKind::PromptForValue => match prompts.prompt_value(payload).await {
            Ok(Some(text)) => InteractionValue::Text(text),
            Ok(None) => InteractionValue::Cancelled,
            Err(err) => {
                tracing::warn!(error = %err, "value prompt failed; cancelling");
                InteractionValue::Cancelled
            }
        },
    }
}
