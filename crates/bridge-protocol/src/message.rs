use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token pairing an interaction request with its eventual response.
///
/// Generated by the sender of the request half; the host never parses it,
/// only matches it against its pending-interaction map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The three kinds of human input a running guest script may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    Pause,
    Confirm,
    PromptForValue,
}

/// Value carried back to the guest in an `interaction-response`.
///
/// `Cancelled` is the defined cancellation value: it is what the guest
/// receives when the session is torn down mid-flight or a value prompt is
/// dismissed without an answer. The guest is conceptually blocked awaiting
/// the response, so some value must always be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionValue {
    Unit,
    Bool(bool),
    Text(String),
    Cancelled,
}

/// Which side of the bridge originates a message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HostToGuest,
    GuestToHost,
}

/// The only datum that crosses the message bus.
///
/// The bus is broadcast fan-out, so every subscriber sees every message;
/// consumers dispatch on the kind tag and ignore the opposite direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum BridgeMessage {
    /// Guest asks the host whether a warm-start snapshot exists.
    SnapshotQuery,
    /// Host answers a query hit: restore this blob, then run the post-load
    /// code to rehydrate transient bindings (bus listeners do not survive
    /// serialization).
    SnapshotLoad {
        blob: Vec<u8>,
        post_load_code: String,
    },
    /// Host answers a query miss with the full cold-bootstrap script.
    Bootstrap { code: String },
    /// Guest reports that restoring the offered snapshot failed.
    SnapshotQueryFailed,
    /// Guest hands back a freshly produced snapshot for persistence.
    SaveSnapshot { blob: Vec<u8> },
    /// Guest finished bootstrapping (cold or warm) and accepts work.
    Ready,
    /// Host pushes ad hoc code for immediate execution.
    Execute {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Guest script needs human input.
    InteractionRequest {
        id: CorrelationId,
        #[serde(rename = "interactionType")]
        interaction_type: InteractionKind,
        payload: serde_json::Value,
    },
    /// Host delivers the correlated answer.
    InteractionResponse {
        id: CorrelationId,
        value: InteractionValue,
    },
}

impl BridgeMessage {
    pub fn direction(&self) -> Direction {
        match self {
            BridgeMessage::SnapshotQuery
            | BridgeMessage::SnapshotQueryFailed
            | BridgeMessage::SaveSnapshot { .. }
            | BridgeMessage::Ready
            | BridgeMessage::InteractionRequest { .. } => Direction::GuestToHost,
            BridgeMessage::SnapshotLoad { .. }
            | BridgeMessage::Bootstrap { .. }
            | BridgeMessage::Execute { .. }
            | BridgeMessage::InteractionResponse { .. } => Direction::HostToGuest,
        }
    }

    /// Stable kind tag, mainly for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::SnapshotQuery => "snapshot-query",
            BridgeMessage::SnapshotLoad { .. } => "snapshot-load",
            BridgeMessage::Bootstrap { .. } => "bootstrap",
            BridgeMessage::SnapshotQueryFailed => "snapshot-query-failed",
            BridgeMessage::SaveSnapshot { .. } => "save-snapshot",
            BridgeMessage::Ready => "ready",
            BridgeMessage::Execute { .. } => "execute",
            BridgeMessage::InteractionRequest { .. } => "interaction-request",
            BridgeMessage::InteractionResponse { .. } => "interaction-response",
        }
    }
}
