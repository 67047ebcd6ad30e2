//! Wire types shared by the host-side bridge and the sandboxed guest runtime.

mod message;
mod snapshot;

pub use message::{BridgeMessage, CorrelationId, Direction, InteractionKind, InteractionValue};
pub use snapshot::Snapshot;

/// Explicit readiness probe implemented by every bridge collaborator that
/// external code may need to poll (bridge handle, command kernel).
///
/// Replaces ad hoc shape-sniffing of collaborator objects: callers ask, the
/// collaborator answers.
pub trait ReadyProbe {
    fn is_ready(&self) -> bool;
}
