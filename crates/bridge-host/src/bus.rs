//! Typed broadcast bus connecting the host page and the sandboxed runtime.
//!
//! Broadcast fan-out, not point-to-point RPC: every subscriber observes every
//! message, including echoes of its own sends. Consumers dispatch on the
//! message kind and ignore the opposite direction. Ordering is FIFO per
//! sender only; no total order across senders is assumed.

use bridge_protocol::BridgeMessage;
use tokio::sync::broadcast;

/// Sending half died out: nobody is listening on the bus.
#[derive(Debug, thiserror::Error)]
#[error("message bus has no listeners")]
pub struct BusClosed;

/// Owns the underlying channel. Dropping the bus (and every cloned handle)
/// closes all subscriptions.
pub struct MessageBus {
    tx: broadcast::Sender<BridgeMessage>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn handle(&self) -> BusHandle {
        BusHandle {
            tx: self.tx.clone(),
        }
    }
}

/// Clonable send/subscribe handle.
#[derive(Clone)]
pub struct BusHandle {
    tx: broadcast::Sender<BridgeMessage>,
}

impl BusHandle {
    /// Hand a message to the bus. Succeeds once at least one subscription
    /// exists; the message may still be dropped by lagging receivers.
    pub fn send(&self, message: BridgeMessage) -> Result<usize, BusClosed> {
        self.tx.send(message).map_err(|_| BusClosed)
    }

    pub fn subscribe(&self) -> BusSubscription {
        BusSubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// One registered listener. Receives messages sent after it subscribed.
pub struct BusSubscription {
    rx: broadcast::Receiver<BridgeMessage>,
}

impl BusSubscription {
    /// Next message, or `None` once the bus is gone. Lag gaps are logged and
    /// skipped; the one-shot initialization guard upstream makes duplicate
    /// or missed delivery of lifecycle messages survivable.
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "bus subscription lagged; messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
