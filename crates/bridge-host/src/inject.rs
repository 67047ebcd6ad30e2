//! One-way pipe pushing ad hoc source code into a running session.
//!
//! Delivery degrades gracefully: the rich in-sandbox command API when the
//! launcher provides one, the plain bus push otherwise, and a definite
//! `Undeliverable` failure when both paths are down so the caller can offer
//! the code to the user for manual copy.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::BridgeMessage;
use thiserror::Error;

use crate::bus::BusHandle;

/// Richer command API into the sandbox, when the isolation boundary allows
/// one. Optional; absence simply skips the first delivery tier.
#[async_trait]
pub trait DirectExec: Send + Sync {
    async fn exec(&self, code: &str, label: Option<&str>) -> anyhow::Result<()>;
}

/// Which delivery tier carried the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionPath {
    Direct,
    Bus,
}

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("code could not be delivered to the sandbox: {reason}")]
    Undeliverable { reason: String },
}

#[derive(Clone)]
pub(crate) struct CodeInjector {
    bus: BusHandle,
    direct: Option<Arc<dyn DirectExec>>,
}

impl CodeInjector {
    pub(crate) fn new(bus: BusHandle, direct: Option<Arc<dyn DirectExec>>) -> Self {
        Self { bus, direct }
    }

    /// Fire-and-forget: returns once the code is handed off, not once it
    /// has executed.
    pub(crate) async fn inject(
        &self,
        code: &str,
        label: Option<&str>,
    ) -> Result<InjectionPath, InjectError> {
        let mut direct_failure = None;
        if let Some(direct) = &self.direct {
            match direct.exec(code, label).await {
                Ok(()) => {
                    tracing::debug!(?label, "code delivered via direct command API");
                    return Ok(InjectionPath::Direct);
                }
                Err(err) => {
                    tracing::warn!(?label, error = %err, "direct delivery failed; falling back to bus push");
                    direct_failure = Some(err);
                }
            }
        }

        match self.bus.send(BridgeMessage::Execute {
            code: code.to_string(),
            label: label.map(str::to_string),
        }) {
            Ok(_) => Ok(InjectionPath::Bus),
            Err(err) => {
                let reason = match direct_failure {
                    Some(direct_err) => format!("direct: {direct_err}; bus: {err}"),
                    None => err.to_string(),
                };
                tracing::error!(?label, %reason, "code injection undeliverable");
                Err(InjectError::Undeliverable { reason })
            }
        }
    }
}
