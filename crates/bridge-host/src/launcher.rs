use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::BusHandle;
use crate::inject::DirectExec;

/// Starts the sandboxed guest runtime with a minimal entry script and a
/// handle to the shared bus. The host cannot forcibly kill a launched
/// sandbox; releasing the returned handle only releases the host's side.
#[async_trait]
pub trait SandboxLauncher: Send + Sync {
    async fn launch(&self, entry_script: &str, bus: BusHandle) -> anyhow::Result<SandboxHandle>;
}

/// Host-side handle to a launched sandbox. Exclusively owned by the current
/// session; replaced, never shared, on rebuild.
pub struct SandboxHandle {
    direct: Option<Arc<dyn DirectExec>>,
}

impl SandboxHandle {
    pub fn new() -> Self {
        Self { direct: None }
    }

    /// Attach the rich command API, when the isolation boundary allows one.
    pub fn with_direct(direct: Arc<dyn DirectExec>) -> Self {
        Self {
            direct: Some(direct),
        }
    }

    pub(crate) fn direct(&self) -> Option<Arc<dyn DirectExec>> {
        self.direct.clone()
    }
}

impl Default for SandboxHandle {
    fn default() -> Self {
        Self::new()
    }
}
