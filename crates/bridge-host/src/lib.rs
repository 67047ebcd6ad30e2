//! Host side of the embedded interpreter bridge.
//!
//! Owns the bootstrap sequencer for a sandboxed guest interpreter: launch,
//! snapshot warm-start with cold fallback, the broadcast message bus, the
//! interaction request/response broker, and the tiered code injection
//! channel. The guest runtime itself is behind the [`SandboxLauncher`]
//! seam; tests drive the host with [`testguest::ScriptedGuest`].

pub mod bootstrap;
pub mod bus;
pub mod config;
pub mod error;
pub mod inject;
pub mod interaction;
pub mod launcher;
pub mod registry;
pub mod session;
pub mod testguest;

pub use bus::{BusClosed, BusHandle, BusSubscription, MessageBus};
pub use config::{Appearance, BridgeConfig};
pub use error::HostError;
pub use inject::{DirectExec, InjectError, InjectionPath};
pub use interaction::PromptService;
pub use launcher::{SandboxHandle, SandboxLauncher};
pub use registry::BridgeRegistry;
pub use session::{BridgeHandle, BridgeStatus, InterpreterBridge, SessionState};
