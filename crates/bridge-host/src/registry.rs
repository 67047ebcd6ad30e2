//! Explicit handle registry for external tooling.
//!
//! Replaces window-scoped exposure of the live bridge: anything that needs
//! the handle (an automated harness, diagnostics) is given the registry and
//! asks for it by name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::session::BridgeHandle;

#[derive(Clone, Default)]
pub struct BridgeRegistry {
    inner: Arc<RwLock<HashMap<String, BridgeHandle>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handle under `name`.
    pub fn register(&self, name: impl Into<String>, handle: BridgeHandle) {
        self.inner.write().unwrap().insert(name.into(), handle);
    }

    pub fn get(&self, name: &str) -> Option<BridgeHandle> {
        self.inner.read().unwrap().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<BridgeHandle> {
        self.inner.write().unwrap().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}
