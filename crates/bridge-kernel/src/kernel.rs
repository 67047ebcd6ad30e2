//! Command kernel: a cached, name-addressed device layer over one dedicated
//! guest interpreter.
//!
//! Each named device is constructed in the guest at most once per kernel and
//! addressed afterwards through a stable variable. Method calls are rendered
//! as keyword-argument invocations on that variable. The interpreter is
//! booted lazily, once, on first use.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::ReadyProbe;
use tokio::sync::{Mutex, OnceCell};

use crate::codegen::{is_identifier, is_module_path, literal};
use crate::error::{EvalError, KernelError};

/// A dedicated guest interpreter the kernel drives synchronously: one boot,
/// then sequential evaluations.
#[async_trait]
pub trait GuestInterpreter: Send + Sync {
    async fn boot(&self) -> Result<(), EvalError>;
    /// Evaluate `code` and return the textual result of its last expression.
    async fn eval(&self, code: &str) -> Result<String, EvalError>;
}

/// How to construct a device object inside the guest.
#[derive(Debug, Clone)]
pub struct ConstructionRecipe {
    /// Dotted module the device class is imported from.
    pub module: String,
    pub class_name: String,
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

/// Guest-side address of a constructed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    name: String,
    var: String,
}

impl DeviceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct CommandKernel {
    interpreter: Arc<dyn GuestInterpreter>,
    devices: Mutex<HashMap<String, DeviceHandle>>,
    /// Boot happens once; a failed boot leaves the cell empty so the next
    /// call retries.
    booted: OnceCell<()>,
    ready: AtomicBool,
}

impl CommandKernel {
    pub fn new(interpreter: Arc<dyn GuestInterpreter>) -> Self {
        Self {
            interpreter,
            devices: Mutex::new(HashMap::new()),
            booted: OnceCell::new(),
            ready: AtomicBool::new(false),
        }
    }

    /// Boot the interpreter if it has not been booted yet. Concurrent calls
    /// coalesce onto one boot.
    pub async fn ensure_booted(&self) -> Result<(), KernelError> {
        self.booted
            .get_or_try_init(|| async {
                tracing::info!("booting dedicated command interpreter");
                self.interpreter.boot().await
            })
            .await?;
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Construct the named device in the guest, or return the cached handle
    /// when it already exists. The construction code runs at most once per
    /// name for the lifetime of the kernel.
    pub async fn ensure_device(
        &self,
        name: &str,
        recipe: &ConstructionRecipe,
    ) -> Result<DeviceHandle, KernelError> {
        if !is_identifier(name) {
            return Err(KernelError::InvalidName(name.to_string()));
        }
        self.ensure_booted().await?;

        let mut devices = self.devices.lock().await;
        if let Some(handle) = devices.get(name) {
            return Ok(handle.clone());
        }

        let code = construction_code(name, recipe)?;
        tracing::debug!(device = name, "constructing device in guest");
        self.interpreter.eval(&code).await?;

        let handle = DeviceHandle {
            name: name.to_string(),
            var: device_var(name),
        };
        devices.insert(name.to_string(), handle.clone());
        Ok(handle)
    }

    /// Call a method on a constructed device with keyword arguments and
    /// return the guest's textual result.
    pub async fn invoke(
        &self,
        device: &DeviceHandle,
        method: &str,
        kwargs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<String, KernelError> {
        if !is_identifier(method) {
            return Err(KernelError::InvalidName(method.to_string()));
        }
        let args = render_kwargs(kwargs)?;
        let code = format!("{}.{method}({args})", device.var);
        tracing::debug!(device = device.name(), method, "invoking device method");
        Ok(self.interpreter.eval(&code).await?)
    }
}

impl ReadyProbe for CommandKernel {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

fn device_var(name: &str) -> String {
    format!("_device_{name}")
}

fn construction_code(name: &str, recipe: &ConstructionRecipe) -> Result<String, KernelError> {
    if !is_module_path(&recipe.module) {
        return Err(KernelError::InvalidRecipe(format!(
            "module {:?} is not a dotted identifier path",
            recipe.module
        )));
    }
    if !is_identifier(&recipe.class_name) {
        return Err(KernelError::InvalidRecipe(format!(
            "class name {:?} is not an identifier",
            recipe.class_name
        )));
    }
    let args = render_kwargs(&recipe.kwargs)?;
    Ok(format!(
        "from {module} import {class_name}\n{var} = {class_name}({args})",
        module = recipe.module,
        class_name = recipe.class_name,
        var = device_var(name),
    ))
}

fn render_kwargs(kwargs: &BTreeMap<String, serde_json::Value>) -> Result<String, KernelError> {
    let mut parts = Vec::with_capacity(kwargs.len());
    for (key, value) in kwargs {
        if !is_identifier(key) {
            return Err(KernelError::InvalidName(key.clone()));
        }
        parts.push(format!("{key}={}", literal(value)));
    }
    Ok(parts.join(", "))
}
