//! Dedicated command kernel for direct device control.
//!
//! Sibling to the bridge session: where the bridge runs operator-authored
//! code in a shared sandbox, this crate drives its own guest interpreter to
//! construct named device objects and invoke methods on them, caching each
//! constructed device for the kernel's lifetime.

mod codegen;
mod error;
mod kernel;

pub use error::{EvalError, KernelError};
pub use kernel::{CommandKernel, ConstructionRecipe, DeviceHandle, GuestInterpreter};
