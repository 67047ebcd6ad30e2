use thiserror::Error;

/// Failure from one evaluation round-trip into the guest.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The guest raised; `message` is the guest-side error text.
    #[error("guest raised: {message}")]
    Guest { message: String },
    /// The interpreter itself is unreachable or broken.
    #[error("interpreter unavailable: {0}")]
    Interpreter(String),
}

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("guest raised: {message}")]
    Guest { message: String },
    #[error("interpreter unavailable: {0}")]
    Interpreter(String),
    #[error("invalid identifier: {0:?}")]
    InvalidName(String),
    #[error("invalid construction recipe: {0}")]
    InvalidRecipe(String),
}

impl From<EvalError> for KernelError {
    fn from(err: EvalError) -> Self {
        match err {
            EvalError::Guest { message } => KernelError::Guest { message },
            EvalError::Interpreter(message) => KernelError::Interpreter(message),
        }
    }
}
