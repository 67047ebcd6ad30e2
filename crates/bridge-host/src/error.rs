use thiserror::Error;

use crate::inject::InjectError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to launch sandbox: {0}")]
    Launch(String),
    #[error("session is not ready")]
    NotReady,
    #[error("session closed")]
    SessionClosed,
    #[error(transparent)]
    Inject(#[from] InjectError),
}
