use memory::GuestMemoryError;
use thiserror::Error;

use crate::ipc::IpcError;

pub type Result<T> = std::result::Result<T, DiError>;

#[derive(Debug, Error)]
pub enum DiError {
    #[error("guest memory access failed: {0}")]
    Memory(#[from] GuestMemoryError),

    #[error("malformed ipc request: {0}")]
    Ipc(#[from] IpcError),

    /// The controller signalled completion but no command was queued.
    #[error("drive controller completed a command but none was queued")]
    NoCommandToExecute,
}
