//! Host-side collaborators of the DI device.
//!
//! Everything the device talks to is injected at construction time so the queue logic can run
//! against recording fakes without the rest of the emulated machine.

use memory::GuestMemory;
use thiserror::Error;

use crate::command::DiCommand;
use crate::ipc::ReplyQueue;

/// The drive controller model.
///
/// At most one command is outstanding at a time; the DI device guarantees this. The controller
/// reports completion later by having the host call
/// [`DiDevice::finish_ioctl`](crate::DiDevice::finish_ioctl) exactly once per executed command.
pub trait DiController {
    /// Starts `command`. `reply_to_ios` is set when the completion must produce an IPC reply
    /// rather than a plain hardware interrupt.
    fn execute_command(
        &mut self,
        mem: &mut dyn GuestMemory,
        command: DiCommand,
        reply_to_ios: bool,
    );
}

/// The inserted disc image.
pub trait DiscImage {
    /// Switches subsequent reads to the partition starting at byte `offset`.
    fn change_partition(&mut self, offset: u64);

    /// Title metadata of the active partition.
    fn tmd(&self) -> Vec<u8>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("title metadata rejected: {0}")]
    Rejected(String),
}

/// The sibling subsystem that takes ownership of a partition's title metadata.
pub trait TmdVerifier {
    fn di_verify(&mut self, tmd: &[u8]) -> Result<(), VerifyError>;
}

/// The set of collaborators a [`DiDevice`](crate::DiDevice) is built from.
pub struct DiBackends {
    pub controller: Box<dyn DiController>,
    pub disc: Box<dyn DiscImage>,
    pub verifier: Box<dyn TmdVerifier>,
    pub replies: Box<dyn ReplyQueue>,
}
