//! IOS HLE disc interface device (`/dev/di`).
//!
//! This crate models the IPC side of the disc drive: the guest's drive driver issues requests
//! to `/dev/di`, and the device hands timed commands to a drive controller model one at a time,
//! replying to each when the controller raises its completion interrupt.
//!
//! The only external inputs are the collaborators in [`backend`] (controller, disc image, TMD
//! verifier, reply queue) and guest memory, which is passed into each call.
//!
//! Supported:
//! - ioctl: every drive command, queued FIFO and executed by the controller
//! - ioctlv: `OpenPartition` (partition switch + TMD read-back); other codes are logged and
//!   answered with zeroed output buffers
//! - open/close bookkeeping
//! - save/restore of the pending queue via [`ios_io_snapshot`]

pub mod backend;
pub mod command;
pub mod config;
mod device;
mod error;
pub mod ipc;

pub use backend::{DiBackends, DiController, DiscImage, TmdVerifier, VerifyError};
pub use command::{DiCommand, DiInterruptType, DiIoctl};
pub use config::{DiConfig, LegacyFieldPolicy};
pub use device::DiDevice;
pub use error::{DiError, Result};
pub use ipc::{IpcCommandResult, ReplyQueue, IPC_EINVAL, IPC_SUCCESS};
