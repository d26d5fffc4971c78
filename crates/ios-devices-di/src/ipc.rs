//! Guest-side IPC request descriptors.
//!
//! The guest hands each request to the IPC layer as the address of a 0x20-byte descriptor in its
//! own memory. All fields are big-endian words:
//!
//! ```text
//! 0x00  command          (open=1 close=2 read=3 write=4 seek=5 ioctl=6 ioctlv=7)
//! 0x04  return value     (written by the device)
//! 0x08  fd
//! 0x0c  request code     (ioctl / ioctlv)
//! 0x10  ioctl: buffer_in       ioctlv: in vector count
//! 0x14  ioctl: buffer_in_size  ioctlv: io vector count
//! 0x18  ioctl: buffer_out      ioctlv: vector table address
//! 0x1c  ioctl: buffer_out_size
//! ```
//!
//! An ioctlv vector table is a list of `(address, size)` word pairs: the `in` vectors the guest
//! filled in, followed by the `io` vectors the device writes.

use memory::GuestMemory;
use thiserror::Error;
use tracing::debug;

use crate::error::Result;

pub const IPC_SUCCESS: i32 = 0;
pub const IPC_EINVAL: i32 = -4;

/// Largest ioctlv vector count accepted from a descriptor.
pub const MAX_IO_VECTORS: u32 = 32;

const OFFSET_COMMAND: u64 = 0x00;
const OFFSET_RETURN_VALUE: u64 = 0x04;
const OFFSET_FD: u64 = 0x08;
const OFFSET_REQUEST: u64 = 0x0c;
const OFFSET_ARG0: u64 = 0x10;
const OFFSET_ARG1: u64 = 0x14;
const OFFSET_ARG2: u64 = 0x18;
const OFFSET_ARG3: u64 = 0x1c;

/// Malformed descriptors. Guest memory faults while reading one are reported as
/// [`DiError::Memory`](crate::DiError::Memory), like any other fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpcError {
    #[error("ioctlv at 0x{address:08x} declares {count} vectors (max {MAX_IO_VECTORS})")]
    TooManyVectors { address: u32, count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcCommandType {
    Open,
    Close,
    Read,
    Write,
    Seek,
    Ioctl,
    Ioctlv,
}

impl IpcCommandType {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            1 => Self::Open,
            2 => Self::Close,
            3 => Self::Read,
            4 => Self::Write,
            5 => Self::Seek,
            6 => Self::Ioctl,
            7 => Self::Ioctlv,
            _ => return None,
        })
    }
}

/// What a request handler tells the IPC layer to do with the request it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcCommandResult {
    /// The return value has been written; deliver the reply now.
    Reply,
    /// No reply yet. Exactly one reply is enqueued later through [`ReplyQueue`].
    NoReply,
}

/// Deferred reply delivery owned by the IPC layer.
pub trait ReplyQueue {
    /// Queues the reply for the request at `request_address`. The return value field has already
    /// been written.
    fn enqueue_reply(&mut self, request_address: u32);
}

pub fn read_command(mem: &dyn GuestMemory, address: u32) -> Result<u32> {
    Ok(mem.read_u32_be(u64::from(address) + OFFSET_COMMAND)?)
}

pub fn set_return_value(
    mem: &mut dyn GuestMemory,
    address: u32,
    value: i32,
) -> Result<()> {
    mem.write_u32_be(u64::from(address) + OFFSET_RETURN_VALUE, value as u32)?;
    Ok(())
}

/// A single-buffer-in, single-buffer-out request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoctlRequest {
    pub address: u32,
    pub fd: u32,
    pub request: u32,
    pub buffer_in: u32,
    pub buffer_in_size: u32,
    pub buffer_out: u32,
    pub buffer_out_size: u32,
}

impl IoctlRequest {
    pub fn read(mem: &dyn GuestMemory, address: u32) -> Result<Self> {
        let base = u64::from(address);
        Ok(Self {
            address,
            fd: mem.read_u32_be(base + OFFSET_FD)?,
            request: mem.read_u32_be(base + OFFSET_REQUEST)?,
            buffer_in: mem.read_u32_be(base + OFFSET_ARG0)?,
            buffer_in_size: mem.read_u32_be(base + OFFSET_ARG1)?,
            buffer_out: mem.read_u32_be(base + OFFSET_ARG2)?,
            buffer_out_size: mem.read_u32_be(base + OFFSET_ARG3)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoVector {
    pub address: u32,
    pub size: u32,
}

/// A multi-buffer request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoctlvRequest {
    pub address: u32,
    pub fd: u32,
    pub request: u32,
    pub in_vectors: Vec<IoVector>,
    pub io_vectors: Vec<IoVector>,
}

impl IoctlvRequest {
    pub fn read(mem: &dyn GuestMemory, address: u32) -> Result<Self> {
        let base = u64::from(address);
        let fd = mem.read_u32_be(base + OFFSET_FD)?;
        let request = mem.read_u32_be(base + OFFSET_REQUEST)?;
        let in_count = mem.read_u32_be(base + OFFSET_ARG0)?;
        let io_count = mem.read_u32_be(base + OFFSET_ARG1)?;
        let table = u64::from(mem.read_u32_be(base + OFFSET_ARG2)?);

        let total = in_count.saturating_add(io_count);
        if total > MAX_IO_VECTORS {
            return Err(IpcError::TooManyVectors {
                address,
                count: total,
            }
            .into());
        }

        let mut vectors = Vec::with_capacity(total as usize);
        for i in 0..u64::from(total) {
            let entry = table + i * 8;
            vectors.push(IoVector {
                address: mem.read_u32_be(entry)?,
                size: mem.read_u32_be(entry + 4)?,
            });
        }
        let io_vectors = vectors.split_off(in_count as usize);

        Ok(Self {
            address,
            fd,
            request,
            in_vectors: vectors,
            io_vectors,
        })
    }

    /// Logs every buffer of a request the device does not understand.
    pub fn dump_unknown(&self, device_name: &str) {
        debug!(
            device = device_name,
            request = format_args!("0x{:x}", self.request),
            address = format_args!("0x{:08x}", self.address),
            in_count = self.in_vectors.len(),
            io_count = self.io_vectors.len(),
            "unknown ioctlv"
        );
        for (i, v) in self.in_vectors.iter().enumerate() {
            debug!(
                index = i,
                address = format_args!("0x{:08x}", v.address),
                size = v.size,
                "  in"
            );
        }
        for (i, v) in self.io_vectors.iter().enumerate() {
            debug!(
                index = i,
                address = format_args!("0x{:08x}", v.address),
                size = v.size,
                "  io"
            );
        }
    }
}
