use std::collections::VecDeque;

use ios_io_snapshot::io::ipc::state::DiDeviceState;
use ios_io_snapshot::io::state::{IoSnapshot, SnapshotResult, SnapshotVersion};
use memory::GuestMemory;
use tracing::{error, info, trace, warn};

use crate::backend::{DiBackends, DiController, DiscImage, TmdVerifier};
use crate::command::{DiCommand, DiInterruptType, DiIoctl};
use crate::config::{DiConfig, LegacyFieldPolicy};
use crate::error::{DiError, Result};
use crate::ipc::{
    read_command, set_return_value, IoctlRequest, IoctlvRequest, IpcCommandResult,
    IpcCommandType, ReplyQueue, IPC_EINVAL, IPC_SUCCESS,
};

/// Return value of a successful `OpenPartition`.
const OPEN_PARTITION_SUCCESS: i32 = 1;

/// Partition offsets are passed as 32-bit word counts.
const PARTITION_OFFSET_SHIFT: u32 = 2;

/// `/dev/di`: the IPC front end of the disc drive.
///
/// Ioctls are timed commands executed by the drive controller. The controller handles one command
/// at a time, so requests queue here in arrival order. The front of the queue is the command the
/// controller is currently executing; it stays queued until the controller reports completion
/// through [`DiDevice::finish_ioctl`], which replies to it and starts the next one.
///
/// Ioctlvs are handled synchronously and never queue.
pub struct DiDevice {
    config: DiConfig,
    controller: Box<dyn DiController>,
    disc: Box<dyn DiscImage>,
    verifier: Box<dyn TmdVerifier>,
    replies: Box<dyn ReplyQueue>,

    active: bool,
    commands_to_execute: VecDeque<u32>,
}

impl DiDevice {
    pub const DEVICE_NAME: &'static str = "/dev/di";

    pub fn new(config: DiConfig, backends: DiBackends) -> Self {
        let DiBackends {
            controller,
            disc,
            verifier,
            replies,
        } = backends;
        Self {
            config,
            controller,
            disc,
            verifier,
            replies,
            active: false,
            commands_to_execute: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &DiConfig {
        &self.config
    }

    /// Whether the guest currently holds the device open.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether a command is executing on the controller.
    pub fn is_busy(&self) -> bool {
        !self.commands_to_execute.is_empty()
    }

    /// Guest addresses of queued ioctl requests, oldest (executing) first.
    pub fn pending_commands(&self) -> impl Iterator<Item = u32> + '_ {
        self.commands_to_execute.iter().copied()
    }

    /// Dispatches a request by its command word.
    ///
    /// Read, write and seek are not meaningful on this device and fail with `IPC_EINVAL`.
    pub fn handle_request(
        &mut self,
        mem: &mut dyn GuestMemory,
        request_address: u32,
    ) -> Result<IpcCommandResult> {
        let command = read_command(mem, request_address)?;
        match IpcCommandType::from_u32(command) {
            Some(IpcCommandType::Open) => self.open(mem, request_address),
            Some(IpcCommandType::Close) => self.close(mem, request_address),
            Some(IpcCommandType::Ioctl) => self.ioctl(mem, request_address),
            Some(IpcCommandType::Ioctlv) => self.ioctlv(mem, request_address),
            Some(IpcCommandType::Read | IpcCommandType::Write | IpcCommandType::Seek) | None => {
                warn!(
                    device = Self::DEVICE_NAME,
                    command,
                    address = format_args!("0x{request_address:08x}"),
                    "unsupported ipc command"
                );
                set_return_value(mem, request_address, IPC_EINVAL)?;
                Ok(IpcCommandResult::Reply)
            }
        }
    }

    pub fn open(
        &mut self,
        mem: &mut dyn GuestMemory,
        request_address: u32,
    ) -> Result<IpcCommandResult> {
        self.active = true;
        set_return_value(mem, request_address, IPC_SUCCESS)?;
        Ok(IpcCommandResult::Reply)
    }

    /// Closes the device. Queued ioctls keep running and still get their replies.
    pub fn close(
        &mut self,
        mem: &mut dyn GuestMemory,
        request_address: u32,
    ) -> Result<IpcCommandResult> {
        self.active = false;
        set_return_value(mem, request_address, IPC_SUCCESS)?;
        Ok(IpcCommandResult::Reply)
    }

    /// Queues a timed command, starting it right away if the controller is idle.
    ///
    /// Never replies synchronously: the reply is enqueued by [`DiDevice::finish_ioctl`].
    pub fn ioctl(
        &mut self,
        mem: &mut dyn GuestMemory,
        request_address: u32,
    ) -> Result<IpcCommandResult> {
        let ready_to_execute = self.commands_to_execute.is_empty();
        self.commands_to_execute.push_back(request_address);
        trace!(
            address = format_args!("0x{request_address:08x}"),
            queued = self.commands_to_execute.len(),
            "di ioctl queued"
        );
        if ready_to_execute {
            self.start_front(mem)?;
        }
        Ok(IpcCommandResult::NoReply)
    }

    /// Starts the command at the front of the queue.
    ///
    /// A request that cannot be started (unreadable descriptor or command words) is dropped from
    /// the queue without a reply, and the next one is tried, so the queue never waits on a
    /// completion that cannot arrive. The first failure is returned once something is running or
    /// the queue is empty.
    fn start_front(&mut self, mem: &mut dyn GuestMemory) -> Result<()> {
        let mut first_error = None;
        while let Some(&request_address) = self.commands_to_execute.front() {
            match self.start_ioctl(mem, request_address) {
                Ok(()) => break,
                Err(err) => {
                    error!(
                        device = Self::DEVICE_NAME,
                        address = format_args!("0x{request_address:08x}"),
                        error = %err,
                        "di ioctl could not be started, dropping it"
                    );
                    self.commands_to_execute.pop_front();
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn start_ioctl(&mut self, mem: &mut dyn GuestMemory, request_address: u32) -> Result<()> {
        let request = IoctlRequest::read(mem, request_address)?;
        let buffer_in = u64::from(request.buffer_in);
        let command = DiCommand {
            command_0: mem.read_u32_be(buffer_in)?,
            command_1: mem.read_u32_be(buffer_in + 4)?,
            command_2: mem.read_u32_be(buffer_in + 8)?,
            output_address: request.buffer_out,
            output_length: request.buffer_out_size,
        };
        trace!(
            address = format_args!("0x{request_address:08x}"),
            opcode = format_args!("0x{:02x}", command.opcode()),
            "di ioctl started"
        );
        self.controller.execute_command(mem, command, true);
        Ok(())
    }

    /// Completion upcall from the drive controller for the command at the front of the queue.
    ///
    /// Writes `interrupt` as the request's return value, enqueues the reply and starts the next
    /// queued command. Completion with nothing queued is a controller bug and is reported as
    /// [`DiError::NoCommandToExecute`].
    ///
    /// The finished request leaves the queue even when its return value cannot be written, and
    /// the next command is still started; the write error is returned afterwards.
    pub fn finish_ioctl(
        &mut self,
        mem: &mut dyn GuestMemory,
        interrupt: DiInterruptType,
    ) -> Result<()> {
        let Some(&request_address) = self.commands_to_execute.front() else {
            error!(
                device = Self::DEVICE_NAME,
                %interrupt,
                "drive controller completed a command but none was queued"
            );
            return Err(DiError::NoCommandToExecute);
        };

        trace!(
            address = format_args!("0x{request_address:08x}"),
            %interrupt,
            "di ioctl finished"
        );
        let written = set_return_value(mem, request_address, interrupt.return_value());
        self.commands_to_execute.pop_front();
        match &written {
            Ok(()) => self.replies.enqueue_reply(request_address),
            Err(err) => error!(
                device = Self::DEVICE_NAME,
                address = format_args!("0x{request_address:08x}"),
                error = %err,
                "di ioctl return value could not be written, dropping it"
            ),
        }

        let started = self.start_front(mem);
        written?;
        started
    }

    /// Handles a vectorized request synchronously.
    ///
    /// Every output vector is zeroed first, so requests the device ignores still hand back
    /// well-defined buffers.
    pub fn ioctlv(
        &mut self,
        mem: &mut dyn GuestMemory,
        request_address: u32,
    ) -> Result<IpcCommandResult> {
        let request = IoctlvRequest::read(mem, request_address)?;
        for vector in &request.io_vectors {
            mem.zero(u64::from(vector.address), vector.size as usize)?;
        }

        let return_value = match DiIoctl::from_request(request.request) {
            Some(DiIoctl::OpenPartition) => self.open_partition(mem, &request)?,
            _ => {
                request.dump_unknown(Self::DEVICE_NAME);
                IPC_SUCCESS
            }
        };

        set_return_value(mem, request_address, return_value)?;
        Ok(IpcCommandResult::Reply)
    }

    fn open_partition(&mut self, mem: &mut dyn GuestMemory, request: &IoctlvRequest) -> Result<i32> {
        let (Some(params), Some(ticket), Some(cert_chain), Some(tmd_out)) = (
            request.in_vectors.first(),
            request.in_vectors.get(1),
            request.in_vectors.get(2),
            request.io_vectors.first(),
        ) else {
            warn!(
                in_count = request.in_vectors.len(),
                io_count = request.io_vectors.len(),
                "DVDLowOpenPartition with missing vectors"
            );
            return Ok(IPC_EINVAL);
        };

        let has_ticket = ticket.address != 0;
        let has_cert_chain = cert_chain.address != 0;
        if has_ticket || has_cert_chain {
            match self.config.legacy_fields {
                LegacyFieldPolicy::Permissive => {
                    warn!(
                        has_ticket,
                        has_cert_chain, "DVDLowOpenPartition with ticket/cert chain, ignoring"
                    );
                }
                LegacyFieldPolicy::Strict => {
                    warn!(
                        has_ticket,
                        has_cert_chain, "DVDLowOpenPartition with ticket/cert chain, rejecting"
                    );
                    return Ok(IPC_EINVAL);
                }
            }
        }

        let partition_offset =
            u64::from(mem.read_u32_be(u64::from(params.address) + 4)?) << PARTITION_OFFSET_SHIFT;
        self.disc.change_partition(partition_offset);
        info!(
            partition_offset = format_args!("0x{partition_offset:016x}"),
            "DVDLowOpenPartition"
        );

        let tmd = self.disc.tmd();
        if tmd.len() > tmd_out.size as usize {
            warn!(
                tmd_len = tmd.len(),
                buffer_len = tmd_out.size,
                "DVDLowOpenPartition: TMD larger than output buffer"
            );
        }
        mem.write_from(u64::from(tmd_out.address), &tmd)?;
        if let Err(err) = self.verifier.di_verify(&tmd) {
            warn!(error = %err, "DVDLowOpenPartition: TMD verification failed");
        }

        Ok(OPEN_PARTITION_SUCCESS)
    }

    pub fn snapshot_state(&self) -> DiDeviceState {
        DiDeviceState {
            active: self.active,
            commands_to_execute: self.commands_to_execute.iter().copied().collect(),
        }
    }

    /// Replaces the queue with the persisted one.
    ///
    /// The front command is not restarted: the restored controller is expected to still own its
    /// execution and will complete it as usual.
    pub fn restore_state(&mut self, state: &DiDeviceState) {
        self.active = state.active;
        self.commands_to_execute = state.commands_to_execute.iter().copied().collect();
    }
}

impl IoSnapshot for DiDevice {
    const DEVICE_ID: [u8; 4] = DiDeviceState::DEVICE_ID;
    const DEVICE_VERSION: SnapshotVersion = DiDeviceState::DEVICE_VERSION;

    fn save_state(&self) -> Vec<u8> {
        self.snapshot_state().save_state()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let mut state = DiDeviceState::default();
        state.load_state(bytes)?;
        self.restore_state(&state);
        Ok(())
    }
}
