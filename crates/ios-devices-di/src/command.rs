//! Drive-controller command words and completion causes.

use std::fmt;

/// DI command set. The opcode lives in the top byte of the first command word; the same codes
/// are used as ioctl/ioctlv request numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiIoctl {
    Inquiry = 0x12,
    ReadDiscId = 0x70,
    Read = 0x71,
    WaitForCoverClose = 0x79,
    GetCoverRegister = 0x7a,
    NotifyReset = 0x7e,
    ReadDvdPhysical = 0x80,
    ReadDvdCopyright = 0x81,
    ReadDvdDiscKey = 0x82,
    ClearCoverInterrupt = 0x86,
    GetCoverStatus = 0x88,
    Reset = 0x8a,
    OpenPartition = 0x8b,
    ClosePartition = 0x8c,
    UnencryptedRead = 0x8d,
    EnableDvdVideo = 0x8e,
    StopLaser = 0xd2,
    Offset = 0xd9,
    ReadBca = 0xda,
    RequestDiscStatus = 0xdb,
    RequestRetryNumber = 0xdc,
    SetMaximumRotation = 0xdd,
    SerMeasControl = 0xdf,
    RequestError = 0xe0,
    AudioStreaming = 0xe1,
    RequestAudioStatus = 0xe2,
    StopMotor = 0xe3,
    AudioBufferConfig = 0xe4,
}

impl DiIoctl {
    pub fn from_u8(v: u8) -> Option<Self> {
        use DiIoctl::*;
        Some(match v {
            0x12 => Inquiry,
            0x70 => ReadDiscId,
            0x71 => Read,
            0x79 => WaitForCoverClose,
            0x7a => GetCoverRegister,
            0x7e => NotifyReset,
            0x80 => ReadDvdPhysical,
            0x81 => ReadDvdCopyright,
            0x82 => ReadDvdDiscKey,
            0x86 => ClearCoverInterrupt,
            0x88 => GetCoverStatus,
            0x8a => Reset,
            0x8b => OpenPartition,
            0x8c => ClosePartition,
            0x8d => UnencryptedRead,
            0x8e => EnableDvdVideo,
            0xd2 => StopLaser,
            0xd9 => Offset,
            0xda => ReadBca,
            0xdb => RequestDiscStatus,
            0xdc => RequestRetryNumber,
            0xdd => SetMaximumRotation,
            0xdf => SerMeasControl,
            0xe0 => RequestError,
            0xe1 => AudioStreaming,
            0xe2 => RequestAudioStatus,
            0xe3 => StopMotor,
            0xe4 => AudioBufferConfig,
            _ => return None,
        })
    }

    /// Decodes an ioctl/ioctlv request number. Codes wider than a byte are never valid.
    pub fn from_request(request: u32) -> Option<Self> {
        u8::try_from(request).ok().and_then(Self::from_u8)
    }
}

/// A timed command as handed to the drive controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiCommand {
    pub command_0: u32,
    pub command_1: u32,
    pub command_2: u32,
    pub output_address: u32,
    pub output_length: u32,
}

impl DiCommand {
    pub fn opcode(&self) -> u8 {
        (self.command_0 >> 24) as u8
    }

    pub fn ioctl(&self) -> Option<DiIoctl> {
        DiIoctl::from_u8(self.opcode())
    }
}

/// Interrupt cause raised by the drive controller when a timed command finishes.
///
/// The numeric value is what the guest sees as the ioctl return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DiInterruptType {
    /// DEINT: the drive reported an error.
    DeviceError = 0,
    /// TCINT: transfer complete.
    TransferComplete = 1,
    /// BRKINT: the command was aborted.
    Break = 2,
    /// CVRINT: the lid was opened.
    CoverOpen = 3,
}

impl DiInterruptType {
    pub fn return_value(self) -> i32 {
        self as u32 as i32
    }
}

impl fmt::Display for DiInterruptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeviceError => "DEINT",
            Self::TransferComplete => "TCINT",
            Self::Break => "BRKINT",
            Self::CoverOpen => "CVRINT",
        };
        f.write_str(name)
    }
}
