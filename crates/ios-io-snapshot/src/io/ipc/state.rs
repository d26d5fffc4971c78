use crate::io::state::codec::{Decoder, Encoder};
use crate::io::state::{
    IoSnapshot, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};

// ----------------------------------------
// Disc interface (/dev/di)
// ----------------------------------------

/// Persisted state of the `/dev/di` IPC device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiDeviceState {
    /// Whether the guest currently holds the device open.
    pub active: bool,
    /// Guest addresses of pending ioctl requests, oldest first. The first entry is the command
    /// currently executing on the drive controller.
    pub commands_to_execute: Vec<u32>,
}

impl IoSnapshot for DiDeviceState {
    const DEVICE_ID: [u8; 4] = *b"DI00";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        const TAG_ACTIVE: u16 = 1;
        const TAG_COMMANDS: u16 = 2;

        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_bool(TAG_ACTIVE, self.active);
        w.field_bytes(
            TAG_COMMANDS,
            Encoder::new().vec_u32(&self.commands_to_execute).finish(),
        );
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        const TAG_ACTIVE: u16 = 1;
        const TAG_COMMANDS: u16 = 2;

        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        // Decode into locals first so a corrupt snapshot leaves `self` untouched.
        let active = r.bool(TAG_ACTIVE)?.unwrap_or(false);
        let commands = match r.bytes(TAG_COMMANDS) {
            Some(buf) => {
                // The queue has no capacity limit, so the only bound on the count is what the
                // payload can actually hold.
                let max_commands = buf.len().saturating_sub(4) / 4;
                let mut d = Decoder::new(buf);
                let commands = d.vec_u32(max_commands, "di command count")?;
                d.finish()?;
                commands
            }
            None => Vec::new(),
        };

        self.active = active;
        self.commands_to_execute = commands;
        Ok(())
    }
}
