#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use ios_devices_di::{
    DiBackends, DiCommand, DiConfig, DiController, DiDevice, DiscImage, ReplyQueue, TmdVerifier,
    VerifyError,
};
use memory::{DenseMemory, GuestMemory};

pub const MEM_SIZE: u64 = 0x1_0000;

pub const IPC_OPEN: u32 = 1;
pub const IPC_CLOSE: u32 = 2;
pub const IPC_READ: u32 = 3;
pub const IPC_IOCTL: u32 = 6;
pub const IPC_IOCTLV: u32 = 7;

pub const DI_OPEN_PARTITION: u32 = 0x8b;
pub const DI_READ: u32 = 0x71;

/// Every execution the controller was asked to start, in order.
pub type Executions = Rc<RefCell<Vec<(DiCommand, bool)>>>;

struct RecordingController {
    executed: Executions,
}

impl DiController for RecordingController {
    fn execute_command(&mut self, _mem: &mut dyn GuestMemory, command: DiCommand, reply: bool) {
        self.executed.borrow_mut().push((command, reply));
    }
}

struct FakeDisc {
    tmd: Vec<u8>,
    partitions: Rc<RefCell<Vec<u64>>>,
}

impl DiscImage for FakeDisc {
    fn change_partition(&mut self, offset: u64) {
        self.partitions.borrow_mut().push(offset);
    }

    fn tmd(&self) -> Vec<u8> {
        self.tmd.clone()
    }
}

struct RecordingVerifier {
    seen: Rc<RefCell<Vec<Vec<u8>>>>,
    reject: bool,
}

impl TmdVerifier for RecordingVerifier {
    fn di_verify(&mut self, tmd: &[u8]) -> Result<(), VerifyError> {
        self.seen.borrow_mut().push(tmd.to_vec());
        if self.reject {
            return Err(VerifyError::Rejected("bad signature".to_string()));
        }
        Ok(())
    }
}

struct RecordingReplies {
    replies: Rc<RefCell<Vec<u32>>>,
}

impl ReplyQueue for RecordingReplies {
    fn enqueue_reply(&mut self, request_address: u32) {
        self.replies.borrow_mut().push(request_address);
    }
}

pub struct Harness {
    pub dev: DiDevice,
    pub mem: DenseMemory,
    pub executed: Executions,
    pub partitions: Rc<RefCell<Vec<u64>>>,
    pub verified: Rc<RefCell<Vec<Vec<u8>>>>,
    pub replies: Rc<RefCell<Vec<u32>>>,
}

pub fn sample_tmd() -> Vec<u8> {
    (0..0x40u8).map(|i| i.wrapping_mul(7) ^ 0x5a).collect()
}

impl Harness {
    pub fn new() -> Self {
        Self::build(DiConfig::default(), sample_tmd(), false)
    }

    pub fn with_config(config: DiConfig) -> Self {
        Self::build(config, sample_tmd(), false)
    }

    pub fn with_rejecting_verifier() -> Self {
        Self::build(DiConfig::default(), sample_tmd(), true)
    }

    fn build(config: DiConfig, tmd: Vec<u8>, reject: bool) -> Self {
        let executed = Executions::default();
        let partitions = Rc::new(RefCell::new(Vec::new()));
        let verified = Rc::new(RefCell::new(Vec::new()));
        let replies = Rc::new(RefCell::new(Vec::new()));

        let dev = DiDevice::new(
            config,
            DiBackends {
                controller: Box::new(RecordingController {
                    executed: executed.clone(),
                }),
                disc: Box::new(FakeDisc {
                    tmd,
                    partitions: partitions.clone(),
                }),
                verifier: Box::new(RecordingVerifier {
                    seen: verified.clone(),
                    reject,
                }),
                replies: Box::new(RecordingReplies {
                    replies: replies.clone(),
                }),
            },
        );

        Self {
            dev,
            mem: DenseMemory::new(MEM_SIZE).unwrap(),
            executed,
            partitions,
            verified,
            replies,
        }
    }

    pub fn execution_count(&self) -> usize {
        self.executed.borrow().len()
    }

    pub fn return_value(&self, request_address: u32) -> i32 {
        self.mem.read_u32_be(u64::from(request_address) + 4).unwrap() as i32
    }
}

/// Writes an ioctl descriptor at `address` whose 12-byte input buffer (the three command words)
/// sits right behind it at `address + 0x20`.
pub fn write_ioctl(
    mem: &mut DenseMemory,
    address: u32,
    words: [u32; 3],
    buffer_out: u32,
    buffer_out_size: u32,
) {
    let base = u64::from(address);
    let buffer_in = address + 0x20;
    mem.write_u32_be(base, IPC_IOCTL).unwrap();
    mem.write_u32_be(base + 0x04, 0xdead_beef).unwrap();
    mem.write_u32_be(base + 0x08, 3).unwrap();
    mem.write_u32_be(base + 0x0c, words[0] >> 24).unwrap();
    mem.write_u32_be(base + 0x10, buffer_in).unwrap();
    mem.write_u32_be(base + 0x14, 12).unwrap();
    mem.write_u32_be(base + 0x18, buffer_out).unwrap();
    mem.write_u32_be(base + 0x1c, buffer_out_size).unwrap();
    for (i, w) in words.iter().enumerate() {
        mem.write_u32_be(u64::from(buffer_in) + i as u64 * 4, *w).unwrap();
    }
}

/// Writes an ioctlv descriptor at `address` with its vector table at `table`.
pub fn write_ioctlv(
    mem: &mut DenseMemory,
    address: u32,
    request: u32,
    table: u32,
    in_vectors: &[(u32, u32)],
    io_vectors: &[(u32, u32)],
) {
    let base = u64::from(address);
    mem.write_u32_be(base, IPC_IOCTLV).unwrap();
    mem.write_u32_be(base + 0x04, 0xdead_beef).unwrap();
    mem.write_u32_be(base + 0x08, 3).unwrap();
    mem.write_u32_be(base + 0x0c, request).unwrap();
    mem.write_u32_be(base + 0x10, in_vectors.len() as u32).unwrap();
    mem.write_u32_be(base + 0x14, io_vectors.len() as u32).unwrap();
    mem.write_u32_be(base + 0x18, table).unwrap();
    for (i, (addr, size)) in in_vectors.iter().chain(io_vectors).enumerate() {
        let entry = u64::from(table) + i as u64 * 8;
        mem.write_u32_be(entry, *addr).unwrap();
        mem.write_u32_be(entry + 4, *size).unwrap();
    }
}

/// Address of the `n`th test ioctl descriptor; each gets a 0x40-byte slot.
pub fn ioctl_slot(n: usize) -> u32 {
    0x1000 + n as u32 * 0x40
}
