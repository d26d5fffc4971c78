//! Guest physical memory access shared by the IOS HLE device models.

mod phys;

pub use phys::{DenseMemory, GuestMemory, GuestMemoryError, GuestMemoryResult};
