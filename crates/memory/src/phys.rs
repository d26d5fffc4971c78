use thiserror::Error;

/// Errors returned by [`GuestMemory`] backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuestMemoryError {
    /// The requested address range is outside the guest physical memory size.
    #[error("guest memory access out of range: paddr=0x{paddr:x} len={len} size=0x{size:x}")]
    OutOfRange { paddr: u64, len: usize, size: u64 },
    /// The requested size cannot be represented by the current platform's `usize`.
    #[error("guest memory size {size} does not fit in usize")]
    SizeTooLarge { size: u64 },
}

pub type GuestMemoryResult<T> = Result<T, GuestMemoryError>;

/// Guest *physical* memory storage.
///
/// The emulated CPU is big-endian, so every word shared with the guest (IPC descriptors, vector
/// tables, command words) goes through the `_be` word helpers.
pub trait GuestMemory {
    fn size(&self) -> u64;

    /// Reads bytes from guest physical memory into `dst`.
    fn read_into(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()>;

    /// Writes bytes from `src` into guest physical memory.
    fn write_from(&mut self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()>;

    /// Fills `len` bytes starting at `paddr` with `value`.
    ///
    /// The whole range is validated before anything is written.
    fn fill(&mut self, paddr: u64, len: usize, value: u8) -> GuestMemoryResult<()> {
        check_range(self.size(), paddr, len)?;
        const CHUNK: usize = 4096;
        let buf = [value; CHUNK];
        let mut offset = 0usize;
        while offset < len {
            let n = (len - offset).min(CHUNK);
            self.write_from(paddr + offset as u64, &buf[..n])?;
            offset += n;
        }
        Ok(())
    }

    fn zero(&mut self, paddr: u64, len: usize) -> GuestMemoryResult<()> {
        self.fill(paddr, len, 0)
    }

    fn read_u32_be(&self, paddr: u64) -> GuestMemoryResult<u32> {
        let mut buf = [0u8; 4];
        self.read_into(paddr, &mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn write_u32_be(&mut self, paddr: u64, value: u32) -> GuestMemoryResult<()> {
        self.write_from(paddr, &value.to_be_bytes())
    }
}

fn check_range(size: u64, paddr: u64, len: usize) -> GuestMemoryResult<()> {
    let len_u64 = len as u64;
    let end = paddr
        .checked_add(len_u64)
        .ok_or(GuestMemoryError::OutOfRange { paddr, len, size })?;
    if end > size {
        return Err(GuestMemoryError::OutOfRange { paddr, len, size });
    }
    Ok(())
}

/// Dense (contiguous) guest memory.
#[derive(Debug, Clone)]
pub struct DenseMemory {
    data: Box<[u8]>,
}

impl DenseMemory {
    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        let size_usize =
            usize::try_from(size).map_err(|_| GuestMemoryError::SizeTooLarge { size })?;
        Ok(Self {
            data: vec![0u8; size_usize].into_boxed_slice(),
        })
    }

    /// Raw view of the whole backing store.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn range_to_usize(&self, paddr: u64, len: usize) -> GuestMemoryResult<(usize, usize)> {
        check_range(self.size(), paddr, len)?;
        let start = usize::try_from(paddr).map_err(|_| GuestMemoryError::OutOfRange {
            paddr,
            len,
            size: self.size(),
        })?;
        let end = start.checked_add(len).ok_or(GuestMemoryError::OutOfRange {
            paddr,
            len,
            size: self.size(),
        })?;
        Ok((start, end))
    }
}

impl GuestMemory for DenseMemory {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_into(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        let (start, end) = self.range_to_usize(paddr, dst.len())?;
        dst.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_from(&mut self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()> {
        let (start, end) = self.range_to_usize(paddr, src.len())?;
        self.data[start..end].copy_from_slice(src);
        Ok(())
    }

    fn fill(&mut self, paddr: u64, len: usize, value: u8) -> GuestMemoryResult<()> {
        let (start, end) = self.range_to_usize(paddr, len)?;
        self.data[start..end].fill(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_words_are_big_endian() {
        let mut mem = DenseMemory::new(64).unwrap();

        mem.write_u32_be(4, 0x1122_3344).unwrap();
        assert_eq!(&mem.as_slice()[4..8], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(mem.read_u32_be(4).unwrap(), 0x1122_3344);

        mem.write_from(8, &[0xaa, 0xbb, 0xcc, 0xdd]).unwrap();
        assert_eq!(mem.read_u32_be(8).unwrap(), 0xaabb_ccdd);
    }

    #[test]
    fn dense_unaligned_access() {
        let mut mem = DenseMemory::new(64).unwrap();

        mem.write_u32_be(1, 0xdead_beef).unwrap();
        mem.write_u32_be(9, 0xcafe_f00d).unwrap();

        assert_eq!(mem.read_u32_be(1).unwrap(), 0xdead_beef);
        assert_eq!(mem.read_u32_be(9).unwrap(), 0xcafe_f00d);
    }

    #[test]
    fn zero_clears_exactly_the_requested_range() {
        let mut mem = DenseMemory::new(32).unwrap();
        mem.write_from(0, &[0xffu8; 32]).unwrap();

        mem.zero(8, 8).unwrap();

        assert!(mem.as_slice()[..8].iter().all(|&b| b == 0xff));
        assert!(mem.as_slice()[8..16].iter().all(|&b| b == 0));
        assert!(mem.as_slice()[16..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn default_fill_crosses_chunk_boundaries() {
        // Exercise the provided `fill` via a backend that does not override it.
        struct Plain(Vec<u8>);

        impl GuestMemory for Plain {
            fn size(&self) -> u64 {
                self.0.len() as u64
            }

            fn read_into(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
                check_range(self.size(), paddr, dst.len())?;
                let start = paddr as usize;
                dst.copy_from_slice(&self.0[start..start + dst.len()]);
                Ok(())
            }

            fn write_from(&mut self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()> {
                check_range(self.size(), paddr, src.len())?;
                let start = paddr as usize;
                self.0[start..start + src.len()].copy_from_slice(src);
                Ok(())
            }
        }

        let mut mem = Plain(vec![0u8; 10_000]);
        mem.fill(100, 9000, 0x5a).unwrap();

        assert_eq!(mem.0[99], 0);
        assert!(mem.0[100..9100].iter().all(|&b| b == 0x5a));
        assert_eq!(mem.0[9100], 0);
    }

    #[test]
    fn out_of_range_returns_error_without_panicking() {
        let mut dense = DenseMemory::new(16).unwrap();
        assert!(matches!(
            dense.read_u32_be(14),
            Err(GuestMemoryError::OutOfRange { .. })
        ));
        assert!(matches!(
            dense.write_u32_be(13, 0),
            Err(GuestMemoryError::OutOfRange { .. })
        ));
        assert!(matches!(
            dense.zero(8, 9),
            Err(GuestMemoryError::OutOfRange { .. })
        ));
        assert!(matches!(
            dense.zero(u64::MAX, 2),
            Err(GuestMemoryError::OutOfRange { .. })
        ));
        // Nothing was written by the rejected fill.
        assert!(dense.as_slice().iter().all(|&b| b == 0));
    }
}
