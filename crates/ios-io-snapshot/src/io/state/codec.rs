//! Little-endian field payload encoding.
//!
//! TLV fields carry opaque byte payloads; structured payloads are built with [`Encoder`] and read
//! back with [`Decoder`]. Decoders must consume the payload exactly ([`Decoder::finish`]).

use super::{SnapshotError, SnapshotResult};

#[derive(Debug, Default, Clone)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bool(self, v: bool) -> Self {
        self.u8(v as u8)
    }

    pub fn bytes(mut self, v: &[u8]) -> Self {
        self.buf.extend_from_slice(v);
        self
    }

    /// Length-prefixed (`u32`) list of `u32` values.
    pub fn vec_u32(mut self, v: &[u32]) -> Self {
        self = self.u32(v.len() as u32);
        for &x in v {
            self = self.u32(x);
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn bytes(&mut self, len: usize) -> SnapshotResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(SnapshotError::UnexpectedEof);
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn bytes_vec(&mut self, len: usize) -> SnapshotResult<Vec<u8>> {
        let src = self.bytes(len)?;
        let mut out = Vec::new();
        out.try_reserve_exact(len)
            .map_err(|_| SnapshotError::OutOfMemory)?;
        out.extend_from_slice(src);
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> SnapshotResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> SnapshotResult<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn u16(&mut self) -> SnapshotResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> SnapshotResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> SnapshotResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn bool(&mut self) -> SnapshotResult<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(SnapshotError::InvalidFieldEncoding("bool")),
        }
    }

    /// Reads a list written by [`Encoder::vec_u32`], rejecting counts above `max`.
    pub fn vec_u32(&mut self, max: usize, what: &'static str) -> SnapshotResult<Vec<u32>> {
        let count = self.u32()? as usize;
        if count > max {
            return Err(SnapshotError::InvalidFieldEncoding(what));
        }
        // Each entry is 4 bytes; a short payload cannot hold `count` entries.
        if count.saturating_mul(4) > self.remaining() {
            return Err(SnapshotError::UnexpectedEof);
        }
        let mut out = Vec::new();
        out.try_reserve_exact(count)
            .map_err(|_| SnapshotError::OutOfMemory)?;
        for _ in 0..count {
            out.push(self.u32()?);
        }
        Ok(out)
    }

    pub fn finish(self) -> SnapshotResult<()> {
        if self.pos != self.buf.len() {
            return Err(SnapshotError::InvalidFieldEncoding("trailing bytes"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_reads_what_encoder_wrote() {
        let buf = Encoder::new()
            .u8(0xab)
            .u16(0x1234)
            .u32(0xdead_beef)
            .u64(0x0102_0304_0506_0708)
            .bool(true)
            .vec_u32(&[7, 8, 9])
            .finish();

        let mut d = Decoder::new(&buf);
        assert_eq!(d.u8().unwrap(), 0xab);
        assert_eq!(d.u16().unwrap(), 0x1234);
        assert_eq!(d.u32().unwrap(), 0xdead_beef);
        assert_eq!(d.u64().unwrap(), 0x0102_0304_0506_0708);
        assert!(d.bool().unwrap());
        assert_eq!(d.vec_u32(16, "list").unwrap(), vec![7, 8, 9]);
        d.finish().unwrap();
    }

    #[test]
    fn decoder_rejects_truncated_and_trailing_input() {
        let mut d = Decoder::new(&[1, 2, 3]);
        assert_eq!(d.u32(), Err(SnapshotError::UnexpectedEof));

        let mut d = Decoder::new(&[1, 2, 3]);
        d.u16().unwrap();
        assert_eq!(
            d.finish(),
            Err(SnapshotError::InvalidFieldEncoding("trailing bytes"))
        );
    }

    #[test]
    fn bool_must_be_zero_or_one() {
        let mut d = Decoder::new(&[2]);
        assert_eq!(d.bool(), Err(SnapshotError::InvalidFieldEncoding("bool")));
    }

    #[test]
    fn vec_u32_count_is_bounded_before_allocating() {
        let buf = Encoder::new().u32(u32::MAX).finish();
        let mut d = Decoder::new(&buf);
        assert_eq!(
            d.vec_u32(1024, "list count"),
            Err(SnapshotError::InvalidFieldEncoding("list count"))
        );

        // In bounds, but the payload is too short for the claimed count.
        let buf = Encoder::new().u32(4).u32(1).finish();
        let mut d = Decoder::new(&buf);
        assert_eq!(d.vec_u32(1024, "list count"), Err(SnapshotError::UnexpectedEof));
    }
}
