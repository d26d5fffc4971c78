use std::collections::BTreeMap;

use thiserror::Error;

pub const SNAPSHOT_MAGIC: [u8; 4] = *b"IOSH";
pub const SNAPSHOT_FORMAT_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

const HEADER_LEN: usize = 16;
const FIELD_HEADER_LEN: usize = 6;

pub type SnapshotResult<T> = Result<T, SnapshotError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("unexpected end of snapshot data")]
    UnexpectedEof,

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported snapshot format version {found}")]
    UnsupportedFormatVersion { found: SnapshotVersion },

    #[error("snapshot device id mismatch (expected {expected:?}, found {found:?})")]
    DeviceIdMismatch { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported device major version {found} (supported {supported})")]
    UnsupportedDeviceMajorVersion { found: u16, supported: u16 },

    #[error("duplicate snapshot field tag {0}")]
    DuplicateFieldTag(u16),

    #[error("invalid field encoding: {0}")]
    InvalidFieldEncoding(&'static str),

    #[error("out of memory while decoding snapshot")]
    OutOfMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for SnapshotVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Fixed 16-byte snapshot header.
///
/// ```text
/// 0..4    magic "IOSH"
/// 4..8    format version (u16 major, u16 minor)
/// 8..12   device id
/// 12..16  device version (u16 major, u16 minor)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub format_version: SnapshotVersion,
    pub device_id: [u8; 4],
    pub device_version: SnapshotVersion,
}

impl SnapshotHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&self.format_version.major.to_le_bytes());
        out.extend_from_slice(&self.format_version.minor.to_le_bytes());
        out.extend_from_slice(&self.device_id);
        out.extend_from_slice(&self.device_version.major.to_le_bytes());
        out.extend_from_slice(&self.device_version.minor.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> SnapshotResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(SnapshotError::UnexpectedEof);
        }
        if bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        let u16_at = |off: usize| u16::from_le_bytes([bytes[off], bytes[off + 1]]);
        let format_version = SnapshotVersion::new(u16_at(4), u16_at(6));
        if format_version.major != SNAPSHOT_FORMAT_VERSION.major {
            return Err(SnapshotError::UnsupportedFormatVersion {
                found: format_version,
            });
        }
        let mut device_id = [0u8; 4];
        device_id.copy_from_slice(&bytes[8..12]);
        Ok(Self {
            format_version,
            device_id,
            device_version: SnapshotVersion::new(u16_at(12), u16_at(14)),
        })
    }
}

/// Builds a snapshot blob.
///
/// Fields are sorted by tag on [`SnapshotWriter::finish`], so the output does not depend on the
/// order in which a device emits them.
#[derive(Debug)]
pub struct SnapshotWriter {
    header: SnapshotHeader,
    fields: BTreeMap<u16, Vec<u8>>,
}

impl SnapshotWriter {
    pub fn new(device_id: [u8; 4], device_version: SnapshotVersion) -> Self {
        Self {
            header: SnapshotHeader {
                format_version: SNAPSHOT_FORMAT_VERSION,
                device_id,
                device_version,
            },
            fields: BTreeMap::new(),
        }
    }

    pub fn field_bytes(&mut self, tag: u16, bytes: Vec<u8>) {
        let prev = self.fields.insert(tag, bytes);
        debug_assert!(prev.is_none(), "snapshot field tag {tag} written twice");
    }

    pub fn field_u8(&mut self, tag: u16, v: u8) {
        self.field_bytes(tag, vec![v]);
    }

    pub fn field_u16(&mut self, tag: u16, v: u16) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_u32(&mut self, tag: u16, v: u32) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_u64(&mut self, tag: u16, v: u64) {
        self.field_bytes(tag, v.to_le_bytes().to_vec());
    }

    pub fn field_bool(&mut self, tag: u16, v: bool) {
        self.field_u8(tag, v as u8);
    }

    pub fn finish(self) -> Vec<u8> {
        let body_len: usize = self
            .fields
            .values()
            .map(|v| FIELD_HEADER_LEN + v.len())
            .sum();
        let mut out = Vec::with_capacity(HEADER_LEN + body_len);
        self.header.encode(&mut out);
        for (tag, value) in self.fields {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&(value.len() as u32).to_le_bytes());
            out.extend_from_slice(&value);
        }
        out
    }
}

/// Parsed view over a snapshot blob. Field payloads borrow from the input.
#[derive(Debug)]
pub struct SnapshotReader<'a> {
    header: SnapshotHeader,
    fields: BTreeMap<u16, &'a [u8]>,
}

impl<'a> SnapshotReader<'a> {
    pub fn parse(bytes: &'a [u8], expected_device_id: [u8; 4]) -> SnapshotResult<Self> {
        let header = SnapshotHeader::decode(bytes)?;
        if header.device_id != expected_device_id {
            return Err(SnapshotError::DeviceIdMismatch {
                expected: expected_device_id,
                found: header.device_id,
            });
        }

        let mut fields = BTreeMap::new();
        let mut rest = &bytes[HEADER_LEN..];
        while !rest.is_empty() {
            if rest.len() < FIELD_HEADER_LEN {
                return Err(SnapshotError::UnexpectedEof);
            }
            let tag = u16::from_le_bytes([rest[0], rest[1]]);
            let len = u32::from_le_bytes([rest[2], rest[3], rest[4], rest[5]]) as usize;
            rest = &rest[FIELD_HEADER_LEN..];
            if rest.len() < len {
                return Err(SnapshotError::UnexpectedEof);
            }
            let (value, tail) = rest.split_at(len);
            if fields.insert(tag, value).is_some() {
                return Err(SnapshotError::DuplicateFieldTag(tag));
            }
            rest = tail;
        }

        Ok(Self { header, fields })
    }

    pub fn header(&self) -> &SnapshotHeader {
        &self.header
    }

    pub fn ensure_device_major(&self, supported: u16) -> SnapshotResult<()> {
        let found = self.header.device_version.major;
        if found != supported {
            return Err(SnapshotError::UnsupportedDeviceMajorVersion { found, supported });
        }
        Ok(())
    }

    pub fn bytes(&self, tag: u16) -> Option<&'a [u8]> {
        self.fields.get(&tag).copied()
    }

    pub fn iter_fields(&self) -> impl Iterator<Item = (u16, &'a [u8])> + '_ {
        self.fields.iter().map(|(&tag, &v)| (tag, v))
    }

    fn fixed<const N: usize>(
        &self,
        tag: u16,
        what: &'static str,
    ) -> SnapshotResult<Option<[u8; N]>> {
        match self.bytes(tag) {
            None => Ok(None),
            Some(v) => {
                let arr: [u8; N] = v
                    .try_into()
                    .map_err(|_| SnapshotError::InvalidFieldEncoding(what))?;
                Ok(Some(arr))
            }
        }
    }

    pub fn u8(&self, tag: u16) -> SnapshotResult<Option<u8>> {
        Ok(self.fixed::<1>(tag, "u8 field")?.map(|v| v[0]))
    }

    pub fn u16(&self, tag: u16) -> SnapshotResult<Option<u16>> {
        Ok(self.fixed(tag, "u16 field")?.map(u16::from_le_bytes))
    }

    pub fn u32(&self, tag: u16) -> SnapshotResult<Option<u32>> {
        Ok(self.fixed(tag, "u32 field")?.map(u32::from_le_bytes))
    }

    pub fn u64(&self, tag: u16) -> SnapshotResult<Option<u64>> {
        Ok(self.fixed(tag, "u64 field")?.map(u64::from_le_bytes))
    }

    pub fn bool(&self, tag: u16) -> SnapshotResult<Option<bool>> {
        match self.u8(tag)? {
            None => Ok(None),
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            Some(_) => Err(SnapshotError::InvalidFieldEncoding("bool field")),
        }
    }
}
