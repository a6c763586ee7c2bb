// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted record layout.
//!
//! ```text
//! start_magic u32 | vendor_id u32 | metadata_version u8 | data_version u8 |
//! chip_type u8 | platform_type u8 | reserved u32 | metadata | payload
//! ```
//!
//! Records are self-delimiting: the metadata's `length` field gives the
//! payload size, so a stream of records can be walked with `RecordReader`.

use super::metadata::VersionedMetadata;
use super::types::MetadataVersion;
use crate::core::error::{CfrError, CfrResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Write};

pub const CFR_START_MAGIC: u32 = 0xDEAD_BEAF;
pub const VENDOR_QCA: u32 = 0x008c_fdf0;
pub const COMMON_HEADER_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub start_magic: u32,
    pub vendor_id: u32,
    pub data_version: u8,
    pub chip_type: u8,
    pub platform_type: u8,
    pub reserved: u32,
    pub metadata: VersionedMetadata,
}

impl RecordHeader {
    #[inline]
    pub fn metadata_version(&self) -> MetadataVersion {
        self.metadata.version()
    }

    #[inline]
    pub fn encoded_len(&self) -> usize {
        COMMON_HEADER_LEN + VersionedMetadata::encoded_len(self.metadata_version())
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.start_magic)?;
        w.write_u32::<LittleEndian>(self.vendor_id)?;
        w.write_u8(self.metadata_version().as_u8())?;
        w.write_u8(self.data_version)?;
        w.write_u8(self.chip_type)?;
        w.write_u8(self.platform_type)?;
        w.write_u32::<LittleEndian>(self.reserved)?;
        self.metadata.write_to(w)
    }
}

/// A complete capture record: header plus raw CFR payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfrRecord {
    pub header: RecordHeader,
    pub payload: Vec<u8>,
}

impl CfrRecord {
    #[inline]
    pub fn encoded_len(&self) -> usize {
        self.header.encoded_len() + self.payload.len()
    }

    /// Serialize header followed by payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        // Writing into a Vec cannot fail
        let _ = self.header.write_to(&mut out);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse one record from the front of `bytes`, returning it and the
    /// number of bytes consumed.
    pub fn parse(bytes: &[u8]) -> CfrResult<(CfrRecord, usize)> {
        if bytes.len() < COMMON_HEADER_LEN {
            return Err(CfrError::malformed_record(format!(
                "truncated header: {} bytes",
                bytes.len()
            )));
        }

        let mut cursor = Cursor::new(bytes);
        let start_magic = cursor.read_u32::<LittleEndian>()?;
        if start_magic != CFR_START_MAGIC {
            return Err(CfrError::malformed_record(format!(
                "bad start magic {:#010x}",
                start_magic
            )));
        }
        let vendor_id = cursor.read_u32::<LittleEndian>()?;
        let version = MetadataVersion::try_from(cursor.read_u8()?)
            .map_err(CfrError::malformed_record)?;
        let data_version = cursor.read_u8()?;
        let chip_type = cursor.read_u8()?;
        let platform_type = cursor.read_u8()?;
        let reserved = cursor.read_u32::<LittleEndian>()?;

        let metadata = VersionedMetadata::read_from(version, &mut cursor).map_err(|_| {
            CfrError::malformed_record(format!(
                "truncated v{} metadata",
                version.as_u8()
            ))
        })?;

        let start = cursor.position() as usize;
        let end = start + metadata.payload_len() as usize;
        if end > bytes.len() {
            return Err(CfrError::malformed_record(format!(
                "payload declares {} bytes, {} available",
                metadata.payload_len(),
                bytes.len() - start
            )));
        }

        let record = CfrRecord {
            header: RecordHeader {
                start_magic,
                vendor_id,
                data_version,
                chip_type,
                platform_type,
                reserved,
                metadata,
            },
            payload: bytes[start..end].to_vec(),
        };
        Ok((record, end))
    }
}

/// Iterator over a concatenated record stream
pub struct RecordReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for RecordReader<'_> {
    type Item = CfrResult<CfrRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        match CfrRecord::parse(&self.bytes[self.offset..]) {
            Ok((record, consumed)) => {
                self.offset += consumed;
                Some(Ok(record))
            }
            Err(e) => {
                // A corrupt record makes the rest of the stream unaddressable
                self.offset = self.bytes.len();
                Some(Err(e))
            }
        }
    }
}
