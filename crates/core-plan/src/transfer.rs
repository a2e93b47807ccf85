//! Per-transfer records

use crate::error::{Error, Result};
use crate::layout::{get_u16, get_u32, get_u64, put_u16, put_u32, put_u64, transfer};
use serde::{Deserialize, Serialize};

/// One source-to-destination transfer handed to the builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSpec {
    pub source: String,
    pub destination: String,
    /// Size of the source in bytes
    pub source_size: u64,
    /// Last-modified time of the source (Unix seconds) captured before transfer
    pub modified_time: u32,
}

impl TransferSpec {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        source_size: u64,
        modified_time: u32,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            source_size,
            modified_time,
        }
    }
}

/// Immutable fields of a transfer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// File offset of this transfer's source path; destination follows it
    pub offset: u64,
    pub src_length: u16,
    pub dst_length: u16,
    pub chunk_num: u16,
    pub modified_time: u32,
    pub source_size: u64,
}

impl TransferRecord {
    /// Byte range of the source path inside the file
    pub fn source_range(&self) -> std::ops::Range<u64> {
        self.offset..self.offset + self.src_length as u64
    }

    /// Byte range of the destination path inside the file
    pub fn destination_range(&self) -> std::ops::Range<u64> {
        let start = self.offset + self.src_length as u64;
        start..start + self.dst_length as u64
    }

    /// First byte after both paths, `None` when `offset` is so large the
    /// end does not fit in a u64
    pub fn strings_end(&self) -> Option<u64> {
        self.offset
            .checked_add(self.src_length as u64)?
            .checked_add(self.dst_length as u64)
    }

    /// Fill a zeroed record slot; status and completion time stay zero
    pub(crate) fn encode(&self, record: &mut [u8]) {
        put_u64(record, transfer::OFFSET, self.offset);
        put_u16(record, transfer::SRC_LENGTH, self.src_length);
        put_u16(record, transfer::DST_LENGTH, self.dst_length);
        put_u16(record, transfer::CHUNK_NUM, self.chunk_num);
        put_u32(record, transfer::MODIFIED_TIME, self.modified_time);
        put_u64(record, transfer::SOURCE_SIZE, self.source_size);
    }

    /// Decode the immutable prefix `[0, COMPLETION_TIME)` of a record
    pub(crate) fn decode(record: &[u8]) -> Self {
        Self {
            offset: get_u64(record, transfer::OFFSET),
            src_length: get_u16(record, transfer::SRC_LENGTH),
            dst_length: get_u16(record, transfer::DST_LENGTH),
            chunk_num: get_u16(record, transfer::CHUNK_NUM),
            modified_time: get_u32(record, transfer::MODIFIED_TIME),
            source_size: get_u64(record, transfer::SOURCE_SIZE),
        }
    }
}

pub(crate) fn path_len(kind: &str, path: &str) -> Result<u16> {
    if path.is_empty() {
        return Err(Error::invalid_transfer(format!("{} path is empty", kind)));
    }
    u16::try_from(path.len()).map_err(|_| {
        Error::invalid_transfer(format!(
            "{} path is {} bytes, limit is {}",
            kind,
            path.len(),
            u16::MAX
        ))
    })
}
