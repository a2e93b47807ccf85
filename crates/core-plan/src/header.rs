//! Plan header: job identity, scheduling metadata and optional blob attributes

use crate::error::{Error, Result};
use crate::layout::{
    self, blob, get_u16, get_u32, get_u64, header, put_u16, put_u32, put_u64, put_u8,
    MAX_METADATA, MAX_SHORT_ATTRIBUTE,
};
use crate::priority::Priority;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 16-byte job identifier, assigned once by whoever creates the job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random job identifier
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }

    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        JobId(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobId {
    fn from(id: Uuid) -> Self {
        JobId(id)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

/// Kind of endpoint a transfer reads from or writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LocationType {
    #[default]
    Unknown = 0,
    /// Local filesystem
    Local = 1,
    /// Object storage
    Blob = 2,
    /// Remote file share
    File = 3,
}

impl TryFrom<u8> for LocationType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(LocationType::Unknown),
            1 => Ok(LocationType::Local),
            2 => Ok(LocationType::Blob),
            3 => Ok(LocationType::File),
            other => Err(Error::corrupt(format!("unknown location type {}", other))),
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationType::Unknown => write!(f, "unknown"),
            LocationType::Local => write!(f, "local"),
            LocationType::Blob => write!(f, "blob"),
            LocationType::File => write!(f, "file"),
        }
    }
}

/// Log verbosity recorded for a job part
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum LogSeverity {
    None = 0,
    Fatal = 1,
    Panic = 2,
    Error = 3,
    #[default]
    Warning = 4,
    Info = 5,
    Debug = 6,
}

impl LogSeverity {
    /// Closest tracing level, `None` when the part asked for no logging
    pub fn to_tracing_level(self) -> Option<tracing::Level> {
        match self {
            LogSeverity::None => None,
            LogSeverity::Fatal | LogSeverity::Panic | LogSeverity::Error => {
                Some(tracing::Level::ERROR)
            }
            LogSeverity::Warning => Some(tracing::Level::WARN),
            LogSeverity::Info => Some(tracing::Level::INFO),
            LogSeverity::Debug => Some(tracing::Level::DEBUG),
        }
    }
}

impl TryFrom<u32> for LogSeverity {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(LogSeverity::None),
            1 => Ok(LogSeverity::Fatal),
            2 => Ok(LogSeverity::Panic),
            3 => Ok(LogSeverity::Error),
            4 => Ok(LogSeverity::Warning),
            5 => Ok(LogSeverity::Info),
            6 => Ok(LogSeverity::Debug),
            other => Err(Error::corrupt(format!("unknown log severity {}", other))),
        }
    }
}

/// Destination-specific optional attributes
///
/// Lengths are checked against the fixed buffer capacities when a value is
/// set, so a `BlobData` always fits its on-disk block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobData {
    content_type: Vec<u8>,
    content_encoding: Vec<u8>,
    metadata: Vec<u8>,
    block_size: u64,
}

impl BlobData {
    /// Default chunking granularity (8 MiB)
    pub const DEFAULT_BLOCK_SIZE: u64 = 8 * 1024 * 1024;

    /// Create an attribute block with the given block size and no attributes
    pub fn new(block_size: u64) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::invalid_transfer("block size must be non-zero"));
        }
        Ok(Self {
            content_type: Vec::new(),
            content_encoding: Vec::new(),
            metadata: Vec::new(),
            block_size,
        })
    }

    pub fn with_content_type(mut self, value: impl AsRef<[u8]>) -> Result<Self> {
        self.content_type = bounded("ContentType", value.as_ref(), MAX_SHORT_ATTRIBUTE)?;
        Ok(self)
    }

    pub fn with_content_encoding(mut self, value: impl AsRef<[u8]>) -> Result<Self> {
        self.content_encoding = bounded("ContentEncoding", value.as_ref(), MAX_SHORT_ATTRIBUTE)?;
        Ok(self)
    }

    pub fn with_metadata(mut self, value: impl AsRef<[u8]>) -> Result<Self> {
        self.metadata = bounded("MetaData", value.as_ref(), MAX_METADATA)?;
        Ok(self)
    }

    pub fn content_type(&self) -> &[u8] {
        &self.content_type
    }

    pub fn content_encoding(&self) -> &[u8] {
        &self.content_encoding
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Number of chunks a source of `size` bytes splits into (at least one)
    pub fn chunks_for(&self, size: u64) -> u64 {
        size.div_ceil(self.block_size).max(1)
    }

    pub(crate) fn encode(&self, block: &mut [u8]) {
        put_u8(block, blob::CONTENT_TYPE_LENGTH, self.content_type.len() as u8);
        block[blob::CONTENT_TYPE..blob::CONTENT_TYPE + self.content_type.len()]
            .copy_from_slice(&self.content_type);
        put_u8(
            block,
            blob::CONTENT_ENCODING_LENGTH,
            self.content_encoding.len() as u8,
        );
        block[blob::CONTENT_ENCODING..blob::CONTENT_ENCODING + self.content_encoding.len()]
            .copy_from_slice(&self.content_encoding);
        put_u16(block, blob::METADATA_LENGTH, self.metadata.len() as u16);
        block[blob::METADATA..blob::METADATA + self.metadata.len()].copy_from_slice(&self.metadata);
        put_u64(block, blob::BLOCK_SIZE, self.block_size);
    }

    pub(crate) fn decode(block: &[u8]) -> Result<Self> {
        let content_type_len = block[blob::CONTENT_TYPE_LENGTH] as usize;
        let content_encoding_len = block[blob::CONTENT_ENCODING_LENGTH] as usize;
        let metadata_len = get_u16(block, blob::METADATA_LENGTH) as usize;
        if metadata_len > MAX_METADATA {
            return Err(Error::corrupt(format!(
                "MetaDataLength {} exceeds capacity {}",
                metadata_len, MAX_METADATA
            )));
        }
        let block_size = get_u64(block, blob::BLOCK_SIZE);
        if block_size == 0 {
            return Err(Error::corrupt("BlockSize is zero"));
        }

        // A u8 length can never exceed the 256-byte buffers
        Ok(Self {
            content_type: block[blob::CONTENT_TYPE..blob::CONTENT_TYPE + content_type_len].to_vec(),
            content_encoding: block
                [blob::CONTENT_ENCODING..blob::CONTENT_ENCODING + content_encoding_len]
                .to_vec(),
            metadata: block[blob::METADATA..blob::METADATA + metadata_len].to_vec(),
            block_size,
        })
    }
}

impl Default for BlobData {
    fn default() -> Self {
        Self {
            content_type: Vec::new(),
            content_encoding: Vec::new(),
            metadata: Vec::new(),
            block_size: Self::DEFAULT_BLOCK_SIZE,
        }
    }
}

fn bounded(field: &'static str, value: &[u8], capacity: usize) -> Result<Vec<u8>> {
    if value.len() > capacity {
        return Err(Error::attribute_too_long(field, value.len(), capacity));
    }
    Ok(value.to_vec())
}

/// Immutable header fields of a plan file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanHeader {
    pub version: u32,
    pub job_id: JobId,
    pub part_num: u32,
    /// No further parts will be appended to this job
    pub is_final_part: bool,
    pub priority: Priority,
    /// Seconds to keep the file after the part reaches a terminal status
    pub ttl_after_completion: u32,
    pub src_location: LocationType,
    pub dst_location: LocationType,
    pub num_transfers: u32,
    pub log_severity: LogSeverity,
    pub blob_data: BlobData,
}

impl PlanHeader {
    /// Write every immutable field into `buf[0..JOB_STATUS)`
    pub(crate) fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, header::VERSION, self.version);
        buf[header::JOB_ID..header::JOB_ID + 16].copy_from_slice(self.job_id.as_bytes());
        put_u32(buf, header::PART_NUM, self.part_num);
        put_u8(buf, header::IS_FINAL_PART, self.is_final_part as u8);
        put_u8(buf, header::PRIORITY, self.priority.as_u8());
        put_u32(buf, header::TTL_AFTER_COMPLETION, self.ttl_after_completion);
        put_u8(buf, header::SRC_LOCATION_TYPE, self.src_location as u8);
        put_u8(buf, header::DST_LOCATION_TYPE, self.dst_location as u8);
        put_u32(buf, header::NUM_TRANSFERS, self.num_transfers);
        put_u32(buf, header::LOG_SEVERITY, self.log_severity as u32);
        self.blob_data
            .encode(&mut buf[header::BLOB_DATA..header::BLOB_DATA + layout::BLOB_DATA_SIZE]);
    }

    /// Decode the immutable header bytes, rejecting values outside closed sets
    ///
    /// The version is decoded as-is; comparing it is the caller's job.
    pub(crate) fn decode(buf: &[u8]) -> Result<Self> {
        let mut job_id = [0u8; 16];
        job_id.copy_from_slice(&buf[header::JOB_ID..header::JOB_ID + 16]);

        let is_final_part = match buf[header::IS_FINAL_PART] {
            0 => false,
            1 => true,
            other => {
                return Err(Error::corrupt(format!("IsFinalPart byte is {}", other)));
            }
        };

        Ok(Self {
            version: get_u32(buf, header::VERSION),
            job_id: JobId::from_bytes(job_id),
            part_num: get_u32(buf, header::PART_NUM),
            is_final_part,
            priority: Priority::try_from(buf[header::PRIORITY])?,
            ttl_after_completion: get_u32(buf, header::TTL_AFTER_COMPLETION),
            src_location: LocationType::try_from(buf[header::SRC_LOCATION_TYPE])?,
            dst_location: LocationType::try_from(buf[header::DST_LOCATION_TYPE])?,
            num_transfers: get_u32(buf, header::NUM_TRANSFERS),
            log_severity: LogSeverity::try_from(get_u32(buf, header::LOG_SEVERITY))?,
            blob_data: BlobData::decode(
                &buf[header::BLOB_DATA..header::BLOB_DATA + layout::BLOB_DATA_SIZE],
            )?,
        })
    }
}
