//! Byte layout of a Job Part Plan file
//!
//! ```text
//! [0, HEADER_SIZE)                                   header (BlobData embedded)
//! [HEADER_SIZE + i*TRANSFER_SIZE, +TRANSFER_SIZE)    transfer record i
//! [string_pool_offset(n), file end)                  source/destination paths
//! ```
//!
//! All integers are little-endian at their natural alignment. Padding bytes
//! are written as zero. The mutable words of each structure sit after all of
//! its immutable bytes so read-only views never overlap a word that workers
//! store to.

/// Header field offsets
pub mod header {
    pub const VERSION: usize = 0;
    pub const JOB_ID: usize = 4;
    pub const PART_NUM: usize = 20;
    pub const IS_FINAL_PART: usize = 24;
    pub const PRIORITY: usize = 25;
    pub const TTL_AFTER_COMPLETION: usize = 28;
    pub const SRC_LOCATION_TYPE: usize = 32;
    pub const DST_LOCATION_TYPE: usize = 33;
    pub const NUM_TRANSFERS: usize = 36;
    pub const LOG_SEVERITY: usize = 40;
    pub const BLOB_DATA: usize = 48;
    pub const JOB_STATUS: usize = BLOB_DATA + super::blob::SIZE;
    pub const SIZE: usize = JOB_STATUS + 8;
}

/// BlobData offsets, relative to the start of the block
pub mod blob {
    pub const CONTENT_TYPE_LENGTH: usize = 0;
    pub const CONTENT_TYPE: usize = 1;
    pub const CONTENT_ENCODING_LENGTH: usize = CONTENT_TYPE + super::MAX_CONTENT_TYPE;
    pub const CONTENT_ENCODING: usize = CONTENT_ENCODING_LENGTH + 1;
    pub const METADATA_LENGTH: usize = CONTENT_ENCODING + super::MAX_CONTENT_ENCODING;
    pub const METADATA: usize = METADATA_LENGTH + 2;
    pub const BLOCK_SIZE: usize = 1520;
    pub const SIZE: usize = BLOCK_SIZE + 8;
}

/// Transfer record offsets, relative to the start of the record
pub mod transfer {
    pub const OFFSET: usize = 0;
    pub const SRC_LENGTH: usize = 8;
    pub const DST_LENGTH: usize = 10;
    pub const CHUNK_NUM: usize = 12;
    pub const MODIFIED_TIME: usize = 16;
    pub const SOURCE_SIZE: usize = 24;
    pub const COMPLETION_TIME: usize = 32;
    pub const TRANSFER_STATUS: usize = 40;
    pub const SIZE: usize = 48;
}

/// Capacity of the ContentType buffer
pub const MAX_CONTENT_TYPE: usize = 256;

/// Capacity of the ContentEncoding buffer
pub const MAX_CONTENT_ENCODING: usize = 256;

/// Longest ContentType or ContentEncoding the u8 length fields can describe;
/// the last byte of each 256-byte buffer is never used
pub const MAX_SHORT_ATTRIBUTE: usize = u8::MAX as usize;

/// Capacity of the MetaData buffer
pub const MAX_METADATA: usize = 1000;

/// Size of the fixed header in bytes
pub const HEADER_SIZE: usize = header::SIZE;

/// Size of one transfer record in bytes
pub const TRANSFER_SIZE: usize = transfer::SIZE;

/// Size of the embedded BlobData block in bytes
pub const BLOB_DATA_SIZE: usize = blob::SIZE;

const _: () = assert!(blob::METADATA + MAX_METADATA <= blob::BLOCK_SIZE);
const _: () = assert!((header::BLOB_DATA + blob::BLOCK_SIZE) % 8 == 0);
const _: () = assert!(header::JOB_STATUS % 4 == 0);
const _: () = assert!(HEADER_SIZE % 8 == 0);
const _: () = assert!(TRANSFER_SIZE % 8 == 0);
const _: () = assert!(transfer::COMPLETION_TIME % 8 == 0);
const _: () = assert!(transfer::TRANSFER_STATUS % 4 == 0);

/// Byte offset of transfer record `index`
pub const fn transfer_offset(index: usize) -> usize {
    HEADER_SIZE + index * TRANSFER_SIZE
}

/// Byte offset at which the string pool starts for `num_transfers` records
pub const fn string_pool_offset(num_transfers: usize) -> usize {
    transfer_offset(num_transfers)
}

pub(crate) fn put_u8(buf: &mut [u8], at: usize, value: u8) {
    buf[at] = value;
}

pub(crate) fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn get_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

pub(crate) fn get_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

pub(crate) fn get_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(raw)
}
