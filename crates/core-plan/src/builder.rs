//! Plan builder: lays out header, transfer records and string pool

use crate::error::{Error, Result};
use crate::header::{BlobData, JobId, LocationType, LogSeverity, PlanHeader};
use crate::layout::{header, string_pool_offset, transfer_offset, TRANSFER_SIZE};
use crate::plan::JobPartPlan;
use crate::priority::Priority;
use crate::transfer::{path_len, TransferRecord, TransferSpec};
use crate::PLAN_SCHEMA_VERSION;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Builder for Job Part Plan files
///
/// Offsets are computed in a single forward pass in [`build`](Self::build):
/// header, then every transfer record, then the concatenated paths. The same
/// input always produces the same bytes.
///
/// # Example
/// ```
/// use jobplan_core_plan::{JobId, PlanBuilder, Priority, TransferSpec};
///
/// let mut builder = PlanBuilder::new(JobId::new(), 0).priority(Priority::Low);
/// builder.add_transfer(TransferSpec::new("a.txt", "b.txt", 5, 0)).unwrap();
/// let bytes = builder.build().unwrap();
/// assert_eq!(bytes.len() as u64, builder.plan_size());
/// ```
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    job_id: JobId,
    part_num: u32,
    is_final_part: bool,
    priority: Priority,
    ttl_after_completion: u32,
    src_location: LocationType,
    dst_location: LocationType,
    log_severity: LogSeverity,
    blob_data: BlobData,
    transfers: Vec<TransferSpec>,
}

impl PlanBuilder {
    pub fn new(job_id: JobId, part_num: u32) -> Self {
        Self {
            job_id,
            part_num,
            is_final_part: false,
            priority: Priority::default(),
            ttl_after_completion: 0,
            src_location: LocationType::Unknown,
            dst_location: LocationType::Unknown,
            log_severity: LogSeverity::default(),
            blob_data: BlobData::default(),
            transfers: Vec::new(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn part_num(&self) -> u32 {
        self.part_num
    }

    pub fn final_part(mut self, is_final_part: bool) -> Self {
        self.is_final_part = is_final_part;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn ttl_after_completion(mut self, seconds: u32) -> Self {
        self.ttl_after_completion = seconds;
        self
    }

    pub fn locations(mut self, src: LocationType, dst: LocationType) -> Self {
        self.src_location = src;
        self.dst_location = dst;
        self
    }

    pub fn log_severity(mut self, severity: LogSeverity) -> Self {
        self.log_severity = severity;
        self
    }

    /// Attribute block; its block size decides each transfer's chunk count
    pub fn blob_data(mut self, blob_data: BlobData) -> Self {
        self.blob_data = blob_data;
        self
    }

    /// Append a transfer, returning its index
    ///
    /// Paths must be non-empty and fit a u16 length. The chunk count must fit
    /// a u16 for the configured block size.
    pub fn add_transfer(&mut self, spec: TransferSpec) -> Result<u32> {
        path_len("source", &spec.source)?;
        path_len("destination", &spec.destination)?;
        self.chunk_num(spec.source_size)?;

        let index = u32::try_from(self.transfers.len())
            .map_err(|_| Error::invalid_transfer("too many transfers for one part"))?;
        self.transfers.push(spec);
        Ok(index)
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }

    /// Total file size the built plan occupies
    pub fn plan_size(&self) -> u64 {
        let strings: u64 = self
            .transfers
            .iter()
            .map(|t| (t.source.len() + t.destination.len()) as u64)
            .sum();
        string_pool_offset(self.transfers.len()) as u64 + strings
    }

    fn chunk_num(&self, source_size: u64) -> Result<u16> {
        let chunks = self.blob_data.chunks_for(source_size);
        u16::try_from(chunks).map_err(|_| {
            Error::invalid_transfer(format!(
                "{} bytes at block size {} needs {} chunks, limit is {}",
                source_size,
                self.blob_data.block_size(),
                chunks,
                u16::MAX
            ))
        })
    }

    /// Lay out the plan and return its bytes
    pub fn build(&self) -> Result<Vec<u8>> {
        let num_transfers = u32::try_from(self.transfers.len())
            .map_err(|_| Error::invalid_transfer("too many transfers for one part"))?;
        let mut buf = vec![0u8; self.plan_size() as usize];

        let plan_header = PlanHeader {
            version: PLAN_SCHEMA_VERSION,
            job_id: self.job_id,
            part_num: self.part_num,
            is_final_part: self.is_final_part,
            priority: self.priority,
            ttl_after_completion: self.ttl_after_completion,
            src_location: self.src_location,
            dst_location: self.dst_location,
            num_transfers,
            log_severity: self.log_severity,
            blob_data: self.blob_data.clone(),
        };
        // jobStatus stays zero, which is InProgress
        plan_header.encode(&mut buf[..header::JOB_STATUS]);

        let mut next_string = string_pool_offset(self.transfers.len());
        for (index, spec) in self.transfers.iter().enumerate() {
            let record = TransferRecord {
                offset: next_string as u64,
                src_length: path_len("source", &spec.source)?,
                dst_length: path_len("destination", &spec.destination)?,
                chunk_num: self.chunk_num(spec.source_size)?,
                modified_time: spec.modified_time,
                source_size: spec.source_size,
            };
            let at = transfer_offset(index);
            record.encode(&mut buf[at..at + TRANSFER_SIZE]);
            next_string += spec.source.len() + spec.destination.len();
        }

        let mut cursor = string_pool_offset(self.transfers.len());
        for spec in &self.transfers {
            for path in [&spec.source, &spec.destination] {
                buf[cursor..cursor + path.len()].copy_from_slice(path.as_bytes());
                cursor += path.len();
            }
        }
        debug_assert_eq!(cursor, buf.len());

        debug!(
            job_id = %self.job_id,
            part_num = self.part_num,
            transfers = num_transfers,
            bytes = buf.len(),
            "Built job part plan"
        );
        Ok(buf)
    }

    /// Build and write the plan to `path`, returning the number of bytes written
    ///
    /// The file is written completely before anything can map it.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let bytes = self.build()?;
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path.as_ref())?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(bytes.len() as u64)
    }

    /// Write the plan to `path` and map it for concurrent access
    pub fn create<P: AsRef<Path>>(&self, path: P) -> Result<JobPartPlan> {
        self.write_to(path.as_ref())?;
        JobPartPlan::open(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::HEADER_SIZE;

    #[test]
    fn test_empty_plan_is_header_only() {
        let builder = PlanBuilder::new(JobId::from_bytes([1u8; 16]), 0);
        let bytes = builder.build().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(builder.plan_size(), HEADER_SIZE as u64);
    }

    #[test]
    fn test_plan_size_accounts_for_strings() {
        let mut builder = PlanBuilder::new(JobId::from_bytes([1u8; 16]), 0);
        builder
            .add_transfer(TransferSpec::new("a.txt", "b.txt", 5, 0))
            .unwrap();
        builder
            .add_transfer(TransferSpec::new("dir/c.bin", "d", 5, 0))
            .unwrap();
        assert_eq!(builder.plan_size(), (string_pool_offset(2) + 10 + 10) as u64);
        assert_eq!(builder.build().unwrap().len() as u64, builder.plan_size());
    }

    #[test]
    fn test_build_is_deterministic() {
        let mut builder = PlanBuilder::new(JobId::from_bytes([9u8; 16]), 4)
            .priority(Priority::Medium)
            .final_part(true);
        for i in 0..5 {
            builder
                .add_transfer(TransferSpec::new(
                    format!("src/{}", i),
                    format!("dst/{}", i),
                    i * 1000,
                    1_600_000_000 + i as u32,
                ))
                .unwrap();
        }
        assert_eq!(builder.build().unwrap(), builder.build().unwrap());
        assert_eq!(builder.clone().build().unwrap(), builder.build().unwrap());
    }

    #[test]
    fn test_indices_are_sequential() {
        let mut builder = PlanBuilder::new(JobId::new(), 0);
        assert_eq!(builder.add_transfer(TransferSpec::new("a", "b", 1, 0)).unwrap(), 0);
        assert_eq!(builder.add_transfer(TransferSpec::new("c", "d", 1, 0)).unwrap(), 1);
        assert_eq!(builder.transfer_count(), 2);
    }

    #[test]
    fn test_rejects_empty_path() {
        let mut builder = PlanBuilder::new(JobId::new(), 0);
        let err = builder
            .add_transfer(TransferSpec::new("", "b", 1, 0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransfer { .. }));
        assert_eq!(builder.transfer_count(), 0);
    }

    #[test]
    fn test_rejects_too_many_chunks() {
        let mut builder =
            PlanBuilder::new(JobId::new(), 0).blob_data(BlobData::new(1).unwrap());
        assert!(builder
            .add_transfer(TransferSpec::new("a", "b", u16::MAX as u64, 0))
            .is_ok());
        assert!(builder
            .add_transfer(TransferSpec::new("a", "b", u16::MAX as u64 + 1, 0))
            .is_err());
    }

    #[test]
    fn test_write_to_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.steV0");
        let builder = PlanBuilder::new(JobId::new(), 0);
        assert_eq!(builder.write_to(&path).unwrap(), HEADER_SIZE as u64);
        assert!(matches!(builder.write_to(&path), Err(Error::Io(_))));
    }
}
