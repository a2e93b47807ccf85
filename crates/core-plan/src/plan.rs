//! Memory-mapped Job Part Plan
//!
//! A [`JobPartPlan`] validates the whole file once when it is opened and then
//! hands out typed views. Immutable fields are decoded up front; the job
//! status, transfer statuses and completion times are read and written in place
//! through atomics, so any number of worker threads can share one plan.

use crate::error::{Error, Result};
use crate::header::{JobId, PlanHeader};
use crate::layout::{header, string_pool_offset, transfer, transfer_offset, HEADER_SIZE};
use crate::priority::{ChannelId, Priority};
use crate::region::PlanRegion;
use crate::status::{JobStatus, StatusCell, StatusCode, TransferStatus};
use crate::transfer::TransferRecord;
use crate::PLAN_SCHEMA_VERSION;
use memmap2::{MmapMut, MmapOptions};
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::{debug, info, warn};

/// A validated, mapped plan file
///
/// # Example
/// ```no_run
/// use jobplan_core_plan::{JobPartPlan, TransferStatus};
///
/// let plan = JobPartPlan::open("job--00000.steV0").unwrap();
/// for transfer in plan.transfers() {
///     if transfer.status().load().unwrap() == TransferStatus::InProgress {
///         println!("{} -> {}", transfer.source_lossy(), transfer.destination_lossy());
///     }
/// }
/// ```
pub struct JobPartPlan {
    region: PlanRegion,
    header: PlanHeader,
    records: Vec<TransferRecord>,
}

impl JobPartPlan {
    /// Map a plan file read-write; status changes reach the file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = open_existing(path, true)?;
        check_min_size(&file)?;
        // SAFETY: the plan file is owned by this process while it is mapped.
        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| Error::memory_map_failed(e.to_string()))?;
        let plan = Self::from_region(PlanRegion::new(map)?)?;
        info!(
            path = %path.display(),
            job_id = %plan.job_id(),
            part_num = plan.part_num(),
            transfers = plan.num_transfers(),
            "Opened job part plan"
        );
        Ok(plan)
    }

    /// Map a plan file copy-on-write for inspection; status changes stay private
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = open_existing(path, false)?;
        check_min_size(&file)?;
        // SAFETY: private mapping; writes never reach the file.
        let map = unsafe { MmapOptions::new().map_copy(&file) }
            .map_err(|e| Error::memory_map_failed(e.to_string()))?;
        let plan = Self::from_region(PlanRegion::new(map)?)?;
        debug!(path = %path.display(), "Opened job part plan read-only");
        Ok(plan)
    }

    /// Validate a copy of `bytes` held in an anonymous mapping
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(too_small(bytes.len() as u64));
        }
        Self::from_region(PlanRegion::from_bytes(bytes)?)
    }

    fn from_region(region: PlanRegion) -> Result<Self> {
        let len = region.len();
        if len < HEADER_SIZE {
            return Err(too_small(len as u64));
        }

        let head = region.bytes(0, header::JOB_STATUS);
        let version = crate::layout::get_u32(head, header::VERSION);
        if version != PLAN_SCHEMA_VERSION {
            warn!(
                expected = PLAN_SCHEMA_VERSION,
                found = version,
                "Rejecting plan with foreign schema version"
            );
            return Err(Error::version_mismatch(PLAN_SCHEMA_VERSION, version));
        }

        let plan_header = PlanHeader::decode(head)?;
        let num_transfers = plan_header.num_transfers as usize;
        let pool_start = string_pool_offset(num_transfers);
        if pool_start > len {
            return Err(Error::corrupt(format!(
                "NumTransfers is {} but the file holds only {} bytes",
                num_transfers, len
            )));
        }

        let mut records = Vec::with_capacity(num_transfers);
        let mut pool_end = pool_start as u64;
        for index in 0..num_transfers {
            let record =
                TransferRecord::decode(region.bytes(transfer_offset(index), transfer::COMPLETION_TIME));
            if record.offset < pool_start as u64 {
                return Err(Error::corrupt(format!(
                    "transfer {} offset {} lies before the string pool at {}",
                    index, record.offset, pool_start
                )));
            }
            let strings_end = record.strings_end().ok_or_else(|| {
                Error::corrupt(format!(
                    "transfer {} offset {} overflows the file address space",
                    index, record.offset
                ))
            })?;
            if strings_end > len as u64 {
                return Err(Error::corrupt(format!(
                    "transfer {} paths end at {} past file end {}",
                    index, strings_end, len
                )));
            }
            pool_end = pool_end.max(strings_end);
            records.push(record);
        }

        if pool_end != len as u64 {
            return Err(Error::corrupt(format!(
                "string pool ends at {} but the file is {} bytes; NumTransfers does not match the layout",
                pool_end, len
            )));
        }

        Ok(Self {
            region,
            header: plan_header,
            records,
        })
    }

    pub fn header(&self) -> &PlanHeader {
        &self.header
    }

    pub fn job_id(&self) -> JobId {
        self.header.job_id
    }

    pub fn part_num(&self) -> u32 {
        self.header.part_num
    }

    pub fn is_final_part(&self) -> bool {
        self.header.is_final_part
    }

    pub fn priority(&self) -> Priority {
        self.header.priority
    }

    /// Scheduling channel for this part's transfers
    pub fn channel(&self) -> ChannelId {
        self.header.priority.channel()
    }

    pub fn num_transfers(&self) -> u32 {
        self.header.num_transfers
    }

    /// File size in bytes
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Always false: a plan holds at least its header
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Atomic view of the job status word
    pub fn job_status(&self) -> StatusCell<'_, JobStatus> {
        StatusCell::new(self.region.atomic_u32(header::JOB_STATUS))
    }

    /// InProgress -> Paused
    pub fn pause(&self) -> Result<()> {
        self.job_transition(JobStatus::Paused)
    }

    /// Paused -> InProgress
    pub fn resume(&self) -> Result<()> {
        self.job_transition(JobStatus::InProgress)
    }

    /// InProgress -> Cancelled; in-flight transfers must observe it themselves
    pub fn cancel(&self) -> Result<()> {
        self.job_transition(JobStatus::Cancelled)
    }

    /// InProgress -> Completed
    pub fn complete(&self) -> Result<()> {
        self.job_transition(JobStatus::Completed)
    }

    fn job_transition(&self, to: JobStatus) -> Result<()> {
        let from = self.job_status().transition(to)?;
        info!(
            job_id = %self.job_id(),
            part_num = self.part_num(),
            from = from.name(),
            to = to.name(),
            "Job status changed"
        );
        Ok(())
    }

    /// View of transfer `index`
    pub fn transfer(&self, index: u32) -> Result<TransferView<'_>> {
        let record = self
            .records
            .get(index as usize)
            .ok_or_else(|| Error::transfer_index_out_of_bounds(index, self.num_transfers()))?;
        Ok(TransferView {
            plan: self,
            index,
            record,
        })
    }

    /// Views of every transfer in index order
    pub fn transfers(&self) -> impl ExactSizeIterator<Item = TransferView<'_>> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(move |(index, record)| TransferView {
                plan: self,
                index: index as u32,
                record,
            })
    }

    /// Count transfers by status
    pub fn progress(&self) -> PartProgress {
        let mut progress = PartProgress {
            total: self.num_transfers(),
            ..PartProgress::default()
        };
        for view in self.transfers() {
            match TransferStatus::from_code(view.status().code()) {
                Some(TransferStatus::InProgress) => progress.in_progress += 1,
                Some(TransferStatus::Completed) => progress.completed += 1,
                Some(TransferStatus::Failed) => progress.failed += 1,
                None => progress.invalid += 1,
            }
        }
        progress
    }

    /// True once every transfer is Completed or Failed
    pub fn all_transfers_terminal(&self) -> bool {
        self.transfers().all(|view| {
            TransferStatus::from_code(view.status().code()).is_some_and(|s| s.is_terminal())
        })
    }

    /// Whether the retention period has passed, given when the part became terminal
    ///
    /// Times are Unix seconds. Returns false while the job status is not terminal.
    pub fn ttl_elapsed(&self, terminal_at: u64, now: u64) -> bool {
        let terminal = self
            .job_status()
            .load()
            .map(|s| s.is_terminal())
            .unwrap_or(false);
        terminal && now >= terminal_at.saturating_add(self.header.ttl_after_completion as u64)
    }

    /// Ask the OS to write dirty pages back to the file
    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }

    fn bytes_at(&self, range: std::ops::Range<u64>) -> &[u8] {
        self.region
            .bytes(range.start as usize, (range.end - range.start) as usize)
    }
}

impl fmt::Debug for JobPartPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPartPlan")
            .field("job_id", &self.header.job_id)
            .field("part_num", &self.header.part_num)
            .field("num_transfers", &self.header.num_transfers)
            .field("job_status", &self.job_status().describe())
            .finish()
    }
}

/// One transfer inside a mapped plan
#[derive(Clone, Copy)]
pub struct TransferView<'a> {
    plan: &'a JobPartPlan,
    index: u32,
    record: &'a TransferRecord,
}

impl<'a> TransferView<'a> {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn record(&self) -> &'a TransferRecord {
        self.record
    }

    /// Source path bytes
    pub fn source(&self) -> &'a [u8] {
        self.plan.bytes_at(self.record.source_range())
    }

    /// Destination path bytes
    pub fn destination(&self) -> &'a [u8] {
        self.plan.bytes_at(self.record.destination_range())
    }

    pub fn source_lossy(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.source())
    }

    pub fn destination_lossy(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.destination())
    }

    fn record_offset(&self) -> usize {
        transfer_offset(self.index as usize)
    }

    /// Atomic view of the transfer status word
    pub fn status(&self) -> StatusCell<'a, TransferStatus> {
        StatusCell::new(
            self.plan
                .region
                .atomic_u32(self.record_offset() + transfer::TRANSFER_STATUS),
        )
    }

    /// Unix seconds at which the transfer became terminal, 0 if it has not
    pub fn completion_time(&self) -> u64 {
        u64::from_le(
            self.plan
                .region
                .atomic_u64(self.record_offset() + transfer::COMPLETION_TIME)
                .load(Ordering::Acquire),
        )
    }

    /// InProgress -> Completed, stamping the completion time
    pub fn complete(&self, at: u64) -> Result<()> {
        self.finish(TransferStatus::Completed, at)
    }

    /// InProgress -> Failed, stamping the completion time
    pub fn fail(&self, at: u64) -> Result<()> {
        self.finish(TransferStatus::Failed, at)
    }

    fn finish(&self, to: TransferStatus, at: u64) -> Result<()> {
        self.status().transition(to)?;
        // Only the winner of the transition gets here, so the time is set once
        self.plan
            .region
            .atomic_u64(self.record_offset() + transfer::COMPLETION_TIME)
            .store(at.to_le(), Ordering::Release);
        debug!(
            job_id = %self.plan.job_id(),
            part_num = self.plan.part_num(),
            transfer = self.index,
            status = to.name(),
            "Transfer finished"
        );
        Ok(())
    }
}

impl fmt::Debug for TransferView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferView")
            .field("index", &self.index)
            .field("source", &self.source_lossy())
            .field("destination", &self.destination_lossy())
            .field("status", &self.status().describe())
            .finish()
    }
}

/// Transfer counts of one part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PartProgress {
    pub total: u32,
    pub in_progress: u32,
    pub completed: u32,
    pub failed: u32,
    /// Records holding a status code outside the known set
    pub invalid: u32,
}

impl PartProgress {
    pub fn terminal(&self) -> u32 {
        self.completed + self.failed
    }

    pub fn completion_percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.terminal() as f64 / self.total as f64) * 100.0
        }
    }
}

fn open_existing(path: &Path, writable: bool) -> Result<File> {
    if !path.exists() {
        return Err(Error::not_found(path));
    }
    Ok(OpenOptions::new().read(true).write(writable).open(path)?)
}

fn check_min_size(file: &File) -> Result<()> {
    let len = file.metadata()?.len();
    if len < HEADER_SIZE as u64 {
        return Err(too_small(len));
    }
    Ok(())
}

fn too_small(len: u64) -> Error {
    Error::corrupt(format!(
        "file is {} bytes, smaller than the {}-byte header",
        len, HEADER_SIZE
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PlanBuilder;
    use crate::layout::{put_u32, put_u64};
    use crate::transfer::TransferSpec;

    fn two_transfer_bytes() -> Vec<u8> {
        let mut builder = PlanBuilder::new(JobId::from_bytes([3u8; 16]), 1);
        builder
            .add_transfer(TransferSpec::new("a.txt", "b.txt", 5, 100))
            .unwrap();
        builder
            .add_transfer(TransferSpec::new("c.txt", "d.txt", 5, 200))
            .unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_from_bytes_reads_back() {
        let plan = JobPartPlan::from_bytes(&two_transfer_bytes()).unwrap();
        assert_eq!(plan.num_transfers(), 2);
        assert_eq!(plan.part_num(), 1);
        assert_eq!(plan.job_status().load().unwrap(), JobStatus::InProgress);

        let t1 = plan.transfer(1).unwrap();
        assert_eq!(t1.source(), b"c.txt");
        assert_eq!(t1.destination(), b"d.txt");
        assert_eq!(t1.record().modified_time, 200);
        assert_eq!(t1.completion_time(), 0);
    }

    #[test]
    fn test_transfer_out_of_bounds() {
        let plan = JobPartPlan::from_bytes(&two_transfer_bytes()).unwrap();
        assert!(matches!(
            plan.transfer(2),
            Err(Error::TransferIndexOutOfBounds { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let mut bytes = two_transfer_bytes();
        put_u32(&mut bytes, header::VERSION, PLAN_SCHEMA_VERSION + 1);
        assert!(matches!(
            JobPartPlan::from_bytes(&bytes),
            Err(Error::SchemaVersionMismatch { .. })
        ));
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(
            JobPartPlan::from_bytes(&[0u8; 16]),
            Err(Error::CorruptPlan { .. })
        ));
    }

    #[test]
    fn test_offset_past_end() {
        let mut bytes = two_transfer_bytes();
        let len = bytes.len() as u64;
        put_u64(&mut bytes, transfer_offset(1) + transfer::OFFSET, len - 4);
        assert!(matches!(
            JobPartPlan::from_bytes(&bytes),
            Err(Error::CorruptPlan { .. })
        ));
    }

    #[test]
    fn test_offset_overflow_is_corrupt() {
        let mut bytes = two_transfer_bytes();
        put_u64(&mut bytes, transfer_offset(0) + transfer::OFFSET, u64::MAX - 3);
        assert!(matches!(
            JobPartPlan::from_bytes(&bytes),
            Err(Error::CorruptPlan { .. })
        ));
    }

    #[test]
    fn test_offset_inside_records() {
        let mut bytes = two_transfer_bytes();
        put_u64(&mut bytes, transfer_offset(0) + transfer::OFFSET, HEADER_SIZE as u64);
        assert!(matches!(
            JobPartPlan::from_bytes(&bytes),
            Err(Error::CorruptPlan { .. })
        ));
    }

    #[test]
    fn test_num_transfers_too_large() {
        let mut bytes = two_transfer_bytes();
        put_u32(&mut bytes, header::NUM_TRANSFERS, 1000);
        assert!(matches!(
            JobPartPlan::from_bytes(&bytes),
            Err(Error::CorruptPlan { .. })
        ));
    }

    #[test]
    fn test_num_transfers_too_small() {
        let mut bytes = two_transfer_bytes();
        put_u32(&mut bytes, header::NUM_TRANSFERS, 1);
        assert!(matches!(
            JobPartPlan::from_bytes(&bytes),
            Err(Error::CorruptPlan { .. })
        ));
    }

    #[test]
    fn test_progress_counts() {
        let plan = JobPartPlan::from_bytes(&two_transfer_bytes()).unwrap();
        assert!(!plan.all_transfers_terminal());
        plan.transfer(0).unwrap().complete(10).unwrap();
        let progress = plan.progress();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.in_progress, 1);
        assert_eq!(progress.completion_percent(), 50.0);

        plan.transfer(1).unwrap().fail(11).unwrap();
        assert!(plan.all_transfers_terminal());
        assert_eq!(plan.progress().failed, 1);
    }

    #[test]
    fn test_completion_time_set_once() {
        let plan = JobPartPlan::from_bytes(&two_transfer_bytes()).unwrap();
        let t = plan.transfer(0).unwrap();
        t.complete(1234).unwrap();
        assert!(t.fail(9999).is_err());
        assert_eq!(t.completion_time(), 1234);
        assert_eq!(t.status().load().unwrap(), TransferStatus::Completed);
    }

    #[test]
    fn test_job_helpers() {
        let plan = JobPartPlan::from_bytes(&two_transfer_bytes()).unwrap();
        plan.pause().unwrap();
        assert!(plan.pause().is_err());
        plan.resume().unwrap();
        plan.cancel().unwrap();
        assert!(plan.resume().is_err());
        assert_eq!(plan.job_status().load().unwrap(), JobStatus::Cancelled);
    }

    #[test]
    fn test_ttl_elapsed() {
        let mut builder = PlanBuilder::new(JobId::new(), 0).ttl_after_completion(60);
        builder.add_transfer(TransferSpec::new("a", "b", 1, 0)).unwrap();
        let plan = JobPartPlan::from_bytes(&builder.build().unwrap()).unwrap();

        assert!(!plan.ttl_elapsed(1000, 5000));
        plan.complete().unwrap();
        assert!(!plan.ttl_elapsed(1000, 1059));
        assert!(plan.ttl_elapsed(1000, 1060));
    }

    #[test]
    fn test_unknown_transfer_status_counts_as_invalid() {
        let mut bytes = two_transfer_bytes();
        put_u32(&mut bytes, transfer_offset(0) + transfer::TRANSFER_STATUS, 77);
        let plan = JobPartPlan::from_bytes(&bytes).unwrap();
        assert_eq!(plan.progress().invalid, 1);
        assert_eq!(plan.transfer(0).unwrap().status().describe(), "InvalidStatusCode");
    }
}
