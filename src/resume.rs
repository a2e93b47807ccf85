/*!
 * Resuming job parts after a restart
 *
 * A part is resumable while its job status is InProgress or Paused. Transfers
 * already Completed or Failed are left alone; transfers still InProgress are
 * pending and will be dispatched again. When a source probe is supplied, a
 * pending transfer whose source disappeared or changed since the plan was
 * written is failed instead of being resumed against different data. A source
 * the probe cannot read (permissions, transient I/O) stays pending.
 */

use chrono::{DateTime, Utc};
use jobplan_core_plan::{
    Error as PlanError, JobId, JobPartPlan, JobStatus, PlanFileName, PlanStore, StatusCode,
    TransferSpec, TransferStatus, TransferView,
};
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{JobPlanError, Result};

/// What a probe found at a transfer's source path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceState {
    Missing,
    Present { size: u64, modified_time: u32 },
    Unreadable(String),
}

/// Looks up the current state of a transfer source
pub trait SourceProbe: Send + Sync {
    fn probe(&self, source: &[u8]) -> SourceState;
}

/// Probe for sources on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSourceProbe;

impl SourceProbe for LocalSourceProbe {
    fn probe(&self, source: &[u8]) -> SourceState {
        let Ok(path) = std::str::from_utf8(source) else {
            return SourceState::Unreadable("source path is not UTF-8".to_string());
        };
        match std::fs::metadata(Path::new(path)) {
            Ok(meta) => {
                let modified_time = meta
                    .modified()
                    .map(|t| unix_seconds(DateTime::<Utc>::from(t)))
                    .unwrap_or(0);
                SourceState::Present {
                    size: meta.len(),
                    modified_time,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SourceState::Missing,
            Err(e) => SourceState::Unreadable(e.to_string()),
        }
    }
}

impl LocalSourceProbe {
    /// Transfer of the local file `source` to `destination`, recording the
    /// size and modification time a later resume compares against
    pub fn transfer_spec(&self, source: &Path, destination: &Path) -> Result<TransferSpec> {
        let (Some(src), Some(dst)) = (source.to_str(), destination.to_str()) else {
            return Err(JobPlanError::InvalidArgument(format!(
                "{} -> {}: paths must be UTF-8",
                source.display(),
                destination.display()
            )));
        };
        if source.is_dir() {
            return Err(JobPlanError::InvalidArgument(format!(
                "source {} is a directory",
                src
            )));
        }
        match self.probe(src.as_bytes()) {
            SourceState::Present {
                size,
                modified_time,
            } => Ok(TransferSpec::new(src, dst, size, modified_time)),
            SourceState::Missing => Err(JobPlanError::InvalidArgument(format!(
                "source {} does not exist",
                src
            ))),
            SourceState::Unreadable(reason) => Err(JobPlanError::InvalidArgument(format!(
                "source {}: {}",
                src, reason
            ))),
        }
    }
}

/// Seconds since the epoch clamped into the 32-bit field the plan stores
pub fn unix_seconds(time: DateTime<Utc>) -> u32 {
    time.timestamp().clamp(0, u32::MAX as i64) as u32
}

/// Current time in Unix seconds
pub fn now_seconds() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Result of resuming one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeReport {
    pub job_id: JobId,
    pub part_num: u32,
    /// Job status found in the file
    pub previous_status: &'static str,
    /// False for Cancelled and Completed parts
    pub resumable: bool,
    /// Transfers left InProgress, to be dispatched again
    pub pending: u32,
    /// Pending transfers failed because their source changed or vanished
    pub invalidated: u32,
    /// Pending transfers whose source could not be checked
    pub unverified: u32,
    /// Transfers that were already Completed or Failed
    pub finished: u32,
}

fn source_matches(view: &TransferView<'_>, state: &SourceState) -> bool {
    let record = view.record();
    matches!(
        state,
        SourceState::Present { size, modified_time }
            if *size == record.source_size && *modified_time == record.modified_time
    )
}

/// Bring one part back to a runnable state
///
/// Terminal parts are reported as not resumable and left untouched. A Paused
/// part is moved back to InProgress after its transfers have been checked.
pub fn resume_part(
    plan: &JobPartPlan,
    probe: Option<&dyn SourceProbe>,
    now: u64,
) -> Result<ResumeReport> {
    let status = plan.job_status().load()?;
    let mut report = ResumeReport {
        job_id: plan.job_id(),
        part_num: plan.part_num(),
        previous_status: status.name(),
        resumable: !status.is_terminal(),
        pending: 0,
        invalidated: 0,
        unverified: 0,
        finished: 0,
    };
    if status.is_terminal() {
        debug!(
            job_id = %plan.job_id(),
            part_num = plan.part_num(),
            status = status.name(),
            "Part is terminal, not resuming"
        );
        return Ok(report);
    }

    for view in plan.transfers() {
        let transfer_status = view.status().load()?;
        if transfer_status.is_terminal() {
            report.finished += 1;
            continue;
        }

        if let Some(probe) = probe {
            let state = probe.probe(view.source());
            if let SourceState::Unreadable(reason) = &state {
                warn!(
                    job_id = %plan.job_id(),
                    part_num = plan.part_num(),
                    transfer = view.index(),
                    source = %view.source_lossy(),
                    reason = %reason,
                    "Could not check source, leaving transfer pending"
                );
                report.unverified += 1;
                report.pending += 1;
                continue;
            }
            if !source_matches(&view, &state) {
                warn!(
                    job_id = %plan.job_id(),
                    part_num = plan.part_num(),
                    transfer = view.index(),
                    source = %view.source_lossy(),
                    state = ?state,
                    "Source changed since the plan was written"
                );
                match view.fail(now) {
                    Ok(()) => report.invalidated += 1,
                    // A worker finished it first
                    Err(PlanError::InvalidTransition { .. }) => report.finished += 1,
                    Err(e) => return Err(e.into()),
                }
                continue;
            }
        }
        report.pending += 1;
    }

    if status == JobStatus::Paused {
        plan.resume()?;
    }
    if report.invalidated > 0 || status == JobStatus::Paused {
        plan.flush()?;
    }

    info!(
        job_id = %plan.job_id(),
        part_num = plan.part_num(),
        pending = report.pending,
        invalidated = report.invalidated,
        unverified = report.unverified,
        finished = report.finished,
        "Resumed part"
    );
    Ok(report)
}

/// Per-file outcome of a directory-wide resume
#[derive(Debug, Serialize)]
pub struct PartFailure {
    pub file: String,
    pub error: String,
    /// Version mismatch or corrupt layout; the file is left as-is
    pub integrity: bool,
}

/// Outcome of [`resume_directory`]
#[derive(Debug, Default, Serialize)]
pub struct DirectoryResume {
    pub reports: Vec<ResumeReport>,
    pub failures: Vec<PartFailure>,
}

impl DirectoryResume {
    pub fn pending(&self) -> u32 {
        self.reports.iter().map(|r| r.pending).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Resume every plan in `store`, opening files in parallel
///
/// Files that fail to open or validate are reported, never repaired.
pub fn resume_directory(
    store: &PlanStore,
    probe: Option<&dyn SourceProbe>,
    now: u64,
) -> Result<DirectoryResume> {
    let names = store.list()?;
    let outcomes: Vec<(PlanFileName, Result<ResumeReport>)> = names
        .into_par_iter()
        .map(|name| {
            let outcome = store
                .open_part(name.job_id, name.part_num)
                .map_err(JobPlanError::from)
                .and_then(|plan| resume_part(&plan, probe, now));
            (name, outcome)
        })
        .collect();

    let mut summary = DirectoryResume::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                warn!(file = %name, error = %e, "Part could not be resumed");
                summary.failures.push(PartFailure {
                    file: name.to_string(),
                    integrity: e.is_integrity_failure(),
                    error: e.to_string(),
                });
            }
        }
    }
    Ok(summary)
}

/// Transfers of `plan` still to run, in index order
pub fn pending_transfers(plan: &JobPartPlan) -> Vec<u32> {
    plan.transfers()
        .filter(|view| view.status().code() == TransferStatus::InProgress.code())
        .map(|view| view.index())
        .collect()
}
