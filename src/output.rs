//! Structured output writer supporting JSON and human-readable modes.

use chrono::{DateTime, Utc};
use jobplan_core_plan::{
    ChannelId, JobId, JobPartPlan, LocationType, LogSeverity, PartProgress, Priority,
    StatusCode, TransferStatus,
};
use serde::Serialize;

use crate::cli_style;

/// Output mode for CLI results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Serializable view of one part
#[derive(Debug, Clone, Serialize)]
pub struct PartSummary {
    pub job_id: JobId,
    pub part_num: u32,
    pub is_final_part: bool,
    pub priority: Priority,
    pub channel: ChannelId,
    pub job_status: &'static str,
    pub src_location: LocationType,
    pub dst_location: LocationType,
    pub ttl_after_completion: u32,
    pub log_severity: LogSeverity,
    pub block_size: u64,
    pub progress: PartProgress,
}

impl PartSummary {
    pub fn from_plan(plan: &JobPartPlan) -> Self {
        let header = plan.header();
        Self {
            job_id: header.job_id,
            part_num: header.part_num,
            is_final_part: header.is_final_part,
            priority: header.priority,
            channel: plan.channel(),
            job_status: plan.job_status().describe(),
            src_location: header.src_location,
            dst_location: header.dst_location,
            ttl_after_completion: header.ttl_after_completion,
            log_severity: header.log_severity,
            block_size: header.blob_data.block_size(),
            progress: plan.progress(),
        }
    }
}

/// Serializable view of one transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferRow {
    pub index: u32,
    pub source: String,
    pub destination: String,
    pub source_size: u64,
    pub chunk_num: u16,
    pub modified_time: u32,
    pub status: &'static str,
    /// RFC 3339 completion time, absent while the transfer runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl TransferRow {
    pub fn rows(plan: &JobPartPlan) -> Vec<Self> {
        plan.transfers()
            .map(|view| {
                let record = view.record();
                let finished = TransferStatus::from_code(view.status().code())
                    .is_some_and(|s| s.is_terminal());
                Self {
                    index: view.index(),
                    source: view.source_lossy().into_owned(),
                    destination: view.destination_lossy().into_owned(),
                    source_size: record.source_size,
                    chunk_num: record.chunk_num,
                    modified_time: record.modified_time,
                    status: view.status().describe(),
                    completed_at: finished
                        .then(|| format_timestamp(view.completion_time()))
                        .flatten(),
                }
            })
            .collect()
    }
}

/// Detailed view of a part for `inspect`
#[derive(Debug, Clone, Serialize)]
pub struct PartDetail {
    #[serde(flatten)]
    pub summary: PartSummary,
    pub content_type: String,
    pub content_encoding: String,
    pub metadata: String,
    pub transfers: Vec<TransferRow>,
}

impl PartDetail {
    pub fn from_plan(plan: &JobPartPlan) -> Self {
        let blob = &plan.header().blob_data;
        Self {
            summary: PartSummary::from_plan(plan),
            content_type: String::from_utf8_lossy(blob.content_type()).into_owned(),
            content_encoding: String::from_utf8_lossy(blob.content_encoding()).into_owned(),
            metadata: String::from_utf8_lossy(blob.metadata()).into_owned(),
            transfers: TransferRow::rows(plan),
        }
    }
}

/// Render Unix seconds as RFC 3339
pub fn format_timestamp(secs: u64) -> Option<String> {
    let secs = i64::try_from(secs).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|t| t.to_rfc3339())
}

/// Structured output writer that supports both human-readable and JSON output
#[derive(Debug, Clone)]
pub struct OutputWriter {
    pub mode: OutputMode,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self {
            mode: if json { OutputMode::Json } else { OutputMode::Human },
        }
    }

    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Print any serializable value as a single JSON document
    pub fn json<T: Serialize>(&self, value: &T) -> crate::error::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn parts(&self, parts: &[PartSummary]) -> crate::error::Result<()> {
        match self.mode {
            OutputMode::Json => self.json(&parts),
            OutputMode::Human => {
                if parts.is_empty() {
                    cli_style::print_info("No plan files found");
                } else {
                    println!("{}", cli_style::parts_table(parts));
                }
                Ok(())
            }
        }
    }

    pub fn detail(&self, detail: &PartDetail) -> crate::error::Result<()> {
        match self.mode {
            OutputMode::Json => self.json(detail),
            OutputMode::Human => {
                println!("{}", cli_style::header_table(&detail.summary));
                if !detail.content_type.is_empty() || !detail.metadata.is_empty() {
                    println!(
                        "  content-type: {}  encoding: {}  metadata: {}",
                        detail.content_type, detail.content_encoding, detail.metadata
                    );
                }
                if !detail.transfers.is_empty() {
                    println!("{}", cli_style::transfers_table(&detail.transfers));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobplan_core_plan::{PlanBuilder, TransferSpec};

    fn sample_plan() -> JobPartPlan {
        let mut builder = PlanBuilder::new(JobId::new(), 3).priority(Priority::Low);
        builder
            .add_transfer(TransferSpec::new("a.txt", "b.txt", 5, 1_700_000_000))
            .unwrap();
        builder
            .add_transfer(TransferSpec::new("c.txt", "d.txt", 5, 1_700_000_000))
            .unwrap();
        JobPartPlan::from_bytes(&builder.build().unwrap()).unwrap()
    }

    #[test]
    fn test_summary_from_plan() {
        let plan = sample_plan();
        plan.transfer(1).unwrap().complete(1_700_000_100).unwrap();
        let summary = PartSummary::from_plan(&plan);
        assert_eq!(summary.part_num, 3);
        assert_eq!(summary.channel, ChannelId::Low);
        assert_eq!(summary.job_status, "InProgress");
        assert_eq!(summary.progress.completed, 1);
    }

    #[test]
    fn test_rows_carry_completion_time() {
        let plan = sample_plan();
        plan.transfer(0).unwrap().fail(0).unwrap();
        plan.transfer(1).unwrap().complete(1_700_000_100).unwrap();
        let rows = TransferRow::rows(&plan);
        assert_eq!(rows[0].status, "Failed");
        assert_eq!(rows[0].completed_at.as_deref(), Some("1970-01-01T00:00:00+00:00"));
        assert_eq!(rows[1].source, "c.txt");
        assert_eq!(
            rows[1].completed_at.as_deref(),
            Some("2023-11-14T22:15:00+00:00")
        );
    }

    #[test]
    fn test_detail_json_shape() {
        let plan = sample_plan();
        let json = serde_json::to_value(PartDetail::from_plan(&plan)).unwrap();
        assert_eq!(json["part_num"], 3);
        assert_eq!(json["priority"], "low");
        assert_eq!(json["channel"], "low");
        assert_eq!(json["transfers"][0]["destination"], "b.txt");
        assert!(json["transfers"][0].get("completed_at").is_none());
    }
}
