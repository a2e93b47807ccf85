//! Job Part Plan: memory-mapped, resumable transfer plans
//!
//! A job is split into parts. Each part is described by one plan file that
//! holds everything needed to execute, pause, resume or cancel its transfers
//! after a process restart. The file is mapped into memory; its only mutable
//! words are the job status, and each transfer's status and completion time,
//! which worker threads update in place with atomic operations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Job Part Plan File           │
//! ├─────────────────────────────────────┤
//! │ Header (1584 bytes)                 │
//! │   Version, JobId, PartNum, ...      │
//! │   BlobData (1528 bytes)             │
//! │   jobStatus (atomic u32)            │
//! │ Transfer 0 (48 bytes)               │
//! │   Offset, lengths, sizes, times     │
//! │   CompletionTime, transferStatus    │
//! │ ...                                 │
//! │ Transfer N-1                        │
//! │ String pool: src0 dst0 src1 dst1 .. │
//! └─────────────────────────────────────┘
//!          ↓ mmap
//! ┌─────────────────────────────────────┐
//! │        JobPartPlan                  │
//! │  - header()        → decoded once   │
//! │  - job_status()    → atomic cell    │
//! │  - transfer(i)     → O(1) view      │
//! │  - channel()       → High/Med/Low   │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use jobplan_core_plan::{JobId, JobPartPlan, PlanBuilder, Priority, TransferSpec};
//!
//! let mut builder = PlanBuilder::new(JobId::new(), 0).priority(Priority::Medium);
//! builder.add_transfer(TransferSpec::new("/data/a.txt", "/backup/a.txt", 5, 0)).unwrap();
//! let plan = builder.create("job--00000.steV0").unwrap();
//!
//! plan.transfer(0).unwrap().complete(1_700_000_000).unwrap();
//! plan.complete().unwrap();
//!
//! // After a restart
//! let plan = JobPartPlan::open("job--00000.steV0").unwrap();
//! assert!(plan.all_transfers_terminal());
//! ```

pub mod builder;
pub mod error;
pub mod header;
pub mod layout;
pub mod plan;
pub mod priority;
pub mod status;
pub mod store;
pub mod transfer;

mod region;

// Re-export main types
pub use builder::PlanBuilder;
pub use error::{Error, Result};
pub use header::{BlobData, JobId, LocationType, LogSeverity, PlanHeader};
pub use plan::{JobPartPlan, PartProgress, TransferView};
pub use priority::{ChannelId, Priority};
pub use status::{JobStatus, StatusCell, StatusCode, TransferStatus, INVALID_STATUS_NAME};
pub use store::{PlanFileName, PlanStore};
pub use transfer::{TransferRecord, TransferSpec};

/// Schema version written into every plan; files with any other value are rejected
pub const PLAN_SCHEMA_VERSION: u32 = 0;
