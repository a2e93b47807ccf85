/*!
 * jobplan - resumable job part plans
 *
 * Process-level plumbing around the plan files of `jobplan-core-plan`:
 * - Configuration and structured logging
 * - Priority dispatch of unfinished transfers (High, Medium, Low)
 * - Resume after restart, with source change detection
 * - Error type with process exit codes
 */

pub mod cli_style;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod output;
pub mod resume;

// Re-export commonly used types
pub use config::{LogLevel, PlanConfig};
pub use dispatch::{
    dispatch_part, priority_channels, run_workers, PriorityReceiver, PrioritySender,
    TransferWork, WorkerStats,
};
pub use error::{JobPlanError, Result};
pub use resume::{resume_directory, resume_part, LocalSourceProbe, ResumeReport, SourceProbe};

pub use jobplan_core_plan as plan;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
