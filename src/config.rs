/*!
 * Configuration types for jobplan
 */

use jobplan_core_plan::{BlobData, JobId, PlanBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{JobPlanError, Result};

/// Main configuration for plan management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Directory holding the plan files
    #[serde(default = "default_plan_dir")]
    pub plan_dir: PathBuf,

    /// Block size recorded in new plans when none is given
    #[serde(default = "default_block_size")]
    pub default_block_size: u64,

    /// Seconds a finished part's file is kept before it may be removed
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u32,

    /// Compare source size and modification time before resuming a transfer
    #[serde(default = "default_true")]
    pub verify_sources_on_resume: bool,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            plan_dir: default_plan_dir(),
            default_block_size: default_block_size(),
            default_ttl_secs: default_ttl_secs(),
            verify_sources_on_resume: true,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_plan_dir() -> PathBuf {
    PathBuf::from("plans")
}

fn default_block_size() -> u64 {
    BlobData::DEFAULT_BLOCK_SIZE
}

fn default_ttl_secs() -> u32 {
    7 * 24 * 60 * 60 // one week
}

impl PlanConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: PlanConfig = toml::from_str(&contents)
            .map_err(|e| JobPlanError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| JobPlanError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Load from `path` when given, otherwise fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject values no plan could be built with
    pub fn validate(&self) -> Result<()> {
        if self.default_block_size == 0 {
            return Err(JobPlanError::Config(
                "default_block_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Block-size-only attribute block for new plans
    pub fn default_blob_data(&self) -> Result<BlobData> {
        Ok(BlobData::new(self.default_block_size)?)
    }

    /// Builder for a new part carrying the configured block size and retention
    pub fn part_builder(&self, job_id: JobId, part_num: u32) -> Result<PlanBuilder> {
        Ok(PlanBuilder::new(job_id, part_num)
            .blob_data(self.default_blob_data()?)
            .ttl_after_completion(self.default_ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = PlanConfig::default();
        assert_eq!(config.plan_dir, PathBuf::from("plans"));
        assert_eq!(config.default_ttl_secs, 604_800);
        assert_eq!(config.default_block_size, 8 * 1024 * 1024);
        assert!(config.verify_sources_on_resume);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_serialization() {
        let config = PlanConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PlanConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.plan_dir, config.plan_dir);
        assert_eq!(parsed.default_ttl_secs, config.default_ttl_secs);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: PlanConfig = toml::from_str(
            r#"
            plan_dir = "/var/lib/jobplan"
            log_level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.plan_dir, PathBuf::from("/var/lib/jobplan"));
        assert_eq!(parsed.log_level, LogLevel::Debug);
        assert_eq!(parsed.default_block_size, BlobData::DEFAULT_BLOCK_SIZE);
        assert!(parsed.verify_sources_on_resume);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobplan.toml");
        let config = PlanConfig {
            default_ttl_secs: 60,
            verbose: true,
            ..Default::default()
        };
        config.to_file(&path).unwrap();

        let loaded = PlanConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.default_ttl_secs, 60);
        assert!(loaded.verbose);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "default_block_size = 0\n").unwrap();
        assert!(matches!(
            PlanConfig::from_file(&path),
            Err(JobPlanError::Config(_))
        ));
    }

    #[test]
    fn test_part_builder_carries_defaults() {
        let config = PlanConfig {
            default_block_size: 4096,
            default_ttl_secs: 3600,
            ..Default::default()
        };
        let job_id = JobId::new();
        let mut builder = config.part_builder(job_id, 7).unwrap();
        builder
            .add_transfer(jobplan_core_plan::TransferSpec::new("a", "b", 10_000, 0))
            .unwrap();

        let plan = jobplan_core_plan::JobPartPlan::from_bytes(&builder.build().unwrap()).unwrap();
        assert_eq!(plan.job_id(), job_id);
        assert_eq!(plan.part_num(), 7);
        assert_eq!(plan.header().ttl_after_completion, 3600);
        assert_eq!(plan.header().blob_data.block_size(), 4096);
        assert_eq!(plan.transfer(0).unwrap().record().chunk_num, 3);
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Warn.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
