//! Directory of plan files
//!
//! Each part lives in its own file named `<job-id>--<part:05>.steV<version>`.
//! The schema version is part of the name so files written by another schema
//! are skipped by [`PlanStore::list`] without being mapped.

use crate::builder::PlanBuilder;
use crate::error::{Error, Result};
use crate::header::JobId;
use crate::plan::JobPartPlan;
use crate::PLAN_SCHEMA_VERSION;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Location of one plan file, parsed from its name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PlanFileName {
    pub job_id: JobId,
    pub part_num: u32,
    pub version: u32,
}

impl PlanFileName {
    pub fn new(job_id: JobId, part_num: u32) -> Self {
        Self {
            job_id,
            part_num,
            version: PLAN_SCHEMA_VERSION,
        }
    }

    /// Parse `<job-id>--<part>.steV<version>`, `None` for anything else
    pub fn parse(name: &str) -> Option<Self> {
        let (stem, version) = name.rsplit_once(".steV")?;
        let (job_id, part_num) = stem.split_once("--")?;
        Some(Self {
            job_id: job_id.parse().ok()?,
            part_num: part_num.parse().ok()?,
            version: version.parse().ok()?,
        })
    }
}

impl std::fmt::Display for PlanFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}--{:05}.steV{}", self.job_id, self.part_num, self.version)
    }
}

/// A directory holding the plan files of many jobs
#[derive(Debug, Clone)]
pub struct PlanStore {
    root: PathBuf,
}

impl PlanStore {
    /// Use `root` as the plan directory, creating it if needed
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, job_id: JobId, part_num: u32) -> PathBuf {
        self.root.join(PlanFileName::new(job_id, part_num).to_string())
    }

    /// Write a new part file and map it; fails if the part already exists
    pub fn create_part(&self, builder: &PlanBuilder) -> Result<JobPartPlan> {
        let path = self.path_for(builder.job_id(), builder.part_num());
        debug!(path = %path.display(), "Creating plan file");
        builder.create(path)
    }

    /// Map an existing part read-write
    pub fn open_part(&self, job_id: JobId, part_num: u32) -> Result<JobPartPlan> {
        JobPartPlan::open(self.path_for(job_id, part_num))
    }

    /// Every plan file of the current schema, sorted by job then part
    pub fn list(&self) -> Result<Vec<PlanFileName>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(parsed) = name.to_str().and_then(PlanFileName::parse) else {
                continue;
            };
            if parsed.version != PLAN_SCHEMA_VERSION {
                warn!(
                    file = %name.to_string_lossy(),
                    version = parsed.version,
                    "Skipping plan file of another schema version"
                );
                continue;
            }
            found.push(parsed);
        }
        found.sort();
        Ok(found)
    }

    /// Parts of a single job, in part order
    pub fn parts_of(&self, job_id: JobId) -> Result<Vec<u32>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|name| name.job_id == job_id)
            .map(|name| name.part_num)
            .collect())
    }

    /// Delete a part file
    pub fn remove_part(&self, job_id: JobId, part_num: u32) -> Result<()> {
        let path = self.path_for(job_id, part_num);
        if !path.exists() {
            return Err(Error::not_found(path));
        }
        fs::remove_file(&path)?;
        debug!(path = %path.display(), "Removed plan file");
        Ok(())
    }
}
