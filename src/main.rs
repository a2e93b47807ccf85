/*!
 * jobplan CLI - inspect and control job part plans
 *
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use clap::{Args, Parser, Subcommand, ValueEnum};
use jobplan::{
    cli_style::{self, part_icon, print_error, print_success, print_warning},
    config::{LogLevel, PlanConfig},
    error::{JobPlanError, Result, EXIT_SUCCESS},
    logging,
    output::{OutputWriter, PartDetail, PartSummary},
    resume::{
        now_seconds, resume_directory, resume_part, unix_seconds, LocalSourceProbe, SourceProbe,
    },
};
use jobplan_core_plan::{JobId, JobPartPlan, PlanFileName, PlanStore, Priority};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "jobplan")]
#[command(version, about = "Inspect and control resumable job part plans", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Plan directory (overrides the configuration)
    #[arg(short = 'd', long = "dir", value_name = "DIR", global = true)]
    dir: Option<PathBuf>,

    /// Emit JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    /// Log level
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Write logs to a file as JSON
    #[arg(long = "log", value_name = "FILE", global = true)]
    log: Option<PathBuf>,

    /// Verbose logging (debug level)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every plan in the plan directory
    List,

    /// Write a new part copying local files into a directory
    Create(CreateArgs),

    /// Show the header and transfers of one plan file
    Inspect {
        /// Plan file
        file: PathBuf,
    },

    /// Pause a running part
    Pause {
        /// Plan file
        file: PathBuf,
    },

    /// Resume a part, or every part in the plan directory with --all
    Resume {
        /// Plan file
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        file: Option<PathBuf>,

        /// Resume every part in the plan directory
        #[arg(long)]
        all: bool,

        /// Skip comparing sources against the recorded size and modification time
        #[arg(long)]
        no_verify: bool,
    },

    /// Cancel a running part
    Cancel {
        /// Plan file
        file: PathBuf,
    },

    /// Validate every plan file in the plan directory
    Verify,

    /// Delete finished parts whose retention period has passed
    Prune {
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args)]
struct CreateArgs {
    /// Source files
    #[arg(required = true, value_name = "SOURCE")]
    sources: Vec<PathBuf>,

    /// Destination directory; each source keeps its file name
    #[arg(long, value_name = "DIR")]
    dest: PathBuf,

    /// Job the part belongs to (a new job when omitted)
    #[arg(long, value_name = "UUID")]
    job: Option<JobId>,

    /// Part number within the job
    #[arg(long, default_value_t = 0)]
    part: u32,

    /// Scheduling priority
    #[arg(long, value_enum, default_value = "high")]
    priority: PriorityArg,

    /// Mark this as the last part of the job
    #[arg(long = "final")]
    final_part: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PriorityArg {
    High,
    Medium,
    Low,
}

impl From<PriorityArg> for Priority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::High => Priority::High,
            PriorityArg::Medium => Priority::Medium,
            PriorityArg::Low => Priority::Low,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            print_error(&e.to_string(), hint_for(&e));
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn hint_for(err: &JobPlanError) -> Option<&'static str> {
    if err.is_integrity_failure() {
        Some("The plan file was written by another schema or is damaged; it was left untouched.")
    } else {
        None
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PlanConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.dir.clone() {
        config.plan_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if cli.log.is_some() {
        config.log_file = cli.log.clone();
    }
    config.verbose |= cli.verbose;

    if let Err(e) = logging::init_logging(&config) {
        print_warning(&format!("Failed to initialize logging: {}", e));
    }

    let out = OutputWriter::new(cli.json);
    match cli.command {
        Commands::List => list(&config, &out),
        Commands::Create(args) => create(&config, args, &out),
        Commands::Inspect { file } => inspect(&file, &out),
        Commands::Pause { file } => control(&file, &out, "pause", |plan| plan.pause()),
        Commands::Cancel { file } => control(&file, &out, "cancel", |plan| plan.cancel()),
        Commands::Resume {
            file,
            all,
            no_verify,
        } => {
            let verify = config.verify_sources_on_resume && !no_verify;
            match file {
                Some(file) if !all => resume_one(&file, verify, &out),
                _ => resume_all(&config, verify, &out),
            }
        }
        Commands::Verify => verify(&config, &out),
        Commands::Prune { dry_run } => prune(&config, dry_run, &out),
    }
}

fn open_store(config: &PlanConfig) -> Result<PlanStore> {
    if !config.plan_dir.is_dir() {
        return Err(JobPlanError::InvalidArgument(format!(
            "plan directory {} does not exist",
            config.plan_dir.display()
        )));
    }
    Ok(PlanStore::new(&config.plan_dir)?)
}

fn list(config: &PlanConfig, out: &OutputWriter) -> Result<()> {
    let store = open_store(config)?;
    let mut parts = Vec::new();
    for name in store.list()? {
        match JobPartPlan::open_read_only(store.path_for(name.job_id, name.part_num)) {
            Ok(plan) => parts.push(PartSummary::from_plan(&plan)),
            Err(e) => warn!(file = %name, error = %e, "Skipping unreadable plan"),
        }
    }
    out.parts(&parts)
}

fn create(config: &PlanConfig, args: CreateArgs, out: &OutputWriter) -> Result<()> {
    let store = PlanStore::new(&config.plan_dir)?;
    let job_id = args.job.unwrap_or_else(JobId::new);
    let path = store.path_for(job_id, args.part);
    if path.exists() {
        return Err(JobPlanError::InvalidArgument(format!(
            "{} already exists",
            path.display()
        )));
    }

    let mut builder = config
        .part_builder(job_id, args.part)?
        .priority(args.priority.into())
        .final_part(args.final_part);
    for source in &args.sources {
        let Some(file_name) = source.file_name() else {
            return Err(JobPlanError::InvalidArgument(format!(
                "source {} has no file name",
                source.display()
            )));
        };
        let spec = LocalSourceProbe.transfer_spec(source, &args.dest.join(file_name))?;
        builder.add_transfer(spec)?;
    }

    let plan = store.create_part(&builder)?;
    info!(
        file = %path.display(),
        transfers = plan.num_transfers(),
        "Created plan"
    );
    if out.is_json() {
        return out.json(&PartSummary::from_plan(&plan));
    }
    print_success(&format!(
        "created {} with {} transfers",
        path.display(),
        plan.num_transfers()
    ));
    Ok(())
}

fn inspect(file: &Path, out: &OutputWriter) -> Result<()> {
    let plan = JobPartPlan::open_read_only(file)?;
    out.detail(&PartDetail::from_plan(&plan))
}

#[derive(Serialize)]
struct ControlResult {
    file: String,
    action: &'static str,
    job_status: &'static str,
}

fn control<F>(file: &Path, out: &OutputWriter, action: &'static str, apply: F) -> Result<()>
where
    F: FnOnce(&JobPartPlan) -> jobplan_core_plan::Result<()>,
{
    let plan = JobPartPlan::open(file)?;
    apply(&plan)?;
    plan.flush()?;
    info!(file = %file.display(), action, "Applied job status change");

    let result = ControlResult {
        file: file.display().to_string(),
        action,
        job_status: plan.job_status().describe(),
    };
    if out.is_json() {
        out.json(&result)
    } else {
        print_success(&format!(
            "{} {} -> {}",
            part_icon(&plan),
            result.file,
            result.job_status
        ));
        Ok(())
    }
}

fn probe_for(verify: bool) -> Option<&'static dyn SourceProbe> {
    static LOCAL: LocalSourceProbe = LocalSourceProbe;
    verify.then_some(&LOCAL as &dyn SourceProbe)
}

fn resume_one(file: &Path, verify: bool, out: &OutputWriter) -> Result<()> {
    let plan = JobPartPlan::open(file)?;
    let report = resume_part(&plan, probe_for(verify), now_seconds())?;
    if !report.resumable {
        return Err(JobPlanError::NotResumable {
            part: file.display().to_string(),
            status: report.previous_status,
        });
    }
    if out.is_json() {
        return out.json(&report);
    }
    print_success(&format!(
        "{}: {} pending, {} finished, {} invalidated, {} unverified",
        file.display(),
        report.pending,
        report.finished,
        report.invalidated,
        report.unverified
    ));
    Ok(())
}

fn resume_all(config: &PlanConfig, verify: bool, out: &OutputWriter) -> Result<()> {
    let store = open_store(config)?;
    let summary = resume_directory(&store, probe_for(verify), now_seconds())?;

    if out.is_json() {
        out.json(&summary)?;
    } else {
        for report in &summary.reports {
            let line = format!(
                "{}--{:05}: {} pending, {} finished, {} invalidated, {} unverified",
                report.job_id,
                report.part_num,
                report.pending,
                report.finished,
                report.invalidated,
                report.unverified
            );
            if report.resumable {
                print_success(&line);
            } else {
                cli_style::print_info(&format!("{} ({})", line, report.previous_status));
            }
        }
        for failure in &summary.failures {
            print_warning(&format!("{}: {}", failure.file, failure.error));
        }
    }

    if summary.is_clean() {
        Ok(())
    } else {
        Err(JobPlanError::Partial {
            failed: summary.failures.len(),
            total: summary.failures.len() + summary.reports.len(),
        })
    }
}

#[derive(Serialize)]
struct VerifyResult {
    file: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn verify(config: &PlanConfig, out: &OutputWriter) -> Result<()> {
    let store = open_store(config)?;
    let names: Vec<PlanFileName> = store.list()?;
    let results: Vec<VerifyResult> = names
        .par_iter()
        .map(|name| {
            let path = store.path_for(name.job_id, name.part_num);
            let outcome = JobPartPlan::open_read_only(&path).and_then(|plan| {
                // Status words are not checked at open; report foreign codes here
                plan.job_status().load()?;
                for view in plan.transfers() {
                    view.status().load()?;
                }
                Ok(())
            });
            VerifyResult {
                file: name.to_string(),
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            }
        })
        .collect();

    let failed = results.iter().filter(|r| !r.ok).count();
    if out.is_json() {
        out.json(&results)?;
    } else {
        for result in &results {
            match &result.error {
                None => print_success(&result.file),
                Some(e) => print_error(&format!("{}: {}", result.file, e), None),
            }
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(JobPlanError::Plan(jobplan_core_plan::Error::corrupt(format!(
            "{} of {} plan files failed verification",
            failed,
            results.len()
        ))))
    }
}

#[derive(Serialize)]
struct PruneResult {
    file: String,
    removed: bool,
}

fn prune(config: &PlanConfig, dry_run: bool, out: &OutputWriter) -> Result<()> {
    let store = open_store(config)?;
    let now = now_seconds();
    let mut results = Vec::new();

    for name in store.list()? {
        let path = store.path_for(name.job_id, name.part_num);
        let expired = {
            let Ok(plan) = JobPartPlan::open_read_only(&path) else {
                continue;
            };
            // Last write to the file or last transfer to finish, whichever is later
            let last_finish = plan
                .transfers()
                .map(|view| view.completion_time())
                .max()
                .unwrap_or(0);
            let terminal_at = last_finish.max(modified_seconds(&path));
            plan.ttl_elapsed(terminal_at, now)
        };
        if !expired {
            continue;
        }
        if !dry_run {
            store.remove_part(name.job_id, name.part_num)?;
        }
        results.push(PruneResult {
            file: name.to_string(),
            removed: !dry_run,
        });
    }

    if out.is_json() {
        return out.json(&results);
    }
    if results.is_empty() {
        cli_style::print_info("Nothing to prune");
    }
    for result in &results {
        if result.removed {
            print_success(&format!("removed {}", result.file));
        } else {
            cli_style::print_info(&format!("would remove {}", result.file));
        }
    }
    Ok(())
}

fn modified_seconds(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(|t| unix_seconds(t.into()) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resume_requires_target() {
        assert!(Cli::try_parse_from(["jobplan", "resume"]).is_err());
        assert!(Cli::try_parse_from(["jobplan", "resume", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["jobplan", "resume", "part.steV0"]).is_ok());
        assert!(Cli::try_parse_from(["jobplan", "resume", "part.steV0", "--all"]).is_err());
    }

    #[test]
    fn test_create_args() {
        assert!(Cli::try_parse_from(["jobplan", "create", "--dest", "out"]).is_err());
        let cli = Cli::try_parse_from([
            "jobplan", "create", "a.txt", "b.txt", "--dest", "out", "--part", "3", "--priority",
            "low", "--final",
        ])
        .unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };
        assert_eq!(args.sources.len(), 2);
        assert_eq!(args.part, 3);
        assert_eq!(Priority::from(args.priority), Priority::Low);
        assert!(args.final_part);
        assert!(args.job.is_none());
    }
}
