//! Subcommand implementations

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::info;

use stackcompose_core::application::{
    Composer, ExecutionPlan, InFlightPolicy, RunOptions, RunReport, RunRequest,
};
use stackcompose_core::domain::{ComposeConfig, RunMode};
use stackcompose_infra_file::{sample_compose, ComposeFileLoader};
use stackcompose_infra_system::program::DEFAULT_PROGRAM;
use stackcompose_infra_system::{CliProgram, CliSessionProvider, CliStackBackend};

/// Flags shared by `deploy` and `destroy`
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Use the non-mutating variant of every backend operation
    #[arg(long)]
    pub dry_run: bool,

    /// Pause before each job starts, in milliseconds
    #[arg(long, env = "STACK_COMPOSE_PACING_MS", default_value_t = 500)]
    pub pacing_ms: u64,

    /// Drain window after a failure, in seconds
    #[arg(long, env = "STACK_COMPOSE_GRACE_SECS", default_value_t = 10)]
    pub grace_secs: u64,

    /// Wait after the last level succeeds, in seconds
    #[arg(long, env = "STACK_COMPOSE_SETTLE_SECS", default_value_t = 2)]
    pub settle_secs: u64,

    /// Abort jobs still running when the grace period ends
    #[arg(long)]
    pub abort_in_flight: bool,

    /// Provisioning CLI to invoke
    #[arg(long, env = "STACK_COMPOSE_PROGRAM", default_value = DEFAULT_PROGRAM)]
    pub program: String,

    /// Extra argument placed before every CLI subcommand (repeatable)
    #[arg(long = "program-arg", allow_hyphen_values = true)]
    pub program_args: Vec<String>,
}

impl RunArgs {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            pacing_delay: Duration::from_millis(self.pacing_ms),
            grace_period: Duration::from_secs(self.grace_secs),
            settle_delay: Duration::from_secs(self.settle_secs),
            in_flight_policy: if self.abort_in_flight {
                InFlightPolicy::Abort
            } else {
                InFlightPolicy::Detach
            },
        }
    }

    pub fn cli_program(&self) -> CliProgram {
        CliProgram::new(&self.program).with_global_args(self.program_args.iter().cloned())
    }
}

fn load(file: &Path) -> Result<ComposeConfig> {
    ComposeFileLoader::load(file)
        .with_context(|| format!("Failed while fetching compose file {}", file.display()))
}

/// Deploy or destroy every job in the compose file
pub async fn compose(file: &Path, mode: RunMode, args: RunArgs) -> Result<ExitCode> {
    let config = load(file)?;
    let program = args.cli_program();

    let composer = Composer::new(
        Arc::new(CliStackBackend::new(program.clone())),
        Arc::new(CliSessionProvider::new(program)),
    )
    .with_options(args.run_options());

    let request = RunRequest {
        mode,
        dry_run: args.dry_run,
    };
    let report = composer.run(&config, request).await?;
    print_report(&report);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &RunReport) {
    let what = match (report.mode, report.dry_run) {
        (RunMode::Deploy, false) => "Deploy",
        (RunMode::Deploy, true) => "Deploy dry run",
        (RunMode::Destroy, false) => "Destroy",
        (RunMode::Destroy, true) => "Destroy dry run",
    };

    match &report.failure {
        None => println!(
            "{} {} completed: {} jobs in {:.1}s",
            "✔".green(),
            what,
            report.total_jobs,
            report.duration_ms() as f64 / 1000.0
        ),
        Some(failure) => {
            println!("{} {} failed: {}", "✘".red(), what, failure.to_string().red());
            if report.discarded_outcomes > 0 {
                println!(
                    "  {} late job result(s) discarded after cancellation",
                    report.discarded_outcomes
                );
            }
        }
    }
}

pub fn validate(file: &Path) -> Result<ExitCode> {
    let config = load(file)?;
    info!(jobs = config.jobs.len(), "Compose file is valid");
    println!(
        "{} All good!! {} jobs, {} stacks",
        "✔".green(),
        config.jobs.len(),
        config.total_stacks()
    );
    Ok(ExitCode::SUCCESS)
}

#[derive(Tabled)]
struct PlanRow {
    step: usize,
    order: i32,
    job: String,
    stacks: String,
}

/// Rows of the execution plan, one per job
fn plan_rows(config: &ComposeConfig, mode: RunMode) -> Vec<PlanRow> {
    let plan = ExecutionPlan::build(config, mode);
    plan.groups()
        .iter()
        .enumerate()
        .flat_map(|(step, group)| {
            group.jobs.iter().map(move |job| PlanRow {
                step: step + 1,
                order: group.order,
                job: job.name.clone(),
                stacks: job
                    .stacks_for(mode)
                    .map(|s| s.stack_name.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> "),
            })
        })
        .collect()
}

pub fn plan(file: &Path, mode: RunMode) -> Result<ExitCode> {
    let config = load(file)?;
    println!("{}", format!("{} plan", mode).bold());
    println!("{}", Table::new(plan_rows(&config, mode)));
    Ok(ExitCode::SUCCESS)
}

pub fn generate(output: Option<&Path>) -> Result<ExitCode> {
    match output {
        Some(path) => {
            if path.exists() {
                anyhow::bail!("Refusing to overwrite existing file {}", path.display());
            }
            std::fs::write(path, sample_compose())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{} Wrote sample compose file to {}", "✔".green(), path.display());
        }
        None => print!("{}", sample_compose()),
    }
    Ok(ExitCode::SUCCESS)
}
