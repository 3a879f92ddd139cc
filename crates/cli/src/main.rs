//! stack-compose CLI - deploy and tear down ordered levels of stacks

mod commands;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use commands::RunArgs;
use logging::LogFormat;
use stackcompose_core::domain::RunMode;

const DEFAULT_COMPOSE_FILE: &str = "stack-compose.yml";

#[derive(Parser)]
#[command(name = "stack-compose")]
#[command(about = "Deploy and tear down ordered levels of infrastructure stacks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Compose file
    #[arg(short, long, global = true, env = "STACK_COMPOSE_FILE", default_value = DEFAULT_COMPOSE_FILE)]
    file: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log output format
    #[arg(long, global = true, env = "STACK_COMPOSE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy all jobs, lowest order first
    #[command(visible_alias = "up")]
    Deploy(RunArgs),

    /// Destroy all jobs, highest order first
    #[command(visible_alias = "down")]
    Destroy(RunArgs),

    /// Helpers to work with the compose file
    #[command(visible_alias = "c")]
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Validate the compose file
    #[command(visible_alias = "vd")]
    Validate,

    /// Show the level-by-level execution plan
    Plan {
        /// Show the destroy plan instead of the deploy plan
        #[arg(long)]
        destroy: bool,
    },

    /// Print (or write) a sample compose file
    Generate {
        /// Write to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format)?;

    info!(version = stackcompose_core::VERSION, "stack-compose starting");

    match cli.command {
        Commands::Deploy(args) => commands::compose(&cli.file, RunMode::Deploy, args).await,
        Commands::Destroy(args) => commands::compose(&cli.file, RunMode::Destroy, args).await,
        Commands::Config { command } => match command {
            ConfigCommands::Validate => commands::validate(&cli.file),
            ConfigCommands::Plan { destroy } => {
                commands::plan(&cli.file, RunMode::from_deploy_flag(!destroy))
            }
            ConfigCommands::Generate { output } => commands::generate(output.as_deref()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use stackcompose_core::application::InFlightPolicy;
    use std::time::Duration;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_deploy_flags() {
        let cli = Cli::try_parse_from([
            "stack-compose",
            "-vv",
            "-f",
            "envs/prod.yml",
            "deploy",
            "--dry-run",
            "--grace-secs",
            "3",
            "--abort-in-flight",
            "--program-arg",
            "--endpoint-url=http://localhost:4566",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.file, PathBuf::from("envs/prod.yml"));
        match cli.command {
            Commands::Deploy(args) => {
                assert!(args.dry_run);
                let options = args.run_options();
                assert_eq!(options.grace_period, Duration::from_secs(3));
                assert_eq!(options.in_flight_policy, InFlightPolicy::Abort);
                assert_eq!(args.cli_program().global_args, vec!["--endpoint-url=http://localhost:4566"]);
            }
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_parse_config_plan_alias() {
        let cli = Cli::try_parse_from(["stack-compose", "c", "plan", "--destroy"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Plan { destroy: true }
            }
        ));
        assert_eq!(cli.file, PathBuf::from(DEFAULT_COMPOSE_FILE));
    }
}
