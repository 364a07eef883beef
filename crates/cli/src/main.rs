//! # CJA CLI
//!
//! Runs the migrations of a [CJA](https://github.com/coreyja/cja) application
//! together with the migrations its dependencies ship.
//!
//! `cja new` copies the framework's migrations into a fresh project. Anything
//! added to a dependency after that never reaches the application. `cja
//! migrate` finds those migrations directly inside the dependency packages
//! and, when their versions predate the application's own, runs them under
//! fresh versions instead so they still apply after everything local.
//!
//! ## Quick Start
//!
//! ```bash
//! # Apply everything pending for every configured database
//! cja migrate
//!
//! # Apply the next two migrations of the analytics database only
//! cja migrate --repo analytics --step 2
//!
//! # Revert the last migration
//! cja rollback
//!
//! # Revert everything down to (and including) a version
//! cja rollback --to 20240101000000
//! ```
//!
//! ## Configuration
//!
//! Databases are read from `cja-migrate.toml` in the project directory. Without
//! it a single database is migrated from `DATABASE_URL` using `migrations/`.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgGroup, ArgMatches, Command};
use cja_migrate::db::PostgresRunner;
use cja_migrate::{
    CargoLocator, Config, Direction, Orchestrator, RepoOutcome, Reporter, RunOptions, Strategy,
};

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Targets `--log-level` applies to: the library and this binary.
const LOG_TARGETS: [&str; 2] = ["cja_migrate", env!("CARGO_CRATE_NAME")];

fn main() -> Result<()> {
    let matches = cli().get_matches();

    let (direction, sub_matches) = match matches.subcommand() {
        Some(("migrate", sub_matches)) => (Direction::Up, sub_matches),
        Some(("rollback", sub_matches)) => (Direction::Down, sub_matches),
        _ => unreachable!("Subcommand required"),
    };

    let log_level = sub_matches.get_one::<String>("log-level").map(String::as_str);
    tracing_common::setup_tracing(&LOG_TARGETS, log_level)?;

    run(direction, sub_matches)
}

fn cli() -> Command {
    Command::new("cja")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run application and dependency migrations in order")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(migration_args(
            Command::new("migrate").about("Apply pending migrations"),
            "Apply at most N pending migrations",
            "Apply pending migrations up to and including VERSION",
            "Apply every pending migration (the default)",
        ))
        .subcommand(migration_args(
            Command::new("rollback").about("Revert applied migrations (the last one by default)"),
            "Revert the last N applied migrations",
            "Revert applied migrations down to and including VERSION",
            "Revert every applied migration",
        ))
}

/// Arguments shared by `migrate` and `rollback`.
fn migration_args(command: Command, step_help: &str, to_help: &str, all_help: &str) -> Command {
    command
        .arg(
            Arg::new("repo")
                .long("repo")
                .help("Only migrate the named database (repeatable)")
                .value_name("NAME")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("step")
                .long("step")
                .help(step_help.to_string())
                .value_name("N")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("to")
                .long("to")
                .help(to_help.to_string())
                .value_name("VERSION")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("all")
                .long("all")
                .help(all_help.to_string())
                .action(clap::ArgAction::SetTrue),
        )
        .group(
            ArgGroup::new("strategy")
                .args(["step", "to", "all"])
                .multiple(false),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only print warnings and errors")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help("Diagnostic log level (overrides RUST_LOG)")
                .value_name("LEVEL")
                .value_parser(PossibleValuesParser::new(LOG_LEVELS)),
        )
        .arg(
            Arg::new("project-dir")
                .long("project-dir")
                .help("Project root containing Cargo.toml (defaults to the current directory)")
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("."),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Config file (defaults to cja-migrate.toml in the project directory)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("no-deps")
                .long("no-deps")
                .help("Skip migrations shipped by dependencies")
                .action(clap::ArgAction::SetTrue),
        )
}

fn strategy(matches: &ArgMatches) -> Result<Strategy> {
    if let Some(step) = matches.get_one::<u64>("step") {
        let step = usize::try_from(*step)
            .ok()
            .and_then(NonZeroUsize::new)
            .with_context(|| format!("Invalid --step value {step}"))?;
        return Ok(Strategy::Step(step));
    }
    if let Some(to) = matches.get_one::<u64>("to") {
        return Ok(Strategy::To(*to));
    }
    if matches.get_flag("all") {
        return Ok(Strategy::All);
    }

    Ok(Strategy::Default)
}

fn run(direction: Direction, matches: &ArgMatches) -> Result<()> {
    let options = RunOptions {
        strategy: strategy(matches)?,
    };
    let project_dir = matches
        .get_one::<PathBuf>("project-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));
    let config_path = matches.get_one::<PathBuf>("config");
    let names: Vec<String> = matches
        .get_many::<String>("repo")
        .map(|names| names.cloned().collect())
        .unwrap_or_default();

    let config = Config::discover(&project_dir, config_path.map(PathBuf::as_path))
        .context("Failed to load migration config")?;
    let repos = config.select(&names)?;

    let locator = CargoLocator::new(&project_dir).with_dependencies(!matches.get_flag("no-deps"));
    let reporter = Reporter::stdio(matches.get_flag("quiet"));
    let mut orchestrator = Orchestrator::new(locator, PostgresRunner, reporter);

    tracing::debug!(
        project_dir = %project_dir.display(),
        repos = repos.len(),
        %direction,
        "Starting migration run"
    );

    let outcomes = orchestrator.run(&repos, direction, &options)?;
    let changed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, RepoOutcome::Applied { .. }))
        .count();
    tracing::debug!(changed, "Migration run finished");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn test_strategy_from_flags() {
        let matches = cli().get_matches_from(["cja", "rollback", "--step", "3"]);
        let (_, sub_matches) = matches.subcommand().unwrap();
        assert_eq!(
            strategy(sub_matches).unwrap(),
            Strategy::Step(NonZeroUsize::new(3).unwrap())
        );

        let matches = cli().get_matches_from(["cja", "migrate", "--to", "20240101000000"]);
        let (_, sub_matches) = matches.subcommand().unwrap();
        assert_eq!(
            strategy(sub_matches).unwrap(),
            Strategy::To(20_240_101_000_000)
        );

        let matches = cli().get_matches_from(["cja", "migrate"]);
        let (_, sub_matches) = matches.subcommand().unwrap();
        assert_eq!(strategy(sub_matches).unwrap(), Strategy::Default);
    }

    #[test]
    fn test_conflicting_strategies_rejected() {
        let result = cli().try_get_matches_from(["cja", "rollback", "--all", "--step", "2"]);
        assert!(result.is_err());
    }
}
