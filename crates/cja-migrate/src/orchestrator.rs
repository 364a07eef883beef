//! Sequencing discovery, remediation and the runner for each repository.

use std::path::PathBuf;

use crate::config::Repository;
use crate::discovery::{classify, Discovery, FsDiscovery};
use crate::error::MigrateError;
use crate::locator::PackageLocator;
use crate::ordering::{latest_local_timestamp, needs_adjustment};
use crate::remediation::remediate;
use crate::report::Reporter;
use crate::runner::{Direction, MigrationRunner, RunOptions, SearchPlan};
use crate::staging::StagingLifecycle;
use crate::timestamp::{Clock, SystemClock};

/// What happened to one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOutcome {
    /// None of the expected migration directories exist.
    NoPaths,
    /// The runner had nothing to do.
    UpToDate,
    /// The runner applied or reverted these versions, in order.
    Applied {
        direction: Direction,
        versions: Vec<u64>,
    },
}

/// Drives migrations for a set of repositories, one after another.
pub struct Orchestrator<L, R, D = FsDiscovery, C = SystemClock> {
    locator: L,
    runner: R,
    discovery: D,
    clock: C,
    reporter: Reporter,
    staging_root: PathBuf,
}

impl<L, R> Orchestrator<L, R>
where
    L: PackageLocator,
    R: MigrationRunner,
{
    /// Staging directories are created under the system temp directory.
    pub fn new(locator: L, runner: R, reporter: Reporter) -> Self {
        Self {
            locator,
            runner,
            discovery: FsDiscovery,
            clock: SystemClock,
            reporter,
            staging_root: std::env::temp_dir(),
        }
    }
}

impl<L, R, D, C> Orchestrator<L, R, D, C>
where
    L: PackageLocator,
    R: MigrationRunner,
    D: Discovery,
    C: Clock,
{
    pub fn with_discovery<D2: Discovery>(self, discovery: D2) -> Orchestrator<L, R, D2, C> {
        Orchestrator {
            locator: self.locator,
            runner: self.runner,
            discovery,
            clock: self.clock,
            reporter: self.reporter,
            staging_root: self.staging_root,
        }
    }

    pub fn with_clock<C2: Clock>(self, clock: C2) -> Orchestrator<L, R, D, C2> {
        Orchestrator {
            locator: self.locator,
            runner: self.runner,
            discovery: self.discovery,
            clock,
            reporter: self.reporter,
            staging_root: self.staging_root,
        }
    }

    #[must_use]
    pub fn with_staging_root(mut self, staging_root: impl Into<PathBuf>) -> Self {
        self.staging_root = staging_root.into();
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Migrate every repository in order, stopping at the first failure.
    pub fn run(
        &mut self,
        repos: &[Repository],
        direction: Direction,
        options: &RunOptions,
    ) -> Result<Vec<RepoOutcome>, MigrateError> {
        repos
            .iter()
            .map(|repo| self.run_repository(repo, direction, options))
            .collect()
    }

    #[tracing::instrument(name = "migrate.repository", skip_all, fields(repo = %repo.name, %direction))]
    pub fn run_repository(
        &mut self,
        repo: &Repository,
        direction: Direction,
        options: &RunOptions,
    ) -> Result<RepoOutcome, MigrateError> {
        let local_dirs = self.locator.local_dirs(repo);
        let dependency_dirs = match self.locator.dependency_dirs(repo) {
            Ok(dirs) => dirs,
            Err(error) => {
                tracing::warn!(%error, "Dependency discovery failed");
                self.reporter.warn(format_args!(
                    "Could not list dependency migrations for repo {}: {error}",
                    repo.name
                ));
                Vec::new()
            }
        };

        let all_dirs: Vec<PathBuf> = local_dirs
            .iter()
            .chain(dependency_dirs.iter())
            .cloned()
            .collect();
        let classified = classify(&self.discovery, &local_dirs, &all_dirs);

        let mut paths: Vec<PathBuf> = classified
            .search_paths()
            .into_iter()
            .map(|search_path| search_path.dir)
            .collect();
        if paths.is_empty() {
            let expected: Vec<String> = all_dirs
                .iter()
                .map(|dir| dir.display().to_string())
                .collect();
            self.reporter.warn(format_args!(
                "No migration paths found for repo {} (looked in: {})",
                repo.name,
                expected.join(", ")
            ));
            return Ok(RepoOutcome::NoPaths);
        }

        let latest_local = latest_local_timestamp(&classified.local);
        let mut lifecycle = StagingLifecycle::default();
        let mut superseded = Vec::new();

        if needs_adjustment(&classified.dependency, latest_local) {
            if let Some(remediation) = remediate(
                &classified.dependency,
                latest_local,
                self.clock.now(),
                &self.staging_root,
                &self.reporter,
            )? {
                superseded = remediation
                    .plans
                    .iter()
                    .map(|plan| plan.original_path.clone())
                    .collect();
                lifecycle.register(remediation.staging);
            }
        }
        if let Some(staging) = lifecycle.path() {
            paths.push(staging.to_path_buf());
        }

        for path in &paths {
            self.reporter.info(format_args!("Using {}", path.display()));
        }

        let plan = SearchPlan { paths, superseded };
        let result = self.runner.run(repo, &plan, direction, options);

        if let Err(error) = lifecycle.cleanup() {
            tracing::warn!(%error, "Failed to remove staging directory");
            self.reporter
                .warn(format_args!("Failed to remove staging directory: {error}"));
        }

        let versions = result.map_err(|source| MigrateError::Runner {
            repo: repo.name.clone(),
            source,
        })?;

        if versions.is_empty() {
            self.reporter.info("Already up to date");
            Ok(RepoOutcome::UpToDate)
        } else {
            self.reporter.info(format_args!(
                "{} {} file(s)",
                direction.past_tense(),
                versions.len()
            ));
            Ok(RepoOutcome::Applied {
                direction,
                versions,
            })
        }
    }
}
