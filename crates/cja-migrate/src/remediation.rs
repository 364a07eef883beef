//! Re-versioning dependency migrations that would otherwise run before the
//! application's own.
//!
//! Offending files are copied into a [`StagingDirectory`] under a new version
//! that sorts after every local migration. Every literal occurrence of the old
//! version inside the file is rewritten too, so identifiers derived from it
//! keep matching. The originals are never touched.

use std::path::{Path, PathBuf};

use crate::discovery::MigrationFile;
use crate::error::MigrateError;
use crate::report::Reporter;
use crate::staging::StagingDirectory;
use crate::timestamp::{render_timestamped_name, MAX_TIMESTAMP};

/// How a single dependency migration gets re-versioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationPlan {
    pub original_path: PathBuf,
    pub new_file_name: String,
    pub old_timestamp: u64,
    pub new_timestamp: u64,
}

impl RemediationPlan {
    /// Where the rewritten copy lands inside `staging_dir`.
    pub fn new_path(&self, staging_dir: &Path) -> PathBuf {
        staging_dir.join(&self.new_file_name)
    }

    fn original_file_name(&self) -> String {
        self.original_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Rewritten copies of dependency migrations and the directory holding them.
#[derive(Debug)]
pub struct Remediation {
    pub staging: StagingDirectory,
    pub plans: Vec<RemediationPlan>,
}

/// Work out new versions for every dependency migration at or before
/// `latest_local`.
///
/// New versions start at `max(latest_local + 1, now)` and increase by one per
/// migration in ascending order of the original version. The `.up.sql` and
/// `.down.sql` halves of one migration share a version; same-named files from
/// different directories do not. A version past [`MAX_TIMESTAMP`] is an error.
pub fn plan_remediation(
    dependency: &[MigrationFile],
    latest_local: u64,
    now: u64,
) -> Result<Vec<RemediationPlan>, MigrateError> {
    let mut selected: Vec<(&MigrationFile, u64)> = dependency
        .iter()
        .filter_map(|file| file.timestamp().map(|ts| (file, ts)))
        .filter(|(_, ts)| *ts <= latest_local)
        .collect();
    selected.sort_by(|(a, _), (b, _)| a.sort_key().cmp(&b.sort_key()));

    let base = latest_local.saturating_add(1).max(now);
    let mut next = base;
    let mut previous_key: Option<(&Path, &str)> = None;
    let mut plans = Vec::with_capacity(selected.len());

    for (file, old_timestamp) in selected {
        let key = file.pairing_key();
        if previous_key.is_some_and(|previous| previous != key) {
            next = next.saturating_add(1);
        }
        previous_key = Some(key);

        if next > MAX_TIMESTAMP {
            return Err(MigrateError::TimestampOverflow {
                path: file.path().to_path_buf(),
                version: next,
            });
        }

        plans.push(RemediationPlan {
            original_path: file.path().to_path_buf(),
            new_file_name: render_timestamped_name(next, file.file_name()),
            old_timestamp,
            new_timestamp: next,
        });
    }

    Ok(plans)
}

/// Copy out-of-order dependency migrations into a fresh staging directory
/// under `staging_root`, re-versioned per [`plan_remediation`].
///
/// Returns `None` when nothing needed rewriting; no directory is created in
/// that case. On error the partially written directory is removed.
#[tracing::instrument(name = "migrate.remediate", skip_all, fields(latest_local = latest_local, now = now))]
pub fn remediate(
    dependency: &[MigrationFile],
    latest_local: u64,
    now: u64,
    staging_root: &Path,
    reporter: &Reporter,
) -> Result<Option<Remediation>, MigrateError> {
    let plans = plan_remediation(dependency, latest_local, now)?;
    if plans.is_empty() {
        return Ok(None);
    }

    let staging =
        StagingDirectory::create_in(staging_root).map_err(|source| MigrateError::CreateStaging {
            parent: staging_root.to_path_buf(),
            source,
        })?;

    for plan in &plans {
        materialize(plan, staging.path())?;
        reporter.info(format_args!(
            "{} -> {}",
            plan.original_file_name(),
            plan.new_file_name
        ));
    }

    tracing::debug!(
        remediated = plans.len(),
        staging = %staging.path().display(),
        "Staged re-versioned dependency migrations"
    );

    Ok(Some(Remediation { staging, plans }))
}

fn materialize(plan: &RemediationPlan, staging_dir: &Path) -> Result<(), MigrateError> {
    let content = std::fs::read_to_string(&plan.original_path).map_err(|source| {
        MigrateError::ReadMigration {
            path: plan.original_path.clone(),
            source,
        }
    })?;

    let rewritten = content.replace(
        &format!("{:014}", plan.old_timestamp),
        &format!("{:014}", plan.new_timestamp),
    );

    let new_path = plan.new_path(staging_dir);
    std::fs::write(&new_path, rewritten).map_err(|source| MigrateError::WriteMigration {
        path: new_path.clone(),
        source,
    })
}
