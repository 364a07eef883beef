use std::path::PathBuf;

use thiserror::Error;

use crate::runner::RunnerError;

/// Errors that abort migrating a repository.
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("Failed to create staging directory in {}: {source}", parent.display())]
    CreateStaging {
        parent: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read dependency migration {}: {source}", path.display())]
    ReadMigration {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write remediated migration {}: {source}", path.display())]
    WriteMigration {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Cannot re-version {}: {version} does not fit in a 14-digit prefix",
        path.display()
    )]
    TimestampOverflow { path: PathBuf, version: u64 },

    #[error("Migrations failed for repo {repo}: {source}")]
    Runner { repo: String, source: RunnerError },
}
