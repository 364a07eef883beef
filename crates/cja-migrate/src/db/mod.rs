//! Applying migrations to Postgres.
//!
//! Migrations are raw SQL files. Files can be:
//!
//! - `YYYYMMDDHHMMSS_name.sql` - Single migration file (up only)
//! - `YYYYMMDDHHMMSS_name.up.sql` - Up migration (for reversible migrations)
//! - `YYYYMMDDHHMMSS_name.down.sql` - Down migration (optional)
//!
//! The timestamp prefix ensures migrations run in chronological order, across
//! every directory of a [`SearchPlan`].
//!
//! # Example
//!
//! ```rust,no_run
//! use cja_migrate::db::PostgresRunner;
//! use cja_migrate::{Direction, MigrationRunner, Repository, RunOptions, SearchPlan};
//!
//! # fn example() -> Result<(), cja_migrate::RunnerError> {
//! let plan = SearchPlan {
//!     paths: vec!["./migrations".into()],
//!     superseded: Vec::new(),
//! };
//! let applied = PostgresRunner.run(
//!     &Repository::default(),
//!     &plan,
//!     Direction::Up,
//!     &RunOptions::default(),
//! )?;
//! # Ok(())
//! # }
//! ```

mod migrations;

pub use migrations::*;

use std::future::Future;

use tokio_postgres::NoTls;

use crate::config::Repository;
use crate::runner::{Direction, MigrationRunner, RunOptions, RunnerError, SearchPlan};

/// Runs migrations against the database named by the repository's
/// `database_url_env` variable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresRunner;

impl PostgresRunner {
    async fn run_async(
        repo: &Repository,
        plan: &SearchPlan,
        direction: Direction,
        options: &RunOptions,
    ) -> Result<Vec<u64>, MigrationError> {
        let migrator = Migrator::from_plan(plan)?;

        let url = std::env::var(&repo.database_url_env)
            .map_err(|_| MigrationError::MissingDatabaseUrl(repo.database_url_env.clone()))?;
        let (client, connection) = tokio_postgres::connect(&url, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Database connection error");
            }
        });

        match direction {
            Direction::Up => migrator.run(&client, options.strategy).await,
            Direction::Down => migrator.rollback(&client, options.strategy).await,
        }
    }
}

/// Drive `work` until it finishes or `interrupt` resolves, whichever is first.
///
/// Dropping `work` closes the connection, so control returns to the caller and
/// the staging directory is cleaned up like on any other runner error.
async fn until_interrupted<T>(
    work: impl Future<Output = Result<T, MigrationError>>,
    interrupt: impl Future<Output = std::io::Result<()>>,
) -> Result<T, MigrationError> {
    tokio::select! {
        result = work => result,
        signal = interrupt => {
            signal?;
            tracing::warn!("Interrupted, stopping migrations");
            Err(MigrationError::Interrupted)
        }
    }
}

impl MigrationRunner for PostgresRunner {
    #[tracing::instrument(name = "migrate.postgres", skip_all, fields(repo = %repo.name, %direction))]
    fn run(
        &mut self,
        repo: &Repository,
        plan: &SearchPlan,
        direction: Direction,
        options: &RunOptions,
    ) -> Result<Vec<u64>, RunnerError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(runtime.block_on(until_interrupted(
            Self::run_async(repo, plan, direction, options),
            tokio::signal::ctrl_c(),
        ))?)
    }
}
