//! Migration runner for cja applications.
//!
//! Inspired by sqlx-cli and Rails migrations, this module loads raw SQL files
//! from an ordered list of directories and applies or reverts them, recording
//! applied versions in `_cja_migrations`.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::discovery::{Discovery, FsDiscovery, MigrationFile};
use crate::runner::{SearchPlan, Strategy};

/// Error type for migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Environment variable {0} must be set to the database URL")]
    MissingDatabaseUrl(String),

    #[error("Migration version {version} is defined twice: {} and {}", first.display(), second.display())]
    DuplicateVersion {
        version: u64,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Migration version {0} does not fit in a BIGINT")]
    VersionOutOfRange(u64),

    #[error("Interrupted before migrations finished")]
    Interrupted,

    #[error("Migration {version} ({name}) failed: {message}")]
    MigrationFailed {
        version: u64,
        name: String,
        message: String,
    },
}

/// A single migration loaded from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// The version number (timestamp) of the migration
    pub version: u64,
    /// The name of the migration (without version prefix)
    pub name: String,
    /// The SQL to execute for the "up" migration
    pub up_sql: String,
    /// The SQL to execute for the "down" migration (optional)
    pub down_sql: Option<String>,
    up_path: Option<PathBuf>,
    down_path: Option<PathBuf>,
}

/// Migration runner that loads and executes SQL migrations.
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    migrations: Vec<Migration>,
}

impl Migrator {
    /// Create a new empty migrator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load migrations from every directory in `plan`, skipping superseded
    /// files.
    ///
    /// Looks for files matching the patterns:
    /// - `YYYYMMDDHHMMSS_name.sql`
    /// - `YYYYMMDDHHMMSS_name.up.sql` / `YYYYMMDDHHMMSS_name.down.sql`
    ///
    /// Files that don't match are ignored. The same version showing up in two
    /// places is an error.
    pub fn from_plan(plan: &SearchPlan) -> Result<Self, MigrationError> {
        let mut migrations: BTreeMap<u64, Migration> = BTreeMap::new();
        let dirs = FsDiscovery.list_candidate_directories(&plan.paths);

        for dir in &dirs {
            let mut files = FsDiscovery.list_migration_files(dir);
            files.sort();

            for path in files {
                if plan.is_superseded(&path) {
                    continue;
                }
                let file = MigrationFile::new(&path);
                let Some(version) = file.timestamp() else {
                    continue;
                };

                let (name, is_down) = parse_migration_name(file.file_name());
                let sql = std::fs::read_to_string(&path)?;

                let migration = migrations.entry(version).or_insert_with(|| Migration {
                    version,
                    name,
                    up_sql: String::new(),
                    down_sql: None,
                    up_path: None,
                    down_path: None,
                });

                let slot = if is_down {
                    &mut migration.down_path
                } else {
                    &mut migration.up_path
                };
                if let Some(first) = slot {
                    return Err(MigrationError::DuplicateVersion {
                        version,
                        first: first.clone(),
                        second: path,
                    });
                }
                *slot = Some(path);

                if is_down {
                    migration.down_sql = Some(sql);
                } else {
                    migration.up_sql = sql;
                }
            }
        }

        Ok(Self {
            migrations: migrations.into_values().collect(),
        })
    }

    /// Load migrations from a single directory.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, MigrationError> {
        Self::from_plan(&SearchPlan {
            paths: vec![path.as_ref().to_path_buf()],
            superseded: Vec::new(),
        })
    }

    /// Get all migrations in this migrator, ordered by version.
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Migrations that would run going up, given the versions already applied.
    pub fn pending_for(&self, applied: &HashSet<u64>, strategy: Strategy) -> Vec<&Migration> {
        let pending = self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version));

        match strategy {
            Strategy::Default | Strategy::All => pending.collect(),
            Strategy::Step(n) => pending.take(n.get()).collect(),
            Strategy::To(target) => pending.filter(|m| m.version <= target).collect(),
        }
    }

    /// Versions that would be reverted going down, newest first.
    pub fn rollback_targets(applied: &[u64], strategy: Strategy) -> Vec<u64> {
        let mut applied = applied.to_vec();
        applied.sort_unstable_by(|a, b| b.cmp(a));

        match strategy {
            Strategy::Default => applied.into_iter().take(1).collect(),
            Strategy::All => applied,
            Strategy::Step(n) => applied.into_iter().take(n.get()).collect(),
            Strategy::To(target) => applied.into_iter().filter(|v| *v >= target).collect(),
        }
    }

    /// Run pending migrations against the database.
    ///
    /// This will:
    /// 1. Create the `_cja_migrations` table if it doesn't exist
    /// 2. Determine which migrations have already been applied
    /// 3. Run the selected pending migrations in order
    pub async fn run(
        &self,
        client: &tokio_postgres::Client,
        strategy: Strategy,
    ) -> Result<Vec<u64>, MigrationError> {
        ensure_migrations_table(client).await?;
        let applied: HashSet<u64> = applied_versions(client).await?.into_iter().collect();

        let mut ran = Vec::new();
        for migration in self.pending_for(&applied, strategy) {
            let version = bigint(migration.version)?;

            tracing::info!(
                version = migration.version,
                name = %migration.name,
                "Running migration"
            );

            if let Err(e) = client.batch_execute(&migration.up_sql).await {
                return Err(MigrationError::MigrationFailed {
                    version: migration.version,
                    name: migration.name.clone(),
                    message: e.to_string(),
                });
            }

            client
                .execute(
                    "INSERT INTO _cja_migrations (version, name) VALUES ($1, $2)",
                    &[&version, &migration.name],
                )
                .await?;

            tracing::info!(
                version = migration.version,
                name = %migration.name,
                "Migration completed"
            );
            ran.push(migration.version);
        }

        Ok(ran)
    }

    /// Roll back applied migrations, newest first.
    ///
    /// Returns an error if a selected migration is unknown or doesn't have a
    /// down script.
    pub async fn rollback(
        &self,
        client: &tokio_postgres::Client,
        strategy: Strategy,
    ) -> Result<Vec<u64>, MigrationError> {
        ensure_migrations_table(client).await?;
        let applied = applied_versions(client).await?;
        let targets = Self::rollback_targets(&applied, strategy);

        if targets.is_empty() {
            tracing::info!("No migrations to rollback");
        }

        let mut reverted = Vec::new();
        for version in targets {
            let migration = self
                .migrations
                .iter()
                .find(|m| m.version == version)
                .ok_or_else(|| MigrationError::MigrationFailed {
                    version,
                    name: String::new(),
                    message: "Migration not found in migrator".to_string(),
                })?;

            let down_sql =
                migration
                    .down_sql
                    .as_ref()
                    .ok_or_else(|| MigrationError::MigrationFailed {
                        version,
                        name: migration.name.clone(),
                        message: "No down migration available".to_string(),
                    })?;

            tracing::info!(version, name = %migration.name, "Rolling back migration");

            if let Err(e) = client.batch_execute(down_sql).await {
                return Err(MigrationError::MigrationFailed {
                    version,
                    name: migration.name.clone(),
                    message: e.to_string(),
                });
            }

            client
                .execute(
                    "DELETE FROM _cja_migrations WHERE version = $1",
                    &[&bigint(version)?],
                )
                .await?;

            tracing::info!(version, name = %migration.name, "Rollback completed");
            reverted.push(version);
        }

        Ok(reverted)
    }
}

async fn ensure_migrations_table(client: &tokio_postgres::Client) -> Result<(), MigrationError> {
    client
        .execute(
            "
            CREATE TABLE IF NOT EXISTS _cja_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
            &[],
        )
        .await?;

    Ok(())
}

async fn applied_versions(client: &tokio_postgres::Client) -> Result<Vec<u64>, MigrationError> {
    Ok(client
        .query("SELECT version FROM _cja_migrations", &[])
        .await?
        .iter()
        .filter_map(|row| u64::try_from(row.get::<_, i64>(0)).ok())
        .collect())
}

fn bigint(version: u64) -> Result<i64, MigrationError> {
    i64::try_from(version).map_err(|_| MigrationError::VersionOutOfRange(version))
}

/// Split a migration filename into its name and whether it's a down migration.
fn parse_migration_name(filename: &str) -> (String, bool) {
    // Remove .sql extension
    let without_sql = filename.trim_end_matches(".sql");

    // Check for .up or .down suffix using Path for case-insensitive comparison
    let path = Path::new(without_sql);
    let (base, is_down) = if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("up"))
    {
        (without_sql.trim_end_matches(".up"), false)
    } else if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("down"))
    {
        (without_sql.trim_end_matches(".down"), true)
    } else {
        (without_sql, false)
    };

    // Drop the version prefix
    let name = base.split_once('_').map_or(base, |(_, name)| name);

    (name.to_string(), is_down)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use assert_fs::prelude::*;

    use super::*;

    #[test]
    fn test_parse_migration_name_simple() {
        let (name, is_down) = parse_migration_name("20240101000000_create_users.sql");
        assert_eq!(name, "create_users");
        assert!(!is_down);
    }

    #[test]
    fn test_parse_migration_name_up() {
        let (name, is_down) = parse_migration_name("20240101000000_create_users.up.sql");
        assert_eq!(name, "create_users");
        assert!(!is_down);
    }

    #[test]
    fn test_parse_migration_name_down() {
        let (name, is_down) = parse_migration_name("20240101000000_create_users.down.sql");
        assert_eq!(name, "create_users");
        assert!(is_down);
    }

    #[test]
    fn test_from_plan_merges_directories_and_pairs() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("app/20230201000000_AddUsers.sql")
            .write_str("CREATE TABLE users ();")
            .unwrap();
        temp.child("dep/20240228040146_AddCrons.up.sql")
            .write_str("CREATE TABLE crons ();")
            .unwrap();
        temp.child("dep/20240228040146_AddCrons.down.sql")
            .write_str("DROP TABLE crons;")
            .unwrap();
        temp.child("dep/README.md").write_str("docs").unwrap();

        let migrator = Migrator::from_plan(&SearchPlan {
            paths: vec![
                temp.path().join("app"),
                temp.path().join("dep"),
                temp.path().join("missing"),
            ],
            superseded: Vec::new(),
        })
        .unwrap();

        let migrations = migrator.migrations();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 20_230_201_000_000);
        assert_eq!(migrations[0].name, "AddUsers");
        assert_eq!(migrations[1].name, "AddCrons");
        assert_eq!(migrations[1].up_sql, "CREATE TABLE crons ();");
        assert_eq!(migrations[1].down_sql.as_deref(), Some("DROP TABLE crons;"));
    }

    #[test]
    fn test_from_plan_skips_superseded_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        let original = temp.child("dep/20220101000000_AddJobsTable.sql");
        original.write_str("CREATE TABLE jobs ();").unwrap();
        temp.child("staging/20230201000001_AddJobsTable.sql")
            .write_str("CREATE TABLE jobs ();")
            .unwrap();

        let migrator = Migrator::from_plan(&SearchPlan {
            paths: vec![temp.path().join("dep"), temp.path().join("staging")],
            superseded: vec![original.path().to_path_buf()],
        })
        .unwrap();

        let versions: Vec<_> = migrator.migrations().iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![20_230_201_000_001]);
    }

    #[test]
    fn test_from_plan_rejects_duplicate_versions() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a/20230101000000_one.sql").write_str("").unwrap();
        temp.child("b/20230101000000_two.sql").write_str("").unwrap();

        let error = Migrator::from_plan(&SearchPlan {
            paths: vec![temp.path().join("a"), temp.path().join("b")],
            superseded: Vec::new(),
        })
        .unwrap_err();

        assert!(matches!(
            error,
            MigrationError::DuplicateVersion { version: 20_230_101_000_000, .. }
        ));
    }

    #[test]
    fn test_pending_for_strategies() {
        let temp = assert_fs::TempDir::new().unwrap();
        for name in [
            "20230101000000_a.sql",
            "20230102000000_b.sql",
            "20230103000000_c.sql",
        ] {
            temp.child(name).write_str("SELECT 1;").unwrap();
        }
        let migrator = Migrator::from_path(temp.path()).unwrap();
        let applied = HashSet::from([20_230_101_000_000]);
        let versions = |pending: Vec<&Migration>| -> Vec<u64> {
            pending.iter().map(|m| m.version).collect()
        };

        assert_eq!(
            versions(migrator.pending_for(&applied, Strategy::Default)),
            vec![20_230_102_000_000, 20_230_103_000_000]
        );
        assert_eq!(
            versions(migrator.pending_for(&applied, Strategy::Step(NonZeroUsize::MIN))),
            vec![20_230_102_000_000]
        );
        assert_eq!(
            versions(migrator.pending_for(&applied, Strategy::To(20_230_102_000_000))),
            vec![20_230_102_000_000]
        );
    }

    #[test]
    fn test_rollback_targets_strategies() {
        let applied = [20_230_101_000_000, 20_230_103_000_000, 20_230_102_000_000];

        assert_eq!(
            Migrator::rollback_targets(&applied, Strategy::Default),
            vec![20_230_103_000_000]
        );
        assert_eq!(
            Migrator::rollback_targets(&applied, Strategy::All),
            vec![20_230_103_000_000, 20_230_102_000_000, 20_230_101_000_000]
        );
        assert_eq!(
            Migrator::rollback_targets(&applied, Strategy::Step(NonZeroUsize::new(2).unwrap())),
            vec![20_230_103_000_000, 20_230_102_000_000]
        );
        assert_eq!(
            Migrator::rollback_targets(&applied, Strategy::To(20_230_102_000_000)),
            vec![20_230_103_000_000, 20_230_102_000_000]
        );
    }

    #[test]
    fn test_bigint_rejects_huge_versions() {
        assert!(bigint(20_230_101_000_000).is_ok());
        assert!(matches!(
            bigint(u64::MAX),
            Err(MigrationError::VersionOutOfRange(u64::MAX))
        ));
    }
}
