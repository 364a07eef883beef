//! Finding migration files and sorting out which ones the application owns.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::timestamp::extract_timestamp;

/// Extension every migration file carries.
pub const MIGRATION_EXTENSION: &str = "sql";

/// Where a migration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationOrigin {
    /// Lives in one of the application's own migration directories.
    Local,
    /// Shipped inside a dependency.
    Dependency,
}

/// A directory that migrations are read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchPath {
    pub dir: PathBuf,
    pub origin: MigrationOrigin,
}

/// A migration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    path: PathBuf,
    timestamp: Option<u64>,
}

impl MigrationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let timestamp = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(extract_timestamp);

        Self { path, timestamp }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `None` when the filename doesn't follow `<14 digits>_<name>.sql`.
    pub fn timestamp(&self) -> Option<u64> {
        self.timestamp
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }

    /// The filename with `.sql` and any `.up` / `.down` suffix removed.
    ///
    /// Both halves of a reversible migration share a key.
    pub fn migration_key(&self) -> &str {
        let name = self.file_name();
        let name = name
            .strip_suffix(".sql")
            .or_else(|| name.strip_suffix(".SQL"))
            .unwrap_or(name);

        let stem = Path::new(name);
        let is_direction = stem.extension().is_some_and(|ext| {
            ext.eq_ignore_ascii_case("up") || ext.eq_ignore_ascii_case("down")
        });

        if is_direction {
            stem.file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or(name)
        } else {
            name
        }
    }

    /// The containing directory with [`migration_key`](Self::migration_key).
    ///
    /// Halves only pair up inside one directory. Two dependencies shipping
    /// the same file name are still two migrations.
    pub fn pairing_key(&self) -> (&Path, &str) {
        (
            self.path.parent().unwrap_or_else(|| Path::new("")),
            self.migration_key(),
        )
    }

    /// Total order used for dependency migrations: timestamp, then key, then
    /// directory, then file name.
    pub fn sort_key(&self) -> (Option<u64>, &str, &Path, &str) {
        let (dir, key) = self.pairing_key();
        (self.timestamp, key, dir, self.file_name())
    }
}

/// Access to the directories migrations are discovered in.
///
/// [`FsDiscovery`] reads the real filesystem; tests swap in fixtures.
pub trait Discovery {
    /// The subset of `candidates` that exist as directories, in input order.
    fn list_candidate_directories(&self, candidates: &[PathBuf]) -> Vec<PathBuf>;

    /// Immediate `*.sql` files of `dir`, in listing order.
    fn list_migration_files(&self, dir: &Path) -> Vec<PathBuf>;
}

/// [`Discovery`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsDiscovery;

impl Discovery for FsDiscovery {
    fn list_candidate_directories(&self, candidates: &[PathBuf]) -> Vec<PathBuf> {
        // `is_dir` folds permission errors into `false`, which is what we want:
        // half-readable dependency trees shouldn't stop discovery.
        candidates.iter().filter(|dir| dir.is_dir()).cloned().collect()
    }

    fn list_migration_files(&self, dir: &Path) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::debug!(dir = %dir.display(), %error, "Skipping unreadable migration directory");
                return Vec::new();
            }
        };

        entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case(MIGRATION_EXTENSION))
            })
            .collect()
    }
}

/// Migrations split by origin, together with the directories they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    /// Local migrations in directory order, then listing order.
    pub local: Vec<MigrationFile>,
    /// Dependency migrations sorted by timestamp.
    pub dependency: Vec<MigrationFile>,
    /// Existing local directories.
    pub local_paths: Vec<PathBuf>,
    /// Existing dependency directories.
    pub dependency_paths: Vec<PathBuf>,
}

impl Classified {
    /// Every existing directory, local ones first.
    pub fn search_paths(&self) -> Vec<SearchPath> {
        let local = self.local_paths.iter().map(|dir| SearchPath {
            dir: dir.clone(),
            origin: MigrationOrigin::Local,
        });
        let dependency = self.dependency_paths.iter().map(|dir| SearchPath {
            dir: dir.clone(),
            origin: MigrationOrigin::Dependency,
        });

        local.chain(dependency).collect()
    }

    /// Origin of a discovered file, decided by its parent directory.
    pub fn origin_of(&self, file: &MigrationFile) -> Option<MigrationOrigin> {
        let parent = file.path().parent()?;

        if self.local_paths.iter().any(|dir| dir == parent) {
            Some(MigrationOrigin::Local)
        } else if self.dependency_paths.iter().any(|dir| dir == parent) {
            Some(MigrationOrigin::Dependency)
        } else {
            None
        }
    }
}

/// Discover migrations under `all_paths` and split them into local and
/// dependency migrations.
///
/// `all_paths` is expected to contain `local_paths`; whatever else it holds is
/// treated as dependency directories. Missing directories and files without a
/// version prefix are dropped silently.
#[tracing::instrument(name = "migrate.classify", skip_all)]
pub fn classify(
    discovery: &impl Discovery,
    local_paths: &[PathBuf],
    all_paths: &[PathBuf],
) -> Classified {
    let local_paths = discovery.list_candidate_directories(&dedup(local_paths));
    let all_paths = discovery.list_candidate_directories(&dedup(all_paths));

    let local_set: HashSet<&PathBuf> = local_paths.iter().collect();
    let dependency_paths: Vec<PathBuf> = all_paths
        .iter()
        .filter(|dir| !local_set.contains(dir))
        .cloned()
        .collect();

    let local = collect_migrations(discovery, &local_paths);

    let mut dependency = collect_migrations(discovery, &dependency_paths);
    // Ties are broken by key then directory so up/down halves stay adjacent.
    dependency.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    tracing::debug!(
        local_dirs = local_paths.len(),
        dependency_dirs = dependency_paths.len(),
        local_migrations = local.len(),
        dependency_migrations = dependency.len(),
        "Classified migrations"
    );

    Classified {
        local,
        dependency,
        local_paths,
        dependency_paths,
    }
}

fn collect_migrations(discovery: &impl Discovery, dirs: &[PathBuf]) -> Vec<MigrationFile> {
    dirs.iter()
        .flat_map(|dir| discovery.list_migration_files(dir))
        .map(MigrationFile::new)
        .filter(|file| file.timestamp().is_some())
        .collect()
}

fn dedup(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .filter(|path| seen.insert(*path))
        .cloned()
        .collect()
}
