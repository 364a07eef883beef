//! Which databases to migrate and where their migrations live.
//!
//! Configuration is optional. Without a `cja-migrate.toml` the project gets a
//! single `primary` repository reading `DATABASE_URL` and the `migrations/`
//! directory, which is the layout `cja new` generates.
//!
//! ```toml
//! [[repo]]
//! name = "primary"
//! database_url_env = "DATABASE_URL"
//! migrations = ["migrations"]
//! dependency_migrations = "migrations"
//! dependencies = ["cja"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File looked up in the project directory when no config path is given.
pub const CONFIG_FILE_NAME: &str = "cja-migrate.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Repo '{0}' is configured more than once")]
    DuplicateRepo(String),

    #[error("Unknown repo '{name}' (configured: {})", known.join(", "))]
    UnknownRepo { name: String, known: Vec<String> },
}

/// One database and the migrations that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Repository {
    pub name: String,
    /// Environment variable holding the connection URL.
    pub database_url_env: String,
    /// Local migration directories, relative to the project directory.
    pub migrations: Vec<PathBuf>,
    /// Directory inside each dependency package that holds its migrations.
    pub dependency_migrations: PathBuf,
    /// Only these dependency packages contribute migrations. `None` means all.
    pub dependencies: Option<Vec<String>>,
}

impl Default for Repository {
    fn default() -> Self {
        Self {
            name: "primary".to_string(),
            database_url_env: "DATABASE_URL".to_string(),
            migrations: vec![PathBuf::from("migrations")],
            dependency_migrations: PathBuf::from("migrations"),
            dependencies: None,
        }
    }
}

impl Repository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Whether the dependency package `package` may contribute migrations.
    pub fn accepts_dependency(&self, package: &str) -> bool {
        match &self.dependencies {
            Some(allowed) => allowed.iter().any(|name| name == package),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, rename = "repo")]
    pub repos: Vec<Repository>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos: vec![Repository::default()],
        }
    }
}

impl Config {
    /// Parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content, path)
    }

    /// Load `explicit` if given, else `cja-migrate.toml` in `project_dir` if
    /// present, else the default single-repo config.
    pub fn discover(project_dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        let path = project_dir.join(CONFIG_FILE_NAME);
        if path.is_file() {
            tracing::debug!(path = %path.display(), "Loading migration config");
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.repos.is_empty() {
            config.repos.push(Repository::default());
        }

        let mut seen = HashSet::new();
        for repo in &config.repos {
            if !seen.insert(repo.name.as_str()) {
                return Err(ConfigError::DuplicateRepo(repo.name.clone()));
            }
        }

        Ok(config)
    }

    /// Repositories named in `names`, in config order. An empty filter selects
    /// every repository.
    pub fn select(&self, names: &[String]) -> Result<Vec<Repository>, ConfigError> {
        if let Some(unknown) = names
            .iter()
            .find(|name| !self.repos.iter().any(|repo| &repo.name == *name))
        {
            return Err(ConfigError::UnknownRepo {
                name: unknown.clone(),
                known: self.repos.iter().map(|repo| repo.name.clone()).collect(),
            });
        }

        Ok(self
            .repos
            .iter()
            .filter(|repo| names.is_empty() || names.contains(&repo.name))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;

    use super::*;

    #[test]
    fn test_empty_config_gets_default_repo() {
        let config = Config::parse("", Path::new(CONFIG_FILE_NAME)).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_repo_fields_default_individually() {
        let config = Config::parse(
            r#"
[[repo]]
name = "analytics"
database_url_env = "ANALYTICS_DATABASE_URL"
migrations = ["migrations/analytics"]
"#,
            Path::new(CONFIG_FILE_NAME),
        )
        .unwrap();

        assert_eq!(config.repos.len(), 1);
        let repo = &config.repos[0];
        assert_eq!(repo.name, "analytics");
        assert_eq!(repo.database_url_env, "ANALYTICS_DATABASE_URL");
        assert_eq!(repo.migrations, vec![PathBuf::from("migrations/analytics")]);
        assert_eq!(repo.dependency_migrations, PathBuf::from("migrations"));
        assert!(repo.accepts_dependency("anything"));
    }

    #[test]
    fn test_dependency_allow_list() {
        let repo = Repository {
            dependencies: Some(vec!["cja".to_string()]),
            ..Repository::default()
        };

        assert!(repo.accepts_dependency("cja"));
        assert!(!repo.accepts_dependency("sqlx"));
    }

    #[test]
    fn test_duplicate_repo_names_rejected() {
        let result = Config::parse(
            "[[repo]]\nname = \"a\"\n\n[[repo]]\nname = \"a\"\n",
            Path::new(CONFIG_FILE_NAME),
        );
        assert!(matches!(result, Err(ConfigError::DuplicateRepo(name)) if name == "a"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(CONFIG_FILE_NAME)
            .write_str("[[repo]]\nname = \"a\"\nmigration = \"typo\"\n")
            .unwrap();

        let error = Config::discover(temp.path(), None).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_discover_without_file_uses_default() {
        let temp = assert_fs::TempDir::new().unwrap();
        assert_eq!(Config::discover(temp.path(), None).unwrap(), Config::default());
    }

    #[test]
    fn test_discover_explicit_missing_file_errors() {
        let temp = assert_fs::TempDir::new().unwrap();
        let error = Config::discover(temp.path(), Some(&temp.path().join("nope.toml")));
        assert!(matches!(error, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_select_filters_and_rejects_unknown() {
        let config = Config {
            repos: vec![Repository::new("primary"), Repository::new("analytics")],
        };

        let all = config.select(&[]).unwrap();
        assert_eq!(all.len(), 2);

        let one = config.select(&["analytics".to_string()]).unwrap();
        assert_eq!(one, vec![Repository::new("analytics")]);

        let error = config.select(&["missing".to_string()]).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Unknown repo 'missing' (configured: primary, analytics)"
        );
    }
}
