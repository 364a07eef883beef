//! Finding migration directories for the application and its dependencies.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use thiserror::Error;

use crate::config::Repository;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("No Cargo.toml found in {}", .0.display())]
    ManifestMissing(PathBuf),

    #[error("Failed to execute cargo metadata: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("cargo metadata failed: {0}")]
    Cargo(String),

    #[error("Failed to parse cargo metadata output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Yields the directories migrations are discovered in.
pub trait PackageLocator {
    /// The application's own migration directories for `repo`.
    fn local_dirs(&self, repo: &Repository) -> Vec<PathBuf>;

    /// One migration directory per dependency package that may contribute
    /// migrations to `repo`.
    fn dependency_dirs(&self, repo: &Repository) -> Result<Vec<PathBuf>, LocatorError>;
}

/// Locates dependency packages through `cargo metadata`.
#[derive(Debug, Clone)]
pub struct CargoLocator {
    project_dir: PathBuf,
    cargo: OsString,
    include_dependencies: bool,
}

impl CargoLocator {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            cargo: std::env::var_os("CARGO").unwrap_or_else(|| "cargo".into()),
            include_dependencies: true,
        }
    }

    /// Turn dependency discovery off, leaving only local migrations.
    #[must_use]
    pub fn with_dependencies(mut self, include: bool) -> Self {
        self.include_dependencies = include;
        self
    }

    fn metadata(&self) -> Result<Metadata, LocatorError> {
        let manifest = self.project_dir.join("Cargo.toml");
        if !manifest.is_file() {
            return Err(LocatorError::ManifestMissing(self.project_dir.clone()));
        }

        let output = Command::new(&self.cargo)
            .arg("metadata")
            .arg("--format-version")
            .arg("1")
            .arg("--manifest-path")
            .arg(&manifest)
            .output()
            .map_err(LocatorError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LocatorError::Cargo(stderr.trim().to_string()));
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

impl PackageLocator for CargoLocator {
    fn local_dirs(&self, repo: &Repository) -> Vec<PathBuf> {
        repo.migrations
            .iter()
            .map(|dir| self.project_dir.join(dir))
            .collect()
    }

    #[tracing::instrument(name = "migrate.locate_dependencies", skip_all, fields(repo = %repo.name))]
    fn dependency_dirs(&self, repo: &Repository) -> Result<Vec<PathBuf>, LocatorError> {
        if !self.include_dependencies {
            return Ok(Vec::new());
        }

        let metadata = self.metadata()?;
        let dirs = metadata.dependency_migration_dirs(repo);
        tracing::debug!(count = dirs.len(), "Located dependency migration directories");

        Ok(dirs)
    }
}

/// The parts of `cargo metadata --format-version 1` we read.
#[derive(Debug, Deserialize)]
struct Metadata {
    packages: Vec<Package>,
    workspace_members: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Package {
    id: String,
    name: String,
    manifest_path: PathBuf,
}

impl Metadata {
    fn dependency_migration_dirs(&self, repo: &Repository) -> Vec<PathBuf> {
        let members: HashSet<&str> = self.workspace_members.iter().map(String::as_str).collect();

        let mut packages: Vec<&Package> = self
            .packages
            .iter()
            .filter(|package| !members.contains(package.id.as_str()))
            .filter(|package| repo.accepts_dependency(&package.name))
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        packages
            .into_iter()
            .filter_map(|package| package.manifest_path.parent().map(Path::to_path_buf))
            .map(|root| root.join(&repo.dependency_migrations))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;

    use super::*;

    const METADATA: &str = r#"{
        "packages": [
            {
                "id": "my-app 0.1.0 (path+file:///work/my-app)",
                "name": "my-app",
                "manifest_path": "/work/my-app/Cargo.toml"
            },
            {
                "id": "registry+https://github.com/rust-lang/crates.io-index#serde@1.0.193",
                "name": "serde",
                "manifest_path": "/cargo/registry/serde-1.0.193/Cargo.toml"
            },
            {
                "id": "registry+https://github.com/rust-lang/crates.io-index#cja@0.0.0",
                "name": "cja",
                "manifest_path": "/cargo/registry/cja-0.0.0/Cargo.toml"
            }
        ],
        "workspace_members": ["my-app 0.1.0 (path+file:///work/my-app)"],
        "resolve": null,
        "version": 1
    }"#;

    fn metadata() -> Metadata {
        serde_json::from_str(METADATA).unwrap()
    }

    #[test]
    fn test_dependency_dirs_skip_workspace_members() {
        let dirs = metadata().dependency_migration_dirs(&Repository::default());

        assert_eq!(
            dirs,
            vec![
                PathBuf::from("/cargo/registry/cja-0.0.0/migrations"),
                PathBuf::from("/cargo/registry/serde-1.0.193/migrations"),
            ]
        );
    }

    #[test]
    fn test_dependency_dirs_respect_allow_list_and_subdir() {
        let repo = Repository {
            dependency_migrations: PathBuf::from("db/migrations"),
            dependencies: Some(vec!["cja".to_string()]),
            ..Repository::default()
        };

        let dirs = metadata().dependency_migration_dirs(&repo);

        assert_eq!(
            dirs,
            vec![PathBuf::from("/cargo/registry/cja-0.0.0/db/migrations")]
        );
    }

    #[test]
    fn test_local_dirs_are_relative_to_project() {
        let locator = CargoLocator::new("/work/my-app");
        let repo = Repository {
            migrations: vec![PathBuf::from("migrations"), PathBuf::from("db/extra")],
            ..Repository::default()
        };

        assert_eq!(
            locator.local_dirs(&repo),
            vec![
                PathBuf::from("/work/my-app/migrations"),
                PathBuf::from("/work/my-app/db/extra"),
            ]
        );
    }

    #[test]
    fn test_missing_manifest_is_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let locator = CargoLocator::new(temp.path());

        let error = locator
            .dependency_dirs(&Repository::default())
            .unwrap_err();

        assert!(matches!(error, LocatorError::ManifestMissing(_)));
    }

    #[test]
    fn test_dependencies_can_be_disabled() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("Cargo.toml").write_str("not toml at all").unwrap();
        let locator = CargoLocator::new(temp.path()).with_dependencies(false);

        assert!(locator
            .dependency_dirs(&Repository::default())
            .unwrap()
            .is_empty());
    }
}
