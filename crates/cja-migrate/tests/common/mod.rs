use std::path::{Path, PathBuf};

use cja_migrate::{
    Direction, LocatorError, MigrationRunner, PackageLocator, Repository, RunOptions,
    RunnerError, SearchPlan,
};

/// Hands out fixed directories.
pub struct StaticLocator {
    pub local: Vec<PathBuf>,
    pub dependencies: Result<Vec<PathBuf>, String>,
}

impl StaticLocator {
    pub fn new(local: Vec<PathBuf>, dependencies: Vec<PathBuf>) -> Self {
        Self {
            local,
            dependencies: Ok(dependencies),
        }
    }
}

impl PackageLocator for StaticLocator {
    fn local_dirs(&self, _repo: &Repository) -> Vec<PathBuf> {
        self.local.clone()
    }

    fn dependency_dirs(&self, _repo: &Repository) -> Result<Vec<PathBuf>, LocatorError> {
        self.dependencies.clone().map_err(LocatorError::Cargo)
    }
}

/// What the runner saw during one call.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub repo: String,
    pub plan: SearchPlan,
    pub direction: Direction,
    /// `(file name, contents)` of every file the runner would load, in path
    /// order, captured while the staging directory still existed.
    pub files: Vec<(String, String)>,
}

/// Records every call and "applies" whatever versions it finds.
#[derive(Default)]
pub struct RecordingRunner {
    pub runs: Vec<RecordedRun>,
    pub fail_with: Option<String>,
}

impl RecordingRunner {
    pub fn failing(message: &str) -> Self {
        Self {
            runs: Vec::new(),
            fail_with: Some(message.to_string()),
        }
    }
}

impl MigrationRunner for RecordingRunner {
    fn run(
        &mut self,
        repo: &Repository,
        plan: &SearchPlan,
        direction: Direction,
        _options: &RunOptions,
    ) -> Result<Vec<u64>, RunnerError> {
        let files = read_plan(plan);
        let versions = files
            .iter()
            .filter_map(|(name, _)| cja_migrate::extract_timestamp(name))
            .collect();

        self.runs.push(RecordedRun {
            repo: repo.name.clone(),
            plan: plan.clone(),
            direction,
            files,
        });

        match &self.fail_with {
            Some(message) => Err(message.clone().into()),
            None => Ok(versions),
        }
    }
}

fn read_plan(plan: &SearchPlan) -> Vec<(String, String)> {
    let mut files = Vec::new();
    for dir in &plan.paths {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| !plan.is_superseded(path))
            .collect();
        entries.sort();

        for path in entries {
            files.push((file_name(&path), std::fs::read_to_string(&path).unwrap()));
        }
    }
    files
}

pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}
