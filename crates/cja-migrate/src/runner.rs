//! The seam between migration discovery and whatever applies migrations.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use crate::config::Repository;

/// Failure reported by a [`MigrationRunner`], passed through untouched.
pub type RunnerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which way to move the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Verb used when reporting what happened.
    pub fn past_tense(self) -> &'static str {
        match self {
            Direction::Up => "Migrated",
            Direction::Down => "Rolled back",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// How many migrations a run should touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Every pending migration going up, the last applied one going down.
    #[default]
    Default,
    /// Everything in the requested direction.
    All,
    /// At most this many migrations.
    Step(NonZeroUsize),
    /// Up: pending versions `<=` this. Down: applied versions `>=` this.
    To(u64),
}

/// Options handed to the runner unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub strategy: Strategy,
}

/// The ordered directories to load migrations from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPlan {
    /// Local directories, then dependency directories, then staging.
    pub paths: Vec<PathBuf>,
    /// Dependency files replaced by a re-versioned copy in staging. Runners
    /// must skip these.
    pub superseded: Vec<PathBuf>,
}

impl SearchPlan {
    pub fn is_superseded(&self, path: &Path) -> bool {
        self.superseded.iter().any(|superseded| superseded == path)
    }
}

/// Applies or reverts migrations found under a [`SearchPlan`].
pub trait MigrationRunner {
    /// Run migrations for `repo` and return the versions that were applied
    /// (or reverted), in the order they ran.
    fn run(
        &mut self,
        repo: &Repository,
        plan: &SearchPlan,
        direction: Direction,
        options: &RunOptions,
    ) -> Result<Vec<u64>, RunnerError>;
}
