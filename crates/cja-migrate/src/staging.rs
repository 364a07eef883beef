//! The scratch directory remediated migrations are written to.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

const STAGING_PREFIX: &str = "cja_migrate_";

/// A uniquely named directory that is removed when dropped.
#[derive(Debug)]
pub struct StagingDirectory {
    path: PathBuf,
}

impl StagingDirectory {
    /// Create a fresh directory under `parent`.
    pub fn create_in(parent: &Path) -> io::Result<Self> {
        let path = parent.join(format!("{STAGING_PREFIX}{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&path)?;

        tracing::debug!(path = %path.display(), "Created staging directory");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, reporting failures instead of logging them.
    pub fn remove(mut self) -> io::Result<()> {
        let path = std::mem::take(&mut self.path);
        remove_dir(&path)
    }
}

impl Drop for StagingDirectory {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }

        if let Err(error) = remove_dir(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "Failed to remove staging directory");
        }
    }
}

fn remove_dir(path: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed staging directory");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error),
    }
}

/// Tracks the staging directory of a single migrate/rollback invocation.
///
/// Dropping the lifecycle removes whatever is still registered, so the
/// directory goes away on every exit path.
#[derive(Debug, Default)]
pub struct StagingLifecycle {
    registered: Option<StagingDirectory>,
}

impl StagingLifecycle {
    /// Take ownership of `staging` until [`cleanup`](Self::cleanup).
    ///
    /// A previously registered directory is removed first.
    pub fn register(&mut self, staging: StagingDirectory) {
        self.registered = Some(staging);
    }

    /// Path of the registered directory, if any.
    pub fn path(&self) -> Option<&Path> {
        self.registered.as_ref().map(StagingDirectory::path)
    }

    /// Remove the registered directory. Calling this with nothing registered
    /// does nothing.
    pub fn cleanup(&mut self) -> io::Result<()> {
        match self.registered.take() {
            Some(staging) => staging.remove(),
            None => Ok(()),
        }
    }
}
