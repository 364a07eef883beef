//! Run an application's migrations together with the migrations its
//! dependencies ship.
//!
//! Libraries like `cja` carry their own `migrations/` directory. Their
//! versions are fixed when the library is written, so they usually predate
//! the application's migrations. Before handing everything to the runner,
//! dependency migrations that would sort at or before the newest local
//! migration are copied into a temporary staging directory under fresh
//! versions. The copies are removed once the runner is done.

pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod locator;
pub mod ordering;
pub mod orchestrator;
pub mod remediation;
pub mod report;
pub mod runner;
pub mod staging;
pub mod timestamp;

pub use config::{Config, ConfigError, Repository};
pub use discovery::{classify, Classified, Discovery, FsDiscovery, MigrationFile, MigrationOrigin};
pub use error::MigrateError;
pub use locator::{CargoLocator, LocatorError, PackageLocator};
pub use orchestrator::{Orchestrator, RepoOutcome};
pub use report::Reporter;
pub use runner::{Direction, MigrationRunner, RunOptions, RunnerError, SearchPlan, Strategy};
pub use timestamp::{current_timestamp, extract_timestamp, Clock, FixedClock, SystemClock};
