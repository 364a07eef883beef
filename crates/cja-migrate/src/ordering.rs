//! Deciding whether dependency migrations would run out of order.

use crate::discovery::MigrationFile;

/// Stand-in for the newest local migration when an application has none.
pub const FLOOR_TIMESTAMP: u64 = 20_200_101_000_000;

/// The newest local migration version, or [`FLOOR_TIMESTAMP`] without any.
pub fn latest_local_timestamp(local: &[MigrationFile]) -> u64 {
    local
        .iter()
        .filter_map(MigrationFile::timestamp)
        .max()
        .unwrap_or(FLOOR_TIMESTAMP)
}

/// Whether any dependency migration sorts at or before `latest_local`.
///
/// A tie counts: the runner keys migrations by version, so two files can
/// never share one.
pub fn needs_adjustment(dependency: &[MigrationFile], latest_local: u64) -> bool {
    dependency
        .iter()
        .filter_map(MigrationFile::timestamp)
        .any(|timestamp| timestamp <= latest_local)
}
