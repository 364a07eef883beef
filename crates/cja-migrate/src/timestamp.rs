//! The `YYYYMMDDHHMMSS` version prefix carried by every migration filename.
//!
//! A migration file is named `<14 digits>_<description>.sql`. Anything that
//! doesn't start with exactly fourteen digits followed by an underscore is not
//! a migration as far as this crate is concerned.

use std::path::Path;

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Number of digits in a migration version.
pub const TIMESTAMP_LEN: usize = 14;

/// Largest version that still renders as a 14-digit prefix.
pub const MAX_TIMESTAMP: u64 = 99_999_999_999_999;

/// Extract the version prefix from a migration filename.
///
/// Only the final path component is inspected, so both `"2023..._x.sql"` and
/// `"migrations/2023..._x.sql"` work. Returns `None` for anything that doesn't
/// match `^\d{14}_`.
pub fn extract_timestamp(file_name: &str) -> Option<u64> {
    let base = Path::new(file_name).file_name()?.to_str()?;
    if !has_timestamp_prefix(base) {
        return None;
    }

    base[..TIMESTAMP_LEN].parse().ok()
}

fn has_timestamp_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();

    bytes.len() > TIMESTAMP_LEN
        && bytes[TIMESTAMP_LEN] == b'_'
        && bytes[..TIMESTAMP_LEN].iter().all(u8::is_ascii_digit)
}

/// Swap the version prefix of `original` for `timestamp`, keeping the
/// underscore and description untouched.
///
/// Names without a version prefix get one prepended.
pub fn render_timestamped_name(timestamp: u64, original: &str) -> String {
    if has_timestamp_prefix(original) {
        format!("{timestamp:014}{}", &original[TIMESTAMP_LEN..])
    } else {
        format!("{timestamp:014}_{original}")
    }
}

/// Render a point in time in the migration version scheme.
pub fn timestamp_from(at: DateTime<Utc>) -> u64 {
    // Calendar components are never negative after year 0.
    let year = u64::try_from(at.year()).unwrap_or_default();

    year * 10_000_000_000
        + u64::from(at.month()) * 100_000_000
        + u64::from(at.day()) * 1_000_000
        + u64::from(at.hour()) * 10_000
        + u64::from(at.minute()) * 100
        + u64::from(at.second())
}

/// The current UTC wall clock as a migration version.
pub fn current_timestamp() -> u64 {
    timestamp_from(Utc::now())
}

/// Source of "now" for timestamp allocation.
pub trait Clock {
    fn now(&self) -> u64;
}

/// Reads the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        current_timestamp()
    }
}

/// Always reports the same instant. Useful for reproducible remediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}
