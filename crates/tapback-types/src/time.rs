/// Conversion between the store's native timestamps and wall-clock time.
///
/// The store counts nanoseconds since 2001-01-01 00:00:00 UTC. Values are
/// kept in UTC here; local time only appears in [`time_label`].

use chrono::{DateTime, Local, Utc};

/// Seconds between the Unix epoch and 2001-01-01.
pub const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Convert a native timestamp to UTC. `None` stays `None`.
pub fn to_wallclock(native: Option<i64>) -> Option<DateTime<Utc>> {
    let native = native?;
    let secs = native.div_euclid(NANOS_PER_SEC) + APPLE_EPOCH_OFFSET_SECS;
    let nanos = native.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Convert a wall-clock time to native units. Clamps outside the
/// ~292 year window an `i64` of nanoseconds can hold.
pub fn from_wallclock(time: DateTime<Utc>) -> i64 {
    let secs = i128::from(time.timestamp() - APPLE_EPOCH_OFFSET_SECS);
    let native = secs * i128::from(NANOS_PER_SEC) + i128::from(time.timestamp_subsec_nanos());
    native.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Short local-time label for list rendering, e.g. `9:05 PM`.
pub fn time_label(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%-I:%M %p").to_string()
}
