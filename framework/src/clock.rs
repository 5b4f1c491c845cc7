/// Time sources for interval gating and record timestamps
use chrono::{DateTime, Utc};

/// Monotonic millisecond counter plus UTC wall time
///
/// On the device the two come from different places (hardware timer vs SNTP),
/// so they are kept separate here too.
pub trait Clock {
    /// Milliseconds since boot, never decreasing
    fn millis(&self) -> u64;

    /// Seconds since the Unix epoch, UTC
    fn unix_time(&self) -> i64;
}

/// Render Unix seconds as `YYYY-MM-DDTHH:MM:SSZ`
///
/// Out-of-range values fall back to the epoch, matching an unsynchronized
/// device clock.
pub fn iso8601(unix_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix_secs, 0)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

/// Milliseconds elapsed since `since`, zero if the clock is behind it
pub fn elapsed_ms(clock: &dyn Clock, since: u64) -> u64 {
    clock.millis().saturating_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso8601_format() {
        assert_eq!(iso8601(0), "1970-01-01T00:00:00Z");
        assert_eq!(iso8601(1_735_948_800), "2025-01-04T00:00:00Z");
        assert_eq!(iso8601(1_742_733_319), "2025-03-23T12:35:19Z");
    }

    #[test]
    fn test_iso8601_out_of_range_falls_back_to_epoch() {
        assert_eq!(iso8601(i64::MAX), "1970-01-01T00:00:00Z");
    }
}
