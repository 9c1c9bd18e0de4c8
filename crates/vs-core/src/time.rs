//! Time utilities for vmshift
//!
//! Task start times are recorded as Unix milliseconds so they serialize
//! compactly; durations are derived from them when a task finishes.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is set before the Unix epoch.
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Elapsed time since a millisecond timestamp, zero if it lies in the future.
pub fn elapsed_since(since_millis: u64) -> Duration {
    Duration::from_millis(current_time_millis().saturating_sub(since_millis))
}

/// Format a duration as `1h 02m`, `3m 07s` or `12s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_time_millis_is_positive() {
        assert!(current_time_millis() > 0);
    }

    #[test]
    fn test_elapsed_since_future_time() {
        let future = current_time_millis() + 1_000_000;
        assert_eq!(elapsed_since(future), Duration::ZERO);
    }

    #[test]
    fn test_elapsed_since_past_time() {
        let past = current_time_millis().saturating_sub(1500);
        assert!(elapsed_since(past) >= Duration::from_millis(1500));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(12)), "12s");
        assert_eq!(format_duration(Duration::from_secs(187)), "3m 07s");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h 02m");
    }
}
