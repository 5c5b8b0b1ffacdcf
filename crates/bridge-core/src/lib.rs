//! Foundational low-level utilities shared across bridge crates.
//!
//! Provides the clock helpers used for protocol timestamps, session records and
//! request correlation ids.

pub mod time_utils;

pub use time_utils::{current_iso8601_timestamp, current_unix_timestamp, duration_ms_to_nanos};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_timestamp_is_after_2024() {
        assert!(current_unix_timestamp() > 1_704_067_200);
    }

    #[test]
    fn iso8601_timestamp_is_utc_with_millis() {
        let stamp = current_iso8601_timestamp();
        assert!(stamp.ends_with('Z'), "unexpected timestamp: {stamp}");
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }

    #[test]
    fn duration_ms_to_nanos_scales_and_saturates() {
        assert_eq!(duration_ms_to_nanos(0), 0);
        assert_eq!(duration_ms_to_nanos(1_250), 1_250_000_000);
        assert_eq!(duration_ms_to_nanos(u64::MAX), u64::MAX);
    }
}
