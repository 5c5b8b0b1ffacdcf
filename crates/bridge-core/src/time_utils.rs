use chrono::{SecondsFormat, Utc};

/// Returns the current Unix timestamp in seconds.
pub fn current_unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Returns the current UTC time as RFC 3339 with millisecond precision.
pub fn current_iso8601_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn duration_ms_to_nanos(duration_ms: u64) -> u64 {
    duration_ms.saturating_mul(1_000_000)
}
