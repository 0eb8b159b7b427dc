//! Timestamp formatting for reports and exports

/// Format a millisecond offset as `M:SS`, or `H:MM:SS` from one hour up.
///
/// Sub-second remainders are truncated.
///
/// # Examples
///
/// ```
/// use jnj_common::time::format_timestamp;
///
/// assert_eq!(format_timestamp(0), "0:00");
/// assert_eq!(format_timestamp(95_000), "1:35");
/// assert_eq!(format_timestamp(3_661_000), "1:01:01");
/// ```
pub fn format_timestamp(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Format a millisecond range as `start-end`
pub fn format_range(start_ms: u64, end_ms: u64) -> String {
    format!("{}-{}", format_timestamp(start_ms), format_timestamp(end_ms))
}

/// Convert seconds (as configured) to whole milliseconds
pub fn seconds_to_ms(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    }
}

/// Convert milliseconds to fractional seconds
pub fn ms_to_seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}
