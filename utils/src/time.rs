//! Time formatting helpers.

/// Format a duration in seconds to a human-readable string.
pub fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

/// Format a remaining time in milliseconds, rounding partial seconds up so a
/// live countdown never shows `0s` while time is left.
pub fn format_remaining_ms(ms: u64) -> String {
    if ms == 0 {
        return "expired".to_owned();
    }
    format_duration(ms.div_ceil(1000))
}
