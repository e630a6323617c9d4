//! Label formatting for durations and countdowns.

use chrono::Duration;

const MINUTE: i64 = 60;
const HOUR: i64 = 3600;
const DAY: i64 = 86_400;

/// Compact human-readable duration: `45s`, `3m 40s`, `1h 5m`.
///
/// Negative input is treated as zero.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < MINUTE {
        format!("{secs}s")
    } else if secs < HOUR {
        let mins = secs / MINUTE;
        let remaining_secs = secs % MINUTE;
        if remaining_secs == 0 {
            format!("{mins}m")
        } else {
            format!("{mins}m {remaining_secs}s")
        }
    } else {
        let hours = secs / HOUR;
        let mins = (secs % HOUR) / MINUTE;
        if mins == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {mins}m")
        }
    }
}

/// Lock countdown: `D:HH:MM` with at least one day left, else `HH:MM:SS`.
#[must_use]
pub fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    if secs >= DAY {
        let days = secs / DAY;
        let hours = (secs % DAY) / HOUR;
        let mins = (secs % HOUR) / MINUTE;
        format!("{days}:{hours:02}:{mins:02}")
    } else {
        let hours = secs / HOUR;
        let mins = (secs % HOUR) / MINUTE;
        let s = secs % MINUTE;
        format!("{hours:02}:{mins:02}:{s:02}")
    }
}

/// Coarse tier for "expires in ..." copy.
///
/// Minutes round up so anything under an hour reads at least `1 minute`;
/// hours and days round down.
#[must_use]
pub fn humanize_remaining(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    if secs >= DAY {
        plural(secs / DAY, "day")
    } else if secs >= HOUR {
        plural(secs / HOUR, "hour")
    } else {
        let mins = ((secs + MINUTE - 1) / MINUTE).max(1);
        plural(mins, "minute")
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}
