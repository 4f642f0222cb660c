//! Human-relative formatting for instants ("4 minutes ago").
//!
//! Computed against a caller-supplied `now` so rendering stays a pure
//! function; the live stream re-renders on a cadence to keep labels fresh.

use time::OffsetDateTime;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

pub fn relative(instant: OffsetDateTime, now: OffsetDateTime) -> String {
    let delta = now - instant;
    let seconds = delta.whole_seconds();

    if seconds >= 0 {
        if seconds < 45 {
            "just now".to_string()
        } else {
            format!("{} ago", span(seconds))
        }
    } else {
        format!("in {}", span(-seconds))
    }
}

fn span(seconds: i64) -> String {
    if seconds < 90 {
        "a minute".to_string()
    } else if seconds < 45 * MINUTE {
        format!("{} minutes", div_round(seconds, MINUTE))
    } else if seconds < 90 * MINUTE {
        "an hour".to_string()
    } else if seconds < 22 * HOUR {
        format!("{} hours", div_round(seconds, HOUR))
    } else if seconds < 36 * HOUR {
        "a day".to_string()
    } else if seconds < 26 * DAY {
        format!("{} days", div_round(seconds, DAY))
    } else if seconds < 46 * DAY {
        "a month".to_string()
    } else if seconds < 320 * DAY {
        format!("{} months", div_round(seconds, MONTH))
    } else if seconds < 548 * DAY {
        "a year".to_string()
    } else {
        format!("{} years", div_round(seconds, YEAR))
    }
}

fn div_round(value: i64, unit: i64) -> i64 {
    (value + unit / 2) / unit
}
