//! Relative "time since" phrases for listing timestamps.
//!
//! Coarse buckets only: a month is 30 days and a year 365 days.

use chrono::{DateTime, Utc};

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{} {} ago", n, unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// Describe how long ago `then` was relative to `now`.
///
/// Returns an empty string when there is no timestamp, so callers can pass
/// `most_recent_post` straight through for threads without posts.
pub fn time_since(then: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let then = match then {
        Some(t) => t,
        None => return String::new(),
    };
    let dif = now - then;
    if dif < chrono::Duration::zero() {
        return "just now".to_string();
    }

    let days = dif.num_days();
    let years = days / 365;
    if years > 0 {
        return if years == 1 { "last year".to_string() } else { format!("{} years ago", years) };
    }
    let months = days / 30;
    if months > 0 {
        return if months == 1 { "last month".to_string() } else { format!("{} months ago", months) };
    }
    if days > 0 {
        return if days == 1 { "yesterday".to_string() } else { format!("{} days ago", days) };
    }

    let seconds = dif.num_seconds();
    let hours = seconds / 3600;
    if hours > 0 {
        return plural(hours, "hour");
    }
    let minutes = seconds / 60;
    if minutes > 0 {
        return plural(minutes, "minute");
    }
    if seconds > 0 {
        return plural(seconds, "second");
    }
    "1 second ago".to_string()
}

/// [time_since] against the current clock.
pub fn time_since_now(then: Option<DateTime<Utc>>) -> String {
    time_since(then, Utc::now())
}
