use jiff::{Timestamp, tz::TimeZone};

/// Format a unix timestamp (seconds) relative to `now`: "2d ago", "3h ago",
/// "15m ago", or "just now" (also used for timestamps in the future).
pub fn format_relative(timestamp: i64, now: Timestamp) -> String {
    let now_secs = now.as_second();
    if now_secs <= timestamp {
        return "just now".to_string();
    }

    let delta = now_secs - timestamp;
    match (delta / 86_400, delta / 3_600, delta / 60) {
        (days, _, _) if days > 0 => format!("{}d ago", days),
        (_, hours, _) if hours > 0 => format!("{}h ago", hours),
        (_, _, minutes) if minutes > 0 => format!("{}m ago", minutes),
        _ => "just now".to_string(),
    }
}

/// "Mar 17, 2023 at 10:30 AM" in the given zone.
pub fn format_absolute(timestamp: i64, tz: &TimeZone) -> String {
    match Timestamp::from_second(timestamp) {
        Ok(ts) => ts
            .to_zoned(tz.clone())
            .strftime("%b %d, %Y at %I:%M %p")
            .to_string(),
        Err(_) => "Unknown time".to_string(),
    }
}
