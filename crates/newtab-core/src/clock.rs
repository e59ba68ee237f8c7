use chrono::{DateTime, Local, TimeZone};
use std::time::Duration;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ClockFace {
    pub time: String,
    pub date: String,
}

/// `14:05`, 24-hour with two-digit fields.
pub fn format_time<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%H:%M").to_string()
}

/// `Monday, Oct 19`.
pub fn format_date<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%A, %b %-d").to_string()
}

pub fn clock_face_at<Tz: TimeZone>(now: &DateTime<Tz>) -> ClockFace
where
    Tz::Offset: std::fmt::Display,
{
    ClockFace {
        time: format_time(now),
        date: format_date(now),
    }
}

pub fn clock_face() -> ClockFace {
    clock_face_at(&Local::now())
}
