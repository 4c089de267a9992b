//! Publication date and time parsing

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::OnceLock;

/// Time used when a page carries a date but no time, or nothing at all
pub const MIDNIGHT: &str = "00:00:00";

/// A normalized publication date (`YYYY-MM-DD`) and time (`HH:MM:SS`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub date: Option<String>,
    pub time: Option<String>,
}

impl Published {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.time.is_none()
    }
}

/// Parses a machine-readable timestamp such as `article:published_time`
///
/// Accepts RFC 3339 (with `Z` or an offset), a naive `YYYY-MM-DDTHH:MM[:SS]`
/// and a bare `YYYY-MM-DD`. Times are kept in the offset they were written in.
pub fn parse_iso(value: &str) -> Option<Published> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(Published {
            date: Some(dt.format("%Y-%m-%d").to_string()),
            time: Some(dt.format("%H:%M:%S").to_string()),
        });
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Published {
                date: Some(dt.format("%Y-%m-%d").to_string()),
                time: Some(dt.format("%H:%M:%S").to_string()),
            });
        }
    }

    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .map(|d| Published {
            date: Some(d.format("%Y-%m-%d").to_string()),
            time: None,
        })
}

/// Pulls a day/month/year date and an hour:minute[:second] time out of free text
///
/// `"15/03/2024 10:30"` yields `2024-03-15` and `10:30:00`. Either part may be
/// missing; impossible calendar dates are ignored.
pub fn parse_loose(text: &str) -> Published {
    static DATE: OnceLock<Option<Regex>> = OnceLock::new();
    static TIME: OnceLock<Option<Regex>> = OnceLock::new();

    let date = DATE
        .get_or_init(|| Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{4})").ok())
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| {
            let day: u32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            let year: i32 = caps[3].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        })
        .map(|d| d.format("%Y-%m-%d").to_string());

    let time = TIME
        .get_or_init(|| Regex::new(r"(\d{1,2}):(\d{2})(?::(\d{2}))?").ok())
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| {
            let hour: u32 = caps[1].parse().ok()?;
            let minute: u32 = caps[2].parse().ok()?;
            let second: u32 = match caps.get(3) {
                Some(s) => s.as_str().parse().ok()?,
                None => 0,
            };
            if hour > 23 || minute > 59 || second > 59 {
                return None;
            }
            Some(format!("{:02}:{:02}:{:02}", hour, minute, second))
        });

    Published { date, time }
}
