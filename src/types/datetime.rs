//! Date and time conversions (date, time, timetz, timestamp, timestamptz).
//!
//! The session always runs with `DateStyle = 'ISO, MDY'` and
//! `TimeZone = 'UTC'`, so the textual forms here are the only ones the server
//! produces. Values carry calendar fields, never machine epochs, so every
//! legal input round-trips losslessly. Dates before the common era carry the
//! `BC` suffix; year N BC maps to astronomical year 1-N.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};

use crate::error::{Error, Result};

use super::{FromPgText, ToPgText};

/// A time of day with a fixed UTC offset (the `timetz` type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgTimeTz {
    pub time: NaiveTime,
    pub offset: FixedOffset,
}

fn strip_bc(s: &str) -> (&str, bool) {
    match s.strip_suffix(" BC") {
        Some(body) => (body, true),
        None => (s, false),
    }
}

fn apply_bc_year<T: Datelike>(value: T, original: &str, target: &'static str) -> Result<T> {
    let year = value.year();
    value
        .with_year(1 - year)
        .ok_or_else(|| Error::conversion(target, original, "date out of range for BC year"))
}

fn parse_naive_date(s: &str, original: &str, target: &'static str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::conversion(target, original, format!("{}", e)))
}

/// Format the calendar part; the returned flag requests a trailing " BC".
fn format_date_core(date: &NaiveDate) -> (String, bool) {
    let year = date.year();
    if year > 0 {
        (format!("{:04}-{:02}-{:02}", year, date.month(), date.day()), false)
    } else {
        (
            format!("{:04}-{:02}-{:02}", 1 - year, date.month(), date.day()),
            true,
        )
    }
}

fn parse_naive_time(s: &str, original: &str, target: &'static str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|e| Error::conversion(target, original, format!("{}", e)))
}

fn format_time_core(time: &NaiveTime) -> String {
    if time.nanosecond() == 0 {
        time.format("%H:%M:%S").to_string()
    } else {
        time.format("%H:%M:%S%.6f").to_string()
    }
}

fn parse_offset(s: &str, original: &str, target: &'static str) -> Result<FixedOffset> {
    let bad = || Error::conversion(target, original, "malformed UTC offset");

    let sign = match s.as_bytes().first() {
        Some(b'+') => 1,
        Some(b'-') => -1,
        _ => return Err(bad()),
    };
    let rest = &s[1..];

    let (hours, minutes, seconds): (i32, i32, i32) = if rest.contains(':') {
        let mut parts = rest.splitn(3, ':');
        let hours = parts.next().and_then(|p| p.parse().ok()).ok_or_else(bad)?;
        let minutes = parts
            .next()
            .map(|p| p.parse().map_err(|_| bad()))
            .transpose()?
            .unwrap_or(0);
        let seconds = parts
            .next()
            .map(|p| p.parse().map_err(|_| bad()))
            .transpose()?
            .unwrap_or(0);
        (hours, minutes, seconds)
    } else {
        match rest.len() {
            2 => (rest.parse().map_err(|_| bad())?, 0, 0),
            4 => (
                rest[..2].parse().map_err(|_| bad())?,
                rest[2..].parse().map_err(|_| bad())?,
                0,
            ),
            _ => return Err(bad()),
        }
    };

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60 + seconds)).ok_or_else(bad)
}

fn format_offset(offset: &FixedOffset) -> String {
    let total = offset.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let total = total.abs();
    let (hours, minutes, seconds) = (total / 3600, total % 3600 / 60, total % 60);

    if seconds > 0 {
        format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}{:02}:{:02}", sign, hours, minutes)
    } else {
        format!("{}{:02}", sign, hours)
    }
}

/// Split "date time[offset]" text at the single interior space.
fn split_date_time<'a>(s: &'a str, original: &str, target: &'static str) -> Result<(&'a str, &'a str)> {
    s.split_once(' ')
        .ok_or_else(|| Error::conversion(target, original, "missing time component"))
}

impl FromPgText for NaiveDate {
    fn from_pg_text(s: &str) -> Result<Self> {
        let (body, bc) = strip_bc(s);
        let date = parse_naive_date(body, s, "NaiveDate")?;
        if bc {
            apply_bc_year(date, s, "NaiveDate")
        } else {
            Ok(date)
        }
    }
}

impl ToPgText for NaiveDate {
    fn to_pg_text(&self) -> Option<String> {
        let (core, bc) = format_date_core(self);
        Some(if bc { format!("{} BC", core) } else { core })
    }
}

impl FromPgText for NaiveTime {
    fn from_pg_text(s: &str) -> Result<Self> {
        parse_naive_time(s, s, "NaiveTime")
    }
}

impl ToPgText for NaiveTime {
    fn to_pg_text(&self) -> Option<String> {
        Some(format_time_core(self))
    }
}

impl FromPgText for PgTimeTz {
    fn from_pg_text(s: &str) -> Result<Self> {
        let offset_at = s
            .rfind(['+', '-'])
            .filter(|&pos| pos > 0)
            .ok_or_else(|| Error::conversion("PgTimeTz", s, "missing UTC offset"))?;
        let (time_part, offset_part) = s.split_at(offset_at);

        Ok(PgTimeTz {
            time: parse_naive_time(time_part, s, "PgTimeTz")?,
            offset: parse_offset(offset_part, s, "PgTimeTz")?,
        })
    }
}

impl ToPgText for PgTimeTz {
    fn to_pg_text(&self) -> Option<String> {
        Some(format!(
            "{}{}",
            format_time_core(&self.time),
            format_offset(&self.offset)
        ))
    }
}

impl FromPgText for NaiveDateTime {
    fn from_pg_text(s: &str) -> Result<Self> {
        let (body, bc) = strip_bc(s);
        let (date_part, time_part) = split_date_time(body, s, "NaiveDateTime")?;
        let date = parse_naive_date(date_part, s, "NaiveDateTime")?;
        let date = if bc {
            apply_bc_year(date, s, "NaiveDateTime")?
        } else {
            date
        };
        let time = parse_naive_time(time_part, s, "NaiveDateTime")?;
        Ok(date.and_time(time))
    }
}

impl ToPgText for NaiveDateTime {
    fn to_pg_text(&self) -> Option<String> {
        let (core, bc) = format_date_core(&self.date());
        let mut out = format!("{} {}", core, format_time_core(&self.time()));
        if bc {
            out.push_str(" BC");
        }
        Some(out)
    }
}

impl FromPgText for DateTime<FixedOffset> {
    fn from_pg_text(s: &str) -> Result<Self> {
        let (body, bc) = strip_bc(s);
        // the date always occupies at least 10 characters, so an offset sign
        // can only occur after it
        let offset_at = body
            .rfind(['+', '-'])
            .filter(|&pos| pos > 10)
            .ok_or_else(|| Error::conversion("DateTime<FixedOffset>", s, "missing UTC offset"))?;
        let (naive_part, offset_part) = body.split_at(offset_at);

        let (date_part, time_part) = split_date_time(naive_part, s, "DateTime<FixedOffset>")?;
        let date = parse_naive_date(date_part, s, "DateTime<FixedOffset>")?;
        let date = if bc {
            apply_bc_year(date, s, "DateTime<FixedOffset>")?
        } else {
            date
        };
        let time = parse_naive_time(time_part, s, "DateTime<FixedOffset>")?;
        let offset = parse_offset(offset_part, s, "DateTime<FixedOffset>")?;

        offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .ok_or_else(|| Error::conversion("DateTime<FixedOffset>", s, "ambiguous local time"))
    }
}

impl ToPgText for DateTime<FixedOffset> {
    fn to_pg_text(&self) -> Option<String> {
        let naive = self.naive_local();
        let (core, bc) = format_date_core(&naive.date());
        let mut out = format!(
            "{} {}{}",
            core,
            format_time_core(&naive.time()),
            format_offset(self.offset())
        );
        if bc {
            out.push_str(" BC");
        }
        Some(out)
    }
}
