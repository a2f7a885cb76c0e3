//! Interval conversions.
//!
//! Parses both the ISO 8601 form (`P1Y2M3DT4H5M6.5S`, the `iso_8601`
//! IntervalStyle) and the default `postgres` style
//! (`1 year 2 mons 3 days 04:05:06.5`), including the `postgres_verbose`
//! `@ ... ago` variant. Output is always ISO 8601.

use crate::error::{Error, Result};

use super::{FromPgText, ToPgText};

const MICROS_PER_SEC: i64 = 1_000_000;
const MICROS_PER_MIN: i64 = 60 * MICROS_PER_SEC;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MIN;

/// A Postgres interval, kept in the server's own three-field shape so that
/// "1 month" stays distinct from "30 days".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PgInterval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

impl PgInterval {
    pub fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }
}

fn conversion(s: &str, reason: impl Into<String>) -> Error {
    Error::conversion("PgInterval", s, reason)
}

/// Parse a decimal seconds token ("6", "6.5", "-6.25") into microseconds.
fn parse_seconds_micros(token: &str, original: &str) -> Result<i64> {
    let (body, sign) = match token.strip_prefix('-') {
        Some(rest) => (rest, -1),
        None => (token.strip_prefix('+').unwrap_or(token), 1),
    };

    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if frac_part.len() > 6 {
        return Err(conversion(original, "fractional seconds beyond microseconds"));
    }

    let whole: i64 = int_part
        .parse()
        .map_err(|_| conversion(original, "invalid seconds"))?;
    let mut frac: i64 = 0;
    if !frac_part.is_empty() {
        frac = frac_part
            .parse()
            .map_err(|_| conversion(original, "invalid fractional seconds"))?;
        for _ in frac_part.len()..6 {
            frac *= 10;
        }
    }

    Ok(sign * (whole * MICROS_PER_SEC + frac))
}

/// Parse an `[-]HH:MM:SS[.ffffff]` clock token; hours may exceed 24.
fn parse_clock(token: &str, original: &str) -> Result<i64> {
    let (body, sign) = match token.strip_prefix('-') {
        Some(rest) => (rest, -1),
        None => (token.strip_prefix('+').unwrap_or(token), 1),
    };

    let mut parts = body.splitn(3, ':');
    let hours: i64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| conversion(original, "invalid hours"))?;
    let minutes: i64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| conversion(original, "invalid minutes"))?;
    let seconds = match parts.next() {
        Some(token) => parse_seconds_micros(token, original)?,
        None => 0,
    };

    Ok(sign * (hours * MICROS_PER_HOUR + minutes * MICROS_PER_MIN + seconds))
}

fn parse_iso(s: &str) -> Result<PgInterval> {
    let body = &s[1..]; // skip 'P'
    let mut interval = PgInterval::default();
    let mut in_time = false;
    let mut number = String::new();

    for ch in body.chars() {
        match ch {
            'T' => {
                if !number.is_empty() {
                    return Err(conversion(s, "number without unit"));
                }
                in_time = true;
            }
            '0'..='9' | '-' | '+' | '.' => number.push(ch),
            unit => {
                if number.is_empty() {
                    return Err(conversion(s, "unit without number"));
                }
                let quantity = std::mem::take(&mut number);
                match (in_time, unit) {
                    (false, 'Y') => {
                        let years: i32 = quantity
                            .parse()
                            .map_err(|_| conversion(s, "invalid years"))?;
                        interval.months += years * 12;
                    }
                    (false, 'M') => {
                        interval.months += quantity
                            .parse::<i32>()
                            .map_err(|_| conversion(s, "invalid months"))?;
                    }
                    (false, 'W') => {
                        let weeks: i32 = quantity
                            .parse()
                            .map_err(|_| conversion(s, "invalid weeks"))?;
                        interval.days += weeks * 7;
                    }
                    (false, 'D') => {
                        interval.days += quantity
                            .parse::<i32>()
                            .map_err(|_| conversion(s, "invalid days"))?;
                    }
                    (true, 'H') => {
                        let hours: i64 = quantity
                            .parse()
                            .map_err(|_| conversion(s, "invalid hours"))?;
                        interval.microseconds += hours * MICROS_PER_HOUR;
                    }
                    (true, 'M') => {
                        let minutes: i64 = quantity
                            .parse()
                            .map_err(|_| conversion(s, "invalid minutes"))?;
                        interval.microseconds += minutes * MICROS_PER_MIN;
                    }
                    (true, 'S') => {
                        interval.microseconds += parse_seconds_micros(&quantity, s)?;
                    }
                    _ => return Err(conversion(s, format!("unknown designator '{}'", unit))),
                }
            }
        }
    }
    if !number.is_empty() {
        return Err(conversion(s, "trailing number without unit"));
    }

    Ok(interval)
}

fn parse_postgres(s: &str) -> Result<PgInterval> {
    let mut interval = PgInterval::default();
    let mut negate_all = false;
    let mut tokens = s.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        match token {
            "@" => {}
            "ago" => negate_all = true,
            _ if token.contains(':') => {
                interval.microseconds += parse_clock(token, s)?;
            }
            _ => {
                let quantity: i64 = token
                    .parse()
                    .map_err(|_| conversion(s, format!("invalid quantity '{}'", token)))?;
                let unit = tokens
                    .next()
                    .ok_or_else(|| conversion(s, "quantity without unit"))?;
                match unit {
                    "year" | "years" => interval.months += (quantity * 12) as i32,
                    "mon" | "mons" | "month" | "months" => interval.months += quantity as i32,
                    "week" | "weeks" => interval.days += (quantity * 7) as i32,
                    "day" | "days" => interval.days += quantity as i32,
                    "hour" | "hours" => interval.microseconds += quantity * MICROS_PER_HOUR,
                    "min" | "mins" | "minute" | "minutes" => {
                        interval.microseconds += quantity * MICROS_PER_MIN
                    }
                    "sec" | "secs" | "second" | "seconds" => {
                        interval.microseconds += quantity * MICROS_PER_SEC
                    }
                    _ => return Err(conversion(s, format!("unknown unit '{}'", unit))),
                }
            }
        }
    }

    if negate_all {
        interval.months = -interval.months;
        interval.days = -interval.days;
        interval.microseconds = -interval.microseconds;
    }

    Ok(interval)
}

impl FromPgText for PgInterval {
    fn from_pg_text(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(conversion(s, "empty interval"));
        }
        if s.starts_with('P') {
            parse_iso(s)
        } else {
            parse_postgres(s)
        }
    }
}

impl ToPgText for PgInterval {
    fn to_pg_text(&self) -> Option<String> {
        let mut out = String::from("P");

        let years = self.months / 12;
        let months = self.months % 12;
        if years != 0 {
            out.push_str(&format!("{}Y", years));
        }
        if months != 0 {
            out.push_str(&format!("{}M", months));
        }
        if self.days != 0 {
            out.push_str(&format!("{}D", self.days));
        }

        let mut micros = self.microseconds;
        if micros != 0 {
            out.push('T');
            let hours = micros / MICROS_PER_HOUR;
            micros %= MICROS_PER_HOUR;
            let minutes = micros / MICROS_PER_MIN;
            micros %= MICROS_PER_MIN;

            if hours != 0 {
                out.push_str(&format!("{}H", hours));
            }
            if minutes != 0 {
                out.push_str(&format!("{}M", minutes));
            }
            if micros != 0 {
                let sign = if micros < 0 { "-" } else { "" };
                let abs = micros.abs();
                let seconds = abs / MICROS_PER_SEC;
                let frac = abs % MICROS_PER_SEC;
                if frac == 0 {
                    out.push_str(&format!("{}{}S", sign, seconds));
                } else {
                    let frac = format!("{:06}", frac);
                    out.push_str(&format!(
                        "{}{}.{}S",
                        sign,
                        seconds,
                        frac.trim_end_matches('0')
                    ));
                }
            }
        }

        if out == "P" {
            out.push_str("T0S");
        }
        Some(out)
    }
}
