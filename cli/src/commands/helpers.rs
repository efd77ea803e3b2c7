use anyhow::{Result, bail};
use chrono::{Days, NaiveDate};
use serde::Serialize;

use tdee_core::models::{DAYS_PER_WEEK, Profile};

const MONDAY_FIRST: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];
const SUNDAY_FIRST: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Abbreviated weekday labels in calendar order.
pub(crate) fn day_labels(monday_first: bool) -> [&'static str; 7] {
    if monday_first { MONDAY_FIRST } else { SUNDAY_FIRST }
}

/// Parse a day within a week: `1`-`7` or a weekday name (`mon`, `Tuesday`, ...)
/// placed according to the calendar start. Returns the 0-based slot index.
pub(crate) fn parse_day(s: &str, monday_first: bool) -> Result<usize> {
    let s = s.trim().to_lowercase();
    if let Ok(n) = s.parse::<usize>() {
        if (1..=DAYS_PER_WEEK).contains(&n) {
            return Ok(n - 1);
        }
        bail!("Day must be between 1 and 7, got {n}");
    }
    if s.len() >= 3 {
        if let Some(idx) = day_labels(monday_first)
            .iter()
            .position(|label| s.starts_with(label))
        {
            return Ok(idx);
        }
    }
    bail!("Invalid day '{s}'. Use 1-7 or a weekday name like 'mon'")
}

/// Calendar date of the first day of `week` (week 1 starts on the start date).
pub(crate) fn week_start_date(profile: &Profile, week: u32) -> Option<NaiveDate> {
    let start = profile.start_date?;
    if week == 0 {
        return Some(start);
    }
    start.checked_add_days(Days::new(u64::from(week - 1) * DAYS_PER_WEEK as u64))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{:.*}", decimals, no_neg_zero(v)))
}

/// Blank for zero, otherwise fixed decimals.
pub(crate) fn fmt_nonzero(v: f64, decimals: usize) -> String {
    if v == 0.0 {
        "-".to_string()
    } else {
        format!("{:.*}", decimals, no_neg_zero(v))
    }
}

pub(crate) fn fmt_signed(v: f64, decimals: usize) -> String {
    format!("{:+.*}", decimals, no_neg_zero(v))
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
