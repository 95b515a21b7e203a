use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, TimeDelta};

use crate::models::normalize_sg;

/// Rendered in place of any date or gravity that is missing or unparseable.
pub const PLACEHOLDER: &str = "—";

/// Formats tried, in order, once the ISO and slash shapes have been ruled out.
const GENERIC_DATE_FORMATS: [&str; 5] = [
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%a %b %d %Y",
];

const GENERIC_DATETIME_FORMATS: [&str; 3] =
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Parse a reading date using the current year for `DD/MM` dates.
#[must_use]
pub fn parse_brew_date(input: &str) -> Option<NaiveDate> {
    parse_brew_date_in(input, Local::now().year())
}

/// Parse a reading date in one of the accepted shapes:
///
/// - `YYYY-MM-DD` (what a date picker produces)
/// - `DD/MM/YY` or `DD/MM/YYYY`, day first; two-digit years are 2000-based and
///   a missing or blank year means `current_year`. Out-of-range days and
///   months roll over, so `31/02/24` is 2 March 2024. A four-digit first part
///   (`2024/03/09`) reads year first and must be a real calendar date.
/// - anything else goes through a list of common human and machine formats
///
/// Returns `None` when nothing matches. Slash-separated input never falls
/// through to the generic formats.
#[must_use]
pub fn parse_brew_date_in(input: &str, current_year: i32) -> Option<NaiveDate> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if is_iso_date_shape(s) {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").ok();
    }

    if s.contains('/') {
        return match SlashDate::parse(s, current_year)? {
            SlashDate::YearFirst(date) => Some(date),
            SlashDate::DayFirst(parts) => parts.rolled_over(),
        };
    }

    parse_generic(s)
}

/// Like [`parse_brew_date`], but day-first dates must name a real calendar
/// day. Used for dates typed in by hand, where `31/02/24` is a typo rather
/// than a date to roll over.
#[must_use]
pub fn parse_entered_date(input: &str) -> Option<NaiveDate> {
    let s = input.trim();
    if s.contains('/') && !is_iso_date_shape(s) {
        return match SlashDate::parse(s, Local::now().year())? {
            SlashDate::YearFirst(date) => Some(date),
            SlashDate::DayFirst(parts) => parts.exact(),
        };
    }
    parse_brew_date(s)
}

fn is_iso_date_shape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
}

enum SlashDate {
    YearFirst(NaiveDate),
    DayFirst(DayFirst),
}

struct DayFirst {
    day: u32,
    month: u32,
    year: i32,
}

impl SlashDate {
    /// Split on `/`; parts past the third are ignored.
    fn parse(s: &str, current_year: i32) -> Option<Self> {
        let parts: Vec<&str> = s.split('/').map(str::trim).collect();
        if parts.len() < 2 {
            return None;
        }

        let four_digit_lead = parts[0].len() == 4 && parts[0].bytes().all(|b| b.is_ascii_digit());
        if parts.len() == 3 && four_digit_lead {
            return NaiveDate::parse_from_str(s, "%Y/%m/%d")
                .ok()
                .map(SlashDate::YearFirst);
        }

        let day = leading_int(parts[0])?;
        let month = leading_int(parts[1])?;
        let mut year = match parts.get(2).filter(|y| !y.is_empty()) {
            Some(y) => leading_int(y)?,
            None => current_year,
        };
        if year < 100 {
            year += 2000;
        }
        Some(SlashDate::DayFirst(DayFirst { day, month, year }))
    }
}

impl DayFirst {
    fn exact(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Month 13 is January of the next year; day 0 is the last day of the
    /// previous month.
    fn rolled_over(&self) -> Option<NaiveDate> {
        let months = i64::from(self.year) * 12 + i64::from(self.month) - 1;
        let year = i32::try_from(months.div_euclid(12)).ok()?;
        let month = u32::try_from(months.rem_euclid(12)).ok()? + 1;
        NaiveDate::from_ymd_opt(year, month, 1)?
            .checked_add_signed(TimeDelta::try_days(i64::from(self.day) - 1)?)
    }
}

/// Integer prefix of a string ("05th" -> 5), `None` without leading digits.
fn leading_int<T: std::str::FromStr>(s: &str) -> Option<T> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    s[..end].parse().ok()
}

fn parse_generic(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Local).date_naive());
    }
    for fmt in GENERIC_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    GENERIC_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// `October 5, 2024`
#[must_use]
pub fn format_long_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(
        || PLACEHOLDER.to_string(),
        |d| d.format("%B %-d, %Y").to_string(),
    )
}

/// `05/10`
#[must_use]
pub fn format_short_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| PLACEHOLDER.to_string(), |d| d.format("%d/%m").to_string())
}

/// Gravity to three decimals after normalization (`1046` -> `1.046`).
#[must_use]
pub fn format_sg(sg: Option<f64>) -> String {
    match sg {
        Some(v) if v.is_finite() => format!("{:.3}", normalize_sg(v)),
        _ => PLACEHOLDER.to_string(),
    }
}
