use anyhow::{Result, bail};
use chrono::{Duration, Local};
use serde::Serialize;
use std::process;

use brewlog_core::dates::{PLACEHOLDER, parse_entered_date};
use brewlog_core::service::{BrewService, BrewStore};

/// Date text for a new reading. Defaults to today; `today` / `yesterday`
/// expand to ISO dates and anything else must be a real calendar date the
/// log can parse.
pub(crate) fn resolve_reading_date(date: Option<String>) -> Result<String> {
    let today = Local::now().date_naive();
    match date.as_deref().map(str::trim) {
        None | Some("today") => Ok(today.format("%Y-%m-%d").to_string()),
        Some("yesterday") => Ok((today - Duration::days(1)).format("%Y-%m-%d").to_string()),
        Some(s) => {
            if parse_entered_date(s).is_none() {
                bail!("Invalid date '{s}'. Use YYYY-MM-DD, DD/MM/YY or today/yesterday");
            }
            Ok(s.to_string())
        }
    }
}

pub(crate) fn parse_sg(s: &str) -> Result<f64> {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        _ => bail!("Invalid SG '{s}'. Use a number like 1.046 or 1046"),
    }
}

pub(crate) fn format_cost(cost: f64) -> String {
    format!("${cost:.2}")
}

pub(crate) fn format_abv(abv: Option<f64>) -> String {
    abv.map_or_else(|| PLACEHOLDER.to_string(), |v| format!("{v:.1}%"))
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Exit with status 2 unless `id` names a loaded brew.
pub(crate) fn require_brew<S: BrewStore>(service: &BrewService<S>, id: &str, json: bool) {
    if service.brew(id).is_none() {
        let message = format!("Brew {id} not found");
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
