use chrono::{Datelike, Local, NaiveDate};

use crate::dates::parse_brew_date_in;
use crate::models::{BrewRecord, BrewStats, BrewStatus, Reading};

/// Standard approximation: ABV = (OG - FG) * 131.25 on decimal gravities.
pub const ABV_FACTOR: f64 = 131.25;

/// Number of trailing readings examined for the trend.
pub const TREND_WINDOW: usize = 3;

/// Largest absolute SG drift across the trend window that still reads as READY.
///
/// Compared against normalized gravity (~1.000–1.100), so every realistic
/// trend falls inside it.
pub const READY_TOLERANCE: f64 = 2.0;

/// Derived stats for a brew as of today (local time).
#[must_use]
pub fn brew_stats(brew: &BrewRecord) -> BrewStats {
    brew_stats_on(brew, Local::now().date_naive())
}

/// Derived stats for a brew as of `today`.
#[must_use]
pub fn brew_stats_on(brew: &BrewRecord, today: NaiveDate) -> BrewStats {
    let readings = &brew.readings;
    let mut stats = BrewStats {
        og: None,
        current: None,
        abv: None,
        days: None,
        count: readings.len(),
        start_date: None,
        status: BrewStatus::New,
    };

    let (Some(first), Some(last)) = (readings.first(), readings.last()) else {
        return stats;
    };

    stats.og = first.normalized_sg();
    stats.current = last.normalized_sg();
    stats.start_date = parse_brew_date_in(&first.date, today.year());

    if let (Some(og), Some(current)) = (stats.og, stats.current) {
        stats.abv = Some(round_one_decimal((og - current) * ABV_FACTOR));
    }

    // Future-dated first readings give a negative count, kept as-is.
    stats.days = stats.start_date.map(|start| (today - start).num_days());

    stats.status = classify_status(brew);
    stats
}

/// Status precedence: an explicit "not fermenting" wins, then the SG trend.
#[must_use]
pub fn classify_status(brew: &BrewRecord) -> BrewStatus {
    let readings = &brew.readings;

    if !brew.fermenting {
        return BrewStatus::Complete;
    }

    if readings.len() >= 2 {
        let window_start = readings.len().saturating_sub(TREND_WINDOW);
        let sg_values: Vec<f64> = readings[window_start..]
            .iter()
            .filter_map(Reading::normalized_sg)
            .collect();

        return match (sg_values.first(), sg_values.last()) {
            (Some(first), Some(last)) if sg_values.len() >= 2 => {
                if (last - first).abs() <= READY_TOLERANCE {
                    BrewStatus::Ready
                } else {
                    BrewStatus::Fermenting
                }
            }
            _ => BrewStatus::Fermenting,
        };
    }

    if readings.len() == 1 {
        return BrewStatus::Fermenting;
    }

    BrewStatus::New
}

fn round_one_decimal(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
