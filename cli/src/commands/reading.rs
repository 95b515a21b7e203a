use anyhow::Result;

use brewlog_core::dates::format_sg;
use brewlog_core::models::normalize_sg;
use brewlog_core::service::{BrewService, BrewStore, NewReading};

use super::helpers::{parse_sg, print_json, require_brew, resolve_reading_date};

pub(crate) async fn cmd_reading<S: BrewStore>(
    service: &mut BrewService<S>,
    id: &str,
    sg: &str,
    temp: Option<f64>,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    require_brew(service, id, json);

    let sg = parse_sg(sg)?;
    let date = resolve_reading_date(date)?;
    service
        .log_reading(
            id,
            NewReading {
                date: date.clone(),
                sg,
                temp,
            },
        )
        .await?;

    if json {
        return print_json(&serde_json::json!({
            "id": id,
            "date": date,
            "SG": sg,
            "temp": temp,
        }));
    }

    let temp_display = temp.map(|t| format!(" at {t:.1}°")).unwrap_or_default();
    println!(
        "Logged SG {} on {date}{temp_display}",
        format_sg(Some(normalize_sg(sg)))
    );
    if let Some(stats) = service.open_detail(id).map(|v| v.stats) {
        println!("  Status: {} ({} readings)", stats.status, stats.count);
    }
    Ok(())
}
