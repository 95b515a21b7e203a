use std::fmt::Write as _;

use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use brewlog_core::dates::{PLACEHOLDER, format_long_date, format_sg};
use brewlog_core::service::{BrewService, BrewStore, BrewSummary, DetailView};

use super::helpers::{format_abv, format_cost, print_json, require_brew, truncate};

const EMPTY_LIST: &str = "No brews yet. Start your first brew!";

pub(crate) fn cmd_list<S: BrewStore>(service: &BrewService<S>, json: bool) -> Result<()> {
    let summaries = service.summaries();
    if json {
        return print_json(&summaries);
    }
    println!("{}", render_list(&summaries));
    Ok(())
}

pub(crate) fn render_list(summaries: &[BrewSummary]) -> String {
    #[derive(Tabled)]
    struct BrewRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Started")]
        started: String,
        #[tabled(rename = "Readings")]
        readings: usize,
    }

    if summaries.is_empty() {
        return EMPTY_LIST.to_string();
    }

    let rows: Vec<BrewRow> = summaries
        .iter()
        .map(|s| BrewRow {
            id: s.id.clone(),
            name: truncate(&s.name, 30),
            status: s.status.to_string(),
            started: s.started.clone(),
            readings: s.readings,
        })
        .collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..5)).with(Alignment::right()))
        .to_string()
}

pub(crate) fn cmd_show<S: BrewStore>(service: &BrewService<S>, id: &str, json: bool) -> Result<()> {
    require_brew(service, id, json);
    let Some(view) = service.open_detail(id) else {
        return Ok(());
    };
    if json {
        return print_json(&view);
    }
    println!("{}", render_detail(&view));
    Ok(())
}

pub(crate) fn render_detail(view: &DetailView) -> String {
    #[derive(Tabled)]
    struct ReadingRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "SG")]
        sg: String,
        #[tabled(rename = "Temp")]
        temp: String,
    }

    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Item")]
        item: String,
        #[tabled(rename = "Cost")]
        cost: String,
    }

    let brew = &view.brew;
    let stats = &view.stats;
    let mut out = String::new();

    let days = stats
        .days
        .map_or_else(|| PLACEHOLDER.to_string(), |d| d.to_string());
    let _ = writeln!(out, "{}  [{}]", brew.name, stats.status);
    let _ = writeln!(out, "  Started:    {}", format_long_date(stats.start_date));
    let _ = writeln!(out, "  Days:       {days}");
    let _ = writeln!(out, "  OG:         {}", format_sg(stats.og));
    let _ = writeln!(out, "  Current SG: {}", format_sg(stats.current));
    let _ = writeln!(out, "  ABV:        {}", format_abv(stats.abv));
    let _ = writeln!(out, "  Readings:   {}", stats.count);

    if !view.chart.points.is_empty() {
        let rows: Vec<ReadingRow> = view
            .chart
            .points
            .iter()
            .zip(&brew.readings)
            .map(|(point, reading)| ReadingRow {
                date: point.label.clone(),
                sg: format_sg(point.sg),
                temp: reading
                    .temp
                    .map_or_else(|| PLACEHOLDER.to_string(), |t| format!("{t:.1}")),
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
            .to_string();
        let _ = writeln!(out, "\n{table}");
    }

    let _ = writeln!(out, "\nNotes:\n  {}", view.notes_text());

    let _ = writeln!(out, "\nIngredients:");
    if brew.ingredients.is_empty() {
        let _ = writeln!(out, "  (none)");
    } else {
        let rows: Vec<IngredientRow> = brew
            .ingredients
            .iter()
            .enumerate()
            .map(|(i, ing)| IngredientRow {
                idx: i + 1,
                item: truncate(&ing.item, 40),
                cost: format_cost(ing.cost),
            })
            .collect();
        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
            .to_string();
        let _ = writeln!(out, "{table}");
    }
    let _ = writeln!(out, "  Total: {}", format_cost(view.ingredients_total));

    let _ = write!(
        out,
        "\n{} with: brewlog toggle {}",
        view.toggle_label(),
        brew.id
    );
    out
}

pub(crate) async fn cmd_new<S: BrewStore>(
    service: &mut BrewService<S>,
    name: &str,
    notes: Option<&str>,
    json: bool,
) -> Result<()> {
    let id = service.start_brew(name, notes.unwrap_or_default()).await?;
    if json {
        return match service.brew(&id) {
            Some(brew) => print_json(brew),
            None => print_json(&serde_json::json!({ "id": id })),
        };
    }
    println!("Started brew '{}' ({id})", name.trim());
    Ok(())
}

pub(crate) async fn cmd_notes<S: BrewStore>(
    service: &mut BrewService<S>,
    id: &str,
    notes: &str,
    json: bool,
) -> Result<()> {
    require_brew(service, id, json);
    service.save_notes(id, notes).await?;
    if json {
        return print_json(&serde_json::json!({ "id": id, "notes": notes.trim() }));
    }
    println!("Saved notes for {id}");
    Ok(())
}

pub(crate) async fn cmd_toggle<S: BrewStore>(
    service: &mut BrewService<S>,
    id: &str,
    json: bool,
) -> Result<()> {
    require_brew(service, id, json);
    let fermenting = service.toggle_fermenting(id).await?;
    if json {
        return print_json(&serde_json::json!({ "id": id, "fermenting": fermenting }));
    }
    if fermenting {
        println!("Marked {id} as fermenting");
    } else {
        println!("Marked {id} as complete");
    }
    Ok(())
}
