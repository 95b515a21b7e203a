use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use brewlog_core::cache::{CacheStore, CacheSummary};
use brewlog_core::router::CACHE_NAME;

use super::helpers::print_json;

pub(crate) fn cmd_cache_list(store: &CacheStore, json: bool) -> Result<()> {
    let summaries = store.summaries()?;
    if json {
        return print_json(&summaries);
    }
    println!("{}", render_cache_list(&summaries));
    Ok(())
}

fn render_cache_list(summaries: &[CacheSummary]) -> String {
    #[derive(Tabled)]
    struct CacheRow {
        #[tabled(rename = "Cache")]
        name: String,
        #[tabled(rename = "Entries")]
        entries: i64,
        #[tabled(rename = "Size")]
        size: String,
    }

    if summaries.is_empty() {
        return "No cached responses.".to_string();
    }

    let rows: Vec<CacheRow> = summaries
        .iter()
        .map(|s| CacheRow {
            name: if s.cache_name == CACHE_NAME {
                format!("{} (current)", s.cache_name)
            } else {
                s.cache_name.clone()
            },
            entries: s.entries,
            size: format_bytes(s.bytes),
        })
        .collect();

    Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string()
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: i64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

pub(crate) fn cmd_cache_clear(store: &CacheStore, json: bool) -> Result<()> {
    let removed = store.clear()?;
    if json {
        return print_json(&serde_json::json!({ "removed": removed }));
    }
    println!("Removed {removed} cached responses");
    Ok(())
}
