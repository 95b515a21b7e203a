use anyhow::{Result, bail};

use brewlog_core::service::{BrewService, BrewStore, parse_ingredient};

use super::helpers::{format_cost, print_json, require_brew};

/// Ingredient positions are shown 1-based in `brewlog show`.
fn to_index(position: usize) -> Result<usize> {
    if position == 0 {
        bail!("Ingredient positions start at 1");
    }
    Ok(position - 1)
}

pub(crate) async fn cmd_ingredient_add<S: BrewStore>(
    service: &mut BrewService<S>,
    id: &str,
    item: &str,
    cost: Option<&str>,
    json: bool,
) -> Result<()> {
    require_brew(service, id, json);
    let ingredient = parse_ingredient(item, cost.unwrap_or_default())?;
    let summary = format!("{} ({})", ingredient.item, format_cost(ingredient.cost));
    service.add_ingredient(id, ingredient.clone()).await?;

    if json {
        return print_json(&ingredient);
    }
    println!("Added {summary}");
    Ok(())
}

pub(crate) async fn cmd_ingredient_edit<S: BrewStore>(
    service: &mut BrewService<S>,
    id: &str,
    position: usize,
    item: &str,
    cost: Option<&str>,
    json: bool,
) -> Result<()> {
    require_brew(service, id, json);
    let index = to_index(position)?;
    let ingredient = parse_ingredient(item, cost.unwrap_or_default())?;
    service.edit_ingredient(id, index, ingredient.clone()).await?;

    if json {
        return print_json(&ingredient);
    }
    println!(
        "Updated ingredient {position}: {} ({})",
        ingredient.item,
        format_cost(ingredient.cost)
    );
    Ok(())
}

pub(crate) async fn cmd_ingredient_delete<S: BrewStore>(
    service: &mut BrewService<S>,
    id: &str,
    position: usize,
    json: bool,
) -> Result<()> {
    require_brew(service, id, json);
    let index = to_index(position)?;
    let removed = service.delete_ingredient(id, index).await?;

    if json {
        return print_json(&removed);
    }
    println!("Removed {}", removed.item);
    Ok(())
}
