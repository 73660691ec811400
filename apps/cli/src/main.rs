#![deny(warnings)]

//! Headless CLI: prices a project budget and previews reorders.

use anyhow::{bail, Context, Result};
use budget_core::{
    validate_project, Area, GroupId, LineItem, LineItemId, PriceRange, Project, SalePrice,
};
use budget_order::{
    filter_by_category, index_updates, reorder_groups, reorder_line_items, sort_by_index,
};
use budget_pricing::{
    area_tier_totals, area_total_sale_price, group_total_sale_price, option_per_unit_sale_price,
    option_total_sale_price, project_total_sale_price,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_PROJECT: &str = "assets/sample_project.json";

#[derive(Debug, Default)]
struct Args {
    project: Option<PathBuf>,
    config: Option<PathBuf>,
    moves: Vec<(String, u32)>,
    group_moves: Vec<(String, u32)>,
}

fn parse_target(arg: &str) -> Result<(String, u32)> {
    let (id, index) = arg
        .split_once('=')
        .with_context(|| format!("expected <id>=<index>, got {arg:?}"))?;
    let index = index
        .parse()
        .with_context(|| format!("invalid index in {arg:?}"))?;
    Ok((id.to_string(), index))
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().with_context(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--project" => args.project = Some(PathBuf::from(value()?)),
            "--config" => args.config = Some(PathBuf::from(value()?)),
            "--move" => args.moves.push(parse_target(&value()?)?),
            "--move-group" => args.group_moves.push(parse_target(&value()?)?),
            other => bail!("unknown argument {other:?}"),
        }
    }
    Ok(args)
}

/// Display settings for currency strings.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct CliConfig {
    currency_symbol: String,
    thousands_separator: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            currency_symbol: "$".to_string(),
            thousands_separator: ",".to_string(),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn load_project(path: &Path) -> Result<Project> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let project = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
        _ => serde_json::from_str(&text)?,
    };
    Ok(project)
}

fn format_dollars(value: u64, cfg: &CliConfig) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push_str(&cfg.thousands_separator);
        }
        grouped.push(ch);
    }
    format!("{}{}", cfg.currency_symbol, grouped)
}

fn format_range(range: PriceRange, cfg: &CliConfig) -> String {
    if range.is_single() {
        return format_dollars(range.low_price_in_dollars, cfg);
    }
    format!(
        "{} - {}",
        format_dollars(range.low_price_in_dollars, cfg),
        format_dollars(range.high_price_in_dollars, cfg)
    )
}

fn format_line_item(item: &LineItem, cfg: &CliConfig) -> Result<String> {
    let Some(option) = item.selected_option()? else {
        return Ok("-".to_string());
    };
    let total = option_total_sale_price(option, item)?;
    if item.quantity().is_zero() {
        let unit = option_per_unit_sale_price(option, item)?;
        return Ok(format!("{} / unit", format_sale(unit, cfg)));
    }
    Ok(format_sale(total, cfg))
}

fn format_sale(price: SalePrice, cfg: &CliConfig) -> String {
    format_range(price.into_range(), cfg)
}

fn print_area(project: &Project, area: &Area, cfg: &CliConfig) -> Result<()> {
    println!("{}", area.name);
    for category in &project.categories {
        let mut groups: Vec<_> = filter_by_category(&area.groups, &category.id)
            .into_iter()
            .cloned()
            .collect();
        if groups.is_empty() {
            continue;
        }
        sort_by_index(&mut groups);
        println!("  {}", category.name);
        for group in &groups {
            println!(
                "    {}. {} .. {}",
                group.index_in_category,
                group.name,
                format_range(group_total_sale_price(group)?, cfg)
            );
            let mut items = group.line_items.clone();
            sort_by_index(&mut items);
            for item in &items {
                println!(
                    "       {}. {} x{} .. {}",
                    item.index_in_group,
                    item.name,
                    item.display_quantity(),
                    format_line_item(item, cfg)?
                );
            }
        }
    }
    for (tier, range) in area_tier_totals(area)? {
        println!("  {} tier: {}", tier, format_range(range, cfg));
    }
    println!("  Selected total: {}", format_range(area_total_sale_price(area)?, cfg));
    Ok(())
}

fn apply_line_item_move(project: &mut Project, id: &str, index: u32) -> Result<()> {
    let id = LineItemId::from(id);
    let group = project
        .areas
        .iter_mut()
        .flat_map(|a| a.groups.iter_mut())
        .find(|g| g.line_items.iter().any(|li| li.id == id))
        .with_context(|| format!("line item {id} not found"))?;
    let updated = reorder_line_items(group, &id, index)?;
    for u in index_updates(&group.line_items, &updated.line_items) {
        info!(line_item = %u.id, old = ?u.old_index, new = u.new_index, "index update");
    }
    *group = updated;
    Ok(())
}

fn apply_group_move(project: &mut Project, id: &str, index: u32) -> Result<()> {
    let id = GroupId::from(id);
    let area = project
        .areas
        .iter_mut()
        .find(|a| a.groups.iter().any(|g| g.id == id))
        .with_context(|| format!("group {id} not found"))?;
    let category = area
        .groups
        .iter()
        .find(|g| g.id == id)
        .map(|g| g.category_id.clone())
        .with_context(|| format!("group {id} not found"))?;
    let updated = reorder_groups(area, &category, &id, index)?;
    let before: Vec<_> = filter_by_category(&area.groups, &category)
        .into_iter()
        .cloned()
        .collect();
    let after: Vec<_> = filter_by_category(&updated.groups, &category)
        .into_iter()
        .cloned()
        .collect();
    for u in index_updates(&before, &after) {
        info!(group = %u.id, old = ?u.old_index, new = u.new_index, "index update");
    }
    *area = updated;
    Ok(())
}

fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    let cfg = load_config(args.config.as_deref())?;
    let path = args.project.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT));
    info!(project = %path.display(), "loading project");

    let mut project = load_project(&path)?;
    validate_project(&project)?;
    for (id, index) in &args.moves {
        apply_line_item_move(&mut project, id, *index)?;
    }
    for (id, index) in &args.group_moves {
        apply_group_move(&mut project, id, *index)?;
    }

    println!("{}", project.name);
    for area in &project.areas {
        print_area(&project, area, &cfg)?;
    }
    println!("Project total: {}", format_range(project_total_sale_price(&project)?, &cfg));
    Ok(())
}
