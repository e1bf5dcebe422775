use crate::cli::commands::{ConfigCommand, OutputFormat, PlanCommand};
use crate::query::{
    ChunkPlanner, Dimension, DimensionSpec, ExecutionPlan, HierarchyExpander, HierarchyRef,
    PlannerSettings, Query, StaticHierarchy,
};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

/// Expand and split the query described by `cmd`, then print the plan.
pub async fn handle_plan(cmd: PlanCommand) -> Result<()> {
    let config = cmd.config.resolve().context("Failed to load configuration")?;

    let hierarchy = match &cmd.hierarchy {
        Some(path) => StaticHierarchy::load(path)
            .await
            .with_context(|| format!("Failed to load hierarchy from {}", path.display()))?,
        None => StaticHierarchy::default(),
    };
    info!(nodes = hierarchy.len(), "hierarchy loaded");

    let query = build_query(&cmd)?;
    let expanded = HierarchyExpander::new(Arc::new(hierarchy))
        .expand_query(&query)
        .await
        .context("Failed to expand hierarchical dimensions")?;

    let plan = ChunkPlanner::new(PlannerSettings::from_config(&config))
        .plan(&expanded)
        .context("Failed to plan query")?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Toml => println!("{}", toml::to_string_pretty(&plan)?),
        OutputFormat::Table => print_plan_table(&plan),
    }
    Ok(())
}

/// Print the layered configuration after command-line overrides.
pub async fn handle_config(cmd: ConfigCommand) -> Result<()> {
    let config = cmd.config.resolve().context("Failed to load configuration")?;

    match cmd.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Toml | OutputFormat::Table => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}

fn build_query(cmd: &PlanCommand) -> Result<Query> {
    if cmd.items.is_empty() || cmd.periods.is_empty() {
        bail!("--items and --periods are required");
    }

    let units = if cmd.unit_parent.is_empty() {
        if cmd.units.is_empty() {
            bail!("either --units or --unit-parent is required");
        }
        DimensionSpec::explicit(cmd.units.iter().cloned())
    } else {
        let mut parents = cmd.unit_parent.iter();
        let Some(first) = parents.next() else {
            bail!("--unit-parent needs at least one node");
        };
        let mut reference =
            parents.fold(HierarchyRef::new(first.clone()), |r, p| r.with_parent(p.clone()));
        if cmd.descendants {
            reference = reference.with_descendants().with_levels(cmd.levels.iter().copied());
        }
        DimensionSpec::hierarchical(reference)
    };

    let mut builder = Query::builder()
        .items(cmd.items.iter().cloned())
        .periods(cmd.periods.iter().cloned())
        .dimension(Dimension::Units, units);
    for (name, enabled) in &cmd.flags {
        builder = builder.flag(name.clone(), *enabled);
    }
    Ok(builder.build())
}

fn print_plan_table(plan: &ExecutionPlan) {
    match &plan.original_score {
        Some(score) => println!("query score {} against limit {}", score, plan.limit),
        None => println!("query is empty"),
    }
    println!("{} sub-quer{}", plan.len(), if plan.len() == 1 { "y" } else { "ies" });
    println!();
    println!(
        "{:>5}  {:>6}  {:>6}  {:>7}  {:>10}  units",
        "#", "items", "units", "periods", "score"
    );

    for planned in plan.iter() {
        let units = planned.query.units().ids().unwrap_or_default();
        let span = match (units.first(), units.last()) {
            (Some(first), Some(last)) if units.len() > 1 => format!("{} .. {}", first, last),
            (Some(only), _) => only.clone(),
            _ => String::new(),
        };
        println!(
            "{:>5}  {:>6}  {:>6}  {:>7}  {:>10}  {}",
            planned.sequence,
            planned.score.items,
            planned.score.units,
            planned.score.periods,
            planned.score.total(),
            span
        );
    }
}
