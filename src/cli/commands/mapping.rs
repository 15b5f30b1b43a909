//! Mapping declaration command.

use console::style;

use indexner::annotation::{AnnotationManager, RunOptions};
use indexner::config::Config;
use indexner::context::RunContext;

/// Declare the annotated field and every filter field without annotating.
pub async fn cmd_mapping(
    config: Config,
    index: &str,
    field_name: &str,
    dry_run: bool,
) -> anyhow::Result<()> {
    let ctx = RunContext::connect(config).await?;
    let manager = AnnotationManager::new(ctx.client());

    let mut options = RunOptions::new(index, field_name);
    options.dry_run = dry_run;

    let outcome = manager
        .prepare_schema(&options, &ctx.config().filters)
        .await?;

    for field in &outcome.unchanged {
        println!("  {} {} (already declared)", style("·").dim(), field);
    }
    if dry_run {
        println!(
            "{} Dry run: {} fields already declared, nothing written",
            style("!").yellow(),
            outcome.unchanged.len()
        );
        return Ok(());
    }
    for field in &outcome.declared {
        println!("  {} {}", style("+").green(), field);
    }
    println!(
        "{} Mappings ready on {} ({} declared, {} unchanged)",
        style("✓").green(),
        index,
        outcome.declared.len(),
        outcome.unchanged.len()
    );
    Ok(())
}
