//! Annotation command.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::ProgressBar;
use tokio::sync::mpsc;

use indexner::annotation::{AnnotationEvent, AnnotationManager, DocumentAnnotator, RunOptions};
use indexner::config::Config;
use indexner::context::RunContext;

use crate::cli::helpers::{document_progress, truncate};
use super::AnnotateArgs;

/// Annotate every document of an index.
pub async fn cmd_annotate(mut config: Config, args: AnnotateArgs) -> anyhow::Result<()> {
    if let Some(page_size) = args.page_size {
        config.traversal.page_size = page_size;
    }
    if let Some(scroll) = args.scroll {
        config.traversal.scroll_lease_secs = scroll;
    }

    let ctx = RunContext::connect(config).await?;
    let config = ctx.config();

    let recognizer = ctx.recognizer(&args.language)?;
    if !recognizer.is_available().await {
        anyhow::bail!(
            "Recognizer '{}' is not available: {}",
            recognizer.model_id(),
            recognizer.availability_hint()
        );
    }
    println!(
        "{} Connected to {} (model: {})",
        style("✓").green(),
        config.index.base_url(),
        recognizer.model_id()
    );

    let options = RunOptions {
        index: args.index.clone(),
        source_field: args.field_name.clone(),
        page_size: config.traversal.page_size,
        lease: Duration::from_secs(config.traversal.scroll_lease_secs),
        limit: args.limit,
        dry_run: args.dry_run,
        archive_dir: config.archive_dir(args.output_dir.as_deref()),
    };

    let manager = AnnotationManager::new(ctx.client());
    let annotator = DocumentAnnotator::new(recognizer, config.filters.clone());

    let mappings = manager.prepare_schema(&options, annotator.categories()).await?;
    if !mappings.declared.is_empty() {
        println!(
            "{} Declared fields: {}",
            style("✓").green(),
            mappings.declared.join(", ")
        );
    }

    if options.dry_run {
        println!(
            "{} Dry run: documents will not be updated",
            style("!").yellow()
        );
    }
    println!(
        "{} Annotating {}.{} into {}",
        style("→").cyan(),
        options.index,
        options.source_field,
        options.annotated_field()
    );

    ctx.cancel_flag().cancel_on_ctrl_c();
    let limited = options.limit > 0;

    // Create event channel for progress tracking
    let (event_tx, mut event_rx) = mpsc::channel::<AnnotationEvent>(100);

    // State for progress bar
    let pb = Arc::new(tokio::sync::Mutex::new(None::<ProgressBar>));
    let pb_clone = pb.clone();

    // Spawn event handler for UI
    let event_handler = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                AnnotationEvent::Started { total_documents } => {
                    let progress = document_progress(total_documents);
                    progress.set_message("Annotating...");
                    *pb_clone.lock().await = Some(progress);
                }
                AnnotationEvent::DocumentStarted { document_id } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.set_message(truncate(&document_id, 40));
                    }
                }
                AnnotationEvent::DocumentCompleted { .. }
                | AnnotationEvent::DocumentSkipped { .. } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.inc(1);
                    }
                }
                AnnotationEvent::DocumentFailed { document_id, error } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.println(format!(
                            "{} {}: {}",
                            style("✗").red(),
                            truncate(&document_id, 40),
                            error
                        ));
                        progress.inc(1);
                    }
                }
                AnnotationEvent::Complete { summary } => {
                    if let Some(ref progress) = *pb_clone.lock().await {
                        progress.finish_and_clear();
                    }
                    *pb_clone.lock().await = None;

                    println!(
                        "{} Annotation complete: {} succeeded, {} failed, {} skipped",
                        style("✓").green(),
                        summary.succeeded,
                        summary.failed,
                        summary.skipped
                    );
                    if summary.cancelled {
                        println!("  {} Stopped by interrupt", style("!").yellow());
                    } else if !summary.traversal_complete && !limited && summary.processed() > 0 {
                        println!(
                            "  {} Traversal ended before all {} documents were read",
                            style("!").yellow(),
                            summary.total_expected
                        );
                    }
                    if let Some(ref path) = summary.archive_path {
                        println!(
                            "  {} Entities archived to {}",
                            style("→").dim(),
                            path.display()
                        );
                    }
                }
            }
        }
    });

    let result = manager
        .run(&annotator, &options, ctx.cancel_flag(), event_tx)
        .await;

    // Wait for event handler to finish
    let _ = event_handler.await;

    result.map(|_| ())
}
