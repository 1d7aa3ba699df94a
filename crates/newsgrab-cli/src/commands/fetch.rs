use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::info;

use newsgrab_core::{
    storage::Database, AppConfig, Catalog, FetchCycleResult, FetchOrchestrator, FetchPipeline,
    ScheduleMode, Scheduler, SchedulerEvent,
};

use crate::FetchArgs;

pub async fn run(mut config: AppConfig, args: FetchArgs) -> Result<ExitCode> {
    if let Some(max_articles) = args.max_articles {
        config.fetch.max_articles = max_articles;
    }
    let interval = match args.interval {
        Some(secs) => Some(Duration::from_secs(secs)),
        None => config.fetch.interval(),
    };
    let mode = ScheduleMode::from_interval(interval);

    let db = Database::new(&config).await?;
    let catalog = Catalog::from_config(&config)
        .await?
        .with_mode_override(args.mode)
        .with_only(args.source);
    let orchestrator = FetchOrchestrator::from_config(&config, db)?;
    let pipeline = FetchPipeline::new(Arc::new(catalog), orchestrator);

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                SchedulerEvent::CycleCompleted(result) => print_summary(&result),
                SchedulerEvent::CycleFailed { message } => {
                    eprintln!("Cycle failed: {}", message);
                }
            }
        }
    });

    if let ScheduleMode::Interval(period) = mode {
        println!(
            "Fetching every {} seconds. Press Ctrl+C to stop.",
            period.as_secs()
        );
    }

    let report = Scheduler::new(pipeline, mode)
        .with_event_sender(event_tx)
        .run(shutdown_rx)
        .await;

    // Sender is dropped with the scheduler, so the printer drains and exits
    let _ = printer.await;

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("No fetch cycle completed.");
        Ok(ExitCode::FAILURE)
    }
}

fn print_summary(result: &FetchCycleResult) {
    println!(
        "\nCycle {} ({})",
        result.cycle_id,
        result.started_at.format("%Y-%m-%d %H:%M:%S")
    );

    if result.outcomes.is_empty() {
        println!("  No enabled sources.");
        return;
    }

    for outcome in &result.outcomes {
        match (outcome.provider_used, outcome.error()) {
            (Some(provider), _) => {
                let fallback = if outcome.via_fallback { ", fallback" } else { "" };
                println!(
                    "  {} [{}{}]: {} new, {} duplicate, {} skipped",
                    outcome.source_id,
                    provider,
                    fallback,
                    outcome.new,
                    outcome.duplicates,
                    outcome.malformed + outcome.stale
                );
            }
            (None, Some(error)) => {
                println!("  {} [FAILED]: {}", outcome.source_id, error);
            }
            (None, None) => {
                println!("  {} [FAILED]", outcome.source_id);
            }
        }
    }

    println!(
        "Total: {} found, {} new, {} duplicate, {} failed",
        result.total_found(),
        result.total_new(),
        result.total_duplicates(),
        result.failed_sources()
    );
}
