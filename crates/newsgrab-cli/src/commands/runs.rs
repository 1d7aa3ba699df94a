use anyhow::Result;

use newsgrab_core::storage::{Database, RunRepository, RunStatus};
use newsgrab_core::AppConfig;

pub async fn run(config: &AppConfig, limit: u32, source: Option<&str>) -> Result<()> {
    let db = Database::new(config).await?;
    let repo = RunRepository::new(&db);
    let runs = match source {
        Some(source_id) => repo.recent_for_source(source_id, limit).await?,
        None => repo.recent(limit).await?,
    };

    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    for run in &runs {
        let provider = run.provider.as_deref().unwrap_or("-");
        let fallback = if run.via_fallback { " (fallback)" } else { "" };

        println!(
            "{}  {:<20} {:<6} {:<6}{} found {}, new {}",
            run.started_at.format("%Y-%m-%d %H:%M"),
            run.source_id,
            run.status.as_str(),
            provider,
            fallback,
            run.found,
            run.new_count
        );
        if run.status == RunStatus::Failed {
            if let Some(error) = &run.error {
                println!("    {}", error);
            }
        }
    }

    Ok(())
}
