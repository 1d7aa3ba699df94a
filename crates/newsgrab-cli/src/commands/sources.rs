use anyhow::Result;

use newsgrab_core::{AppConfig, Catalog};

pub async fn run(config: &AppConfig) -> Result<()> {
    let sources = Catalog::from_config(config).await?.list_all().await?;

    if sources.is_empty() {
        println!("No sources configured.");
        println!("\nAdd [[sources]] entries to config.toml or set [catalog] sources_db.");
        return Ok(());
    }

    println!("Sources ({}):\n", sources.len());

    for source in &sources {
        let disabled = if source.enabled { "" } else { " [disabled]" };

        println!("  {} - {} ({}){}", source.id, source.name, source.mode, disabled);
        println!("    Locator: {}", source.locator);
        for feed in &source.feeds {
            println!("    Feed: {}", feed);
        }
        println!();
    }

    Ok(())
}
