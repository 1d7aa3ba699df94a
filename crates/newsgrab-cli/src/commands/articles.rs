use anyhow::Result;

use newsgrab_core::storage::{ArticleRepository, Database};
use newsgrab_core::AppConfig;

pub async fn run(config: &AppConfig, limit: u32, source: Option<&str>) -> Result<()> {
    let db = Database::new(config).await?;
    let repo = ArticleRepository::new(&db);
    let articles = repo.list_recent(source, limit).await?;

    if articles.is_empty() {
        println!("No articles stored yet.");
        println!("\nTo fetch articles, run:");
        println!("  newsgrab fetch");
        return Ok(());
    }

    println!(
        "Showing {} of {} stored articles:\n",
        articles.len(),
        repo.count().await?
    );

    for article in &articles {
        let title = article.title.as_deref().unwrap_or("(no title)");
        let published = article
            .published_at
            .map(|p| p.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "undated".to_string());

        println!("  [{}] {}", article.source_id, title);
        if let Some(url) = &article.url {
            println!("    URL: {}", url);
        }
        println!(
            "    Published: {}  Stored: {}",
            published,
            article.stored_at.format("%Y-%m-%d %H:%M")
        );
        println!();
    }

    Ok(())
}
