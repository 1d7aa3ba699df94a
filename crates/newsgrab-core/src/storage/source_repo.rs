use std::collections::BTreeMap;

use sqlx::FromRow;

use super::Database;
use crate::source::{Source, SourceMode};
use crate::Result;

/// Reads sources from an externally maintained catalog database.
///
/// The catalog has `recipes`, `endpoints` and `recipe_endpoints` tables; each
/// recipe becomes one source and its `feed` endpoints become the source's
/// feed URLs.
pub struct SourceRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct RecipeRow {
    recipe_uid: String,
    title: Option<String>,
    file_path: Option<String>,
}

#[derive(FromRow)]
struct FeedEndpointRow {
    recipe_uid: String,
    url: String,
}

impl<'a> SourceRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// All catalog entries ordered by id
    pub async fn list_all(&self, default_mode: SourceMode) -> Result<Vec<Source>> {
        let recipes: Vec<RecipeRow> = sqlx::query_as(
            r#"
            SELECT recipe_uid, title, file_path
            FROM recipes
            WHERE recipe_uid IS NOT NULL AND recipe_uid != ''
            ORDER BY recipe_uid
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        let endpoints: Vec<FeedEndpointRow> = sqlx::query_as(
            r#"
            SELECT r.recipe_uid, e.url
            FROM recipe_endpoints re
            JOIN endpoints e ON e.id = re.endpoint_id
            JOIN recipes r ON r.id = re.recipe_id
            WHERE e.url_type = 'feed' AND e.url IS NOT NULL
            ORDER BY r.recipe_uid, e.id
            "#,
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut feeds: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for row in endpoints {
            let urls = feeds.entry(row.recipe_uid).or_default();
            if !urls.contains(&row.url) {
                urls.push(row.url);
            }
        }

        let sources = recipes
            .into_iter()
            .map(|row| {
                let feeds = feeds.remove(&row.recipe_uid).unwrap_or_default();
                Source {
                    name: row
                        .title
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| row.recipe_uid.clone()),
                    mode: default_mode,
                    locator: row
                        .file_path
                        .filter(|p| !p.trim().is_empty())
                        .unwrap_or_else(|| row.recipe_uid.clone()),
                    feeds,
                    enabled: true,
                    id: row.recipe_uid,
                }
            })
            .collect();

        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_SCHEMA: &str = r#"
    CREATE TABLE recipes (id INTEGER PRIMARY KEY, recipe_uid TEXT UNIQUE, title TEXT, file_path TEXT);
    CREATE TABLE endpoints (id INTEGER PRIMARY KEY, url TEXT UNIQUE, url_type TEXT);
    CREATE TABLE recipe_endpoints (recipe_id INTEGER NOT NULL, endpoint_id INTEGER NOT NULL, feed_title TEXT);
    INSERT INTO recipes VALUES (1, 'bbc', 'BBC News', 'recipes/bbc.recipe');
    INSERT INTO recipes VALUES (2, 'ap', NULL, NULL);
    INSERT INTO endpoints VALUES (10, 'https://bbc.example/world.xml', 'feed');
    INSERT INTO endpoints VALUES (11, 'https://bbc.example/tech.xml', 'feed');
    INSERT INTO endpoints VALUES (12, 'https://bbc.example/', 'homepage');
    INSERT INTO recipe_endpoints VALUES (1, 10, 'World');
    INSERT INTO recipe_endpoints VALUES (1, 11, 'Tech');
    INSERT INTO recipe_endpoints VALUES (1, 12, NULL);
    "#;

    async fn catalog() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.db");

        let seed = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(
                sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(&path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::raw_sql(CATALOG_SCHEMA).execute(&seed).await.unwrap();
        seed.close().await;

        let db = Database::open_read_only(&path).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_list_all_groups_feed_endpoints() {
        let (_dir, db) = catalog().await;
        let sources = SourceRepository::new(&db)
            .list_all(SourceMode::Auto)
            .await
            .unwrap();

        assert_eq!(sources.len(), 2);

        let ap = &sources[0];
        assert_eq!(ap.id, "ap");
        assert_eq!(ap.name, "ap");
        assert_eq!(ap.locator, "ap");
        assert!(ap.feeds.is_empty());

        let bbc = &sources[1];
        assert_eq!(bbc.name, "BBC News");
        assert_eq!(bbc.locator, "recipes/bbc.recipe");
        assert_eq!(bbc.mode, SourceMode::Auto);
        assert_eq!(
            bbc.feeds,
            vec!["https://bbc.example/world.xml", "https://bbc.example/tech.xml"]
        );
    }
}
