//! SQLite implementation of the corpus store.
//!
//! ## Database Schema
//!
//! ```sql
//! -- Comics table: one row per comic, keyed by its upstream number
//! CREATE TABLE comics (
//!     id INTEGER PRIMARY KEY,
//!     url TEXT NOT NULL,
//!     title TEXT NOT NULL,
//!     alt TEXT NOT NULL,
//!     body TEXT NOT NULL,
//!     indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//!
//! -- Keywords table: the ordered normalized terms of each comic
//! CREATE TABLE comic_keywords (
//!     comic_id INTEGER NOT NULL REFERENCES comics(id) ON DELETE CASCADE,
//!     position INTEGER NOT NULL,
//!     word TEXT NOT NULL,
//!     PRIMARY KEY (comic_id, position)
//! );
//! ```
//!
//! Keywords live in their own table so that corpus statistics (total and
//! distinct word counts) are single aggregate queries.
//!
//! ## SQLite Configuration
//!
//! - **WAL mode**: readers are not blocked by the update engine's writers
//! - **Busy timeout**: concurrent upserts for distinct ids wait instead of failing
//! - **Foreign keys**: dropping a comic drops its keywords

use super::{Comic, ComicId, CorpusStore, StoreStats};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::time::Duration;

/// SQLite-based corpus store. See module docs for the schema.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens the store backed by a database file, creating it if missing.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
        Self::new_with_pool(pool).await
    }

    /// Opens a store on a private in-memory database, for tests.
    ///
    /// The pool is pinned to one connection that never expires, since every
    /// SQLite connection to `:memory:` sees its own empty database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(
                SqliteConnectOptions::new()
                    .in_memory(true)
                    .foreign_keys(true),
            )
            .await
            .context("failed to open in-memory database")?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comics (
                id INTEGER PRIMARY KEY,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                alt TEXT NOT NULL,
                body TEXT NOT NULL,
                indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comic_keywords (
                comic_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                word TEXT NOT NULL,
                PRIMARY KEY (comic_id, position),
                FOREIGN KEY (comic_id) REFERENCES comics(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comic_keywords_word ON comic_keywords(word)")
            .execute(pool)
            .await?;

        Ok(())
    }

    fn comic_from_row(row: &sqlx::sqlite::SqliteRow, keywords: Vec<String>) -> Comic {
        Comic {
            id: row.get("id"),
            url: row.get("url"),
            title: row.get("title"),
            alt: row.get("alt"),
            body: row.get("body"),
            score: 0,
            keywords,
        }
    }
}

#[async_trait]
impl CorpusStore for SqliteStore {
    async fn add(&self, comic: Comic) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO comics (id, url, title, alt, body, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                title = excluded.title,
                alt = excluded.alt,
                body = excluded.body,
                indexed_at = datetime('now')
            "#,
        )
        .bind(comic.id)
        .bind(&comic.url)
        .bind(&comic.title)
        .bind(&comic.alt)
        .bind(&comic.body)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to store comic {}", comic.id))?;

        sqlx::query("DELETE FROM comic_keywords WHERE comic_id = ?1")
            .bind(comic.id)
            .execute(&mut *tx)
            .await?;

        for (position, word) in comic.keywords.iter().enumerate() {
            sqlx::query("INSERT INTO comic_keywords (comic_id, position, word) VALUES (?1, ?2, ?3)")
                .bind(comic.id)
                .bind(position as i64)
                .bind(word)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: ComicId) -> Result<Option<Comic>> {
        // One read transaction so the row and its keywords come from the same snapshot
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT id, url, title, alt, body FROM comics WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("failed to load comic {id}"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let keywords = sqlx::query_scalar::<_, String>(
            "SELECT word FROM comic_keywords WHERE comic_id = ?1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Some(Self::comic_from_row(&row, keywords)))
    }

    async fn list_ids(&self) -> Result<BTreeSet<ComicId>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM comics")
            .fetch_all(&self.pool)
            .await
            .context("failed to list comic ids")?;
        Ok(ids.into_iter().collect())
    }

    async fn last_id(&self) -> Result<Option<ComicId>> {
        let last = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(id) FROM comics")
            .fetch_one(&self.pool)
            .await
            .context("failed to read last comic id")?;
        Ok(last)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut tx = self.pool.begin().await?;
        let words = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(DISTINCT word) AS uniq FROM comic_keywords",
        )
        .fetch_one(&mut *tx)
        .await
        .context("failed to count keywords")?;

        let comics = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comics")
            .fetch_one(&mut *tx)
            .await
            .context("failed to count comics")?;
        tx.commit().await?;

        Ok(StoreStats {
            words_total: words.get::<i64, _>("total") as u64,
            words_unique: words.get::<i64, _>("uniq") as u64,
            comics_fetched: comics as u64,
        })
    }

    async fn drop_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM comic_keywords")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM comics").execute(&mut *tx).await?;
        tx.commit().await.context("failed to drop comics")?;
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Comic>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query("SELECT id, url, title, alt, body FROM comics ORDER BY id")
            .fetch_all(&mut *tx)
            .await
            .context("failed to scan comics")?;

        let keyword_rows = sqlx::query(
            "SELECT comic_id, word FROM comic_keywords ORDER BY comic_id, position",
        )
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        let mut keywords: HashMap<ComicId, Vec<String>> = HashMap::new();
        for row in keyword_rows {
            keywords
                .entry(row.get("comic_id"))
                .or_default()
                .push(row.get("word"));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let id: ComicId = row.get("id");
                Self::comic_from_row(row, keywords.remove(&id).unwrap_or_default())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn comic(id: ComicId, keywords: &[&str]) -> Comic {
        Comic {
            id,
            url: format!("https://imgs.xkcd.com/comics/{id}.png"),
            title: format!("Comic {id}"),
            alt: "alt text".to_string(),
            body: "transcript".to_string(),
            score: 0,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_add_and_get_preserves_keyword_order() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        store.add(comic(2, &["new", "year", "apple"])).await?;

        let loaded = store.get(2).await?.expect("comic 2 should exist");
        assert_eq!(loaded, comic(2, &["new", "year", "apple"]));
        assert!(store.get(3).await?.is_none());

        Ok(())
    }

    #[tokio::test]
    async fn test_add_overwrites_existing_comic() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        store.add(comic(1, &["old", "words", "here"])).await?;

        let mut updated = comic(1, &["fresh"]);
        updated.title = "Renamed".to_string();
        store.add(updated.clone()).await?;

        assert_eq!(store.get(1).await?, Some(updated));
        let stats = store.stats().await?;
        assert_eq!(stats.words_total, 1);
        assert_eq!(stats.comics_fetched, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_ids_stats_and_drop() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        assert_eq!(store.last_id().await?, None);

        store.add(comic(3, &["happy", "year"])).await?;
        store.add(comic(1, &["new", "year"])).await?;

        assert_eq!(store.list_ids().await?, BTreeSet::from([1, 3]));
        assert_eq!(store.last_id().await?, Some(3));
        assert_eq!(
            store.stats().await?,
            StoreStats {
                words_total: 4,
                words_unique: 3,
                comics_fetched: 2,
            }
        );

        store.drop_all().await?;
        assert!(store.list_ids().await?.is_empty());
        assert_eq!(store.stats().await?, StoreStats::default());

        // Dropping an empty corpus is fine
        store.drop_all().await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_all_returns_comics_in_id_order() -> Result<()> {
        let store = SqliteStore::open_memory().await?;
        store.add(comic(5, &["tree"])).await?;
        store.add(comic(2, &["new", "year"])).await?;
        store.add(comic(9, &[])).await?;

        let all = store.all().await?;
        let ids: Vec<ComicId> = all.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
        assert_eq!(all[0].keywords, vec!["new", "year"]);
        assert!(all[2].keywords.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_file_database_persists_and_accepts_concurrent_writes() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("xkcd.db");

        {
            let store = SqliteStore::open(&db_path).await?;
            let writes = (1..=20).map(|id| {
                let store = store.clone();
                tokio::spawn(async move { store.add(comic(id, &["word"])).await })
            });
            for handle in futures::future::join_all(writes).await {
                handle??;
            }
        }

        let reopened = SqliteStore::open(&db_path).await?;
        assert_eq!(reopened.list_ids().await?.len(), 20);
        assert_eq!(reopened.stats().await?.words_unique, 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_reads_never_mix_revisions() -> Result<()> {
        let temp_dir = tempdir()?;
        let store = SqliteStore::open(&temp_dir.path().join("xkcd.db")).await?;

        fn revision(n: usize) -> Comic {
            let mut comic = comic(1, &[]);
            comic.title = format!("rev{n}");
            comic.keywords = vec![format!("rev{n}"); 3];
            comic
        }

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for n in 0..200 {
                    if n % 7 == 0 {
                        store.drop_all().await?;
                    }
                    store.add(revision(n)).await?;
                }
                anyhow::Ok(())
            })
        };

        let consistent = |comic: &Comic| comic.keywords == vec![comic.title.clone(); 3];
        while !writer.is_finished() {
            for comic in store.all().await? {
                assert!(consistent(&comic), "mixed revisions: {comic:?}");
            }
            if let Some(comic) = store.get(1).await? {
                assert!(consistent(&comic), "mixed revisions: {comic:?}");
            }
            let stats = store.stats().await?;
            assert_eq!(stats.words_total, stats.comics_fetched * 3);
        }
        writer.await??;

        Ok(())
    }
}
