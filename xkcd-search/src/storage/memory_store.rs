use super::{Comic, ComicId, CorpusStore, StoreStats};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tokio::sync::RwLock;

/// In-memory corpus store, used by tests and the `--db :memory:` mode.
#[derive(Debug, Default)]
pub struct MemoryStore {
    comics: RwLock<BTreeMap<ComicId, Comic>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorpusStore for MemoryStore {
    async fn add(&self, mut comic: Comic) -> Result<()> {
        comic.score = 0;
        self.comics.write().await.insert(comic.id, comic);
        Ok(())
    }

    async fn get(&self, id: ComicId) -> Result<Option<Comic>> {
        Ok(self.comics.read().await.get(&id).cloned())
    }

    async fn list_ids(&self) -> Result<BTreeSet<ComicId>> {
        Ok(self.comics.read().await.keys().copied().collect())
    }

    async fn last_id(&self) -> Result<Option<ComicId>> {
        Ok(self.comics.read().await.keys().next_back().copied())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let comics = self.comics.read().await;
        let mut unique = HashSet::new();
        let mut total = 0u64;
        for comic in comics.values() {
            total += comic.keywords.len() as u64;
            unique.extend(comic.keywords.iter().map(String::as_str));
        }
        Ok(StoreStats {
            words_total: total,
            words_unique: unique.len() as u64,
            comics_fetched: comics.len() as u64,
        })
    }

    async fn drop_all(&self) -> Result<()> {
        self.comics.write().await.clear();
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Comic>> {
        Ok(self.comics.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comic(id: ComicId, keywords: &[&str]) -> Comic {
        Comic {
            id,
            url: String::new(),
            title: format!("#{id}"),
            alt: String::new(),
            body: String::new(),
            score: 0,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_basic_operations() -> Result<()> {
        let store = MemoryStore::new();
        assert_eq!(store.last_id().await?, None);
        assert_eq!(store.stats().await?, StoreStats::default());

        store.add(comic(2, &["new", "year"])).await?;
        store.add(comic(7, &["year", "tree"])).await?;

        assert_eq!(store.last_id().await?, Some(7));
        assert_eq!(store.list_ids().await?, BTreeSet::from([2, 7]));
        assert_eq!(store.get(2).await?, Some(comic(2, &["new", "year"])));
        assert_eq!(store.get(3).await?, None);
        assert_eq!(
            store.stats().await?,
            StoreStats {
                words_total: 4,
                words_unique: 3,
                comics_fetched: 2,
            }
        );

        store.drop_all().await?;
        assert!(store.all().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_memory_store_overwrite_resets_score() -> Result<()> {
        let store = MemoryStore::new();
        let mut scored = comic(1, &["apple"]);
        scored.score = 5;
        store.add(scored).await?;

        assert_eq!(store.get(1).await?.map(|c| c.score), Some(0));
        Ok(())
    }
}
