// Polyglot Reader - Sentence-Synchronized Multilingual Audiobook Engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Progress stores
//!
//! Where resume state lives. The engine only needs `load` and `save`; the
//! extra operations back the CLI and library screens.

use crate::error::Result;
use crate::progress::ProgressSnapshot;
use crate::storage::{queries, Database, ProgressRow};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Persistence for resume state, keyed by book id
pub trait ProgressStore: Send + Sync + 'static {
    fn load(&self, book_id: &str) -> impl Future<Output = Result<Option<ProgressSnapshot>>> + Send;

    fn save(&self, snapshot: &ProgressSnapshot) -> impl Future<Output = Result<()>> + Send;

    /// Forget a book; returns whether anything was stored
    fn delete(&self, book_id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Most recently saved books first
    fn recent(&self, limit: usize) -> impl Future<Output = Result<Vec<ProgressSnapshot>>> + Send;
}

/// SQLite-backed store
#[derive(Debug, Clone)]
pub struct SqliteProgressStore {
    db: Database,
}

impl SqliteProgressStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Database::new(path).await?))
    }

    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::new_in_memory().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl ProgressStore for SqliteProgressStore {
    async fn load(&self, book_id: &str) -> Result<Option<ProgressSnapshot>> {
        queries::find_progress(self.db.pool(), book_id)
            .await?
            .map(ProgressRow::into_snapshot)
            .transpose()
    }

    async fn save(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        let row = ProgressRow::from_snapshot(snapshot)?;
        queries::upsert_progress(self.db.pool(), &row).await?;
        debug!(
            book_id = %snapshot.book_id,
            subdivision = snapshot.chapter.subdivision,
            chapter = snapshot.chapter.chapter,
            position = snapshot.position,
            "Saved listening progress"
        );
        Ok(())
    }

    async fn delete(&self, book_id: &str) -> Result<bool> {
        queries::delete_progress(self.db.pool(), book_id).await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ProgressSnapshot>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        queries::list_recent_progress(self.db.pool(), limit)
            .await?
            .into_iter()
            .map(ProgressRow::into_snapshot)
            .collect()
    }
}

/// Store that forgets everything when dropped
#[derive(Debug, Clone, Default)]
pub struct MemoryProgressStore {
    entries: Arc<RwLock<HashMap<String, ProgressSnapshot>>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl ProgressStore for MemoryProgressStore {
    async fn load(&self, book_id: &str) -> Result<Option<ProgressSnapshot>> {
        Ok(self.entries.read().await.get(book_id).cloned())
    }

    async fn save(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(snapshot.book_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, book_id: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(book_id).is_some())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ProgressSnapshot>> {
        let mut all: Vec<ProgressSnapshot> = self.entries.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ChapterAddress;
    use crate::playback::PlaybackMode;
    use chrono::{Duration, Utc};
    use std::collections::BTreeMap;

    fn snapshot(book_id: &str, position: usize, minutes_ago: i64) -> ProgressSnapshot {
        ProgressSnapshot {
            book_id: book_id.to_string(),
            book_title: String::new(),
            chapter: ChapterAddress::new(0, 2),
            position,
            slider_fraction: 0.0,
            mode: PlaybackMode::Sentence,
            languages: None,
            speeds: BTreeMap::new(),
            updated_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    async fn exercise<S: ProgressStore>(store: S) {
        assert!(store.load("b1").await.unwrap().is_none());

        store.save(&snapshot("b1", 4, 10)).await.unwrap();
        store.save(&snapshot("b2", 1, 0)).await.unwrap();
        store.save(&snapshot("b1", 5, 5)).await.unwrap();

        let loaded = store.load("b1").await.unwrap().unwrap();
        assert_eq!(loaded.position, 5);
        assert_eq!(loaded.chapter, ChapterAddress::new(0, 2));

        let recent: Vec<String> = store
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.book_id)
            .collect();
        assert_eq!(recent, vec!["b2", "b1"]);

        assert!(store.delete("b1").await.unwrap());
        assert!(!store.delete("b1").await.unwrap());
        assert!(store.load("b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise(MemoryProgressStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        exercise(SqliteProgressStore::in_memory().await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.db");

        let store = SqliteProgressStore::open(&path).await.unwrap();
        store.save(&snapshot("b1", 7, 0)).await.unwrap();
        drop(store);

        let reopened = SqliteProgressStore::open(&path).await.unwrap();
        assert_eq!(reopened.load("b1").await.unwrap().unwrap().position, 7);
    }
}
