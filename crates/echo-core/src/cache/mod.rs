//! Durable conversation cache.
//!
//! One SQLite row per conversation partner, independent of the variable
//! backends:
//!
//! ```text
//! npc_chats(key TEXT PRIMARY KEY, updated_at INTEGER, messages TEXT)
//! ```
//!
//! `messages` holds the JSON array of [`DmMessage`]s and `updated_at` the
//! epoch milliseconds of the last write. Every write replaces the whole
//! record. Calls run on the blocking pool so callers never stall the
//! runtime on disk I/O.

mod queue;
mod schema;
mod transfer;

pub use queue::WriteQueue;
pub use transfer::{ChatExport, EXPORT_VERSION, ImportBatch, ImportReport, parse_import};

use crate::model::{DmMessage, FeedPostUser};
use log::warn;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("conversation key is empty")]
    EmptyKey,
    #[error("cache connection poisoned")]
    Poisoned,
    #[error("cache task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// A cached conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcChatRecord {
    pub key: String,
    /// Epoch milliseconds of the last write.
    pub updated_at: i64,
    pub messages: Vec<DmMessage>,
}

/// Cache key for a conversation partner: the trimmed handle, else the
/// trimmed name. `None` when both are blank.
pub fn conversation_key(partner: &FeedPostUser) -> Option<String> {
    [partner.handle.trim(), partner.name.trim()]
        .into_iter()
        .find(|candidate| !candidate.is_empty())
        .map(str::to_string)
}

fn checked_key(key: &str) -> CacheResult<String> {
    let key = key.trim();
    if key.is_empty() {
        Err(CacheError::EmptyKey)
    } else {
        Ok(key.to_string())
    }
}

/// Handle to the cache database. Cheap to clone.
#[derive(Clone)]
pub struct ConversationCache {
    conn: Arc<Mutex<Connection>>,
}

impl ConversationCache {
    /// Open (or create) the cache at `path`, creating parent directories.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = schema::open_db(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CacheResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| CacheError::Poisoned)?;
            f(&guard)
        })
        .await?
    }

    pub async fn read(&self, key: &str) -> CacheResult<Option<NpcChatRecord>> {
        let key = checked_key(key)?;
        self.with_conn(move |conn| {
            let row: Option<(String, i64, String)> = conn
                .query_row(
                    "SELECT key, updated_at, messages FROM npc_chats WHERE key = ?1",
                    [&key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            row.map(|(key, updated_at, messages)| -> CacheResult<NpcChatRecord> {
                Ok(NpcChatRecord {
                    key,
                    updated_at,
                    messages: serde_json::from_str(&messages)?,
                })
            })
            .transpose()
        })
        .await
    }

    /// Every record, most recently updated first. Rows whose messages no
    /// longer decode are skipped.
    pub async fn list(&self) -> CacheResult<Vec<NpcChatRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, updated_at, messages FROM npc_chats ORDER BY updated_at DESC, key",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (key, updated_at, messages) = row?;
                match serde_json::from_str(&messages) {
                    Ok(messages) => records.push(NpcChatRecord {
                        key,
                        updated_at,
                        messages,
                    }),
                    Err(e) => warn!("skipping cached chat '{}': {}", key, e),
                }
            }
            Ok(records)
        })
        .await
    }

    /// Upsert a conversation, stamping the current time.
    pub async fn write(&self, key: &str, messages: &[DmMessage]) -> CacheResult<NpcChatRecord> {
        let record = NpcChatRecord {
            key: checked_key(key)?,
            updated_at: chrono::Utc::now().timestamp_millis(),
            messages: messages.to_vec(),
        };
        let encoded = serde_json::to_string(&record.messages)?;
        let row = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO npc_chats (key, updated_at, messages) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     updated_at = excluded.updated_at,
                     messages = excluded.messages",
                params![row.key, row.updated_at, encoded],
            )?;
            Ok(())
        })
        .await?;
        Ok(record)
    }

    /// Remove a conversation. Returns whether a record existed.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let key = checked_key(key)?;
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM npc_chats WHERE key = ?1", [&key])?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (ConversationCache, TempDir) {
        let dir = TempDir::new().unwrap();
        let cache = ConversationCache::open(&dir.path().join("nested").join("chats.db")).unwrap();
        (cache, dir)
    }

    fn msgs(n: usize) -> Vec<DmMessage> {
        (0..n)
            .map(|i| DmMessage::new("@a", format!("message {}", i)))
            .collect()
    }

    #[test]
    fn key_prefers_handle_then_name() {
        let user = |name: &str, handle: &str| FeedPostUser {
            name: name.into(),
            handle: handle.into(),
            ..FeedPostUser::default()
        };
        assert_eq!(conversation_key(&user("Ann", " @ann ")), Some("@ann".into()));
        assert_eq!(conversation_key(&user(" Ann ", "  ")), Some("Ann".into()));
        assert_eq!(conversation_key(&user("", "")), None);
    }

    #[tokio::test]
    async fn write_read_round_trip() {
        let (cache, _dir) = open_temp();
        let before = chrono::Utc::now().timestamp_millis();
        let written = cache.write("@a", &msgs(2)).await.unwrap();
        assert!(written.updated_at >= before);

        let read = cache.read("@a").await.unwrap().unwrap();
        assert_eq!(read, written);
        assert!(cache.read("@b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_replaces_whole_record() {
        let (cache, _dir) = open_temp();
        cache.write("@a", &msgs(3)).await.unwrap();
        cache.write("@a", &msgs(1)).await.unwrap();
        assert_eq!(cache.read("@a").await.unwrap().unwrap().messages.len(), 1);
        assert_eq!(cache.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_orders_newest_first() {
        let (cache, _dir) = open_temp();
        cache.write("@old", &msgs(1)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.write("@new", &msgs(1)).await.unwrap();
        let keys: Vec<String> = cache.list().await.unwrap().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["@new".to_string(), "@old".to_string()]);
    }

    #[tokio::test]
    async fn deleting_a_missing_key_is_a_no_op() {
        let (cache, _dir) = open_temp();
        assert!(!cache.delete("@a").await.unwrap());
        cache.write("@a", &msgs(1)).await.unwrap();
        assert!(cache.delete("@a").await.unwrap());
        assert!(cache.read("@a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_keys_are_refused() {
        let (cache, _dir) = open_temp();
        assert!(matches!(cache.write("  ", &msgs(1)).await, Err(CacheError::EmptyKey)));
        assert!(matches!(cache.read("").await, Err(CacheError::EmptyKey)));
    }
}
