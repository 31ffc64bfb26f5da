//! The open direct-message conversation.
//!
//! [`ConversationView`] holds the message list of one conversation partner
//! and keeps the cache in step with it through a [`WriteQueue`]. Cache
//! failures are logged and leave the in-memory list authoritative.

use crate::cache::{
    CacheResult, ChatExport, ConversationCache, ImportReport, WriteQueue, parse_import,
};
use crate::model::DmMessage;
use log::{debug, warn};

/// Pick the more complete of the cached and backend lists: the longer one,
/// or the cached list on a tie.
pub fn reconcile_messages(cached: Vec<DmMessage>, backend: &[DmMessage]) -> Vec<DmMessage> {
    if backend.len() > cached.len() {
        backend.to_vec()
    } else {
        cached
    }
}

pub struct ConversationView {
    queue: WriteQueue,
    active: Option<String>,
    messages: Vec<DmMessage>,
}

impl ConversationView {
    pub fn new(queue: WriteQueue) -> Self {
        Self {
            queue,
            active: None,
            messages: Vec::new(),
        }
    }

    pub fn cache(&self) -> &ConversationCache {
        self.queue.cache()
    }

    pub fn active_key(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn messages(&self) -> &[DmMessage] {
        &self.messages
    }

    /// Open the conversation for `key`, reconciling the cached record with
    /// the thread the variable backend currently holds.
    ///
    /// A pending write for the previously open conversation is committed
    /// first, so it lands under its own key.
    pub async fn open(&mut self, key: &str, backend_thread: &[DmMessage]) -> &[DmMessage] {
        self.flush().await;
        let key = key.trim().to_string();

        let cached = match self.queue.cache().read(&key).await {
            Ok(record) => record.map(|r| r.messages).unwrap_or_default(),
            Err(e) => {
                warn!("cache read for '{}' failed, using backend thread: {}", key, e);
                Vec::new()
            }
        };
        debug!(
            "opening '{}': {} cached, {} from backend",
            key,
            cached.len(),
            backend_thread.len()
        );
        self.messages = reconcile_messages(cached, backend_thread);
        self.active = Some(key);
        &self.messages
    }

    /// Replace the message list and schedule a debounced cache write.
    pub fn replace_messages(&mut self, messages: Vec<DmMessage>) {
        self.messages = messages;
        self.schedule();
    }

    pub fn push_message(&mut self, message: DmMessage) {
        self.messages.push(message);
        self.schedule();
    }

    fn schedule(&self) {
        match &self.active {
            Some(key) => self.queue.schedule(key, self.messages.clone()),
            None => debug!("no open conversation, message list not cached"),
        }
    }

    /// Commit any pending write for the open conversation now.
    pub async fn flush(&self) -> bool {
        let Some(key) = &self.active else {
            return false;
        };
        match self.queue.flush(key).await {
            Ok(written) => written,
            Err(e) => {
                warn!("cache write for '{}' failed: {}", key, e);
                false
            }
        }
    }

    /// Commit pending edits and forget the open conversation.
    pub async fn close(&mut self) {
        self.flush().await;
        self.active = None;
        self.messages.clear();
    }

    /// Remove a cached conversation. Missing records are a no-op. Deleting
    /// the open conversation also clears its message list.
    pub async fn delete(&mut self, key: &str) -> bool {
        let key = key.trim();
        if self.active.as_deref() == Some(key) {
            self.messages.clear();
        }
        match self.queue.delete(key).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!("cache delete for '{}' failed: {}", key, e);
                false
            }
        }
    }

    /// Import an export file or a bare record list. A record for the open
    /// conversation replaces its message list immediately.
    pub async fn import(&mut self, text: &str) -> ImportReport {
        let batch = parse_import(text);
        let mut report = ImportReport {
            imported: Vec::new(),
            discarded: batch.discarded,
        };
        for record in batch.records {
            let adopt = self.active.as_deref() == Some(record.key.as_str());
            let messages = adopt.then(|| record.messages.clone());
            match self.queue.write_now(&record.key, record.messages).await {
                Ok(_) => {
                    if let Some(messages) = messages {
                        debug!("adopting imported record for open conversation '{}'", record.key);
                        self.messages = messages;
                    }
                    report.imported.push(record.key);
                }
                Err(e) => {
                    warn!("import of '{}' failed: {}", record.key, e);
                    report.discarded += 1;
                }
            }
        }
        report
    }

    /// Snapshot every cached conversation, including unsaved edits to the
    /// open one.
    pub async fn export(&self) -> CacheResult<ChatExport> {
        self.flush().await;
        Ok(ChatExport::new(self.queue.cache().list().await?))
    }
}

impl Drop for ConversationView {
    fn drop(&mut self) {
        if let Some(key) = &self.active
            && self.queue.cancel(key)
        {
            debug!("discarded unsaved edits for '{}'", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn msgs(sender: &str, n: usize) -> Vec<DmMessage> {
        (0..n).map(|i| DmMessage::new(sender, format!("m{}", i))).collect()
    }

    fn view() -> (ConversationView, TempDir) {
        let dir = TempDir::new().unwrap();
        let cache = ConversationCache::open(&dir.path().join("chats.db")).unwrap();
        let queue = WriteQueue::new(cache, Duration::from_millis(20));
        (ConversationView::new(queue), dir)
    }

    #[test]
    fn reconcile_adopts_the_longer_list() {
        for (m, n) in [(0, 0), (0, 3), (2, 1), (4, 4), (1, 5)] {
            let merged = reconcile_messages(msgs("cache", m), &msgs("backend", n));
            assert_eq!(merged.len(), m.max(n));
        }
    }

    #[test]
    fn reconcile_tie_keeps_cache() {
        let merged = reconcile_messages(msgs("cache", 2), &msgs("backend", 2));
        assert_eq!(merged, msgs("cache", 2));
    }

    #[tokio::test]
    async fn open_prefers_cache_when_it_is_longer() {
        let (mut view, _dir) = view();
        view.queue.cache().write("@a", &msgs("cache", 3)).await.unwrap();
        let opened = view.open("@a", &msgs("backend", 1)).await.to_vec();
        assert_eq!(opened, msgs("cache", 3));
        assert_eq!(view.active_key(), Some("@a"));

        let reopened = view.open("@a", &msgs("backend", 5)).await.to_vec();
        assert_eq!(reopened, msgs("backend", 5));
    }

    #[tokio::test]
    async fn switching_conversations_saves_previous_edits() {
        let (mut view, _dir) = view();
        view.open("@a", &[]).await;
        view.push_message(DmMessage::new("@me", "hello a"));
        view.open("@b", &[]).await;
        assert!(view.messages().is_empty());

        let saved = view.queue.cache().read("@a").await.unwrap().unwrap();
        assert_eq!(saved.messages, vec![DmMessage::new("@me", "hello a")]);
        assert!(view.queue.cache().read("@b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn edits_without_open_conversation_are_not_cached() {
        let (mut view, _dir) = view();
        view.push_message(DmMessage::new("@me", "lost"));
        assert!(!view.flush().await);
        assert_eq!(view.queue.commit_count(), 0);
    }

    #[tokio::test]
    async fn deleting_missing_conversation_is_a_no_op() {
        let (mut view, _dir) = view();
        assert!(!view.delete("@a").await);
    }

    #[tokio::test]
    async fn delete_open_conversation_cancels_pending_and_clears() {
        let (mut view, _dir) = view();
        view.open("@a", &[]).await;
        view.replace_messages(msgs("@a", 2));
        assert!(!view.delete("@a").await);
        assert!(view.messages().is_empty());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(view.queue.cache().read("@a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn import_adopts_record_for_open_conversation() {
        let (mut view, _dir) = view();
        view.open("@a", &msgs("backend", 1)).await;
        let file = serde_json::json!({
            "version": 1,
            "chats": [
                {"key": "@a", "messages": [{"sender": "@a", "content": "imported"}]},
                {"key": "@b", "messages": [{"sender": "@b", "content": "other"}]},
                {"key": "", "messages": []}
            ]
        });
        let report = view.import(&file.to_string()).await;
        assert_eq!(report.imported, vec!["@a".to_string(), "@b".to_string()]);
        assert_eq!(report.discarded, 1);
        assert_eq!(view.messages(), &[DmMessage::new("@a", "imported")]);
    }

    #[tokio::test]
    async fn empty_export_round_trip() {
        let (mut view, _dir) = view();
        let export = view.export().await.unwrap();
        assert_eq!(export.version, 1);
        assert!(export.chats.is_empty());

        let report = view.import(&serde_json::to_string(&export).unwrap()).await;
        assert_eq!(report, ImportReport::default());
    }

    #[tokio::test]
    async fn export_includes_unsaved_edits() {
        let (mut view, _dir) = view();
        view.open("@a", &[]).await;
        view.push_message(DmMessage::new("@me", "draft"));
        let export = view.export().await.unwrap();
        assert_eq!(export.chats.len(), 1);
        assert_eq!(export.chats[0].messages[0].content, "draft");
    }

    #[tokio::test]
    async fn dropping_the_view_discards_pending_edits() {
        let (mut view, _dir) = view();
        let queue = view.queue.clone();
        view.open("@a", &[]).await;
        view.push_message(DmMessage::new("@me", "unsaved"));
        drop(view);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(queue.commit_count(), 0);
        assert!(queue.cache().read("@a").await.unwrap().is_none());
    }
}
