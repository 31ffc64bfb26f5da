//! High-level facade for embedding the engine.
//!
//! `EchoEngine` wires configuration, the file-backed variable store, the
//! session and the conversation cache together.
//!
//! # Example
//!
//! ```no_run
//! use echo_core::{EchoEngine, FeedMutation, LoadOptions};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let engine = EchoEngine::load_with_options(LoadOptions {
//!         home: Some("/tmp/echo".into()),
//!         ..Default::default()
//!     })?;
//!     engine.session().refresh().await;
//!
//!     let mut working = engine.session().working_copy();
//!     let op = FeedMutation::ToggleFeedLike { post: 0 };
//!     let outcome = engine.session().mutate(&mut working, &op).await;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

use crate::cache::{ConversationCache, WriteQueue, conversation_key};
use crate::config::{EchoConfig, resolve_home};
use crate::conversation::ConversationView;
use crate::macros::MacroSubstitutor;
use crate::model::{DmMessage, FeedPostUser};
use crate::session::EchoSession;
use crate::store::{FileBackend, VariableStore};
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Options for loading an engine. `Default::default()` uses `ECHO_HOME` or
/// `~/.echo-chamber` and no current message.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Override the home directory.
    pub home: Option<PathBuf>,
    /// Id of the message the host is showing; selects the message scope.
    pub message_id: Option<String>,
}

pub struct EchoEngine {
    home: PathBuf,
    config: EchoConfig,
    session: Arc<EchoSession>,
    conversation: ConversationView,
}

impl EchoEngine {
    pub fn load() -> io::Result<Self> {
        Self::load_with_options(LoadOptions::default())
    }

    pub fn load_with_options(options: LoadOptions) -> io::Result<Self> {
        let home = resolve_home(options.home)?;
        fs::create_dir_all(&home)?;

        let mut config = EchoConfig::load(&home);
        config.apply_env_overrides();

        let mut store = VariableStore::new()
            .with_generic(Arc::new(FileBackend::new(config.store_dir(&home))))
            .with_latest_sentinel(config.latest_message_sentinel.clone());
        if let Some(id) = options.message_id {
            store = store.with_message_id(Arc::new(move || Some(id.clone())));
        }
        let macros = config
            .macros()
            .map(|m| Arc::new(m) as Arc<dyn MacroSubstitutor>);
        let session = Arc::new(EchoSession::new(store, macros));

        let cache = ConversationCache::open(&config.cache_path(&home)).map_err(io::Error::other)?;
        let conversation = ConversationView::new(WriteQueue::new(cache, config.cache_debounce()));
        debug!("engine loaded from {}", home.display());

        Ok(Self {
            home,
            config,
            session,
            conversation,
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config(&self) -> &EchoConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<EchoSession> {
        &self.session
    }

    pub fn conversation(&mut self) -> &mut ConversationView {
        &mut self.conversation
    }

    /// Open the conversation with `partner`, reconciling the cache against
    /// the DM thread in the current snapshot when that thread is with the
    /// same partner. None when the partner has neither handle nor name.
    pub async fn open_conversation(&mut self, partner: &FeedPostUser) -> Option<&[DmMessage]> {
        let key = conversation_key(partner)?;
        let snapshot = self.session.snapshot();
        let backend_thread = snapshot
            .direct_message_thread
            .as_ref()
            .filter(|thread| {
                conversation_key(&thread.participants.chat_partner).as_deref() == Some(key.as_str())
            })
            .map(|thread| thread.messages.as_slice())
            .unwrap_or_default();
        Some(self.conversation.open(&key, backend_thread).await)
    }

    /// Start the background resync task with the configured interval.
    pub fn spawn_sync(&self) -> JoinHandle<()> {
        self.session.clone().spawn_sync(self.config.sync_interval())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GenericBackend, ScopeRef};
    use serde_json::json;
    use tempfile::TempDir;

    fn load(dir: &TempDir, message_id: Option<&str>) -> EchoEngine {
        EchoEngine::load_with_options(LoadOptions {
            home: Some(dir.path().to_path_buf()),
            message_id: message_id.map(str::to_string),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn loads_with_defaults_into_home() {
        let dir = TempDir::new().unwrap();
        let engine = load(&dir, None);
        assert_eq!(engine.home(), dir.path());
        assert_eq!(engine.config().cache_debounce_ms, 200);
        assert!(dir.path().join("chats.db").exists());
    }

    #[tokio::test]
    async fn reads_file_store_with_configured_macros() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "[macros]\nuser = \"Ann\"\n").unwrap();
        let backend = FileBackend::new(dir.path().join("variables"));
        backend
            .replace_variables(
                json!({"stat_data": {"echo_chamber": {"posts": [{"body": "hi {{user}}"}]}}}),
                &ScopeRef::Message("12".into()),
            )
            .await
            .unwrap();

        let engine = load(&dir, Some("12"));
        assert!(engine.session().refresh().await);
        let snapshot = engine.session().snapshot();
        assert_eq!(snapshot.echo_chamber_feed.as_ref().unwrap().posts[0].body, "hi Ann");
    }

    #[tokio::test]
    async fn open_conversation_uses_matching_thread() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("variables"));
        backend
            .replace_variables(
                json!({"stat_data": {"echo_chamber": {"direct_message_thread": {
                    "participants": {"viewer": {"handle": "@me"}, "chat_partner": {"name": "Bo", "handle": "@bo"}},
                    "messages": [{"sender": "@bo", "content": "hey"}]
                }}}}),
                &ScopeRef::Chat,
            )
            .await
            .unwrap();
        let mut engine = load(&dir, None);
        engine.session().refresh().await;

        let bo = FeedPostUser {
            name: "Bo".into(),
            handle: "@bo".into(),
            ..FeedPostUser::default()
        };
        assert_eq!(engine.open_conversation(&bo).await.unwrap().len(), 1);

        let cy = FeedPostUser {
            name: "Cy".into(),
            ..FeedPostUser::default()
        };
        assert!(engine.open_conversation(&cy).await.unwrap().is_empty());
        assert_eq!(engine.conversation().active_key(), Some("Cy"));

        assert!(engine.open_conversation(&FeedPostUser::default()).await.is_none());
    }
}
