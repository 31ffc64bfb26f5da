//! Session state: the canonical snapshot and the paths that change it.
//!
//! The snapshot is only ever replaced wholesale by a successful read. UI
//! code mutates a working copy optimistically and hands the same mutation
//! to the writer; a committed write triggers a fresh read so the snapshot
//! converges on what the backend holds.

use crate::macros::MacroSubstitutor;
use crate::model::RootData;
use crate::mutation::FeedMutation;
use crate::reader::read_echo_chamber_variables;
use crate::store::{HostEvent, VariableStore};
use crate::writer::{WriteOutcome, update_stat_data};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

pub struct EchoSession {
    store: VariableStore,
    macros: Option<Arc<dyn MacroSubstitutor>>,
    snapshot: watch::Sender<Arc<RootData>>,
}

impl EchoSession {
    pub fn new(store: VariableStore, macros: Option<Arc<dyn MacroSubstitutor>>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(RootData::default()));
        Self {
            store,
            macros,
            snapshot,
        }
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    /// The current canonical model.
    pub fn snapshot(&self) -> Arc<RootData> {
        self.snapshot.borrow().clone()
    }

    /// Receive every snapshot replacement.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RootData>> {
        self.snapshot.subscribe()
    }

    /// A private copy for optimistic edits.
    pub fn working_copy(&self) -> RootData {
        RootData::clone(&self.snapshot())
    }

    /// Re-read the store. When nothing is found the previous snapshot stays.
    pub async fn refresh(&self) -> bool {
        match read_echo_chamber_variables(&self.store, self.macros.as_deref()).await {
            Some(root) => {
                self.snapshot.send_replace(Arc::new(root));
                true
            }
            None => {
                debug!("no echo chamber data found, keeping previous snapshot");
                false
            }
        }
    }

    /// Apply `op` to `working` right away, then persist it and refresh.
    ///
    /// `working` keeps the optimistic change even if the write fails; the
    /// next refresh replaces the snapshot it was copied from either way.
    pub async fn mutate(&self, working: &mut RootData, op: &FeedMutation) -> WriteOutcome {
        if let Err(e) = op.apply(working) {
            warn!("mutation rejected: {}", e);
            return WriteOutcome::Aborted(e);
        }
        update_stat_data(
            &self.store,
            |stat_data| op.apply_to_stat_data(stat_data),
            || async {
                self.refresh().await;
            },
        )
        .await
    }

    /// Resynchronize on every host change event and, when `interval` is
    /// set, on a fixed period. The first interval tick fires immediately.
    pub fn spawn_sync(self: Arc<Self>, interval: Option<Duration>) -> JoinHandle<()> {
        let mut events = self.store.subscribe();
        let mut ticker = interval.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tokio::spawn(async move {
            loop {
                if events.is_none() && ticker.is_none() {
                    debug!("no change events and no sync interval, sync task exiting");
                    return;
                }
                tokio::select! {
                    event = next_event(&mut events) => match event {
                        Ok(event) => {
                            debug!("host event {}, resynchronizing", event);
                            self.refresh().await;
                        }
                        Err(RecvError::Lagged(missed)) => {
                            warn!("missed {} host events, resynchronizing", missed);
                            self.refresh().await;
                        }
                        Err(RecvError::Closed) => {
                            debug!("host event stream closed");
                            events = None;
                        }
                    },
                    () = next_tick(&mut ticker) => {
                        self.refresh().await;
                    }
                }
            }
        })
    }
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<HostEvent>>,
) -> Result<HostEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::NewMessage;
    use crate::store::{MemoryBackend, ScopeRef};
    use serde_json::{Value, json};

    fn feed(likes: u64) -> Value {
        json!({"stat_data": {"echo_chamber": {"echo_chamber_feed": {"posts": [
            {"body": "hi", "stats": {"likes": likes, "is_liked_by_viewer": false}}
        ]}}}})
    }

    fn latest() -> ScopeRef {
        ScopeRef::Message("latest".into())
    }

    fn likes(root: &RootData) -> u64 {
        root.echo_chamber_feed.as_ref().unwrap().posts[0].stats.likes
    }

    fn session_with(backend: Arc<MemoryBackend>) -> EchoSession {
        EchoSession::new(VariableStore::new().with_structured(backend), None)
    }

    #[tokio::test]
    async fn refresh_keeps_previous_snapshot_on_miss() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(latest(), feed(2));
        let session = session_with(backend.clone());
        assert!(session.refresh().await);
        assert_eq!(likes(&session.snapshot()), 2);

        backend.insert(latest(), json!({}));
        assert!(!session.refresh().await);
        assert_eq!(likes(&session.snapshot()), 2);
    }

    #[tokio::test]
    async fn mutate_is_optimistic_then_persisted() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(latest(), feed(0));
        let session = session_with(backend.clone());
        session.refresh().await;

        let mut working = session.working_copy();
        let outcome = session
            .mutate(&mut working, &FeedMutation::ToggleFeedLike { post: 0 })
            .await;

        assert!(outcome.is_committed());
        assert_eq!(likes(&working), 1);
        assert_eq!(likes(&session.snapshot()), 1);
        let stored = backend.document(&latest()).unwrap();
        assert_eq!(
            stored["stat_data"]["echo_chamber"]["echo_chamber_feed"]["posts"][0]["stats"]["likes"],
            1
        );
    }

    #[tokio::test]
    async fn failed_write_leaves_snapshot_alone() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(latest(), feed(0));
        let session = session_with(backend.clone());
        session.refresh().await;
        backend.set_fail_writes(true);

        let mut working = session.working_copy();
        let outcome = session
            .mutate(&mut working, &FeedMutation::ToggleFeedLike { post: 0 })
            .await;

        assert!(!outcome.is_committed());
        assert_eq!(likes(&working), 1);
        assert_eq!(likes(&session.snapshot()), 0);
    }

    #[tokio::test]
    async fn rejected_mutation_touches_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(latest(), feed(0));
        let session = session_with(backend.clone());
        session.refresh().await;

        let mut working = session.working_copy();
        let outcome = session
            .mutate(&mut working, &FeedMutation::ToggleFeedLike { post: 3 })
            .await;

        assert!(matches!(outcome, WriteOutcome::Aborted(_)));
        assert_eq!(working, *session.snapshot());
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn direct_message_reaches_the_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let session = session_with(backend.clone());
        let mut working = session.working_copy();
        let op = FeedMutation::SendDirectMessage {
            message: NewMessage {
                sender: "@me".into(),
                content: "hello".into(),
                timestamp: None,
            },
        };
        assert!(session.mutate(&mut working, &op).await.is_committed());
        let thread = session.snapshot().direct_message_thread.clone().unwrap();
        assert_eq!(thread.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn feed_read_from_bare_stat_data_can_be_mutated() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(
            latest(),
            json!({"stat_data": {"posts": [{"body": "bare", "stats": {"likes": 2}}]}}),
        );
        let session = session_with(backend.clone());
        assert!(session.refresh().await);

        let mut working = session.working_copy();
        let like = FeedMutation::ToggleFeedLike { post: 0 };
        assert!(session.mutate(&mut working, &like).await.is_committed());
        assert_eq!(likes(&session.snapshot()), 3);

        let dm = FeedMutation::SendDirectMessage {
            message: NewMessage {
                sender: "@me".into(),
                content: "hi".into(),
                timestamp: None,
            },
        };
        assert!(session.mutate(&mut working, &dm).await.is_committed());
        let snapshot = session.snapshot();
        assert_eq!(likes(&snapshot), 3);
        assert_eq!(snapshot.direct_message_thread.as_ref().unwrap().messages.len(), 1);
        let stored = backend.document(&latest()).unwrap();
        assert!(stored["stat_data"].get("echo_chamber").is_none());
    }

    #[tokio::test]
    async fn host_events_trigger_resync() {
        let backend = Arc::new(MemoryBackend::new());
        let session = Arc::new(session_with(backend.clone()));
        let mut rx = session.subscribe();
        let task = session.clone().spawn_sync(None);

        backend.insert(latest(), feed(7));
        backend.notify(HostEvent::MessageReceived);

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(likes(&rx.borrow()), 7);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn interval_sync_without_host_events() {
        let backend = Arc::new(MemoryBackend::new());
        let session = Arc::new(EchoSession::new(
            VariableStore::new().with_generic(backend.clone()),
            None,
        ));
        let mut rx = session.subscribe();
        backend.insert(ScopeRef::Global, json!({"echo_chamber_feed": {"posts": [{"body": "tick"}]}}));
        let task = session.clone().spawn_sync(Some(Duration::from_secs(30)));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().echo_chamber_feed.as_ref().unwrap().posts[0].body, "tick");

        backend.insert(ScopeRef::Global, json!({"echo_chamber_feed": {"posts": [{"body": "tock"}]}}));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().echo_chamber_feed.as_ref().unwrap().posts[0].body, "tock");
        task.abort();
    }

    #[tokio::test]
    async fn sync_task_exits_with_nothing_to_wait_for() {
        let session = Arc::new(EchoSession::new(VariableStore::new(), None));
        session.spawn_sync(None).await.unwrap();
    }
}
