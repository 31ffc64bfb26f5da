//! Debounced, single-flight cache writes.
//!
//! Each conversation key owns a slot holding at most one pending message
//! list. Scheduling replaces the pending list and pushes the deadline out by
//! the debounce window; one worker task per key sleeps until the deadline
//! stops moving, then commits. Commits for a key are serialized behind a
//! per-key gate that remembers the last committed sequence number, so an
//! older list can never overwrite a newer one, whichever path wrote it.

use super::{CacheResult, ConversationCache, NpcChatRecord};
use crate::model::DmMessage;
use log::{debug, error};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};

struct Pending {
    seq: u64,
    messages: Vec<DmMessage>,
}

struct Slot {
    pending: Option<Pending>,
    next_seq: u64,
    deadline: Instant,
    worker_running: bool,
    /// Sequence number of the last committed list.
    gate: Arc<tokio::sync::Mutex<u64>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            pending: None,
            next_seq: 0,
            deadline: Instant::now(),
            worker_running: false,
            gate: Arc::new(tokio::sync::Mutex::new(0)),
        }
    }

    fn claim_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Nothing pending, no worker, and no commit holding the gate.
    fn is_idle(&self) -> bool {
        self.pending.is_none() && !self.worker_running && Arc::strong_count(&self.gate) == 1
    }
}

struct Inner {
    cache: ConversationCache,
    debounce: Duration,
    slots: Mutex<HashMap<String, Slot>>,
    commits: AtomicUsize,
}

impl Inner {
    /// Run `f` against the slot for `key`, creating it on first use.
    /// Returns None only if the slot map is poisoned.
    fn with_slot<T>(&self, key: &str, f: impl FnOnce(&mut Slot) -> T) -> Option<T> {
        let mut slots = self.slots.lock().ok()?;
        Some(f(slots.entry(key.to_string()).or_insert_with(Slot::new)))
    }

    /// Run `f` against the slot for `key` only if it exists.
    fn with_existing_slot<T>(&self, key: &str, f: impl FnOnce(&mut Slot) -> T) -> Option<T> {
        let mut slots = self.slots.lock().ok()?;
        slots.get_mut(key).map(f)
    }

    /// Forget the slot for `key` once it is idle. Only safe with the gate
    /// unheld: a dropped slot restarts its sequence numbers.
    fn prune(&self, key: &str) {
        if let Ok(mut slots) = self.slots.lock()
            && slots.get(key).is_some_and(Slot::is_idle)
        {
            slots.remove(key);
        }
    }

    async fn commit(
        &self,
        key: &str,
        gate: &tokio::sync::Mutex<u64>,
        pending: Pending,
    ) -> CacheResult<Option<NpcChatRecord>> {
        let mut last = gate.lock().await;
        if pending.seq <= *last {
            debug!("dropping superseded write #{} for '{}'", pending.seq, key);
            return Ok(None);
        }
        let record = self.cache.write(key, &pending.messages).await?;
        *last = pending.seq;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(Some(record))
    }
}

async fn run_worker(inner: Arc<Inner>, key: String) {
    loop {
        let Some(deadline) = inner.with_slot(&key, |slot| slot.deadline) else {
            return;
        };
        sleep_until(deadline).await;

        let due = inner.with_slot(&key, |slot| {
            if Instant::now() < slot.deadline {
                return None;
            }
            slot.worker_running = false;
            Some((slot.pending.take(), slot.gate.clone()))
        });
        match due {
            None => return,
            Some(None) => continue,
            Some(Some((pending, gate))) => {
                if let Some(pending) = pending
                    && let Err(e) = inner.commit(&key, &gate, pending).await
                {
                    error!("cached conversation '{}' not saved: {}", key, e);
                }
                drop(gate);
                inner.prune(&key);
                return;
            }
        }
    }
}

/// Per-key debounced writer in front of a [`ConversationCache`].
#[derive(Clone)]
pub struct WriteQueue {
    inner: Arc<Inner>,
}

impl WriteQueue {
    pub fn new(cache: ConversationCache, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                debounce,
                slots: Mutex::new(HashMap::new()),
                commits: AtomicUsize::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &ConversationCache {
        &self.inner.cache
    }

    /// Replace the pending list for `key` and restart its debounce window.
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, key: &str, messages: Vec<DmMessage>) {
        let key = key.trim().to_string();
        let debounce = self.inner.debounce;
        let spawn = self.inner.with_slot(&key, |slot| {
            let seq = slot.claim_seq();
            slot.pending = Some(Pending { seq, messages });
            slot.deadline = Instant::now() + debounce;
            !std::mem::replace(&mut slot.worker_running, true)
        });
        if spawn == Some(true) {
            tokio::spawn(run_worker(self.inner.clone(), key));
        }
    }

    /// Drop the pending write for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &str) -> bool {
        let key = key.trim();
        let cancelled = self
            .inner
            .with_existing_slot(key, |slot| slot.pending.take().is_some())
            .unwrap_or(false);
        self.inner.prune(key);
        cancelled
    }

    pub fn has_pending(&self, key: &str) -> bool {
        self.inner
            .with_existing_slot(key.trim(), |slot| slot.pending.is_some())
            .unwrap_or(false)
    }

    /// Commit the pending write for `key` now. Returns whether anything was written.
    pub async fn flush(&self, key: &str) -> CacheResult<bool> {
        let key = key.trim();
        let Some((Some(pending), gate)) = self
            .inner
            .with_existing_slot(key, |slot| (slot.pending.take(), slot.gate.clone()))
        else {
            return Ok(false);
        };
        let committed = self.inner.commit(key, &gate, pending).await;
        drop(gate);
        self.inner.prune(key);
        Ok(committed?.is_some())
    }

    /// Write `messages` immediately, superseding any pending write for `key`.
    pub async fn write_now(
        &self,
        key: &str,
        messages: Vec<DmMessage>,
    ) -> CacheResult<Option<NpcChatRecord>> {
        let key = key.trim();
        let Some((seq, gate)) = self.inner.with_slot(key, |slot| {
            slot.pending = None;
            (slot.claim_seq(), slot.gate.clone())
        }) else {
            return Ok(None);
        };
        let committed = self.inner.commit(key, &gate, Pending { seq, messages }).await;
        drop(gate);
        self.inner.prune(key);
        committed
    }

    /// Delete the cached record for `key`.
    ///
    /// Pending writes are dropped, and the delete waits for any commit
    /// already in flight, so no older list can land after it.
    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        let key = key.trim();
        let Some((seq, gate)) = self.inner.with_slot(key, |slot| {
            slot.pending = None;
            (slot.claim_seq(), slot.gate.clone())
        }) else {
            return self.inner.cache.delete(key).await;
        };
        let deleted = {
            let mut last = gate.lock().await;
            let deleted = self.inner.cache.delete(key).await;
            if deleted.is_ok() {
                *last = seq;
            }
            deleted
        };
        drop(gate);
        self.inner.prune(key);
        deleted
    }

    /// Number of writes committed through this queue.
    pub fn commit_count(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.inner.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }
}
