//! In-memory backend implementing both backend APIs.
//!
//! Used by tests and embedders without a host. Failures can be switched on
//! per operation to exercise the recovery paths.

use super::{
    BoxFuture, GenericBackend, HostEvent, ScopeRef, StoreError, StoreResult, StructuredBackend,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

pub struct MemoryBackend {
    documents: RwLock<HashMap<ScopeRef, Value>>,
    events: broadcast::Sender<HostEvent>,
    fail_ready: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            documents: RwLock::new(HashMap::new()),
            events,
            fail_ready: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }

    /// Seed a scope document directly, bypassing the write counter.
    pub fn insert(&self, scope: ScopeRef, document: Value) {
        if let Ok(mut docs) = self.documents.write() {
            docs.insert(scope, document);
        }
    }

    /// Current document for a scope, if one was ever set.
    pub fn document(&self, scope: &ScopeRef) -> Option<Value> {
        self.documents.read().ok()?.get(scope).cloned()
    }

    pub fn set_fail_ready(&self, fail: bool) {
        self.fail_ready.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of committed replace calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Publish a host change notification to subscribers.
    pub fn notify(&self, event: HostEvent) {
        // No subscribers is not an error for a fire-and-forget notification.
        let _ = self.events.send(event);
    }

    fn read_scope(&self, scope: &ScopeRef) -> StoreResult<Value> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                scope: scope.to_string(),
                message: "read failure injected".to_string(),
            });
        }
        let docs = self
            .documents
            .read()
            .map_err(|_| StoreError::NotReady("document map poisoned".to_string()))?;
        Ok(docs
            .get(scope)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    fn write_scope(&self, document: Value, scope: &ScopeRef) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                scope: scope.to_string(),
                message: "write failure injected".to_string(),
            });
        }
        let mut docs = self
            .documents
            .write()
            .map_err(|_| StoreError::NotReady("document map poisoned".to_string()))?;
        docs.insert(scope.clone(), document);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl StructuredBackend for MemoryBackend {
    fn wait_ready(&self) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            if self.fail_ready.load(Ordering::SeqCst) {
                Err(StoreError::NotReady("initialization failure injected".to_string()))
            } else {
                Ok(())
            }
        })
    }

    fn get_document<'a>(&'a self, scope: &'a ScopeRef) -> BoxFuture<'a, StoreResult<Value>> {
        Box::pin(async move { self.read_scope(scope) })
    }

    fn replace_document<'a>(
        &'a self,
        document: Value,
        scope: &'a ScopeRef,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.write_scope(document, scope) })
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}

impl GenericBackend for MemoryBackend {
    fn get_variables<'a>(&'a self, scope: &'a ScopeRef) -> BoxFuture<'a, StoreResult<Value>> {
        Box::pin(async move { self.read_scope(scope) })
    }

    fn replace_variables<'a>(
        &'a self,
        document: Value,
        scope: &'a ScopeRef,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.write_scope(document, scope) })
    }
}
