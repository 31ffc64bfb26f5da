//! External, scope-layered variable store.
//!
//! The host keeps one nested document per scope. Two backend APIs may be
//! present:
//!
//! - [`StructuredBackend`]: preferred. Serves the message-scoped document
//!   directly, has an initialization wait, and publishes change events.
//! - [`GenericBackend`]: fallback. Plain per-scope get/replace.
//!
//! [`VariableStore`] bundles whichever backends exist together with the
//! current-message resolver. The reader and writer only see this type, so
//! tests substitute [`MemoryBackend`] for the real host.
//!
//! # Dyn-compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of `impl Future` so that
//! backends can be held as `Arc<dyn ...>` and picked at runtime.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;
use tokio::sync::broadcast;

/// Boxed, Send future returned by every backend method.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resolves the id of the message currently shown by the host, if any.
pub type MessageIdResolver = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Scope identifier used when no message id resolves.
pub const DEFAULT_LATEST_SENTINEL: &str = "latest";

/// Scopes in the order the reader consults them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Message,
    Chat,
    Character,
    Global,
}

/// A concrete scope address. Message scopes carry the message id (or the
/// sentinel) they refer to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScopeRef {
    Message(String),
    Chat,
    Character,
    Global,
}

impl ScopeRef {
    pub fn scope(&self) -> Scope {
        match self {
            ScopeRef::Message(_) => Scope::Message,
            ScopeRef::Chat => Scope::Chat,
            ScopeRef::Character => Scope::Character,
            ScopeRef::Global => Scope::Global,
        }
    }
}

impl fmt::Display for ScopeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeRef::Message(id) => write!(f, "message:{}", id),
            other => write!(f, "{}", other.scope()),
        }
    }
}

/// Host change notifications. Every one of them invalidates the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HostEvent {
    ChatChanged,
    MessageSent,
    MessageReceived,
    MessageUpdated,
    MessageSwiped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Structured,
    Generic,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend not ready: {0}")]
    NotReady(String),
    #[error("backend rejected {scope}: {message}")]
    Rejected { scope: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid scope document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Preferred backend API.
pub trait StructuredBackend: Send + Sync {
    /// Resolve once the backend has finished initializing.
    fn wait_ready(&self) -> BoxFuture<'_, StoreResult<()>>;

    /// Owned copy of a scope document. Unset scopes read as an empty mapping.
    fn get_document<'a>(&'a self, scope: &'a ScopeRef) -> BoxFuture<'a, StoreResult<Value>>;

    /// Replace a scope document wholesale.
    fn replace_document<'a>(
        &'a self,
        document: Value,
        scope: &'a ScopeRef,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Subscribe to host change notifications.
    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;
}

/// Fallback backend API.
pub trait GenericBackend: Send + Sync {
    /// Owned copy of a scope document. Unset scopes read as an empty mapping.
    fn get_variables<'a>(&'a self, scope: &'a ScopeRef) -> BoxFuture<'a, StoreResult<Value>>;

    /// Replace a scope document wholesale.
    fn replace_variables<'a>(
        &'a self,
        document: Value,
        scope: &'a ScopeRef,
    ) -> BoxFuture<'a, StoreResult<()>>;
}

/// One of the available backends, borrowed for a single read or write.
#[derive(Clone, Copy)]
pub enum BackendRef<'a> {
    Structured(&'a dyn StructuredBackend),
    Generic(&'a dyn GenericBackend),
}

impl<'a> BackendRef<'a> {
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendRef::Structured(_) => BackendKind::Structured,
            BackendRef::Generic(_) => BackendKind::Generic,
        }
    }

    pub async fn read(&self, scope: &ScopeRef) -> StoreResult<Value> {
        match self {
            BackendRef::Structured(b) => b.get_document(scope).await,
            BackendRef::Generic(b) => b.get_variables(scope).await,
        }
    }

    pub async fn write(&self, document: Value, scope: &ScopeRef) -> StoreResult<()> {
        match self {
            BackendRef::Structured(b) => b.replace_document(document, scope).await,
            BackendRef::Generic(b) => b.replace_variables(document, scope).await,
        }
    }
}

/// The set of backends available to this process.
#[derive(Clone)]
pub struct VariableStore {
    structured: Option<Arc<dyn StructuredBackend>>,
    generic: Option<Arc<dyn GenericBackend>>,
    message_id: Option<MessageIdResolver>,
    latest_sentinel: String,
}

impl Default for VariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableStore {
    /// A store with no backends; every read misses and every write is skipped.
    pub fn new() -> Self {
        Self {
            structured: None,
            generic: None,
            message_id: None,
            latest_sentinel: DEFAULT_LATEST_SENTINEL.to_string(),
        }
    }

    pub fn with_structured(mut self, backend: Arc<dyn StructuredBackend>) -> Self {
        self.structured = Some(backend);
        self
    }

    pub fn with_generic(mut self, backend: Arc<dyn GenericBackend>) -> Self {
        self.generic = Some(backend);
        self
    }

    pub fn with_message_id(mut self, resolver: MessageIdResolver) -> Self {
        self.message_id = Some(resolver);
        self
    }

    pub fn with_latest_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.latest_sentinel = sentinel.into();
        self
    }

    pub fn structured(&self) -> Option<&dyn StructuredBackend> {
        self.structured.as_deref()
    }

    pub fn generic(&self) -> Option<&dyn GenericBackend> {
        self.generic.as_deref()
    }

    /// The backend a write goes through: structured when present, else generic.
    pub fn preferred(&self) -> Option<BackendRef<'_>> {
        self.structured()
            .map(BackendRef::Structured)
            .or_else(|| self.generic().map(BackendRef::Generic))
    }

    fn current_message_id(&self) -> Option<String> {
        self.message_id
            .as_ref()
            .and_then(|resolve| resolve())
            .filter(|id| !id.trim().is_empty())
    }

    /// Address a scope. The message scope is [`Self::message_scope`], so
    /// reads look where writes land.
    pub fn resolve(&self, scope: Scope) -> ScopeRef {
        match scope {
            Scope::Message => self.message_scope(),
            Scope::Chat => ScopeRef::Chat,
            Scope::Character => ScopeRef::Character,
            Scope::Global => ScopeRef::Global,
        }
    }

    /// The message scope, falling back to the "latest" sentinel.
    pub fn message_scope(&self) -> ScopeRef {
        ScopeRef::Message(
            self.current_message_id()
                .unwrap_or_else(|| self.latest_sentinel.clone()),
        )
    }

    /// Host change notifications, when the structured backend is present.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<HostEvent>> {
        self.structured.as_ref().map(|b| b.subscribe())
    }
}
