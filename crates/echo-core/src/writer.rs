//! Variable store writer.
//!
//! One read-modify-write cycle against the message-scoped document:
//! wait for the structured backend, read the document, mutate `stat_data`
//! on the owned copy, replace the whole document through the same backend,
//! then refresh. A failed write is logged and reported; it is not retried
//! on the other backend.

use crate::document::parse_document;
use crate::mutation::MutationError;
use crate::store::{BackendKind, VariableStore};
use log::{debug, error, warn};
use serde_json::{Map, Value};
use std::future::Future;

const STAT_DATA_KEY: &str = "stat_data";

/// How a write cycle ended.
#[derive(Debug, PartialEq)]
pub enum WriteOutcome {
    /// The document was replaced and the refresh callback ran.
    Committed(BackendKind),
    /// The backend rejected the read or the replace; nothing was written.
    Failed(BackendKind),
    /// The mutator refused; nothing was written.
    Aborted(MutationError),
    /// No backend is available.
    NoBackend,
}

impl WriteOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, WriteOutcome::Committed(_))
    }
}

/// Take `stat_data` out of a scope document, decoding text and defaulting
/// anything that is not a mapping to `{}`.
fn take_stat_data(document: &mut Map<String, Value>) -> Value {
    match document.remove(STAT_DATA_KEY) {
        Some(Value::Object(map)) => Value::Object(map),
        Some(Value::String(text)) => match parse_document(&text) {
            parsed @ Value::Object(_) => parsed,
            _ => Value::Object(Map::new()),
        },
        _ => Value::Object(Map::new()),
    }
}

/// Mutate `stat_data` in the message-scoped document and persist it.
///
/// `apply` runs on an owned copy of the backend document, so an aborted
/// mutation leaves the backend untouched. `refresh` runs only after the
/// replace call succeeds.
pub async fn update_stat_data<A, R, Fut>(store: &VariableStore, apply: A, refresh: R) -> WriteOutcome
where
    A: FnOnce(&mut Value) -> Result<(), MutationError>,
    R: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    if let Some(structured) = store.structured()
        && let Err(e) = structured.wait_ready().await
    {
        warn!("structured backend not ready, writing anyway: {}", e);
    }

    let Some(backend) = store.preferred() else {
        debug!("no variable backend available, skipping write");
        return WriteOutcome::NoBackend;
    };
    let kind = backend.kind();
    let scope = store.message_scope();

    let document = match backend.read(&scope).await {
        Ok(document) => document,
        Err(e) => {
            error!("{} backend read of {} failed, write dropped: {}", kind, scope, e);
            return WriteOutcome::Failed(kind);
        }
    };
    let mut document = match document {
        Value::Object(map) => map,
        other => {
            debug!("{} document was {}, starting from an empty mapping", scope, other);
            Map::new()
        }
    };

    let mut stat_data = take_stat_data(&mut document);
    if let Err(e) = apply(&mut stat_data) {
        warn!("mutation aborted, {} left unchanged: {}", scope, e);
        return WriteOutcome::Aborted(e);
    }
    document.insert(STAT_DATA_KEY.to_string(), stat_data);

    if let Err(e) = backend.write(Value::Object(document), &scope).await {
        error!("{} backend write of {} failed: {}", kind, scope, e);
        return WriteOutcome::Failed(kind);
    }
    debug!("committed stat_data to {} via {} backend", scope, kind);
    refresh().await;
    WriteOutcome::Committed(kind)
}
