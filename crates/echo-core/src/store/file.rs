//! File-backed generic backend.
//!
//! Each scope document lives in its own JSON file under a root directory:
//!
//! ```text
//! variables/
//! ├── .write.lock
//! ├── global.json
//! ├── character.json
//! ├── chat.json
//! └── message-<id>.json
//! ```
//!
//! Message ids are reduced to `[A-Za-z0-9_-]` before they become file names.

use super::{BoxFuture, GenericBackend, ScopeRef, StoreError, StoreResult};
use crate::safe_io::{ScopeLock, write_json_atomic};
use serde_json::{Map, Value};
use std::io;
use std::path::PathBuf;
use tokio::fs;

pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn scope_path(&self, scope: &ScopeRef) -> PathBuf {
        let name = match scope {
            // percent-encoded: no separators, and distinct ids stay distinct
            ScopeRef::Message(id) => format!("message-{}", urlencoding::encode(id)),
            other => other.scope().to_string(),
        };
        self.root.join(format!("{}.json", name))
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".write.lock")
    }
}

impl GenericBackend for FileBackend {
    fn get_variables<'a>(&'a self, scope: &'a ScopeRef) -> BoxFuture<'a, StoreResult<Value>> {
        Box::pin(async move {
            let path = self.scope_path(scope);
            match fs::read_to_string(&path).await {
                Ok(text) if text.trim().is_empty() => Ok(Value::Object(Map::new())),
                Ok(text) => Ok(serde_json::from_str(&text)?),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Value::Object(Map::new())),
                Err(e) => Err(StoreError::Io(e)),
            }
        })
    }

    fn replace_variables<'a>(
        &'a self,
        document: Value,
        scope: &'a ScopeRef,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let path = self.scope_path(scope);
            let lock_path = self.lock_path();
            tokio::task::spawn_blocking(move || -> io::Result<()> {
                let _lock = ScopeLock::acquire(&lock_path)?;
                write_json_atomic(&path, &document)
            })
            .await
            .map_err(|e| io::Error::other(format!("join error: {}", e)))??;
            Ok(())
        })
    }
}
