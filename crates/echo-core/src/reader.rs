//! Variable store reader.
//!
//! Pulls the canonical model out of whichever backend answers first:
//!
//! 1. structured backend, message scope: `stat_data.echo_chamber`, then
//!    `stat_data` itself
//! 2. generic backend, each scope in [`Scope`] order, trying the five
//!    [`Probe`]s in order; the first scope with a hit wins. Without a
//!    current message id the message scope is the "latest" sentinel, the
//!    same scope the writer targets
//!
//! Backend errors are logged and count as misses. `None` means nothing
//! matched anywhere; the caller keeps whatever state it already had.

use crate::json_ext::JsonExt;
use crate::macros::{MacroSubstitutor, resolve_macros_deep};
use crate::model::RootData;
use crate::normalize::{FEED_KEY, WRAPPER_KEY, coerce_feed_value, coerce_root_value, root_from_value};
use crate::store::{BackendKind, BackendRef, Scope, ScopeRef, VariableStore};
use log::{debug, warn};
use serde_json::{Map, Value};
use strum::{Display, IntoEnumIterator};

/// Where in a scope document a match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Probe {
    StatDataEchoChamber,
    StatData,
    StatDataFeed,
    WholeDocument,
    DocumentEchoChamber,
    DocumentFeed,
}

impl Probe {
    fn path(self) -> &'static [&'static str] {
        match self {
            Probe::StatDataEchoChamber => &["stat_data", WRAPPER_KEY],
            Probe::StatData => &["stat_data"],
            Probe::StatDataFeed => &["stat_data", FEED_KEY],
            Probe::WholeDocument => &[],
            Probe::DocumentEchoChamber => &[WRAPPER_KEY],
            Probe::DocumentFeed => &[FEED_KEY],
        }
    }

    fn targets_feed(self) -> bool {
        matches!(self, Probe::StatDataFeed | Probe::DocumentFeed)
    }

    /// Coerce the probed sub-document into a canonical root document.
    fn apply(self, document: &Value) -> Option<Value> {
        let target = document.get_path(self.path())?;
        if self.targets_feed() {
            let feed = coerce_feed_value(target)?;
            let mut root = Map::new();
            root.insert(FEED_KEY.to_string(), feed);
            Some(Value::Object(root))
        } else {
            coerce_root_value(target)
        }
    }
}

const STRUCTURED_PROBES: [Probe; 2] = [Probe::StatDataEchoChamber, Probe::StatData];

const GENERIC_PROBES: [Probe; 5] = [
    Probe::StatDataEchoChamber,
    Probe::StatDataFeed,
    Probe::WholeDocument,
    Probe::DocumentEchoChamber,
    Probe::DocumentFeed,
];

/// A successful read and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadHit {
    pub root: RootData,
    pub backend: BackendKind,
    pub scope: ScopeRef,
    pub probe: Probe,
}

fn first_hit(document: &Value, probes: &[Probe]) -> Option<(Value, Probe)> {
    probes
        .iter()
        .find_map(|probe| probe.apply(document).map(|root| (root, *probe)))
}

async fn probe_scope(
    backend: BackendRef<'_>,
    scope: &ScopeRef,
    probes: &[Probe],
) -> Option<(Value, Probe)> {
    match backend.read(scope).await {
        Ok(document) => first_hit(&document, probes),
        Err(e) => {
            warn!("{} backend read of {} failed: {}", backend.kind(), scope, e);
            None
        }
    }
}

/// Read the canonical model, reporting which backend, scope and probe matched.
pub async fn read_with_source(
    store: &VariableStore,
    macros: Option<&dyn MacroSubstitutor>,
) -> Option<ReadHit> {
    let mut found = None;

    if let Some(structured) = store.structured() {
        let scope = store.message_scope();
        let backend = BackendRef::Structured(structured);
        if let Some((root, probe)) = probe_scope(backend, &scope, &STRUCTURED_PROBES).await {
            found = Some((root, BackendKind::Structured, scope, probe));
        }
    }

    if found.is_none()
        && let Some(generic) = store.generic()
    {
        for scope in Scope::iter() {
            let scope_ref = store.resolve(scope);
            let backend = BackendRef::Generic(generic);
            if let Some((root, probe)) = probe_scope(backend, &scope_ref, &GENERIC_PROBES).await {
                found = Some((root, BackendKind::Generic, scope_ref, probe));
                break;
            }
        }
    }

    let (root, backend, scope, probe) = found?;
    debug!("echo chamber data found via {} backend, {} scope, {} probe", backend, scope, probe);
    let root = resolve_macros_deep(&root, macros);
    Some(ReadHit {
        root: root_from_value(root),
        backend,
        scope,
        probe,
    })
}

/// Read the canonical model from the variable store.
pub async fn read_echo_chamber_variables(
    store: &VariableStore,
    macros: Option<&dyn MacroSubstitutor>,
) -> Option<RootData> {
    read_with_source(store, macros).await.map(|hit| hit.root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::TemplateMacros;
    use crate::store::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn feed_doc(body: &str) -> Value {
        json!({"echo_chamber_feed": {"posts": [{"body": body}]}})
    }

    fn first_body(root: &RootData) -> &str {
        &root.echo_chamber_feed.as_ref().unwrap().posts[0].body
    }

    #[tokio::test]
    async fn no_backends_means_no_data() {
        assert!(read_echo_chamber_variables(&VariableStore::new(), None).await.is_none());
    }

    #[tokio::test]
    async fn structured_stat_data_echo_chamber() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(
            ScopeRef::Message("latest".into()),
            json!({"stat_data": {"echo_chamber": feed_doc("structured")}}),
        );
        let store = VariableStore::new().with_structured(backend);
        let hit = read_with_source(&store, None).await.unwrap();
        assert_eq!(first_body(&hit.root), "structured");
        assert_eq!(hit.backend, BackendKind::Structured);
        assert_eq!(hit.probe, Probe::StatDataEchoChamber);
    }

    #[tokio::test]
    async fn structured_falls_back_to_stat_data_itself() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(
            ScopeRef::Message("9".into()),
            json!({"stat_data": {"posts": [{"body": "bare"}]}}),
        );
        let store = VariableStore::new()
            .with_structured(backend)
            .with_message_id(Arc::new(|| Some("9".to_string())));
        let hit = read_with_source(&store, None).await.unwrap();
        assert_eq!(first_body(&hit.root), "bare");
        assert_eq!(hit.probe, Probe::StatData);
    }

    #[tokio::test]
    async fn generic_scopes_are_tried_in_priority_order() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(ScopeRef::Global, feed_doc("global"));
        backend.insert(ScopeRef::Character, json!({"echo_chamber": feed_doc("character")}));
        backend.insert(ScopeRef::Chat, json!({"unrelated": true}));
        let store = VariableStore::new().with_generic(backend);
        let hit = read_with_source(&store, None).await.unwrap();
        assert_eq!(first_body(&hit.root), "character");
        assert_eq!(hit.scope, ScopeRef::Character);
        assert_eq!(hit.probe, Probe::WholeDocument);
    }

    #[tokio::test]
    async fn generic_probe_order_within_a_scope() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(
            ScopeRef::Chat,
            json!({
                "stat_data": {"echo_chamber_feed": {"posts": [{"body": "stat feed"}]}},
                "echo_chamber_feed": {"posts": [{"body": "doc feed"}]}
            }),
        );
        let store = VariableStore::new().with_generic(backend);
        let hit = read_with_source(&store, None).await.unwrap();
        assert_eq!(first_body(&hit.root), "stat feed");
        assert_eq!(hit.probe, Probe::StatDataFeed);
    }

    #[tokio::test]
    async fn generic_message_scope_without_an_id_reads_the_sentinel() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(ScopeRef::Message("latest".into()), feed_doc("message"));
        backend.insert(ScopeRef::Global, feed_doc("global"));
        let store = VariableStore::new().with_generic(backend);
        let hit = read_with_source(&store, None).await.unwrap();
        assert_eq!(hit.scope, ScopeRef::Message("latest".into()));
        assert_eq!(first_body(&hit.root), "message");
    }

    #[tokio::test]
    async fn failing_structured_backend_falls_back_to_generic() {
        let broken = Arc::new(MemoryBackend::new());
        broken.set_fail_reads(true);
        let generic = Arc::new(MemoryBackend::new());
        generic.insert(ScopeRef::Chat, json!({"stat_data": {"echo_chamber": feed_doc("generic")}}));
        let store = VariableStore::new()
            .with_structured(broken)
            .with_generic(generic);
        let hit = read_with_source(&store, None).await.unwrap();
        assert_eq!(hit.backend, BackendKind::Generic);
        assert_eq!(first_body(&hit.root), "generic");
    }

    #[tokio::test]
    async fn erroring_generic_backend_yields_none() {
        let generic = Arc::new(MemoryBackend::new());
        generic.insert(ScopeRef::Chat, feed_doc("unreachable"));
        generic.set_fail_reads(true);
        let store = VariableStore::new().with_generic(generic);
        assert!(read_echo_chamber_variables(&store, None).await.is_none());
    }

    #[tokio::test]
    async fn yaml_text_in_stat_data_is_parsed() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(
            ScopeRef::Chat,
            json!({"stat_data": {"echo_chamber": "echo_chamber_feed:\n  posts:\n    - body: yaml\n"}}),
        );
        let store = VariableStore::new().with_generic(backend);
        let root = read_echo_chamber_variables(&store, None).await.unwrap();
        assert_eq!(first_body(&root), "yaml");
    }

    #[tokio::test]
    async fn macros_are_resolved_after_coercion() {
        let backend = Arc::new(MemoryBackend::new());
        backend.insert(ScopeRef::Global, feed_doc("hi {{user}}"));
        let store = VariableStore::new().with_generic(backend);
        let macros = TemplateMacros::new([("user", "Ann")]);
        let root = read_echo_chamber_variables(&store, Some(&macros)).await.unwrap();
        assert_eq!(first_body(&root), "hi Ann");
    }
}
