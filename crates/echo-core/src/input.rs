use crate::model::FeedPostUser;
use crate::mutation::{FeedMutation, NewMessage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A conversation partner as named by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Partner {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
}

impl From<&Partner> for FeedPostUser {
    fn from(p: &Partner) -> Self {
        FeedPostUser {
            name: p.name.clone().unwrap_or_default(),
            handle: p.handle.clone().unwrap_or_default(),
            ..FeedPostUser::default()
        }
    }
}

/// What operation to perform.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Parse a document with the grammar fallback chain
    Parse { text: String },
    /// Read the canonical model from the variable store
    Read,
    /// Apply an optimistic mutation and persist it to `stat_data`
    Mutate { op: FeedMutation },
    /// List cached conversations, newest first
    ChatList,
    /// Show one cached conversation
    ChatRead { key: String },
    /// Delete a cached conversation (no-op when absent)
    ChatDelete { key: String },
    /// Export every cached conversation, to `path` or stdout
    ChatExport {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Import conversations from `path` or inline `text`
    ChatImport {
        #[serde(default)]
        path: Option<PathBuf>,
        #[serde(default)]
        text: Option<String>,
    },
    /// Open a conversation, reconciling cache and variable store
    OpenConversation { partner: Partner },
    /// Append a message to a conversation and save it
    ChatAppend {
        partner: Partner,
        message: NewMessage,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionFlags {
    /// Debug-level diagnostics on stderr
    #[serde(default)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_and_struct_commands_deserialize() {
        let read: Command = serde_json::from_value(json!("read")).unwrap();
        assert!(matches!(read, Command::Read));

        let mutate: Command = serde_json::from_value(json!({
            "mutate": {"op": {"op": "toggle_feed_like", "post": 2}}
        }))
        .unwrap();
        assert!(matches!(
            mutate,
            Command::Mutate { op: FeedMutation::ToggleFeedLike { post: 2 } }
        ));

        let import: Command =
            serde_json::from_value(json!({"chat_import": {"text": "[]"}})).unwrap();
        assert!(matches!(import, Command::ChatImport { path: None, text: Some(_) }));
    }

    #[test]
    fn partner_becomes_identity() {
        let partner = Partner {
            name: Some("Bo".into()),
            handle: None,
        };
        let user = FeedPostUser::from(&partner);
        assert_eq!(user.name, "Bo");
        assert_eq!(user.handle, "");
    }

    #[test]
    fn flags_default_off() {
        assert!(!ExecutionFlags::default().verbose);
    }
}
