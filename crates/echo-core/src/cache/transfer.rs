//! Cache export and import files.
//!
//! Export is `{ "version": 1, "exported_at": <millis>, "chats": [...] }`.
//! Import takes that shape or a bare array of records, in any grammar the
//! document parser understands. Records are validated one by one; a bad
//! record is discarded without failing the batch.

use super::NpcChatRecord;
use crate::document::parse_document;
use crate::json_ext::JsonExt;
use crate::model::DmMessage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExport {
    pub version: u32,
    pub exported_at: i64,
    pub chats: Vec<NpcChatRecord>,
}

impl ChatExport {
    pub fn new(chats: Vec<NpcChatRecord>) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: chrono::Utc::now().timestamp_millis(),
            chats,
        }
    }
}

/// What an import did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    /// Keys written, in file order.
    pub imported: Vec<String>,
    /// Records rejected by validation or by the cache.
    pub discarded: usize,
}

/// Valid records from an import file, plus how many were rejected.
#[derive(Debug, Default)]
pub struct ImportBatch {
    pub records: Vec<NpcChatRecord>,
    pub discarded: usize,
}

fn decode_message(value: &Value) -> Option<DmMessage> {
    serde_json::from_value::<DmMessage>(value.clone())
        .ok()
        .filter(DmMessage::is_valid)
}

/// A record is kept only when its key is non-blank, `messages` is an array
/// and every message has a sender and content.
fn decode_record(value: &Value) -> Option<NpcChatRecord> {
    let key = value.get_str("key").map(str::trim).filter(|k| !k.is_empty())?;
    let messages = value
        .get_array("messages")?
        .iter()
        .map(decode_message)
        .collect::<Option<Vec<_>>>()?;
    Some(NpcChatRecord {
        key: key.to_string(),
        updated_at: value.get("updated_at").and_then(Value::as_i64).unwrap_or_default(),
        messages,
    })
}

/// Parse an import file.
pub fn parse_import(text: &str) -> ImportBatch {
    let document = parse_document(text);
    let entries = match &document {
        Value::Array(entries) => entries.as_slice(),
        other => match other.get_array("chats") {
            Some(chats) => chats.as_slice(),
            None => {
                warn!("import file has neither a chats list nor a bare list of records");
                &[]
            }
        },
    };

    let mut batch = ImportBatch::default();
    for (index, entry) in entries.iter().enumerate() {
        match decode_record(entry) {
            Some(record) => batch.records.push(record),
            None => {
                debug!("discarding invalid import record #{}", index);
                batch.discarded += 1;
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_export_shape() {
        let export = serde_json::to_value(ChatExport::new(Vec::new())).unwrap();
        assert_eq!(export["version"], 1);
        assert_eq!(export["chats"], json!([]));
        assert!(export["exported_at"].is_i64());
    }

    #[test]
    fn export_file_imports_back() {
        let export = ChatExport::new(vec![NpcChatRecord {
            key: "@a".into(),
            updated_at: 5,
            messages: vec![DmMessage::new("@a", "hi")],
        }]);
        let batch = parse_import(&serde_json::to_string(&export).unwrap());
        assert_eq!(batch.records, export.chats);
        assert_eq!(batch.discarded, 0);
    }

    #[test]
    fn empty_export_imports_nothing() {
        let batch = parse_import(r#"{"version": 1, "exported_at": 0, "chats": []}"#);
        assert!(batch.records.is_empty());
        assert_eq!(batch.discarded, 0);
    }

    #[test]
    fn bare_list_with_invalid_records() {
        let text = json!([
            {"key": "@ok", "messages": [{"sender": "@ok", "content": "hey"}]},
            {"key": "  ", "messages": []},
            {"key": "@bad", "messages": [{"sender": "@bad", "content": "  "}]},
            {"key": "@nolist", "messages": "nope"},
            "not a record"
        ])
        .to_string();
        let batch = parse_import(&text);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].key, "@ok");
        assert_eq!(batch.discarded, 4);
    }

    #[test]
    fn relaxed_json_import() {
        let batch = parse_import(r#"[{"key": " @a ", "messages": [{"sender": "x", "content": "y"},],},]"#);
        assert_eq!(batch.records[0].key, "@a");
    }

    #[test]
    fn unrecognized_document_imports_nothing() {
        let batch = parse_import("just some words");
        assert!(batch.records.is_empty());
        assert_eq!(batch.discarded, 0);
    }
}
