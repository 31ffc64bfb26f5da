//! Command dispatch shared by all frontends.

use crate::cache::{CacheError, NpcChatRecord, conversation_key};
use crate::conversation::ConversationView;
use crate::document::parse_with_grammar;
use crate::engine::EchoEngine;
use crate::input::{Command, Partner};
use crate::model::{DmMessage, FeedPostUser};
use crate::output::{CommandEvent, OutputSink};
use crate::safe_io::write_json_atomic;
use crate::writer::WriteOutcome;
use serde_json::{Value, json};
use std::io::{self, ErrorKind};

fn chat_summary(record: &NpcChatRecord) -> Value {
    json!({
        "key": record.key,
        "updated_at": record.updated_at,
        "message_count": record.messages.len(),
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> io::Result<Value> {
    serde_json::to_value(value).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}

fn partner_identity(partner: &Partner) -> io::Result<FeedPostUser> {
    let identity = FeedPostUser::from(partner);
    if conversation_key(&identity).is_none() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "partner needs a handle or a name",
        ));
    }
    Ok(identity)
}

fn cache_error(e: CacheError) -> io::Error {
    match e {
        CacheError::EmptyKey => io::Error::new(ErrorKind::InvalidInput, e),
        CacheError::Io(e) => e,
        other => io::Error::other(other),
    }
}

fn emit_snapshot(engine: &EchoEngine, output: &dyn OutputSink) -> io::Result<()> {
    let snapshot = engine.session().snapshot();
    output.emit_record("snapshot", &to_json(&*snapshot)?)
}

/// Refresh the session, reporting when the store holds nothing.
async fn sync(engine: &EchoEngine, output: &dyn OutputSink) {
    if !engine.session().refresh().await {
        output.emit_event(CommandEvent::NoEchoChamberData);
    }
}

fn emit_conversation(view: &ConversationView, output: &dyn OutputSink) -> io::Result<()> {
    let record = json!({
        "key": view.active_key(),
        "messages": to_json(&view.messages())?,
    });
    output.emit_record("conversation", &record)
}

/// Run one command against a loaded engine.
pub async fn execute_command(
    engine: &mut EchoEngine,
    command: &Command,
    output: &dyn OutputSink,
) -> io::Result<()> {
    match command {
        Command::Parse { text } => {
            let record = match parse_with_grammar(text) {
                Some((document, grammar)) => {
                    json!({"grammar": grammar.to_string(), "document": document})
                }
                None => {
                    output.emit_event(CommandEvent::DocumentUnparseable);
                    json!({"grammar": null, "document": {}})
                }
            };
            output.emit_record("document", &record)?;
        }
        Command::Read => {
            sync(engine, output).await;
            emit_snapshot(engine, output)?;
        }
        Command::Mutate { op } => {
            sync(engine, output).await;
            let session = engine.session().clone();
            let mut working = session.working_copy();
            match session.mutate(&mut working, op).await {
                WriteOutcome::Committed(backend) => {
                    output.emit_record(
                        "mutation",
                        &json!({"committed": true, "backend": backend.to_string()}),
                    )?;
                }
                WriteOutcome::Failed(backend) => output.emit_event(CommandEvent::WriteFailed {
                    backend: backend.to_string(),
                }),
                WriteOutcome::NoBackend => output.emit_event(CommandEvent::NoBackend),
                WriteOutcome::Aborted(e) => {
                    return Err(io::Error::new(ErrorKind::InvalidInput, e.to_string()));
                }
            }
            emit_snapshot(engine, output)?;
        }
        Command::ChatList => {
            let records = engine
                .conversation()
                .cache()
                .list()
                .await
                .map_err(cache_error)?;
            for record in &records {
                output.emit_record("chat", &chat_summary(record))?;
            }
        }
        Command::ChatRead { key } => {
            let record = engine
                .conversation()
                .cache()
                .read(key)
                .await
                .map_err(cache_error)?;
            output.emit_record("chat", &to_json(&record)?)?;
        }
        Command::ChatDelete { key } => {
            let existed = engine.conversation().delete(key).await;
            output.emit_record("chat_deleted", &json!({"key": key.trim(), "existed": existed}))?;
        }
        Command::ChatExport { path } => {
            let export = engine
                .conversation()
                .export()
                .await
                .map_err(cache_error)?;
            match path {
                Some(path) => {
                    let target = path.clone();
                    let count = export.chats.len();
                    tokio::task::spawn_blocking(move || write_json_atomic(&target, &export))
                        .await
                        .map_err(io::Error::other)??;
                    output.emit_result(&format!(
                        "exported {} conversation(s) to {}",
                        count,
                        path.display()
                    ));
                }
                None => output.emit_record("export", &to_json(&export)?)?,
            }
        }
        Command::ChatImport { path, text } => {
            let text = match (path, text) {
                (Some(path), _) => tokio::fs::read_to_string(path).await?,
                (None, Some(text)) => text.clone(),
                (None, None) => {
                    return Err(io::Error::new(
                        ErrorKind::InvalidInput,
                        "chat_import needs a path or text",
                    ));
                }
            };
            let report = engine.conversation().import(&text).await;
            if report.discarded > 0 {
                output.emit_event(CommandEvent::ImportDiscarded {
                    count: report.discarded,
                });
            }
            output.emit_record("import", &to_json(&report)?)?;
        }
        Command::OpenConversation { partner } => {
            let identity = partner_identity(partner)?;
            sync(engine, output).await;
            engine.open_conversation(&identity).await;
            emit_conversation(engine.conversation(), output)?;
            engine.conversation().close().await;
        }
        Command::ChatAppend { partner, message } => {
            let identity = partner_identity(partner)?;
            let message = DmMessage::from(message);
            if !message.is_valid() {
                return Err(io::Error::new(
                    ErrorKind::InvalidInput,
                    "message needs a sender and content",
                ));
            }
            sync(engine, output).await;
            engine.open_conversation(&identity).await;
            engine.conversation().push_message(message);
            emit_conversation(engine.conversation(), output)?;
            engine.conversation().close().await;
        }
    }
    Ok(())
}
