use echo_core::{CommandEvent, OutputSink};
use serde_json::Value;
use std::io::{self, Write};

/// Map `io::ErrorKind` to a stable coarse-grained error code string.
fn error_code(e: &io::Error) -> &'static str {
    match e.kind() {
        io::ErrorKind::NotFound => "not_found",
        io::ErrorKind::InvalidInput => "invalid_input",
        io::ErrorKind::PermissionDenied => "permission_denied",
        io::ErrorKind::InvalidData => "invalid_data",
        _ => "internal_error",
    }
}

fn event_json(event: CommandEvent) -> Value {
    match event {
        CommandEvent::NoEchoChamberData => serde_json::json!({"type": "no_echo_chamber_data"}),
        CommandEvent::DocumentUnparseable => serde_json::json!({"type": "document_unparseable"}),
        CommandEvent::WriteFailed { backend } => {
            serde_json::json!({"type": "write_failed", "backend": backend})
        }
        CommandEvent::NoBackend => serde_json::json!({"type": "no_backend"}),
        CommandEvent::ImportDiscarded { count } => {
            serde_json::json!({"type": "import_discarded", "count": count})
        }
    }
}

/// JSONL output sink for echo-json.
///
/// Results go to stdout as JSONL, diagnostics go to stderr as JSONL.
pub struct JsonOutputSink;

impl OutputSink for JsonOutputSink {
    fn emit_result(&self, content: &str) {
        let json = serde_json::json!({"type": "result", "content": content});
        println!("{}", json);
    }

    fn emit_record(&self, kind: &str, record: &Value) -> io::Result<()> {
        let json = serde_json::json!({"type": kind, "data": record});
        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{}", json)?;
        stdout.flush()
    }

    fn emit_event(&self, event: CommandEvent) {
        eprintln!("{}", event_json(event));
    }

    fn emit_done(&self, result: &io::Result<()>) {
        let json = match result {
            Ok(()) => serde_json::json!({"type": "done", "ok": true}),
            Err(e) => serde_json::json!({
                "type": "done",
                "ok": false,
                "code": error_code(e),
                "message": e.to_string(),
            }),
        };
        eprintln!("{}", json);
    }
}
