use serde_json::Value;
use std::io;

/// Semantic events emitted on the command path.
///
/// These report degraded outcomes that are not command failures: the engine
/// recovered, but the caller may want to know.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEvent {
    /// No scope in the variable store holds echo chamber data.
    NoEchoChamberData,
    /// No grammar accepted the document; it parsed as `{}`.
    DocumentUnparseable,
    /// The backend rejected the write; nothing was persisted.
    WriteFailed { backend: String },
    /// No variable backend is configured; nothing was persisted.
    NoBackend,
    /// Import records rejected by validation or by the cache.
    ImportDiscarded { count: usize },
}

/// Abstraction over how command results and diagnostics are presented.
pub trait OutputSink {
    /// Emit a plain result string.
    fn emit_result(&self, content: &str);

    /// Emit a structured record of the given kind.
    fn emit_record(&self, kind: &str, record: &Value) -> io::Result<()>;

    /// Emit a command-path event.
    fn emit_event(&self, event: CommandEvent);

    /// Signal command completion. Called once, after all output.
    fn emit_done(&self, result: &io::Result<()>) {
        let _ = result;
    }
}

/// A capturing output sink for tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CaptureSink {
    pub results: std::cell::RefCell<Vec<String>>,
    pub records: std::cell::RefCell<Vec<(String, Value)>>,
    pub events: std::cell::RefCell<Vec<CommandEvent>>,
}

#[cfg(test)]
impl CaptureSink {
    /// Records of `kind`, in emission order.
    pub fn records_of(&self, kind: &str) -> Vec<Value> {
        self.records
            .borrow()
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[cfg(test)]
impl OutputSink for CaptureSink {
    fn emit_result(&self, content: &str) {
        self.results.borrow_mut().push(content.to_string());
    }

    fn emit_record(&self, kind: &str, record: &Value) -> io::Result<()> {
        self.records
            .borrow_mut()
            .push((kind.to_string(), record.clone()));
        Ok(())
    }

    fn emit_event(&self, event: CommandEvent) {
        self.events.borrow_mut().push(event);
    }
}
