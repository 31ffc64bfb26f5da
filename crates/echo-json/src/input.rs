use std::path::PathBuf;

use echo_core::input::{Command, ExecutionFlags};
use schemars::JsonSchema;
use serde::Deserialize;

/// JSON-mode input, read from stdin. Stateless per invocation: every run
/// loads configuration, the variable store and the cache afresh.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct JsonInput {
    /// The command to execute
    pub command: Command,
    /// Execution flags
    #[serde(default)]
    pub flags: ExecutionFlags,
    /// Home directory override (else ECHO_HOME, else ~/.echo-chamber)
    #[serde(default)]
    pub home: Option<PathBuf>,
    /// Id of the message the host is showing; selects the message scope
    #[serde(default)]
    pub message_id: Option<String>,
}
