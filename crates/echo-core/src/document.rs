//! Structured document parsing.
//!
//! Upstream documents are hand-authored or model-generated, so parsing tries
//! a chain of grammars and takes the first one that accepts the text:
//!
//! 1. YAML (a superset that also accepts JSON)
//! 2. strict JSON
//! 3. relaxed JSON: trailing commas before `}` / `]` stripped in one regex pass
//!
//! Parsing never fails past this module. Text that no grammar accepts
//! becomes an empty mapping and a warning is logged.

use log::{debug, warn};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use strum::{Display, EnumIter, IntoEnumIterator};

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("static regex"));

/// A grammar in the fallback chain, in the order it is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Grammar {
    Yaml,
    Json,
    RelaxedJson,
}

impl Grammar {
    fn parse(self, source: &str) -> Result<Value, String> {
        match self {
            Grammar::Yaml => serde_yaml::from_str(source).map_err(|e| e.to_string()),
            Grammar::Json => serde_json::from_str(source).map_err(|e| e.to_string()),
            Grammar::RelaxedJson => {
                let relaxed = strip_trailing_commas(source);
                serde_json::from_str(&relaxed).map_err(|e| e.to_string())
            }
        }
    }
}

/// Remove a comma that directly precedes a closing brace or bracket.
pub fn strip_trailing_commas(source: &str) -> String {
    TRAILING_COMMA.replace_all(source, "$1").into_owned()
}

/// Parse with the fallback chain, reporting which grammar accepted the text.
///
/// Returns None when every grammar rejects it. Blank text holds no document
/// and is rejected up front, since YAML would read it as null.
pub fn parse_with_grammar(source: &str) -> Option<(Value, Grammar)> {
    if source.trim().is_empty() {
        warn!("document is blank ({} bytes)", source.len());
        return None;
    }
    let mut failures = Vec::new();
    for grammar in Grammar::iter() {
        match grammar.parse(source) {
            Ok(value) => {
                debug!("document accepted by {} grammar", grammar);
                return Some((value, grammar));
            }
            Err(e) => failures.push(format!("{}: {}", grammar, e)),
        }
    }
    warn!(
        "document rejected by every grammar ({} bytes): {}",
        source.len(),
        failures.join("; ")
    );
    None
}

/// Parse a raw text blob into a loosely-typed document.
pub fn parse_document(source: &str) -> Value {
    parse_with_grammar(source)
        .map(|(value, _)| value)
        .unwrap_or_else(|| Value::Object(Map::new()))
}
