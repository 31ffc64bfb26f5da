//! Macro resolution over nested documents.
//!
//! Every string leaf is passed through an optional [`MacroSubstitutor`].
//! Mapping keys are never rewritten, element and key order are kept, and
//! non-string scalars pass through. A substitution that fails leaves that
//! one string verbatim.

use indexmap::IndexMap;
use log::warn;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;

static MACRO_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.:\-]+)\s*\}\}").expect("static regex"));

#[derive(Debug, Error)]
pub enum MacroError {
    #[error("macro substitution is unavailable")]
    Unavailable,
    #[error("macro substitution failed: {0}")]
    Failed(String),
}

/// External text substitution capability.
pub trait MacroSubstitutor: Send + Sync {
    /// Return the fully substituted text, or an error to keep the input as-is.
    fn substitute(&self, text: &str) -> Result<String, MacroError>;
}

impl<F> MacroSubstitutor for F
where
    F: Fn(&str) -> Result<String, MacroError> + Send + Sync,
{
    fn substitute(&self, text: &str) -> Result<String, MacroError> {
        self(text)
    }
}

/// Rebuild `value` with every string leaf substituted.
pub fn resolve_macros_deep(value: &Value, substitutor: Option<&dyn MacroSubstitutor>) -> Value {
    let Some(substitutor) = substitutor else {
        return value.clone();
    };
    resolve_with(value, substitutor)
}

fn resolve_with(value: &Value, substitutor: &dyn MacroSubstitutor) -> Value {
    match value {
        Value::String(text) => match substitutor.substitute(text) {
            Ok(resolved) => Value::String(resolved),
            Err(e) => {
                warn!("keeping unresolved text ({} chars): {}", text.len(), e);
                value.clone()
            }
        },
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_with(v, substitutor)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_with(v, substitutor)))
                .collect::<Map<String, Value>>(),
        ),
        _ => value.clone(),
    }
}

/// Table-driven `{{name}}` substitution.
///
/// Names match case-insensitively and may be padded with spaces inside the
/// braces. Unknown names stay in the text untouched.
#[derive(Debug, Clone, Default)]
pub struct TemplateMacros {
    table: IndexMap<String, String>,
}

impl TemplateMacros {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let table = entries
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self { table }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn expand(&self, text: &str) -> String {
        MACRO_TOKEN
            .replace_all(text, |caps: &Captures| {
                let name = caps[1].to_ascii_lowercase();
                match self.table.get(&name) {
                    Some(replacement) => replacement.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

impl MacroSubstitutor for TemplateMacros {
    fn substitute(&self, text: &str) -> Result<String, MacroError> {
        Ok(self.expand(text))
    }
}
