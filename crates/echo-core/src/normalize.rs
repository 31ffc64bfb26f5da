//! Schema normalization.
//!
//! Classifies a loosely-typed document into one of the recognized root
//! shapes and coerces it into the canonical model. Classification order:
//!
//! 1. canonical root keys (`echo_chamber_feed`, `user_profile_page`,
//!    `direct_message_thread`): the value is a [`RootData`]
//! 2. wrapper key `echo_chamber`: recurse into it as the whole document
//! 3. feed keys (`viewer_profile`, `posts`): the value is a bare feed and
//!    gets wrapped as `{ echo_chamber_feed: value }`
//! 4. anything else is unrecognized and the caller keeps its defaults
//!
//! Text is parsed with [`parse_document`] and classified again, so a section
//! stored as a YAML or JSON string is still found.

use crate::document::parse_document;
use crate::json_ext::JsonExt;
use crate::model::{EchoChamberFeed, RootData};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub const FEED_KEY: &str = "echo_chamber_feed";
pub const PROFILE_KEY: &str = "user_profile_page";
pub const DM_KEY: &str = "direct_message_thread";
pub const ROOT_KEYS: [&str; 3] = [FEED_KEY, PROFILE_KEY, DM_KEY];

pub const WRAPPER_KEY: &str = "echo_chamber";
pub const FEED_SHAPE_KEYS: [&str; 2] = ["viewer_profile", "posts"];

pub const COMMENTS_FIELD: &str = "people_comments";
pub const COMMENTS_FIELD_VARIANT: &str = "People_comments";

/// How many times text may be re-parsed while coercing one input. Mapping
/// hops are not counted; a finite document bounds them already.
const MAX_NESTING: usize = 4;

/// A recognized shape of an incoming document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RootShape<'a> {
    /// Exposes at least one canonical root key.
    Root(&'a Map<String, Value>),
    /// Wraps the real document under `echo_chamber`.
    Wrapped(&'a Value),
    /// A bare feed (`viewer_profile` / `posts`).
    Feed(&'a Map<String, Value>),
    /// Serialized text that needs parsing first.
    Text(&'a str),
    Unrecognized,
}

pub fn classify(value: &Value) -> RootShape<'_> {
    match value {
        Value::String(text) => RootShape::Text(text),
        Value::Object(map) if value.has_any_key(&ROOT_KEYS) => RootShape::Root(map),
        Value::Object(map) => match map.get(WRAPPER_KEY) {
            Some(inner) => RootShape::Wrapped(inner),
            None if value.has_any_key(&FEED_SHAPE_KEYS) => RootShape::Feed(map),
            None => RootShape::Unrecognized,
        },
        _ => RootShape::Unrecognized,
    }
}

/// Parse text found where a document was expected. Text that parses back to
/// itself (a plain scalar) ends the recursion.
fn reparse(text: &str) -> Option<Value> {
    match parse_document(text) {
        Value::String(ref s) if s == text => None,
        parsed => Some(parsed),
    }
}

/// [`reparse`], unless `depth` re-parses have already happened.
fn reparse_within(text: &str, depth: usize) -> Option<Value> {
    if depth >= MAX_NESTING {
        warn!("text nested more than {} levels deep, ignoring", MAX_NESTING);
        return None;
    }
    reparse(text)
}

/// Rewrite each post's `People_comments` onto `people_comments`.
///
/// When both are present the canonical field wins. Everything else is left
/// untouched, and a second application changes nothing.
pub fn normalize_echo_chamber_feed(feed: &mut Value) {
    let Some(posts) = feed.get_mut("posts").and_then(Value::as_array_mut) else {
        return;
    };
    for post in posts.iter_mut().filter_map(Value::as_object_mut) {
        if let Some(variant) = post.remove(COMMENTS_FIELD_VARIANT) {
            if !post.contains_key(COMMENTS_FIELD) {
                post.insert(COMMENTS_FIELD.to_string(), variant);
            } else {
                debug!("dropping {} shadowed by {}", COMMENTS_FIELD_VARIANT, COMMENTS_FIELD);
            }
        }
    }
}

fn coerce_feed_at(input: &Value, depth: usize) -> Option<Value> {
    match classify(input) {
        RootShape::Text(text) => coerce_feed_at(&reparse_within(text, depth)?, depth + 1),
        RootShape::Root(map) => coerce_feed_at(map.get(FEED_KEY)?, depth),
        RootShape::Wrapped(inner) => coerce_feed_at(inner, depth),
        RootShape::Feed(map) => {
            let mut feed = Value::Object(map.clone());
            normalize_echo_chamber_feed(&mut feed);
            Some(feed)
        }
        RootShape::Unrecognized => None,
    }
}

/// Coerce a section that is not the feed: objects pass through, text is
/// parsed, anything else is dropped.
fn coerce_section(input: &Value, depth: usize) -> Option<Value> {
    match input {
        Value::Object(_) => Some(input.clone()),
        Value::String(text) => coerce_section(&reparse_within(text, depth)?, depth + 1),
        _ => None,
    }
}

fn coerce_root_at(input: &Value, depth: usize) -> Option<Value> {
    match classify(input) {
        RootShape::Text(text) => coerce_root_at(&reparse_within(text, depth)?, depth + 1),
        RootShape::Root(map) => {
            let mut root = map.clone();
            for key in ROOT_KEYS {
                let Some(section) = map.get(key) else {
                    continue;
                };
                let coerced = if key == FEED_KEY {
                    coerce_feed_at(section, depth)
                } else {
                    coerce_section(section, depth)
                };
                match coerced {
                    Some(value) => root.insert(key.to_string(), value),
                    None => root.remove(key),
                };
            }
            Some(Value::Object(root))
        }
        RootShape::Wrapped(inner) => coerce_root_at(inner, depth),
        RootShape::Feed(_) => {
            let feed = coerce_feed_at(input, depth)?;
            let mut root = Map::new();
            root.insert(FEED_KEY.to_string(), feed);
            Some(Value::Object(root))
        }
        RootShape::Unrecognized => None,
    }
}

/// Coerce any value into the canonical root document, still as JSON.
///
/// Unknown keys are kept; unusable sections are removed.
pub fn coerce_root_value(input: &Value) -> Option<Value> {
    coerce_root_at(input, 0)
}

/// Coerce any value into a normalized feed document, still as JSON.
pub fn coerce_feed_value(input: &Value) -> Option<Value> {
    coerce_feed_at(input, 0)
}

fn decode_section<T: DeserializeOwned>(root: &mut Map<String, Value>, key: &str) -> Option<T> {
    let value = root.remove(key)?;
    serde_json::from_value(value)
        .map_err(|e| warn!("discarding undecodable {}: {}", key, e))
        .ok()
}

/// Decode an already-coerced root document into the typed model.
pub fn root_from_value(value: Value) -> RootData {
    let Value::Object(mut root) = value else {
        return RootData::default();
    };
    RootData {
        echo_chamber_feed: decode_section(&mut root, FEED_KEY),
        user_profile_page: decode_section(&mut root, PROFILE_KEY),
        direct_message_thread: decode_section(&mut root, DM_KEY),
    }
}

/// Classify and coerce any input into [`RootData`]; None means "use defaults".
pub fn coerce_root_data(input: &Value) -> Option<RootData> {
    coerce_root_value(input).map(root_from_value)
}

/// Classify and coerce any input into an [`EchoChamberFeed`].
pub fn coerce_echo_chamber_feed(input: &Value) -> Option<EchoChamberFeed> {
    let feed = coerce_feed_value(input)?;
    serde_json::from_value(feed)
        .map_err(|e| warn!("discarding undecodable feed: {}", e))
        .ok()
}
