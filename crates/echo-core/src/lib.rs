//! echo-core: data-synchronization engine for a simulated social-feed UI.
//!
//! Reads loosely-shaped data out of a host's scope-layered variable store,
//! normalizes it into one canonical model, writes optimistic UI mutations
//! back, and keeps per-conversation direct messages in a local cache.
//!
//! # Quick Start
//!
//! ```no_run
//! use echo_core::{EchoEngine, LoadOptions};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let engine = EchoEngine::load_with_options(LoadOptions::default())?;
//!     if engine.session().refresh().await {
//!         let snapshot = engine.session().snapshot();
//!         println!("{} posts", snapshot.echo_chamber_feed.as_ref().map_or(0, |f| f.posts.len()));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! For lower-level access, use the individual modules directly.

pub mod cache;
pub mod config;
pub mod conversation;
pub mod document;
mod engine;
pub mod execution;
pub mod input;
pub mod json_ext;
pub mod lenient;
pub mod macros;
pub mod model;
pub mod mutation;
pub mod normalize;
pub mod output;
pub mod reader;
pub mod safe_io;
pub mod session;
pub mod store;
pub mod writer;

// Re-export the facade
pub use engine::{EchoEngine, LoadOptions};

// Re-export commonly used types
pub use cache::{ConversationCache, NpcChatRecord, conversation_key};
pub use config::EchoConfig;
pub use conversation::ConversationView;
pub use document::parse_document;
pub use execution::execute_command;
pub use input::{Command, ExecutionFlags};
pub use macros::{MacroSubstitutor, TemplateMacros};
pub use model::RootData;
pub use mutation::FeedMutation;
pub use normalize::{coerce_echo_chamber_feed, coerce_root_data, normalize_echo_chamber_feed};
pub use output::{CommandEvent, OutputSink};
pub use reader::read_echo_chamber_variables;
pub use session::EchoSession;
pub use store::VariableStore;
pub use writer::{WriteOutcome, update_stat_data};
