//! Optimistic mutations of the canonical model.
//!
//! A [`FeedMutation`] applies in two places: to the UI's working copy
//! ([`FeedMutation::apply`]) and to the persisted `stat_data` inside the
//! writer's read-modify-write cycle ([`FeedMutation::apply_to_stat_data`]).
//! Both go through the same typed code, so the optimistic state and the
//! persisted state cannot drift apart.

use crate::document::parse_document;
use crate::json_ext::JsonExt;
use crate::model::{
    DirectMessageThread, DmMessage, FeedPost, FeedPostComment, FeedPostReply, ProfilePost,
    RootData,
};
use crate::normalize::{
    FEED_KEY, FEED_SHAPE_KEYS, ROOT_KEYS, WRAPPER_KEY, coerce_echo_chamber_feed,
    coerce_root_data,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MutationError {
    #[error("no {0} section to mutate")]
    MissingSection(&'static str),
    #[error("feed post {0} does not exist")]
    NoSuchPost(usize),
    #[error("comment {comment} on feed post {post} does not exist")]
    NoSuchComment { post: usize, comment: usize },
    #[error("profile post '{0}' does not exist")]
    NoSuchProfilePost(String),
    #[error("failed to encode mutated data: {0}")]
    Encode(String),
}

/// A comment as typed by the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NewComment {
    pub author: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    pub text: String,
}

impl From<&NewComment> for FeedPostComment {
    fn from(c: &NewComment) -> Self {
        FeedPostComment {
            author: c.author.clone(),
            handle: c.handle.clone(),
            avatar: c.avatar.clone(),
            text: c.text.clone(),
            ..FeedPostComment::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NewReply {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    pub text: String,
}

impl From<&NewReply> for FeedPostReply {
    fn from(r: &NewReply) -> Self {
        FeedPostReply {
            from: r.from.clone(),
            to: r.to.clone(),
            avatar: r.avatar.clone(),
            text: r.text.clone(),
            ..FeedPostReply::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NewMessage {
    pub sender: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl From<&NewMessage> for DmMessage {
    fn from(m: &NewMessage) -> Self {
        DmMessage {
            timestamp: m.timestamp.clone(),
            ..DmMessage::new(m.sender.clone(), m.content.clone())
        }
    }
}

/// A viewer action on the simulated interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FeedMutation {
    ToggleFeedLike {
        post: usize,
    },
    AddFeedComment {
        post: usize,
        comment: NewComment,
    },
    AddFeedReply {
        post: usize,
        comment: usize,
        reply: NewReply,
    },
    ToggleProfileLike {
        post_id: String,
    },
    AddProfileComment {
        post_id: String,
        comment: NewComment,
    },
    ToggleFollow,
    SendDirectMessage {
        message: NewMessage,
    },
}

fn feed_post(root: &mut RootData, index: usize) -> Result<&mut FeedPost, MutationError> {
    root.echo_chamber_feed
        .as_mut()
        .ok_or(MutationError::MissingSection("feed"))?
        .posts
        .get_mut(index)
        .ok_or(MutationError::NoSuchPost(index))
}

fn profile_post<'a>(root: &'a mut RootData, id: &str) -> Result<&'a mut ProfilePost, MutationError> {
    root.user_profile_page
        .as_mut()
        .ok_or(MutationError::MissingSection("profile"))?
        .posts
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| MutationError::NoSuchProfilePost(id.to_string()))
}

impl FeedMutation {
    /// Apply to a typed model. On error the model is unchanged.
    pub fn apply(&self, root: &mut RootData) -> Result<(), MutationError> {
        match self {
            FeedMutation::ToggleFeedLike { post } => {
                feed_post(root, *post)?.stats.toggle_like();
            }
            FeedMutation::AddFeedComment { post, comment } => {
                let post = feed_post(root, *post)?;
                post.people_comments
                    .get_or_insert_with(Vec::new)
                    .push(comment.into());
                post.stats.comments = post.stats.comments.saturating_add(1);
            }
            FeedMutation::AddFeedReply {
                post: post_index,
                comment,
                reply,
            } => {
                let post = feed_post(root, *post_index)?;
                let target = post
                    .people_comments
                    .as_mut()
                    .and_then(|comments| comments.get_mut(*comment))
                    .ok_or(MutationError::NoSuchComment {
                        post: *post_index,
                        comment: *comment,
                    })?;
                target.replies.get_or_insert_with(Vec::new).push(reply.into());
                post.stats.comments = post.stats.comments.saturating_add(1);
            }
            FeedMutation::ToggleProfileLike { post_id } => {
                let post = profile_post(root, post_id)?;
                post.stats.toggle_like();
                let liked = post.stats.is_liked_by_viewer;
                if let Some(page) = root.user_profile_page.as_mut() {
                    let received = &mut page.profile_user.stats.likes_received;
                    *received = if liked {
                        received.saturating_add(1)
                    } else {
                        received.saturating_sub(1)
                    };
                }
            }
            FeedMutation::AddProfileComment { post_id, comment } => {
                let post = profile_post(root, post_id)?;
                post.comments_data
                    .get_or_insert_with(Vec::new)
                    .push(comment.into());
                post.stats.comments = post.stats.comments.saturating_add(1);
            }
            FeedMutation::ToggleFollow => {
                root.user_profile_page
                    .as_mut()
                    .ok_or(MutationError::MissingSection("profile"))?
                    .profile_user
                    .toggle_follow();
            }
            FeedMutation::SendDirectMessage { message } => {
                root.direct_message_thread
                    .get_or_insert_with(DirectMessageThread::default)
                    .messages
                    .push(message.into());
            }
        }
        Ok(())
    }

    /// Apply inside a `stat_data` mapping, the way the reader would find it.
    ///
    /// The container is picked in the reader's probe order:
    /// `stat_data.echo_chamber` when it holds recognizable data, else
    /// `stat_data` itself when it carries root or feed keys, else a fresh
    /// `stat_data.echo_chamber`. Sections the mutation touches are rewritten
    /// in canonical form; everything else in the container is kept. A bare
    /// feed that gains another section moves under `echo_chamber_feed`,
    /// while keys beside it that the feed model does not know stay put.
    pub fn apply_to_stat_data(&self, stat_data: &mut Value) -> Result<(), MutationError> {
        let container = echo_chamber_container(stat_data);
        let bare_feed =
            !container.has_any_key(&ROOT_KEYS) && container.has_any_key(&FEED_SHAPE_KEYS);

        let mut root = if bare_feed {
            RootData {
                echo_chamber_feed: coerce_echo_chamber_feed(container),
                ..RootData::default()
            }
        } else {
            coerce_root_data(container).unwrap_or_default()
        };
        self.apply(&mut root)?;

        let Value::Object(mut sections) =
            serde_json::to_value(&root).map_err(|e| MutationError::Encode(e.to_string()))?
        else {
            return Err(MutationError::Encode("root did not encode as a mapping".into()));
        };

        if bare_feed && root.user_profile_page.is_none() && root.direct_message_thread.is_none() {
            if let Some(feed) = sections.remove(FEED_KEY) {
                *container = feed;
            }
            return Ok(());
        }
        let Value::Object(map) = container else {
            return Err(MutationError::Encode("container is not a mapping".into()));
        };
        if bare_feed {
            for key in FEED_FIELDS {
                map.remove(key);
            }
            if let Some(Value::Object(feed)) = sections.get_mut(FEED_KEY) {
                feed.retain(|key, _| !map.contains_key(key));
            }
        }
        map.extend(sections);
        Ok(())
    }
}

/// Fields of a bare feed, moved together when the feed is promoted.
const FEED_FIELDS: [&str; 3] = ["viewer_profile", "posts", "match_List"];

/// Locate (creating if needed) the mapping that holds the echo chamber data.
fn echo_chamber_container(stat_data: &mut Value) -> &mut Value {
    if !stat_data.is_object() {
        *stat_data = Value::Object(Map::new());
    }
    let wrapper_usable = stat_data
        .get(WRAPPER_KEY)
        .is_some_and(|wrapper| coerce_root_data(wrapper).is_some());
    let stat_data_usable = !wrapper_usable && coerce_root_data(stat_data).is_some();
    if stat_data_usable {
        return stat_data;
    }

    let container = &mut stat_data[WRAPPER_KEY];
    let parsed = match container {
        Value::String(text) => Some(parse_document(text)),
        _ => None,
    };
    if let Some(parsed) = parsed {
        *container = parsed;
    }
    if !container.is_object() {
        *container = Value::Object(Map::new());
    }
    container
}
