//! Canonical domain model.
//!
//! Every record keeps the fields it does not understand in `extra`, so a
//! document decoded here and serialized back loses nothing but its drift
//! (renamed comment field, mistyped counts).

use crate::lenient;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Top-level document. Each section is independent; absent means "use defaults".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RootData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_chamber_feed: Option<EchoChamberFeed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_profile_page: Option<UserProfilePage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_message_thread: Option<DirectMessageThread>,
}

impl RootData {
    pub fn is_empty(&self) -> bool {
        self.echo_chamber_feed.is_none()
            && self.user_profile_page.is_none()
            && self.direct_message_thread.is_none()
    }
}

// ============================================================================
// Feed
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EchoChamberFeed {
    #[serde(
        default,
        deserialize_with = "lenient::opt_record",
        skip_serializing_if = "Option::is_none"
    )]
    pub viewer_profile: Option<FeedPostUser>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub posts: Vec<FeedPost>,
    #[serde(
        rename = "match_List",
        default,
        deserialize_with = "lenient::seq",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub match_list: Vec<MatchEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EchoChamberFeed {
    /// Users from `match_List`, unwrapped from their `match` envelopes.
    pub fn matches(&self) -> impl Iterator<Item = &FeedPostUser> {
        self.match_list.iter().map(|entry| &entry.user)
    }
}

/// Display identity of a post author or the viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPostUser {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub handle: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_bg: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One `match_List` element. The external shape wraps the user under `match`;
/// a bare user object is accepted too.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchEntry {
    pub user: FeedPostUser,
}

impl Serialize for MatchEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            #[serde(rename = "match")]
            user: &'a FeedPostUser,
        }
        Envelope { user: &self.user }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MatchEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = Value::deserialize(deserializer)?;
        let inner = match value.as_object_mut().and_then(|m| m.remove("match")) {
            Some(inner) => inner,
            None => value,
        };
        let user = serde_json::from_value(inner).map_err(serde::de::Error::custom)?;
        Ok(MatchEntry { user })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostStats {
    #[serde(default, deserialize_with = "lenient::count")]
    pub comments: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub likes: u64,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_liked_by_viewer: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PostStats {
    /// Flip the viewer's like. Unliking never takes `likes` below zero.
    pub fn toggle_like(&mut self) {
        self.set_liked(!self.is_liked_by_viewer);
    }

    /// Set the viewer's like state; a no-op when it already matches.
    pub fn set_liked(&mut self, liked: bool) {
        if liked == self.is_liked_by_viewer {
            return;
        }
        self.is_liked_by_viewer = liked;
        self.likes = if liked {
            self.likes.saturating_add(1)
        } else {
            self.likes.saturating_sub(1)
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    #[serde(default, deserialize_with = "lenient::record")]
    pub user: FeedPostUser,
    #[serde(default, deserialize_with = "lenient::text")]
    pub body: String,
    #[serde(
        default,
        deserialize_with = "lenient::string_set",
        skip_serializing_if = "Option::is_none"
    )]
    pub tags: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_caption: Option<String>,
    #[serde(default, deserialize_with = "lenient::record")]
    pub stats: PostStats,
    #[serde(
        default,
        deserialize_with = "lenient::opt_seq",
        skip_serializing_if = "Option::is_none"
    )]
    pub people_comments: Option<Vec<FeedPostComment>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPostComment {
    #[serde(default, deserialize_with = "lenient::text")]
    pub author: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub handle: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub text: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_seq",
        skip_serializing_if = "Option::is_none"
    )]
    pub replies: Option<Vec<FeedPostReply>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPostReply {
    #[serde(default, deserialize_with = "lenient::text")]
    pub from: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub to: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfilePage {
    #[serde(default, deserialize_with = "lenient::record")]
    pub profile_user: ProfileUser,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub posts: Vec<ProfilePost>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub following_list: Vec<ProfileContact>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub followers_list: Vec<ProfileContact>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUser {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub handle: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub bio: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub banner: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub is_following: bool,
    #[serde(default, deserialize_with = "lenient::record")]
    pub stats: ProfileStats,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProfileUser {
    /// Flip the viewer's follow state, adjusting `stats.followers` without underflow.
    pub fn toggle_follow(&mut self) {
        self.is_following = !self.is_following;
        self.stats.followers = if self.is_following {
            self.stats.followers.saturating_add(1)
        } else {
            self.stats.followers.saturating_sub(1)
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileStats {
    #[serde(default, deserialize_with = "lenient::count")]
    pub following: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub followers: u64,
    #[serde(default, deserialize_with = "lenient::count")]
    pub likes_received: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePost {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub body: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_caption: Option<String>,
    #[serde(default, deserialize_with = "lenient::record")]
    pub stats: PostStats,
    #[serde(
        default,
        deserialize_with = "lenient::opt_seq",
        skip_serializing_if = "Option::is_none"
    )]
    pub comments_data: Option<Vec<FeedPostComment>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Lightweight identity used by the following/followers lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileContact {
    #[serde(default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub handle: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Direct messages
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectMessageThread {
    #[serde(
        default,
        deserialize_with = "lenient::record",
        skip_serializing_if = "Participants::is_empty"
    )]
    pub participants: Participants,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub messages: Vec<DmMessage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participants {
    #[serde(default, deserialize_with = "lenient::record")]
    pub viewer: FeedPostUser,
    #[serde(default, deserialize_with = "lenient::record")]
    pub chat_partner: FeedPostUser,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Participants {
    /// Nobody named on either side; not worth persisting.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DmMessage {
    /// Handle of the sender.
    #[serde(default, deserialize_with = "lenient::text")]
    pub sender: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub content: String,
    #[serde(
        default,
        deserialize_with = "lenient::opt_flag",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_read: Option<bool>,
    /// Display timestamp, shown verbatim.
    #[serde(
        default,
        deserialize_with = "lenient::opt_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DmMessage {
    pub fn new(sender: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    /// True when both sender and content carry non-whitespace text.
    pub fn is_valid(&self) -> bool {
        !self.sender.trim().is_empty() && !self.content.trim().is_empty()
    }
}
