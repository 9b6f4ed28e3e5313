//! Domain models for catalog resources
//!
//! Only the fields the client core reads are typed; everything else the API
//! returns is preserved in `extra` so hosts can render it without a schema
//! change here.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::Hash;

// =============================================================================
// Identity
// =============================================================================

/// Stable identity used to deduplicate items across pages.
pub trait Identify {
    type Id: Eq + Hash + Clone + Send + Sync + 'static;

    fn identity(&self) -> Self::Id;
}

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

numeric_id!(
    /// Unique identifier for a track
    TrackId
);
numeric_id!(
    /// Unique identifier for a user
    UserId
);
numeric_id!(
    /// Unique identifier for a playlist
    PlaylistId
);
numeric_id!(CommentId);

// =============================================================================
// Resources
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub permalink_url: Option<String>,
    #[serde(default)]
    pub followers_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub artwork_url: Option<String>,
    #[serde(default)]
    pub permalink_url: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub title: String,
    #[serde(default)]
    pub track_count: Option<u64>,
    #[serde(default)]
    pub user: Option<User>,
    /// Present only on single-playlist responses.
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub body: String,
    /// Position in the track, in milliseconds
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identify for Track {
    type Id = TrackId;

    fn identity(&self) -> TrackId {
        self.id
    }
}

impl Identify for User {
    type Id = UserId;

    fn identity(&self) -> UserId {
        self.id
    }
}

impl Identify for Playlist {
    type Id = PlaylistId;

    fn identity(&self) -> PlaylistId {
        self.id
    }
}

impl Identify for Comment {
    type Id = CommentId;

    fn identity(&self) -> CommentId {
        self.id
    }
}

/// Result of resolving a public web URL.
///
/// Dispatched on the `kind` field; unknown kinds are passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Track(Track),
    User(User),
    Playlist(Playlist),
    Other(Value),
}

impl Resource {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();
        Ok(match kind {
            "track" => Resource::Track(serde_json::from_value(value)?),
            "user" => Resource::User(serde_json::from_value(value)?),
            "playlist" => Resource::Playlist(serde_json::from_value(value)?),
            _ => Resource::Other(value),
        })
    }

    pub fn kind(&self) -> &str {
        match self {
            Resource::Track(_) => "track",
            Resource::User(_) => "user",
            Resource::Playlist(_) => "playlist",
            Resource::Other(value) => value.get("kind").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }
}
