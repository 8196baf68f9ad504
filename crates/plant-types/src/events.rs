use serde::{Deserialize, Serialize};

use crate::models::Photo;

/// Which feed a live connection is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedScope {
    Gallery,
    Profile,
}

/// Events pushed over a live feed WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LiveEvent {
    /// The subscription is open
    Ready { scope: FeedScope },

    /// Full replacement of the client's list, newest first
    Snapshot { photos: Vec<Photo> },

    /// A delete requested over this connection went through
    Deleted { id: String },

    /// A command failed; the feed stays open
    Error { message: String },
}

/// Commands sent FROM client TO server over a live feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum LiveCommand {
    /// Delete one of the caller's photos (profile feed only)
    Delete { id: String },
}
