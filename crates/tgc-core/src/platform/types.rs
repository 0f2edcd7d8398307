use crate::domain::{ChatId, ThreadId};

/// Platform-neutral "new post" event.
///
/// Telegram-specific fields stay in the Telegram adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPost {
    pub channel_id: ChatId,
    /// Identifier of the post inside its channel.
    pub post_id: i64,
    /// Discussion linkage, when the platform delivered the post already attached to its thread.
    pub discussion: Option<DiscussionLink>,
    /// Traffic originating from our own account.
    pub outgoing: bool,
    /// Posts authored by a channel (as opposed to a user message in a group).
    pub is_channel_post: bool,
    pub content: PostContent,
}

/// Where the comments for a post live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiscussionLink {
    pub chat_id: ChatId,
    pub thread_id: ThreadId,
}

/// Opaque handle the platform uses to download a file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRef(pub String);

/// Known content kinds that may carry visible text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostContent {
    Text(String),
    Photo {
        caption: Option<String>,
        file: Option<FileRef>,
    },
    Video {
        caption: Option<String>,
    },
    Document {
        caption: Option<String>,
    },
    Other,
}

impl PostContent {
    /// Visible text: the body for text posts, the caption for media posts.
    pub fn visible_text(&self) -> Option<&str> {
        match self {
            PostContent::Text(t) => Some(t.as_str()),
            PostContent::Photo { caption, .. }
            | PostContent::Video { caption }
            | PostContent::Document { caption } => caption.as_deref(),
            PostContent::Other => None,
        }
    }

    pub fn image(&self) -> Option<&FileRef> {
        match self {
            PostContent::Photo { file, .. } => file.as_ref(),
            _ => None,
        }
    }
}

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}
