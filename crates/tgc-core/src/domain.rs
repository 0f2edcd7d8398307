use std::fmt;

/// Telegram chat id (numeric). Channels and supergroups are negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

/// Telegram message id of a discussion thread anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one discussion thread. Used for at-most-once delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub chat_id: ChatId,
    pub thread_id: ThreadId,
}

impl ThreadKey {
    pub fn new(chat_id: ChatId, thread_id: ThreadId) -> Self {
        Self { chat_id, thread_id }
    }
}

/// A detected channel post plus its resolved discussion thread.
///
/// Created once per post, consumed by exactly one delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub channel_id: ChatId,
    /// Message id of the post inside the channel.
    pub post_id: i64,
    pub chat_id: ChatId,
    pub thread_id: ThreadId,
    pub text: String,
    /// Image as a data URI, when the post carried one and it could be fetched.
    pub image: Option<String>,
    pub channel_title: String,
}

impl Candidate {
    pub fn thread_key(&self) -> ThreadKey {
        ThreadKey::new(self.chat_id, self.thread_id)
    }
}
