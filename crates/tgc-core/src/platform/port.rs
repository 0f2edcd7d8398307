use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    domain::{ChatId, ThreadId},
    platform::types::{ChatAction, FileRef, RawPost},
    Result,
};

/// Chat-platform connection for one account.
///
/// Telegram is the only implementation today. Membership queries collapse
/// their own failures to `false` and must not block indefinitely.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Start streaming new posts. Called once per connection.
    async fn listen(&self) -> Result<mpsc::Receiver<RawPost>>;

    /// Discussion chat linked to a channel, if any.
    async fn linked_chat(&self, channel: ChatId) -> Result<Option<ChatId>>;

    async fn chat_title(&self, chat: ChatId) -> Result<String>;

    /// Download an image and return it as a `data:` URI.
    async fn fetch_image(&self, file: &FileRef) -> Result<String>;

    async fn is_member(&self, chat: ChatId) -> bool;
    async fn can_send_to_chat(&self, chat: ChatId) -> bool;

    /// Join a discussion chat.
    ///
    /// `Error::JoinPending` and `Error::RateLimited` must be distinguishable
    /// from other failures.
    async fn join_chat(&self, chat: ChatId) -> Result<()>;

    /// Join a channel from the subscription list (`@username` or invite link).
    async fn join_channel(&self, handle: &str) -> Result<()>;

    async fn send_chat_action(
        &self,
        chat: ChatId,
        thread: ThreadId,
        action: ChatAction,
    ) -> Result<()>;

    /// Post `text` into a thread (`ThreadId(0)` posts outside any thread).
    ///
    /// "Too many requests" must surface as `Error::RateLimited`.
    async fn send_message(&self, chat: ChatId, thread: ThreadId, text: &str) -> Result<()>;

    /// Resolve a public `@username` to a chat id.
    async fn resolve_username(&self, username: &str) -> Result<ChatId>;

    async fn close(&self);
}
