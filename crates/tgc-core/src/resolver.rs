//! Normalizes raw channel posts into delivery candidates.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::{
    delivery::AccountState,
    domain::{Candidate, ChatId, ThreadId},
    platform::{port::ChatPlatform, types::RawPost},
};

pub struct UpdateResolver {
    platform: Arc<dyn ChatPlatform>,
    state: Arc<AccountState>,
    /// channel -> linked discussion chat (`None` = channel has no comments).
    links: Mutex<HashMap<ChatId, Option<ChatId>>>,
}

impl UpdateResolver {
    pub fn new(platform: Arc<dyn ChatPlatform>, state: Arc<AccountState>) -> Self {
        Self {
            platform,
            state,
            links: Mutex::new(HashMap::new()),
        }
    }

    /// Turn a post into a candidate, or `None` when there is nothing to comment on.
    pub async fn resolve(&self, post: RawPost) -> Option<Candidate> {
        if post.outgoing || !post.is_channel_post {
            tracing::debug!(channel_id = post.channel_id.0, "ignore update: not an authored channel post");
            return None;
        }

        let (chat_id, thread_id) = match post.discussion {
            Some(link) => (link.chat_id, link.thread_id),
            None => {
                let chat = self.linked_chat(post.channel_id).await?;
                (chat, ThreadId(post.post_id))
            }
        };

        self.ensure_member(chat_id).await;

        let text = post
            .content
            .visible_text()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if text.is_empty() {
            tracing::debug!(
                channel_id = post.channel_id.0,
                post_id = post.post_id,
                "ignore post: no visible text"
            );
            return None;
        }

        let channel_title = match self.platform.chat_title(post.channel_id).await {
            Ok(t) => t,
            Err(e) => {
                tracing::info!(channel_id = post.channel_id.0, error = %e, "channel title unavailable");
                String::new()
            }
        };

        let image = match post.content.image() {
            Some(file) => match self.platform.fetch_image(file).await {
                Ok(uri) => Some(uri),
                Err(e) => {
                    tracing::info!(channel_id = post.channel_id.0, error = %e, "image download failed");
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            channel_id = post.channel_id.0,
            chat_id = chat_id.0,
            thread_id = thread_id.0,
            "new channel post with comments"
        );

        Some(Candidate {
            channel_id: post.channel_id,
            post_id: post.post_id,
            chat_id,
            thread_id,
            text,
            image,
            channel_title,
        })
    }

    async fn linked_chat(&self, channel: ChatId) -> Option<ChatId> {
        let mut links = self.links.lock().await;
        if let Some(cached) = links.get(&channel) {
            return *cached;
        }
        match self.platform.linked_chat(channel).await {
            Ok(link) => {
                links.insert(channel, link);
                if link.is_none() {
                    tracing::debug!(channel_id = channel.0, "channel has no discussion chat");
                }
                link
            }
            Err(e) => {
                // Lookup failures are not cached; the next post retries.
                tracing::warn!(channel_id = channel.0, error = %e, "linked chat lookup failed");
                None
            }
        }
    }

    /// Best-effort join of a discussion chat.
    async fn ensure_member(&self, chat: ChatId) {
        if self.state.blocked.is_blocked(chat) || self.platform.is_member(chat).await {
            return;
        }
        match self.platform.join_chat(chat).await {
            Ok(()) => tracing::info!(chat_id = chat.0, "joined discussion chat"),
            Err(e) if e.blocks_chat() => {
                tracing::warn!(chat_id = chat.0, error = %e, "join deferred, suppressing chat");
                self.state.blocked.block(chat);
            }
            Err(e) => tracing::warn!(chat_id = chat.0, error = %e, "join discussion chat failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        delivery::{notify::post_link, DeliverySettings},
        platform::types::{DiscussionLink, FileRef, PostContent},
        testing::{FakePlatform, JoinFailure},
    };

    const CHANNEL: ChatId = ChatId(-1001);
    const DISCUSSION: ChatId = ChatId(-2002);

    fn resolver(platform: Arc<FakePlatform>) -> (UpdateResolver, Arc<AccountState>) {
        let state = Arc::new(AccountState::new(&DeliverySettings::default(), None));
        (UpdateResolver::new(platform, state.clone()), state)
    }

    fn post(id: i64, content: PostContent) -> RawPost {
        RawPost {
            channel_id: CHANNEL,
            post_id: id,
            discussion: None,
            outgoing: false,
            is_channel_post: true,
            content,
        }
    }

    fn text(s: &str) -> PostContent {
        PostContent::Text(s.to_string())
    }

    #[tokio::test]
    async fn resolves_linked_chat_once_per_channel() {
        let platform = Arc::new(FakePlatform::default());
        platform.set_link(CHANNEL, DISCUSSION);
        platform.set_title(CHANNEL, "Daily");
        let (r, _) = resolver(platform.clone());

        let c = r.resolve(post(10, text("  hello  "))).await.unwrap();
        assert_eq!(c.chat_id, DISCUSSION);
        assert_eq!(c.thread_id, ThreadId(10));
        assert_eq!(c.text, "hello");
        assert_eq!(c.channel_title, "Daily");

        r.resolve(post(11, text("again"))).await.unwrap();
        assert_eq!(platform.link_lookups(), 1);
    }

    #[tokio::test]
    async fn channels_without_discussion_are_dropped_and_cached() {
        let platform = Arc::new(FakePlatform::default());
        let (r, _) = resolver(platform.clone());

        assert!(r.resolve(post(1, text("hi"))).await.is_none());
        assert!(r.resolve(post(2, text("hi"))).await.is_none());
        assert_eq!(platform.link_lookups(), 1);
    }

    #[tokio::test]
    async fn event_linkage_wins_over_lookup() {
        let platform = Arc::new(FakePlatform::default());
        let (r, _) = resolver(platform.clone());
        let mut p = post(5, text("hi"));
        p.discussion = Some(DiscussionLink {
            chat_id: DISCUSSION,
            thread_id: ThreadId(77),
        });

        let c = r.resolve(p).await.unwrap();
        assert_eq!(c.thread_key().thread_id, ThreadId(77));
        assert_eq!(platform.link_lookups(), 0);
    }

    #[tokio::test]
    async fn permalink_points_at_channel_post_not_discussion_copy() {
        let platform = Arc::new(FakePlatform::default());
        let (r, _) = resolver(platform);
        let mut p = post(12, text("release"));
        p.channel_id = ChatId(-1001234567890);
        p.discussion = Some(DiscussionLink {
            chat_id: DISCUSSION,
            thread_id: ThreadId(55),
        });

        let c = r.resolve(p).await.unwrap();
        assert_eq!(c.post_id, 12);
        assert_eq!(c.thread_id, ThreadId(55));
        assert_eq!(
            post_link(c.channel_id, c.post_id).as_deref(),
            Some("https://t.me/c/1234567890/12")
        );
    }

    #[tokio::test]
    async fn own_and_non_channel_traffic_is_ignored() {
        let platform = Arc::new(FakePlatform::default());
        platform.set_link(CHANNEL, DISCUSSION);
        let (r, _) = resolver(platform.clone());

        let mut own = post(1, text("mine"));
        own.outgoing = true;
        assert!(r.resolve(own).await.is_none());

        let mut group = post(2, text("user message"));
        group.is_channel_post = false;
        assert!(r.resolve(group).await.is_none());
        assert_eq!(platform.link_lookups(), 0);
    }

    #[tokio::test]
    async fn empty_or_textless_posts_are_dropped() {
        let platform = Arc::new(FakePlatform::default());
        platform.set_link(CHANNEL, DISCUSSION);
        let (r, _) = resolver(platform);

        assert!(r.resolve(post(1, text("   "))).await.is_none());
        assert!(r.resolve(post(2, PostContent::Other)).await.is_none());
        assert!(r
            .resolve(post(3, PostContent::Video { caption: None }))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn photo_caption_and_image_are_extracted() {
        let platform = Arc::new(FakePlatform::default());
        platform.set_link(CHANNEL, DISCUSSION);
        platform.set_image("file-1", "data:image/jpeg;base64,AAAA");
        let (r, _) = resolver(platform);

        let c = r
            .resolve(post(
                4,
                PostContent::Photo {
                    caption: Some("look".to_string()),
                    file: Some(FileRef("file-1".to_string())),
                },
            ))
            .await
            .unwrap();
        assert_eq!(c.text, "look");
        assert_eq!(c.image.as_deref(), Some("data:image/jpeg;base64,AAAA"));
        assert_eq!(c.channel_title, "");
    }

    #[tokio::test]
    async fn failed_image_download_keeps_candidate() {
        let platform = Arc::new(FakePlatform::default());
        platform.set_link(CHANNEL, DISCUSSION);
        let (r, _) = resolver(platform);

        let c = r
            .resolve(post(
                4,
                PostContent::Photo {
                    caption: Some("look".to_string()),
                    file: Some(FileRef("missing".to_string())),
                },
            ))
            .await
            .unwrap();
        assert_eq!(c.image, None);
    }

    #[tokio::test]
    async fn joins_discussion_when_not_a_member() {
        let platform = Arc::new(FakePlatform::default());
        platform.set_link(CHANNEL, DISCUSSION);
        platform.set_member(DISCUSSION, false);
        let (r, state) = resolver(platform.clone());

        r.resolve(post(1, text("hi"))).await.unwrap();
        assert_eq!(platform.joined(), vec![DISCUSSION]);
        assert!(!state.blocked.is_blocked(DISCUSSION));
    }

    #[tokio::test]
    async fn pending_join_blocks_chat_and_suppresses_retries() {
        let platform = Arc::new(FakePlatform::default());
        platform.set_link(CHANNEL, DISCUSSION);
        platform.set_member(DISCUSSION, false);
        platform.fail_join(DISCUSSION, JoinFailure::Pending);
        let (r, state) = resolver(platform.clone());

        r.resolve(post(1, text("hi"))).await;
        assert!(state.blocked.is_blocked(DISCUSSION));

        // A blocked chat is not joined again; a successful join would have recorded it.
        platform.fail_join(DISCUSSION, JoinFailure::Other);
        r.resolve(post(2, text("hi"))).await;
        assert!(platform.joined().is_empty());
        assert!(state.blocked.is_blocked(DISCUSSION));
    }

    #[tokio::test]
    async fn rate_limited_join_blocks_but_generic_failure_does_not() {
        let platform = Arc::new(FakePlatform::default());
        let other = ChatId(-3003);
        platform.set_link(CHANNEL, DISCUSSION);
        platform.set_link(ChatId(-1002), other);
        platform.set_member(DISCUSSION, false);
        platform.set_member(other, false);
        platform.fail_join(DISCUSSION, JoinFailure::RateLimited);
        platform.fail_join(other, JoinFailure::Other);
        let (r, state) = resolver(platform.clone());

        r.resolve(post(1, text("hi"))).await;
        let mut p = post(2, text("hi"));
        p.channel_id = ChatId(-1002);
        r.resolve(p).await;

        assert!(state.blocked.is_blocked(DISCUSSION));
        assert!(!state.blocked.is_blocked(other));
    }
}
