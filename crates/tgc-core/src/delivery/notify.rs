use tokio::sync::Mutex;

use crate::{
    domain::{Candidate, ChatId, ThreadId},
    platform::port::ChatPlatform,
    Result,
};

const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

/// Public `t.me/c/...` link to a post, or `None` when ids are missing.
pub fn post_link(channel: ChatId, post_id: i64) -> Option<String> {
    if channel.0 == 0 || post_id == 0 {
        return None;
    }
    let mut abs = channel.0.unsigned_abs() as i64;
    if abs > CHANNEL_ID_OFFSET {
        abs -= CHANNEL_ID_OFFSET;
    }
    Some(format!("https://t.me/c/{abs}/{post_id}"))
}

/// Owner of the account: either a numeric chat id or a public `@username`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OwnerHandle {
    Id(ChatId),
    Username(String),
}

impl OwnerHandle {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        if let Ok(id) = s.parse::<i64>() {
            return Some(OwnerHandle::Id(ChatId(id)));
        }
        let name = s.trim_start_matches('@');
        if name.is_empty() {
            return None;
        }
        Some(OwnerHandle::Username(format!("@{name}")))
    }
}

/// Sends "comment posted" reports to the account owner.
///
/// The username is resolved on first use and cached for the account's lifetime.
#[derive(Debug)]
pub struct OwnerNotifier {
    owner: Option<OwnerHandle>,
    resolved: Mutex<Option<ChatId>>,
}

impl OwnerNotifier {
    pub fn new(owner: Option<OwnerHandle>) -> Self {
        let resolved = match &owner {
            Some(OwnerHandle::Id(id)) => Some(*id),
            _ => None,
        };
        Self {
            owner,
            resolved: Mutex::new(resolved),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    async fn owner_chat(&self, platform: &dyn ChatPlatform) -> Result<Option<ChatId>> {
        let mut cached = self.resolved.lock().await;
        if let Some(id) = *cached {
            return Ok(Some(id));
        }
        let Some(OwnerHandle::Username(name)) = &self.owner else {
            return Ok(None);
        };
        let id = platform.resolve_username(name).await?;
        *cached = Some(id);
        Ok(Some(id))
    }

    pub async fn notify(
        &self,
        platform: &dyn ChatPlatform,
        candidate: &Candidate,
        reply: &str,
    ) -> Result<()> {
        let Some(owner) = self.owner_chat(platform).await? else {
            return Ok(());
        };
        let text = render_report(candidate, reply);
        platform.send_message(owner, ThreadId(0), &text).await
    }
}

fn render_report(candidate: &Candidate, reply: &str) -> String {
    let mut out = format!("💬 New comment:\n\n{reply}\n\nOn post: {}", candidate.text);
    if !candidate.channel_title.is_empty() {
        out.push_str(&format!("\n\nChannel: {}", candidate.channel_title));
    }
    if let Some(link) = post_link(candidate.channel_id, candidate.post_id) {
        out.push_str(&format!("\n\nLink: {link}"));
    }
    out
}
