//! Telegram adapter (teloxide).
//!
//! Implements the core `ChatPlatform` port over the Telegram Bot API.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use teloxide::{
    dispatching::ShutdownToken,
    net::Download,
    prelude::*,
    types::{ChatMember, MessageId, Recipient, UserId},
    RequestError,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};

pub mod updates;

use tgc_core::{
    domain::{ChatId, ThreadId},
    errors::Error,
    platform::{
        port::ChatPlatform,
        types::{ChatAction, FileRef, RawPost},
    },
    session_config::SessionConfig,
    supervisor::PlatformFactory,
    Result,
};

const UPDATE_BUFFER: usize = 256;
const MEMBERSHIP_TIMEOUT: Duration = Duration::from_secs(10);

struct Poller {
    token: ShutdownToken,
    handle: JoinHandle<()>,
}

pub struct TelegramPlatform {
    bot: Bot,
    me: UserId,
    poller: Mutex<Option<Poller>>,
}

impl TelegramPlatform {
    pub async fn connect(token: &str) -> Result<Self> {
        let bot = Bot::new(token);
        let me = bot.get_me().await.map_err(map_err)?;
        tracing::info!(username = %me.username(), "connected to Telegram");
        Ok(Self {
            bot,
            me: me.user.id,
            poller: Mutex::new(None),
        })
    }

    fn tg_chat(chat: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat.0)
    }

    async fn member(&self, chat: ChatId) -> Option<ChatMember> {
        let req = self.bot.get_chat_member(Self::tg_chat(chat), self.me).send();
        match tokio::time::timeout(MEMBERSHIP_TIMEOUT, req).await {
            Ok(Ok(m)) => Some(m),
            Ok(Err(e)) => {
                tracing::debug!(chat_id = chat.0, error = %e, "membership lookup failed");
                None
            }
            Err(_) => {
                tracing::warn!(chat_id = chat.0, "membership lookup timed out");
                None
            }
        }
    }

    async fn download(&self, file_id: &str) -> anyhow::Result<(Vec<u8>, String)> {
        let file = self.bot.get_file(file_id.to_string()).await?;
        let mut buf = Vec::with_capacity(file.size as usize);
        self.bot.download_file(&file.path, &mut buf).await?;
        Ok((buf, file.path))
    }
}

/// "Too many requests" becomes `RateLimited`; everything else is external.
pub fn map_err(e: RequestError) -> Error {
    match e {
        RequestError::RetryAfter(_) => Error::RateLimited,
        other => Error::External(format!("telegram error: {other}")),
    }
}

/// Result of a join attempt from the bot's own membership record.
///
/// A throttled lookup stays `RateLimited` so the caller can block the chat.
fn join_outcome(chat: ChatId, res: std::result::Result<ChatMember, RequestError>) -> Result<()> {
    let member = res.map_err(map_err)?;
    if member.kind.is_present() {
        Ok(())
    } else {
        Err(Error::External(format!(
            "bot is not a member of chat {chat} and cannot join by itself"
        )))
    }
}

/// Message a reply should point at; thread 0 is a plain message.
fn reply_target(thread: ThreadId) -> Result<Option<MessageId>> {
    if thread.0 == 0 {
        return Ok(None);
    }
    i32::try_from(thread.0)
        .map(|id| Some(MessageId(id)))
        .map_err(|_| Error::External(format!("thread id out of range: {thread}")))
}

fn data_uri(bytes: &[u8], path: &str) -> String {
    let mime = match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    };
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

/// Public channel handle for a subscription entry; invite links have none.
fn channel_recipient(handle: &str) -> Option<Recipient> {
    let h = handle.trim();
    let name = h
        .strip_prefix("https://t.me/")
        .or_else(|| h.strip_prefix("http://t.me/"))
        .or_else(|| h.strip_prefix("t.me/"))
        .unwrap_or(h);
    if name.starts_with('+') || name.starts_with("joinchat/") {
        return None;
    }
    let name = name.trim_start_matches('@').trim_end_matches('/');
    if name.is_empty() || name.contains('/') {
        return None;
    }
    Some(Recipient::ChannelUsername(format!("@{name}")))
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn listen(&self) -> Result<mpsc::Receiver<RawPost>> {
        let mut poller = self.poller.lock().await;
        if poller.is_some() {
            return Err(Error::External("already listening".to_string()));
        }
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let (token, handle) = updates::spawn_polling(self.bot.clone(), self.me, tx);
        *poller = Some(Poller { token, handle });
        Ok(rx)
    }

    async fn linked_chat(&self, channel: ChatId) -> Result<Option<ChatId>> {
        let chat = self
            .bot
            .get_chat(Self::tg_chat(channel))
            .await
            .map_err(map_err)?;
        Ok(chat.linked_chat_id().map(ChatId))
    }

    async fn chat_title(&self, chat: ChatId) -> Result<String> {
        let chat = self
            .bot
            .get_chat(Self::tg_chat(chat))
            .await
            .map_err(map_err)?;
        Ok(chat.title().unwrap_or_default().to_string())
    }

    async fn fetch_image(&self, file: &FileRef) -> Result<String> {
        let (bytes, path) = self
            .download(&file.0)
            .await
            .map_err(|e| Error::External(format!("image download failed: {e}")))?;
        Ok(data_uri(&bytes, &path))
    }

    async fn is_member(&self, chat: ChatId) -> bool {
        self.member(chat).await.map_or(false, |m| m.kind.is_present())
    }

    async fn can_send_to_chat(&self, chat: ChatId) -> bool {
        self.member(chat)
            .await
            .map_or(false, |m| m.kind.is_present() && m.kind.can_send_messages())
    }

    async fn join_chat(&self, chat: ChatId) -> Result<()> {
        // Bots cannot join on their own; an administrator has to add them.
        let req = self.bot.get_chat_member(Self::tg_chat(chat), self.me).send();
        let res = tokio::time::timeout(MEMBERSHIP_TIMEOUT, req)
            .await
            .map_err(|_| Error::External(format!("membership lookup for chat {chat} timed out")))?;
        join_outcome(chat, res)
    }

    async fn join_channel(&self, handle: &str) -> Result<()> {
        let Some(recipient) = channel_recipient(handle) else {
            return Err(Error::External(format!(
                "cannot follow invite link {handle}: add the bot to the channel"
            )));
        };
        let member = self
            .bot
            .get_chat_member(recipient, self.me)
            .await
            .map_err(map_err)?;
        if member.kind.is_present() {
            Ok(())
        } else {
            Err(Error::External(format!("bot is not subscribed to {handle}")))
        }
    }

    async fn send_chat_action(
        &self,
        chat: ChatId,
        _thread: ThreadId,
        action: ChatAction,
    ) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.bot
            .send_chat_action(Self::tg_chat(chat), tg_action)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn send_message(&self, chat: ChatId, thread: ThreadId, text: &str) -> Result<()> {
        let mut req = self.bot.send_message(Self::tg_chat(chat), text.to_string());
        if let Some(reply) = reply_target(thread)? {
            req = req.reply_to_message_id(reply);
        }
        req.await.map_err(map_err)?;
        Ok(())
    }

    async fn resolve_username(&self, username: &str) -> Result<ChatId> {
        let name = format!("@{}", username.trim().trim_start_matches('@'));
        let chat = self
            .bot
            .get_chat(Recipient::ChannelUsername(name))
            .await
            .map_err(map_err)?;
        Ok(ChatId(chat.id.0))
    }

    async fn close(&self) {
        let Some(poller) = self.poller.lock().await.take() else {
            return;
        };
        match poller.token.shutdown() {
            Ok(done) => done.await,
            Err(_) => poller.handle.abort(),
        }
        if let Err(e) = poller.handle.await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "update poller ended abnormally");
            }
        }
    }
}

/// Opens one Bot API connection per account.
#[derive(Clone, Copy, Debug, Default)]
pub struct TelegramFactory;

#[async_trait]
impl PlatformFactory for TelegramFactory {
    async fn connect(&self, session: &SessionConfig) -> Result<Arc<dyn ChatPlatform>> {
        let platform = TelegramPlatform::connect(&session.bot_token).await?;
        Ok(Arc::new(platform))
    }
}
