use std::{fmt, future::Future, sync::Arc};

use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::{
    delivery::{
        delay::{draw_delay, pause, typing_duration},
        notify::post_link,
        AccountState, DeliverySettings,
    },
    domain::{Candidate, ChatId},
    generation::{retry::RetryingGenerator, CommentRequest},
    platform::{port::ChatPlatform, types::ChatAction},
    Error, Result,
};

/// Why a candidate ended without a send. Benign, never an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
    ChatBlocked,
    NotMember,
    CannotSend,
    EmptyReply,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::Duplicate => "duplicate",
            SkipReason::ChatBlocked => "chat blocked",
            SkipReason::NotMember => "not a member",
            SkipReason::CannotSend => "cannot send to chat",
            SkipReason::EmptyReply => "empty reply",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent { permalink: Option<String> },
    Skipped(SkipReason),
}

/// Delivery state machine for one account.
///
/// dedupe -> eligibility -> generate -> humanization delay -> typing ->
/// throttle -> eligibility again -> send -> notify owner.
pub struct Sender {
    platform: Arc<dyn ChatPlatform>,
    generator: RetryingGenerator,
    settings: DeliverySettings,
    state: Arc<AccountState>,
}

impl Sender {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        generator: RetryingGenerator,
        settings: DeliverySettings,
        state: Arc<AccountState>,
    ) -> Self {
        Self {
            platform,
            generator,
            settings,
            state,
        }
    }

    pub fn state(&self) -> &Arc<AccountState> {
        &self.state
    }

    pub fn is_rate_limited(&self) -> bool {
        self.state.limited.is_set()
    }

    pub async fn send_comment(
        &self,
        candidate: &Candidate,
        cancel: &CancellationToken,
    ) -> Result<Delivery> {
        let chat_id = candidate.chat_id.0;
        let thread_id = candidate.thread_id.0;

        if !self
            .state
            .guard
            .allow(candidate.chat_id, candidate.thread_id)
        {
            tracing::info!(chat_id, thread_id, "skip comment: thread already handled");
            return Ok(Delivery::Skipped(SkipReason::Duplicate));
        }

        if let Some(reason) = self.check_eligible(candidate.chat_id, cancel).await? {
            tracing::info!(chat_id, thread_id, %reason, "skip comment");
            return Ok(Delivery::Skipped(reason));
        }

        let req = CommentRequest {
            text: candidate.text.clone(),
            image: candidate.image.clone(),
        };
        let reply = match self.generator.generate(&req, cancel).await {
            Ok(r) => r.trim().to_string(),
            Err(e) => {
                tracing::error!(chat_id, thread_id, error = %e, "comment generation failed");
                return Err(e);
            }
        };
        if reply.is_empty() {
            tracing::info!(chat_id, thread_id, "skip comment: empty generation result");
            return Ok(Delivery::Skipped(SkipReason::EmptyReply));
        }

        let delay = draw_delay(
            &mut rand::thread_rng(),
            self.settings.min_delay,
            self.settings.max_delay,
        );
        let planned_at = chrono::Duration::from_std(delay)
            .map(|d| (Local::now() + d).format("%H:%M:%S").to_string())
            .unwrap_or_default();
        tracing::info!(
            chat_id,
            thread_id,
            delay_secs = delay.as_secs(),
            planned_at = %planned_at,
            comment = %reply,
            "planned comment delay"
        );

        if let Err(e) = pause(delay, cancel).await {
            tracing::warn!(chat_id, thread_id, "comment cancelled during delay");
            return Err(e);
        }

        // Typing precedes the throttle stamp; sends stay `min_interval` apart.
        if self.settings.simulate_typing {
            self.simulate_typing(candidate, &reply, cancel).await?;
        }

        if let Err(e) = self.state.throttle.wait(cancel).await {
            tracing::warn!(chat_id, thread_id, "comment cancelled during throttle wait");
            return Err(e);
        }

        // Membership or permissions may have changed during the delay.
        if let Some(reason) = self.check_eligible(candidate.chat_id, cancel).await? {
            tracing::info!(chat_id, thread_id, %reason, "skip comment after delay");
            return Ok(Delivery::Skipped(reason));
        }

        let sent = cancellable(
            self.platform
                .send_message(candidate.chat_id, candidate.thread_id, &reply),
            cancel,
        )
        .await
        .and_then(|r| r);
        if let Err(e) = sent {
            if matches!(e, Error::RateLimited) && self.state.limited.set() {
                tracing::error!(chat_id, thread_id, "account rate-limited, stopping further comments");
            }
            tracing::error!(chat_id, thread_id, error = %e, "send comment failed");
            return Err(e);
        }
        tracing::info!(chat_id, thread_id, "comment sent");

        let notified = cancellable(
            self.state
                .notifier
                .notify(self.platform.as_ref(), candidate, &reply),
            cancel,
        )
        .await
        .and_then(|r| r);
        if let Err(e) = notified {
            tracing::warn!(chat_id, thread_id, error = %e, "owner notification failed");
        }

        Ok(Delivery::Sent {
            permalink: post_link(candidate.channel_id, candidate.post_id),
        })
    }

    /// `Ok(None)` when the chat is acceptable, `Ok(Some(reason))` for a benign skip.
    ///
    /// A latched rate limit is an error, not a skip.
    async fn check_eligible(
        &self,
        chat: ChatId,
        cancel: &CancellationToken,
    ) -> Result<Option<SkipReason>> {
        if self.state.limited.is_set() {
            tracing::warn!(chat_id = chat.0, "skip comment: account is rate-limited");
            return Err(Error::RateLimited);
        }
        if self.state.blocked.is_blocked(chat) {
            return Ok(Some(SkipReason::ChatBlocked));
        }
        if !cancellable(self.platform.is_member(chat), cancel).await? {
            return Ok(Some(SkipReason::NotMember));
        }
        if !cancellable(self.platform.can_send_to_chat(chat), cancel).await? {
            return Ok(Some(SkipReason::CannotSend));
        }
        Ok(None)
    }

    async fn simulate_typing(
        &self,
        candidate: &Candidate,
        reply: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Cosmetic: a failed chat action never fails the delivery.
        let action = self
            .platform
            .send_chat_action(candidate.chat_id, candidate.thread_id, ChatAction::Typing);
        if let Err(e) = cancellable(action, cancel).await? {
            tracing::warn!(chat_id = candidate.chat_id.0, error = %e, "typing action failed");
            return Ok(());
        }
        pause(typing_duration(reply), cancel).await
    }
}

/// Await a platform call unless `cancel` fires first.
async fn cancellable<F: Future>(fut: F, cancel: &CancellationToken) -> Result<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        out = fut => Ok(out),
    }
}
