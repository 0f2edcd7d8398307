//! Bot API updates -> `RawPost`.

use teloxide::{
    dispatching::{Dispatcher, ShutdownToken, UpdateFilterExt},
    dptree,
    prelude::*,
    types::{Message, UserId},
};
use tokio::sync::mpsc;

use tgc_core::{
    domain::{ChatId, ThreadId},
    platform::types::{DiscussionLink, FileRef, PostContent, RawPost},
};

/// Map the automatic forward of a channel post into its discussion group.
///
/// Replies have to target the discussion copy, so the channel post itself is
/// not used; the forward carries the thread anchor.
pub fn raw_post(msg: &Message, me: UserId) -> Option<RawPost> {
    if !msg.is_automatic_forward() {
        return None;
    }
    let channel = msg.forward_from_chat()?;
    let post_id = msg.forward_from_message_id()?;

    Some(RawPost {
        channel_id: ChatId(channel.id.0),
        post_id: i64::from(post_id),
        discussion: Some(DiscussionLink {
            chat_id: ChatId(msg.chat.id.0),
            thread_id: ThreadId(i64::from(msg.id.0)),
        }),
        outgoing: msg.from().map_or(false, |u| u.id == me),
        is_channel_post: channel.is_channel(),
        content: content(msg),
    })
}

fn content(msg: &Message) -> PostContent {
    let caption = msg.caption().map(str::to_string);
    if let Some(text) = msg.text() {
        PostContent::Text(text.to_string())
    } else if let Some(photos) = msg.photo() {
        PostContent::Photo {
            caption,
            // Sizes are ascending; the last one is the largest.
            file: photos.last().map(|p| FileRef(p.file.id.clone())),
        }
    } else if msg.video().is_some() {
        PostContent::Video { caption }
    } else if msg.document().is_some() {
        PostContent::Document { caption }
    } else {
        PostContent::Other
    }
}

async fn forward(msg: Message, me: UserId, tx: mpsc::Sender<RawPost>) -> ResponseResult<()> {
    let Some(post) = raw_post(&msg, me) else {
        return Ok(());
    };
    if tx.send(post).await.is_err() {
        tracing::debug!(chat_id = msg.chat.id.0, "post dropped: listener gone");
    }
    Ok(())
}

/// Long-poll updates until the returned token is shut down.
pub(crate) fn spawn_polling(
    bot: Bot,
    me: UserId,
    tx: mpsc::Sender<RawPost>,
) -> (ShutdownToken, tokio::task::JoinHandle<()>) {
    let handler = Update::filter_message()
        .filter(|m: Message| m.is_automatic_forward())
        .endpoint(forward);

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![me, tx])
        .default_handler(|_| async {})
        .build();
    let token = dispatcher.shutdown_token();
    let handle = tokio::spawn(async move {
        dispatcher.dispatch().await;
        tracing::debug!("update polling stopped");
    });
    (token, handle)
}
