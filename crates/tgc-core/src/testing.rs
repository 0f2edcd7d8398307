//! In-memory fakes shared by the core's unit tests.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{
    sync::{mpsc, Semaphore},
    time::{sleep, Instant},
};

use crate::{
    domain::{ChatId, ThreadId},
    generation::{CommentGenerator, CommentRequest},
    platform::{
        port::ChatPlatform,
        types::{ChatAction, FileRef, RawPost},
    },
    Error, Result,
};

#[derive(Clone, Copy, Debug)]
pub(crate) enum JoinFailure {
    Pending,
    RateLimited,
    Other,
}

#[derive(Default)]
struct PlatformState {
    non_members: HashSet<ChatId>,
    muted: HashSet<ChatId>,
    links: HashMap<ChatId, ChatId>,
    titles: HashMap<ChatId, String>,
    usernames: HashMap<String, ChatId>,
    images: HashMap<String, String>,
    join_failures: HashMap<ChatId, JoinFailure>,
    send_failures: VecDeque<Error>,
    sent: Vec<(ChatId, ThreadId, String)>,
    sent_at: Vec<Instant>,
    membership_stall: Option<Duration>,
    send_stall: Option<Duration>,
    joined: Vec<ChatId>,
    joined_channels: Vec<String>,
    chat_actions: usize,
    link_lookups: usize,
    resolves: usize,
    closed: bool,
}

/// Scriptable `ChatPlatform`. Every chat is joinable and writable unless told otherwise.
#[derive(Default)]
pub(crate) struct FakePlatform {
    state: Mutex<PlatformState>,
    feed: Mutex<Option<mpsc::Receiver<RawPost>>>,
}

impl FakePlatform {
    /// Platform whose `listen` yields what is pushed into the returned sender.
    pub(crate) fn with_feed(capacity: usize) -> (Self, mpsc::Sender<RawPost>) {
        let (tx, rx) = mpsc::channel(capacity);
        let p = Self::default();
        *p.feed.lock().unwrap() = Some(rx);
        (p, tx)
    }

    fn st(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn set_member(&self, chat: ChatId, member: bool) {
        let mut st = self.st();
        if member {
            st.non_members.remove(&chat);
        } else {
            st.non_members.insert(chat);
        }
    }

    pub(crate) fn set_can_send(&self, chat: ChatId, can: bool) {
        let mut st = self.st();
        if can {
            st.muted.remove(&chat);
        } else {
            st.muted.insert(chat);
        }
    }

    pub(crate) fn set_link(&self, channel: ChatId, discussion: ChatId) {
        self.st().links.insert(channel, discussion);
    }

    pub(crate) fn set_title(&self, chat: ChatId, title: &str) {
        self.st().titles.insert(chat, title.to_string());
    }

    pub(crate) fn set_username(&self, name: &str, id: ChatId) {
        self.st().usernames.insert(name.to_string(), id);
    }

    pub(crate) fn set_image(&self, file: &str, data_uri: &str) {
        self.st()
            .images
            .insert(file.to_string(), data_uri.to_string());
    }

    pub(crate) fn fail_join(&self, chat: ChatId, failure: JoinFailure) {
        self.st().join_failures.insert(chat, failure);
    }

    pub(crate) fn fail_next_send(&self, err: Error) {
        self.st().send_failures.push_back(err);
    }

    /// Membership queries hang for `d` before answering.
    pub(crate) fn stall_membership(&self, d: Duration) {
        self.st().membership_stall = Some(d);
    }

    /// Sends hang for `d` before going through.
    pub(crate) fn stall_sends(&self, d: Duration) {
        self.st().send_stall = Some(d);
    }

    pub(crate) fn send_times(&self) -> Vec<Instant> {
        self.st().sent_at.clone()
    }

    pub(crate) fn sent(&self) -> Vec<(ChatId, ThreadId, String)> {
        self.st().sent.clone()
    }

    pub(crate) fn sent_to(&self, chat: ChatId) -> Vec<(ChatId, ThreadId, String)> {
        self.st()
            .sent
            .iter()
            .filter(|(c, _, _)| *c == chat)
            .cloned()
            .collect()
    }

    pub(crate) fn joined(&self) -> Vec<ChatId> {
        self.st().joined.clone()
    }

    pub(crate) fn joined_channels(&self) -> Vec<String> {
        self.st().joined_channels.clone()
    }

    pub(crate) fn chat_actions(&self) -> usize {
        self.st().chat_actions
    }

    pub(crate) fn link_lookups(&self) -> usize {
        self.st().link_lookups
    }

    pub(crate) fn resolve_calls(&self) -> usize {
        self.st().resolves
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.st().closed
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn listen(&self) -> Result<mpsc::Receiver<RawPost>> {
        self.feed
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::External("listen called twice".to_string()))
    }

    async fn linked_chat(&self, channel: ChatId) -> Result<Option<ChatId>> {
        let mut st = self.st();
        st.link_lookups += 1;
        Ok(st.links.get(&channel).copied())
    }

    async fn chat_title(&self, chat: ChatId) -> Result<String> {
        self.st()
            .titles
            .get(&chat)
            .cloned()
            .ok_or_else(|| Error::External("chat not found".to_string()))
    }

    async fn fetch_image(&self, file: &FileRef) -> Result<String> {
        self.st()
            .images
            .get(&file.0)
            .cloned()
            .ok_or_else(|| Error::External("file not found".to_string()))
    }

    async fn is_member(&self, chat: ChatId) -> bool {
        let stall = self.st().membership_stall;
        if let Some(d) = stall {
            sleep(d).await;
        }
        !self.st().non_members.contains(&chat)
    }

    async fn can_send_to_chat(&self, chat: ChatId) -> bool {
        let stall = self.st().membership_stall;
        if let Some(d) = stall {
            sleep(d).await;
        }
        !self.st().muted.contains(&chat)
    }

    async fn join_chat(&self, chat: ChatId) -> Result<()> {
        let mut st = self.st();
        let failure = st.join_failures.get(&chat).copied();
        match failure {
            Some(JoinFailure::Pending) => Err(Error::JoinPending),
            Some(JoinFailure::RateLimited) => Err(Error::RateLimited),
            Some(JoinFailure::Other) => Err(Error::External("join failed".to_string())),
            None => {
                st.non_members.remove(&chat);
                st.joined.push(chat);
                Ok(())
            }
        }
    }

    async fn join_channel(&self, handle: &str) -> Result<()> {
        self.st().joined_channels.push(handle.to_string());
        Ok(())
    }

    async fn send_chat_action(
        &self,
        _chat: ChatId,
        _thread: ThreadId,
        _action: ChatAction,
    ) -> Result<()> {
        self.st().chat_actions += 1;
        Ok(())
    }

    async fn send_message(&self, chat: ChatId, thread: ThreadId, text: &str) -> Result<()> {
        let stall = self.st().send_stall;
        if let Some(d) = stall {
            sleep(d).await;
        }
        let mut st = self.st();
        if let Some(err) = st.send_failures.pop_front() {
            return Err(err);
        }
        st.sent.push((chat, thread, text.to_string()));
        st.sent_at.push(Instant::now());
        Ok(())
    }

    async fn resolve_username(&self, username: &str) -> Result<ChatId> {
        let mut st = self.st();
        st.resolves += 1;
        st.usernames
            .get(username)
            .copied()
            .ok_or_else(|| Error::External(format!("username not found: {username}")))
    }

    async fn close(&self) {
        self.st().closed = true;
    }
}

/// Scriptable `CommentGenerator`.
pub(crate) struct FakeGenerator {
    script: Mutex<VecDeque<Result<String>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl FakeGenerator {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(reply.to_string()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Plays `script` in order, then fails with a transport error.
    pub(crate) fn scripted(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    pub(crate) fn always_failing() -> Self {
        Self::scripted(Vec::new())
    }

    /// Each call waits for one permit on `gate` before answering.
    pub(crate) fn gated(reply: &str, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::replying(reply)
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommentGenerator for FakeGenerator {
    async fn generate(&self, _req: &CommentRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(reply) => Ok(reply.clone()),
            None => Err(Error::External("connection refused".to_string())),
        }
    }
}
