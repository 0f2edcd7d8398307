use std::{collections::HashMap, sync::Mutex, time::Duration};

use tokio::time::Instant;

use crate::domain::ChatId;

pub const DEFAULT_BLOCK_TTL: Duration = Duration::from_secs(72 * 60 * 60);

/// Chats where a join is known to be pending or throttled.
///
/// Entries only disappear by expiry, observed lazily on read.
#[derive(Debug)]
pub struct BlockedChatCache {
    ttl: Duration,
    /// `None` when the expiry lies beyond the clock's range.
    until: Mutex<HashMap<ChatId, Option<Instant>>>,
}

impl Default for BlockedChatCache {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_TTL)
    }
}

impl BlockedChatCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            until: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_blocked(&self, chat: ChatId) -> bool {
        self.is_blocked_at(chat, Instant::now())
    }

    pub fn is_blocked_at(&self, chat: ChatId, now: Instant) -> bool {
        let mut map = self.until.lock().unwrap_or_else(|p| p.into_inner());
        match map.get(&chat) {
            Some(&expiry) if expiry.map_or(true, |e| now < e) => true,
            Some(_) => {
                map.remove(&chat);
                false
            }
            None => false,
        }
    }

    pub fn block(&self, chat: ChatId) {
        self.block_at(chat, Instant::now());
    }

    pub fn block_at(&self, chat: ChatId, now: Instant) {
        let mut map = self.until.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(chat, now.checked_add(self.ttl));
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.until.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
