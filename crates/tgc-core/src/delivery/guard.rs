use std::{collections::HashSet, sync::Mutex};

use crate::domain::{ChatId, ThreadId, ThreadKey};

/// Append-only set of thread keys that already had a delivery attempt.
///
/// A key is consumed by the first attempt regardless of its outcome.
#[derive(Debug, Default)]
pub struct DuplicateGuard {
    seen: Mutex<HashSet<ThreadKey>>,
}

impl DuplicateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-and-insert. Returns `true` only for the first caller per key.
    pub fn allow(&self, chat_id: ChatId, thread_id: ThreadId) -> bool {
        let key = ThreadKey::new(chat_id, thread_id);
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
