//! Per-account delivery engine: dedupe, eligibility, pacing, sending.

pub mod blocked;
pub mod delay;
pub mod guard;
pub mod latch;
pub mod notify;
pub mod sender;
pub mod throttle;

use std::time::Duration;

use crate::generation::retry::RetryPolicy;

use self::{
    blocked::BlockedChatCache,
    guard::DuplicateGuard,
    latch::StickyFlag,
    notify::{OwnerHandle, OwnerNotifier},
    throttle::AccountThrottle,
};

/// Plain timing/retry values the engine is constructed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliverySettings {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub min_interval: Duration,
    pub block_ttl: Duration,
    pub retry: RetryPolicy,
    pub simulate_typing: bool,
    /// Admission capacity: concurrently in-flight deliveries per account.
    pub max_in_flight: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            min_delay: delay::DEFAULT_MIN_DELAY,
            max_delay: delay::DEFAULT_MAX_DELAY,
            min_interval: throttle::DEFAULT_MIN_INTERVAL,
            block_ttl: blocked::DEFAULT_BLOCK_TTL,
            retry: RetryPolicy::default(),
            simulate_typing: true,
            max_in_flight: 50,
        }
    }
}

/// Mutable state private to one account. Never shared across accounts.
#[derive(Debug)]
pub struct AccountState {
    pub guard: DuplicateGuard,
    pub blocked: BlockedChatCache,
    pub throttle: AccountThrottle,
    pub limited: StickyFlag,
    pub notifier: OwnerNotifier,
}

impl AccountState {
    pub fn new(settings: &DeliverySettings, owner: Option<OwnerHandle>) -> Self {
        Self {
            guard: DuplicateGuard::new(),
            blocked: BlockedChatCache::new(settings.block_ttl),
            throttle: AccountThrottle::new(settings.min_interval),
            limited: StickyFlag::new(),
            notifier: OwnerNotifier::new(owner),
        }
    }
}
