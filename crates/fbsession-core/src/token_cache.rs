//! Bounded FIFO cache of issued access tokens, keyed by user id
//!
//! Insertion is insert-if-newer: a token never replaces one with a later
//! expiry. Eviction follows insertion order, not access recency. Each insert
//! enqueues a record; a record is only allowed to evict the map entry it
//! created, so a stale record cannot remove a token refreshed after it.
//!
//! Expiry is not filtered on lookup; callers apply [`is_token_valid`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::metrics;

/// Default capacity, 2^16 entries.
pub const DEFAULT_TOKEN_CACHE_CAPACITY: usize = 256 * 256;

/// Expiry used for tokens that do not expire.
pub const NEVER_EXPIRES: i64 = i64::MAX;

/// Current time in epoch seconds.
pub fn now_unix_seconds() -> i64 {
    Utc::now().timestamp()
}

/// A token is valid iff `now` is strictly before its expiry.
#[inline]
pub fn is_token_valid(expires_at: i64, now: i64) -> bool {
    now < expires_at
}

/// Cached token for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTokenEntry {
    pub user_id: String,
    pub token: String,
    pub expires_at: i64,
}

impl CachedTokenEntry {
    /// Check the entry against the current clock.
    pub fn is_valid(&self) -> bool {
        is_token_valid(self.expires_at, now_unix_seconds())
    }
}

#[derive(Debug)]
struct Slot {
    entry: CachedTokenEntry,
    seq: u64,
}

#[derive(Debug)]
struct FifoRecord {
    user_id: String,
    seq: u64,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Slot>,
    fifo: VecDeque<FifoRecord>,
    next_seq: u64,
}

impl Inner {
    fn is_current(&self, record: &FifoRecord) -> bool {
        self.entries
            .get(&record.user_id)
            .is_some_and(|slot| slot.seq == record.seq)
    }
}

/// Process-lifetime token store shared by every resolution.
///
/// Construct one per application and inject it where needed; it is safe to
/// share across tasks behind an `Arc`.
#[derive(Debug)]
pub struct TokenCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_CACHE_CAPACITY)
    }
}

impl TokenCache {
    /// Create a cache holding at most `capacity` users (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of users currently cached.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `token` for `user_id` unless a token with a later expiry is
    /// already cached. Returns whether the cache changed.
    pub fn insert(&self, user_id: &str, token: &str, expires_at: i64) -> bool {
        let mut inner = self.lock();

        if let Some(existing) = inner.entries.get(user_id) {
            if existing.entry.expires_at > expires_at {
                tracing::debug!(user_id, "keeping cached token with later expiry");
                return false;
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            user_id.to_string(),
            Slot {
                entry: CachedTokenEntry {
                    user_id: user_id.to_string(),
                    token: token.to_string(),
                    expires_at,
                },
                seq,
            },
        );
        inner.fifo.push_back(FifoRecord {
            user_id: user_id.to_string(),
            seq,
        });

        self.evict_overflow(&mut inner);
        true
    }

    /// Cached entry for `user_id`, expired or not.
    pub fn lookup(&self, user_id: &str) -> Option<CachedTokenEntry> {
        self.lock()
            .entries
            .get(user_id)
            .map(|slot| slot.entry.clone())
    }

    /// Cached token for `user_id` only if it is still valid at `now`.
    pub fn lookup_valid(&self, user_id: &str, now: i64) -> Option<CachedTokenEntry> {
        match self.lookup(user_id) {
            Some(entry) if is_token_valid(entry.expires_at, now) => {
                metrics::record_cache_lookup(metrics::CacheLookup::Hit);
                Some(entry)
            }
            Some(_) => {
                metrics::record_cache_lookup(metrics::CacheLookup::Expired);
                None
            }
            None => {
                metrics::record_cache_lookup(metrics::CacheLookup::Miss);
                None
            }
        }
    }

    fn evict_overflow(&self, inner: &mut Inner) {
        while inner.entries.len() > self.capacity {
            let Some(record) = inner.fifo.pop_front() else {
                break;
            };
            if inner.is_current(&record) {
                inner.entries.remove(&record.user_id);
                metrics::record_cache_eviction();
            }
        }

        // Refreshes leave stale records behind; drop them before the queue
        // outgrows the map by more than one capacity's worth.
        if inner.fifo.len() > self.capacity.saturating_mul(2) {
            let fifo = std::mem::take(&mut inner.fifo);
            inner.fifo = fifo
                .into_iter()
                .filter(|record| inner.is_current(record))
                .collect();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
