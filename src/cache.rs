//! Bounded TTL cache from token fingerprints to authenticated users.
//!
//! The cache is the hot path for repeat authentications of the same JWT.
//! Keys are SHA-256 digests of the raw token bytes; values carry the user and
//! the adjusted JWT expiry so a JWT expiring before its cache entry is still
//! noticed at lookup time.
//!
//! Locking discipline: `get` only takes the map's read lock. All mutations
//! (`put`, `remove_if`, `invalidate_all`) serialize on a dedicated update
//! lock before touching the map, so full-scan eviction is linearizable with
//! respect to inserts while lookups of unrelated keys stay unblocked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::types::ExpiringUser;

/// SHA-256 digest of the raw serialized JWT bytes.
///
/// Two distinct JWTs collide with negligible probability and are treated as
/// the same credential if they ever do. The digest is never logged; `Debug`
/// output is redacted.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenFingerprint([u8; 32]);

impl TokenFingerprint {
    /// Fingerprint the raw serialized JWT.
    pub fn of(serialized_jwt: &[u8]) -> Self {
        Self(Sha256::digest(serialized_jwt).into())
    }
}

impl std::fmt::Debug for TokenFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenFingerprint(<redacted>)")
    }
}

struct CacheSlot {
    value: ExpiringUser,
    written_at: Instant,
    last_access: AtomicU64,
}

/// Bounded, TTL-expiring map from [`TokenFingerprint`] to [`ExpiringUser`].
///
/// Entries expire after write (`ttl`) and the least-recently-accessed entry
/// is evicted when the size bound is exceeded. TTL expiry is observed at
/// lookup; physical removal is best-effort and deferred to the next insert
/// overflow or explicit eviction.
pub struct JwtCache {
    ttl: Duration,
    max_size: usize,
    map: RwLock<HashMap<TokenFingerprint, CacheSlot>>,
    update_lock: Mutex<()>,
    tick: AtomicU64,
}

impl JwtCache {
    /// Create a cache with the given expire-after-write TTL and size bound.
    /// Both must be non-zero; disabled configurations are represented by not
    /// constructing a cache at all.
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        debug_assert!(ttl > Duration::ZERO && max_size > 0);
        Self {
            ttl,
            max_size,
            map: RwLock::new(HashMap::new()),
            update_lock: Mutex::new(()),
            tick: AtomicU64::new(0),
        }
    }

    /// Look up an entry. TTL-expired entries read as misses.
    ///
    /// Takes only the read lock and does not block inserts of unrelated keys.
    pub fn get(&self, key: &TokenFingerprint) -> Option<ExpiringUser> {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        let slot = map.get(key)?;
        if slot.written_at.elapsed() >= self.ttl {
            return None;
        }
        slot.last_access
            .store(self.tick.fetch_add(1, Ordering::Relaxed), Ordering::Relaxed);
        Some(slot.value.clone())
    }

    /// Insert an entry, evicting if the size bound is exceeded.
    ///
    /// Serializes on the update lock, so it is linearizable with respect to
    /// [`remove_if`](Self::remove_if) and [`invalidate_all`](Self::invalidate_all).
    pub fn put(&self, key: TokenFingerprint, value: ExpiringUser) {
        let _update = self.update_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        let now_tick = self.tick.fetch_add(1, Ordering::Relaxed);
        map.insert(
            key,
            CacheSlot {
                value,
                written_at: Instant::now(),
                last_access: AtomicU64::new(now_tick),
            },
        );
        if map.len() > self.max_size {
            // Drop TTL-expired entries first; if still over, drop the
            // least-recently-accessed one.
            let ttl = self.ttl;
            map.retain(|_, slot| slot.written_at.elapsed() < ttl);
            while map.len() > self.max_size {
                let oldest = map
                    .iter()
                    .min_by_key(|(_, slot)| slot.last_access.load(Ordering::Relaxed))
                    .map(|(key, _)| *key);
                match oldest {
                    Some(key) => map.remove(&key),
                    None => break,
                };
            }
        }
    }

    /// Evict every entry matching the predicate.
    ///
    /// Holds the update lock for the duration of the iteration.
    pub fn remove_if(&self, mut predicate: impl FnMut(&ExpiringUser) -> bool) {
        let _update = self.update_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.retain(|_, slot| !predicate(&slot.value));
    }

    /// Clear all entries, under the update lock.
    pub fn invalidate_all(&self) {
        let _update = self.update_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        map.clear();
    }

    /// Approximate entry count; does not block writers beyond the read lock.
    pub fn count(&self) -> usize {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for JwtCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCache")
            .field("ttl", &self.ttl)
            .field("max_size", &self.max_size)
            .field("count", &self.count())
            .finish()
    }
}
