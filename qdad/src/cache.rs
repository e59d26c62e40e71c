//! Soft-state caches: seen requests (flood dedup) and reverse routes.
//!
//! Both caches are bounded and every entry carries an absolute expiry time.
//! Expiry is polled rather than timer driven: the node calls
//! [`CacheStore::purge_expired`] on every tick and inbound frame, and lookups
//! treat an entry whose `expires_at <= now` as already gone. Removing an
//! entry therefore never leaves a callback behind.
//!
//! When a cache is full of live entries, inserts fail with
//! [`CacheError::Full`]. Nothing is evicted early; the caller logs and moves on.

use hashbrown::HashMap;

use crate::time::Timestamp;
use crate::types::Address;

/// Cache insert failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// Every slot holds a live entry.
    #[error("cache full ({capacity} live entries)")]
    Full { capacity: usize },
}

/// Shrink threshold: 1/16 of capacity, at least 1.
const fn shrink_threshold(capacity: usize) -> u8 {
    let threshold = capacity / 16;
    if threshold == 0 {
        1
    } else if threshold > u8::MAX as usize {
        u8::MAX
    } else {
        threshold as u8
    }
}

#[derive(Clone, Debug)]
struct Slot<V> {
    value: V,
    expires_at: Timestamp,
}

/// Bounded map whose entries expire at a fixed time.
///
/// The backing table grows on demand and is shrunk after a run of removals,
/// so a cache sized for a burst does not pin its peak memory forever.
pub struct ExpiringCache<K, V> {
    slots: HashMap<K, Slot<V>>,
    capacity: usize,
    removals_since_insert: u8,
    shrink_threshold: u8,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + core::hash::Hash + Copy,
{
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            capacity,
            removals_since_insert: 0,
            shrink_threshold: shrink_threshold(capacity),
        }
    }

    /// Insert or refresh `key`.
    ///
    /// A refresh replaces the value and expiry in place and always succeeds.
    /// A new key needs a free slot; expired entries are reclaimed first.
    pub fn insert(
        &mut self,
        key: K,
        value: V,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<(), CacheError> {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.value = value;
            slot.expires_at = expires_at;
            return Ok(());
        }

        if self.slots.len() >= self.capacity {
            self.purge_expired(now);
            if self.slots.len() >= self.capacity {
                return Err(CacheError::Full {
                    capacity: self.capacity,
                });
            }
        }

        self.removals_since_insert = 0;
        self.slots.insert(key, Slot { value, expires_at });
        Ok(())
    }

    /// Live value for `key`.
    pub fn get(&self, key: &K, now: Timestamp) -> Option<&V> {
        self.slots
            .get(key)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| &slot.value)
    }

    pub fn contains(&self, key: &K, now: Timestamp) -> bool {
        self.get(key, now).is_some()
    }

    /// Expiry time of `key`, live or not.
    pub fn expires_at(&self, key: &K) -> Option<Timestamp> {
        self.slots.get(key).map(|slot| slot.expires_at)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = self.slots.remove(key).map(|slot| slot.value);
        if removed.is_some() {
            self.count_removals(1);
        }
        removed
    }

    /// Drop every entry with `expires_at <= now`. Returns how many went.
    pub fn purge_expired(&mut self, now: Timestamp) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        let removed = before - self.slots.len();
        self.count_removals(removed);
        removed
    }

    /// Earliest expiry among stored entries.
    pub fn next_expiry(&self) -> Option<Timestamp> {
        self.slots.values().map(|slot| slot.expires_at).min()
    }

    /// Number of stored entries, including any not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate `(key, value, expires_at)` over stored entries.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V, Timestamp)> {
        self.slots
            .iter()
            .map(|(k, slot)| (k, &slot.value, slot.expires_at))
    }

    fn count_removals(&mut self, removed: usize) {
        if removed == 0 {
            return;
        }
        let removed_u8 = removed.min(u8::MAX as usize) as u8;
        self.removals_since_insert = self.removals_since_insert.saturating_add(removed_u8);
        if self.removals_since_insert >= self.shrink_threshold {
            self.slots.shrink_to_fit();
            self.removals_since_insert = 0;
        }
    }
}

/// Requests already relayed, keyed by `(originator, requested)`.
pub struct SeenRequests {
    inner: ExpiringCache<(Address, Address), ()>,
}

impl SeenRequests {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: ExpiringCache::with_capacity(capacity),
        }
    }

    /// Was this pair relayed within its dedup lifetime?
    pub fn contains(&self, originator: Address, requested: Address, now: Timestamp) -> bool {
        self.inner.contains(&(originator, requested), now)
    }

    pub fn record(
        &mut self,
        originator: Address,
        requested: Address,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<(), CacheError> {
        self.inner
            .insert((originator, requested), (), expires_at, now)
    }

    pub fn cache(&self) -> &ExpiringCache<(Address, Address), ()> {
        &self.inner
    }
}

/// Next hop back toward each flood originator.
///
/// One entry per originator: re-recording refreshes the neighbor and expiry,
/// so a lookup always returns the most recent path.
pub struct ReverseRoutes {
    inner: ExpiringCache<Address, Address>,
}

impl ReverseRoutes {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: ExpiringCache::with_capacity(capacity),
        }
    }

    /// Neighbor to hand a packet for `originator` to.
    pub fn next_hop(&self, originator: Address, now: Timestamp) -> Option<Address> {
        self.inner.get(&originator, now).copied()
    }

    pub fn record(
        &mut self,
        originator: Address,
        next_hop: Address,
        expires_at: Timestamp,
        now: Timestamp,
    ) -> Result<(), CacheError> {
        self.inner.insert(originator, next_hop, expires_at, now)
    }

    pub fn cache(&self) -> &ExpiringCache<Address, Address> {
        &self.inner
    }
}

/// Both caches of a node.
pub struct CacheStore {
    pub seen: SeenRequests,
    pub routes: ReverseRoutes,
}

impl CacheStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: SeenRequests::with_capacity(capacity),
            routes: ReverseRoutes::with_capacity(capacity),
        }
    }

    /// Purge expired entries from both caches.
    pub fn purge_expired(&mut self, now: Timestamp) -> usize {
        self.seen.inner.purge_expired(now) + self.routes.inner.purge_expired(now)
    }

    /// Earliest expiry across both caches.
    pub fn next_expiry(&self) -> Option<Timestamp> {
        match (self.seen.inner.next_expiry(), self.routes.inner.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
