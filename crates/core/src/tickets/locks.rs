use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per key, created on demand and dropped once nobody holds
/// or waits on it.
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self { slots: Mutex::new(HashMap::new()) }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash,
{
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            Arc::clone(slots.entry(key).or_default())
        };
        slot.lock_owned().await
    }

    pub fn active_keys(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| Arc::strong_count(slot) > 1).count()
    }
}

/// Keys that are taken without waiting: a second `try_claim` on a held key
/// fails until the first `Claim` is dropped.
pub struct ClaimSet<K> {
    held: Arc<Mutex<HashSet<K>>>,
}

impl<K> Default for ClaimSet<K> {
    fn default() -> Self {
        Self { held: Arc::new(Mutex::new(HashSet::new())) }
    }
}

impl<K> ClaimSet<K>
where
    K: Clone + Eq + Hash,
{
    pub fn try_claim(&self, key: K) -> Option<Claim<K>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.clone()) {
            return None;
        }
        Some(Claim { held: Arc::clone(&self.held), key })
    }

    pub fn is_claimed(&self, key: &K) -> bool {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).contains(key)
    }
}

pub struct Claim<K>
where
    K: Eq + Hash,
{
    held: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K> Drop for Claim<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::{ClaimSet, KeyedLocks};

    #[tokio::test(start_paused = true)]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::<&'static str>::default());
        let guard = locks.lock("alice").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("alice").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!contender.is_finished(), "second holder must wait for the first");

        drop(guard);
        contender.await.expect("contender should finish once released");
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::default();
        let _alice = locks.lock("alice").await;
        let _bob = locks.lock("bob").await;
        assert_eq!(locks.active_keys(), 2);
    }

    #[tokio::test]
    async fn released_slots_are_pruned() {
        let locks = KeyedLocks::default();
        drop(locks.lock("alice").await);
        let _bob = locks.lock("bob").await;
        assert_eq!(locks.active_keys(), 1);
    }

    #[test]
    fn claims_are_exclusive_until_dropped() {
        let claims = ClaimSet::default();

        let first = claims.try_claim(7_u64).expect("first claim");
        assert!(claims.try_claim(7).is_none());
        assert!(claims.try_claim(8).is_some(), "other keys stay free");
        assert!(claims.is_claimed(&7));

        drop(first);
        assert!(!claims.is_claimed(&7));
        assert!(claims.try_claim(7).is_some());
    }
}
