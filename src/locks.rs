use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Keyed in-process locks with a TTL.
///
/// Guards the short critical sections of answer submission
/// (`answer:{pin}:{connection}`), archival (`archive:{pin}`), and joins
/// (`join:{pin}:{nickname}`). A holder that never releases (crashed task,
/// lost callback) does not wedge the key: acquiring an expired lock
/// succeeds.
pub struct ExpiringLockMap {
    ttl: Duration,
    // key -> expiry instant
    locks: Mutex<HashMap<String, Instant>>,
}

impl ExpiringLockMap {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Try to take the lock. Returns false while a live holder exists.
    pub async fn try_acquire(&self, key: &str) -> bool {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        match locks.get(key) {
            Some(expires_at) if *expires_at > now => false,
            _ => {
                locks.insert(key.to_string(), now + self.ttl);
                true
            }
        }
    }

    /// Idempotent release.
    pub async fn release(&self, key: &str) {
        self.locks.lock().await.remove(key);
    }

    /// Release every lock whose key starts with `prefix` (used to clear all
    /// pending-answer locks for a room). Returns how many were dropped.
    pub async fn release_prefix(&self, prefix: &str) -> usize {
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|key, _| !key.starts_with(prefix));
        before - locks.len()
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut locks = self.locks.lock().await;
        let now = Instant::now();
        let before = locks.len();
        locks.retain(|_, expires_at| *expires_at > now);
        before - locks.len()
    }

    pub async fn is_locked(&self, key: &str) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(key)
            .is_some_and(|expires_at| *expires_at > Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_blocks_second_holder() {
        let locks = ExpiringLockMap::new(Duration::from_secs(10));
        assert!(locks.try_acquire("answer:042137:abc").await);
        assert!(!locks.try_acquire("answer:042137:abc").await);
        assert!(locks.try_acquire("answer:042137:def").await);
    }

    #[tokio::test]
    async fn release_frees_the_key() {
        let locks = ExpiringLockMap::new(Duration::from_secs(10));
        assert!(locks.try_acquire("archive:042137").await);
        locks.release("archive:042137").await;
        assert!(locks.try_acquire("archive:042137").await);
    }

    #[tokio::test]
    async fn expired_lock_can_be_reacquired() {
        let locks = ExpiringLockMap::new(Duration::from_millis(20));
        assert!(locks.try_acquire("join:042137:ada").await);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(locks.try_acquire("join:042137:ada").await);
    }

    #[tokio::test]
    async fn prefix_release_scopes_to_room() {
        let locks = ExpiringLockMap::new(Duration::from_secs(10));
        locks.try_acquire("answer:042137:a").await;
        locks.try_acquire("answer:042137:b").await;
        locks.try_acquire("answer:999999:c").await;

        assert_eq!(locks.release_prefix("answer:042137:").await, 2);
        assert!(locks.try_acquire("answer:042137:a").await);
        assert!(!locks.try_acquire("answer:999999:c").await);
    }

    #[tokio::test]
    async fn cleanup_counts_expired() {
        let locks = ExpiringLockMap::new(Duration::from_millis(10));
        locks.try_acquire("a").await;
        locks.try_acquire("b").await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(locks.cleanup_expired().await, 2);
        assert!(!locks.is_locked("a").await);
    }
}
