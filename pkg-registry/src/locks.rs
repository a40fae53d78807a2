//! Per-package mutual exclusion for mutating operations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held for the duration of one mutating operation on a package.
pub type PackageGuard = OwnedMutexGuard<()>;

/// Map of async locks keyed by package name.
///
/// Entries hold only weak references, so a package nobody is mutating costs
/// nothing once its last guard drops; dead entries are pruned on the next
/// acquisition.
#[derive(Debug, Default)]
pub struct PackageLocks {
    locks: Mutex<HashMap<String, Weak<AsyncMutex<()>>>>,
}

impl PackageLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `package`. Released when the guard drops,
    /// including when the awaiting future is cancelled.
    pub async fn acquire(&self, package: &str) -> PackageGuard {
        let lock = self.lock_for(package);
        lock.lock_owned().await
    }

    /// Number of packages with a live lock.
    pub fn active(&self) -> usize {
        self.map().values().filter(|weak| weak.strong_count() > 0).count()
    }

    fn lock_for(&self, package: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.map();
        locks.retain(|_, weak| weak.strong_count() > 0);

        if let Some(lock) = locks.get(package).and_then(Weak::upgrade) {
            return lock;
        }

        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(package.to_string(), Arc::downgrade(&lock));
        lock
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, Weak<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_package_is_exclusive() {
        let locks = Arc::new(PackageLocks::new());
        let guard = locks.acquire("agent").await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.acquire("agent").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_other_packages_do_not_block() {
        let locks = PackageLocks::new();
        let _first = locks.acquire("first").await;

        let second =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire("second")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = PackageLocks::new();
        {
            let _a = locks.acquire("a").await;
            let _b = locks.acquire("b").await;
            assert_eq!(locks.active(), 2);
        }
        assert_eq!(locks.active(), 0);

        let _c = locks.acquire("c").await;
        assert_eq!(locks.map().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_nothing_it_did_not_hold() {
        let locks = PackageLocks::new();
        let guard = locks.acquire("agent").await;

        let waited = tokio::time::timeout(Duration::from_millis(20), locks.acquire("agent")).await;
        assert!(waited.is_err());

        drop(guard);
        let reacquired =
            tokio::time::timeout(Duration::from_millis(100), locks.acquire("agent")).await;
        assert!(reacquired.is_ok());
    }
}
