use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async mutexes, created on demand.
///
/// Entries nobody holds or waits on are pruned on the next acquisition.
#[derive(Debug, Default)]
pub(crate) struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub(crate) async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_same_key_waits_for_holder() {
        let locks = Arc::new(KeyedLocks::default());
        let acquired = Arc::new(AtomicBool::new(false));

        let guard = locks.lock("m1").await;

        let task = {
            let locks = Arc::clone(&locks);
            let acquired = Arc::clone(&acquired);
            tokio::spawn(async move {
                let _guard = locks.lock("m1").await;
                acquired.store(true, Ordering::SeqCst);
            })
        };

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!acquired.load(Ordering::SeqCst));

        // Other keys are independent
        let _other = locks.lock("m2").await;

        drop(guard);
        task.await.unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_released_entries_are_pruned() {
        let locks = KeyedLocks::default();

        drop(locks.lock("a").await);
        drop(locks.lock("b").await);
        drop(locks.lock("c").await);

        // Acquiring prunes every idle entry before inserting the new one
        let _guard = locks.lock("d").await;
        assert_eq!(locks.len().await, 1);
    }
}
