//! Per-document mutual exclusion for enforcement runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = Arc<StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

/// Hands out one async mutex per document. Held for the whole load → enforce → write-back
/// sequence so two runs never interleave on the same document. An entry lives only while
/// some run holds or waits for it.
#[derive(Debug, Clone, Default)]
pub struct DocumentLocks {
    inner: LockMap,
}

/// Exclusive access to one document until dropped.
#[derive(Debug)]
pub struct DocumentGuard {
    document_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, document_id: Uuid) -> DocumentGuard {
        // The map lock is never held across an await.
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(document_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        DocumentGuard {
            document_id,
            guard: Some(lock.lock_owned().await),
            locks: self.inner.clone(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for DocumentGuard {
    fn drop(&mut self) {
        // Release first so the count below only sees the map and any waiters.
        drop(self.guard.take());
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if map
            .get(&self.document_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.document_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_document_is_exclusive() {
        let locks = DocumentLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.acquire(id).await;
        let waiting = tokio::time::timeout(Duration::from_millis(50), locks.acquire(id)).await;
        assert!(waiting.is_err());

        drop(guard);
        let reacquired = tokio::time::timeout(Duration::from_millis(50), locks.acquire(id)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_documents_do_not_contend() {
        let locks = DocumentLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(Uuid::new_v4())).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_released_documents_are_forgotten() {
        let locks = DocumentLocks::new();
        for _ in 0..10 {
            let _guard = locks.acquire(Uuid::new_v4()).await;
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_a_run_is_waiting() {
        let locks = DocumentLocks::new();
        let id = Uuid::new_v4();
        let guard = locks.acquire(id).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.tracked(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
