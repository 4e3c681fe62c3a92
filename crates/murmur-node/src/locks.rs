use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use murmur_shared::types::ChannelMemberId;

/// One async lock per channel member, so that a member's ratchet is only
/// ever advanced by one pipeline at a time. Entries live only while some
/// task holds or waits for them.
#[derive(Debug, Default)]
pub(crate) struct MemberLocks {
    inner: Mutex<HashMap<ChannelMemberId, Arc<AsyncMutex<()>>>>,
}

/// Exclusive access to one member until dropped.
pub(crate) struct MemberTurn<'a> {
    locks: &'a MemberLocks,
    member: ChannelMemberId,
    lock: Arc<AsyncMutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl MemberLocks {
    pub(crate) async fn acquire(&self, member: ChannelMemberId) -> MemberTurn<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(member).or_default().clone()
        };
        let guard = lock.clone().lock_owned().await;
        MemberTurn {
            locks: self,
            member,
            lock,
            guard: Some(guard),
        }
    }
}

impl Drop for MemberTurn<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // only the map and this turn still point at the lock
        if Arc::strong_count(&self.lock) == 2 {
            map.remove(&self.member);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracked(locks: &MemberLocks) -> usize {
        locks.inner.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_same_member_is_exclusive() {
        let locks = MemberLocks::default();
        let member = ChannelMemberId::new();

        let held = locks.acquire(member).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire(member)).await;
        assert!(blocked.is_err());

        // other members are unaffected
        let _other = locks.acquire(ChannelMemberId::new()).await;

        drop(held);
        let _again = locks.acquire(member).await;
    }

    #[tokio::test]
    async fn test_released_members_are_forgotten() {
        let locks = Arc::new(MemberLocks::default());
        let member = ChannelMemberId::new();

        drop(locks.acquire(member).await);
        assert_eq!(tracked(&locks), 0);

        // a waiting task keeps the entry alive past the holder's release
        let held = locks.acquire(member).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _turn = locks.acquire(member).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(tracked(&locks), 1);

        waiter.await.unwrap();
        assert_eq!(tracked(&locks), 0);
    }
}
