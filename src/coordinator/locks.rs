use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::order::OrderId;

type LockMap = HashMap<OrderId, Arc<Mutex<()>>>;

/// Per-order async mutexes, created on first use and dropped when idle.
///
/// Holding an `OrderLockGuard` serializes every read-modify-write on that
/// order. Different orders never contend.
#[derive(Clone, Default)]
pub struct OrderLocks {
    slots: Arc<StdMutex<LockMap>>,
}

pub struct OrderLockGuard {
    order_id: OrderId,
    slots: Arc<StdMutex<LockMap>>,
    guard: OwnedMutexGuard<()>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, order_id: &OrderId) -> OrderLockGuard {
        let slot = {
            let mut slots = lock_map(&self.slots);
            slots.entry(order_id.clone()).or_default().clone()
        };

        let guard = slot.lock_owned().await;
        OrderLockGuard {
            order_id: order_id.clone(),
            slots: self.slots.clone(),
            guard,
        }
    }

    /// Number of orders with a live lock entry
    pub fn active(&self) -> usize {
        lock_map(&self.slots).len()
    }
}

impl Drop for OrderLockGuard {
    fn drop(&mut self) {
        let mut slots = lock_map(&self.slots);
        let ours = OwnedMutexGuard::mutex(&self.guard);

        // Only the map and this guard still reference the mutex: nobody is waiting
        let idle = slots
            .get(&self.order_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, ours) && Arc::strong_count(slot) == 2);
        if idle {
            slots.remove(&self.order_id);
        }
    }
}

fn lock_map(slots: &StdMutex<LockMap>) -> StdMutexGuard<'_, LockMap> {
    // The map is only touched in short non-panicking sections
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
