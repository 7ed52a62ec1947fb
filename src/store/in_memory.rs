use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{sort_newest_first, OrderStore, StoreError};
use crate::domain::order::{Order, OrderId};

/// Thread-safe in-memory order store.
///
/// Backs tests and the demo profile; every instance is isolated.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.order_id) {
            return Err(StoreError::DuplicateOrder(order.order_id.clone()));
        }
        orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).cloned())
    }

    async fn save(&self, order: &Order, expected_version: u64) -> Result<(), StoreError> {
        let mut orders = self.orders.write().await;
        let current = orders
            .get_mut(&order.order_id)
            .ok_or_else(|| StoreError::NotFound(order.order_id.clone()))?;

        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                order_id: order.order_id.clone(),
                expected: expected_version,
                actual: current.version,
            });
        }

        *current = order.clone();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        sort_newest_first(&mut all);
        Ok(all)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
