use async_trait::async_trait;

use crate::domain::order::{Order, OrderId};

pub mod in_memory;
pub mod scylla;

pub use in_memory::InMemoryOrderStore;
pub use self::scylla::ScyllaOrderStore;

// ============================================================================
// Order Store - Durable keyed record of orders
// ============================================================================
//
// One record per order, holding the full current state. Writes carry the
// version the caller read; a mismatch is a VersionConflict and nothing is
// written.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Order {0} already exists")]
    DuplicateOrder(OrderId),

    #[error("Version conflict on order {order_id}: expected {expected}, found {actual}")]
    VersionConflict {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },

    #[error("Order {0} not found")]
    NotFound(OrderId),

    #[error("Order record could not be encoded: {0}")]
    Serialization(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a freshly created order; fails if the id is taken
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Replace the stored record if it is still at `expected_version`
    async fn save(&self, order: &Order, expected_version: u64) -> Result<(), StoreError>;

    /// Every order, newest first
    async fn list(&self) -> Result<Vec<Order>, StoreError>;

    /// Orders that can still change status
    async fn list_active(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.list().await?;
        Ok(orders.into_iter().filter(|o| !o.status.is_terminal()).collect())
    }

    fn backend_name(&self) -> &'static str;
}

/// Newest first, ties broken by id so listings are stable
pub(crate) fn sort_newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.order_id.cmp(&b.order_id))
    });
}
