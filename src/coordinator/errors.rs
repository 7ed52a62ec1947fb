use crate::domain::order::{OrderError, OrderId, OrderStatus};
use crate::store::StoreError;

// ============================================================================
// Coordinator Errors - what request callers can observe
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid order items: {0}")]
    InvalidItems(String),

    #[error("Order {0} not found")]
    NotFound(OrderId),

    #[error("Order {order_id} is {status}: {message}")]
    InvalidState {
        order_id: OrderId,
        status: OrderStatus,
        message: String,
    },

    #[error("Dispense command for order {order_id} was not delivered: {reason}")]
    TransportFailure {
        order_id: OrderId,
        reason: String,
        retryable: bool,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoordinatorError {
    pub(crate) fn from_order_error(order_id: &OrderId, status: OrderStatus, err: OrderError) -> Self {
        match err {
            OrderError::EmptyItems | OrderError::InvalidItem(_) => {
                CoordinatorError::InvalidItems(err.to_string())
            }
            OrderError::InvalidTransition { .. } | OrderError::NotInitialized => {
                CoordinatorError::InvalidState {
                    order_id: order_id.clone(),
                    status,
                    message: err.to_string(),
                }
            }
        }
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidItems(_) => "INVALID_ITEMS",
            CoordinatorError::NotFound(_) => "NOT_FOUND",
            CoordinatorError::InvalidState { .. } => "INVALID_STATE",
            CoordinatorError::TransportFailure { .. } => "TRANSPORT_FAILURE",
            CoordinatorError::Store(_) => "STORE_FAILURE",
        }
    }

    /// Whether repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CoordinatorError::TransportFailure { retryable, .. } => *retryable,
            CoordinatorError::Store(StoreError::VersionConflict { .. })
            | CoordinatorError::Store(StoreError::Backend(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_errors_map_to_request_errors() {
        let id = OrderId::new("ord_1");

        let items = CoordinatorError::from_order_error(&id, OrderStatus::Pending, OrderError::EmptyItems);
        assert_eq!(items.code(), "INVALID_ITEMS");

        let state = CoordinatorError::from_order_error(
            &id,
            OrderStatus::Pending,
            OrderError::InvalidTransition { from: OrderStatus::Pending, action: "dispense" },
        );
        assert_eq!(state.code(), "INVALID_STATE");
        assert!(state.to_string().contains("PENDING"));
        assert!(!state.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        let transport = CoordinatorError::TransportFailure {
            order_id: OrderId::new("ord_1"),
            reason: "broker down".into(),
            retryable: true,
        };
        assert!(transport.is_retryable());
        assert_eq!(transport.code(), "TRANSPORT_FAILURE");

        let conflict = CoordinatorError::Store(StoreError::VersionConflict {
            order_id: OrderId::new("ord_1"),
            expected: 1,
            actual: 2,
        });
        assert!(conflict.is_retryable());
        assert!(!CoordinatorError::NotFound(OrderId::new("x")).is_retryable());
    }
}
