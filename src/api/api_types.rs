//! Request and response bodies for the HTTP surface. No business logic here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::actors::DeadLetter;
use crate::domain::order::{DispatchId, OrderId, OrderItem, OrderStatus};

// ---------------------------------------------------------------------------
// POST /api/orders
// ---------------------------------------------------------------------------

/// Either the item list or the single-product body older kiosks send
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CreateOrderRequest {
    Items { items: Vec<OrderItem> },
    Legacy(LegacyOrderRequest),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyOrderRequest {
    pub product_id: String,
    pub slot: String,
    pub price: Decimal,
}

impl CreateOrderRequest {
    pub fn into_items(self) -> Vec<OrderItem> {
        match self {
            CreateOrderRequest::Items { items } => items,
            CreateOrderRequest::Legacy(legacy) => {
                vec![OrderItem::new(legacy.product_id, legacy.slot, legacy.price)]
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub status: OrderStatus,
}

// ---------------------------------------------------------------------------
// POST /api/orders/{id}/dispense
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseRequest {
    /// Dispatch id from an earlier attempt whose response was lost
    #[serde(default)]
    pub dispatch_id: Option<DispatchId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseResponse {
    pub dispatch_id: DispatchId,
    pub status: OrderStatus,
}

// ---------------------------------------------------------------------------
// GET /api/admin/dead-letters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DeadLettersQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLettersResponse {
    pub total_received: u64,
    pub dead_letters: Vec<DeadLetter>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub retryable: bool,
}
