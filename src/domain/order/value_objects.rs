use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Externally visible order identifier (`ord_<32 hex>`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn generate() -> Self {
        Self(format!("ord_{}", Uuid::new_v4().simple()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation token for one dispense attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchId(String);

impl DispatchId {
    pub fn generate() -> Self {
        Self(format!("dsp_{}", Uuid::new_v4().simple()))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn default_quantity() -> u32 {
    1
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_ref: String,
    pub slot: String,
    pub unit_price: Decimal,
    #[serde(default = "default_quantity", alias = "quantityFactor")]
    pub quantity: u32,
}

impl OrderItem {
    pub fn new(product_ref: impl Into<String>, slot: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            product_ref: product_ref.into(),
            slot: slot.into(),
            unit_price,
            quantity: 1,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// `None` when the amount does not fit in a `Decimal`
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }

    pub(crate) fn validate(&self) -> Result<(), OrderError> {
        if self.product_ref.trim().is_empty() {
            return Err(OrderError::InvalidItem("productRef must not be empty".to_string()));
        }
        if self.slot.trim().is_empty() {
            return Err(OrderError::InvalidItem(format!(
                "slot must not be empty for product {}",
                self.product_ref
            )));
        }
        if self.unit_price.is_sign_negative() {
            return Err(OrderError::InvalidItem(format!(
                "negative price {} for product {}",
                self.unit_price, self.product_ref
            )));
        }
        if self.quantity == 0 {
            return Err(OrderError::InvalidItem(format!(
                "quantity must be at least 1 for product {}",
                self.product_ref
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Dispensing,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Dispensing => "DISPENSING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result reported by the device for a dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum DispenseOutcome {
    Completed,
    Failed { message: Option<String> },
}

/// Maximum time an order may stay in each non-terminal status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellPolicy {
    pub pending: Duration,
    pub paid: Duration,
    pub dispensing: Duration,
}

impl Default for DwellPolicy {
    fn default() -> Self {
        Self {
            pending: Duration::from_secs(900),
            paid: Duration::from_secs(300),
            dispensing: Duration::from_secs(120),
        }
    }
}

impl DwellPolicy {
    pub fn uniform(limit: Duration) -> Self {
        Self {
            pending: limit,
            paid: limit,
            dispensing: limit,
        }
    }

    /// `None` for terminal statuses, which never expire
    pub fn limit_for(&self, status: OrderStatus) -> Option<Duration> {
        match status {
            OrderStatus::Pending => Some(self.pending),
            OrderStatus::Paid => Some(self.paid),
            OrderStatus::Dispensing => Some(self.dispensing),
            OrderStatus::Completed | OrderStatus::Failed => None,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
