use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::state_machine::DomainEvent;
use super::value_objects::{DispatchId, OrderId, OrderItem, OrderStatus};

// ============================================================================
// Order Events - Facts produced by the order state machine
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    Created(OrderCreated),
    PaymentConfirmed(PaymentConfirmed),
    DispenseStarted(DispenseStarted),
    DispenseAborted(DispenseAborted),
    ProgressReported(ProgressReported),
    DispenseCompleted(DispenseCompleted),
    DispenseFailed(DispenseFailed),
    Expired(OrderExpired),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "OrderCreated",
            OrderEvent::PaymentConfirmed(_) => "PaymentConfirmed",
            OrderEvent::DispenseStarted(_) => "DispenseStarted",
            OrderEvent::DispenseAborted(_) => "DispenseAborted",
            OrderEvent::ProgressReported(_) => "ProgressReported",
            OrderEvent::DispenseCompleted(_) => "DispenseCompleted",
            OrderEvent::DispenseFailed(_) => "DispenseFailed",
            OrderEvent::Expired(_) => "OrderExpired",
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderEvent::DispenseCompleted(_) | OrderEvent::DispenseFailed(_) | OrderEvent::Expired(_)
        )
    }
}

impl OrderEvent {
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Created(e) => e.created_at,
            OrderEvent::PaymentConfirmed(e) => e.confirmed_at,
            OrderEvent::DispenseStarted(e) => e.started_at,
            OrderEvent::DispenseAborted(e) => e.aborted_at,
            OrderEvent::ProgressReported(e) => e.reported_at,
            OrderEvent::DispenseCompleted(e) => e.completed_at,
            OrderEvent::DispenseFailed(e) => e.failed_at,
            OrderEvent::Expired(e) => e.expired_at,
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Initial event in the order lifecycle
#[derive(Debug, Clone, PartialEq)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmed {
    pub confirmed_at: DateTime<Utc>,
}

/// A dispense command is about to be published for this dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseStarted {
    pub dispatch_id: DispatchId,
    pub started_at: DateTime<Utc>,
}

/// The command for this dispatch never left the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct DispenseAborted {
    pub dispatch_id: DispatchId,
    pub reason: String,
    pub aborted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReported {
    pub dispatch_id: DispatchId,
    pub progress: u8,
    pub current_step: String,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispenseCompleted {
    pub dispatch_id: DispatchId,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispenseFailed {
    pub dispatch_id: DispatchId,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Dwell time in `expired_from` ran out
#[derive(Debug, Clone, PartialEq)]
pub struct OrderExpired {
    pub expired_from: OrderStatus,
    pub expired_at: DateTime<Utc>,
}
