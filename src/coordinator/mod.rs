// ============================================================================
// Coordinator Module
// ============================================================================
//
// Drives orders through the state machine, publishes dispense commands and
// reconciles device telemetry and acks against the stored order.
//
// ============================================================================

mod errors;
mod locks;
mod service;

#[cfg(test)]
mod scenarios;

pub use errors::CoordinatorError;
pub use locks::{OrderLockGuard, OrderLocks};
pub use service::{DiscardReason, DispenseCoordinator, InboundOutcome, OrderStatusView};
