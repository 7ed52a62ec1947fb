// ============================================================================
// Order Domain - Dispense Lifecycle
// ============================================================================
//
// - Value objects (OrderId, DispatchId, OrderItem, OrderStatus, DwellPolicy)
// - Events (Created, PaymentConfirmed, DispenseStarted, ...)
// - Commands (ConfirmPayment, TriggerDispense, RecordTelemetry, ...)
// - Errors (OrderError enum)
// - Aggregate (Order state machine)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
