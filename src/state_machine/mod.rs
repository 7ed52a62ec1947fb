// ============================================================================
// State Machine Core - Generic Aggregate Abstractions
// ============================================================================
//
// Domain-agnostic traits for command/event driven state machines.
// The order lifecycle in src/domain/order/ implements these.
//
// ============================================================================

pub mod aggregate;
pub mod event;

pub use aggregate::Aggregate;
pub use event::DomainEvent;
