// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Pure order logic: no store, no channel, no clock. Timestamps and dispatch
// identifiers come in through commands so every transition is reproducible.
//
// ============================================================================

pub mod order;
