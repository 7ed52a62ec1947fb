// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for asynchronous, concurrent operations.
//
// Structure:
// - core/           - Shared health types
// - infrastructure/ - Concrete infrastructure actors (listener, DLQ, health,
//                     dwell monitor, supervisor)
//
// Note: Order logic lives in the coordinator, NOT in actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

// Private module declarations
mod core;
mod infrastructure;

// Re-export only what's needed in the public API
pub use self::core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    DeadLetter, DlqMessages, DlqStats, EmulatorSettings, SupervisorSettings, Supervisor, SystemHealth,
};
