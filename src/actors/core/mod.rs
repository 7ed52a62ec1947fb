// ============================================================================
// Core Actor Abstractions
// ============================================================================
//
// Types shared by every infrastructure actor.
//
// ============================================================================

pub mod health;

// Re-export core types
pub use health::*;
