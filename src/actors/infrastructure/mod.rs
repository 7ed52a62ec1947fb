// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Actors for system concerns around the coordinator:
// - Inbound channel listening
// - Dead letter queue
// - Health monitoring
// - Dwell-time expiry
// - Supervision
//
// ============================================================================

// Private module declarations
mod channel_listener;
mod dlq;
mod dwell_monitor;
mod health_monitor;
mod supervisor;

// Re-export for public API
pub use channel_listener::{ChannelListenerActor, GetListenerStats, ListenerStats, StopListening};
pub use dlq::{AddToDlq, DeadLetter, DlqActor, DlqMessages, DlqStats, GetDlqMessages, GetDlqStats};
pub use dwell_monitor::{DwellMonitorActor, Sweep, SweepReport};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use supervisor::{EmulatorSettings, Supervisor, SupervisorSettings};
