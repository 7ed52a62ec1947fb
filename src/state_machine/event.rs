// ============================================================================
// Domain Event Trait
// ============================================================================

/// Facts emitted by an aggregate once a command has been accepted.
///
/// `event_type` is a stable name used for log fields and metric labels.
pub trait DomainEvent: Clone + Send + Sync {
    fn event_type(&self) -> &'static str;

    /// Whether applying this event moves the aggregate into a terminal state.
    fn is_terminal(&self) -> bool {
        false
    }
}
