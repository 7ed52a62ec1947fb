use super::event::DomainEvent;

// ============================================================================
// Aggregate Pattern - State Machine Core
// ============================================================================
//
// Key Principles:
// 1. Commands are validated against current state before anything changes
// 2. An accepted command yields events; a rejected one yields an error
// 3. An accepted command may yield no events at all (idempotent no-op)
// 4. State only changes by applying events
// 5. Deciding is pure: no I/O, timestamps come in through the command
//
// ============================================================================

/// Generic Aggregate trait - every state machine in the crate implements this
///
/// Type Parameters:
/// - `Event`: facts produced by accepted commands
/// - `Command`: requested state changes
/// - `Error`: business rule violations (rejections)
pub trait Aggregate: Sized + Send + Sync {
    type Event: DomainEvent;
    type Command;
    type Error;

    /// Create a new aggregate from its first event
    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error>;

    /// Apply a subsequent event to update state
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Decide which events a command produces (business logic)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Current revision; bumped once per applied event
    fn version(&self) -> u64;

    /// Decide and apply in one step, returning the events that were applied.
    ///
    /// Either every event is applied or the aggregate is left untouched.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>
    where
        Self: Clone,
    {
        let events = self.handle_command(command)?;
        if events.is_empty() {
            return Ok(events);
        }

        let mut next = self.clone();
        for event in &events {
            next.apply_event(event)?;
        }
        *self = next;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    enum CounterEvent {
        Opened,
        Added(u32),
    }

    impl DomainEvent for CounterEvent {
        fn event_type(&self) -> &'static str {
            match self {
                CounterEvent::Opened => "Opened",
                CounterEvent::Added(_) => "Added",
            }
        }
    }

    #[derive(Clone, Debug)]
    struct Counter {
        total: u32,
        version: u64,
    }

    enum CounterCommand {
        Add(u32),
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Command = CounterCommand;
        type Error = String;

        fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
            match event {
                CounterEvent::Opened => Ok(Self { total: 0, version: 1 }),
                other => Err(format!("cannot start with {:?}", other)),
            }
        }

        fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
            match event {
                CounterEvent::Opened => return Err("already opened".to_string()),
                CounterEvent::Added(n) => self.total += n,
            }
            self.version += 1;
            Ok(())
        }

        fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
            match command {
                CounterCommand::Add(0) => Ok(vec![]),
                CounterCommand::Add(n) if *n > 100 => Err("too large".to_string()),
                CounterCommand::Add(n) => Ok(vec![CounterEvent::Added(*n)]),
            }
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    #[test]
    fn test_execute_applies_events() {
        let mut counter = Counter::apply_first_event(&CounterEvent::Opened).unwrap();
        let events = counter.execute(&CounterCommand::Add(5)).unwrap();

        assert_eq!(events, vec![CounterEvent::Added(5)]);
        assert_eq!(counter.total, 5);
        assert_eq!(counter.version(), 2);
    }

    #[test]
    fn test_execute_no_op_keeps_version() {
        let mut counter = Counter::apply_first_event(&CounterEvent::Opened).unwrap();
        let events = counter.execute(&CounterCommand::Add(0)).unwrap();

        assert!(events.is_empty());
        assert_eq!(counter.version(), 1);
    }

    #[test]
    fn test_execute_rejection_leaves_state() {
        let mut counter = Counter::apply_first_event(&CounterEvent::Opened).unwrap();
        assert!(counter.execute(&CounterCommand::Add(500)).is_err());
        assert_eq!(counter.total, 0);
        assert_eq!(counter.version(), 1);
    }

    #[test]
    fn test_first_event_must_open() {
        assert!(Counter::apply_first_event(&CounterEvent::Added(1)).is_err());
    }
}
