use std::fmt;

// ============================================================================
// Machine-scoped Channel Topics
// ============================================================================
//
//   command/{machine}    coordinator → device
//   telemetry/{machine}  device → coordinator
//   ack/{machine}        device → coordinator
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicKind {
    Command,
    Telemetry,
    Ack,
}

impl TopicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicKind::Command => "command",
            TopicKind::Telemetry => "telemetry",
            TopicKind::Ack => "ack",
        }
    }

    /// Device → coordinator
    pub fn is_inbound(&self) -> bool {
        matches!(self, TopicKind::Telemetry | TopicKind::Ack)
    }
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineTopics {
    machine_id: String,
    command: String,
    telemetry: String,
    ack: String,
}

impl MachineTopics {
    pub fn new(machine_id: impl Into<String>) -> Self {
        let machine_id = machine_id.into();
        Self {
            command: format!("command/{}", machine_id),
            telemetry: format!("telemetry/{}", machine_id),
            ack: format!("ack/{}", machine_id),
            machine_id,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn topic(&self, kind: TopicKind) -> &str {
        match kind {
            TopicKind::Command => &self.command,
            TopicKind::Telemetry => &self.telemetry,
            TopicKind::Ack => &self.ack,
        }
    }

    /// Topics the coordinator listens on
    pub fn inbound(&self) -> Vec<String> {
        vec![self.telemetry.clone(), self.ack.clone()]
    }

    /// Which of this machine's topics `topic` is, if any
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        [TopicKind::Command, TopicKind::Telemetry, TopicKind::Ack]
            .into_iter()
            .find(|kind| self.topic(*kind) == topic)
    }
}
