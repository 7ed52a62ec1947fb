use chrono::{DateTime, Utc};
use std::time::Duration;

use super::value_objects::{DispatchId, DispenseOutcome};

// ============================================================================
// Order Commands - Represent requested state changes
// ============================================================================
//
// Creation is not a command: see `Order::open`.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    ConfirmPayment {
        at: DateTime<Utc>,
    },
    TriggerDispense {
        dispatch_id: DispatchId,
        at: DateTime<Utc>,
    },
    /// Roll a dispatch back when its command never reached the channel
    AbortDispense {
        dispatch_id: DispatchId,
        reason: String,
        at: DateTime<Utc>,
    },
    RecordTelemetry {
        dispatch_id: DispatchId,
        progress: u8,
        current_step: String,
        at: DateTime<Utc>,
    },
    RecordAck {
        dispatch_id: DispatchId,
        outcome: DispenseOutcome,
        at: DateTime<Utc>,
    },
    Expire {
        dwell_limit: Duration,
        now: DateTime<Utc>,
    },
}

impl OrderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::ConfirmPayment { .. } => "confirm payment for",
            OrderCommand::TriggerDispense { .. } => "dispense",
            OrderCommand::AbortDispense { .. } => "abort dispense of",
            OrderCommand::RecordTelemetry { .. } => "record telemetry for",
            OrderCommand::RecordAck { .. } => "record ack for",
            OrderCommand::Expire { .. } => "expire",
        }
    }
}
