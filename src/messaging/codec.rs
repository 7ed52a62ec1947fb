use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::topics::TopicKind;
use crate::domain::order::{DispatchId, DispenseOutcome, OrderId, OrderItem};

// ============================================================================
// Wire Codec - JSON messages exchanged with the dispensing device
// ============================================================================
//
// Outbound messages are plain serde structs. Inbound payloads are decoded
// into permissive raw shapes first and then validated, so a bad message
// reports which field was wrong instead of a generic serde error.
// Unknown fields are ignored.
//
// ============================================================================

pub const COMMAND_TYPE_DISPENSE: &str = "dispense";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing or empty field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' has unsupported value {value}")]
    OutOfRange { field: &'static str, value: String },

    #[error("No inbound message is expected on {0} topics")]
    UnexpectedTopic(TopicKind),
}

// ============================================================================
// Message Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandItem {
    pub slot: String,
    pub product_ref: String,
}

/// Coordinator → device
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub dispatch_id: DispatchId,
    pub order_id: OrderId,
    pub items: Vec<CommandItem>,
    pub timestamp: DateTime<Utc>,
}

impl CommandMessage {
    pub fn dispense(
        dispatch_id: DispatchId,
        order_id: OrderId,
        items: &[OrderItem],
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: COMMAND_TYPE_DISPENSE.to_string(),
            dispatch_id,
            order_id,
            items: items
                .iter()
                .map(|item| CommandItem {
                    slot: item.slot.clone(),
                    product_ref: item.product_ref.clone(),
                })
                .collect(),
            timestamp,
        }
    }
}

/// Device → coordinator, progress report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryMessage {
    pub dispatch_id: DispatchId,
    pub order_id: OrderId,
    pub progress: u8,
    pub current_step: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Completed,
    Failed,
}

/// Device → coordinator, terminal result of a dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckMessage {
    pub dispatch_id: DispatchId,
    pub order_id: OrderId,
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AckMessage {
    pub fn outcome(&self) -> DispenseOutcome {
        match self.status {
            AckStatus::Completed => DispenseOutcome::Completed,
            AckStatus::Failed => DispenseOutcome::Failed {
                message: self.message.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Telemetry(TelemetryMessage),
    Ack(AckMessage),
}

impl InboundMessage {
    pub fn order_id(&self) -> &OrderId {
        match self {
            InboundMessage::Telemetry(m) => &m.order_id,
            InboundMessage::Ack(m) => &m.order_id,
        }
    }

    pub fn dispatch_id(&self) -> &DispatchId {
        match self {
            InboundMessage::Telemetry(m) => &m.dispatch_id,
            InboundMessage::Ack(m) => &m.dispatch_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            InboundMessage::Telemetry(m) => m.timestamp,
            InboundMessage::Ack(m) => m.timestamp,
        }
    }

    pub fn kind(&self) -> TopicKind {
        match self {
            InboundMessage::Telemetry(_) => TopicKind::Telemetry,
            InboundMessage::Ack(_) => TopicKind::Ack,
        }
    }
}

// ============================================================================
// Raw Shapes
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTelemetry {
    dispatch_id: Option<String>,
    order_id: Option<String>,
    progress: Option<i64>,
    current_step: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAck {
    dispatch_id: Option<String>,
    order_id: Option<String>,
    status: Option<String>,
    message: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCommand {
    #[serde(rename = "type")]
    kind: Option<String>,
    dispatch_id: Option<String>,
    order_id: Option<String>,
    #[serde(default)]
    items: Vec<CommandItem>,
    timestamp: Option<DateTime<Utc>>,
}

// ============================================================================
// Encode / Decode
// ============================================================================

pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

/// Decode a device message received on a `kind` topic.
///
/// A missing timestamp is replaced with `received_at`.
pub fn decode_inbound(
    kind: TopicKind,
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Result<InboundMessage, CodecError> {
    match kind {
        TopicKind::Telemetry => {
            let raw: RawTelemetry = parse(payload)?;
            let progress = raw.progress.ok_or(CodecError::MissingField("progress"))?;
            if !(0..=100).contains(&progress) {
                return Err(CodecError::OutOfRange {
                    field: "progress",
                    value: progress.to_string(),
                });
            }

            Ok(InboundMessage::Telemetry(TelemetryMessage {
                dispatch_id: DispatchId::new(required(raw.dispatch_id, "dispatchId")?),
                order_id: OrderId::new(required(raw.order_id, "orderId")?),
                progress: progress as u8,
                current_step: raw.current_step.ok_or(CodecError::MissingField("currentStep"))?,
                timestamp: raw.timestamp.unwrap_or(received_at),
            }))
        }
        TopicKind::Ack => {
            let raw: RawAck = parse(payload)?;
            let status = match required(raw.status, "status")?.as_str() {
                "completed" => AckStatus::Completed,
                "failed" => AckStatus::Failed,
                other => {
                    return Err(CodecError::OutOfRange {
                        field: "status",
                        value: other.to_string(),
                    })
                }
            };

            Ok(InboundMessage::Ack(AckMessage {
                dispatch_id: DispatchId::new(required(raw.dispatch_id, "dispatchId")?),
                order_id: OrderId::new(required(raw.order_id, "orderId")?),
                status,
                message: raw.message,
                timestamp: raw.timestamp.unwrap_or(received_at),
            }))
        }
        TopicKind::Command => Err(CodecError::UnexpectedTopic(kind)),
    }
}

/// Decode a command as the device sees it
pub fn decode_command(payload: &[u8]) -> Result<CommandMessage, CodecError> {
    let raw: RawCommand = parse(payload)?;
    let kind = required(raw.kind, "type")?;
    if kind != COMMAND_TYPE_DISPENSE {
        return Err(CodecError::OutOfRange { field: "type", value: kind });
    }

    Ok(CommandMessage {
        kind,
        dispatch_id: DispatchId::new(required(raw.dispatch_id, "dispatchId")?),
        order_id: OrderId::new(required(raw.order_id, "orderId")?),
        items: raw.items,
        timestamp: raw.timestamp.ok_or(CodecError::MissingField("timestamp"))?,
    })
}

fn parse<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T, CodecError> {
    serde_json::from_slice(payload).map_err(|e| CodecError::InvalidJson(e.to_string()))
}

fn required(value: Option<String>, field: &'static str) -> Result<String, CodecError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(CodecError::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_command_wire_shape() {
        let command = CommandMessage::dispense(
            DispatchId::new("dsp_1"),
            OrderId::new("ord_1"),
            &[OrderItem::new("shake-choc", "A1", dec!(80))],
            now(),
        );
        let value: serde_json::Value = serde_json::from_slice(&encode(&command).unwrap()).unwrap();

        assert_eq!(value["type"], "dispense");
        assert_eq!(value["dispatchId"], "dsp_1");
        assert_eq!(value["orderId"], "ord_1");
        assert_eq!(value["items"][0]["slot"], "A1");
        assert_eq!(value["items"][0]["productRef"], "shake-choc");
        assert_eq!(value["timestamp"], "2025-03-01T10:00:00Z");
    }

    #[test]
    fn test_device_decodes_command() {
        let payload = br#"{"type":"dispense","dispatchId":"dsp_1","orderId":"ord_1",
            "items":[{"slot":"A1","productRef":"p"}],"timestamp":"2025-03-01T10:00:00Z"}"#;
        let command = decode_command(payload).unwrap();

        assert_eq!(command.dispatch_id, DispatchId::new("dsp_1"));
        assert_eq!(command.items.len(), 1);
    }

    #[test]
    fn test_unknown_command_type_is_rejected() {
        let payload = br#"{"type":"restock","dispatchId":"d","orderId":"o","timestamp":"2025-03-01T10:00:00Z"}"#;
        assert!(matches!(
            decode_command(payload),
            Err(CodecError::OutOfRange { field: "type", .. })
        ));
    }

    #[test]
    fn test_decode_telemetry() {
        let payload = br#"{"dispatchId":"dsp_1","orderId":"ord_1","progress":50,
            "currentStep":"Adding water","timestamp":"2025-03-01T10:00:05Z","firmware":"2.1"}"#;

        match decode_inbound(TopicKind::Telemetry, payload, now()).unwrap() {
            InboundMessage::Telemetry(t) => {
                assert_eq!(t.progress, 50);
                assert_eq!(t.current_step, "Adding water");
                assert_eq!(t.timestamp, now() + chrono::Duration::seconds(5));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_missing_timestamp_defaults_to_receive_time() {
        let payload = br#"{"dispatchId":"dsp_1","orderId":"ord_1","progress":20,"currentStep":"x"}"#;
        let message = decode_inbound(TopicKind::Telemetry, payload, now()).unwrap();
        assert_eq!(message.timestamp(), now());
    }

    #[test]
    fn test_telemetry_validation() {
        let out_of_range = br#"{"dispatchId":"d","orderId":"o","progress":101,"currentStep":"x"}"#;
        assert!(matches!(
            decode_inbound(TopicKind::Telemetry, out_of_range, now()),
            Err(CodecError::OutOfRange { field: "progress", .. })
        ));

        let negative = br#"{"dispatchId":"d","orderId":"o","progress":-1,"currentStep":"x"}"#;
        assert!(decode_inbound(TopicKind::Telemetry, negative, now()).is_err());

        let empty_dispatch = br#"{"dispatchId":"","orderId":"o","progress":1,"currentStep":"x"}"#;
        assert_eq!(
            decode_inbound(TopicKind::Telemetry, empty_dispatch, now()),
            Err(CodecError::MissingField("dispatchId"))
        );

        let no_order = br#"{"dispatchId":"d","progress":1,"currentStep":"x"}"#;
        assert_eq!(
            decode_inbound(TopicKind::Telemetry, no_order, now()),
            Err(CodecError::MissingField("orderId"))
        );
    }

    #[test]
    fn test_decode_ack() {
        let payload = br#"{"dispatchId":"dsp_1","orderId":"ord_1","status":"failed","message":"Jammed"}"#;
        let message = decode_inbound(TopicKind::Ack, payload, now()).unwrap();

        match message {
            InboundMessage::Ack(ack) => {
                assert_eq!(ack.status, AckStatus::Failed);
                assert_eq!(
                    ack.outcome(),
                    DispenseOutcome::Failed { message: Some("Jammed".to_string()) }
                );
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_ack_with_unknown_status_is_rejected() {
        let payload = br#"{"dispatchId":"d","orderId":"o","status":"done"}"#;
        assert!(matches!(
            decode_inbound(TopicKind::Ack, payload, now()),
            Err(CodecError::OutOfRange { field: "status", .. })
        ));
    }

    #[test]
    fn test_garbage_and_wrong_topic() {
        assert!(matches!(
            decode_inbound(TopicKind::Ack, b"not json", now()),
            Err(CodecError::InvalidJson(_))
        ));
        assert_eq!(
            decode_inbound(TopicKind::Command, b"{}", now()),
            Err(CodecError::UnexpectedTopic(TopicKind::Command))
        );
    }
}
