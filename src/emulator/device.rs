use chrono::Utc;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::messaging::{
    decode_command, encode, AckMessage, AckStatus, ChannelError, ChannelTransport, CommandMessage,
    MachineTopics, TelemetryMessage, TopicKind,
};

pub const DEFAULT_FAULT_MESSAGE: &str = "Dispense motor stalled";

/// How the emulated device reacts to a dispense command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmulatorMode {
    Nominal,
    /// Telemetry arrives as 20, 80, 50
    OutOfOrder,
    /// Completed ack is sent twice
    DuplicateAck,
    /// Never answers
    Silent,
    /// Reports 20% then fails with the message
    Fault(String),
}

impl fmt::Display for EmulatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmulatorMode::Nominal => f.write_str("nominal"),
            EmulatorMode::OutOfOrder => f.write_str("out_of_order"),
            EmulatorMode::DuplicateAck => f.write_str("duplicate_ack"),
            EmulatorMode::Silent => f.write_str("silent"),
            EmulatorMode::Fault(message) => write!(f, "fault:{}", message),
        }
    }
}

impl FromStr for EmulatorMode {
    type Err = String;

    /// Accepts `nominal`, `out_of_order`, `duplicate_ack`, `silent`, `fault`
    /// and `fault:<message>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(message) = s.strip_prefix("fault:") {
            let message = message.trim();
            return Ok(EmulatorMode::Fault(if message.is_empty() {
                DEFAULT_FAULT_MESSAGE.to_string()
            } else {
                message.to_string()
            }));
        }

        match s.to_ascii_lowercase().as_str() {
            "nominal" => Ok(EmulatorMode::Nominal),
            "out_of_order" => Ok(EmulatorMode::OutOfOrder),
            "duplicate_ack" => Ok(EmulatorMode::DuplicateAck),
            "silent" => Ok(EmulatorMode::Silent),
            "fault" => Ok(EmulatorMode::Fault(DEFAULT_FAULT_MESSAGE.to_string())),
            other => Err(format!("unknown emulator mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Telemetry { progress: u8, step: &'static str },
    Ack { status: AckStatus, message: Option<String> },
}

/// One message, sent `at` after the command was received
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEmission {
    pub at: Duration,
    pub emission: Emission,
}

impl EmulatorMode {
    /// Messages this mode sends for one dispense command, at unscaled offsets
    pub fn schedule(&self) -> Vec<ScheduledEmission> {
        let powder = Emission::Telemetry { progress: 20, step: "Dispensing powder" };
        let water = Emission::Telemetry { progress: 50, step: "Adding water" };
        let mixing = Emission::Telemetry { progress: 80, step: "Mixing shake" };
        let completed = Emission::Ack { status: AckStatus::Completed, message: None };

        let timeline = match self {
            EmulatorMode::Nominal => vec![(2, powder), (4, water), (7, mixing), (9, completed)],
            EmulatorMode::OutOfOrder => vec![(2, powder), (4, mixing), (7, water), (9, completed)],
            EmulatorMode::DuplicateAck => vec![
                (2, powder),
                (4, water),
                (7, mixing),
                (9, completed.clone()),
                (10, completed),
            ],
            EmulatorMode::Silent => vec![],
            EmulatorMode::Fault(message) => vec![
                (2, powder),
                (4, Emission::Ack { status: AckStatus::Failed, message: Some(message.clone()) }),
            ],
        };

        timeline
            .into_iter()
            .map(|(secs, emission)| ScheduledEmission { at: Duration::from_secs(secs), emission })
            .collect()
    }
}

pub struct DeviceEmulator {
    channel: Arc<dyn ChannelTransport>,
    topics: MachineTopics,
    mode: EmulatorMode,
    time_scale: f64,
}

/// Running emulator; dropping it does not stop it, call `stop`
pub struct EmulatorHandle {
    task: JoinHandle<()>,
}

impl EmulatorHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl DeviceEmulator {
    pub fn new(channel: Arc<dyn ChannelTransport>, topics: MachineTopics, mode: EmulatorMode) -> Self {
        Self {
            channel,
            topics,
            mode,
            time_scale: 1.0,
        }
    }

    /// Multiply every delay by `scale` (0.01 turns 9 s into 90 ms)
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = if scale.is_finite() && scale >= 0.0 { scale } else { 1.0 };
        self
    }

    /// Subscribe to the command topic and serve commands in the background
    pub async fn start(self) -> Result<EmulatorHandle, ChannelError> {
        let command_topic = self.topics.topic(TopicKind::Command).to_string();
        let mut commands = self.channel.subscribe(&[command_topic.clone()]).await?;

        tracing::info!(
            topic = %command_topic,
            mode = %self.mode,
            time_scale = self.time_scale,
            "Device emulator listening"
        );

        let emulator = Arc::new(self);
        let task = tokio::spawn(async move {
            while let Some(message) = commands.recv().await {
                let command = match decode_command(&message.payload) {
                    Ok(command) => command,
                    Err(e) => {
                        tracing::warn!(error = %e, "Emulator ignored malformed command");
                        continue;
                    }
                };

                let emulator = emulator.clone();
                tokio::spawn(async move { emulator.serve(command).await });
            }
            tracing::info!("Device emulator command stream closed");
        });

        Ok(EmulatorHandle { task })
    }

    async fn serve(&self, command: CommandMessage) {
        tracing::info!(
            order_id = %command.order_id,
            dispatch_id = %command.dispatch_id,
            mode = %self.mode,
            "Emulator dispensing"
        );

        let received = Instant::now();
        for step in self.mode.schedule() {
            sleep_until(received + step.at.mul_f64(self.time_scale)).await;

            if let Err(e) = self.emit(&command, step.emission).await {
                tracing::warn!(
                    order_id = %command.order_id,
                    error = %e,
                    "Emulator failed to publish"
                );
            }
        }
    }

    async fn emit(&self, command: &CommandMessage, emission: Emission) -> Result<(), ChannelError> {
        let (kind, payload) = match emission {
            Emission::Telemetry { progress, step } => (
                TopicKind::Telemetry,
                encode(&TelemetryMessage {
                    dispatch_id: command.dispatch_id.clone(),
                    order_id: command.order_id.clone(),
                    progress,
                    current_step: step.to_string(),
                    timestamp: Utc::now(),
                }),
            ),
            Emission::Ack { status, message } => (
                TopicKind::Ack,
                encode(&AckMessage {
                    dispatch_id: command.dispatch_id.clone(),
                    order_id: command.order_id.clone(),
                    status,
                    message,
                    timestamp: Utc::now(),
                }),
            ),
        };
        let payload = payload.map_err(|e| ChannelError::Rejected(e.to_string()))?;

        self.channel
            .publish(self.topics.topic(kind), command.order_id.as_str(), &payload)
            .await
    }
}
