use kameo::prelude::*;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::channel_listener::{ChannelListenerActor, GetListenerStats, ListenerStats, StopListening};
use super::dlq::{DlqActor, DlqMessages, DlqStats, GetDlqMessages, GetDlqStats, DLQ_COMPONENT};
use super::dwell_monitor::DwellMonitorActor;
use super::health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::coordinator::DispenseCoordinator;
use crate::emulator::{DeviceEmulator, EmulatorHandle, EmulatorMode};

// ============================================================================
// Supervisor - Starts and stops the infrastructure actors
// ============================================================================
//
// Actor Hierarchy:
//   Supervisor
//   ├── HealthMonitorActor
//   ├── DlqActor
//   ├── ChannelListenerActor
//   ├── DwellMonitorActor
//   └── DeviceEmulator (optional, plain task)
//
// The listener subscribes before the emulator starts so no early telemetry
// is lost.
//
// ============================================================================

pub const EMULATOR_COMPONENT: &str = "device_emulator";

#[derive(Debug, Clone)]
pub struct EmulatorSettings {
    pub mode: EmulatorMode,
    pub time_scale: f64,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub health_check_interval: Duration,
    pub health_log_interval: Duration,
    pub dwell_sweep_interval: Duration,
    pub dlq_capacity: usize,
    pub emulator: Option<EmulatorSettings>,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(5),
            health_log_interval: Duration::from_secs(30),
            dwell_sweep_interval: Duration::from_secs(1),
            dlq_capacity: 1000,
            emulator: None,
        }
    }
}

pub struct Supervisor {
    health_monitor: ActorRef<HealthMonitorActor>,
    dlq: ActorRef<DlqActor>,
    listener: ActorRef<ChannelListenerActor>,
    dwell_monitor: ActorRef<DwellMonitorActor>,
    emulator: Option<EmulatorHandle>,
    health_log: JoinHandle<()>,
}

impl Supervisor {
    pub async fn start(coordinator: DispenseCoordinator, settings: SupervisorSettings) -> anyhow::Result<Self> {
        tracing::info!("Starting supervised infrastructure actors");

        let health_monitor =
            HealthMonitorActor::spawn(HealthMonitorActor::new(coordinator.clone(), settings.health_check_interval));

        let dlq = DlqActor::spawn(
            DlqActor::new(settings.dlq_capacity)
                .with_metrics(coordinator.metrics().clone())
                .with_health(health_monitor.clone()),
        );
        let _ = health_monitor
            .tell(UpdateHealth::new(DLQ_COMPONENT, HealthStatus::Healthy).with_details("DLQ actor started"))
            .await;

        let inbox = coordinator
            .channel()
            .subscribe(&coordinator.topics().inbound())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to subscribe to inbound topics: {}", e))?;
        let listener = ChannelListenerActor::spawn(
            ChannelListenerActor::new(coordinator.clone(), inbox)
                .with_dlq(dlq.clone())
                .with_health(health_monitor.clone()),
        );

        let dwell_monitor = DwellMonitorActor::spawn(
            DwellMonitorActor::new(coordinator.clone(), settings.dwell_sweep_interval)
                .with_health(health_monitor.clone()),
        );

        let emulator = match settings.emulator {
            Some(emulator) => {
                let handle = DeviceEmulator::new(coordinator.channel(), coordinator.topics().clone(), emulator.mode.clone())
                    .with_time_scale(emulator.time_scale)
                    .start()
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to start device emulator: {}", e))?;
                let _ = health_monitor
                    .tell(
                        UpdateHealth::new(EMULATOR_COMPONENT, HealthStatus::Healthy)
                            .with_details(format!("mode {}", emulator.mode)),
                    )
                    .await;
                Some(handle)
            }
            None => None,
        };

        let health_log = tokio::spawn(log_system_health(health_monitor.clone(), settings.health_log_interval));

        tracing::info!(
            machine_id = %coordinator.topics().machine_id(),
            channel = coordinator.channel().name(),
            store = coordinator.store_backend(),
            emulator = emulator.is_some(),
            "All supervised actors started"
        );

        Ok(Self {
            health_monitor,
            dlq,
            listener,
            dwell_monitor,
            emulator,
            health_log,
        })
    }

    pub async fn health(&self) -> anyhow::Result<SystemHealth> {
        self.health_monitor
            .ask(GetSystemHealth)
            .await
            .map_err(|_| anyhow::anyhow!("Health monitor unavailable"))
    }

    pub async fn dead_letters(&self, limit: usize) -> anyhow::Result<DlqMessages> {
        self.dlq
            .ask(GetDlqMessages { limit })
            .await
            .map_err(|_| anyhow::anyhow!("Dead letter queue unavailable"))
    }

    pub async fn dlq_stats(&self) -> anyhow::Result<DlqStats> {
        self.dlq
            .ask(GetDlqStats)
            .await
            .map_err(|_| anyhow::anyhow!("Dead letter queue unavailable"))
    }

    pub async fn listener_stats(&self) -> anyhow::Result<ListenerStats> {
        self.listener
            .ask(GetListenerStats)
            .await
            .map_err(|_| anyhow::anyhow!("Channel listener unavailable"))
    }

    /// Stop inbound processing first, then the rest
    pub async fn shutdown(&self) {
        tracing::info!("Supervisor shutting down");

        if let Some(emulator) = &self.emulator {
            emulator.stop();
        }
        let _ = self.listener.tell(StopListening).await;
        let _ = self.listener.stop_gracefully().await;
        let _ = self.dwell_monitor.stop_gracefully().await;
        let _ = self.dlq.stop_gracefully().await;
        self.health_log.abort();
        let _ = self.health_monitor.stop_gracefully().await;

        tracing::info!("Supervisor stopped");
    }
}

async fn log_system_health(health_monitor: ActorRef<HealthMonitorActor>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // First tick fires immediately; skip it so components can report in
    interval.tick().await;
    loop {
        interval.tick().await;
        match health_monitor.ask(GetSystemHealth).await {
            Ok(health) => match health.overall_status {
                HealthStatus::Healthy => tracing::debug!("System health check: Healthy"),
                HealthStatus::Degraded(ref msg) => tracing::warn!(reason = %msg, "System health check: Degraded"),
                HealthStatus::Unhealthy(ref msg) => tracing::error!(reason = %msg, "System health check: Unhealthy"),
            },
            Err(_) => break,
        }
    }
}
