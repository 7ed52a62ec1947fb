use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use std::time::Duration;

use super::health_monitor::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::coordinator::DispenseCoordinator;

// ============================================================================
// Dwell Monitor Actor - Fails orders stuck in one status too long
// ============================================================================
//
// A ticker sends `Sweep` on every interval. Sweeps are handled one at a time
// by the actor, so two sweeps never overlap. No cancellation is sent to the
// device for an expired dispense.
//
// ============================================================================

pub const DWELL_COMPONENT: &str = "dwell_monitor";

pub struct DwellMonitorActor {
    coordinator: DispenseCoordinator,
    sweep_interval: Duration,
    health: Option<ActorRef<HealthMonitorActor>>,
    total_expired: u64,
    last_error: Option<String>,
}

impl DwellMonitorActor {
    pub fn new(coordinator: DispenseCoordinator, sweep_interval: Duration) -> Self {
        Self {
            coordinator,
            sweep_interval,
            health: None,
            total_expired: 0,
            last_error: None,
        }
    }

    pub fn with_health(mut self, health: ActorRef<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }
}

impl Actor for DwellMonitorActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(
            interval_ms = state.sweep_interval.as_millis() as u64,
            pending_secs = state.coordinator.dwell_policy().pending.as_secs(),
            paid_secs = state.coordinator.dwell_policy().paid.as_secs(),
            dispensing_secs = state.coordinator.dwell_policy().dispensing.as_secs(),
            "DwellMonitorActor started"
        );

        // Zero means sweeps are only triggered by hand
        if !state.sweep_interval.is_zero() {
            let period = state.sweep_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if actor_ref.tell(Sweep { now: None }).await.is_err() {
                        break;
                    }
                }
            });
        }

        Ok(state)
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Expire overdue orders as of `now` (wall clock when `None`)
pub struct Sweep {
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, kameo::Reply)]
pub struct SweepReport {
    pub expired: usize,
    pub total_expired: u64,
}

impl Message<Sweep> for DwellMonitorActor {
    type Reply = SweepReport;

    async fn handle(&mut self, msg: Sweep, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let now = msg.now.unwrap_or_else(Utc::now);

        let (expired, status) = match self.coordinator.expire_overdue(now).await {
            Ok(expired) => (expired, HealthStatus::Healthy),
            Err(e) => {
                tracing::error!(error = %e, "Dwell sweep failed");
                (0, HealthStatus::Degraded(format!("sweep failed: {}", e)))
            }
        };

        if expired > 0 {
            tracing::info!(expired, "Dwell sweep expired orders");
        }
        self.total_expired += expired as u64;

        // Report on recovery, on failure, and on the first sweep
        let error_now = match &status {
            HealthStatus::Healthy => None,
            other => Some(other.label().to_string()),
        };
        if error_now != self.last_error || self.total_expired == expired as u64 {
            if let Some(health) = &self.health {
                let update = UpdateHealth::new(DWELL_COMPONENT, status)
                    .with_details(format!("{} orders expired", self.total_expired));
                let _ = health.tell(update).await;
            }
        }
        self.last_error = error_now;

        SweepReport {
            expired,
            total_expired: self.total_expired,
        }
    }
}
