use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::dlq::{AddToDlq, DlqActor};
use super::health_monitor::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::coordinator::{DispenseCoordinator, InboundOutcome};
use crate::messaging::ChannelMessage;

// ============================================================================
// Channel Listener Actor - Feeds device messages into the coordinator
// ============================================================================
//
// Owns the inbound subscription (telemetry + ack). Each delivery is handled
// in its own task so a slow order never holds up another; the per-order
// lock inside the coordinator keeps same-order messages serialized.
// Malformed payloads are forwarded to the dead letter queue.
//
// ============================================================================

pub const LISTENER_COMPONENT: &str = "channel_listener";

pub struct ChannelListenerActor {
    coordinator: DispenseCoordinator,
    inbox: Option<mpsc::Receiver<ChannelMessage>>,
    dlq: Option<ActorRef<DlqActor>>,
    health: Option<ActorRef<HealthMonitorActor>>,
    stats: ListenerStats,
    pump: Option<JoinHandle<()>>,
}

impl ChannelListenerActor {
    /// `inbox` is an already established subscription to the inbound topics
    pub fn new(coordinator: DispenseCoordinator, inbox: mpsc::Receiver<ChannelMessage>) -> Self {
        Self {
            coordinator,
            inbox: Some(inbox),
            dlq: None,
            health: None,
            stats: ListenerStats::default(),
            pump: None,
        }
    }

    pub fn with_dlq(mut self, dlq: ActorRef<DlqActor>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    pub fn with_health(mut self, health: ActorRef<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }
}

async fn report(health: &Option<ActorRef<HealthMonitorActor>>, status: HealthStatus, details: String) {
    if let Some(health) = health {
        let _ = health.tell(UpdateHealth::new(LISTENER_COMPONENT, status).with_details(details)).await;
    }
}

impl Actor for ChannelListenerActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(mut state: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        let topics = state.coordinator.topics().inbound();
        tracing::info!(topics = ?topics, "ChannelListenerActor started");

        let Some(mut inbox) = state.inbox.take() else {
            report(&state.health, HealthStatus::Unhealthy("no subscription".to_string()), String::new()).await;
            return Ok(state);
        };
        report(&state.health, HealthStatus::Healthy, format!("listening on {}", topics.join(", "))).await;

        let coordinator = state.coordinator.clone();
        let dlq = state.dlq.clone();
        let health = state.health.clone();

        state.pump = Some(tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                if !actor_ref.is_alive() {
                    break;
                }

                let coordinator = coordinator.clone();
                let dlq = dlq.clone();
                let listener = actor_ref.clone();

                tokio::spawn(async move {
                    let outcome = coordinator.handle_channel_message(&message).await;

                    if let (InboundOutcome::Malformed(e), Some(dlq)) = (&outcome, &dlq) {
                        let letter = AddToDlq {
                            topic: message.topic.clone(),
                            payload: message.payload.clone(),
                            error_message: e.to_string(),
                        };
                        if dlq.tell(letter).await.is_err() {
                            tracing::warn!(topic = %message.topic, "Dead letter queue unavailable");
                        }
                    }

                    let _ = listener.tell(RecordOutcome(outcome)).await;
                });
            }

            tracing::warn!("Inbound channel subscription ended");
            report(&health, HealthStatus::Unhealthy("subscription closed".to_string()), String::new()).await;
        }));

        Ok(state)
    }
}

// ============================================================================
// Messages
// ============================================================================

pub struct RecordOutcome(pub InboundOutcome);

pub struct GetListenerStats;

/// Stop pulling from the subscription
pub struct StopListening;

#[derive(Debug, Clone, Default, PartialEq, Serialize, kameo::Reply)]
pub struct ListenerStats {
    pub applied: u64,
    pub discarded: u64,
    pub malformed: u64,
    pub failed: u64,
}

impl ListenerStats {
    pub fn total(&self) -> u64 {
        self.applied + self.discarded + self.malformed + self.failed
    }
}

impl Message<RecordOutcome> for ChannelListenerActor {
    type Reply = ();

    async fn handle(&mut self, msg: RecordOutcome, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        match msg.0 {
            InboundOutcome::Applied => self.stats.applied += 1,
            InboundOutcome::Discarded(_) => self.stats.discarded += 1,
            InboundOutcome::Malformed(_) => self.stats.malformed += 1,
            InboundOutcome::Failed(_) => self.stats.failed += 1,
        }
    }
}

impl Message<GetListenerStats> for ChannelListenerActor {
    type Reply = ListenerStats;

    async fn handle(&mut self, _msg: GetListenerStats, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.stats.clone()
    }
}

impl Message<StopListening> for ChannelListenerActor {
    type Reply = ();

    async fn handle(&mut self, _msg: StopListening, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        if let Some(pump) = self.pump.take() {
            pump.abort();
            tracing::info!("ChannelListenerActor stopped listening");
        }
    }
}
