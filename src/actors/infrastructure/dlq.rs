use chrono::{DateTime, Utc};
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

use super::health_monitor::{HealthMonitorActor, UpdateHealth};
use crate::actors::core::HealthStatus;
use crate::metrics::Metrics;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Keeps channel messages that could not be decoded so an operator can see
// what the device actually sent. Bounded: once full, the oldest entry is
// dropped for each new one.
//
// ============================================================================

pub const DLQ_COMPONENT: &str = "dead_letter_queue";

pub struct DlqActor {
    entries: VecDeque<DeadLetter>,
    capacity: usize,
    total_received: u64,
    metrics: Option<Arc<Metrics>>,
    health: Option<ActorRef<HealthMonitorActor>>,
}

impl DlqActor {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            total_received: 0,
            metrics: None,
            health: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_health(mut self, health: ActorRef<HealthMonitorActor>) -> Self {
        self.health = Some(health);
        self
    }

    async fn report_health(&self) {
        let Some(health) = &self.health else {
            return;
        };

        let status = if self.entries.len() >= self.capacity {
            HealthStatus::Degraded("Dead letter queue full, oldest entries dropped".to_string())
        } else {
            HealthStatus::Healthy
        };
        let update = UpdateHealth::new(DLQ_COMPONENT, status)
            .with_details(format!("{}/{} retained", self.entries.len(), self.capacity));

        if health.tell(update).await.is_err() {
            tracing::debug!("Health monitor unavailable, DLQ health not reported");
        }
    }
}

impl Actor for DlqActor {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!(capacity = state.capacity, "DlqActor started - Dead Letter Queue ready");
        state.report_health().await;
        Ok(state)
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone)]
pub struct AddToDlq {
    pub topic: String,
    pub payload: Vec<u8>,
    pub error_message: String,
}

pub struct GetDlqMessages {
    pub limit: usize,
}

pub struct GetDlqStats;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    pub topic: String,
    pub payload: String,
    pub error_message: String,
    pub received_at: DateTime<Utc>,
}

/// Newest first
#[derive(Debug, Clone, Serialize, kameo::Reply)]
pub struct DlqMessages(pub Vec<DeadLetter>);

#[derive(Debug, Clone, PartialEq, Serialize, kameo::Reply)]
#[serde(rename_all = "camelCase")]
pub struct DlqStats {
    pub total_received: u64,
    pub retained: usize,
    pub capacity: usize,
}

// ============================================================================
// Handlers
// ============================================================================

impl Message<AddToDlq> for DlqActor {
    type Reply = ();

    async fn handle(&mut self, msg: AddToDlq, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let letter = DeadLetter {
            id: Uuid::now_v7(),
            topic: msg.topic,
            payload: String::from_utf8_lossy(&msg.payload).into_owned(),
            error_message: msg.error_message,
            received_at: Utc::now(),
        };

        tracing::error!(
            dead_letter_id = %letter.id,
            topic = %letter.topic,
            error = %letter.error_message,
            "Adding message to Dead Letter Queue"
        );

        let was_full = self.entries.len() >= self.capacity;
        if was_full {
            self.entries.pop_front();
        }
        self.entries.push_back(letter);
        self.total_received += 1;

        if let Some(metrics) = &self.metrics {
            metrics.record_dlq_message();
        }

        // Only report when fullness flips, not on every message
        let is_full = self.entries.len() >= self.capacity;
        if was_full != is_full || self.total_received == 1 {
            self.report_health().await;
        }
    }
}

impl Message<GetDlqMessages> for DlqActor {
    type Reply = DlqMessages;

    async fn handle(&mut self, msg: GetDlqMessages, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        DlqMessages(self.entries.iter().rev().take(msg.limit).cloned().collect())
    }
}

impl Message<GetDlqStats> for DlqActor {
    type Reply = DlqStats;

    async fn handle(&mut self, _msg: GetDlqStats, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        DlqStats {
            total_received: self.total_received,
            retained: self.entries.len(),
            capacity: self.capacity,
        }
    }
}
