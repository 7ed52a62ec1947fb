use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::errors::CoordinatorError;
use super::locks::OrderLocks;
use crate::domain::order::{
    DispatchId, DwellPolicy, Order, OrderCommand, OrderEvent, OrderId, OrderItem, OrderStatus,
};
use crate::messaging::{
    decode_inbound, encode, ChannelError, ChannelMessage, ChannelTransport, CodecError,
    CommandMessage, InboundMessage, MachineTopics, TopicKind,
};
use crate::metrics::Metrics;
use crate::state_machine::{Aggregate, DomainEvent};
use crate::store::OrderStore;
use crate::utils::{retry_on_transient, CircuitState, RetryConfig};

// ============================================================================
// Dispense Coordinator
// ============================================================================
//
// The single authority that moves orders through the state machine:
//
//   request handlers ─┐
//   channel events   ─┼─▶ lock(order) ─▶ load ─▶ execute ─▶ save ─▶ (publish)
//   dwell sweeps     ─┘
//
// Every operation on an order runs under that order's lock, and every save
// carries the version that was read.
//
// ============================================================================

/// Read model returned by `get_status`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusView {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub progress: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_id: Option<DispatchId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderStatusView {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            status: order.status,
            progress: order.progress,
            current_step: order.current_step.clone(),
            dispatch_id: order.dispatch_id.clone(),
            failure_reason: order.failure_reason.clone(),
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Arrived on a topic the coordinator does not consume
    NotInbound,
    UnknownOrder,
    /// Names a dispatch that is not the order's live one
    StaleDispatch,
    /// Duplicate or out-of-order delivery
    NoChange,
}

/// What happened to one inbound channel message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    Applied,
    Discarded(DiscardReason),
    Malformed(CodecError),
    Failed(String),
}

impl InboundOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InboundOutcome::Applied => "applied",
            InboundOutcome::Discarded(_) => "discarded",
            InboundOutcome::Malformed(_) => "malformed",
            InboundOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Clone)]
pub struct DispenseCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn OrderStore>,
    channel: Arc<dyn ChannelTransport>,
    topics: MachineTopics,
    locks: OrderLocks,
    dwell: DwellPolicy,
    publish_retry: RetryConfig,
    metrics: Arc<Metrics>,
}

impl DispenseCoordinator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        channel: Arc<dyn ChannelTransport>,
        topics: MachineTopics,
        dwell: DwellPolicy,
        publish_retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                channel,
                topics,
                locks: OrderLocks::new(),
                dwell,
                publish_retry,
                metrics,
            }),
        }
    }

    pub fn topics(&self) -> &MachineTopics {
        &self.inner.topics
    }

    pub fn dwell_policy(&self) -> &DwellPolicy {
        &self.inner.dwell
    }

    pub fn store_backend(&self) -> &'static str {
        self.inner.store.backend_name()
    }

    pub fn channel(&self) -> Arc<dyn ChannelTransport> {
        self.inner.channel.clone()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    pub async fn channel_circuit_state(&self) -> CircuitState {
        let state = self.inner.channel.circuit_state().await;
        self.inner.metrics.update_circuit_breaker_state(state);
        state
    }

    // ========================================================================
    // Request Operations
    // ========================================================================

    pub async fn create_order(&self, items: Vec<OrderItem>) -> Result<Order, CoordinatorError> {
        let order_id = OrderId::generate();
        let event = Order::open(order_id.clone(), items, Utc::now())
            .map_err(|e| CoordinatorError::from_order_error(&order_id, OrderStatus::Pending, e))?;
        let order = Order::apply_first_event(&event)
            .map_err(|e| CoordinatorError::from_order_error(&order_id, OrderStatus::Pending, e))?;

        self.inner.store.insert(&order).await?;
        self.inner.metrics.orders_created.inc();
        self.inner.metrics.record_transition(event.event_type());

        tracing::info!(
            order_id = %order.order_id,
            items = order.items.len(),
            total_amount = %order.total_amount,
            "Order created"
        );
        Ok(order)
    }

    pub async fn confirm_payment(&self, order_id: &OrderId) -> Result<Order, CoordinatorError> {
        let _guard = self.inner.locks.lock(order_id).await;
        let mut order = self.load(order_id).await?;

        self.apply(&mut order, &OrderCommand::ConfirmPayment { at: Utc::now() })
            .await?;

        tracing::info!(order_id = %order_id, "Payment confirmed");
        Ok(order)
    }

    /// Start a dispense and publish its command.
    ///
    /// Returns as soon as the command is on the channel. Passing the live
    /// dispatch id as `retry_of` returns it again without republishing.
    pub async fn trigger_dispense(
        &self,
        order_id: &OrderId,
        retry_of: Option<DispatchId>,
    ) -> Result<DispatchId, CoordinatorError> {
        let _guard = self.inner.locks.lock(order_id).await;
        let mut order = self.load(order_id).await?;

        if let Some(retry_of) = retry_of {
            if order.is_current_dispatch(&retry_of) {
                tracing::info!(
                    order_id = %order_id,
                    dispatch_id = %retry_of,
                    "Dispense retry absorbed, command already published"
                );
                return Ok(retry_of);
            }
        }

        let dispatch_id = DispatchId::generate();
        let now = Utc::now();
        self.apply(
            &mut order,
            &OrderCommand::TriggerDispense {
                dispatch_id: dispatch_id.clone(),
                at: now,
            },
        )
        .await?;

        let command = CommandMessage::dispense(dispatch_id.clone(), order_id.clone(), &order.items, now);
        let delivery = match encode(&command) {
            Ok(payload) => self.publish_command(order_id, &payload).await,
            Err(e) => Err(ChannelError::Rejected(e.to_string())),
        };

        match delivery {
            Ok(()) => {
                self.inner.metrics.record_publish(true);
                tracing::info!(
                    order_id = %order_id,
                    dispatch_id = %dispatch_id,
                    topic = %self.inner.topics.topic(TopicKind::Command),
                    "Dispense command published"
                );
                Ok(dispatch_id)
            }
            Err(e) => {
                self.inner.metrics.record_publish(false);
                self.roll_back(&mut order, &dispatch_id, &e.to_string()).await;
                Err(CoordinatorError::TransportFailure {
                    order_id: order_id.clone(),
                    reason: e.to_string(),
                    retryable: true,
                })
            }
        }
    }

    pub async fn get_status(&self, order_id: &OrderId) -> Result<OrderStatusView, CoordinatorError> {
        let order = self.load(order_id).await?;
        Ok(OrderStatusView::from(&order))
    }

    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order, CoordinatorError> {
        self.load(order_id).await
    }

    /// All orders, newest first
    pub async fn list_orders(&self) -> Result<Vec<Order>, CoordinatorError> {
        Ok(self.inner.store.list().await?)
    }

    // ========================================================================
    // Channel Events
    // ========================================================================

    /// Route a raw channel delivery by its topic
    pub async fn handle_channel_message(&self, message: &ChannelMessage) -> InboundOutcome {
        match self.inner.topics.classify(&message.topic) {
            Some(kind) => self.on_channel_message(kind, &message.payload).await,
            None => {
                tracing::debug!(topic = %message.topic, "Message on foreign topic ignored");
                InboundOutcome::Discarded(DiscardReason::NotInbound)
            }
        }
    }

    /// Apply one telemetry or ack payload. Never fails; the outcome says why
    /// a message had no effect.
    pub async fn on_channel_message(&self, kind: TopicKind, payload: &[u8]) -> InboundOutcome {
        let outcome = if !kind.is_inbound() {
            InboundOutcome::Discarded(DiscardReason::NotInbound)
        } else {
            match decode_inbound(kind, payload, Utc::now()) {
                Ok(message) => self.apply_inbound(&message).await,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Malformed channel message dropped");
                    InboundOutcome::Malformed(e)
                }
            }
        };

        self.inner.metrics.record_channel_message(kind.as_str(), outcome.label());
        outcome
    }

    async fn apply_inbound(&self, message: &InboundMessage) -> InboundOutcome {
        let order_id = message.order_id();
        let dispatch_id = message.dispatch_id();

        let _guard = self.inner.locks.lock(order_id).await;
        let mut order = match self.inner.store.get(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                tracing::debug!(order_id = %order_id, dispatch_id = %dispatch_id, "Message for unknown order");
                return InboundOutcome::Discarded(DiscardReason::UnknownOrder);
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to load order for channel message");
                return InboundOutcome::Failed(e.to_string());
            }
        };

        if !order.is_current_dispatch(dispatch_id) {
            tracing::debug!(
                order_id = %order_id,
                dispatch_id = %dispatch_id,
                status = %order.status,
                "Stale dispatch, message discarded"
            );
            return InboundOutcome::Discarded(DiscardReason::StaleDispatch);
        }

        let now = Utc::now();
        let dispense_started_at = order.status_changed_at;
        let command = match message {
            InboundMessage::Telemetry(t) => OrderCommand::RecordTelemetry {
                dispatch_id: t.dispatch_id.clone(),
                progress: t.progress,
                current_step: t.current_step.clone(),
                at: now,
            },
            InboundMessage::Ack(a) => OrderCommand::RecordAck {
                dispatch_id: a.dispatch_id.clone(),
                outcome: a.outcome(),
                at: now,
            },
        };

        let events = match self.apply(&mut order, &command).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to apply channel message");
                return InboundOutcome::Failed(e.to_string());
            }
        };

        if events.is_empty() {
            tracing::debug!(
                order_id = %order_id,
                kind = %message.kind(),
                progress = order.progress,
                "Duplicate or out-of-order message, no change"
            );
            return InboundOutcome::Discarded(DiscardReason::NoChange);
        }

        if order.status.is_terminal() {
            let elapsed = (now - dispense_started_at).to_std().unwrap_or_default();
            self.inner.metrics.dispense_duration.observe(elapsed.as_secs_f64());
            tracing::info!(
                order_id = %order_id,
                dispatch_id = %dispatch_id,
                status = %order.status,
                failure_reason = ?order.failure_reason,
                "Dispense finished"
            );
        } else {
            tracing::info!(
                order_id = %order_id,
                progress = order.progress,
                step = %order.current_step,
                "Dispense progress"
            );
        }

        InboundOutcome::Applied
    }

    // ========================================================================
    // Dwell-time Expiry
    // ========================================================================

    /// Fail every non-terminal order that stayed too long in its status.
    /// Returns how many orders were expired.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<usize, CoordinatorError> {
        let candidates = self.inner.store.list_active().await?;
        let mut expired = 0;

        for candidate in candidates {
            let Some(limit) = self.inner.dwell.limit_for(candidate.status) else {
                continue;
            };
            if (now - candidate.status_changed_at).to_std().map_or(true, |d| d <= limit) {
                continue;
            }

            match self.expire_one(&candidate.order_id, now).await {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(order_id = %candidate.order_id, error = %e, "Failed to expire order");
                }
            }
        }

        Ok(expired)
    }

    async fn expire_one(&self, order_id: &OrderId, now: DateTime<Utc>) -> Result<bool, CoordinatorError> {
        let _guard = self.inner.locks.lock(order_id).await;
        // Reload: the order may have moved on since the sweep listed it
        let mut order = self.load(order_id).await?;
        let from = order.status;
        let Some(dwell_limit) = self.inner.dwell.limit_for(from) else {
            return Ok(false);
        };

        let events = self.apply(&mut order, &OrderCommand::Expire { dwell_limit, now }).await?;
        if events.is_empty() {
            return Ok(false);
        }

        self.inner.metrics.record_expired(from.as_str());
        tracing::warn!(
            order_id = %order_id,
            from_status = %from,
            dwell_limit_secs = dwell_limit.as_secs(),
            "Order timed out"
        );
        Ok(true)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn load(&self, order_id: &OrderId) -> Result<Order, CoordinatorError> {
        self.inner
            .store
            .get(order_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(order_id.clone()))
    }

    /// Execute `command` and persist the result against the version read
    async fn apply(&self, order: &mut Order, command: &OrderCommand) -> Result<Vec<OrderEvent>, CoordinatorError> {
        let expected_version = order.version();
        let status = order.status;
        let events = order
            .execute(command)
            .map_err(|e| CoordinatorError::from_order_error(&order.order_id, status, e))?;

        if events.is_empty() {
            return Ok(events);
        }

        self.inner.store.save(order, expected_version).await?;
        for event in &events {
            self.inner.metrics.record_transition(event.event_type());
        }
        Ok(events)
    }

    async fn publish_command(&self, order_id: &OrderId, payload: &[u8]) -> Result<(), ChannelError> {
        let channel = self.inner.channel.as_ref();
        let topic = self.inner.topics.topic(TopicKind::Command);
        let key = order_id.as_str();

        retry_on_transient(&self.inner.publish_retry, "publish_dispense_command", move |_| {
            channel.publish(topic, key, payload)
        })
        .await
        .into_result()
    }

    /// Undo a dispatch whose command never left the coordinator
    async fn roll_back(&self, order: &mut Order, dispatch_id: &DispatchId, reason: &str) {
        let abort = OrderCommand::AbortDispense {
            dispatch_id: dispatch_id.clone(),
            reason: reason.to_string(),
            at: Utc::now(),
        };

        match self.apply(order, &abort).await {
            Ok(_) => {
                self.inner.metrics.dispense_rollbacks.inc();
                tracing::warn!(
                    order_id = %order.order_id,
                    dispatch_id = %dispatch_id,
                    reason = %reason,
                    "Dispense rolled back to PAID"
                );
            }
            Err(e) => {
                // Left DISPENSING with an unpublished dispatch; the dwell sweep fails it
                tracing::error!(
                    order_id = %order.order_id,
                    dispatch_id = %dispatch_id,
                    error = %e,
                    "Rollback after publish failure could not be saved"
                );
            }
        }
    }
}
