// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::utils::CircuitState;

pub use server::{metrics_handler, render};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Order creation and state-machine transitions
// - Inbound channel messages by kind and outcome
// - Command publishing, rollbacks and retry outcomes
// - Dwell-time expiry
// - Dead letter queue and circuit breaker state
//
// All metrics are registered with one Registry and scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order lifecycle
    pub orders_created: IntCounter,
    pub order_transitions: IntCounterVec,
    pub orders_expired: IntCounterVec,
    pub dispense_duration: Histogram,

    // Channel
    pub channel_messages: IntCounterVec,
    pub commands_published: IntCounterVec,
    pub dispense_rollbacks: IntCounter,

    // DLQ
    pub dlq_messages_total: IntCounter,

    // Circuit Breaker
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders created")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_transitions = IntCounterVec::new(
            Opts::new("order_transitions_total", "Applied order state-machine events"),
            &["event"],
        )?;
        registry.register(Box::new(order_transitions.clone()))?;

        let orders_expired = IntCounterVec::new(
            Opts::new("orders_expired_total", "Orders failed by dwell-time expiry"),
            &["from_status"],
        )?;
        registry.register(Box::new(orders_expired.clone()))?;

        let dispense_duration = Histogram::with_opts(
            HistogramOpts::new(
                "dispense_duration_seconds",
                "Time from dispense start to terminal ack",
            )
            .buckets(vec![1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0]),
        )?;
        registry.register(Box::new(dispense_duration.clone()))?;

        let channel_messages = IntCounterVec::new(
            Opts::new("channel_messages_total", "Inbound channel messages"),
            &["kind", "outcome"],
        )?;
        registry.register(Box::new(channel_messages.clone()))?;

        let commands_published = IntCounterVec::new(
            Opts::new("commands_published_total", "Dispense commands publish attempts by result"),
            &["result"],
        )?;
        registry.register(Box::new(commands_published.clone()))?;

        let dispense_rollbacks = IntCounter::new(
            "dispense_rollbacks_total",
            "Dispatches rolled back to PAID after publish failure",
        )?;
        registry.register(Box::new(dispense_rollbacks.clone()))?;

        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Total malformed messages sent to the dead letter queue",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_transitions,
            orders_expired,
            dispense_duration,
            channel_messages,
            commands_published,
            dispense_rollbacks,
            dlq_messages_total,
            circuit_breaker_state,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, event_type: &str) {
        self.order_transitions.with_label_values(&[event_type]).inc();
    }

    pub fn record_channel_message(&self, kind: &str, outcome: &str) {
        self.channel_messages.with_label_values(&[kind, outcome]).inc();
    }

    pub fn record_publish(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.commands_published.with_label_values(&[result]).inc();
    }

    pub fn record_expired(&self, from_status: &str) {
        self.orders_expired.with_label_values(&[from_status]).inc();
    }

    pub fn record_dlq_message(&self) {
        self.dlq_messages_total.inc();
    }

    pub fn update_circuit_breaker_state(&self, state: CircuitState) {
        self.circuit_breaker_state.set(state.as_gauge());
    }
}
