//! End-to-end runs: coordinator, channel listener and device emulator wired
//! together over the in-process channel, with emulator delays in milliseconds.

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use super::{CoordinatorError, DispenseCoordinator, OrderStatusView};
use crate::actors::{EmulatorSettings, Supervisor, SupervisorSettings};
use crate::domain::order::{DispatchId, DwellPolicy, OrderId, OrderItem, OrderStatus};
use crate::emulator::EmulatorMode;
use crate::messaging::{decode_command, InProcessChannel, MachineTopics, TopicKind};
use crate::metrics::Metrics;
use crate::store::InMemoryOrderStore;
use crate::utils::RetryConfig;

// Nominal run ends at 9 s device time, i.e. 45 ms here
const TIME_SCALE: f64 = 0.005;

struct Rig {
    coordinator: DispenseCoordinator,
    channel: Arc<InProcessChannel>,
    supervisor: Supervisor,
}

impl Rig {
    async fn start(mode: EmulatorMode, dwell: DwellPolicy) -> Self {
        let channel = Arc::new(InProcessChannel::new());
        let coordinator = DispenseCoordinator::new(
            Arc::new(InMemoryOrderStore::new()),
            channel.clone(),
            MachineTopics::new("vm_e2e"),
            dwell,
            RetryConfig::none(),
            Arc::new(Metrics::new().unwrap()),
        );
        let settings = SupervisorSettings {
            health_check_interval: Duration::from_millis(50),
            health_log_interval: Duration::from_secs(60),
            dwell_sweep_interval: Duration::from_millis(10),
            dlq_capacity: 16,
            emulator: Some(EmulatorSettings {
                mode,
                time_scale: TIME_SCALE,
            }),
        };
        let supervisor = Supervisor::start(coordinator.clone(), settings).await.unwrap();

        Self {
            coordinator,
            channel,
            supervisor,
        }
    }

    async fn nominal(mode: EmulatorMode) -> Self {
        Self::start(mode, DwellPolicy::uniform(Duration::from_secs(60))).await
    }

    async fn paid_order(&self, price: rust_decimal::Decimal) -> OrderId {
        let order = self
            .coordinator
            .create_order(vec![OrderItem::new("protein_shake", "A1", price)])
            .await
            .unwrap();
        self.coordinator.confirm_payment(&order.order_id).await.unwrap();
        order.order_id
    }

    /// Poll until the order is terminal or the deadline passes
    async fn settle(&self, order_id: &OrderId) -> OrderStatusView {
        let mut status = self.coordinator.get_status(order_id).await.unwrap();
        for _ in 0..300 {
            if status.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            status = self.coordinator.get_status(order_id).await.unwrap();
        }
        status
    }

    async fn commands(&self) -> usize {
        self.channel
            .published_on(self.coordinator.topics().topic(TopicKind::Command))
            .await
            .len()
    }
}

#[tokio::test]
async fn test_nominal_dispense_completes() {
    let rig = Rig::nominal(EmulatorMode::Nominal).await;
    let order_id = rig.paid_order(dec!(80)).await;

    let order = rig.coordinator.get_order(&order_id).await.unwrap();
    assert_eq!(order.total_amount, dec!(80));
    assert_eq!(order.status, OrderStatus::Paid);

    let dispatch_id = rig.coordinator.trigger_dispense(&order_id, None).await.unwrap();
    let started = rig.coordinator.get_status(&order_id).await.unwrap();
    assert_eq!(started.status, OrderStatus::Dispensing);
    assert_eq!(started.dispatch_id.as_ref(), Some(&dispatch_id));

    let done = rig.settle(&order_id).await;
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.current_step, "Enjoy!");
    assert_eq!(done.dispatch_id, Some(dispatch_id));

    rig.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_silent_device_times_out() {
    let dwell = DwellPolicy {
        pending: Duration::from_secs(60),
        paid: Duration::from_secs(60),
        dispensing: Duration::from_millis(50),
    };
    let rig = Rig::start(EmulatorMode::Silent, dwell).await;
    let order_id = rig.paid_order(dec!(80)).await;

    rig.coordinator.trigger_dispense(&order_id, None).await.unwrap();

    let done = rig.settle(&order_id).await;
    assert_eq!(done.status, OrderStatus::Failed);
    assert_eq!(done.failure_reason.as_deref(), Some("timeout"));

    rig.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_dispense_sends_one_command() {
    let rig = Rig::nominal(EmulatorMode::Nominal).await;
    let order_id = rig.paid_order(dec!(45.50)).await;

    let (first, second) = tokio::join!(
        rig.coordinator.trigger_dispense(&order_id, None),
        rig.coordinator.trigger_dispense(&order_id, None),
    );

    let (winner, loser) = match (first, second) {
        (Ok(d), Err(e)) | (Err(e), Ok(d)) => (d, e),
        other => panic!("expected exactly one dispatch, got {:?}", other),
    };
    assert!(matches!(loser, CoordinatorError::InvalidState { .. }));

    // Naming the in-flight dispatch is absorbed
    let again = rig.coordinator.trigger_dispense(&order_id, Some(winner.clone())).await.unwrap();
    assert_eq!(again, winner);
    assert_eq!(rig.commands().await, 1);

    let done = rig.settle(&order_id).await;
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(rig.commands().await, 1);

    rig.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_out_of_order_telemetry_still_completes() {
    let rig = Rig::nominal(EmulatorMode::OutOfOrder).await;
    let order_id = rig.paid_order(dec!(80)).await;
    rig.coordinator.trigger_dispense(&order_id, None).await.unwrap();

    // After 20 and 80 arrive the late 50 must not pull progress back
    let mut highest = 0;
    let mut status = rig.coordinator.get_status(&order_id).await.unwrap();
    for _ in 0..300 {
        assert!(status.progress >= highest, "progress went back from {} to {}", highest, status.progress);
        highest = status.progress;
        if status.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        status = rig.coordinator.get_status(&order_id).await.unwrap();
    }

    assert_eq!(status.status, OrderStatus::Completed);
    assert_eq!(status.progress, 100);

    rig.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_ack_is_idempotent() {
    let rig = Rig::nominal(EmulatorMode::DuplicateAck).await;
    let order_id = rig.paid_order(dec!(80)).await;
    rig.coordinator.trigger_dispense(&order_id, None).await.unwrap();

    let done = rig.settle(&order_id).await;
    assert_eq!(done.status, OrderStatus::Completed);
    let version = rig.coordinator.get_order(&order_id).await.unwrap().version;

    // Second ack lands at 10 s device time
    tokio::time::sleep(Duration::from_millis(40)).await;
    let after = rig.coordinator.get_order(&order_id).await.unwrap();
    assert_eq!(after.status, OrderStatus::Completed);
    assert_eq!(after.version, version);

    let stats = rig.supervisor.listener_stats().await.unwrap();
    assert!(stats.discarded >= 1);

    rig.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_device_fault_fails_order_with_message() {
    let rig = Rig::nominal(EmulatorMode::Fault("Cup dispenser empty".to_string())).await;
    let order_id = rig.paid_order(dec!(80)).await;
    rig.coordinator.trigger_dispense(&order_id, None).await.unwrap();

    let done = rig.settle(&order_id).await;
    assert_eq!(done.status, OrderStatus::Failed);
    assert_eq!(done.failure_reason.as_deref(), Some("Cup dispenser empty"));
    assert_eq!(done.progress, 20);

    rig.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_transport_outage_rolls_back_then_dispense_completes() {
    let rig = Rig::nominal(EmulatorMode::Nominal).await;
    let order_id = rig.paid_order(dec!(80)).await;

    rig.channel.set_offline(true);
    let err = rig.coordinator.trigger_dispense(&order_id, None).await.unwrap_err();
    assert!(err.is_retryable());
    let rolled_back = rig.coordinator.get_status(&order_id).await.unwrap();
    assert_eq!(rolled_back.status, OrderStatus::Paid);
    assert_eq!(rolled_back.dispatch_id, None);

    rig.channel.set_offline(false);
    let dispatch_id = rig.coordinator.trigger_dispense(&order_id, None).await.unwrap();

    let done = rig.settle(&order_id).await;
    assert_eq!(done.status, OrderStatus::Completed);
    assert_eq!(done.dispatch_id, Some(dispatch_id));

    rig.supervisor.shutdown().await;
}

#[tokio::test]
async fn test_published_command_matches_wire_contract() {
    let rig = Rig::nominal(EmulatorMode::Silent).await;
    let order_id = rig.paid_order(dec!(80)).await;
    let dispatch_id = rig.coordinator.trigger_dispense(&order_id, None).await.unwrap();

    let published = rig
        .channel
        .published_on(rig.coordinator.topics().topic(TopicKind::Command))
        .await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].key.as_deref(), Some(order_id.as_str()));

    let command = decode_command(&published[0].payload).unwrap();
    assert_eq!(command.dispatch_id, dispatch_id);
    assert_eq!(command.order_id, order_id);
    assert_eq!(command.items.len(), 1);
    assert_eq!(command.items[0].slot, "A1");

    // A stale dispatch id never matches
    assert_ne!(command.dispatch_id, DispatchId::new("dsp_stale"));

    rig.supervisor.shutdown().await;
}
