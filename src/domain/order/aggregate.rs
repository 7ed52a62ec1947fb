use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::state_machine::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{DispatchId, DispenseOutcome, OrderId, OrderItem, OrderStatus};

pub const STEP_AWAITING_PAYMENT: &str = "Waiting for payment";
pub const STEP_PAYMENT_CONFIRMED: &str = "Payment confirmed";
pub const STEP_DISPENSE_STARTED: &str = "Started dispensing";
pub const STEP_COMPLETED: &str = "Enjoy!";
pub const REASON_TIMEOUT: &str = "timeout";
pub const REASON_DEVICE_FAILURE: &str = "device reported failure";

// ============================================================================
// Order Aggregate - Dispense Lifecycle State Machine
// ============================================================================
//
//   PENDING ──pay──▶ PAID ──dispense──▶ DISPENSING ──ack──▶ COMPLETED | FAILED
//                     ▲                     │
//                     └──────abort──────────┘   (command never published)
//
//   Any non-terminal status ──expire──▶ FAILED ("timeout")
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub order_id: OrderId,
    pub version: u64,

    // Immutable contents
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,

    // Lifecycle
    pub status: OrderStatus,
    pub progress: u8,
    pub current_step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_id: Option<DispatchId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

impl Order {
    /// Validate a new order request and produce its creation event
    pub fn open(
        order_id: OrderId,
        items: Vec<OrderItem>,
        at: DateTime<Utc>,
    ) -> Result<OrderEvent, OrderError> {
        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        for item in &items {
            item.validate()?;
        }

        let total_amount = items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| item.line_total()?.checked_add(total))
            .ok_or_else(|| OrderError::InvalidItem("amount overflow".to_string()))?;

        Ok(OrderEvent::Created(OrderCreated {
            order_id,
            items,
            total_amount,
            created_at: at,
        }))
    }

    /// Whether an inbound message for `dispatch_id` targets the live dispatch
    pub fn is_current_dispatch(&self, dispatch_id: &DispatchId) -> bool {
        self.status == OrderStatus::Dispensing && self.dispatch_id.as_ref() == Some(dispatch_id)
    }

    fn reject(&self, command: &OrderCommand) -> OrderError {
        OrderError::InvalidTransition {
            from: self.status,
            action: command.name(),
        }
    }

    fn enter(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.status_changed_at = at;
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Created(e) => Ok(Self {
                order_id: e.order_id.clone(),
                version: 1,
                items: e.items.clone(),
                total_amount: e.total_amount,
                status: OrderStatus::Pending,
                progress: 0,
                current_step: STEP_AWAITING_PAYMENT.to_string(),
                dispatch_id: None,
                failure_reason: None,
                created_at: e.created_at,
                updated_at: e.created_at,
                status_changed_at: e.created_at,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Created(_) => {
                return Err(OrderError::InvalidTransition {
                    from: self.status,
                    action: "re-create",
                })
            }
            OrderEvent::PaymentConfirmed(e) => {
                self.enter(OrderStatus::Paid, e.confirmed_at);
                self.current_step = STEP_PAYMENT_CONFIRMED.to_string();
            }
            OrderEvent::DispenseStarted(e) => {
                self.enter(OrderStatus::Dispensing, e.started_at);
                self.dispatch_id = Some(e.dispatch_id.clone());
                self.progress = 0;
                self.current_step = STEP_DISPENSE_STARTED.to_string();
            }
            OrderEvent::DispenseAborted(e) => {
                self.enter(OrderStatus::Paid, e.aborted_at);
                self.dispatch_id = None;
                self.progress = 0;
                self.current_step = format!("Dispense not sent: {}", e.reason);
            }
            OrderEvent::ProgressReported(e) => {
                self.progress = self.progress.max(e.progress);
                self.current_step = e.current_step.clone();
            }
            OrderEvent::DispenseCompleted(e) => {
                self.enter(OrderStatus::Completed, e.completed_at);
                self.progress = 100;
                self.current_step = STEP_COMPLETED.to_string();
            }
            OrderEvent::DispenseFailed(e) => {
                self.enter(OrderStatus::Failed, e.failed_at);
                self.failure_reason = Some(e.reason.clone());
                self.current_step = e.reason.clone();
            }
            OrderEvent::Expired(e) => {
                self.enter(OrderStatus::Failed, e.expired_at);
                self.failure_reason = Some(REASON_TIMEOUT.to_string());
                self.current_step = format!("Timed out while {}", e.expired_from);
            }
        }

        self.version += 1;
        self.updated_at = event.occurred_at();
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::ConfirmPayment { at } => {
                if self.status != OrderStatus::Pending {
                    return Err(self.reject(command));
                }

                Ok(vec![OrderEvent::PaymentConfirmed(PaymentConfirmed {
                    confirmed_at: *at,
                })])
            }

            OrderCommand::TriggerDispense { dispatch_id, at } => {
                if self.status != OrderStatus::Paid {
                    return Err(self.reject(command));
                }

                Ok(vec![OrderEvent::DispenseStarted(DispenseStarted {
                    dispatch_id: dispatch_id.clone(),
                    started_at: *at,
                })])
            }

            OrderCommand::AbortDispense { dispatch_id, reason, at } => {
                if !self.is_current_dispatch(dispatch_id) {
                    return Err(self.reject(command));
                }

                Ok(vec![OrderEvent::DispenseAborted(DispenseAborted {
                    dispatch_id: dispatch_id.clone(),
                    reason: reason.clone(),
                    aborted_at: *at,
                })])
            }

            OrderCommand::RecordTelemetry { dispatch_id, progress, current_step, at } => {
                // Stale or duplicate deliveries are dropped, never rejected
                if !self.is_current_dispatch(dispatch_id) {
                    return Ok(vec![]);
                }

                let progress = (*progress).min(100);
                if progress < self.progress {
                    return Ok(vec![]);
                }
                if progress == self.progress && *current_step == self.current_step {
                    return Ok(vec![]);
                }

                Ok(vec![OrderEvent::ProgressReported(ProgressReported {
                    dispatch_id: dispatch_id.clone(),
                    progress,
                    current_step: current_step.clone(),
                    reported_at: *at,
                })])
            }

            OrderCommand::RecordAck { dispatch_id, outcome, at } => {
                if !self.is_current_dispatch(dispatch_id) {
                    return Ok(vec![]);
                }

                let event = match outcome {
                    DispenseOutcome::Completed => OrderEvent::DispenseCompleted(DispenseCompleted {
                        dispatch_id: dispatch_id.clone(),
                        completed_at: *at,
                    }),
                    DispenseOutcome::Failed { message } => {
                        let reason = message
                            .as_deref()
                            .map(str::trim)
                            .filter(|m| !m.is_empty())
                            .unwrap_or(REASON_DEVICE_FAILURE)
                            .to_string();

                        OrderEvent::DispenseFailed(DispenseFailed {
                            dispatch_id: dispatch_id.clone(),
                            reason,
                            failed_at: *at,
                        })
                    }
                };

                Ok(vec![event])
            }

            OrderCommand::Expire { dwell_limit, now } => {
                if self.status.is_terminal() {
                    return Ok(vec![]);
                }

                // A clock that went backwards is treated as not overdue
                let overdue = match (*now - self.status_changed_at).to_std() {
                    Ok(elapsed) => elapsed > *dwell_limit,
                    Err(_) => false,
                };
                if !overdue {
                    return Ok(vec![]);
                }

                Ok(vec![OrderEvent::Expired(OrderExpired {
                    expired_from: self.status,
                    expired_at: *now,
                })])
            }
        }
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + ChronoDuration::seconds(secs)
    }

    fn create_order() -> Order {
        let event = Order::open(
            OrderId::new("ord_test"),
            vec![OrderItem::new("shake-choc", "A1", dec!(80))],
            t0(),
        )
        .unwrap();
        Order::apply_first_event(&event).unwrap()
    }

    fn paid_order() -> Order {
        let mut order = create_order();
        order.execute(&OrderCommand::ConfirmPayment { at: at(1) }).unwrap();
        order
    }

    fn dispensing_order(dispatch_id: &DispatchId) -> Order {
        let mut order = paid_order();
        order
            .execute(&OrderCommand::TriggerDispense {
                dispatch_id: dispatch_id.clone(),
                at: at(2),
            })
            .unwrap();
        order
    }

    fn telemetry(dispatch_id: &DispatchId, progress: u8, step: &str) -> OrderCommand {
        OrderCommand::RecordTelemetry {
            dispatch_id: dispatch_id.clone(),
            progress,
            current_step: step.to_string(),
            at: at(3),
        }
    }

    fn ack(dispatch_id: &DispatchId, outcome: DispenseOutcome) -> OrderCommand {
        OrderCommand::RecordAck {
            dispatch_id: dispatch_id.clone(),
            outcome,
            at: at(4),
        }
    }

    #[test]
    fn test_create_order_computes_total() {
        let event = Order::open(
            OrderId::new("ord_multi"),
            vec![
                OrderItem::new("shake-choc", "A1", dec!(80)),
                OrderItem::new("protein-bar", "B4", dec!(35.50)).with_quantity(2),
            ],
            t0(),
        )
        .unwrap();
        let order = Order::apply_first_event(&event).unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, dec!(151.00));
        assert_eq!(order.progress, 0);
        assert_eq!(order.current_step, STEP_AWAITING_PAYMENT);
        assert_eq!(order.dispatch_id, None);
        assert_eq!(order.version(), 1);
    }

    #[test]
    fn test_create_order_with_empty_items_fails() {
        let result = Order::open(OrderId::new("ord_empty"), vec![], t0());
        assert_eq!(result.unwrap_err(), OrderError::EmptyItems);
    }

    #[test]
    fn test_create_order_with_invalid_item_fails() {
        let result = Order::open(
            OrderId::new("ord_bad"),
            vec![OrderItem::new("shake", "A1", dec!(10)).with_quantity(0)],
            t0(),
        );
        assert!(matches!(result, Err(OrderError::InvalidItem(_))));
    }

    #[test]
    fn test_create_order_with_overflowing_line_total_fails() {
        let result = Order::open(
            OrderId::new("ord_huge_line"),
            vec![OrderItem::new("shake", "A1", Decimal::MAX).with_quantity(2)],
            t0(),
        );
        assert_eq!(
            result.unwrap_err(),
            OrderError::InvalidItem("amount overflow".to_string())
        );
    }

    #[test]
    fn test_create_order_with_overflowing_sum_fails() {
        let result = Order::open(
            OrderId::new("ord_huge_sum"),
            vec![
                OrderItem::new("shake", "A1", Decimal::MAX),
                OrderItem::new("bar", "B2", Decimal::MAX),
            ],
            t0(),
        );
        assert_eq!(
            result.unwrap_err(),
            OrderError::InvalidItem("amount overflow".to_string())
        );
    }

    #[test]
    fn test_first_event_must_be_created() {
        let event = OrderEvent::PaymentConfirmed(PaymentConfirmed { confirmed_at: t0() });
        assert_eq!(Order::apply_first_event(&event).unwrap_err(), OrderError::NotInitialized);
    }

    #[test]
    fn test_confirm_payment() {
        let order = paid_order();
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.current_step, STEP_PAYMENT_CONFIRMED);
        assert_eq!(order.status_changed_at, at(1));
        assert_eq!(order.version(), 2);
    }

    #[test]
    fn test_confirm_payment_twice_is_rejected() {
        let mut order = paid_order();
        let err = order.execute(&OrderCommand::ConfirmPayment { at: at(5) }).unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition { from: OrderStatus::Paid, .. }
        ));
    }

    #[test]
    fn test_trigger_dispense_from_paid() {
        let dispatch_id = DispatchId::new("dsp_1");
        let order = dispensing_order(&dispatch_id);

        assert_eq!(order.status, OrderStatus::Dispensing);
        assert_eq!(order.dispatch_id, Some(dispatch_id));
        assert_eq!(order.progress, 0);
        assert_eq!(order.current_step, STEP_DISPENSE_STARTED);
    }

    #[test]
    fn test_trigger_dispense_outside_paid_is_rejected_without_mutation() {
        let pending = create_order();
        let dispatch_id = DispatchId::new("dsp_1");
        let dispensing = dispensing_order(&dispatch_id);

        for original in [pending, dispensing] {
            let mut order = original.clone();
            let result = order.execute(&OrderCommand::TriggerDispense {
                dispatch_id: DispatchId::new("dsp_2"),
                at: at(9),
            });
            assert!(matches!(result, Err(OrderError::InvalidTransition { .. })));
            assert_eq!(order, original);
        }
    }

    #[test]
    fn test_telemetry_updates_progress_and_step() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        let events = order.execute(&telemetry(&dispatch_id, 50, "Adding water")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(order.progress, 50);
        assert_eq!(order.current_step, "Adding water");
        assert_eq!(order.status, OrderStatus::Dispensing);
    }

    #[test]
    fn test_progress_never_moves_backwards() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        order.execute(&telemetry(&dispatch_id, 20, "Dispensing powder")).unwrap();
        order.execute(&telemetry(&dispatch_id, 80, "Mixing shake")).unwrap();
        let events = order.execute(&telemetry(&dispatch_id, 50, "Adding water")).unwrap();

        assert!(events.is_empty());
        assert_eq!(order.progress, 80);
        assert_eq!(order.current_step, "Mixing shake");
    }

    #[test]
    fn test_equal_progress_with_new_step_is_accepted() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        order.execute(&telemetry(&dispatch_id, 50, "Adding water")).unwrap();
        let events = order.execute(&telemetry(&dispatch_id, 50, "Still adding water")).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(order.current_step, "Still adding water");

        let duplicate = order.execute(&telemetry(&dispatch_id, 50, "Still adding water")).unwrap();
        assert!(duplicate.is_empty());
    }

    #[test]
    fn test_progress_above_hundred_is_clamped() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        order.execute(&telemetry(&dispatch_id, 250, "Overflow")).unwrap();
        assert_eq!(order.progress, 100);
    }

    #[test]
    fn test_mismatched_dispatch_is_ignored() {
        let dispatch_id = DispatchId::new("dsp_live");
        let stale = DispatchId::new("dsp_stale");
        let mut order = dispensing_order(&dispatch_id);
        order.execute(&telemetry(&dispatch_id, 20, "Dispensing powder")).unwrap();
        let before = order.clone();

        assert!(order.execute(&telemetry(&stale, 90, "Wrong")).unwrap().is_empty());
        assert!(order.execute(&ack(&stale, DispenseOutcome::Completed)).unwrap().is_empty());
        assert_eq!(order, before);
    }

    #[test]
    fn test_ack_completed() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);
        order.execute(&telemetry(&dispatch_id, 50, "Adding water")).unwrap();

        order.execute(&ack(&dispatch_id, DispenseOutcome::Completed)).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.progress, 100);
        assert_eq!(order.current_step, STEP_COMPLETED);
        assert_eq!(order.failure_reason, None);
    }

    #[test]
    fn test_ack_failed_keeps_device_message() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        order
            .execute(&ack(
                &dispatch_id,
                DispenseOutcome::Failed { message: Some("Slot A1 jammed".to_string()) },
            ))
            .unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.failure_reason.as_deref(), Some("Slot A1 jammed"));
    }

    #[test]
    fn test_ack_failed_without_message_gets_default_reason() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        order
            .execute(&ack(&dispatch_id, DispenseOutcome::Failed { message: Some("  ".to_string()) }))
            .unwrap();
        assert_eq!(order.failure_reason.as_deref(), Some(REASON_DEVICE_FAILURE));
    }

    #[test]
    fn test_only_one_terminal_transition_per_dispatch() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);
        order.execute(&ack(&dispatch_id, DispenseOutcome::Completed)).unwrap();
        let completed = order.clone();

        assert!(order.execute(&ack(&dispatch_id, DispenseOutcome::Completed)).unwrap().is_empty());
        assert!(order
            .execute(&ack(&dispatch_id, DispenseOutcome::Failed { message: None }))
            .unwrap()
            .is_empty());
        assert!(order.execute(&telemetry(&dispatch_id, 100, "Late")).unwrap().is_empty());
        assert_eq!(order, completed);
    }

    #[test]
    fn test_abort_dispense_rolls_back_to_paid() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        order
            .execute(&OrderCommand::AbortDispense {
                dispatch_id: dispatch_id.clone(),
                reason: "broker unavailable".to_string(),
                at: at(3),
            })
            .unwrap();

        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.dispatch_id, None);
        assert!(order.current_step.contains("broker unavailable"));

        // The abandoned dispatch can no longer move the order
        assert!(order.execute(&ack(&dispatch_id, DispenseOutcome::Completed)).unwrap().is_empty());
        assert_eq!(order.status, OrderStatus::Paid);
    }

    #[test]
    fn test_abort_requires_matching_dispatch() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        let result = order.execute(&OrderCommand::AbortDispense {
            dispatch_id: DispatchId::new("dsp_other"),
            reason: "x".to_string(),
            at: at(3),
        });
        assert!(result.is_err());
        assert_eq!(order.status, OrderStatus::Dispensing);
    }

    #[test]
    fn test_expire_after_dwell_limit() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);

        let early = order
            .execute(&OrderCommand::Expire { dwell_limit: Duration::from_secs(60), now: at(30) })
            .unwrap();
        assert!(early.is_empty());
        assert_eq!(order.status, OrderStatus::Dispensing);

        let events = order
            .execute(&OrderCommand::Expire { dwell_limit: Duration::from_secs(60), now: at(120) })
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.failure_reason.as_deref(), Some(REASON_TIMEOUT));

        // A late ack after expiry changes nothing
        assert!(order.execute(&ack(&dispatch_id, DispenseOutcome::Completed)).unwrap().is_empty());
        assert_eq!(order.status, OrderStatus::Failed);
    }

    #[test]
    fn test_expire_pending_and_paid() {
        let mut pending = create_order();
        pending
            .execute(&OrderCommand::Expire { dwell_limit: Duration::from_secs(10), now: at(11) })
            .unwrap();
        assert_eq!(pending.status, OrderStatus::Failed);

        let mut paid = paid_order();
        paid.execute(&OrderCommand::Expire { dwell_limit: Duration::from_secs(10), now: at(12) })
            .unwrap();
        assert_eq!(paid.status, OrderStatus::Failed);
        assert!(paid.current_step.contains("PAID"));
    }

    #[test]
    fn test_expire_ignores_terminal_orders_and_clock_skew() {
        let dispatch_id = DispatchId::new("dsp_1");
        let mut order = dispensing_order(&dispatch_id);
        order.execute(&ack(&dispatch_id, DispenseOutcome::Completed)).unwrap();

        let events = order
            .execute(&OrderCommand::Expire { dwell_limit: Duration::ZERO, now: at(1_000) })
            .unwrap();
        assert!(events.is_empty());

        let mut pending = create_order();
        let events = pending
            .execute(&OrderCommand::Expire { dwell_limit: Duration::ZERO, now: at(-60) })
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_order_record_round_trips_through_json() {
        let dispatch_id = DispatchId::new("dsp_1");
        let order = dispensing_order(&dispatch_id);

        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains("\"orderId\":\"ord_test\""));
        assert!(json.contains("\"status\":\"DISPENSING\""));

        let restored: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, order);
    }
}
