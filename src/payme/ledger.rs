//! The transaction state machine behind the processor callbacks.
//!
//! All writes go through a single atomic store call, so duplicate or
//! concurrent deliveries either replay the recorded outcome or lose cleanly.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{Order, OrderStatus, PaymentStatus, Transaction};
use crate::domain::transaction::{NotPerformable, Transition};
use crate::payme::amount::AmountConverter;
use crate::payme::error::PaymentError;
use crate::ports::{PaymentSnapshot, PaymentStore, StoreError};

/// Source of "now" in processor milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Order reference as carried in the callback's `account` object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Id(i64),
    /// Present but not an order identifier; never matches an order.
    Unresolvable(String),
}

impl OrderRef {
    pub fn from_account_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => n
                .as_i64()
                .map(OrderRef::Id)
                .unwrap_or_else(|| OrderRef::Unresolvable(n.to_string())),
            Value::String(s) => s
                .trim()
                .parse()
                .map(OrderRef::Id)
                .unwrap_or_else(|_| OrderRef::Unresolvable(s.clone())),
            other => OrderRef::Unresolvable(other.to_string()),
        }
    }

    fn resolve(&self) -> Result<i64, PaymentError> {
        match self {
            OrderRef::Id(id) => Ok(*id),
            OrderRef::Unresolvable(raw) => Err(PaymentError::OrderNotFound(raw.clone())),
        }
    }
}

pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

pub struct TransactionLedger {
    store: Arc<dyn PaymentStore>,
    amounts: AmountConverter,
    clock: Arc<dyn Clock>,
}

impl TransactionLedger {
    pub fn new(store: Arc<dyn PaymentStore>, amounts: AmountConverter, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            amounts,
            clock,
        }
    }

    /// Read-only pre-authorisation. `Ok` means the processor may proceed.
    pub async fn check_perform_transaction(
        &self,
        order_ref: &OrderRef,
        amount: i64,
    ) -> Result<(), PaymentError> {
        let order_id = order_ref.resolve()?;
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;

        ensure_payable(&self.amounts, &order, amount)
    }

    /// Links a new processor transaction to the order, or replays the
    /// original creation when `transaction_id` is already known.
    pub async fn create_transaction(
        &self,
        order_ref: &OrderRef,
        transaction_id: &str,
        create_time: i64,
        amount: i64,
    ) -> Result<Transaction, PaymentError> {
        if let Some(existing) = self.store.find_transaction(transaction_id).await? {
            if order_ref != &OrderRef::Id(existing.order_id) {
                warn!(
                    transaction_id,
                    order_id = existing.order_id,
                    requested = ?order_ref,
                    "Repeated CreateTransaction names a different order"
                );
            }
            debug!(transaction_id, "Replaying transaction creation");
            return Ok(existing);
        }

        let order_id = order_ref.resolve()?;
        let amounts = self.amounts;
        let decide = |snapshot: &mut PaymentSnapshot| -> Result<(), PaymentError> {
            let linked = snapshot
                .transaction
                .as_ref()
                .map(|tx| tx.id.clone())
                .or_else(|| snapshot.order.transaction_id.clone());

            match linked {
                Some(linked) if linked == transaction_id => return Ok(()),
                Some(linked) => {
                    return Err(PaymentError::OrderLinkedElsewhere {
                        order_id: snapshot.order.id,
                        linked,
                    });
                }
                None => {}
            }

            ensure_payable(&amounts, &snapshot.order, amount)?;

            snapshot.transaction = Some(Transaction::created(
                transaction_id.to_string(),
                snapshot.order.id,
                snapshot.order.amount.clone(),
                create_time,
            ));
            snapshot.order.transaction_id = Some(transaction_id.to_string());
            snapshot.order.transaction_created_at = millis_to_datetime(create_time);
            snapshot.order.payment_status = PaymentStatus::Pending;
            Ok(())
        };

        match self.store.modify_order(order_id, &decide).await {
            Ok(snapshot) => {
                let tx = snapshot.transaction.ok_or_else(|| {
                    StoreError::Conflict(format!("order {} lost its transaction link", order_id))
                })?;
                info!(
                    transaction_id,
                    order_id,
                    create_time = tx.create_time,
                    "Transaction created"
                );
                Ok(tx)
            }
            // Another delivery inserted the same transaction id first.
            Err(PaymentError::Store(StoreError::Conflict(reason))) => {
                debug!(transaction_id, %reason, "Lost creation race, replaying winner");
                self.store
                    .find_transaction(transaction_id)
                    .await?
                    .ok_or_else(|| PaymentError::Store(StoreError::Conflict(reason)))
            }
            Err(e) => Err(e),
        }
    }

    /// `Created -> Completed`; marks the order paid and active. Repeated calls
    /// return the first perform time.
    pub async fn perform_transaction(&self, transaction_id: &str) -> Result<Transaction, PaymentError> {
        let now = self.clock.now_millis();
        let decide = |snapshot: &mut PaymentSnapshot| -> Result<(), PaymentError> {
            let tx = snapshot
                .transaction
                .as_mut()
                .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;

            match tx.perform(now) {
                Ok(Transition::Applied) => {
                    snapshot.order.status = OrderStatus::Active;
                    snapshot.order.payment_status = PaymentStatus::Paid;
                    snapshot.order.paid_at = millis_to_datetime(now);
                    Ok(())
                }
                Ok(Transition::Replayed) => Ok(()),
                Err(NotPerformable(state)) => Err(PaymentError::NotPerformable {
                    id: transaction_id.to_string(),
                    state,
                }),
            }
        };

        let snapshot = self.store.modify_transaction(transaction_id, &decide).await?;
        let tx = linked_transaction(snapshot, transaction_id)?;
        if tx.perform_time == Some(now) {
            info!(transaction_id, order_id = tx.order_id, perform_time = now, "Transaction performed");
        } else {
            debug!(transaction_id, "Replaying transaction perform");
        }
        Ok(tx)
    }

    /// Cancels from either live state and marks the order cancelled. Repeated
    /// calls return the first cancel time, state and reason.
    pub async fn cancel_transaction(
        &self,
        transaction_id: &str,
        reason: i32,
    ) -> Result<Transaction, PaymentError> {
        let now = self.clock.now_millis();
        let decide = |snapshot: &mut PaymentSnapshot| -> Result<(), PaymentError> {
            let tx = snapshot
                .transaction
                .as_mut()
                .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;

            if tx.cancel(now, reason) == Transition::Applied {
                snapshot.order.status = OrderStatus::Cancelled;
                snapshot.order.payment_status = PaymentStatus::Failed;
            }
            Ok(())
        };

        let snapshot = self.store.modify_transaction(transaction_id, &decide).await?;
        let tx = linked_transaction(snapshot, transaction_id)?;
        if tx.cancel_time == Some(now) {
            info!(
                transaction_id,
                order_id = tx.order_id,
                state = tx.state.code(),
                reason,
                "Transaction cancelled"
            );
        } else {
            debug!(transaction_id, "Replaying transaction cancel");
        }
        Ok(tx)
    }

    pub async fn check_transaction(&self, transaction_id: &str) -> Result<Transaction, PaymentError> {
        self.store
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))
    }
}

fn ensure_payable(amounts: &AmountConverter, order: &Order, amount: i64) -> Result<(), PaymentError> {
    let expected = amounts.to_minor_units(&order.amount)?;
    if expected != amount {
        return Err(PaymentError::AmountMismatch {
            expected,
            received: amount,
        });
    }
    if order.is_paid() {
        return Err(PaymentError::AlreadyPaid(order.id));
    }
    Ok(())
}

fn linked_transaction(snapshot: PaymentSnapshot, transaction_id: &str) -> Result<Transaction, PaymentError> {
    snapshot
        .transaction
        .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory::InMemoryPaymentStore;
    use crate::domain::TransactionState;
    use bigdecimal::BigDecimal;
    use serde_json::json;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct StepClock(AtomicI64);

    impl Clock for StepClock {
        fn now_millis(&self) -> i64 {
            self.0.fetch_add(1_000, Ordering::SeqCst)
        }
    }

    async fn ledger_with_order(amount: i64) -> (TransactionLedger, InMemoryPaymentStore) {
        let store = InMemoryPaymentStore::new();
        store.insert_order(Order::new(501, BigDecimal::from(amount), "UZS")).await;
        let ledger = TransactionLedger::new(
            Arc::new(store.clone()),
            AmountConverter::default(),
            Arc::new(StepClock(AtomicI64::new(10_000))),
        );
        (ledger, store)
    }

    #[test]
    fn order_ref_accepts_numbers_and_numeric_strings() {
        assert_eq!(OrderRef::from_account_value(&json!(501)), OrderRef::Id(501));
        assert_eq!(OrderRef::from_account_value(&json!(" 501 ")), OrderRef::Id(501));
        assert_eq!(
            OrderRef::from_account_value(&json!("abc")),
            OrderRef::Unresolvable("abc".to_string())
        );
        assert!(matches!(
            OrderRef::from_account_value(&json!(1.5)),
            OrderRef::Unresolvable(_)
        ));
    }

    #[tokio::test]
    async fn check_perform_allows_exact_amount_on_unpaid_order() {
        let (ledger, _) = ledger_with_order(50_000).await;
        assert!(ledger
            .check_perform_transaction(&OrderRef::Id(501), 5_000_000)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn check_perform_rejects_unknown_order_and_wrong_amount() {
        let (ledger, _) = ledger_with_order(50_000).await;
        assert!(matches!(
            ledger.check_perform_transaction(&OrderRef::Id(999), 5_000_000).await,
            Err(PaymentError::OrderNotFound(_))
        ));
        assert!(matches!(
            ledger
                .check_perform_transaction(&OrderRef::Unresolvable("x".into()), 5_000_000)
                .await,
            Err(PaymentError::OrderNotFound(_))
        ));
        assert!(matches!(
            ledger.check_perform_transaction(&OrderRef::Id(501), 50_000).await,
            Err(PaymentError::AmountMismatch {
                expected: 5_000_000,
                received: 50_000
            })
        ));
    }

    #[tokio::test]
    async fn create_is_idempotent_per_transaction_id() {
        let (ledger, store) = ledger_with_order(50_000).await;
        let first = ledger
            .create_transaction(&OrderRef::Id(501), "tx1", 1_000, 5_000_000)
            .await
            .unwrap();
        let second = ledger
            .create_transaction(&OrderRef::Id(501), "tx1", 2_000, 5_000_000)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.create_time, 1_000);
        assert_eq!(second.state, TransactionState::Created);

        let order = store.find_order(501).await.unwrap().unwrap();
        assert_eq!(order.transaction_id.as_deref(), Some("tx1"));
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.transaction_created_at, millis_to_datetime(1_000));
    }

    #[tokio::test]
    async fn create_with_other_transaction_id_is_rejected() {
        let (ledger, _) = ledger_with_order(50_000).await;
        ledger
            .create_transaction(&OrderRef::Id(501), "tx1", 1_000, 5_000_000)
            .await
            .unwrap();

        let err = ledger
            .create_transaction(&OrderRef::Id(501), "tx2", 2_000, 5_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::OrderLinkedElsewhere { order_id: 501, .. }));
        assert!(ledger.check_transaction("tx2").await.is_err());
    }

    #[tokio::test]
    async fn create_verifies_amount_before_linking() {
        let (ledger, store) = ledger_with_order(50_000).await;
        let err = ledger
            .create_transaction(&OrderRef::Id(501), "tx1", 1_000, 4_999_999)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AmountMismatch { .. }));

        let order = store.find_order(501).await.unwrap().unwrap();
        assert!(order.transaction_id.is_none());
    }

    #[tokio::test]
    async fn perform_replays_first_perform_time() {
        let (ledger, store) = ledger_with_order(50_000).await;
        ledger
            .create_transaction(&OrderRef::Id(501), "tx1", 1_000, 5_000_000)
            .await
            .unwrap();

        let first = ledger.perform_transaction("tx1").await.unwrap();
        let second = ledger.perform_transaction("tx1").await.unwrap();
        assert_eq!(first.state, TransactionState::Completed);
        assert_eq!(first.perform_time, second.perform_time);

        let order = store.find_order(501).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::Active);
        assert!(order.paid_at.is_some());
    }

    #[tokio::test]
    async fn perform_unknown_transaction_is_not_found() {
        let (ledger, _) = ledger_with_order(50_000).await;
        assert!(matches!(
            ledger.perform_transaction("missing").await,
            Err(PaymentError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancel_state_depends_on_perform() {
        let (ledger, store) = ledger_with_order(50_000).await;
        store.insert_order(Order::new(502, BigDecimal::from(10), "UZS")).await;

        ledger
            .create_transaction(&OrderRef::Id(501), "tx1", 1_000, 5_000_000)
            .await
            .unwrap();
        ledger
            .create_transaction(&OrderRef::Id(502), "tx2", 1_000, 1_000)
            .await
            .unwrap();
        ledger.perform_transaction("tx1").await.unwrap();

        let after_perform = ledger.cancel_transaction("tx1", 5).await.unwrap();
        let before_perform = ledger.cancel_transaction("tx2", 3).await.unwrap();
        assert_eq!(after_perform.state, TransactionState::CancelledAfterComplete);
        assert_eq!(before_perform.state, TransactionState::Cancelled);

        let order = store.find_order(501).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn repeated_cancel_keeps_first_outcome() {
        let (ledger, _) = ledger_with_order(50_000).await;
        ledger
            .create_transaction(&OrderRef::Id(501), "tx1", 1_000, 5_000_000)
            .await
            .unwrap();

        let first = ledger.cancel_transaction("tx1", 3).await.unwrap();
        let second = ledger.cancel_transaction("tx1", 4).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(second.cancel_reason, Some(3));
    }

    #[tokio::test]
    async fn cancelled_transaction_cannot_be_performed() {
        let (ledger, store) = ledger_with_order(50_000).await;
        ledger
            .create_transaction(&OrderRef::Id(501), "tx1", 1_000, 5_000_000)
            .await
            .unwrap();
        ledger.cancel_transaction("tx1", 3).await.unwrap();

        assert!(matches!(
            ledger.perform_transaction("tx1").await,
            Err(PaymentError::NotPerformable {
                state: TransactionState::Cancelled,
                ..
            })
        ));
        let order = store.find_order(501).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn paid_order_refuses_new_transaction() {
        let (ledger, store) = ledger_with_order(50_000).await;
        let mut paid = Order::new(503, BigDecimal::from(10), "UZS");
        paid.payment_status = PaymentStatus::Paid;
        store.insert_order(paid).await;

        assert!(matches!(
            ledger
                .create_transaction(&OrderRef::Id(503), "tx3", 1_000, 1_000)
                .await,
            Err(PaymentError::AlreadyPaid(503))
        ));
    }
}
