//! In-memory implementation of PaymentStore.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::{Order, Transaction};
use crate::payme::error::PaymentError;
use crate::ports::{Decide, PaymentSnapshot, PaymentStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<i64, Order>,
    transactions: HashMap<String, Transaction>,
}

/// A thread-safe in-memory payment store.
///
/// One write lock covers both tables, which gives every `modify_*` call the
/// same all-or-nothing behaviour as the Postgres adapter. Intended for tests
/// and local runs; nothing survives a restart.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPaymentStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds or replaces an order, as the billing service would.
    pub async fn insert_order(&self, order: Order) {
        let mut tables = self.tables.write().await;
        tables.orders.insert(order.id, order);
    }
}

fn apply(
    tables: &mut Tables,
    order_id: i64,
    decide: Decide<'_>,
) -> Result<PaymentSnapshot, PaymentError> {
    let order = tables
        .orders
        .get(&order_id)
        .cloned()
        .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?;
    let transaction = tables
        .transactions
        .values()
        .find(|tx| tx.order_id == order_id)
        .cloned();

    let before = PaymentSnapshot { order, transaction };
    let mut after = before.clone();
    decide(&mut after)?;

    if after != before {
        if let Some(tx) = &after.transaction {
            if before.transaction.is_none() && tables.transactions.contains_key(&tx.id) {
                return Err(StoreError::Conflict(format!(
                    "transaction {} already exists",
                    tx.id
                ))
                .into());
            }
            tables.transactions.insert(tx.id.clone(), tx.clone());
        }
        tables.orders.insert(order_id, after.order.clone());
    }

    Ok(after)
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_order(&self, order_id: i64) -> StoreResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(&order_id).cloned())
    }

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<Transaction>> {
        let tables = self.tables.read().await;
        Ok(tables.transactions.get(transaction_id).cloned())
    }

    async fn modify_order(
        &self,
        order_id: i64,
        decide: Decide<'_>,
    ) -> Result<PaymentSnapshot, PaymentError> {
        let mut tables = self.tables.write().await;
        apply(&mut tables, order_id, decide)
    }

    async fn modify_transaction(
        &self,
        transaction_id: &str,
        decide: Decide<'_>,
    ) -> Result<PaymentSnapshot, PaymentError> {
        let mut tables = self.tables.write().await;
        let order_id = tables
            .transactions
            .get(transaction_id)
            .map(|tx| tx.order_id)
            .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;
        apply(&mut tables, order_id, decide)
    }

    async fn transactions_created_between(
        &self,
        from: i64,
        to: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Transaction> = tables
            .transactions
            .values()
            .filter(|tx| tx.create_time >= from && tx.create_time <= to)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.create_time.cmp(&a.create_time).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PaymentStatus;
    use bigdecimal::BigDecimal;

    fn order(id: i64) -> Order {
        Order::new(id, BigDecimal::from(100), "UZS")
    }

    fn link(
        tx_id: &str,
        create_time: i64,
    ) -> impl Fn(&mut PaymentSnapshot) -> Result<(), PaymentError> + Send + Sync {
        let tx_id = tx_id.to_string();
        move |snapshot: &mut PaymentSnapshot| {
            snapshot.transaction = Some(Transaction::created(
                tx_id.clone(),
                snapshot.order.id,
                snapshot.order.amount.clone(),
                create_time,
            ));
            snapshot.order.transaction_id = Some(tx_id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn modify_persists_decision() {
        let store = InMemoryPaymentStore::new();
        store.insert_order(order(1)).await;

        let snapshot = store.modify_order(1, &link("tx-a", 10)).await.unwrap();
        assert_eq!(snapshot.transaction.unwrap().id, "tx-a");

        let stored = store.find_transaction("tx-a").await.unwrap().unwrap();
        assert_eq!(stored.order_id, 1);
        let order = store.find_order(1).await.unwrap().unwrap();
        assert_eq!(order.transaction_id.as_deref(), Some("tx-a"));
    }

    #[tokio::test]
    async fn rejected_decision_leaves_tables_untouched() {
        let store = InMemoryPaymentStore::new();
        store.insert_order(order(1)).await;

        let reject = |snapshot: &mut PaymentSnapshot| -> Result<(), PaymentError> {
            snapshot.order.payment_status = PaymentStatus::Paid;
            Err(PaymentError::AlreadyPaid(snapshot.order.id))
        };
        assert!(store.modify_order(1, &reject).await.is_err());

        let order = store.find_order(1).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_transaction_id_on_other_order_conflicts() {
        let store = InMemoryPaymentStore::new();
        store.insert_order(order(1)).await;
        store.insert_order(order(2)).await;

        store.modify_order(1, &link("tx-a", 10)).await.unwrap();
        let err = store.modify_order(2, &link("tx-a", 20)).await.unwrap_err();
        assert!(matches!(
            err,
            PaymentError::Store(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn missing_rows_map_to_not_found() {
        let store = InMemoryPaymentStore::new();
        assert!(matches!(
            store.modify_order(9, &link("tx", 1)).await,
            Err(PaymentError::OrderNotFound(_))
        ));
        assert!(matches!(
            store.modify_transaction("tx", &link("tx", 1)).await,
            Err(PaymentError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn range_query_is_inclusive_and_newest_first() {
        let store = InMemoryPaymentStore::new();
        for (id, time) in [(1, 100), (2, 200), (3, 300), (4, 400)] {
            store.insert_order(order(id)).await;
            let tx_id = format!("tx-{}", id);
            store.modify_order(id, &link(&tx_id, time)).await.unwrap();
        }

        let found = store.transactions_created_between(200, 300).await.unwrap();
        let times: Vec<i64> = found.iter().map(|tx| tx.create_time).collect();
        assert_eq!(times, vec![300, 200]);
    }
}
