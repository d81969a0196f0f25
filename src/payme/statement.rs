//! Reconciliation export for the processor's periodic audit.

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::domain::Transaction;
use crate::payme::amount::AmountConverter;
use crate::payme::error::PaymentError;
use crate::payme::protocol::StatementEntry;
use crate::ports::PaymentStore;

pub struct StatementExporter {
    store: Arc<dyn PaymentStore>,
    amounts: AmountConverter,
    account_field: String,
}

impl StatementExporter {
    pub fn new(store: Arc<dyn PaymentStore>, amounts: AmountConverter, account_field: impl Into<String>) -> Self {
        Self {
            store,
            amounts,
            account_field: account_field.into(),
        }
    }

    /// Transactions created in `[from, to]`, newest first. Read-only.
    pub async fn statement(&self, from: i64, to: i64) -> Result<Vec<StatementEntry>, PaymentError> {
        let transactions = self.store.transactions_created_between(from, to).await?;
        tracing::debug!(from, to, count = transactions.len(), "Statement requested");

        transactions.iter().map(|tx| self.entry(tx)).collect()
    }

    fn entry(&self, tx: &Transaction) -> Result<StatementEntry, PaymentError> {
        let mut account = Map::new();
        account.insert(self.account_field.clone(), Value::String(tx.order_id.to_string()));

        Ok(StatementEntry {
            id: tx.id.clone(),
            time: tx.create_time,
            amount: self.amounts.to_minor_units(&tx.amount)?,
            account,
            create_time: tx.create_time,
            perform_time: tx.perform_time.unwrap_or(0),
            cancel_time: tx.cancel_time.unwrap_or(0),
            transaction: tx.id.clone(),
            state: tx.state.code(),
            reason: tx.cancel_reason,
        })
    }
}
