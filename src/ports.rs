//! Storage port for the payment callback.
//!
//! Every state change goes through [`PaymentStore::modify_order`] or
//! [`PaymentStore::modify_transaction`], which run the caller's decision
//! against a locked snapshot and persist the outcome in one atomic unit.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Order, Transaction, UnknownVariant};
use crate::payme::error::PaymentError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(#[from] UnknownVariant),

    /// A concurrent writer committed a conflicting row first.
    #[error("conflicting write: {0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// An order together with the transaction linked to it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSnapshot {
    pub order: Order,
    pub transaction: Option<Transaction>,
}

/// Decision applied to a locked snapshot. Returning an error aborts the write.
pub type Decide<'a> = &'a (dyn Fn(&mut PaymentSnapshot) -> Result<(), PaymentError> + Send + Sync);

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn find_order(&self, order_id: i64) -> StoreResult<Option<Order>>;

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<Transaction>>;

    /// Locks the order, applies `decide` and persists whatever changed.
    /// Fails with [`PaymentError::OrderNotFound`] when the order is absent.
    async fn modify_order(
        &self,
        order_id: i64,
        decide: Decide<'_>,
    ) -> Result<PaymentSnapshot, PaymentError>;

    /// Same as [`PaymentStore::modify_order`], addressed by the linked
    /// transaction. Fails with [`PaymentError::TransactionNotFound`].
    async fn modify_transaction(
        &self,
        transaction_id: &str,
        decide: Decide<'_>,
    ) -> Result<PaymentSnapshot, PaymentError>;

    /// Transactions with `from <= create_time <= to`, newest first.
    async fn transactions_created_between(
        &self,
        from: i64,
        to: i64,
    ) -> StoreResult<Vec<Transaction>>;
}
