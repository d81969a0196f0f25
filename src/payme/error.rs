use thiserror::Error;

use crate::domain::TransactionState;
use crate::payme::amount::AmountError;
use crate::ports::StoreError;

/// Outcomes the ledger refuses, plus the infrastructure faults behind them.
///
/// Everything except `Amount` and `Store` is an expected business answer and
/// maps one-to-one onto a processor error code.
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("order {order_id} is already linked to transaction {linked}")]
    OrderLinkedElsewhere { order_id: i64, linked: String },

    #[error("amount mismatch: expected {expected}, received {received}")]
    AmountMismatch { expected: i64, received: i64 },

    #[error("order {0} is already paid")]
    AlreadyPaid(i64),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("transaction {id} cannot be performed in state {state:?}")]
    NotPerformable { id: String, state: TransactionState },

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PaymentError {
    /// Internal faults are logged and hidden from the caller.
    pub fn is_internal(&self) -> bool {
        matches!(self, PaymentError::Amount(_) | PaymentError::Store(_))
    }
}
