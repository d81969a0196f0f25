//! Framework-agnostic payment entities.

pub mod order;
pub mod transaction;

pub use order::{Order, OrderStatus, PaymentStatus};
pub use transaction::{Transaction, TransactionState};

use std::fmt;

/// A stored enum column held a value this build does not recognise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}
