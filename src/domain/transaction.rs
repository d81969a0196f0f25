//! Processor transaction entity and its state machine.
//!
//! Allowed transitions, each taken at most once:
//! `Created -> Completed -> CancelledAfterComplete` and `Created -> Cancelled`.

use bigdecimal::BigDecimal;

use super::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Created,
    Completed,
    Cancelled,
    CancelledAfterComplete,
}

impl TransactionState {
    /// Numeric code used on the wire and in storage.
    pub fn code(&self) -> i32 {
        match self {
            TransactionState::Created => 1,
            TransactionState::Completed => 2,
            TransactionState::Cancelled => -1,
            TransactionState::CancelledAfterComplete => -2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, UnknownVariant> {
        match code {
            1 => Ok(TransactionState::Created),
            2 => Ok(TransactionState::Completed),
            -1 => Ok(TransactionState::Cancelled),
            -2 => Ok(TransactionState::CancelledAfterComplete),
            other => Err(UnknownVariant {
                kind: "transaction state",
                value: other.to_string(),
            }),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TransactionState::Cancelled | TransactionState::CancelledAfterComplete
        )
    }
}

/// Whether a transition changed the record or replayed an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Replayed,
}

/// A cancelled transaction can never be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotPerformable(pub TransactionState);

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Opaque identifier assigned by the processor.
    pub id: String,
    pub order_id: i64,
    /// Major currency units, copied from the order at creation.
    pub amount: BigDecimal,
    pub state: TransactionState,
    pub create_time: i64,
    pub perform_time: Option<i64>,
    pub cancel_time: Option<i64>,
    pub cancel_reason: Option<i32>,
}

impl Transaction {
    pub fn created(id: String, order_id: i64, amount: BigDecimal, create_time: i64) -> Self {
        Self {
            id,
            order_id,
            amount,
            state: TransactionState::Created,
            create_time,
            perform_time: None,
            cancel_time: None,
            cancel_reason: None,
        }
    }

    /// `Created -> Completed`. Performing again keeps the first perform time.
    pub fn perform(&mut self, now: i64) -> Result<Transition, NotPerformable> {
        match self.state {
            TransactionState::Created => {
                self.state = TransactionState::Completed;
                self.perform_time = Some(now);
                Ok(Transition::Applied)
            }
            TransactionState::Completed => Ok(Transition::Replayed),
            state => Err(NotPerformable(state)),
        }
    }

    /// Cancels from either live state. Cancelling again keeps the first
    /// cancel time and reason.
    pub fn cancel(&mut self, now: i64, reason: i32) -> Transition {
        let next = match self.state {
            TransactionState::Created => TransactionState::Cancelled,
            TransactionState::Completed => TransactionState::CancelledAfterComplete,
            TransactionState::Cancelled | TransactionState::CancelledAfterComplete => {
                return Transition::Replayed;
            }
        };
        self.state = next;
        self.cancel_time = Some(now);
        self.cancel_reason = Some(reason);
        Transition::Applied
    }
}
