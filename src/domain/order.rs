//! Order entity as seen by the payment callback.
//! Only the payment linkage fields are ever written from here.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::str::FromStr;

use super::UnknownVariant;

/// Business lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Active,
    Suspended,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Active => "active",
            OrderStatus::Suspended => "suspended",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "active" => Ok(OrderStatus::Active),
            "suspended" => Ok(OrderStatus::Suspended),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(UnknownVariant {
                kind: "order status",
                value: other.to_string(),
            }),
        }
    }
}

/// Payment lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownVariant {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    /// Major currency units.
    pub amount: BigDecimal,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub transaction_created_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Order {
    /// A fresh, unpaid order with no processor linkage.
    pub fn new(id: i64, amount: BigDecimal, currency: impl Into<String>) -> Self {
        Self {
            id,
            amount,
            currency: currency.into(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            transaction_id: None,
            transaction_created_at: None,
            paid_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_column_text() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Active,
            OrderStatus::Suspended,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        assert!("archived".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn unknown_payment_status_is_rejected() {
        let err = "chargeback".parse::<PaymentStatus>().unwrap_err();
        assert_eq!(err.to_string(), "unknown payment status 'chargeback'");
    }

    #[test]
    fn new_order_is_unpaid_and_unlinked() {
        let order = Order::new(7, BigDecimal::from(100), "UZS");
        assert!(!order.is_paid());
        assert!(order.transaction_id.is_none());
        assert_eq!(order.status, OrderStatus::Pending);
    }
}
