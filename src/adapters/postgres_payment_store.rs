//! Postgres implementation of PaymentStore.
//!
//! Each `modify_*` call runs in one database transaction that holds the
//! order row lock (`SELECT ... FOR UPDATE`) from read to commit.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};

use crate::domain::{Order, Transaction, TransactionState};
use crate::payme::error::PaymentError;
use crate::ports::{Decide, PaymentSnapshot, PaymentStore, StoreError, StoreResult};

const ORDER_COLUMNS: &str = "id, amount, currency, status, payment_status, transaction_id, \
     transaction_created_at, paid_at";

const TRANSACTION_COLUMNS: &str = "transaction_id, order_id, amount, state, create_time, \
     perform_time, cancel_time, cancel_reason";

/// Postgres-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an order row the way the billing service creates them.
    pub async fn insert_order(&self, order: &Order) -> StoreResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO orders (id, amount, currency, status, payment_status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.id)
        .bind(&order.amount)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn locked_apply(
        db_tx: &mut SqlxTransaction<'_, Postgres>,
        order_id: i64,
        decide: Decide<'_>,
    ) -> Result<PaymentSnapshot, PaymentError> {
        let order = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut **db_tx)
        .await
        .map_err(StoreError::from)?
        .ok_or_else(|| PaymentError::OrderNotFound(order_id.to_string()))?
        .into_domain()?;

        let transaction = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&mut **db_tx)
        .await
        .map_err(StoreError::from)?
        .map(TransactionRow::into_domain)
        .transpose()?;

        let before = PaymentSnapshot { order, transaction };
        let mut after = before.clone();
        decide(&mut after)?;

        if after != before {
            persist(db_tx, &before, &after).await?;
        }

        Ok(after)
    }
}

async fn persist(
    db_tx: &mut SqlxTransaction<'_, Postgres>,
    before: &PaymentSnapshot,
    after: &PaymentSnapshot,
) -> StoreResult<()> {
    if let Some(tx) = &after.transaction {
        if before.transaction.is_none() {
            let inserted = sqlx::query(
                r#"
                INSERT INTO payment_transactions (
                    transaction_id, order_id, amount, state, create_time,
                    perform_time, cancel_time, cancel_reason
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (transaction_id) DO NOTHING
                "#,
            )
            .bind(&tx.id)
            .bind(tx.order_id)
            .bind(&tx.amount)
            .bind(tx.state.code())
            .bind(tx.create_time)
            .bind(tx.perform_time)
            .bind(tx.cancel_time)
            .bind(tx.cancel_reason)
            .execute(&mut **db_tx)
            .await
            .map_err(write_error)?;

            if inserted.rows_affected() == 0 {
                return Err(StoreError::Conflict(format!(
                    "transaction {} already exists",
                    tx.id
                )));
            }
        } else if before.transaction.as_ref() != Some(tx) {
            sqlx::query(
                r#"
                UPDATE payment_transactions
                SET state = $2, perform_time = $3, cancel_time = $4, cancel_reason = $5,
                    updated_at = NOW()
                WHERE transaction_id = $1
                "#,
            )
            .bind(&tx.id)
            .bind(tx.state.code())
            .bind(tx.perform_time)
            .bind(tx.cancel_time)
            .bind(tx.cancel_reason)
            .execute(&mut **db_tx)
            .await
            .map_err(write_error)?;
        }
    }

    if after.order != before.order {
        let order = &after.order;
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, transaction_id = $4,
                transaction_created_at = $5, paid_at = $6, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.transaction_id)
        .bind(order.transaction_created_at)
        .bind(order.paid_at)
        .execute(&mut **db_tx)
        .await
        .map_err(write_error)?;
    }

    Ok(())
}

fn write_error(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_order(&self, order_id: i64) -> StoreResult<Option<Order>> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .map(OrderRow::into_domain)
        .transpose()
    }

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<Transaction>> {
        sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?
        .map(TransactionRow::into_domain)
        .transpose()
    }

    async fn modify_order(
        &self,
        order_id: i64,
        decide: Decide<'_>,
    ) -> Result<PaymentSnapshot, PaymentError> {
        let mut db_tx = self.pool.begin().await.map_err(StoreError::from)?;
        // Dropping db_tx on any error path rolls back.
        let snapshot = Self::locked_apply(&mut db_tx, order_id, decide).await?;
        db_tx.commit().await.map_err(StoreError::from)?;
        Ok(snapshot)
    }

    async fn modify_transaction(
        &self,
        transaction_id: &str,
        decide: Decide<'_>,
    ) -> Result<PaymentSnapshot, PaymentError> {
        let mut db_tx = self.pool.begin().await.map_err(StoreError::from)?;

        let order_id: i64 = sqlx::query_scalar(
            "SELECT order_id FROM payment_transactions WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(StoreError::from)?
        .ok_or_else(|| PaymentError::TransactionNotFound(transaction_id.to_string()))?;

        let snapshot = Self::locked_apply(&mut db_tx, order_id, decide).await?;
        db_tx.commit().await.map_err(StoreError::from)?;
        Ok(snapshot)
    }

    async fn transactions_created_between(
        &self,
        from: i64,
        to: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS} FROM payment_transactions
            WHERE create_time >= $1 AND create_time <= $2
            ORDER BY create_time DESC, transaction_id ASC
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    amount: BigDecimal,
    currency: String,
    status: String,
    payment_status: String,
    transaction_id: Option<String>,
    transaction_created_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_domain(self) -> StoreResult<Order> {
        Ok(Order {
            id: self.id,
            amount: self.amount,
            currency: self.currency,
            status: self.status.parse()?,
            payment_status: self.payment_status.parse()?,
            transaction_id: self.transaction_id,
            transaction_created_at: self.transaction_created_at,
            paid_at: self.paid_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    order_id: i64,
    amount: BigDecimal,
    state: i32,
    create_time: i64,
    perform_time: Option<i64>,
    cancel_time: Option<i64>,
    cancel_reason: Option<i32>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        Ok(Transaction {
            id: self.transaction_id,
            order_id: self.order_id,
            amount: self.amount,
            state: TransactionState::from_code(self.state)?,
            create_time: self.create_time,
            perform_time: self.perform_time,
            cancel_time: self.cancel_time,
            cancel_reason: self.cancel_reason,
        })
    }
}
