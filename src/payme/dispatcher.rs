//! Decodes callback envelopes into typed calls, routes them to the ledger or
//! the statement exporter and renders every outcome as a JSON-RPC response.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use crate::payme::auth::SignatureVerifier;
use crate::payme::error::PaymentError;
use crate::payme::ledger::{OrderRef, TransactionLedger};
use crate::payme::protocol::{
    codes, CancelTransactionParams, CancelTransactionResult, CheckPerformTransactionParams,
    CheckPerformTransactionResult, CheckTransactionResult, CreateTransactionParams,
    CreateTransactionResult, GetStatementParams, GetStatementResult, Method,
    PerformTransactionResult, RpcError, RpcResponse, TransactionIdParams,
};
use crate::payme::statement::StatementExporter;
use crate::validation::{
    validate_time_range, validate_timestamp, validate_transaction_id, ValidationError,
};

/// A fully validated callback, one variant per method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCall {
    CheckPerformTransaction { order_ref: OrderRef, amount: i64 },
    CreateTransaction { id: String, time: i64, order_ref: OrderRef, amount: i64 },
    PerformTransaction { id: String },
    CancelTransaction { id: String, reason: i32 },
    CheckTransaction { id: String },
    GetStatement { from: i64, to: i64 },
}

impl RpcCall {
    pub fn method(&self) -> Method {
        match self {
            RpcCall::CheckPerformTransaction { .. } => Method::CheckPerformTransaction,
            RpcCall::CreateTransaction { .. } => Method::CreateTransaction,
            RpcCall::PerformTransaction { .. } => Method::PerformTransaction,
            RpcCall::CancelTransaction { .. } => Method::CancelTransaction,
            RpcCall::CheckTransaction { .. } => Method::CheckTransaction,
            RpcCall::GetStatement { .. } => Method::GetStatement,
        }
    }

    pub fn decode(method: Method, params: Value, account_field: &str) -> Result<Self, ValidationError> {
        match method {
            Method::CheckPerformTransaction => {
                let p: CheckPerformTransactionParams = params_of(params)?;
                Ok(RpcCall::CheckPerformTransaction {
                    order_ref: order_ref(&p.account, account_field)?,
                    amount: p.amount,
                })
            }
            Method::CreateTransaction => {
                let p: CreateTransactionParams = params_of(params)?;
                validate_transaction_id(&p.id)?;
                validate_timestamp("time", p.time)?;
                Ok(RpcCall::CreateTransaction {
                    order_ref: order_ref(&p.account, account_field)?,
                    id: p.id,
                    time: p.time,
                    amount: p.amount,
                })
            }
            Method::PerformTransaction => {
                let p: TransactionIdParams = params_of(params)?;
                validate_transaction_id(&p.id)?;
                Ok(RpcCall::PerformTransaction { id: p.id })
            }
            Method::CancelTransaction => {
                let p: CancelTransactionParams = params_of(params)?;
                validate_transaction_id(&p.id)?;
                Ok(RpcCall::CancelTransaction {
                    id: p.id,
                    reason: p.reason,
                })
            }
            Method::CheckTransaction => {
                let p: TransactionIdParams = params_of(params)?;
                validate_transaction_id(&p.id)?;
                Ok(RpcCall::CheckTransaction { id: p.id })
            }
            Method::GetStatement => {
                let p: GetStatementParams = params_of(params)?;
                validate_time_range(p.from, p.to)?;
                Ok(RpcCall::GetStatement {
                    from: p.from,
                    to: p.to,
                })
            }
        }
    }
}

/// The envelope `id` to echo, or `null` when the body is not a JSON object.
pub fn request_id(body: &[u8]) -> Value {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|envelope| envelope.get("id").cloned())
        .unwrap_or(Value::Null)
}

fn params_of<T: DeserializeOwned>(params: Value) -> Result<T, ValidationError> {
    serde_json::from_value(params).map_err(|e| ValidationError::new("params", e.to_string()))
}

fn order_ref(account: &Map<String, Value>, account_field: &str) -> Result<OrderRef, ValidationError> {
    account
        .get(account_field)
        .map(OrderRef::from_account_value)
        .ok_or_else(|| ValidationError::new(account_field, "is required in account"))
}

fn invalid_request(err: ValidationError) -> RpcError {
    RpcError::new(codes::INVALID_REQUEST, err.to_string()).with_data(err.field)
}

fn encode<T: Serialize>(result: &T) -> Result<Value, RpcError> {
    serde_json::to_value(result).map_err(|e| {
        error!(error = %e, "Failed to encode callback result");
        RpcError::internal()
    })
}

pub struct PaymeDispatcher {
    verifier: SignatureVerifier,
    ledger: TransactionLedger,
    statements: StatementExporter,
    account_field: String,
}

impl PaymeDispatcher {
    pub fn new(
        verifier: SignatureVerifier,
        ledger: TransactionLedger,
        statements: StatementExporter,
        account_field: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            ledger,
            statements,
            account_field: account_field.into(),
        }
    }

    /// Handles one raw callback. Never fails: every outcome, including
    /// internal faults, is rendered as a JSON-RPC response.
    pub async fn handle(&self, authorization: Option<&str>, body: &[u8]) -> RpcResponse {
        let parsed = serde_json::from_slice::<Value>(body);
        let id = parsed
            .as_ref()
            .ok()
            .and_then(|envelope| envelope.get("id"))
            .cloned()
            .unwrap_or(Value::Null);

        if !self.verifier.verify(authorization) {
            warn!("Rejected callback with invalid credentials");
            return RpcResponse::failure(id, RpcError::insufficient_privilege());
        }

        let envelope = match parsed {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Callback body is not JSON");
                return RpcResponse::failure(id, RpcError::parse_error());
            }
        };

        let call = match self.decode(&envelope) {
            Ok(call) => call,
            Err(err) => {
                info!(code = err.code, message = %err.message, "Callback refused before dispatch");
                return RpcResponse::failure(id, err);
            }
        };

        match self.execute(call).await {
            Ok(result) => RpcResponse::success(id, result),
            Err(err) => RpcResponse::failure(id, err),
        }
    }

    pub fn decode(&self, envelope: &Value) -> Result<RpcCall, RpcError> {
        let object = envelope.as_object().ok_or_else(|| {
            invalid_request(ValidationError::new("request", "must be a JSON object"))
        })?;

        let name = object
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_request(ValidationError::new("method", "is required")))?;
        let method: Method = name
            .parse()
            .map_err(|_| RpcError::method_not_found(name))?;

        let params = match object.get("params") {
            Some(params @ Value::Object(_)) => params.clone(),
            _ => {
                return Err(invalid_request(ValidationError::new(
                    "params",
                    "must be an object",
                )))
            }
        };

        RpcCall::decode(method, params, &self.account_field).map_err(invalid_request)
    }

    pub async fn execute(&self, call: RpcCall) -> Result<Value, RpcError> {
        let method = call.method();
        debug!(method = method.as_str(), "Dispatching callback");

        match call {
            RpcCall::CheckPerformTransaction { order_ref, amount } => {
                self.ledger
                    .check_perform_transaction(&order_ref, amount)
                    .await
                    .map_err(|e| self.reject(method, e))?;
                encode(&CheckPerformTransactionResult { allow: true })
            }
            RpcCall::CreateTransaction {
                id,
                time,
                order_ref,
                amount,
            } => {
                let tx = self
                    .ledger
                    .create_transaction(&order_ref, &id, time, amount)
                    .await
                    .map_err(|e| self.reject(method, e))?;
                encode(&CreateTransactionResult::receipt(&tx))
            }
            RpcCall::PerformTransaction { id } => {
                let tx = self
                    .ledger
                    .perform_transaction(&id)
                    .await
                    .map_err(|e| self.reject(method, e))?;
                encode(&PerformTransactionResult::from(&tx))
            }
            RpcCall::CancelTransaction { id, reason } => {
                let tx = self
                    .ledger
                    .cancel_transaction(&id, reason)
                    .await
                    .map_err(|e| self.reject(method, e))?;
                encode(&CancelTransactionResult::from(&tx))
            }
            RpcCall::CheckTransaction { id } => {
                let tx = self
                    .ledger
                    .check_transaction(&id)
                    .await
                    .map_err(|e| self.reject(method, e))?;
                encode(&CheckTransactionResult::from(&tx))
            }
            RpcCall::GetStatement { from, to } => {
                let transactions = self
                    .statements
                    .statement(from, to)
                    .await
                    .map_err(|e| self.reject(method, e))?;
                encode(&GetStatementResult { transactions })
            }
        }
    }

    fn reject(&self, method: Method, err: PaymentError) -> RpcError {
        if err.is_internal() {
            error!(method = method.as_str(), error = %err, "Callback failed");
            return RpcError::internal();
        }

        info!(method = method.as_str(), reason = %err, "Callback rejected");
        match err {
            PaymentError::OrderNotFound(_) => {
                RpcError::new(codes::INVALID_ACCOUNT, "Order not found")
                    .with_data(self.account_field.clone())
            }
            PaymentError::OrderLinkedElsewhere { .. } => {
                RpcError::new(codes::INVALID_ACCOUNT, "Order is awaiting another transaction")
                    .with_data(self.account_field.clone())
            }
            PaymentError::AmountMismatch { .. } => {
                RpcError::new(codes::INVALID_AMOUNT, "Invalid amount")
            }
            PaymentError::AlreadyPaid(_) => {
                RpcError::new(codes::COULD_NOT_PERFORM, "Order is already paid")
            }
            PaymentError::NotPerformable { .. } => {
                RpcError::new(codes::COULD_NOT_PERFORM, "Unable to perform operation")
            }
            PaymentError::TransactionNotFound(_) => {
                RpcError::new(codes::TRANSACTION_NOT_FOUND, "Transaction not found")
            }
            PaymentError::Amount(_) | PaymentError::Store(_) => RpcError::internal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_is_echoed_or_null() {
        assert_eq!(request_id(br#"{"id": 42, "method": "CheckTransaction"}"#), json!(42));
        assert_eq!(request_id(br#"{"method": "CheckTransaction"}"#), Value::Null);
        assert_eq!(request_id(b"{not json"), Value::Null);
    }

    #[test]
    fn decodes_create_transaction() {
        let call = RpcCall::decode(
            Method::CreateTransaction,
            json!({"id": "tx1", "time": 1000, "amount": 500, "account": {"order_id": "501"}}),
            "order_id",
        )
        .unwrap();
        assert_eq!(
            call,
            RpcCall::CreateTransaction {
                id: "tx1".to_string(),
                time: 1000,
                order_ref: OrderRef::Id(501),
                amount: 500,
            }
        );
        assert_eq!(call.method(), Method::CreateTransaction);
    }

    #[test]
    fn missing_account_key_is_a_validation_error() {
        let err = RpcCall::decode(
            Method::CheckPerformTransaction,
            json!({"amount": 500, "account": {"phone": "998901234567"}}),
            "order_id",
        )
        .unwrap_err();
        assert_eq!(err.field, "order_id");
    }

    #[test]
    fn unusual_account_value_still_decodes() {
        let call = RpcCall::decode(
            Method::CheckPerformTransaction,
            json!({"amount": 500, "account": {"order_id": "INV-9"}}),
            "order_id",
        )
        .unwrap();
        assert_eq!(
            call,
            RpcCall::CheckPerformTransaction {
                order_ref: OrderRef::Unresolvable("INV-9".to_string()),
                amount: 500,
            }
        );
    }

    #[test]
    fn missing_or_mistyped_params_are_rejected() {
        assert!(RpcCall::decode(Method::PerformTransaction, json!({}), "order_id").is_err());
        assert!(RpcCall::decode(
            Method::CancelTransaction,
            json!({"id": "tx1", "reason": "timeout"}),
            "order_id"
        )
        .is_err());
        assert!(RpcCall::decode(Method::GetStatement, json!({"from": 5, "to": 1}), "order_id").is_err());
        assert!(RpcCall::decode(
            Method::CreateTransaction,
            json!({"id": "", "time": 1, "amount": 1, "account": {"order_id": 1}}),
            "order_id"
        )
        .is_err());
    }
}
