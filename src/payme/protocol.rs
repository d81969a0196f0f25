//! Wire format of the processor's JSON-RPC callback.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::domain::{Transaction, TransactionState};

/// Numeric error codes. Part of the processor contract; do not renumber.
pub mod codes {
    pub const INVALID_AMOUNT: i32 = -31001;
    pub const TRANSACTION_NOT_FOUND: i32 = -31003;
    pub const COULD_NOT_PERFORM: i32 = -31008;
    pub const INVALID_ACCOUNT: i32 = -31050;
    pub const INTERNAL_ERROR: i32 = -32400;
    pub const INSUFFICIENT_PRIVILEGE: i32 = -32504;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const PARSE_ERROR: i32 = -32700;
}

/// Closed set of callback methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    CheckPerformTransaction,
    CreateTransaction,
    PerformTransaction,
    CancelTransaction,
    CheckTransaction,
    GetStatement,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::CheckPerformTransaction => "CheckPerformTransaction",
            Method::CreateTransaction => "CreateTransaction",
            Method::PerformTransaction => "PerformTransaction",
            Method::CancelTransaction => "CancelTransaction",
            Method::CheckTransaction => "CheckTransaction",
            Method::GetStatement => "GetStatement",
        }
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CheckPerformTransaction" => Ok(Method::CheckPerformTransaction),
            "CreateTransaction" => Ok(Method::CreateTransaction),
            "PerformTransaction" => Ok(Method::PerformTransaction),
            "CancelTransaction" => Ok(Method::CancelTransaction),
            "CheckTransaction" => Ok(Method::CheckTransaction),
            "GetStatement" => Ok(Method::GetStatement),
            _ => Err(()),
        }
    }
}

// --- Request params ---

#[derive(Debug, Deserialize)]
pub struct CheckPerformTransactionParams {
    pub amount: i64,
    pub account: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionParams {
    pub id: String,
    pub time: i64,
    pub amount: i64,
    pub account: Map<String, Value>,
}

/// Params of PerformTransaction and CheckTransaction.
#[derive(Debug, Deserialize)]
pub struct TransactionIdParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelTransactionParams {
    pub id: String,
    pub reason: i32,
}

#[derive(Debug, Deserialize)]
pub struct GetStatementParams {
    pub from: i64,
    pub to: i64,
}

// --- Results ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPerformTransactionResult {
    pub allow: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTransactionResult {
    pub create_time: i64,
    pub transaction: String,
    pub state: i32,
}

impl CreateTransactionResult {
    /// The creation receipt. Always reports the state the transaction was
    /// created in, so a retried CreateTransaction gets the original answer.
    pub fn receipt(tx: &Transaction) -> Self {
        Self {
            create_time: tx.create_time,
            transaction: tx.id.clone(),
            state: TransactionState::Created.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformTransactionResult {
    pub transaction: String,
    pub perform_time: i64,
    pub state: i32,
}

impl From<&Transaction> for PerformTransactionResult {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction: tx.id.clone(),
            perform_time: tx.perform_time.unwrap_or(0),
            state: tx.state.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelTransactionResult {
    pub transaction: String,
    pub cancel_time: i64,
    pub state: i32,
}

impl From<&Transaction> for CancelTransactionResult {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction: tx.id.clone(),
            cancel_time: tx.cancel_time.unwrap_or(0),
            state: tx.state.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckTransactionResult {
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub transaction: String,
    pub state: i32,
    pub reason: Option<i32>,
}

impl From<&Transaction> for CheckTransactionResult {
    fn from(tx: &Transaction) -> Self {
        Self {
            create_time: tx.create_time,
            perform_time: tx.perform_time.unwrap_or(0),
            cancel_time: tx.cancel_time.unwrap_or(0),
            transaction: tx.id.clone(),
            state: tx.state.code(),
            reason: tx.cancel_reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub id: String,
    pub time: i64,
    /// Minor units.
    pub amount: i64,
    pub account: Map<String, Value>,
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub transaction: String,
    pub state: i32,
    pub reason: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetStatementResult {
    pub transactions: Vec<StatementEntry>,
}

// --- Envelope ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn insufficient_privilege() -> Self {
        Self::new(codes::INSUFFICIENT_PRIVILEGE, "Insufficient privilege to perform this method")
    }

    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Request body is not valid JSON")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, "Method not found").with_data(method)
    }

    pub fn internal() -> Self {
        Self::new(codes::INTERNAL_ERROR, "Internal system error")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }
}
