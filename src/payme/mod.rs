//! Merchant side of the Payme payment-gateway callback.

pub mod amount;
pub mod auth;
pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod protocol;
pub mod statement;

use std::sync::Arc;

use crate::config::PaymeConfig;
use crate::ports::PaymentStore;

pub use amount::AmountConverter;
pub use auth::SignatureVerifier;
pub use dispatcher::{PaymeDispatcher, RpcCall};
pub use error::PaymentError;
pub use ledger::{Clock, OrderRef, SystemClock, TransactionLedger};
pub use statement::StatementExporter;

/// Wires the callback components from configuration. Called once at startup.
pub fn build_dispatcher(
    config: &PaymeConfig,
    store: Arc<dyn PaymentStore>,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<PaymeDispatcher> {
    let verifier = SignatureVerifier::new(&config.merchant_login, &config.secret_key)?;
    let amounts = AmountConverter::new(config.minor_unit_scale)?;
    let ledger = TransactionLedger::new(store.clone(), amounts, clock);
    let statements = StatementExporter::new(store, amounts, config.account_field.clone());

    Ok(PaymeDispatcher::new(
        verifier,
        ledger,
        statements,
        config.account_field.clone(),
    ))
}
