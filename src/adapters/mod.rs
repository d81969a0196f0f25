pub mod in_memory;
pub mod postgres_payment_store;

pub use in_memory::InMemoryPaymentStore;
pub use postgres_payment_store::PostgresPaymentStore;
