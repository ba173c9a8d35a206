//! Customer ledger core
//!
//! Tracks customers, their transactions, and the derived balance that
//! summarizes what each side owes the other.
//!
//! # Architecture
//!
//! - **Derived balance**: `Customer.balance` is always the result of a
//!   from-scratch fold over the full transaction set; only the
//!   recalculation engine writes it
//! - **Immutable transactions**: created and deleted, never updated;
//!   corrections are delete + recreate
//! - **Synchronous recompute**: every transaction-affecting mutation
//!   runs exactly one recalculation before it is considered complete
//! - **Batched import**: bulk CSV import recalculates once per
//!   affected customer, not once per row
//!
//! # Invariants
//!
//! - Balance fold: Investor -> receipts - sales; everyone else ->
//!   sales - receipts
//! - Amounts are non-negative; direction lives in the transaction type
//! - Idempotent recompute: back-to-back recalculations agree and the
//!   second write is a no-op
//! - Cascade delete: removing a customer leaves no transactions
//!   referencing it

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod engine;
pub mod error;
pub mod import;
pub mod ledger;
pub mod metrics;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use engine::{fold_balance, BalanceEngine};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use storage::Storage;
pub use types::{
    Customer, CustomerCategory, CustomerUpdate, ExportKind, ImportKind, ImportReport,
    NewCustomer, NewTransaction, OpeningBalance, OpeningDirection, Overview, Transaction,
    TransactionFilter, TransactionKind, TransactionTotals, TrendPoint,
};
