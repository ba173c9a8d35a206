//! Balance recalculation engine
//!
//! Keeps a customer's derived `balance` equal to a pure,
//! order-independent fold over its full transaction set. Every
//! transaction-affecting mutation (create, delete, bulk import,
//! opening-balance seeding) is followed by a recalculation through
//! here; nothing else writes the balance field.
//!
//! Recalculation is always from scratch - no cached aggregates, no
//! incremental deltas. A concurrent mutation can make one write stale,
//! but the next recalculation for that customer restores the invariant
//! (last writer wins, self-healing).

use crate::{
    metrics::Metrics,
    storage::Storage,
    types::{CustomerCategory, TransactionTotals},
    Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Fold per-kind totals into a balance using the category's sign convention
///
/// For investors, receipts are money the business owes them - a
/// liability that grows with receipts and shrinks with sales credited
/// back. For everyone else, sales are money owed to the business and
/// receipts reduce that debt.
pub fn fold_balance(category: CustomerCategory, totals: &TransactionTotals) -> Decimal {
    match category {
        CustomerCategory::Investor => totals.receipt - totals.sale,
        _ => totals.sale - totals.receipt,
    }
}

/// Balance recalculation engine
#[derive(Clone)]
pub struct BalanceEngine {
    storage: Arc<Storage>,
    metrics: Metrics,
}

impl BalanceEngine {
    /// Create engine over a storage backend
    pub fn new(storage: Arc<Storage>, metrics: Metrics) -> Self {
        Self { storage, metrics }
    }

    /// Recompute and persist one customer's balance
    ///
    /// Returns the new balance, or `None` when the customer no longer
    /// exists - that legitimately races with a concurrent delete and is
    /// a no-op success, not an error, since there is nothing left to
    /// reconcile. Storage failures propagate: a caller whose mutation
    /// succeeded but whose recalculation failed must surface that as
    /// fatal, never swallow it.
    pub fn recalculate(&self, customer_id: Uuid) -> Result<Option<Decimal>> {
        let start = Instant::now();

        let category = match self.storage.find_customer(customer_id)? {
            Some(customer) => customer.category,
            None => {
                tracing::debug!(customer_id = %customer_id, "Recalculation skipped, customer gone");
                return Ok(None);
            }
        };

        let totals = self.storage.sum_transaction_amounts(customer_id)?;
        let balance = fold_balance(category, &totals);

        if !self.storage.set_customer_balance(customer_id, balance)? {
            // Customer vanished between the category read and the write
            return Ok(None);
        }

        self.metrics
            .record_recalculation(start.elapsed().as_secs_f64());

        tracing::debug!(
            customer_id = %customer_id,
            sale_total = %totals.sale,
            receipt_total = %totals.receipt,
            %balance,
            "Balance recalculated"
        );

        Ok(Some(balance))
    }
}

impl std::fmt::Debug for BalanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceEngine").finish_non_exhaustive()
    }
}
