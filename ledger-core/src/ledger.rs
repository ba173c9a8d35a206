//! Main ledger orchestration layer
//!
//! Ties together storage, the balance recalculation engine, and the
//! change broadcaster into a high-level API for customer and
//! transaction mutations.
//!
//! Every transaction-affecting mutation is followed synchronously by
//! exactly one recalculation before the operation is considered
//! complete; broadcast is orchestrated here (never by the engine) so
//! bulk import can batch one notification per affected customer.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     // let customer = ledger.create_customer(...).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    engine::BalanceEngine,
    metrics::Metrics,
    storage::Storage,
    types::{
        Customer, CustomerCategory, CustomerUpdate, NewCustomer, NewTransaction, OpeningDirection,
        Overview, Transaction, TransactionFilter, TransactionKind, TrendPoint,
        OPENING_BALANCE_DESCRIPTION,
    },
    Config, Error, Result,
};
use chrono::Utc;
use realtime_bus::{Broadcaster, ChangeKind};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Main ledger interface
pub struct Ledger {
    /// Storage backend
    pub(crate) storage: Arc<Storage>,

    /// Balance recalculation engine
    pub(crate) engine: BalanceEngine,

    /// Change broadcaster (if attached)
    pub(crate) broadcaster: Option<Broadcaster>,

    /// Metrics collector
    pub(crate) metrics: Metrics,

    /// Configuration
    pub(crate) config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let metrics = Metrics::new().map_err(|e| Error::Other(e.to_string()))?;
        let engine = BalanceEngine::new(storage.clone(), metrics.clone());

        Ok(Self {
            storage,
            engine,
            broadcaster: None,
            metrics,
            config,
        })
    }

    /// Attach a change broadcaster
    pub fn with_broadcaster(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    /// Metrics collector for this ledger
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration this ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    // Customer operations

    /// Create a customer, optionally seeding an opening balance
    ///
    /// Balance always starts at 0; clients cannot set it. When an
    /// opening balance with amount > 0 is supplied, exactly one
    /// synthetic transaction is created (`TheyOwe` -> sale, `WeOwe` ->
    /// receipt) and the balance recalculated once.
    pub async fn create_customer(&self, new: NewCustomer) -> Result<Customer> {
        if new.first_name.trim().is_empty() || new.last_name.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "First and last name are required".to_string(),
            ));
        }

        let now = Utc::now();
        let mut customer = Customer {
            id: Uuid::now_v7(),
            first_name: new.first_name.trim().to_string(),
            last_name: new.last_name.trim().to_string(),
            category: new.category.unwrap_or_default(),
            balance: Decimal::ZERO,
            phone: new.phone,
            address: new.address,
            id_number: new.id_number,
            photo_url: new.photo_url,
            note: new.note,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
        };
        self.storage.put_customer(&customer)?;

        if let Some(opening) = new.opening_balance {
            if opening.amount > Decimal::ZERO {
                let kind = match opening.direction {
                    OpeningDirection::TheyOwe => TransactionKind::Sale,
                    OpeningDirection::WeOwe => TransactionKind::Receipt,
                };
                let tx = Transaction {
                    id: Uuid::now_v7(),
                    customer_id: customer.id,
                    kind,
                    amount: opening.amount,
                    date: opening.date.unwrap_or(now),
                    description: OPENING_BALANCE_DESCRIPTION.to_string(),
                    bill_number: String::new(),
                    on_behalf: String::new(),
                    created_by: new.created_by,
                    created_at: now,
                };
                self.storage.create_transaction(&tx)?;
                if let Some(balance) = self.engine.recalculate(customer.id)? {
                    customer.balance = balance;
                }
            } else {
                tracing::debug!(
                    customer_id = %customer.id,
                    amount = %opening.amount,
                    "Opening balance not positive, no seed transaction"
                );
            }
        }

        tracing::info!(customer_id = %customer.id, name = %customer.full_name(), "Customer created");

        if let Some(bus) = &self.broadcaster {
            bus.emit_customer(ChangeKind::Created, entity_json(&customer));
            bus.emit_stats();
        }

        Ok(customer)
    }

    /// Get customer by ID
    pub async fn get_customer(&self, customer_id: Uuid) -> Result<Customer> {
        self.storage.get_customer(customer_id)
    }

    /// List customers, newest first, with optional search/category filter
    pub async fn list_customers(
        &self,
        search: Option<&str>,
        category: Option<CustomerCategory>,
    ) -> Result<Vec<Customer>> {
        self.storage.list_customers(search, category)
    }

    /// Update a customer's profile fields
    ///
    /// Balance is not updatable here; a category change re-runs the
    /// recalculation since the sign convention depends on it.
    pub async fn update_customer(&self, customer_id: Uuid, update: CustomerUpdate) -> Result<Customer> {
        let mut customer = self.storage.get_customer(customer_id)?;
        let old_category = customer.category;

        if let Some(first_name) = update.first_name {
            if first_name.trim().is_empty() {
                return Err(Error::InvalidArgument("First name cannot be empty".to_string()));
            }
            customer.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = update.last_name {
            if last_name.trim().is_empty() {
                return Err(Error::InvalidArgument("Last name cannot be empty".to_string()));
            }
            customer.last_name = last_name.trim().to_string();
        }
        if let Some(category) = update.category {
            customer.category = category;
        }
        if let Some(phone) = update.phone {
            customer.phone = phone;
        }
        if let Some(address) = update.address {
            customer.address = address;
        }
        if let Some(id_number) = update.id_number {
            customer.id_number = id_number;
        }
        if let Some(photo_url) = update.photo_url {
            customer.photo_url = photo_url;
        }
        if let Some(note) = update.note {
            customer.note = note;
        }
        customer.updated_at = Utc::now();
        customer.balance = self.storage.put_customer_profile(&customer)?;

        if customer.category != old_category {
            if let Some(balance) = self.engine.recalculate(customer.id)? {
                customer.balance = balance;
            }
        }

        if let Some(bus) = &self.broadcaster {
            bus.emit_customer(ChangeKind::Updated, entity_json(&customer));
        }

        Ok(customer)
    }

    /// Delete a customer and all its transactions atomically
    ///
    /// Returns the number of transactions removed with the customer.
    pub async fn delete_customer(&self, customer_id: Uuid) -> Result<u64> {
        let count = self.storage.delete_customer_cascade(customer_id)?;

        if let Some(bus) = &self.broadcaster {
            bus.emit_customer(
                ChangeKind::Deleted,
                serde_json::json!({ "id": customer_id }),
            );
            bus.emit_stats();
        }

        Ok(count)
    }

    // Transaction operations

    /// Create a transaction and recalculate the owner's balance
    ///
    /// Returns the stored transaction together with the freshly
    /// computed balance so callers can respond without a second read.
    pub async fn create_transaction(&self, new: NewTransaction) -> Result<(Transaction, Decimal)> {
        if new.amount < Decimal::ZERO {
            return Err(Error::InvalidArgument(format!(
                "Amount must be non-negative, got {}",
                new.amount
            )));
        }
        if !self.storage.customer_exists(new.customer_id)? {
            return Err(Error::CustomerNotFound(new.customer_id.to_string()));
        }

        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::now_v7(),
            customer_id: new.customer_id,
            kind: new.kind,
            amount: new.amount,
            date: new.date.unwrap_or(now),
            description: new.description,
            // Type-specific fields: bill numbers belong to sales,
            // on-behalf payer names to receipts
            bill_number: match new.kind {
                TransactionKind::Sale => new.bill_number,
                TransactionKind::Receipt => String::new(),
            },
            on_behalf: match new.kind {
                TransactionKind::Receipt => new.on_behalf,
                TransactionKind::Sale => String::new(),
            },
            created_by: new.created_by,
            created_at: now,
        };
        self.storage.create_transaction(&tx)?;
        self.metrics.transactions_created_total.inc();

        // A failure here propagates: the mutation is not committed
        // until the recalculation lands
        let balance = self.engine.recalculate(tx.customer_id)?.unwrap_or_default();

        if let Some(bus) = &self.broadcaster {
            bus.emit_transaction(ChangeKind::Created, entity_json(&tx), balance);
            bus.emit_stats();
        }

        Ok((tx, balance))
    }

    /// Delete a transaction and recalculate its former owner's balance
    pub async fn delete_transaction(&self, tx_id: Uuid) -> Result<Decimal> {
        // Capture the owner before the row disappears
        let tx = self.storage.get_transaction(tx_id)?;
        self.storage.delete_transaction(&tx)?;
        self.metrics.transactions_deleted_total.inc();

        let balance = self.engine.recalculate(tx.customer_id)?.unwrap_or_default();

        if let Some(bus) = &self.broadcaster {
            bus.emit_transaction(
                ChangeKind::Deleted,
                serde_json::json!({ "id": tx.id, "customer_id": tx.customer_id }),
                balance,
            );
            bus.emit_stats();
        }

        Ok(balance)
    }

    /// List one customer's transactions, newest first
    pub async fn list_transactions(
        &self,
        customer_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        self.storage.transactions_for_customer(customer_id, filter)
    }

    /// Recompute one customer's balance from its full transaction set
    ///
    /// The engine's only public entry point; `None` when the customer
    /// no longer exists.
    pub async fn recalculate(&self, customer_id: Uuid) -> Result<Option<Decimal>> {
        self.engine.recalculate(customer_id)
    }

    // Statistics

    /// Aggregate dashboard overview
    ///
    /// `total_profit = receipts - (non-investor sales + investor
    /// receipts)`; the formula is carried over from the books this
    /// system replaces and is kept as-is.
    pub async fn overview(&self) -> Result<Overview> {
        let totals = self.storage.overview_totals()?;
        let total_money_lent = totals.non_investor_sales + totals.investor_receipts;

        Ok(Overview {
            total_customers: totals.customers,
            total_sales_count: totals.sales_count,
            total_receivables: totals.balance_total,
            total_money_lent,
            total_profit: totals.receipt_total - total_money_lent,
        })
    }

    /// Per-day sale totals over a trailing window, zero-filled
    ///
    /// Returns one point per day, oldest first, covering today (UTC)
    /// and the preceding days. The window is 7 or 30 days; any other
    /// requested range falls back to 7.
    pub async fn sales_trend(&self, days: u32) -> Result<Vec<TrendPoint>> {
        let days = if days == 30 { 30i64 } else { 7i64 };
        let today = Utc::now().date_naive();
        let start = today - chrono::Duration::days(days - 1);

        let filter = TransactionFilter {
            kind: Some(TransactionKind::Sale),
            from: start.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
            to: None,
        };

        let mut buckets: HashMap<chrono::NaiveDate, Decimal> = HashMap::new();
        for tx in self.storage.scan_transactions(&filter)? {
            *buckets.entry(tx.date.date_naive()).or_default() += tx.amount;
        }

        let mut points = Vec::with_capacity(days as usize);
        for offset in 0..days {
            let date = start + chrono::Duration::days(offset);
            points.push(TrendPoint {
                date,
                total: buckets.get(&date).copied().unwrap_or_default(),
            });
        }
        Ok(points)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Serialize an entity for the bus; broadcast is fire-and-forget so a
/// serialization failure degrades to a null body rather than an error
pub(crate) fn entity_json<T: serde::Serialize>(entity: &T) -> serde_json::Value {
    serde_json::to_value(entity).unwrap_or(serde_json::Value::Null)
}
