//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `customers` - Customer records (key: customer id)
//! - `transactions` - Transaction records (key: transaction id)
//! - `indices` - By-customer index (key: customer_id || transaction_id, empty value)
//!
//! The by-customer index is what makes the from-scratch balance fold an
//! O(transactions-of-one-customer) prefix scan instead of a full scan.

use crate::{
    error::{Error, Result},
    types::{
        Customer, CustomerCategory, Transaction, TransactionFilter, TransactionKind,
        TransactionTotals,
    },
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode,
    Options, WriteBatch, DB,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_CUSTOMERS: &str = "customers";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";

/// Per-kind and per-category sums over the whole transaction set,
/// consumed by the dashboard overview.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverviewTotals {
    /// Total customer count
    pub customers: u64,
    /// Number of sale transactions
    pub sales_count: u64,
    /// Sum of all sale amounts
    pub sale_total: Decimal,
    /// Sum of all receipt amounts
    pub receipt_total: Decimal,
    /// Sum of all customer balances
    pub balance_total: Decimal,
    /// Sale amounts owned by non-investor customers
    pub non_investor_sales: Decimal,
    /// Receipt amounts owned by investor customers
    pub investor_receipts: Decimal,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction; the workload is small rows, write-heavy on import
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_CUSTOMERS, Self::cf_options_customers()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_customers() -> Options {
        let mut opts = Options::default();
        // Customers are frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Customer operations

    /// Put customer (full record write)
    pub fn put_customer(&self, customer: &Customer) -> Result<()> {
        let cf = self.cf_handle(CF_CUSTOMERS)?;
        let value = bincode::serialize(customer)?;
        self.db.put_cf(&cf, customer.id.as_bytes(), &value)?;

        tracing::debug!(customer_id = %customer.id, "Customer stored");
        Ok(())
    }

    /// Write a customer's profile fields, keeping the stored balance
    ///
    /// The balance on the passed record is ignored; whatever the engine
    /// last wrote stays in place, so a recalculation landing between a
    /// caller's read and this write is never reverted. Returns the
    /// preserved balance.
    pub fn put_customer_profile(&self, customer: &Customer) -> Result<Decimal> {
        let balance = self
            .find_customer(customer.id)?
            .map(|c| c.balance)
            .unwrap_or(customer.balance);

        let mut record = customer.clone();
        record.balance = balance;
        self.put_customer(&record)?;
        Ok(balance)
    }

    /// Find customer by ID; `None` when absent
    pub fn find_customer(&self, customer_id: Uuid) -> Result<Option<Customer>> {
        let cf = self.cf_handle(CF_CUSTOMERS)?;
        match self.db.get_cf(&cf, customer_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get customer by ID
    pub fn get_customer(&self, customer_id: Uuid) -> Result<Customer> {
        self.find_customer(customer_id)?
            .ok_or_else(|| Error::CustomerNotFound(customer_id.to_string()))
    }

    /// Does a customer exist?
    pub fn customer_exists(&self, customer_id: Uuid) -> Result<bool> {
        Ok(self.find_customer(customer_id)?.is_some())
    }

    /// List customers, newest first, with optional search/category filter
    ///
    /// Search matches case-insensitively against first name, last name,
    /// phone, and ID number.
    pub fn list_customers(
        &self,
        search: Option<&str>,
        category: Option<CustomerCategory>,
    ) -> Result<Vec<Customer>> {
        let cf = self.cf_handle(CF_CUSTOMERS)?;
        let needle = search.map(|s| s.to_lowercase());

        let mut customers = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            let customer: Customer = bincode::deserialize(&value)?;

            if let Some(cat) = category {
                if customer.category != cat {
                    continue;
                }
            }
            if let Some(ref needle) = needle {
                let haystack = format!(
                    "{} {} {} {}",
                    customer.first_name, customer.last_name, customer.phone, customer.id_number
                )
                .to_lowercase();
                if !haystack.contains(needle.as_str()) {
                    continue;
                }
            }
            customers.push(customer);
        }

        customers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(customers)
    }

    /// Write the derived balance field
    ///
    /// The only balance write path; called exclusively by the
    /// recalculation engine. Returns `false` when the customer no longer
    /// exists (benign race with a concurrent delete). The write is
    /// skipped when the stored value already matches, so back-to-back
    /// recalculations are no-op writes the second time.
    pub fn set_customer_balance(&self, customer_id: Uuid, balance: Decimal) -> Result<bool> {
        let mut customer = match self.find_customer(customer_id)? {
            Some(c) => c,
            None => return Ok(false),
        };

        if customer.balance == balance {
            return Ok(true);
        }

        customer.balance = balance;
        self.put_customer(&customer)?;

        tracing::debug!(customer_id = %customer_id, %balance, "Balance updated");
        Ok(true)
    }

    /// Delete customer and all its transactions as one atomic unit
    ///
    /// A partial cascade can never strand orphaned transactions: the
    /// customer row, every transaction row, and every index entry go
    /// into a single WriteBatch. Returns the number of transactions
    /// removed.
    pub fn delete_customer_cascade(&self, customer_id: Uuid) -> Result<u64> {
        if !self.customer_exists(customer_id)? {
            return Err(Error::CustomerNotFound(customer_id.to_string()));
        }

        let cf_customers = self.cf_handle(CF_CUSTOMERS)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let tx_ids = self.transaction_ids_for_customer(customer_id)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_customers, customer_id.as_bytes());
        for tx_id in &tx_ids {
            batch.delete_cf(&cf_transactions, tx_id.as_bytes());
            batch.delete_cf(&cf_indices, Self::index_key(customer_id, *tx_id));
        }
        self.db.write(batch)?;

        tracing::info!(
            customer_id = %customer_id,
            transactions = tx_ids.len(),
            "Customer deleted with cascade"
        );
        Ok(tx_ids.len() as u64)
    }

    // Transaction operations

    /// Create transaction (atomic: row + by-customer index entry)
    pub fn create_transaction(&self, tx: &Transaction) -> Result<()> {
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let value = bincode::serialize(tx)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_transactions, tx.id.as_bytes(), &value);
        batch.put_cf(&cf_indices, Self::index_key(tx.customer_id, tx.id), b"");
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = %tx.id,
            customer_id = %tx.customer_id,
            kind = %tx.kind,
            amount = %tx.amount,
            "Transaction created"
        );
        Ok(())
    }

    /// Get transaction by ID
    pub fn get_transaction(&self, tx_id: Uuid) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(&cf, tx_id.as_bytes())?
            .ok_or_else(|| Error::TransactionNotFound(tx_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Delete transaction (atomic: row + index entry)
    pub fn delete_transaction(&self, tx: &Transaction) -> Result<()> {
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_transactions, tx.id.as_bytes());
        batch.delete_cf(&cf_indices, Self::index_key(tx.customer_id, tx.id));
        self.db.write(batch)?;

        tracing::debug!(transaction_id = %tx.id, customer_id = %tx.customer_id, "Transaction deleted");
        Ok(())
    }

    /// Sum transaction amounts for one customer, grouped by kind
    ///
    /// Always a from-scratch scan of the customer's current transaction
    /// set; never cached. Each group defaults to 0 when no rows of that
    /// kind exist.
    pub fn sum_transaction_amounts(&self, customer_id: Uuid) -> Result<TransactionTotals> {
        let mut totals = TransactionTotals::default();
        for tx_id in self.transaction_ids_for_customer(customer_id)? {
            let tx = self.get_transaction(tx_id)?;
            match tx.kind {
                TransactionKind::Sale => totals.sale += tx.amount,
                TransactionKind::Receipt => totals.receipt += tx.amount,
            }
        }
        Ok(totals)
    }

    /// List one customer's transactions, newest first
    pub fn transactions_for_customer(
        &self,
        customer_id: Uuid,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let mut transactions = Vec::new();
        for tx_id in self.transaction_ids_for_customer(customer_id)? {
            let tx = self.get_transaction(tx_id)?;
            if filter.matches(&tx) {
                transactions.push(tx);
            }
        }

        transactions.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(transactions)
    }

    /// Scan all transactions, newest first, with a filter (exports, overview)
    pub fn scan_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let mut transactions = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            let tx: Transaction = bincode::deserialize(&value)?;
            if filter.matches(&tx) {
                transactions.push(tx);
            }
        }

        transactions.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(transactions)
    }

    /// Aggregate sums for the dashboard overview
    ///
    /// The investor/non-investor split joins each transaction to its
    /// owner's category; transactions whose owner vanished mid-scan are
    /// left out of the split, matching the inner-join the numbers came
    /// from, but still count toward the gross per-kind totals.
    pub fn overview_totals(&self) -> Result<OverviewTotals> {
        let cf_customers = self.cf_handle(CF_CUSTOMERS)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;

        let mut totals = OverviewTotals::default();

        let mut categories = std::collections::HashMap::new();
        for item in self.db.iterator_cf(&cf_customers, IteratorMode::Start) {
            let (_, value) = item?;
            let customer: Customer = bincode::deserialize(&value)?;
            totals.customers += 1;
            totals.balance_total += customer.balance;
            categories.insert(customer.id, customer.category);
        }

        for item in self.db.iterator_cf(&cf_transactions, IteratorMode::Start) {
            let (_, value) = item?;
            let tx: Transaction = bincode::deserialize(&value)?;
            let category = categories.get(&tx.customer_id).copied();

            match tx.kind {
                TransactionKind::Sale => {
                    totals.sales_count += 1;
                    totals.sale_total += tx.amount;
                    if matches!(category, Some(c) if c != CustomerCategory::Investor) {
                        totals.non_investor_sales += tx.amount;
                    }
                }
                TransactionKind::Receipt => {
                    totals.receipt_total += tx.amount;
                    if category == Some(CustomerCategory::Investor) {
                        totals.investor_receipts += tx.amount;
                    }
                }
            }
        }

        Ok(totals)
    }

    // Index helpers

    fn index_key(customer_id: Uuid, tx_id: Uuid) -> [u8; 32] {
        let mut key = [0u8; 32];
        key[..16].copy_from_slice(customer_id.as_bytes());
        key[16..].copy_from_slice(tx_id.as_bytes());
        key
    }

    /// Transaction IDs for one customer via index prefix scan
    fn transaction_ids_for_customer(&self, customer_id: Uuid) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = customer_id.as_bytes();

        let mut ids = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            // Past the prefix range: stop
            if key.len() < 32 || &key[..16] != prefix.as_slice() {
                break;
            }
            let tx_id_bytes: [u8; 16] = key[16..32].try_into().expect("index key is 32 bytes");
            ids.push(Uuid::from_bytes(tx_id_bytes));
        }

        Ok(ids)
    }
}
