//! Core types for the customer ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode for storage, serde_json on the bus)
//! - Exact arithmetic (Decimal for money)
//! - A derived `balance` that is never written outside the engine

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Description marker for the synthetic transaction that seeds a new
/// customer's history with a starting debt/credit.
pub const OPENING_BALANCE_DESCRIPTION: &str = "Opening Balance";

/// Customer classification; determines the sign convention used when
/// folding transactions into a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CustomerCategory {
    /// Ordinary customer (sales are money owed to the business)
    #[default]
    Customer,
    /// Investor (receipts are money the business owes them)
    Investor,
    /// Employee
    Employee,
    /// Anything else
    Other,
}

impl CustomerCategory {
    /// Parse from string (CSV column values)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Customer" => Some(CustomerCategory::Customer),
            "Investor" => Some(CustomerCategory::Investor),
            "Employee" => Some(CustomerCategory::Employee),
            "Other" => Some(CustomerCategory::Other),
            _ => None,
        }
    }

    /// Canonical string form
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerCategory::Customer => "Customer",
            CustomerCategory::Investor => "Investor",
            CustomerCategory::Employee => "Employee",
            CustomerCategory::Other => "Other",
        }
    }
}

impl fmt::Display for CustomerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction type; direction of effect on the balance is encoded here
/// and by the owning customer's category, never by the amount's sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Goods sold on credit
    Sale,
    /// Money received
    Receipt,
}

impl TransactionKind {
    /// Parse from string (CSV column values)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(TransactionKind::Sale),
            "receipt" => Some(TransactionKind::Receipt),
            _ => None,
        }
    }

    /// Canonical string form
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Sale => "sale",
            TransactionKind::Receipt => "receipt",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Customer record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Unique customer ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// First name (required, non-empty)
    pub first_name: String,

    /// Last name (required, non-empty)
    pub last_name: String,

    /// Classification (default `Customer`)
    pub category: CustomerCategory,

    /// Derived balance; only the recalculation engine writes this
    pub balance: Decimal,

    /// Phone number
    pub phone: String,

    /// Address
    pub address: String,

    /// Government ID number
    pub id_number: String,

    /// Profile photo reference
    pub photo_url: String,

    /// Free-text note
    pub note: String,

    /// User who created this record
    pub created_by: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Full display name
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Transaction record
///
/// Immutable once created; corrections are modeled as delete + recreate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: Uuid,

    /// Owning customer ID
    pub customer_id: Uuid,

    /// Sale or receipt
    pub kind: TransactionKind,

    /// Amount; always non-negative
    pub amount: Decimal,

    /// Occurrence date (defaults to creation time)
    pub date: DateTime<Utc>,

    /// Free-text description
    pub description: String,

    /// Bill number (sales only)
    pub bill_number: String,

    /// On-behalf payer name (receipts only)
    pub on_behalf: String,

    /// User who created this record
    pub created_by: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Per-kind amount sums for one customer's full transaction set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionTotals {
    /// Sum of all `sale` amounts
    pub sale: Decimal,

    /// Sum of all `receipt` amounts
    pub receipt: Decimal,
}

/// Direction of an opening balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningDirection {
    /// The customer owes the business (seeds a sale)
    TheyOwe,
    /// The business owes the customer (seeds a receipt)
    WeOwe,
}

/// One-time opening balance supplied at customer creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpeningBalance {
    /// Starting amount; ignored unless > 0
    pub amount: Decimal,

    /// Who owes whom
    pub direction: OpeningDirection,

    /// Occurrence date for the synthetic transaction
    pub date: Option<DateTime<Utc>>,
}

/// Input for customer creation
///
/// There is deliberately no `balance` field: balance is derived state
/// and any client-supplied value is discarded at the API boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCustomer {
    /// First name (required)
    pub first_name: String,

    /// Last name (required)
    pub last_name: String,

    /// Classification; `Customer` when absent
    pub category: Option<CustomerCategory>,

    /// Phone number
    #[serde(default)]
    pub phone: String,

    /// Address
    #[serde(default)]
    pub address: String,

    /// Government ID number
    #[serde(default)]
    pub id_number: String,

    /// Profile photo reference
    #[serde(default)]
    pub photo_url: String,

    /// Free-text note
    #[serde(default)]
    pub note: String,

    /// Creating user
    pub created_by: Option<Uuid>,

    /// One-time opening balance seed
    pub opening_balance: Option<OpeningBalance>,
}

/// Profile-field updates for an existing customer
///
/// `None` leaves a field untouched. Balance is not updatable here or
/// anywhere else outside the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerUpdate {
    /// New first name
    pub first_name: Option<String>,
    /// New last name
    pub last_name: Option<String>,
    /// New classification
    pub category: Option<CustomerCategory>,
    /// New phone number
    pub phone: Option<String>,
    /// New address
    pub address: Option<String>,
    /// New ID number
    pub id_number: Option<String>,
    /// New photo reference
    pub photo_url: Option<String>,
    /// New note
    pub note: Option<String>,
}

/// Input for single transaction creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Owning customer ID (must exist)
    pub customer_id: Uuid,

    /// Sale or receipt
    pub kind: TransactionKind,

    /// Amount (must be >= 0)
    pub amount: Decimal,

    /// Occurrence date; now when absent
    pub date: Option<DateTime<Utc>>,

    /// Free-text description
    #[serde(default)]
    pub description: String,

    /// Bill number (kept for sales only)
    #[serde(default)]
    pub bill_number: String,

    /// On-behalf payer name (kept for receipts only)
    #[serde(default)]
    pub on_behalf: String,

    /// Creating user
    pub created_by: Option<Uuid>,
}

/// Filter for transaction listings and exports
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Only this kind
    pub kind: Option<TransactionKind>,

    /// Only on/after this date
    pub from: Option<DateTime<Utc>>,

    /// Only on/before this date
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    /// Does a transaction pass this filter?
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(kind) = self.kind {
            if tx.kind != kind {
                return false;
            }
        }
        if let Some(from) = self.from {
            if tx.date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if tx.date > to {
                return false;
            }
        }
        true
    }
}

/// Declared row kind for bulk import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// Customer rows (upsert by id, create, or skip)
    Customers,
    /// Transaction rows (create or skip)
    Transactions,
}

/// What to export as CSV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// All customers
    Customers,
    /// Transactions within an optional date range
    Transactions,
    /// Three-row profit/loss summary
    ProfitLoss,
}

/// Row counts from a bulk import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    /// Rows that created a new record
    pub created: u64,
    /// Rows that updated an existing record
    pub updated: u64,
    /// Malformed or unresolvable rows, skipped without aborting the batch
    pub skipped: u64,
}

/// One day's sale total within a sales trend window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    /// Calendar day (UTC)
    pub date: NaiveDate,

    /// Sum of sale amounts dated that day
    pub total: Decimal,
}

/// Aggregate dashboard statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    /// Total customer count
    pub total_customers: u64,

    /// Total number of sale transactions
    pub total_sales_count: u64,

    /// Sum of all customer balances
    pub total_receivables: Decimal,

    /// Non-investor sales plus investor receipts
    pub total_money_lent: Decimal,

    /// Gross receipts minus total money lent
    pub total_profit: Decimal,
}
