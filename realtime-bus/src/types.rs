//! Type definitions for the realtime bus

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of change applied to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Entity was created
    Created,
    /// Entity was updated in place
    Updated,
    /// Entity was deleted
    Deleted,
}

impl ChangeKind {
    /// Subject segment for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// Payload of a change event
///
/// Entity bodies travel as JSON values so the bus stays decoupled from
/// the ledger's persisted types; viewers consume them as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChangePayload {
    /// A customer record changed
    CustomerChanged {
        /// What happened to the customer
        kind: ChangeKind,
        /// Customer body (JSON)
        customer: serde_json::Value,
    },

    /// A transaction was created or deleted
    TransactionChanged {
        /// What happened to the transaction (never `Updated`)
        kind: ChangeKind,
        /// Transaction body (JSON)
        transaction: serde_json::Value,
        /// Owning customer's balance after recalculation
        balance: Decimal,
    },

    /// Aggregate dashboard statistics are stale and should be refetched
    StatsChanged,
}

impl ChangePayload {
    /// Get routing subject for this payload
    pub fn subject(&self) -> String {
        match self {
            ChangePayload::CustomerChanged { kind, .. } => {
                format!("ledger.customer.{}", kind.as_str())
            }
            ChangePayload::TransactionChanged { kind, .. } => {
                format!("ledger.transaction.{}", kind.as_str())
            }
            ChangePayload::StatsChanged => "ledger.stats.updated".to_string(),
        }
    }

    /// Subject prefix (channel name) without the change kind
    pub fn channel(&self) -> &'static str {
        match self {
            ChangePayload::CustomerChanged { .. } => "customer",
            ChangePayload::TransactionChanged { .. } => "transaction",
            ChangePayload::StatsChanged => "stats",
        }
    }
}
