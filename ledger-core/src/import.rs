//! CSV bulk import and export
//!
//! Import processes rows independently: a malformed row is skipped and
//! never aborts the batch. Transaction import defers recalculation to
//! the end of the batch - one engine call per distinct affected
//! customer, not one per row - and emits a single stats notification
//! for the whole batch.
//!
//! Column names match the CSV files the export side produces, so an
//! exported file can be corrected and re-imported as-is.

use crate::{
    ledger::Ledger,
    types::{
        Customer, ExportKind, ImportKind, ImportReport, NewCustomer, Transaction,
        TransactionFilter, TransactionKind,
    },
    CustomerCategory, Error, Result,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use uuid::Uuid;

/// Customer CSV row (import and export share the column set)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CustomerRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "firstName", default)]
    first_name: Option<String>,
    #[serde(rename = "lastName", default)]
    last_name: Option<String>,
    #[serde(rename = "fullName", default)]
    full_name: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(rename = "idNumber", default)]
    id_number: Option<String>,
    /// Present in exported files; ignored on import - balance is
    /// derived state, not an importable field
    #[serde(default)]
    balance: Option<String>,
    #[serde(rename = "photoUrl", default)]
    photo_url: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(rename = "createdAt", default)]
    created_at: Option<String>,
}

/// Transaction CSV row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TransactionRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "customerId", default)]
    customer_id: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    amount: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "billNumber", default)]
    bill_number: Option<String>,
    #[serde(rename = "onBehalf", default)]
    on_behalf: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(rename = "createdBy", default)]
    created_by: Option<String>,
}

/// Profit/loss summary row
#[derive(Debug, Serialize)]
struct MetricRow {
    metric: &'static str,
    amount: Decimal,
}

/// Parse an occurrence date leniently
///
/// Accepts RFC 3339, bare dates, and `YYYY-MM-DD HH:MM:SS`. Returns
/// `None` on anything else; callers fall back to now rather than
/// rejecting (dates get leniency, amounts never do).
pub(crate) fn parse_date_lenient(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc());
    }
    None
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Count data rows without deserializing them (oversize pre-check)
fn count_rows(csv_text: &str) -> usize {
    csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes())
        .into_byte_records()
        .count()
}

impl Ledger {
    /// Import a CSV batch of the declared row kind
    ///
    /// Returns counts of created/updated/skipped rows. Storage
    /// failures (as opposed to malformed rows) abort the batch and
    /// propagate.
    pub async fn import_csv(&self, kind: ImportKind, csv_text: &str) -> Result<ImportReport> {
        match kind {
            ImportKind::Customers => self.import_customers(csv_text).await,
            ImportKind::Transactions => self.import_transactions(csv_text).await,
        }
    }

    async fn import_transactions(&self, csv_text: &str) -> Result<ImportReport> {
        // Oversize batches are rejected before any row is persisted,
        // so a rejected import never leaves balances stale
        let total_rows = count_rows(csv_text);
        if total_rows > self.config.import.max_rows {
            return Err(Error::InvalidArgument(format!(
                "Import batch of {} rows exceeds the {}-row limit",
                total_rows, self.config.import.max_rows
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(csv_text.as_bytes());

        let mut report = ImportReport::default();
        let mut affected: HashSet<Uuid> = HashSet::new();
        let mut rows = 0usize;

        for result in reader.deserialize::<TransactionRow>() {
            rows += 1;

            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    tracing::debug!(row = rows, error = %e, "Unparsable transaction row skipped");
                    report.skipped += 1;
                    self.metrics.record_import_row("skipped");
                    continue;
                }
            };

            match self.import_transaction_row(row) {
                Ok(customer_id) => {
                    affected.insert(customer_id);
                    report.created += 1;
                    self.metrics.record_import_row("created");
                }
                Err(Error::InvalidArgument(reason)) | Err(Error::CustomerNotFound(reason)) => {
                    tracing::debug!(row = rows, %reason, "Transaction row skipped");
                    report.skipped += 1;
                    self.metrics.record_import_row("skipped");
                }
                Err(e) => return Err(e),
            }
        }

        // One recalculation per distinct affected customer, not per row
        for customer_id in &affected {
            self.engine.recalculate(*customer_id)?;
        }

        tracing::info!(
            created = report.created,
            skipped = report.skipped,
            customers_recalculated = affected.len(),
            "Transaction import finished"
        );

        if let Some(bus) = &self.broadcaster {
            bus.emit_stats();
        }

        Ok(report)
    }

    /// Validate and persist one transaction row; returns the owner's id
    ///
    /// Does not recalculate - the batch does that once per customer.
    fn import_transaction_row(&self, row: TransactionRow) -> Result<Uuid> {
        let customer_id = non_empty(row.customer_id)
            .and_then(|s| Uuid::from_str(&s).ok())
            .ok_or_else(|| Error::InvalidArgument("missing or malformed customerId".to_string()))?;
        if !self.storage.customer_exists(customer_id)? {
            return Err(Error::CustomerNotFound(customer_id.to_string()));
        }

        let kind = non_empty(row.kind)
            .and_then(|s| TransactionKind::parse(&s))
            .ok_or_else(|| Error::InvalidArgument("type must be sale or receipt".to_string()))?;

        let amount = non_empty(row.amount)
            .and_then(|s| Decimal::from_str(&s).ok())
            .ok_or_else(|| Error::InvalidArgument("missing or malformed amount".to_string()))?;
        if amount < Decimal::ZERO {
            return Err(Error::InvalidArgument("amount must be non-negative".to_string()));
        }

        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::now_v7(),
            customer_id,
            kind,
            amount,
            date: row
                .date
                .as_deref()
                .and_then(parse_date_lenient)
                .unwrap_or(now),
            description: non_empty(row.description).unwrap_or_default(),
            bill_number: match kind {
                TransactionKind::Sale => non_empty(row.bill_number).unwrap_or_default(),
                TransactionKind::Receipt => String::new(),
            },
            on_behalf: match kind {
                TransactionKind::Receipt => non_empty(row.on_behalf).unwrap_or_default(),
                TransactionKind::Sale => String::new(),
            },
            created_by: non_empty(row.created_by).and_then(|s| Uuid::from_str(&s).ok()),
            created_at: now,
        };
        self.storage.create_transaction(&tx)?;
        self.metrics.transactions_created_total.inc();

        Ok(customer_id)
    }

    async fn import_customers(&self, csv_text: &str) -> Result<ImportReport> {
        let total_rows = count_rows(csv_text);
        if total_rows > self.config.import.max_rows {
            return Err(Error::InvalidArgument(format!(
                "Import batch of {} rows exceeds the {}-row limit",
                total_rows, self.config.import.max_rows
            )));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(csv_text.as_bytes());

        let mut report = ImportReport::default();
        let mut rows = 0usize;

        for result in reader.deserialize::<CustomerRow>() {
            rows += 1;

            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    tracing::debug!(row = rows, error = %e, "Unparsable customer row skipped");
                    report.skipped += 1;
                    self.metrics.record_import_row("skipped");
                    continue;
                }
            };

            // Names: explicit columns, falling back to splitting fullName
            let (first_name, last_name) = match (
                non_empty(row.first_name.clone()),
                non_empty(row.last_name.clone()),
            ) {
                (Some(f), Some(l)) => (Some(f), Some(l)),
                (f, l) => match non_empty(row.full_name.clone()) {
                    Some(full) => {
                        let mut parts = full.splitn(2, ' ');
                        let from_full_first = parts.next().map(|s| s.to_string());
                        let from_full_last = parts.next().map(|s| s.to_string());
                        (f.or(from_full_first), l.or(from_full_last))
                    }
                    None => (f, l),
                },
            };

            let existing = non_empty(row.id.clone())
                .and_then(|s| Uuid::from_str(&s).ok())
                .and_then(|id| self.storage.find_customer(id).transpose())
                .transpose()?;

            if let Some(mut customer) = existing {
                // Upsert: overwrite profile fields; balance untouched
                self.apply_customer_row(&mut customer, &row, first_name, last_name);
                customer.updated_at = Utc::now();
                customer.balance = self.storage.put_customer_profile(&customer)?;
                report.updated += 1;
                self.metrics.record_import_row("updated");
            } else if let (Some(first), Some(last)) = (first_name, last_name) {
                self.create_customer_unbroadcast(NewCustomer {
                    first_name: first,
                    last_name: last,
                    category: non_empty(row.category.clone())
                        .and_then(|s| CustomerCategory::parse(&s)),
                    phone: non_empty(row.phone.clone()).unwrap_or_default(),
                    address: non_empty(row.address.clone()).unwrap_or_default(),
                    id_number: non_empty(row.id_number.clone()).unwrap_or_default(),
                    photo_url: non_empty(row.photo_url.clone()).unwrap_or_default(),
                    note: non_empty(row.note.clone()).unwrap_or_default(),
                    created_by: None,
                    opening_balance: None,
                })?;
                report.created += 1;
                self.metrics.record_import_row("created");
            } else {
                report.skipped += 1;
                self.metrics.record_import_row("skipped");
            }
        }

        tracing::info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "Customer import finished"
        );

        if let Some(bus) = &self.broadcaster {
            bus.emit_stats();
        }

        Ok(report)
    }

    fn apply_customer_row(
        &self,
        customer: &mut Customer,
        row: &CustomerRow,
        first_name: Option<String>,
        last_name: Option<String>,
    ) {
        if let Some(first) = first_name {
            customer.first_name = first;
        }
        if let Some(last) = last_name {
            customer.last_name = last;
        }
        if let Some(category) = non_empty(row.category.clone()).and_then(|s| CustomerCategory::parse(&s)) {
            customer.category = category;
        }
        if let Some(phone) = non_empty(row.phone.clone()) {
            customer.phone = phone;
        }
        if let Some(address) = non_empty(row.address.clone()) {
            customer.address = address;
        }
        if let Some(id_number) = non_empty(row.id_number.clone()) {
            customer.id_number = id_number;
        }
        if let Some(photo_url) = non_empty(row.photo_url.clone()) {
            customer.photo_url = photo_url;
        }
        if let Some(note) = non_empty(row.note.clone()) {
            customer.note = note;
        }
    }

    /// Customer creation without broadcast (import batches notify once)
    fn create_customer_unbroadcast(&self, new: NewCustomer) -> Result<Customer> {
        let now = Utc::now();
        let customer = Customer {
            id: Uuid::now_v7(),
            first_name: new.first_name,
            last_name: new.last_name,
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
        Ok(customer)
    }

    /// Export data as CSV text
    ///
    /// `filter` bounds transactions (and the profit/loss window) by
    /// date; it is ignored for customer export.
    pub async fn export_csv(&self, kind: ExportKind, filter: &TransactionFilter) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        match kind {
            ExportKind::Customers => {
                for customer in self.storage.list_customers(None, None)? {
                    writer.serialize(CustomerRow {
                        id: Some(customer.id.to_string()),
                        first_name: Some(customer.first_name.clone()),
                        last_name: Some(customer.last_name.clone()),
                        full_name: Some(customer.full_name()),
                        phone: Some(customer.phone.clone()),
                        address: Some(customer.address.clone()),
                        category: Some(customer.category.as_str().to_string()),
                        id_number: Some(customer.id_number.clone()),
                        balance: Some(customer.balance.to_string()),
                        photo_url: Some(customer.photo_url.clone()),
                        note: Some(customer.note.clone()),
                        created_at: Some(customer.created_at.to_rfc3339()),
                    })?;
                }
            }
            ExportKind::Transactions => {
                for tx in self.storage.scan_transactions(filter)? {
                    writer.serialize(TransactionRow {
                        id: Some(tx.id.to_string()),
                        customer_id: Some(tx.customer_id.to_string()),
                        kind: Some(tx.kind.as_str().to_string()),
                        amount: Some(tx.amount.to_string()),
                        description: Some(tx.description.clone()),
                        bill_number: Some(tx.bill_number.clone()),
                        on_behalf: Some(tx.on_behalf.clone()),
                        date: Some(tx.date.to_rfc3339()),
                        created_by: tx.created_by.map(|id| id.to_string()),
                    })?;
                }
            }
            ExportKind::ProfitLoss => {
                let mut sales = Decimal::ZERO;
                let mut receipts = Decimal::ZERO;
                for tx in self.storage.scan_transactions(filter)? {
                    match tx.kind {
                        TransactionKind::Sale => sales += tx.amount,
                        TransactionKind::Receipt => receipts += tx.amount,
                    }
                }
                writer.serialize(MetricRow {
                    metric: "Total Sales",
                    amount: sales,
                })?;
                writer.serialize(MetricRow {
                    metric: "Total Receipts",
                    amount: receipts,
                })?;
                writer.serialize(MetricRow {
                    metric: "Profit/Loss (Receipts - Sales)",
                    amount: receipts - sales,
                })?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| Error::Csv(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| Error::Csv(e.to_string()))
    }
}
