//! End-to-end tests for the ledger core
//!
//! These cover the externally observable contract: sign conventions,
//! idempotent recomputation, cascade deletion, opening-balance
//! seeding, import batching, and broadcast fan-out.

use chrono::{Duration, Utc};
use ledger_core::{
    Config, CustomerCategory, Error, ExportKind, ImportKind, Ledger, NewCustomer, NewTransaction,
    OpeningBalance, OpeningDirection, TransactionFilter, TransactionKind,
};
use realtime_bus::{Broadcaster, ChangePayload};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    (Ledger::open(config).await.unwrap(), temp_dir)
}

fn new_customer(first: &str, category: CustomerCategory) -> NewCustomer {
    NewCustomer {
        first_name: first.to_string(),
        last_name: "Karimi".to_string(),
        category: Some(category),
        ..Default::default()
    }
}

fn new_tx(customer_id: Uuid, kind: TransactionKind, amount: i64) -> NewTransaction {
    NewTransaction {
        customer_id,
        kind,
        amount: Decimal::from(amount),
        date: None,
        description: String::new(),
        bill_number: String::new(),
        on_behalf: String::new(),
        created_by: None,
    }
}

#[tokio::test]
async fn test_sign_convention_customer_vs_investor() {
    let (ledger, _temp) = create_test_ledger().await;

    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();
    let investor = ledger
        .create_customer(new_customer("Parisa", CustomerCategory::Investor))
        .await
        .unwrap();

    for id in [customer.id, investor.id] {
        ledger
            .create_transaction(new_tx(id, TransactionKind::Sale, 500))
            .await
            .unwrap();
        ledger
            .create_transaction(new_tx(id, TransactionKind::Receipt, 200))
            .await
            .unwrap();
    }

    // Identical histories, category flips the sign
    assert_eq!(
        ledger.get_customer(customer.id).await.unwrap().balance,
        Decimal::from(300)
    );
    assert_eq!(
        ledger.get_customer(investor.id).await.unwrap().balance,
        Decimal::from(-300)
    );
}

#[tokio::test]
async fn test_recalculation_is_idempotent() {
    let (ledger, _temp) = create_test_ledger().await;
    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();
    ledger
        .create_transaction(new_tx(customer.id, TransactionKind::Sale, 750))
        .await
        .unwrap();

    let first = ledger.recalculate(customer.id).await.unwrap();
    let second = ledger.recalculate(customer.id).await.unwrap();
    assert_eq!(first, Some(Decimal::from(750)));
    assert_eq!(first, second);
    assert_eq!(
        ledger.get_customer(customer.id).await.unwrap().balance,
        Decimal::from(750)
    );
}

#[tokio::test]
async fn test_recalculate_vanished_customer_is_noop() {
    let (ledger, _temp) = create_test_ledger().await;
    let balance = ledger.recalculate(Uuid::now_v7()).await.unwrap();
    assert_eq!(balance, None);
}

#[tokio::test]
async fn test_cascade_delete_leaves_no_orphans() {
    let (ledger, _temp) = create_test_ledger().await;
    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();

    for amount in [100, 200, 300] {
        ledger
            .create_transaction(new_tx(customer.id, TransactionKind::Sale, amount))
            .await
            .unwrap();
    }

    let removed = ledger.delete_customer(customer.id).await.unwrap();
    assert_eq!(removed, 3);

    assert!(ledger.get_customer(customer.id).await.is_err());
    let remaining = ledger
        .list_transactions(customer.id, &TransactionFilter::default())
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_opening_balance_seeding() {
    let (ledger, _temp) = create_test_ledger().await;

    let mut they_owe = new_customer("Ahmad", CustomerCategory::Customer);
    they_owe.opening_balance = Some(OpeningBalance {
        amount: Decimal::from(1000),
        direction: OpeningDirection::TheyOwe,
        date: None,
    });
    let debtor = ledger.create_customer(they_owe).await.unwrap();
    assert_eq!(debtor.balance, Decimal::from(1000));

    let txs = ledger
        .list_transactions(debtor.id, &TransactionFilter::default())
        .await
        .unwrap();
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].kind, TransactionKind::Sale);
    assert_eq!(txs[0].amount, Decimal::from(1000));

    let mut we_owe = new_customer("Zahra", CustomerCategory::Customer);
    we_owe.opening_balance = Some(OpeningBalance {
        amount: Decimal::from(1000),
        direction: OpeningDirection::WeOwe,
        date: None,
    });
    let creditor = ledger.create_customer(we_owe).await.unwrap();
    assert_eq!(creditor.balance, Decimal::from(-1000));
}

#[tokio::test]
async fn test_import_recalculates_once_per_affected_customer() {
    let (ledger, _temp) = create_test_ledger().await;
    let a = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();
    let b = ledger
        .create_customer(new_customer("Zahra", CustomerCategory::Customer))
        .await
        .unwrap();

    let csv = format!(
        "customerId,type,amount,description,billNumber,onBehalf,date\n\
         {a},sale,100,,,,\n\
         {a},sale,50,,,,\n\
         {a},receipt,30,,,,\n\
         {b},sale,200,,,,\n\
         {b},receipt,80,,,,\n",
        a = a.id,
        b = b.id
    );

    let before = ledger.metrics().recalculations_total.get();
    let report = ledger
        .import_csv(ImportKind::Transactions, &csv)
        .await
        .unwrap();
    let after = ledger.metrics().recalculations_total.get();

    assert_eq!(report.created, 5);
    assert_eq!(report.skipped, 0);
    // 5 rows, 2 distinct customers, exactly 2 recalculations
    assert_eq!(after - before, 2);

    assert_eq!(
        ledger.get_customer(a.id).await.unwrap().balance,
        Decimal::from(120)
    );
    assert_eq!(
        ledger.get_customer(b.id).await.unwrap().balance,
        Decimal::from(120)
    );
}

#[tokio::test]
async fn test_import_skips_bad_rows_without_aborting() {
    let (ledger, _temp) = create_test_ledger().await;
    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();

    let csv = format!(
        "customerId,type,amount,description,billNumber,onBehalf,date\n\
         {id},sale,100,,,,\n\
         {id},transfer,100,,,,\n\
         {id},sale,-5,,,,\n\
         {missing},sale,100,,,,\n\
         {id},receipt,not-a-number,,,,\n\
         {id},receipt,40,,,,\n",
        id = customer.id,
        missing = Uuid::now_v7()
    );

    let report = ledger
        .import_csv(ImportKind::Transactions, &csv)
        .await
        .unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 4);

    assert_eq!(
        ledger.get_customer(customer.id).await.unwrap().balance,
        Decimal::from(60)
    );
}

#[tokio::test]
async fn test_oversized_import_rejected_before_any_write() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.import.max_rows = 2;
    let ledger = Ledger::open(config).await.unwrap();

    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();

    let csv = format!(
        "customerId,type,amount\n{id},sale,100\n{id},sale,200\n{id},sale,300\n",
        id = customer.id
    );

    let result = ledger.import_csv(ImportKind::Transactions, &csv).await;
    assert!(matches!(result, Err(Error::InvalidArgument(_))));

    // The rejection happens before any row lands, so no transaction is
    // persisted and the stored balance is still consistent
    let remaining = ledger
        .list_transactions(customer.id, &TransactionFilter::default())
        .await
        .unwrap();
    assert!(remaining.is_empty());
    assert_eq!(
        ledger.get_customer(customer.id).await.unwrap().balance,
        Decimal::ZERO
    );
}

#[tokio::test]
async fn test_import_date_leniency_defaults_to_now() {
    let (ledger, _temp) = create_test_ledger().await;
    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();

    let csv = format!(
        "customerId,type,amount,date\n\
         {id},sale,10,not-a-date\n\
         {id},sale,20,2024-01-15\n",
        id = customer.id
    );

    let report = ledger
        .import_csv(ImportKind::Transactions, &csv)
        .await
        .unwrap();
    // Unparsable dates fall back to now instead of rejecting the row
    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn test_customer_import_upserts_and_ignores_balance_column() {
    let (ledger, _temp) = create_test_ledger().await;
    let existing = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();
    ledger
        .create_transaction(new_tx(existing.id, TransactionKind::Sale, 500))
        .await
        .unwrap();

    let csv = format!(
        "id,firstName,lastName,fullName,phone,category,balance\n\
         {id},Ahmad,Karimi,,0711111111,Customer,999999\n\
         ,Fatima,Rahimi,,0722222222,Customer,123\n\
         ,,,Omid Hashimi,,Customer,\n\
         ,,,,0733333333,Customer,\n",
        id = existing.id
    );

    let report = ledger.import_csv(ImportKind::Customers, &csv).await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 1);

    // Balance column in the file never lands on the record
    let updated = ledger.get_customer(existing.id).await.unwrap();
    assert_eq!(updated.balance, Decimal::from(500));
    assert_eq!(updated.phone, "0711111111");

    // fullName fallback split
    let all = ledger.list_customers(Some("Omid"), None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].last_name, "Hashimi");
}

#[tokio::test]
async fn test_sales_trend_buckets_and_zero_fills() {
    let (ledger, _temp) = create_test_ledger().await;
    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();

    let dated = |kind, amount: i64, days_ago: i64| NewTransaction {
        customer_id: customer.id,
        kind,
        amount: Decimal::from(amount),
        date: Some(Utc::now() - Duration::days(days_ago)),
        description: String::new(),
        bill_number: String::new(),
        on_behalf: String::new(),
        created_by: None,
    };

    for tx in [
        dated(TransactionKind::Sale, 100, 0),
        dated(TransactionKind::Sale, 50, 0),
        dated(TransactionKind::Receipt, 70, 0),
        dated(TransactionKind::Sale, 30, 2),
        dated(TransactionKind::Sale, 999, 10),
    ] {
        ledger.create_transaction(tx).await.unwrap();
    }

    let trend = ledger.sales_trend(7).await.unwrap();
    assert_eq!(trend.len(), 7);
    assert_eq!(trend[6].date, Utc::now().date_naive());

    // Today's two sales; the receipt never counts
    assert_eq!(trend[6].total, Decimal::from(150));
    assert_eq!(trend[4].total, Decimal::from(30));
    // Empty days are zero-filled, the 10-day-old sale is outside the window
    let window_total: Decimal = trend.iter().map(|p| p.total).sum();
    assert_eq!(window_total, Decimal::from(180));

    // Only 7 and 30 day windows exist; anything else falls back to 7
    assert_eq!(ledger.sales_trend(30).await.unwrap().len(), 30);
    assert_eq!(ledger.sales_trend(12).await.unwrap().len(), 7);
}

#[tokio::test]
async fn test_export_profitloss_rows() {
    let (ledger, _temp) = create_test_ledger().await;
    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();
    ledger
        .create_transaction(new_tx(customer.id, TransactionKind::Sale, 500))
        .await
        .unwrap();
    ledger
        .create_transaction(new_tx(customer.id, TransactionKind::Receipt, 800))
        .await
        .unwrap();

    let csv = ledger
        .export_csv(ExportKind::ProfitLoss, &TransactionFilter::default())
        .await
        .unwrap();

    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "metric,amount");
    assert_eq!(lines[1], "Total Sales,500");
    assert_eq!(lines[2], "Total Receipts,800");
    assert_eq!(lines[3], "Profit/Loss (Receipts - Sales),300");
}

#[tokio::test]
async fn test_exported_transactions_reimport_cleanly() {
    let (ledger, _temp) = create_test_ledger().await;
    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();
    ledger
        .create_transaction(new_tx(customer.id, TransactionKind::Sale, 500))
        .await
        .unwrap();
    ledger
        .create_transaction(new_tx(customer.id, TransactionKind::Receipt, 200))
        .await
        .unwrap();

    let csv = ledger
        .export_csv(ExportKind::Transactions, &TransactionFilter::default())
        .await
        .unwrap();

    // Re-importing doubles every amount; the corrected-file workflow
    let report = ledger
        .import_csv(ImportKind::Transactions, &csv)
        .await
        .unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(
        ledger.get_customer(customer.id).await.unwrap().balance,
        Decimal::from(600)
    );
}

#[tokio::test]
async fn test_concurrent_creates_converge_after_final_recalculation() {
    let (ledger, _temp) = create_test_ledger().await;
    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();

    let ledger = Arc::new(ledger);
    let mut handles = Vec::new();
    for amount in [100, 200, 300, 400] {
        let ledger = ledger.clone();
        let id = customer.id;
        handles.push(tokio::spawn(async move {
            ledger
                .create_transaction(new_tx(id, TransactionKind::Sale, amount))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Whatever interleaving the writes took, one explicit recalculation
    // restores the fold over everything that committed
    let balance = ledger.recalculate(customer.id).await.unwrap();
    assert_eq!(balance, Some(Decimal::from(1000)));
    assert_eq!(
        ledger.get_customer(customer.id).await.unwrap().balance,
        Decimal::from(1000)
    );
}

#[tokio::test]
async fn test_broadcast_on_transaction_mutation() {
    let (ledger, _temp) = create_test_ledger().await;
    let bus = Broadcaster::new();
    let ledger = ledger.with_broadcaster(bus.clone());

    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();

    let mut sub = bus.subscribe();
    let (tx, _) = ledger
        .create_transaction(new_tx(customer.id, TransactionKind::Sale, 500))
        .await
        .unwrap();

    let first = sub.recv().await.unwrap();
    match first.payload {
        ChangePayload::TransactionChanged { balance, transaction, .. } => {
            assert_eq!(balance, Decimal::from(500));
            assert_eq!(transaction["id"], serde_json::json!(tx.id));
        }
        other => panic!("expected transaction event, got {:?}", other),
    }

    let second = sub.recv().await.unwrap();
    assert!(matches!(second.payload, ChangePayload::StatsChanged));
}

#[tokio::test]
async fn test_import_emits_single_stats_event() {
    let (ledger, _temp) = create_test_ledger().await;
    let bus = Broadcaster::new();
    let ledger = ledger.with_broadcaster(bus.clone());

    let customer = ledger
        .create_customer(new_customer("Ahmad", CustomerCategory::Customer))
        .await
        .unwrap();

    let csv = format!(
        "customerId,type,amount\n{id},sale,1\n{id},sale,2\n{id},sale,3\n",
        id = customer.id
    );

    let mut sub = bus.subscribe();
    ledger
        .import_csv(ImportKind::Transactions, &csv)
        .await
        .unwrap();

    // One stats event for the whole batch, nothing per row
    let event = sub.recv().await.unwrap();
    assert!(matches!(event.payload, ChangePayload::StatsChanged));
    assert!(sub.try_recv().is_none());
}
