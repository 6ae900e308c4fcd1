//! Integration tests for the aggregation summarizers.

use chrono::{NaiveDate, NaiveDateTime};
use ledgerlink_core::{
    record::{Identity, TransactionRecord, TransferRecord},
    summarize::{item_summary, store_summary, user_transaction_summary, user_transfer_summary},
};

fn identity(id: i64) -> Identity {
    Identity {
        id,
        first_name: None,
        last_name: None,
        email: None,
        phone: None,
        city: None,
        country: None,
        devices: Default::default(),
        is_store_account: false,
    }
}

fn timestamp(minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(9, minute, 0)
        .unwrap()
}

fn txn(id: &str, identity: Option<i64>, store: &str, item: &str, price: f64, quantity: u32) -> TransactionRecord {
    TransactionRecord {
        id: id.into(),
        phone: None,
        store: store.into(),
        item: item.into(),
        price,
        quantity,
        unit_price: if quantity > 0 { price / quantity as f64 } else { 0.0 },
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        identity_id: identity,
    }
}

fn transfer(id: i64, sender: i64, recipient: i64, amount: f64) -> TransferRecord {
    TransferRecord {
        id,
        sender_id: sender,
        recipient_id: recipient,
        amount,
        timestamp: timestamp(id as u32 % 60),
        related_transaction_id: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-identity transactions
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn total_spent_sums_to_total_prices_when_all_resolve() {
    let identities = vec![identity(1), identity(2)];
    let transactions = vec![
        txn("T1", Some(1), "Grocer", "milk", 3.50, 1),
        txn("T2", Some(1), "Grocer", "bread", 2.25, 1),
        txn("T3", Some(2), "Bakery", "cake", 14.00, 1),
    ];

    let rows = user_transaction_summary(&identities, &transactions);

    let summed: f64 = rows.iter().map(|r| r.total_spent).sum();
    let total: f64 = transactions.iter().map(|t| t.price).sum();
    assert!((summed - total).abs() < 1e-9);
}

#[test]
fn identities_with_no_transactions_are_zero_filled() {
    let identities = vec![identity(1), identity(2)];
    let transactions = vec![txn("T1", Some(1), "Grocer", "milk", 3.50, 1)];

    let rows = user_transaction_summary(&identities, &transactions);

    assert_eq!(rows.len(), 2);
    let empty = rows.iter().find(|r| r.identity_id == 2).unwrap();
    assert_eq!(empty.txn_count, 0);
    assert_eq!(empty.total_spent, 0.0);
    assert_eq!(empty.favorite_store, None);
    assert_eq!(empty.favorite_item, None);
}

#[test]
fn favorite_store_is_the_mode() {
    let identities = vec![identity(1)];
    let transactions = vec![
        txn("T1", Some(1), "Grocer", "milk", 1.0, 1),
        txn("T2", Some(1), "Bakery", "cake", 1.0, 1),
        txn("T3", Some(1), "Bakery", "bun", 1.0, 1),
    ];

    let rows = user_transaction_summary(&identities, &transactions);
    assert_eq!(rows[0].favorite_store.as_deref(), Some("Bakery"));
}

#[test]
fn favorite_ties_break_to_first_occurrence() {
    let identities = vec![identity(1)];
    let transactions = vec![
        txn("T1", Some(1), "Grocer", "milk", 1.0, 1),
        txn("T2", Some(1), "Bakery", "cake", 1.0, 1),
        txn("T3", Some(1), "Grocer", "cake", 1.0, 1),
        txn("T4", Some(1), "Bakery", "milk", 1.0, 1),
    ];

    let rows = user_transaction_summary(&identities, &transactions);
    // Grocer and Bakery are tied 2–2; Grocer appeared first.
    assert_eq!(rows[0].favorite_store.as_deref(), Some("Grocer"));
    // milk and cake are tied 2–2; milk appeared first.
    assert_eq!(rows[0].favorite_item.as_deref(), Some("milk"));
}

#[test]
fn unresolved_transactions_count_toward_no_identity() {
    let identities = vec![identity(1)];
    let transactions = vec![
        txn("T1", Some(1), "Grocer", "milk", 3.0, 1),
        txn("T2", None, "Grocer", "milk", 5.0, 1),
    ];

    let rows = user_transaction_summary(&identities, &transactions);
    assert_eq!(rows[0].txn_count, 1);
    assert!((rows[0].total_spent - 3.0).abs() < 1e-9);
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-identity transfers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn transfer_summary_nets_received_minus_sent() {
    let identities = vec![identity(1), identity(2), identity(3)];
    let transfers = vec![
        transfer(1, 1, 2, 10.0),
        transfer(2, 1, 3, 5.0),
        transfer(3, 2, 1, 2.0),
    ];

    let rows = user_transfer_summary(&identities, &transfers);

    let one = &rows[0];
    assert_eq!(one.identity_id, 1);
    assert!((one.total_sent - 15.0).abs() < 1e-9);
    assert!((one.total_received - 2.0).abs() < 1e-9);
    assert!((one.net - -13.0).abs() < 1e-9);
    assert_eq!(one.sent_count, 2);
    assert_eq!(one.received_count, 1);
    assert_eq!(one.transfer_count, 3);
}

#[test]
fn transfer_summary_zero_fills_every_identity() {
    let identities = vec![identity(1), identity(2)];
    let rows = user_transfer_summary(&identities, &[]);

    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.transfer_count == 0 && r.net == 0.0));
}

#[test]
fn transfers_with_unknown_parties_still_count_for_the_known_side() {
    let identities = vec![identity(1)];
    // Sender 77 is not in the identity set.
    let transfers = vec![transfer(1, 77, 1, 8.0)];

    let rows = user_transfer_summary(&identities, &transfers);
    assert_eq!(rows.len(), 1);
    assert!((rows[0].total_received - 8.0).abs() < 1e-9);
}

// ─────────────────────────────────────────────────────────────────────────────
// Items and stores
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn item_summary_averages_unit_price_over_quantity() {
    let transactions = vec![
        txn("T1", Some(1), "Grocer", "milk", 6.0, 2),
        txn("T2", Some(2), "Market", "milk", 9.0, 3),
        txn("T3", None, "Grocer", "bread", 2.0, 1),
    ];

    let rows = item_summary(&transactions);

    assert_eq!(rows.len(), 2);
    // Key-sorted output: bread before milk.
    assert_eq!(rows[0].item, "bread");
    let milk = &rows[1];
    assert_eq!(milk.item, "milk");
    assert!((milk.total_revenue - 15.0).abs() < 1e-9);
    assert_eq!(milk.total_quantity, 5);
    assert_eq!(milk.txn_count, 2);
    assert!((milk.avg_unit_price - 3.0).abs() < 1e-9);
}

#[test]
fn store_summary_average_ticket_is_revenue_over_count() {
    let transactions = vec![
        txn("T1", Some(1), "Grocer", "milk", 6.0, 2),
        txn("T2", Some(2), "Grocer", "bread", 4.0, 1),
    ];

    let rows = store_summary(&transactions);
    assert_eq!(rows.len(), 1);
    assert!((rows[0].avg_ticket - 5.0).abs() < 1e-9);
    assert_eq!(rows[0].total_quantity, 3);
}

#[test]
fn top_items_by_quantity_and_revenue_are_independent() {
    let transactions = vec![
        // caviar: quantity 1, revenue 50. crisps: quantity 10, revenue 12.
        txn("T1", Some(1), "Deli", "caviar", 50.0, 1),
        txn("T2", Some(1), "Deli", "crisps", 7.0, 6),
        txn("T3", Some(2), "Deli", "crisps", 5.0, 4),
    ];

    let rows = store_summary(&transactions);
    assert_eq!(rows[0].top_item_by_quantity.as_deref(), Some("crisps"));
    assert_eq!(rows[0].top_item_by_revenue.as_deref(), Some("caviar"));
}

#[test]
fn empty_inputs_produce_empty_rollups() {
    assert!(item_summary(&[]).is_empty());
    assert!(store_summary(&[]).is_empty());
}
