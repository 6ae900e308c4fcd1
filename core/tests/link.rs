//! Integration tests for the Transfer–Transaction Linker.

use chrono::{NaiveDate, NaiveDateTime};
use ledgerlink_core::{
    diagnostics::DiagnosticSink,
    link::{link_transfers, validate_transfers},
    record::{TransactionRecord, TransferRecord},
};

fn timestamp(minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(9, minute, 0)
        .unwrap()
}

fn txn(id: &str, identity: Option<i64>, price: f64) -> TransactionRecord {
    TransactionRecord {
        id: id.into(),
        phone: None,
        store: "Shop".into(),
        item: "thing".into(),
        price,
        quantity: 1,
        unit_price: price,
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        identity_id: identity,
    }
}

fn transfer(id: i64, sender: i64, amount: f64) -> TransferRecord {
    TransferRecord {
        id,
        sender_id: sender,
        recipient_id: 42,
        amount,
        timestamp: timestamp(id as u32 % 60),
        related_transaction_id: None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn fifo_earliest_transfer_claims_earliest_transaction() {
    // Two $25.00 transactions for identity 1, three $25.00 transfers from
    // identity 1: the first two transfers link in order, the third stays
    // unlinked.
    let transactions = vec![
        txn("T1", Some(1), 25.00),
        txn("T2", Some(1), 25.00),
    ];
    let transfers = vec![
        transfer(101, 1, 25.00),
        transfer(102, 1, 25.00),
        transfer(103, 1, 25.00),
    ];

    let linked = link_transfers(transfers, &transactions);

    assert_eq!(linked[0].related_transaction_id.as_deref(), Some("T1"));
    assert_eq!(linked[1].related_transaction_id.as_deref(), Some("T2"));
    assert_eq!(linked[2].related_transaction_id, None);
}

#[test]
fn a_transaction_is_claimed_at_most_once() {
    let transactions = vec![txn("T1", Some(1), 9.99)];
    let transfers = vec![transfer(101, 1, 9.99), transfer(102, 1, 9.99)];

    let linked = link_transfers(transfers, &transactions);

    let claims: Vec<_> = linked
        .iter()
        .filter_map(|t| t.related_transaction_id.as_deref())
        .collect();
    assert_eq!(claims, vec!["T1"]);
}

#[test]
fn key_is_sender_and_exact_rounded_amount() {
    let transactions = vec![
        txn("T1", Some(1), 25.00),
        txn("T2", Some(2), 25.00),
    ];
    let transfers = vec![
        transfer(101, 2, 25.00),  // different sender → claims T2, not T1
        transfer(102, 1, 25.001), // rounds to 25.00 → claims T1
        transfer(103, 1, 25.10),  // no queue for this amount
    ];

    let linked = link_transfers(transfers, &transactions);

    assert_eq!(linked[0].related_transaction_id.as_deref(), Some("T2"));
    assert_eq!(linked[1].related_transaction_id.as_deref(), Some("T1"));
    assert_eq!(linked[2].related_transaction_id, None);
}

#[test]
fn unresolved_transactions_are_never_linkable() {
    let transactions = vec![txn("T1", None, 12.00)];
    let transfers = vec![transfer(101, 1, 12.00)];

    let linked = link_transfers(transfers, &transactions);
    assert_eq!(linked[0].related_transaction_id, None);
}

#[test]
fn relinking_rebuilds_queues_from_the_clean_transaction_set() {
    let transactions = vec![txn("T1", Some(1), 5.00)];
    let transfers = vec![transfer(101, 1, 5.00)];

    let first = link_transfers(transfers.clone(), &transactions);
    // A second run over the same inputs sees the same fresh queues, not the
    // consumed ones from the first run.
    let second = link_transfers(transfers, &transactions);

    assert_eq!(first[0].related_transaction_id.as_deref(), Some("T1"));
    assert_eq!(second[0].related_transaction_id.as_deref(), Some("T1"));
}

#[test]
fn unmatched_transfers_are_not_diagnostics() {
    let transfers = vec![transfer(101, 1, 99.00)];
    let linked = link_transfers(transfers, &[]);
    assert_eq!(linked[0].related_transaction_id, None);
}

#[test]
fn self_transfer_is_warned_and_kept() {
    let mut transfers = vec![transfer(101, 42, 10.00)];
    transfers[0].recipient_id = 42; // sender == recipient

    let mut diag = DiagnosticSink::new();
    validate_transfers(&transfers, &mut diag);

    assert_eq!(diag.len(), 1);
    assert!(diag.entries()[0].message.contains("sender == recipient"));
    // The record itself is untouched.
    assert_eq!(transfers[0].sender_id, transfers[0].recipient_id);
}
