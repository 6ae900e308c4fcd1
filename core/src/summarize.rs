//! Aggregation Summarizers — the four derived rollups.
//!
//! Each rollup is a pure function of the resolved/linked entity sets and is
//! recomputed in full on every run; nothing here updates incrementally.
//! Per-identity rollups cover every identity in the canonical set, with
//! absent metrics zero-filled. Output rows are key-sorted so persisted
//! artifacts are deterministic.

use crate::{
    record::{Identity, TransactionRecord, TransferRecord},
    types::IdentityId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const STAGE: &str = "summarize";

// ── Rollup rows ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTransactionSummary {
    pub identity_id: IdentityId,
    pub total_spent: f64,
    pub txn_count: i64,
    /// Statistical mode over store names; ties break to the store seen
    /// first in transaction input order. Null with zero transactions.
    pub favorite_store: Option<String>,
    pub favorite_item: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserTransferSummary {
    pub identity_id: IdentityId,
    pub total_sent: f64,
    pub total_received: f64,
    /// received − sent.
    pub net: f64,
    pub sent_count: i64,
    pub received_count: i64,
    pub transfer_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item: String,
    pub total_revenue: f64,
    pub total_quantity: i64,
    pub txn_count: i64,
    /// total_revenue / total_quantity.
    pub avg_unit_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub store: String,
    pub total_revenue: f64,
    pub total_quantity: i64,
    pub txn_count: i64,
    /// total_revenue / txn_count.
    pub avg_ticket: f64,
    /// Most-sold item by summed quantity. Computed independently from the
    /// revenue leader, so the two may disagree for the same store.
    pub top_item_by_quantity: Option<String>,
    /// Most-profitable item by summed revenue.
    pub top_item_by_revenue: Option<String>,
}

// ── Per-identity rollups ─────────────────────────────────────────────────────

pub fn user_transaction_summary(
    identities: &[Identity],
    transactions: &[TransactionRecord],
) -> Vec<UserTransactionSummary> {
    let mut by_identity: HashMap<IdentityId, Vec<&TransactionRecord>> = HashMap::new();
    for txn in transactions {
        if let Some(identity_id) = txn.identity_id {
            by_identity.entry(identity_id).or_default().push(txn);
        }
    }

    let mut rows: Vec<UserTransactionSummary> = identities
        .iter()
        .map(|identity| {
            let txns = by_identity.get(&identity.id).map(Vec::as_slice).unwrap_or(&[]);
            UserTransactionSummary {
                identity_id: identity.id,
                total_spent: txns.iter().map(|t| t.price).sum(),
                txn_count: txns.len() as i64,
                favorite_store: mode(txns.iter().map(|t| t.store.as_str())),
                favorite_item: mode(txns.iter().map(|t| t.item.as_str())),
            }
        })
        .collect();
    rows.sort_by_key(|row| row.identity_id);
    rows
}

pub fn user_transfer_summary(
    identities: &[Identity],
    transfers: &[TransferRecord],
) -> Vec<UserTransferSummary> {
    #[derive(Default)]
    struct TransferAccumulator {
        sent: f64,
        received: f64,
        sent_count: i64,
        received_count: i64,
    }

    let mut by_identity: HashMap<IdentityId, TransferAccumulator> = HashMap::new();
    for transfer in transfers {
        let sender = by_identity.entry(transfer.sender_id).or_default();
        sender.sent += transfer.amount;
        sender.sent_count += 1;
        let recipient = by_identity.entry(transfer.recipient_id).or_default();
        recipient.received += transfer.amount;
        recipient.received_count += 1;
    }

    // A transfer naming a party outside the identity set still counts for
    // the party that is in it; unknown parties get no row of their own.
    let mut rows: Vec<UserTransferSummary> = identities
        .iter()
        .map(|identity| {
            let acc = by_identity.remove(&identity.id).unwrap_or_default();
            UserTransferSummary {
                identity_id: identity.id,
                total_sent: acc.sent,
                total_received: acc.received,
                net: acc.received - acc.sent,
                sent_count: acc.sent_count,
                received_count: acc.received_count,
                transfer_count: acc.sent_count + acc.received_count,
            }
        })
        .collect();
    rows.sort_by_key(|row| row.identity_id);
    rows
}

// ── Item and store rollups ───────────────────────────────────────────────────

#[derive(Default)]
struct ItemAccumulator {
    revenue: f64,
    quantity: i64,
    count: i64,
    first_seen: usize,
}

pub fn item_summary(transactions: &[TransactionRecord]) -> Vec<ItemSummary> {
    let mut items: HashMap<&str, ItemAccumulator> = HashMap::new();
    for (index, txn) in transactions.iter().enumerate() {
        let acc = items.entry(txn.item.as_str()).or_insert(ItemAccumulator {
            first_seen: index,
            ..ItemAccumulator::default()
        });
        acc.revenue += txn.price;
        acc.quantity += txn.quantity as i64;
        acc.count += 1;
    }

    let mut rows: Vec<ItemSummary> = items
        .into_iter()
        .map(|(item, acc)| ItemSummary {
            item: item.to_string(),
            total_revenue: acc.revenue,
            total_quantity: acc.quantity,
            txn_count: acc.count,
            avg_unit_price: if acc.quantity > 0 {
                acc.revenue / acc.quantity as f64
            } else {
                0.0
            },
        })
        .collect();
    rows.sort_by(|a, b| a.item.cmp(&b.item));
    rows
}

pub fn store_summary(transactions: &[TransactionRecord]) -> Vec<StoreSummary> {
    struct StoreAccumulator<'a> {
        revenue: f64,
        quantity: i64,
        count: i64,
        items: HashMap<&'a str, ItemAccumulator>,
    }

    let mut stores: HashMap<&str, StoreAccumulator> = HashMap::new();
    for (index, txn) in transactions.iter().enumerate() {
        let store = stores
            .entry(txn.store.as_str())
            .or_insert_with(|| StoreAccumulator {
                revenue: 0.0,
                quantity: 0,
                count: 0,
                items: HashMap::new(),
            });
        store.revenue += txn.price;
        store.quantity += txn.quantity as i64;
        store.count += 1;
        let item = store.items.entry(txn.item.as_str()).or_insert(ItemAccumulator {
            first_seen: index,
            ..ItemAccumulator::default()
        });
        item.revenue += txn.price;
        item.quantity += txn.quantity as i64;
    }

    let mut rows: Vec<StoreSummary> = stores
        .into_iter()
        .map(|(store, acc)| StoreSummary {
            store: store.to_string(),
            total_revenue: acc.revenue,
            total_quantity: acc.quantity,
            txn_count: acc.count,
            avg_ticket: if acc.count > 0 {
                acc.revenue / acc.count as f64
            } else {
                0.0
            },
            top_item_by_quantity: pick_top(&acc.items, |item| item.quantity as f64),
            top_item_by_revenue: pick_top(&acc.items, |item| item.revenue),
        })
        .collect();
    rows.sort_by(|a, b| a.store.cmp(&b.store));
    rows
}

// ── Selection helpers ────────────────────────────────────────────────────────

/// Statistical mode with a deterministic tie-break: among equally frequent
/// values, the one seen first wins.
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, value) in values.enumerate() {
        let entry = counts.entry(value).or_insert((0, index));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .min_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_b.cmp(count_a).then(first_a.cmp(first_b))
        })
        .map(|(value, _)| value.to_string())
}

/// Highest-metric item with the same first-occurrence tie-break as `mode`.
fn pick_top<'a>(
    items: &HashMap<&'a str, ItemAccumulator>,
    metric: impl Fn(&ItemAccumulator) -> f64,
) -> Option<String> {
    items
        .iter()
        .min_by(|(_, a), (_, b)| {
            metric(b)
                .partial_cmp(&metric(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.first_seen.cmp(&b.first_seen))
        })
        .map(|(item, _)| item.to_string())
}
