//! Transfer–Transaction Linker — greedily pairs peer-to-peer transfers with
//! the transactions they likely paid for, by sender and amount.
//!
//! FIFO by design: the earliest transfer in input order claims the earliest
//! matching transaction, and a transaction is claimed at most once. The
//! result therefore depends on input order — callers supply transfers and
//! transactions in a stable, meaningful order (chronological) and get
//! reproducible links back. Re-linking always rebuilds the per-key queues
//! from the clean transaction set; partially-consumed queues are never
//! reused across runs.

use crate::{
    diagnostics::DiagnosticSink,
    record::{RawTransfer, TransactionRecord, TransferRecord},
    types::{to_cents, Cents, IdentityId, TxnId},
};
use std::collections::{HashMap, VecDeque};

pub const STAGE: &str = "link";

/// Transfer intake: the raw shape maps one-to-one onto the record.
pub fn transfer_records(raw: &[RawTransfer]) -> Vec<TransferRecord> {
    raw.iter()
        .map(|t| TransferRecord {
            id: t.id,
            sender_id: t.sender_id,
            recipient_id: t.recipient_id,
            amount: t.amount,
            timestamp: t.timestamp,
            related_transaction_id: None,
        })
        .collect()
}

/// Intake check: a transfer whose sender and recipient coincide violates the
/// transfer invariant. Recorded, never reverted — the record stays in the
/// run untouched.
pub fn validate_transfers(transfers: &[TransferRecord], diag: &mut DiagnosticSink) {
    for transfer in transfers {
        if transfer.sender_id == transfer.recipient_id {
            diag.warn(
                STAGE,
                format!(
                    "transfer {} has sender == recipient ({})",
                    transfer.id, transfer.sender_id
                ),
            );
        }
    }
}

/// Link transfers to transactions. Returns a new transfer set with
/// `related_transaction_id` filled where a match was found; an unmatched
/// transfer keeps null, which is expected, not an error.
pub fn link_transfers(
    mut transfers: Vec<TransferRecord>,
    transactions: &[TransactionRecord],
) -> Vec<TransferRecord> {
    // FIFO queue of transaction ids per (identity, rounded price), populated
    // in transaction input order. Unresolved transactions never enter.
    let mut queues: HashMap<(IdentityId, Cents), VecDeque<TxnId>> = HashMap::new();
    for txn in transactions {
        if let Some(identity_id) = txn.identity_id {
            queues
                .entry((identity_id, to_cents(txn.price)))
                .or_default()
                .push_back(txn.id.clone());
        }
    }

    let mut linked = 0usize;
    for transfer in &mut transfers {
        let key = (transfer.sender_id, to_cents(transfer.amount));
        if let Some(queue) = queues.get_mut(&key) {
            if let Some(txn_id) = queue.pop_front() {
                transfer.related_transaction_id = Some(txn_id);
                linked += 1;
            }
        }
    }

    log::debug!("linked {linked} of {} transfers", transfers.len());
    transfers
}
