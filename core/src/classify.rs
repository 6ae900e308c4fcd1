//! Store-Account Classifier — flags identities whose incoming-transfer
//! pattern resembles merchandise payment.
//!
//! Rationale: merchant accounts repeatedly receive amounts that coincide
//! with priced goods, while ordinary peer transfers are amount-diverse.
//! This is a heuristic, not a proof — false positives and negatives are
//! expected and acceptable, and nothing downstream assumes the flag is
//! accurate, only that it is reproducible.

use crate::{
    config::ClassifierConfig,
    record::{Identity, TransactionRecord, TransferRecord},
    types::{to_cents, Cents, IdentityId},
};
use std::collections::{HashMap, HashSet};

pub const STAGE: &str = "classify";

/// Per-identity view of received transfers.
#[derive(Default)]
struct ReceivedProfile {
    count: usize,
    amounts: HashSet<Cents>,
}

/// Return a new identity set with `is_store_account` decided. The input
/// set's ids, order, and every other field are preserved.
///
/// An identity qualifies iff it received at least `min_recipient_count`
/// transfers, at least `min_matching_amounts` of its distinct received
/// amounts appear in the global transaction-price set, and those matches
/// make up strictly more than `match_ratio_threshold` of its distinct
/// amounts. Identities below the recipient threshold are not evaluated.
pub fn flag_store_accounts(
    identities: Vec<Identity>,
    transfers: &[TransferRecord],
    transactions: &[TransactionRecord],
    config: &ClassifierConfig,
) -> Vec<Identity> {
    // Global price set, 2dp in cents, computed once and shared.
    let prices: HashSet<Cents> = transactions.iter().map(|t| to_cents(t.price)).collect();

    let mut received: HashMap<IdentityId, ReceivedProfile> = HashMap::new();
    for transfer in transfers {
        let profile = received.entry(transfer.recipient_id).or_default();
        profile.count += 1;
        profile.amounts.insert(to_cents(transfer.amount));
    }

    let mut flagged = 0usize;
    let identities: Vec<Identity> = identities
        .into_iter()
        .map(|mut identity| {
            identity.is_store_account = received
                .get(&identity.id)
                .map(|profile| qualifies(profile, &prices, config))
                .unwrap_or(false);
            if identity.is_store_account {
                flagged += 1;
            }
            identity
        })
        .collect();

    log::debug!(
        "classified {flagged} of {} identities as store accounts",
        identities.len()
    );
    identities
}

fn qualifies(profile: &ReceivedProfile, prices: &HashSet<Cents>, config: &ClassifierConfig) -> bool {
    if profile.count < config.min_recipient_count || profile.amounts.is_empty() {
        return false;
    }
    let matching = profile
        .amounts
        .iter()
        .filter(|amount| prices.contains(amount))
        .count();
    // Strict inequality on the ratio: exactly the threshold does not qualify.
    matching >= config.min_matching_amounts
        && (matching as f64 / profile.amounts.len() as f64) > config.match_ratio_threshold
}
