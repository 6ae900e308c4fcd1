//! Cross-Reference Resolver — attaches canonical identity ids to promotion
//! and transaction records that arrive carrying only contact attributes.
//!
//! Resolution is two-pass per record: email lookup first, then phone. A
//! record that matches neither keeps a null `identity_id` and is kept, never
//! dropped. Once a record is resolved its contact columns are cleared so the
//! same join key does not survive in two forms downstream.
//!
//! Also owns transaction intake: raw purchases carry a nested line-item
//! list and are exploded here into one record per line item, with the
//! price/quantity/unit-price invariant repaired on the way in.

use crate::{
    diagnostics::DiagnosticSink,
    record::{Identity, PromotionRecord, RawPromotion, RawTransaction, TransactionRecord},
    types::IdentityId,
};
use std::collections::HashMap;

pub const STAGE: &str = "resolve";
pub const STAGE_PROMOTIONS: &str = "resolve_promotions";
pub const STAGE_TRANSACTIONS: &str = "resolve_transactions";

/// Half a cent — the tolerance for `price ≈ quantity × unit_price`.
const PRICE_TOLERANCE: f64 = 0.005;

// ── Contact index ────────────────────────────────────────────────────────────

/// Email and phone lookup maps over the canonical Identity set. Built once
/// per run and shared by both resolver invocations.
///
/// Contact values are not globally unique; on collision the later identity
/// wins (map-construction order) and a warning records the degradation.
pub struct ContactIndex {
    by_email: HashMap<String, IdentityId>,
    by_phone: HashMap<String, IdentityId>,
}

impl ContactIndex {
    pub fn build(identities: &[Identity], diag: &mut DiagnosticSink) -> Self {
        let mut by_email = HashMap::new();
        let mut by_phone = HashMap::new();

        for identity in identities {
            if let Some(email) = &identity.email {
                if let Some(prev) = by_email.insert(email.clone(), identity.id) {
                    diag.warn(
                        STAGE,
                        format!(
                            "email '{email}' shared by identities {prev} and {}; later wins",
                            identity.id
                        ),
                    );
                }
            }
            if let Some(phone) = &identity.phone {
                if let Some(prev) = by_phone.insert(phone.clone(), identity.id) {
                    diag.warn(
                        STAGE,
                        format!(
                            "phone '{phone}' shared by identities {prev} and {}; later wins",
                            identity.id
                        ),
                    );
                }
            }
        }

        Self { by_email, by_phone }
    }

    pub fn lookup_email(&self, email: &str) -> Option<IdentityId> {
        self.by_email.get(email).copied()
    }

    pub fn lookup_phone(&self, phone: &str) -> Option<IdentityId> {
        self.by_phone.get(phone).copied()
    }
}

// ── Resolvable record kinds ──────────────────────────────────────────────────

/// The seam between the resolver and the record kinds it annotates.
pub trait ContactLinked {
    /// Stage name used for this kind's diagnostics.
    const STAGE: &'static str;
    /// Singular noun for messages.
    const KIND: &'static str;

    fn email(&self) -> Option<&str>;
    fn phone(&self) -> Option<&str>;
    fn identity_id(&self) -> Option<IdentityId>;
    /// Set the canonical id and clear the contact columns it replaces.
    fn assign(&mut self, id: IdentityId);
}

impl ContactLinked for PromotionRecord {
    const STAGE: &'static str = STAGE_PROMOTIONS;
    const KIND: &'static str = "promotion";

    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    fn identity_id(&self) -> Option<IdentityId> {
        self.identity_id
    }

    fn assign(&mut self, id: IdentityId) {
        self.identity_id = Some(id);
        self.email = None;
        self.phone = None;
    }
}

impl ContactLinked for TransactionRecord {
    const STAGE: &'static str = STAGE_TRANSACTIONS;
    const KIND: &'static str = "transaction";

    // Transactions carry no email; the email pass is a natural no-op.
    fn email(&self) -> Option<&str> {
        None
    }

    fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    fn identity_id(&self) -> Option<IdentityId> {
        self.identity_id
    }

    fn assign(&mut self, id: IdentityId) {
        self.identity_id = Some(id);
        self.phone = None;
    }
}

/// Annotate a record batch with canonical identity ids where resolvable.
///
/// Records that already carry an id are untouched, which makes resolution
/// idempotent against an unchanged identity set.
pub fn resolve_references<R: ContactLinked>(
    mut records: Vec<R>,
    index: &ContactIndex,
    diag: &mut DiagnosticSink,
) -> Vec<R> {
    let total = records.len();
    let mut unresolved = 0usize;

    for record in &mut records {
        if record.identity_id().is_some() {
            continue;
        }
        let hit = record
            .email()
            .and_then(|email| index.lookup_email(email))
            .or_else(|| record.phone().and_then(|phone| index.lookup_phone(phone)));
        match hit {
            Some(id) => record.assign(id),
            None => unresolved += 1,
        }
    }

    if unresolved > 0 {
        diag.warn(
            R::STAGE,
            format!("{unresolved} of {total} {} records left unresolved", R::KIND),
        );
    }
    log::debug!(
        "resolved {} of {total} {} records",
        total - unresolved,
        R::KIND
    );

    records
}

// ── Intake ───────────────────────────────────────────────────────────────────

/// Promotion intake: the raw shape maps one-to-one onto the record.
pub fn promotion_records(raw: &[RawPromotion]) -> Vec<PromotionRecord> {
    raw.iter()
        .map(|p| PromotionRecord {
            id: p.id,
            email: p.email.clone(),
            phone: p.phone.clone(),
            promotion: p.promotion.clone(),
            responded: p.responded,
            date: p.date,
            identity_id: None,
        })
        .collect()
}

/// Transaction intake: explode each raw purchase into one record per line
/// item. Single-item purchases keep the source id; multi-item purchases get
/// `-1`, `-2`, … ordinal suffixes so transaction ids stay unique.
///
/// The `price ≈ quantity × unit_price` invariant is enforced here: a
/// violating triple is repaired by recomputing the unit price from
/// price/quantity, never rejected.
pub fn transaction_records(
    raw: &[RawTransaction],
    diag: &mut DiagnosticSink,
) -> Vec<TransactionRecord> {
    let mut records = Vec::new();

    for purchase in raw {
        if purchase.items.is_empty() {
            diag.warn(
                STAGE_TRANSACTIONS,
                format!("transaction '{}' has no line items; skipped", purchase.id),
            );
            continue;
        }
        let single = purchase.items.len() == 1;
        for (ordinal, item) in purchase.items.iter().enumerate() {
            let id = if single {
                purchase.id.clone()
            } else {
                format!("{}-{}", purchase.id, ordinal + 1)
            };

            let mut unit_price = item.unit_price;
            let expected = item.quantity as f64 * item.unit_price;
            if (item.line_total - expected).abs() > PRICE_TOLERANCE {
                if item.quantity > 0 {
                    unit_price = item.line_total / item.quantity as f64;
                    diag.warn(
                        STAGE_TRANSACTIONS,
                        format!(
                            "transaction '{id}': price {:.2} != {} x {:.2}; unit price recomputed",
                            item.line_total, item.quantity, item.unit_price
                        ),
                    );
                } else {
                    diag.warn(
                        STAGE_TRANSACTIONS,
                        format!(
                            "transaction '{id}': price {:.2} with zero quantity; unit price kept",
                            item.line_total
                        ),
                    );
                }
            }

            records.push(TransactionRecord {
                id,
                phone: purchase.phone.clone(),
                store: purchase.store.clone(),
                item: item.name.clone(),
                price: item.line_total,
                quantity: item.quantity,
                unit_price,
                date: purchase.date,
                identity_id: None,
            });
        }
    }

    records
}
