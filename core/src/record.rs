//! Canonical entity records and the raw pre-normalization batch types.
//!
//! RULE: the Identity set is built once by the merge stage and is read-only
//! for the remainder of the run. Every other entity is written once by its
//! owning stage and never mutated outside it — stages take inputs by value
//! and return new values.

use crate::types::{IdentityId, PromotionId, TransferId, TxnId};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ── Canonical entities ───────────────────────────────────────────────────────

/// Device capability flags, one per device class the sources report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFlags {
    pub android: bool,
    pub ios: bool,
    pub desktop: bool,
}

impl DeviceFlags {
    /// An all-false flag set, i.e. the source reported nothing. Treated as
    /// the null value for field-level backfill during the merge.
    pub fn is_empty(&self) -> bool {
        *self == DeviceFlags::default()
    }
}

/// The canonical, deduplicated representation of a person or store account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub devices: DeviceFlags,
    /// Set by the store-account classifier; false until that stage runs.
    pub is_store_account: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub id: PromotionId,
    /// Contact fields carried for resolution only; cleared once
    /// `identity_id` is assigned.
    pub email: Option<String>,
    pub phone: Option<String>,
    pub promotion: String,
    pub responded: bool,
    pub date: NaiveDate,
    pub identity_id: Option<IdentityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TxnId,
    /// Resolution contact; cleared once `identity_id` is assigned.
    pub phone: Option<String>,
    pub store: String,
    pub item: String,
    /// Line total. Invariant: price ≈ quantity × unit_price within a half
    /// cent; violations are repaired by recomputing unit_price.
    pub price: f64,
    pub quantity: u32,
    pub unit_price: f64,
    pub date: NaiveDate,
    pub identity_id: Option<IdentityId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    /// Already canonical — transfers arrive keyed by identity id.
    pub sender_id: IdentityId,
    pub recipient_id: IdentityId,
    pub amount: f64,
    pub timestamp: NaiveDateTime,
    pub related_transaction_id: Option<TxnId>,
}

// ── Raw ingestion-interface types ────────────────────────────────────────────
//
// One struct per upstream record shape, tolerant of the schema drift between
// sources: combined vs split names, nested vs flattened vs combined location,
// device lists vs per-device boolean columns, renamed contact fields.

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPersonRecord {
    pub id: IdentityId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Combined "First Last" form some sources use instead.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "mail")]
    pub email: Option<String>,
    #[serde(default, alias = "telephone")]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Nested `{city, country}` sub-object form.
    #[serde(default)]
    pub location: Option<RawLocation>,
    /// Combined "City, Country" string form.
    #[serde(default)]
    pub address: Option<String>,
    /// Device usage as a list of device names.
    #[serde(default)]
    pub devices: Option<Vec<String>>,
    /// Device usage as per-device boolean columns.
    #[serde(default, alias = "android")]
    pub uses_android: Option<bool>,
    #[serde(default, alias = "ios")]
    pub uses_ios: Option<bool>,
    #[serde(default, alias = "desktop")]
    pub uses_desktop: Option<bool>,
}

/// One person batch per source, pre-normalization. Batch order is source
/// priority order: the first batch handed to the merger wins conflicts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PersonBatch {
    pub source: String,
    pub records: Vec<RawPersonRecord>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPromotion {
    pub id: PromotionId,
    #[serde(default, alias = "mail")]
    pub email: Option<String>,
    #[serde(default, alias = "telephone")]
    pub phone: Option<String>,
    pub promotion: String,
    #[serde(default)]
    pub responded: bool,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawLineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
    #[serde(alias = "total")]
    pub line_total: f64,
}

/// A raw purchase: one store visit carrying one or more line items. The
/// resolve stage explodes this into one `TransactionRecord` per line item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTransaction {
    pub id: TxnId,
    #[serde(default, alias = "telephone")]
    pub phone: Option<String>,
    pub store: String,
    pub date: NaiveDate,
    pub items: Vec<RawLineItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTransfer {
    pub id: TransferId,
    pub sender_id: IdentityId,
    pub recipient_id: IdentityId,
    pub amount: f64,
    pub timestamp: NaiveDateTime,
}

/// Everything the ingestion collaborator hands the orchestrator for one run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawBatches {
    pub persons: Vec<PersonBatch>,
    #[serde(default)]
    pub promotions: Vec<RawPromotion>,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
    #[serde(default)]
    pub transfers: Vec<RawTransfer>,
}
