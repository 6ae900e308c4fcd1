//! Identity Merger — first stage of the run.
//!
//! Combines the raw per-source person batches into the canonical Identity
//! set:
//!   1. Normalize each batch into the canonical shape (split combined
//!      names, explode nested or combined locations, unify the device
//!      representations, rename contact fields).
//!   2. Concatenate batches in source-priority order (first = highest).
//!   3. Deduplicate by id, first occurrence wins; null fields of the first
//!      occurrence are backfilled field-by-field from later occurrences.
//!
//! An empty merged set is the one fatal condition in the whole engine: no
//! downstream stage can produce meaningful output without identities.

use crate::{
    diagnostics::DiagnosticSink,
    record::{DeviceFlags, Identity, PersonBatch, RawPersonRecord},
    types::IdentityId,
};
use std::collections::HashMap;

pub const STAGE: &str = "merge";

/// Merge raw person batches into the canonical Identity set.
///
/// Batch order is priority order. Per-field normalization failures are
/// warnings and leave the field null; only an empty result is fatal.
pub fn merge_identities(batches: &[PersonBatch], diag: &mut DiagnosticSink) -> Vec<Identity> {
    let mut order: Vec<IdentityId> = Vec::new();
    let mut by_id: HashMap<IdentityId, Identity> = HashMap::new();

    for batch in batches {
        log::debug!(
            "merging batch source={} records={}",
            batch.source,
            batch.records.len()
        );
        for raw in &batch.records {
            let normalized = normalize_record(&batch.source, raw, diag);
            match by_id.get_mut(&normalized.id) {
                Some(first) => backfill(first, normalized),
                None => {
                    order.push(normalized.id);
                    by_id.insert(normalized.id, normalized);
                }
            }
        }
    }

    if order.is_empty() {
        diag.fatal(STAGE, "identity merge produced zero identities");
        return Vec::new();
    }

    // `order` and `by_id` are populated together; every id is present. The
    // output is id-sorted so a set reloaded from a checkpoint is identical
    // to a freshly merged one.
    let mut identities: Vec<Identity> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();
    identities.sort_by_key(|identity| identity.id);
    identities
}

/// Normalize one raw record into the canonical Identity shape. Total: every
/// record yields an Identity; fields that fail to normalize stay null.
fn normalize_record(source: &str, raw: &RawPersonRecord, diag: &mut DiagnosticSink) -> Identity {
    let (first_name, last_name) = normalize_name(source, raw, diag);
    let (city, country) = normalize_location(source, raw, diag);
    let devices = normalize_devices(source, raw, diag);

    Identity {
        id: raw.id,
        first_name,
        last_name,
        email: raw.email.clone(),
        phone: raw.phone.clone(),
        city,
        country,
        devices,
        is_store_account: false,
    }
}

fn normalize_name(
    source: &str,
    raw: &RawPersonRecord,
    diag: &mut DiagnosticSink,
) -> (Option<String>, Option<String>) {
    if raw.first_name.is_some() || raw.last_name.is_some() {
        return (raw.first_name.clone(), raw.last_name.clone());
    }
    let Some(name) = raw.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
        return (None, None);
    };
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => (
            Some(first.to_string()),
            Some(rest.trim().to_string()),
        ),
        None => {
            diag.warn(
                STAGE,
                format!("source '{source}' person {}: single-token name '{name}', last name left null", raw.id),
            );
            (Some(name.to_string()), None)
        }
    }
}

fn normalize_location(
    source: &str,
    raw: &RawPersonRecord,
    diag: &mut DiagnosticSink,
) -> (Option<String>, Option<String>) {
    if raw.city.is_some() || raw.country.is_some() {
        return (raw.city.clone(), raw.country.clone());
    }
    if let Some(loc) = &raw.location {
        return (loc.city.clone(), loc.country.clone());
    }
    let Some(address) = raw.address.as_deref().map(str::trim).filter(|a| !a.is_empty()) else {
        return (None, None);
    };
    match address.split_once(',') {
        Some((city, country)) => (
            Some(city.trim().to_string()),
            Some(country.trim().to_string()),
        ),
        None => {
            diag.warn(
                STAGE,
                format!(
                    "source '{source}' person {}: combined location '{address}' has no comma, city/country left null",
                    raw.id
                ),
            );
            (None, None)
        }
    }
}

fn normalize_devices(source: &str, raw: &RawPersonRecord, diag: &mut DiagnosticSink) -> DeviceFlags {
    let mut flags = DeviceFlags {
        android: raw.uses_android.unwrap_or(false),
        ios: raw.uses_ios.unwrap_or(false),
        desktop: raw.uses_desktop.unwrap_or(false),
    };
    if let Some(devices) = &raw.devices {
        for device in devices {
            match device.trim().to_ascii_lowercase().as_str() {
                "android" => flags.android = true,
                "ios" | "iphone" => flags.ios = true,
                "desktop" | "pc" => flags.desktop = true,
                other => diag.warn(
                    STAGE,
                    format!("source '{source}' person {}: unknown device '{other}' ignored", raw.id),
                ),
            }
        }
    }
    flags
}

/// Field-level combine-first: the first occurrence keeps every non-null
/// field; only its null fields take the later occurrence's values. Rows are
/// never replaced wholesale.
fn backfill(first: &mut Identity, later: Identity) {
    fill(&mut first.first_name, later.first_name);
    fill(&mut first.last_name, later.last_name);
    fill(&mut first.email, later.email);
    fill(&mut first.phone, later.phone);
    fill(&mut first.city, later.city);
    fill(&mut first.country, later.country);
    if first.devices.is_empty() {
        first.devices = later.devices;
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}
