//! LedgerLink core — the identity & transaction reconciliation engine.
//!
//! Merges duplicate person records from heterogeneous sources into one
//! canonical identity set, resolves contact references on promotion and
//! transaction records, flags store accounts from payment patterns, links
//! peer-to-peer transfers to the transactions they paid for, and rolls the
//! result up into per-identity, per-item, and per-store summaries.
//!
//! Entry point: [`engine::ReconEngine`]. Ingestion (file decoding into
//! typed batches) and serving (query APIs, dashboards) live outside this
//! crate; the engine consumes [`record::RawBatches`] and checkpoints every
//! stage's output into [`store::ReconStore`].

pub mod classify;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod link;
pub mod merge;
pub mod record;
pub mod resolve;
pub mod store;
pub mod summarize;
pub mod types;
