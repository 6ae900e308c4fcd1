//! The reconciliation orchestrator — the heart of LedgerLink.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. merge                 — raw person batches → canonical Identity set
//!   2. resolve_promotions    — attach identity ids to promotions
//!   3. resolve_transactions  — intake + attach identity ids to transactions
//!   4. classify              — flag store accounts from transfer patterns
//!   5. link                  — pair transfers with the transactions they paid
//!   6. summarize             — the four aggregate rollups
//!
//! RULES:
//!   - Stages execute strictly sequentially; each consumes the complete
//!     output of its predecessors as values and returns new values.
//!   - Every stage reports failures into the one per-run diagnostics sink;
//!     only an empty identity merge aborts the run.
//!   - Each stage's output is checkpointed to the store immediately after
//!     the stage completes. A persistence failure is a warning, not an
//!     abort, and later persistence is still attempted.
//!   - A resumed run loads any checkpointed stage instead of recomputing it.

use crate::{
    classify, config::ReconConfig, diagnostics::Diagnostic, diagnostics::DiagnosticSink,
    error::ReconResult, link, merge, record::RawBatches, resolve, resolve::ContactIndex,
    store::ReconStore, summarize, types::RunId,
};

/// Stable stage names, used for checkpoint rows and diagnostic tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Merge,
    ResolvePromotions,
    ResolveTransactions,
    Classify,
    Link,
    Summarize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Merge => merge::STAGE,
            Stage::ResolvePromotions => resolve::STAGE_PROMOTIONS,
            Stage::ResolveTransactions => resolve::STAGE_TRANSACTIONS,
            Stage::Classify => classify::STAGE,
            Stage::Link => link::STAGE,
            Stage::Summarize => summarize::STAGE,
        }
    }
}

/// Every artifact set a completed run produces.
#[derive(Debug, Default)]
pub struct RunArtifacts {
    pub identities: Vec<crate::record::Identity>,
    pub promotions: Vec<crate::record::PromotionRecord>,
    pub transactions: Vec<crate::record::TransactionRecord>,
    pub transfers: Vec<crate::record::TransferRecord>,
    pub user_transaction_summary: Vec<summarize::UserTransactionSummary>,
    pub user_transfer_summary: Vec<summarize::UserTransferSummary>,
    pub item_summary: Vec<summarize::ItemSummary>,
    pub store_summary: Vec<summarize::StoreSummary>,
}

/// What a run hands back to the caller: whatever artifacts were produced
/// plus the full diagnostics list. Interpretation (exit codes etc.) is the
/// caller's business.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub artifacts: RunArtifacts,
    pub diagnostics: Vec<Diagnostic>,
    /// True when the identity merge came up empty and the run stopped there.
    pub aborted: bool,
}

pub struct ReconEngine {
    pub run_id: RunId,
    config: ReconConfig,
    store: ReconStore,
}

impl ReconEngine {
    pub fn new(run_id: RunId, config: ReconConfig, store: ReconStore) -> Self {
        Self {
            run_id,
            config,
            store,
        }
    }

    /// A fresh, unique run id.
    pub fn generate_run_id() -> RunId {
        format!("run-{}", uuid::Uuid::new_v4())
    }

    pub fn store(&self) -> &ReconStore {
        &self.store
    }

    /// Execute a full run from raw batches.
    ///
    /// `Err` is reserved for infrastructure failures before the pipeline can
    /// start; everything that happens inside the run — including a fatal
    /// merge — comes back as `Ok(report)`.
    pub fn run(&mut self, batches: RawBatches) -> ReconResult<RunReport> {
        self.execute(batches, false)
    }

    /// Execute a run, loading any stage already checkpointed under this
    /// run id instead of recomputing it. Raw batches are still required:
    /// they feed whichever stages have not run yet.
    pub fn resume(&mut self, batches: RawBatches) -> ReconResult<RunReport> {
        self.execute(batches, true)
    }

    fn execute(&mut self, batches: RawBatches, resume: bool) -> ReconResult<RunReport> {
        self.store.migrate()?;
        let config_json = serde_json::to_string(&self.config)?;
        self.store
            .insert_run(&self.run_id, env!("CARGO_PKG_VERSION"), &config_json)?;

        let mut diag = DiagnosticSink::new();

        // ── Stage 1: merge ─────────────────────────────────────────
        let identities = if self.should_load(resume, Stage::Merge)? {
            self.store.load_identities(&self.run_id)?
        } else {
            let identities = merge::merge_identities(&batches.persons, &mut diag);
            // The one abort point: nothing downstream means anything
            // without identities. An aborted merge leaves no checkpoint, so
            // a resume attempt re-runs it instead of loading emptiness.
            if diag.has_fatal() {
                log::error!("run {} aborted: identity merge produced nothing", self.run_id);
                return Ok(self.finish(RunArtifacts::default(), diag, true));
            }
            self.checkpoint(Stage::Merge, identities.len(), &mut diag, |store, run_id| {
                store.save_identities(run_id, &identities)
            });
            identities
        };

        // ── Stages 2–3: resolve ────────────────────────────────────
        let index = ContactIndex::build(&identities, &mut diag);

        let promotions = if self.should_load(resume, Stage::ResolvePromotions)? {
            self.store.load_promotions(&self.run_id)?
        } else {
            let promotions = resolve::resolve_references(
                resolve::promotion_records(&batches.promotions),
                &index,
                &mut diag,
            );
            self.checkpoint(
                Stage::ResolvePromotions,
                promotions.len(),
                &mut diag,
                |store, run_id| store.save_promotions(run_id, &promotions),
            );
            promotions
        };

        let transactions = if self.should_load(resume, Stage::ResolveTransactions)? {
            self.store.load_transactions(&self.run_id)?
        } else {
            let transactions = resolve::resolve_references(
                resolve::transaction_records(&batches.transactions, &mut diag),
                &index,
                &mut diag,
            );
            self.checkpoint(
                Stage::ResolveTransactions,
                transactions.len(),
                &mut diag,
                |store, run_id| store.save_transactions(run_id, &transactions),
            );
            transactions
        };

        // ── Stage 4: classify ──────────────────────────────────────
        let transfers = link::transfer_records(&batches.transfers);
        link::validate_transfers(&transfers, &mut diag);

        let identities = if self.should_load(resume, Stage::Classify)? {
            self.store.load_identities(&self.run_id)?
        } else {
            let identities = classify::flag_store_accounts(
                identities,
                &transfers,
                &transactions,
                &self.config.classifier,
            );
            self.checkpoint(Stage::Classify, identities.len(), &mut diag, |store, run_id| {
                store.save_identities(run_id, &identities)
            });
            identities
        };

        // ── Stage 5: link ──────────────────────────────────────────
        let transfers = if self.should_load(resume, Stage::Link)? {
            self.store.load_transfers(&self.run_id)?
        } else {
            let transfers = link::link_transfers(transfers, &transactions);
            self.checkpoint(Stage::Link, transfers.len(), &mut diag, |store, run_id| {
                store.save_transfers(run_id, &transfers)
            });
            transfers
        };

        // ── Stage 6: summarize ─────────────────────────────────────
        let artifacts = if self.should_load(resume, Stage::Summarize)? {
            RunArtifacts {
                user_transaction_summary: self.store.load_user_transaction_summary(&self.run_id)?,
                user_transfer_summary: self.store.load_user_transfer_summary(&self.run_id)?,
                item_summary: self.store.load_item_summary(&self.run_id)?,
                store_summary: self.store.load_store_summary(&self.run_id)?,
                identities,
                promotions,
                transactions,
                transfers,
            }
        } else {
            let user_txn = summarize::user_transaction_summary(&identities, &transactions);
            let user_transfer = summarize::user_transfer_summary(&identities, &transfers);
            let items = summarize::item_summary(&transactions);
            let stores = summarize::store_summary(&transactions);
            let rows = user_txn.len() + user_transfer.len() + items.len() + stores.len();
            self.checkpoint(Stage::Summarize, rows, &mut diag, |store, run_id| {
                store.save_user_transaction_summary(run_id, &user_txn)?;
                store.save_user_transfer_summary(run_id, &user_transfer)?;
                store.save_item_summary(run_id, &items)?;
                store.save_store_summary(run_id, &stores)
            });
            RunArtifacts {
                identities,
                promotions,
                transactions,
                transfers,
                user_transaction_summary: user_txn,
                user_transfer_summary: user_transfer,
                item_summary: items,
                store_summary: stores,
            }
        };

        Ok(self.finish(artifacts, diag, false))
    }

    fn should_load(&self, resume: bool, stage: Stage) -> ReconResult<bool> {
        Ok(resume && self.store.checkpoint_exists(&self.run_id, stage.as_str())?)
    }

    /// Persist one stage's output and mark its checkpoint. A failure here
    /// degrades to a warning — the run keeps going and later stages still
    /// try to persist.
    fn checkpoint<F>(&self, stage: Stage, rows: usize, diag: &mut DiagnosticSink, write: F)
    where
        F: FnOnce(&ReconStore, &str) -> ReconResult<()>,
    {
        let result = write(&self.store, &self.run_id).and_then(|()| {
            self.store
                .mark_checkpoint(&self.run_id, stage.as_str(), rows as i64)
        });
        if let Err(e) = result {
            diag.warn(
                stage.as_str(),
                format!("failed to persist stage output: {e}"),
            );
        }
    }

    fn finish(&self, artifacts: RunArtifacts, diag: DiagnosticSink, aborted: bool) -> RunReport {
        let diagnostics = diag.into_inner();
        if let Err(e) = self.store.save_diagnostics(&self.run_id, &diagnostics) {
            // The sink is already consumed; this failure can only be logged.
            log::error!("failed to persist diagnostics for run {}: {e}", self.run_id);
        }
        RunReport {
            run_id: self.run_id.clone(),
            artifacts,
            diagnostics,
            aborted,
        }
    }
}
