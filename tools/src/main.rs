//! recon-runner: headless reconciliation runner for LedgerLink.
//!
//! Usage:
//!   recon-runner --data-dir ./data --db recon.db
//!   recon-runner --data-dir ./data --db recon.db --config recon.json
//!   recon-runner --db recon.db --resume run-<id> --data-dir ./data
//!
//! The data directory supplies the typed record batches the ingestion
//! collaborator would hand the engine: `persons_<source>.json` (one file
//! per source, loaded in source-priority order), `promotions.json`,
//! `transactions.json`, `transfers.json`. Missing promotion / transaction /
//! transfer files are treated as empty batches.

use anyhow::{Context, Result};
use ledgerlink_core::{
    config::ReconConfig,
    engine::{ReconEngine, RunReport},
    record::{PersonBatch, RawBatches, RawPersonRecord},
    store::ReconStore,
};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let data_dir = string_arg(&args, "--data-dir").unwrap_or_else(|| "./data".to_string());
    let db = string_arg(&args, "--db").unwrap_or_else(|| ":memory:".to_string());
    let config_path = string_arg(&args, "--config");
    let resume_run = string_arg(&args, "--resume");

    let config = match &config_path {
        Some(path) => ReconConfig::load(Path::new(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => ReconConfig::default(),
    };

    println!("LedgerLink — recon-runner");
    println!("  data_dir: {data_dir}");
    println!("  db:       {db}");
    println!(
        "  config:   {}",
        config_path.as_deref().unwrap_or("(defaults)")
    );
    println!();

    let batches = load_batches(Path::new(&data_dir), &config)?;
    log::info!(
        "loaded {} person batches, {} promotions, {} transactions, {} transfers",
        batches.persons.len(),
        batches.promotions.len(),
        batches.transactions.len(),
        batches.transfers.len()
    );

    let store = ReconStore::open(&db)?;
    let (run_id, resuming) = match resume_run {
        Some(id) => (id, true),
        None => (ReconEngine::generate_run_id(), false),
    };
    let mut engine = ReconEngine::new(run_id, config, store);

    let report = if resuming {
        engine.resume(batches)?
    } else {
        engine.run(batches)?
    };

    print_summary(&report);

    if report.aborted {
        std::process::exit(1);
    }
    Ok(())
}

/// Read `--flag value` from the argument list.
fn string_arg(args: &[String], flag: &str) -> Option<String> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].clone())
}

// ── Batch loading ────────────────────────────────────────────────────────────

fn load_batches(data_dir: &Path, config: &ReconConfig) -> Result<RawBatches> {
    Ok(RawBatches {
        persons: load_person_batches(data_dir, config)?,
        promotions: load_or_empty(data_dir.join("promotions.json"))?,
        transactions: load_or_empty(data_dir.join("transactions.json"))?,
        transfers: load_or_empty(data_dir.join("transfers.json"))?,
    })
}

/// Person batches, one per source, in priority order. With a configured
/// `source_priority` the listed sources are loaded in that order; otherwise
/// every `persons_*.json` in the directory is loaded in file-name order.
fn load_person_batches(data_dir: &Path, config: &ReconConfig) -> Result<Vec<PersonBatch>> {
    let mut batches = Vec::new();

    if config.source_priority.is_empty() {
        let mut paths: Vec<PathBuf> = fs::read_dir(data_dir)
            .with_context(|| format!("reading data dir {}", data_dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("persons_") && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();
        for path in paths {
            let source = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("persons_"))
                .unwrap_or("unknown")
                .to_string();
            batches.push(read_person_batch(&path, source)?);
        }
    } else {
        for source in &config.source_priority {
            let path = data_dir.join(format!("persons_{source}.json"));
            if !path.exists() {
                log::warn!("person source '{source}' has no file at {}", path.display());
                continue;
            }
            batches.push(read_person_batch(&path, source.clone())?);
        }
    }

    Ok(batches)
}

fn read_person_batch(path: &Path, source: String) -> Result<PersonBatch> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading person batch {}", path.display()))?;
    let records: Vec<RawPersonRecord> = serde_json::from_str(&content)
        .with_context(|| format!("parsing person batch {}", path.display()))?;
    Ok(PersonBatch { source, records })
}

fn load_or_empty<T: serde::de::DeserializeOwned>(path: PathBuf) -> Result<Vec<T>> {
    if !path.exists() {
        log::warn!("{} missing; treated as an empty batch", path.display());
        return Ok(Vec::new());
    }
    let content =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

// ── Summary ──────────────────────────────────────────────────────────────────

fn print_summary(report: &RunReport) {
    let artifacts = &report.artifacts;
    let store_accounts = artifacts
        .identities
        .iter()
        .filter(|i| i.is_store_account)
        .count();
    let linked = artifacts
        .transfers
        .iter()
        .filter(|t| t.related_transaction_id.is_some())
        .count();

    println!("run {} {}", report.run_id, if report.aborted { "ABORTED" } else { "complete" });
    println!("  identities:     {} ({store_accounts} store accounts)", artifacts.identities.len());
    println!("  promotions:     {}", artifacts.promotions.len());
    println!("  transactions:   {}", artifacts.transactions.len());
    println!("  transfers:      {} ({linked} linked)", artifacts.transfers.len());
    println!("  item rollups:   {}", artifacts.item_summary.len());
    println!("  store rollups:  {}", artifacts.store_summary.len());

    if report.diagnostics.is_empty() {
        println!("  diagnostics:    none");
    } else {
        println!("  diagnostics:    {}", report.diagnostics.len());
        for diagnostic in &report.diagnostics {
            println!(
                "    [{}] {}: {}",
                diagnostic.severity.as_str(),
                diagnostic.stage,
                diagnostic.message
            );
        }
    }
}
