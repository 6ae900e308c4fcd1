//! SQLite persistence layer.
//!
//! RULE: only the store talks to the database. Stages are pure functions
//! over in-memory record sets; the orchestrator calls store methods to
//! checkpoint each stage's output — they never execute SQL themselves.
//!
//! Every table is run-scoped (`run_id` column); re-saving a stage's output
//! for the same run replaces the previous rows, so re-running a stage stays
//! well-defined.

use crate::{
    diagnostics::{Diagnostic, Severity},
    error::{ReconError, ReconResult},
    record::{DeviceFlags, Identity, PromotionRecord, TransactionRecord, TransferRecord},
    summarize::{ItemSummary, StoreSummary, UserTransactionSummary, UserTransferSummary},
};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, types::Type, Connection};

const DATE_FMT: &str = "%Y-%m-%d";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub struct ReconStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl ReconStore {
    pub fn open(path: &str) -> ReconResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> ReconResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Reopen a new connection to the same database. For in-memory
    /// databases this returns a fresh, isolated database.
    pub fn reopen(&self) -> ReconResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ReconResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/002_entities.sql"))?;
        self.conn
            .execute_batch(include_str!("../../migrations/003_summaries.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, version: &str, config_json: &str) -> ReconResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO run (run_id, version, config, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, version, config_json, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ── Checkpoints ────────────────────────────────────────────────

    pub fn mark_checkpoint(&self, run_id: &str, stage: &str, row_count: i64) -> ReconResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO checkpoint (run_id, stage, row_count) VALUES (?1, ?2, ?3)",
            params![run_id, stage, row_count],
        )?;
        Ok(())
    }

    pub fn checkpoint_exists(&self, run_id: &str, stage: &str) -> ReconResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM checkpoint WHERE run_id = ?1 AND stage = ?2",
            params![run_id, stage],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // ── Diagnostics ────────────────────────────────────────────────

    /// Replace the run's diagnostic log with the given entries. The sink is
    /// per-run and append-only in memory; the persisted copy mirrors it
    /// wholesale at the end of the run.
    pub fn save_diagnostics(&self, run_id: &str, entries: &[Diagnostic]) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM diagnostic WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO diagnostic (run_id, stage, severity, message) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for entry in entries {
            stmt.execute(params![
                run_id,
                entry.stage,
                entry.severity.as_str(),
                entry.message
            ])?;
        }
        Ok(())
    }

    pub fn load_diagnostics(&self, run_id: &str) -> ReconResult<Vec<Diagnostic>> {
        let mut stmt = self.conn.prepare(
            "SELECT stage, severity, message FROM diagnostic WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                let severity: String = row.get(1)?;
                Ok(Diagnostic {
                    stage: row.get(0)?,
                    severity: if severity == "fatal" {
                        Severity::Fatal
                    } else {
                        Severity::Warning
                    },
                    message: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Identities ─────────────────────────────────────────────────

    pub fn save_identities(&self, run_id: &str, identities: &[Identity]) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM identities WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO identities (
                run_id, id, first_name, last_name, email, phone, city, country,
                android, ios, desktop, is_store_account
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for identity in identities {
            stmt.execute(params![
                run_id,
                identity.id,
                identity.first_name,
                identity.last_name,
                identity.email,
                identity.phone,
                identity.city,
                identity.country,
                identity.devices.android as i32,
                identity.devices.ios as i32,
                identity.devices.desktop as i32,
                identity.is_store_account as i32,
            ])?;
        }
        Ok(())
    }

    pub fn load_identities(&self, run_id: &str) -> ReconResult<Vec<Identity>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, first_name, last_name, email, phone, city, country,
                    android, ios, desktop, is_store_account
             FROM identities WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(Identity {
                    id: row.get(0)?,
                    first_name: row.get(1)?,
                    last_name: row.get(2)?,
                    email: row.get(3)?,
                    phone: row.get(4)?,
                    city: row.get(5)?,
                    country: row.get(6)?,
                    devices: DeviceFlags {
                        android: row.get::<_, i32>(7)? != 0,
                        ios: row.get::<_, i32>(8)? != 0,
                        desktop: row.get::<_, i32>(9)? != 0,
                    },
                    is_store_account: row.get::<_, i32>(10)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn identity_count(&self, run_id: &str) -> ReconResult<i64> {
        self.count("identities", run_id)
    }

    // ── Promotions ─────────────────────────────────────────────────

    pub fn save_promotions(&self, run_id: &str, promotions: &[PromotionRecord]) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM promotions WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO promotions (run_id, id, email, phone, promotion, responded, date, identity_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for promo in promotions {
            stmt.execute(params![
                run_id,
                promo.id,
                promo.email,
                promo.phone,
                promo.promotion,
                promo.responded as i32,
                promo.date.format(DATE_FMT).to_string(),
                promo.identity_id,
            ])?;
        }
        Ok(())
    }

    pub fn load_promotions(&self, run_id: &str) -> ReconResult<Vec<PromotionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, email, phone, promotion, responded, date, identity_id
             FROM promotions WHERE run_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(PromotionRecord {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    phone: row.get(2)?,
                    promotion: row.get(3)?,
                    responded: row.get::<_, i32>(4)? != 0,
                    date: parse_date(5, row.get(5)?)?,
                    identity_id: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Transactions ───────────────────────────────────────────────

    pub fn save_transactions(
        &self,
        run_id: &str,
        transactions: &[TransactionRecord],
    ) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM transactions WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO transactions (
                run_id, seq, id, phone, store, item, price, quantity, unit_price, date, identity_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for (seq, txn) in transactions.iter().enumerate() {
            stmt.execute(params![
                run_id,
                seq as i64,
                txn.id,
                txn.phone,
                txn.store,
                txn.item,
                txn.price,
                txn.quantity,
                txn.unit_price,
                txn.date.format(DATE_FMT).to_string(),
                txn.identity_id,
            ])?;
        }
        Ok(())
    }

    pub fn load_transactions(&self, run_id: &str) -> ReconResult<Vec<TransactionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, phone, store, item, price, quantity, unit_price, date, identity_id
             FROM transactions WHERE run_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(TransactionRecord {
                    id: row.get(0)?,
                    phone: row.get(1)?,
                    store: row.get(2)?,
                    item: row.get(3)?,
                    price: row.get(4)?,
                    quantity: row.get::<_, i64>(5)? as u32,
                    unit_price: row.get(6)?,
                    date: parse_date(7, row.get(7)?)?,
                    identity_id: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Transfers ──────────────────────────────────────────────────

    pub fn save_transfers(&self, run_id: &str, transfers: &[TransferRecord]) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM transfers WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO transfers (
                run_id, seq, id, sender_id, recipient_id, amount, timestamp, related_transaction_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (seq, transfer) in transfers.iter().enumerate() {
            stmt.execute(params![
                run_id,
                seq as i64,
                transfer.id,
                transfer.sender_id,
                transfer.recipient_id,
                transfer.amount,
                transfer.timestamp.format(DATETIME_FMT).to_string(),
                transfer.related_transaction_id,
            ])?;
        }
        Ok(())
    }

    pub fn load_transfers(&self, run_id: &str) -> ReconResult<Vec<TransferRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, sender_id, recipient_id, amount, timestamp, related_transaction_id
             FROM transfers WHERE run_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(TransferRecord {
                    id: row.get(0)?,
                    sender_id: row.get(1)?,
                    recipient_id: row.get(2)?,
                    amount: row.get(3)?,
                    timestamp: parse_datetime(4, row.get(4)?)?,
                    related_transaction_id: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn linked_transfer_count(&self, run_id: &str) -> ReconResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM transfers
                 WHERE run_id = ?1 AND related_transaction_id IS NOT NULL",
                params![run_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ── Summaries ──────────────────────────────────────────────────

    pub fn save_user_transaction_summary(
        &self,
        run_id: &str,
        rows: &[UserTransactionSummary],
    ) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM user_transaction_summary WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO user_transaction_summary (
                run_id, identity_id, total_spent, txn_count, favorite_store, favorite_item
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in rows {
            stmt.execute(params![
                run_id,
                row.identity_id,
                row.total_spent,
                row.txn_count,
                row.favorite_store,
                row.favorite_item,
            ])?;
        }
        Ok(())
    }

    pub fn load_user_transaction_summary(
        &self,
        run_id: &str,
    ) -> ReconResult<Vec<UserTransactionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT identity_id, total_spent, txn_count, favorite_store, favorite_item
             FROM user_transaction_summary WHERE run_id = ?1 ORDER BY identity_id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(UserTransactionSummary {
                    identity_id: row.get(0)?,
                    total_spent: row.get(1)?,
                    txn_count: row.get(2)?,
                    favorite_store: row.get(3)?,
                    favorite_item: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn save_user_transfer_summary(
        &self,
        run_id: &str,
        rows: &[UserTransferSummary],
    ) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM user_transfer_summary WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO user_transfer_summary (
                run_id, identity_id, total_sent, total_received, net,
                sent_count, received_count, transfer_count
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for row in rows {
            stmt.execute(params![
                run_id,
                row.identity_id,
                row.total_sent,
                row.total_received,
                row.net,
                row.sent_count,
                row.received_count,
                row.transfer_count,
            ])?;
        }
        Ok(())
    }

    pub fn load_user_transfer_summary(
        &self,
        run_id: &str,
    ) -> ReconResult<Vec<UserTransferSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT identity_id, total_sent, total_received, net,
                    sent_count, received_count, transfer_count
             FROM user_transfer_summary WHERE run_id = ?1 ORDER BY identity_id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(UserTransferSummary {
                    identity_id: row.get(0)?,
                    total_sent: row.get(1)?,
                    total_received: row.get(2)?,
                    net: row.get(3)?,
                    sent_count: row.get(4)?,
                    received_count: row.get(5)?,
                    transfer_count: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn save_item_summary(&self, run_id: &str, rows: &[ItemSummary]) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM item_summary WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO item_summary (
                run_id, item, total_revenue, total_quantity, txn_count, avg_unit_price
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in rows {
            stmt.execute(params![
                run_id,
                row.item,
                row.total_revenue,
                row.total_quantity,
                row.txn_count,
                row.avg_unit_price,
            ])?;
        }
        Ok(())
    }

    pub fn load_item_summary(&self, run_id: &str) -> ReconResult<Vec<ItemSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT item, total_revenue, total_quantity, txn_count, avg_unit_price
             FROM item_summary WHERE run_id = ?1 ORDER BY item ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(ItemSummary {
                    item: row.get(0)?,
                    total_revenue: row.get(1)?,
                    total_quantity: row.get(2)?,
                    txn_count: row.get(3)?,
                    avg_unit_price: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn save_store_summary(&self, run_id: &str, rows: &[StoreSummary]) -> ReconResult<()> {
        self.conn.execute(
            "DELETE FROM store_summary WHERE run_id = ?1",
            params![run_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO store_summary (
                run_id, store, total_revenue, total_quantity, txn_count,
                avg_ticket, top_item_by_quantity, top_item_by_revenue
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for row in rows {
            stmt.execute(params![
                run_id,
                row.store,
                row.total_revenue,
                row.total_quantity,
                row.txn_count,
                row.avg_ticket,
                row.top_item_by_quantity,
                row.top_item_by_revenue,
            ])?;
        }
        Ok(())
    }

    pub fn load_store_summary(&self, run_id: &str) -> ReconResult<Vec<StoreSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT store, total_revenue, total_quantity, txn_count,
                    avg_ticket, top_item_by_quantity, top_item_by_revenue
             FROM store_summary WHERE run_id = ?1 ORDER BY store ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(StoreSummary {
                    store: row.get(0)?,
                    total_revenue: row.get(1)?,
                    total_quantity: row.get(2)?,
                    txn_count: row.get(3)?,
                    avg_ticket: row.get(4)?,
                    top_item_by_quantity: row.get(5)?,
                    top_item_by_revenue: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Shared helpers ─────────────────────────────────────────────

    fn count(&self, table: &str, run_id: &str) -> ReconResult<i64> {
        // Table names come from the fixed call sites above, never from input.
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE run_id = ?1");
        self.conn
            .query_row(&sql, params![run_id], |row| row.get(0))
            .map_err(ReconError::from)
    }
}

fn parse_date(index: usize, value: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&value, DATE_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}

fn parse_datetime(index: usize, value: String) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&value, DATETIME_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e)))
}
