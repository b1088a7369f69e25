//! Ledger store - users, tips, processing markers
//!
//! Single SQLite database behind an `Arc<Mutex<Connection>>`. Schema comes
//! from the `sql/` directory, embedded at compile time so the binary and the
//! tests never depend on the working directory. Every statement uses
//! `IF NOT EXISTS`, so migrations are idempotent.
//!
//! The writer guarantees exactly-once processing across stream redeliveries:
//! all valid tips from one comment and the one processing marker are written
//! in a single transaction. Either every row lands or none does, and a
//! pre-existing marker turns the whole call into a no-op.

use crate::engine::types::Tip;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Embedded schema migrations, applied in filename order
const MIGRATIONS: &[(&str, &str)] = &[
    ("01_users.sql", include_str!("../../sql/01_users.sql")),
    ("02_tips.sql", include_str!("../../sql/02_tips.sql")),
    (
        "03_processing_history.sql",
        include_str!("../../sql/03_processing_history.sql"),
    ),
    (
        "04_distribution_rounds.sql",
        include_str!("../../sql/04_distribution_rounds.sql"),
    ),
];

/// A row from the users table
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub address: Option<String>,
}

/// Result of one atomic write attempt for a comment's valid tips
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Tips and marker committed together
    Written(usize),
    /// Marker already present; nothing written (redelivered comment)
    AlreadyProcessed,
    /// Called with zero valid tips; treated as a no-op, not an error
    Nothing,
}

/// Ledger database handle
///
/// The timestamp function is injected so round-boundary and idempotency
/// behavior is deterministic under test.
pub struct LedgerDb {
    conn: Arc<Mutex<Connection>>,
    now_fn: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl LedgerDb {
    /// Open (or create) the ledger database at `path` and run migrations
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        Self::open_with_timestamp_fn(path, Arc::new(|| chrono::Utc::now().timestamp()))
    }

    /// Open with a custom timestamp function (tests)
    pub fn open_with_timestamp_fn(
        path: &Path,
        now_fn: Arc<dyn Fn() -> i64 + Send + Sync>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut conn = Connection::open(path)?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            now_fn,
        })
    }

    /// Shared connection handle, used by the round aggregator
    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    pub(crate) fn timestamp_fn(&self) -> Arc<dyn Fn() -> i64 + Send + Sync> {
        Arc::clone(&self.now_fn)
    }

    /// Look up a single user by handle, case-insensitively
    pub fn lookup_user(&self, handle: &str) -> Result<Option<UserRecord>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT username, address FROM users WHERE username = ? COLLATE NOCASE",
                [handle],
                |row| {
                    Ok(UserRecord {
                        username: row.get(0)?,
                        address: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Look up several handles at once; absent handles are simply missing
    /// from the result (partial map semantics)
    pub fn lookup_users(
        &self,
        handles: &[&str],
    ) -> Result<Vec<UserRecord>, Box<dyn std::error::Error>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().unwrap();
        let placeholders = vec!["?"; handles.len()].join(",");
        let sql = format!(
            "SELECT username, address FROM users WHERE username COLLATE NOCASE IN ({})",
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(handles.iter()), |row| {
            Ok(UserRecord {
                username: row.get(0)?,
                address: row.get(1)?,
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    /// Register or update a user's payout address
    pub fn upsert_address(
        &self,
        handle: &str,
        address: &str,
        content_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let now = (self.now_fn)();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO users (username, address, content_id, last_updated)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(username) DO UPDATE SET
                address = excluded.address,
                content_id = excluded.content_id,
                last_updated = excluded.last_updated
            "#,
            params![handle, address, content_id, now],
        )?;
        Ok(())
    }

    /// True iff a processing marker exists for (content_id, command)
    pub fn has_processed(
        &self,
        content_id: &str,
        command: &str,
    ) -> Result<bool, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id FROM processing_history WHERE content_id = ? AND command = ?",
        )?;
        Ok(stmt.exists([content_id, command])?)
    }

    /// Record a processing marker outside the tip-write path
    ///
    /// Used by reply-only outcomes (status queries, rejections, fallback
    /// links). Idempotent: a duplicate marker is ignored.
    pub fn set_processed(
        &self,
        content_id: &str,
        command: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let now = (self.now_fn)();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO processing_history (content_id, command, created_at) VALUES (?1, ?2, ?3)",
            params![content_id, command, now],
        )?;
        Ok(())
    }

    /// Atomically persist all valid tips from one comment plus the marker
    ///
    /// The transaction boundary is per-comment: invalid intents never reach
    /// this method, and a failure on any row rolls back every row. A
    /// pre-existing marker short-circuits to `AlreadyProcessed` without
    /// writing anything, which is what makes redelivery safe.
    pub fn write_tips(
        &self,
        tips: &[Tip],
        content_id: &str,
        command: &str,
    ) -> Result<WriteOutcome, Box<dyn std::error::Error>> {
        if tips.is_empty() {
            return Ok(WriteOutcome::Nothing);
        }

        let now = (self.now_fn)();
        let mut conn = self.conn.lock().unwrap();

        let tx = conn.transaction()?;
        {
            let already = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM processing_history WHERE content_id = ? AND command = ?",
                )?;
                stmt.exists([content_id, command])?
            };
            if already {
                return Ok(WriteOutcome::AlreadyProcessed);
            }

            let mut insert = tx.prepare(
                r#"
                INSERT INTO tips (from_user, to_user, amount, weight, token, content_id,
                                  parent_content_id, submission_id, community, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;
            for tip in tips {
                insert.execute(params![
                    tip.sender,
                    tip.recipient,
                    tip.amount,
                    tip.weight,
                    tip.token,
                    tip.content_id,
                    tip.parent_content_id,
                    tip.submission_id,
                    tip.community,
                    now,
                ])?;
            }

            tx.execute(
                "INSERT INTO processing_history (content_id, command, created_at) VALUES (?1, ?2, ?3)",
                params![content_id, command, now],
            )?;
        }
        tx.commit()?;

        Ok(WriteOutcome::Written(tips.len()))
    }

    /// Seed a distribution round (ops provisioning and tests; the engine
    /// itself only reads this table)
    pub fn insert_round(
        &self,
        round_id: i64,
        community: &str,
        from_ts: i64,
        to_ts: i64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO distribution_rounds (round_id, community, from_ts, to_ts) VALUES (?1, ?2, ?3, ?4)",
            params![round_id, community, from_ts, to_ts],
        )?;
        Ok(())
    }
}

/// Apply the embedded schema migrations in order
fn run_migrations(conn: &mut Connection) -> Result<(), Box<dyn std::error::Error>> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("📊 Enabled WAL mode for ledger database");

    for (name, sql) in MIGRATIONS {
        log::info!("🔧 Applying schema: {}", name);
        conn.execute_batch(sql)?;
    }

    Ok(())
}
