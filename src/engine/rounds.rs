//! Round aggregator - read-side summaries over the active distribution round
//!
//! Pure read queries with no marker interaction. "Current round" for a
//! community is the unique row whose half-open [from_ts, to_ts) interval
//! contains now(); when none exists the queries return empty results and the
//! engine treats that as "no active round" rather than an error.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// One distribution round row
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionRound {
    pub round_id: i64,
    pub community: String,
    pub from_ts: i64,
    pub to_ts: i64,
}

/// Tips for one token within a round: count and summed amount
#[derive(Debug, Clone, PartialEq)]
pub struct TokenTotal {
    pub token: String,
    pub count: i64,
    pub amount: f64,
}

/// Community-wide per-token round status
#[derive(Debug, Clone, PartialEq)]
pub struct TokenRoundStatus {
    pub token: String,
    pub count: i64,
    pub amount: f64,
    pub average: f64,
}

/// Read-only aggregation queries over the tip ledger
pub struct RoundAggregator {
    conn: Arc<Mutex<Connection>>,
    now_fn: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl RoundAggregator {
    pub fn new(conn: Arc<Mutex<Connection>>, now_fn: Arc<dyn Fn() -> i64 + Send + Sync>) -> Self {
        Self { conn, now_fn }
    }

    /// The community's currently active round, if any
    pub fn current_round(
        &self,
        community: &str,
    ) -> Result<Option<DistributionRound>, Box<dyn std::error::Error>> {
        let now = (self.now_fn)();
        let conn = self.conn.lock().unwrap();
        let round = conn
            .query_row(
                r#"
                SELECT round_id, community, from_ts, to_ts
                FROM distribution_rounds
                WHERE community = ?1 AND from_ts <= ?2 AND ?2 < to_ts
                "#,
                params![community, now],
                |row| {
                    Ok(DistributionRound {
                        round_id: row.get(0)?,
                        community: row.get(1)?,
                        from_ts: row.get(2)?,
                        to_ts: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(round)
    }

    /// Tips sent by `user` within the community's active round, per token
    pub fn tips_sent_in_round(
        &self,
        user: &str,
        community: &str,
    ) -> Result<Vec<TokenTotal>, Box<dyn std::error::Error>> {
        let round = match self.current_round(community)? {
            Some(round) => round,
            None => return Ok(Vec::new()),
        };
        self.totals_for(
            "SELECT token, COUNT(id), SUM(amount) FROM tips
             WHERE from_user = ?1 COLLATE NOCASE AND created_at >= ?2 AND created_at < ?3
             GROUP BY token ORDER BY token",
            user,
            &round,
        )
    }

    /// Tips received by `user` within the community's active round, per token
    pub fn tips_received_in_round(
        &self,
        user: &str,
        community: &str,
    ) -> Result<Vec<TokenTotal>, Box<dyn std::error::Error>> {
        let round = match self.current_round(community)? {
            Some(round) => round,
            None => return Ok(Vec::new()),
        };
        self.totals_for(
            "SELECT token, COUNT(id), SUM(amount) FROM tips
             WHERE to_user = ?1 COLLATE NOCASE AND created_at >= ?2 AND created_at < ?3
             GROUP BY token ORDER BY token",
            user,
            &round,
        )
    }

    /// Per-token count, sum and average for all of a community's tips in its
    /// active round
    pub fn sub_status(
        &self,
        community: &str,
    ) -> Result<Vec<TokenRoundStatus>, Box<dyn std::error::Error>> {
        let round = match self.current_round(community)? {
            Some(round) => round,
            None => return Ok(Vec::new()),
        };

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT token, COUNT(id), SUM(amount), AVG(amount) FROM tips
             WHERE community = ?1 AND created_at >= ?2 AND created_at < ?3
             GROUP BY token ORDER BY token",
        )?;
        let rows = stmt.query_map(params![community, round.from_ts, round.to_ts], |row| {
            Ok(TokenRoundStatus {
                token: row.get(0)?,
                count: row.get(1)?,
                amount: row.get(2)?,
                average: row.get(3)?,
            })
        })?;

        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row?);
        }
        Ok(statuses)
    }

    fn totals_for(
        &self,
        sql: &str,
        user: &str,
        round: &DistributionRound,
    ) -> Result<Vec<TokenTotal>, Box<dyn std::error::Error>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![user, round.from_ts, round.to_ts], |row| {
            Ok(TokenTotal {
                token: row.get(0)?,
                count: row.get(1)?,
                amount: row.get(2)?,
            })
        })?;

        let mut totals = Vec::new();
        for row in rows {
            totals.push(row?);
        }
        Ok(totals)
    }
}
