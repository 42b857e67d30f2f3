//! Search history log (SQLite)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::search::SearchOutcome;
use crate::{CoreError, CoreResult};

/// One served query
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub query: String,
    pub tier: String,
    pub total_results: i64,
    pub top_code: Option<String>,
    pub searched_at: String,
}

pub struct SearchHistory {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl SearchHistory {
    pub fn open(db_path: &Path) -> CoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS search_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL,
                tier TEXT NOT NULL,
                total_results INTEGER NOT NULL,
                top_code TEXT,
                searched_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_search_history_tier ON search_history(tier);
        ",
        )?;
        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn record(&self, outcome: &SearchOutcome) -> CoreResult<i64> {
        let ts = now_iso();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO search_history (query, tier, total_results, top_code, searched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    outcome.query,
                    outcome.tier.as_str(),
                    outcome.count as i64,
                    outcome.top_code(),
                    ts
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> CoreResult<Vec<HistoryEntry>> {
        if limit == 0 {
            return Err(CoreError::Message(
                "limit must be a positive integer".into(),
            ));
        }
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, query, tier, total_results, top_code, searched_at
                 FROM search_history ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit as i64], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// How many logged queries each tier answered
    pub fn count_by_tier(&self) -> CoreResult<BTreeMap<String, i64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT tier, COUNT(1) FROM search_history GROUP BY tier")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            Ok(rows)
        })
    }

    fn with_conn<F, T>(&self, action: F) -> CoreResult<T>
    where
        F: FnOnce(&Connection) -> CoreResult<T>,
    {
        let conn = self.conn.lock();
        action(&conn)
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        id: row.get(0)?,
        query: row.get(1)?,
        tier: row.get(2)?,
        total_results: row.get(3)?,
        top_code: row.get(4)?,
        searched_at: row.get(5)?,
    })
}
