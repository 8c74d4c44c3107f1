use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::CanonicalProblem;

pub const SYSTEM_EMAIL: &str = "system@contest-import.local";
const SYSTEM_NAME: &str = "Contest Import";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encoding problem document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("preparing database directory: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCount {
    pub source: String,
    pub difficulty: String,
    pub count: i64,
}

/// Problem collection plus the sentinel author that owns imported rows.
/// Each canonical problem is stored as a JSON document keyed by a unique
/// external id; existing rows are never updated.
pub struct Store {
    conn: Connection,
    author_id: i64,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        let author_id = ensure_system_author(&conn)?;
        Ok(Store { conn, author_id })
    }

    pub fn system_author(&self) -> i64 {
        self.author_id
    }

    pub fn exists(&self, external_id: &str) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM problems WHERE external_id = ?1",
                [external_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Stamps author and timestamps, then inserts. A row with the same
    /// external id already present yields `Duplicate`.
    pub fn insert(&self, problem: &CanonicalProblem) -> Result<InsertOutcome, StoreError> {
        let now = Utc::now();
        let mut doc = problem.clone();
        doc.created_by = Some(self.author_id);
        doc.created_at = Some(now);
        doc.updated_at = Some(now);
        let json = serde_json::to_string(&doc)?;

        let result = self.conn.execute(
            "INSERT INTO problems
                (external_id, source, title, difficulty, category, created_by, document, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                doc.external_id,
                doc.source.as_str(),
                doc.title,
                doc.difficulty.as_str(),
                doc.category.as_str(),
                self.author_id,
                json,
                now.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted(self.conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                debug!("{} already stored", doc.external_id);
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(test)]
    pub fn get(&self, external_id: &str) -> Result<Option<CanonicalProblem>, StoreError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM problems WHERE external_id = ?1",
                [external_id],
                |r| r.get(0),
            )
            .optional()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    pub fn count_by_source_and_difficulty(&self) -> Result<Vec<SourceCount>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT source, difficulty, COUNT(*) FROM problems
             GROUP BY source, difficulty
             ORDER BY source, CASE difficulty WHEN 'easy' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(SourceCount {
                    source: r.get(0)?,
                    difficulty: r.get(1)?,
                    count: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS authors (
            id         INTEGER PRIMARY KEY,
            name       TEXT NOT NULL,
            email      TEXT UNIQUE NOT NULL,
            role       TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS problems (
            id          INTEGER PRIMARY KEY,
            external_id TEXT UNIQUE NOT NULL,
            source      TEXT NOT NULL,
            title       TEXT NOT NULL,
            difficulty  TEXT NOT NULL CHECK(difficulty IN ('easy','medium','hard')),
            category    TEXT NOT NULL,
            created_by  INTEGER NOT NULL REFERENCES authors(id),
            document    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_problems_source ON problems(source, difficulty);
        ",
    )?;
    Ok(())
}

/// Looks up the sentinel author by email, creating it on first use.
pub fn ensure_system_author(conn: &Connection) -> Result<i64, StoreError> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM authors WHERE email = ?1",
            [SYSTEM_EMAIL],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        debug!("Found system author {}", id);
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO authors (name, email, role) VALUES (?1, ?2, 'teacher')",
        params![SYSTEM_NAME, SYSTEM_EMAIL],
    )?;
    let id = conn.last_insert_rowid();
    info!("Created system author {}", id);
    Ok(id)
}
