//! Append-only query/response log on SQLite. One row per request; rows are
//! never updated in place. Concurrent requests share the connection behind
//! a mutex, so appends serialize without readers blocking writers at the
//! application level.

use crate::error::{OceanError, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub id: String,
    pub query: String,
    pub response: String,
    pub created_at: String,
}

pub struct QueryLog {
    conn: Mutex<Connection>,
}

impl QueryLog {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| OceanError::Log(format!("Failed to open query log: {}", e)))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| OceanError::Log(format!("Failed to open query log: {}", e)))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS queries (
                id TEXT PRIMARY KEY,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| OceanError::Log(format!("Failed to create query log table: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append one row. Returns the generated row id.
    pub fn append(&self, query: &str, response: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339();
        let conn = self
            .conn
            .lock()
            .map_err(|_| OceanError::Log("Query log mutex poisoned".to_string()))?;
        conn.execute(
            "INSERT INTO queries (id, query, response, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, query, response, created_at],
        )
        .map_err(|e| OceanError::Log(format!("Failed to append query log row: {}", e)))?;
        Ok(id)
    }

    /// Newest rows first.
    pub fn recent(&self, limit: usize) -> Result<Vec<QueryLogEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| OceanError::Log("Query log mutex poisoned".to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT id, query, response, created_at FROM queries
                 ORDER BY created_at DESC LIMIT ?1",
            )
            .map_err(|e| OceanError::Log(format!("Failed to read query log: {}", e)))?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(QueryLogEntry {
                    id: row.get(0)?,
                    query: row.get(1)?,
                    response: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(|e| OceanError::Log(format!("Failed to read query log: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(
                row.map_err(|e| OceanError::Log(format!("Failed to read query log row: {}", e)))?,
            );
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_and_reads_back_newest_first() {
        let log = QueryLog::open_in_memory().unwrap();
        log.append("first query", "first response").unwrap();
        log.append("second query", "second response").unwrap();

        let entries = log.recent(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.query == "first query"));
        assert!(entries.iter().any(|e| e.query == "second query"));
    }

    #[test]
    fn limit_is_honored() {
        let log = QueryLog::open_in_memory().unwrap();
        for i in 0..5 {
            log.append(&format!("query {}", i), "response").unwrap();
        }
        assert_eq!(log.recent(3).unwrap().len(), 3);
    }
}
