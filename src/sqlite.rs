//! SQLite storage boundary: one connection, statements in, rows out.

use std::time::Duration;

use rusqlite::{params_from_iter, Connection, Transaction};
use tracing::{debug, info};

use crate::compiler::{quote_ident, Statement};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::value::Value;

/// First SQLite release with `RETURNING` (3.35.0).
const RETURNING_MIN_VERSION: i32 = 3_035_000;

/// Whether the linked SQLite library understands `RETURNING`.
pub fn supports_returning() -> bool {
    rusqlite::version_number() >= RETURNING_MIN_VERSION
}

/// Owns the single connection for an engine's lifetime.
#[derive(Debug)]
pub struct Storage {
    connection: Connection,
    path: String,
}

impl Storage {
    pub fn open(config: &EngineConfig) -> Result<Self> {
        info!("opening sqlite storage at path: {}", config.db_path);
        let connection = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.db_path)?
        };
        if let Some(timeout) = config.busy_timeout_ms {
            connection.busy_timeout(Duration::from_millis(timeout))?;
        }
        Ok(Self {
            connection,
            path: config.db_path.clone(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.connection.transaction()?)
    }

    /// Column names of `table` as stored, empty when the table does not exist.
    pub fn stored_columns(&self, table: &str) -> Result<Vec<String>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table));
        let mut stmt = self.connection.prepare(&sql)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn close(self) -> Result<()> {
        info!("closing sqlite storage at path: {}", self.path);
        self.connection.close().map_err(|(_, err)| err.into())
    }
}

/// Runs `stmt` and collects every row it produces.
pub fn query(conn: &Connection, stmt: &Statement) -> Result<Vec<Vec<Value>>> {
    debug!(sql = %stmt.sql, params = stmt.params.len(), "executing statement");
    let mut prepared = conn.prepare_cached(&stmt.sql)?;
    let width = prepared.column_count();
    let mut rows = prepared.query(params_from_iter(stmt.params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(row.get::<_, Value>(i)?);
        }
        out.push(values);
    }
    Ok(out)
}

/// Runs a statement that produces no rows and returns the affected count.
pub fn execute(conn: &Connection, stmt: &Statement) -> Result<usize> {
    debug!(sql = %stmt.sql, params = stmt.params.len(), "executing statement");
    let mut prepared = conn.prepare_cached(&stmt.sql)?;
    Ok(prepared.execute(params_from_iter(stmt.params.iter()))?)
}
