//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Path that opens a transient in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite's default ceiling on bound parameters per statement.
pub const DEFAULT_MAX_PARAMS: usize = 32766;

/// How `RETURNING` mutations are executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturningMode {
    /// Native when the linked SQLite supports it, emulated otherwise.
    #[default]
    Auto,
    Native,
    /// Capture affected rows with a `SELECT` inside the same transaction.
    Emulated,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    #[serde(default)]
    pub returning: ReturningMode,
    /// Upper bound on parameters bound to one statement; larger inserts are
    /// split inside a single transaction.
    #[serde(default = "default_max_params")]
    pub max_params_per_statement: usize,
    /// How long to wait on a locked database file before failing.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

fn default_max_params() -> usize {
    DEFAULT_MAX_PARAMS
}

impl EngineConfig {
    /// Create a new config for the database at `db_path`
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            returning: ReturningMode::Auto,
            max_params_per_statement: DEFAULT_MAX_PARAMS,
            busy_timeout_ms: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    pub fn with_returning(mut self, returning: ReturningMode) -> Self {
        self.returning = returning;
        self
    }

    pub fn with_max_params(mut self, max_params: usize) -> Self {
        self.max_params_per_statement = max_params.max(1);
        self
    }

    pub fn with_busy_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.busy_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path == MEMORY_PATH
    }
}
