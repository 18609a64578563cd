//! Error types for schema registration, statement compilation and execution.

use thiserror::Error;

use crate::builder::BuilderState;
use crate::value::ScalarType;

/// A value or expression whose type does not fit where it is used.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("type mismatch on {target}: expected {expected}, found {found}")]
pub struct TypeMismatch {
    /// The column or expression being compared or assigned.
    pub target: String,
    pub expected: ScalarType,
    pub found: String,
}

/// Errors detected while turning an intent into SQL. None of these reach storage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("query selects no columns")]
    EmptyProjection,
    #[error("update sets no columns")]
    EmptyAssignments,
    #[error("unknown column `{column}` on table `{table}`")]
    UnknownColumn { table: String, column: String },
    #[error("statement mixes tables `{first}` and `{second}`")]
    MixedTables { first: String, second: String },
    #[error("IN list for `{column}` is empty")]
    EmptyInList { column: String },
    #[error("filter `{filter}` uses an aggregate")]
    AggregateInFilter { filter: String },
    #[error("column `{column}` is not nullable and cannot be set to NULL")]
    NullAssignment { column: String },
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),
}

/// Failures at the record construction boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("table `{table}` has no column `{column}`")]
    UnknownField { table: String, column: String },
    #[error("column `{table}.{column}` is not nullable")]
    NullValue { table: String, column: String },
    #[error("row has {actual} values but table `{table}` has {expected} columns")]
    Arity {
        table: String,
        expected: usize,
        actual: usize,
    },
    #[error("cannot convert `{table}` record: {message}")]
    Conversion { table: String, message: String },
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),
}

/// Engine errors.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("table `{table}` is already registered with a different column set")]
    SchemaConflict { table: String },
    #[error("invalid schema for table `{table}`: {reason}")]
    InvalidSchema { table: String, reason: String },
    #[error("table `{0}` is not registered")]
    NotRegistered(String),
    #[error(transparent)]
    TypeMismatch(#[from] TypeMismatch),
    #[error("column `{table}.{column}` has no value, no default and is not nullable")]
    MissingValue { table: String, column: String },
    #[error("insert batch mixes tables `{first}` and `{second}`")]
    HeterogeneousBatch { first: String, second: String },
    #[error("compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("query builder has already been consumed")]
    BuilderReused,
    #[error("cannot {action} while the builder is {state}")]
    InvalidTransition {
        state: BuilderState,
        action: &'static str,
    },
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("query returned no rows")]
    NoRows,
    #[error("engine connection lock poisoned")]
    LockPoisoned,
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;
