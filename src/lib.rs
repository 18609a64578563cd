//! Typed query construction and execution over SQLite for the Runar ecosystem.
//!
//! # Intention
//!
//! - Register record schemas once and materialize their tables.
//! - Build filters, aggregates and returning-clauses from typed column
//!   handles, compile them to parameterized SQL, run them and map rows back
//!   to records or tuples.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - No joins, migrations or dialects other than SQLite's.
//! - No logging setup; the crate emits `tracing` events and leaves the
//!   subscriber to the host process.

pub mod builder;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod mapper;
pub mod record;
pub mod schema;
pub mod sqlite;
pub mod value;

pub use builder::{BuilderState, QueryBuilder};
pub use compiler::{Returning, Statement, StatementIntent};
pub use config::{EngineConfig, ReturningMode};
pub use engine::Engine;
pub use error::{CompileError, QueryError, Result, TypeMismatch, ValidationError};
pub use expr::{AggregateFn, Assignment, ColumnRef, CompareOp, Expr};
pub use mapper::Row;
pub use record::{Record, Table};
pub use schema::{ColumnDescriptor, SchemaRegistry, TableSchema};
pub use value::{ScalarType, Value};
