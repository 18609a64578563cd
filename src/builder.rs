//! Fluent query builder.
//!
//! A builder accumulates one [`StatementIntent`] and runs it exactly once.
//! States move `Fresh -> Filtered -> Returning -> Consumed`; any call after a
//! terminal (`first`, `one`, `all`, `execute`) fails with `BuilderReused`.
//!
//! ```no_run
//! # use rust_sqlite_query::{Engine, Result};
//! # fn demo(engine: &Engine, users: &rust_sqlite_query::TableSchema) -> Result<()> {
//! let id = users.column("id")?;
//! let some_number = users.column("some_number")?;
//! let total = engine
//!     .query([id.count()])
//!     .filter(some_number.ge(100)?)?
//!     .first()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;

use crate::compiler::{self, IntentKind, Returning, Statement, StatementIntent};
use crate::engine::{Engine, Terminal};
use crate::error::{CompileError, QueryError, Result};
use crate::expr::{ColumnRef, Expr};
use crate::mapper::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    Fresh,
    Filtered,
    Returning,
    Consumed,
}

impl fmt::Display for BuilderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuilderState::Fresh => "fresh",
            BuilderState::Filtered => "filtered",
            BuilderState::Returning => "returning",
            BuilderState::Consumed => "consumed",
        };
        f.write_str(name)
    }
}

pub struct QueryBuilder<'e> {
    engine: &'e Engine,
    intent: StatementIntent,
    state: BuilderState,
}

impl<'e> QueryBuilder<'e> {
    pub(crate) fn new(engine: &'e Engine, intent: StatementIntent) -> Self {
        Self {
            engine,
            intent,
            state: BuilderState::Fresh,
        }
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    pub fn intent(&self) -> &StatementIntent {
        &self.intent
    }

    /// Sets the `WHERE` predicate. Only one filter is accepted; combine
    /// predicates with [`Expr::and`] / [`Expr::or`] first.
    pub fn filter(&mut self, predicate: Expr) -> Result<&mut Self> {
        self.ensure_live()?;
        if self.state != BuilderState::Fresh {
            return Err(self.invalid("filter"));
        }
        if !predicate.is_predicate() {
            return Err(QueryError::InvalidOperation(format!(
                "filter `{predicate}` is not a boolean expression"
            )));
        }
        if predicate.contains_aggregate() {
            return Err(CompileError::AggregateInFilter {
                filter: predicate.to_string(),
            }
            .into());
        }
        self.intent.filter = Some(predicate);
        self.state = BuilderState::Filtered;
        Ok(self)
    }

    /// Returns every column of the affected rows as records.
    pub fn returning(&mut self) -> Result<&mut Self> {
        self.set_returning(Returning::AllColumns)
    }

    /// Returns the named columns of the affected rows as tuples.
    pub fn returning_columns(&mut self, columns: &[ColumnRef]) -> Result<&mut Self> {
        if columns.is_empty() {
            return Err(QueryError::InvalidOperation(
                "returning_columns needs at least one column".to_string(),
            ));
        }
        self.set_returning(Returning::Columns(columns.to_vec()))
    }

    pub fn order_by(&mut self, column: &ColumnRef, ascending: bool) -> Result<&mut Self> {
        self.ensure_select("order_by")?;
        self.intent.order_by.push((column.clone(), ascending));
        Ok(self)
    }

    /// Groups rows by `columns`. Grouped queries always yield tuples.
    pub fn group_by(&mut self, columns: &[ColumnRef]) -> Result<&mut Self> {
        self.ensure_select("group_by")?;
        self.intent.group_by.extend(columns.iter().cloned());
        Ok(self)
    }

    pub fn limit(&mut self, limit: i64) -> Result<&mut Self> {
        self.ensure_select("limit")?;
        self.intent.limit = Some(limit);
        Ok(self)
    }

    pub fn offset(&mut self, offset: i64) -> Result<&mut Self> {
        self.ensure_select("offset")?;
        self.intent.offset = Some(offset);
        Ok(self)
    }

    /// Runs the statement limited to one row. `Ok(None)` is the "no rows"
    /// signal, distinct from an execution failure.
    pub fn first(&mut self) -> Result<Option<Row>> {
        let intent = self.consume()?;
        let outcome = self.engine.run(intent, Terminal::First)?;
        Ok(outcome.rows.into_iter().next())
    }

    /// Like [`first`](Self::first) but treats an empty result as `NoRows`.
    pub fn one(&mut self) -> Result<Row> {
        self.first()?.ok_or(QueryError::NoRows)
    }

    /// Runs the statement and returns every row, possibly none.
    pub fn all(&mut self) -> Result<Vec<Row>> {
        let intent = self.consume()?;
        Ok(self.engine.run(intent, Terminal::All)?.rows)
    }

    /// Runs a delete or update and returns the number of affected rows.
    pub fn execute(&mut self) -> Result<usize> {
        if matches!(self.intent.kind, IntentKind::Select) {
            self.ensure_live()?;
            return Err(QueryError::InvalidOperation(
                "execute is only available on delete and update".to_string(),
            ));
        }
        let intent = self.consume()?;
        Ok(self.engine.run(intent, Terminal::Count)?.affected)
    }

    /// Compiles the statement `all` would run without executing it.
    pub fn to_statement(&self) -> Result<Statement> {
        self.ensure_live()?;
        let table = self.intent.target_table()?;
        let schema = self.engine.schema(&table)?;
        Ok(match self.intent.kind {
            IntentKind::Select => compiler::select(&self.intent, &schema)?,
            IntentKind::Delete { .. } | IntentKind::Update { .. } => {
                compiler::mutation(&self.intent, &schema, false)?
            }
        })
    }

    fn set_returning(&mut self, returning: Returning) -> Result<&mut Self> {
        self.ensure_live()?;
        if matches!(self.intent.kind, IntentKind::Select) {
            return Err(QueryError::InvalidOperation(
                "returning is only available on delete and update".to_string(),
            ));
        }
        if self.state != BuilderState::Filtered {
            return Err(self.invalid("returning"));
        }
        self.intent.returning = returning;
        self.state = BuilderState::Returning;
        Ok(self)
    }

    fn ensure_select(&self, action: &str) -> Result<()> {
        self.ensure_live()?;
        if !matches!(self.intent.kind, IntentKind::Select) {
            return Err(QueryError::InvalidOperation(format!(
                "{action} is only available on select queries"
            )));
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.state == BuilderState::Consumed {
            return Err(QueryError::BuilderReused);
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> QueryError {
        QueryError::InvalidTransition {
            state: self.state,
            action,
        }
    }

    fn consume(&mut self) -> Result<StatementIntent> {
        self.ensure_live()?;
        self.state = BuilderState::Consumed;
        let placeholder = StatementIntent::select(Vec::new());
        Ok(std::mem::replace(&mut self.intent, placeholder))
    }
}

impl fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("intent", &self.intent)
            .field("state", &self.state)
            .finish()
    }
}
