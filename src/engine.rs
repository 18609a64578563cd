//! The engine: one SQLite connection, one schema registry, one lock.
//!
//! Every entry point that touches storage takes the engine lock for the
//! whole compile-and-execute call, so each insert, query or mutation is an
//! atomic unit and an `Engine` can be shared across threads as is.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::builder::QueryBuilder;
use crate::compiler::{self, IntentKind, Returning, StatementIntent};
use crate::config::{EngineConfig, ReturningMode};
use crate::error::{QueryError, Result};
use crate::expr::{Assignment, Expr};
use crate::mapper::{Row, Shape};
use crate::record::{Record, Table};
use crate::schema::{SchemaRegistry, TableSchema};
use crate::sqlite::{self, Storage};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminal {
    First,
    All,
    Count,
}

pub(crate) struct Outcome {
    pub rows: Vec<Row>,
    pub affected: usize,
}

#[derive(Debug)]
struct EngineState {
    storage: Storage,
    registry: SchemaRegistry,
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    native_returning: bool,
    state: Mutex<EngineState>,
}

impl Engine {
    pub fn open(mut config: EngineConfig) -> Result<Self> {
        // Deserialized configs bypass `with_max_params`; zero would leave no
        // room for a single parameter.
        config.max_params_per_statement = config.max_params_per_statement.max(1);
        let storage = Storage::open(&config)?;
        let native_returning = match config.returning {
            ReturningMode::Auto => sqlite::supports_returning(),
            ReturningMode::Native => true,
            ReturningMode::Emulated => false,
        };
        if !native_returning {
            warn!(
                "RETURNING disabled for {}, affected rows will be captured with SELECT",
                config.db_path
            );
        }
        Ok(Self {
            config,
            native_returning,
            state: Mutex::new(EngineState {
                storage,
                registry: SchemaRegistry::new(),
            }),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(EngineConfig::in_memory())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registers `schema` and creates its table if absent.
    ///
    /// Pushing an identical schema again returns the registered one without
    /// touching storage. A different column set under the same name, either
    /// in the registry or already on disk, is a `SchemaConflict`.
    pub fn push(&self, schema: TableSchema) -> Result<Arc<TableSchema>> {
        schema.validate()?;
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if let Some(existing) = state.registry.existing(&schema)? {
            debug!("table {} already registered", schema.name());
            return Ok(existing);
        }
        let stored = state.storage.stored_columns(schema.name())?;
        if !stored.is_empty() && !stored.iter().map(String::as_str).eq(schema.column_names()) {
            return Err(QueryError::SchemaConflict {
                table: schema.name().to_string(),
            });
        }
        sqlite::execute(state.storage.connection(), &compiler::create_table(&schema))?;
        let registration = state.registry.register(schema)?;
        let schema = Arc::clone(registration.schema());
        info!(
            "registered table {} with {} columns",
            schema.name(),
            schema.columns().len()
        );
        Ok(schema)
    }

    pub fn push_table<T: Table>(&self) -> Result<Arc<TableSchema>> {
        self.push(T::schema())
    }

    pub fn schema(&self, table: &str) -> Result<Arc<TableSchema>> {
        self.lock()?.registry.lookup(table)
    }

    /// Inserts a batch of records of one table, all or nothing.
    pub fn insert(&self, records: &[Record]) -> Result<()> {
        self.insert_batch(records, false).map(|_| ())
    }

    /// Inserts a batch and returns the stored rows, including primary keys
    /// assigned by storage. SQLite does not specify the order of `RETURNING`
    /// output, so callers should match rows by key rather than position.
    pub fn insert_returning(&self, records: &[Record]) -> Result<Vec<Record>> {
        self.insert_batch(records, true)
    }

    /// Inserts [`Table`] structs into their registered table.
    pub fn insert_typed<T: Table>(&self, values: &[T]) -> Result<()> {
        let schema = self.schema(T::schema().name())?;
        let records = values
            .iter()
            .map(|value| Record::from_table(&schema, value))
            .collect::<Result<Vec<_>, _>>()?;
        self.insert(&records)
    }

    /// Starts a select over `projection`. No I/O happens until a terminal call.
    pub fn query<I>(&self, projection: I) -> QueryBuilder<'_>
    where
        I: IntoIterator,
        I::Item: Into<Expr>,
    {
        let projection = projection.into_iter().map(Into::into).collect();
        QueryBuilder::new(self, StatementIntent::select(projection))
    }

    /// Starts a select of every column of `schema`, yielding records.
    pub fn select(&self, schema: &TableSchema) -> QueryBuilder<'_> {
        QueryBuilder::new(self, StatementIntent::select(schema.all_columns()))
    }

    pub fn delete(&self, schema: &TableSchema) -> QueryBuilder<'_> {
        QueryBuilder::new(self, StatementIntent::delete(schema.name()))
    }

    pub fn update<I>(&self, assignments: I) -> QueryBuilder<'_>
    where
        I: IntoIterator<Item = Assignment>,
    {
        QueryBuilder::new(
            self,
            StatementIntent::update(assignments.into_iter().collect()),
        )
    }

    /// Closes the connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<()> {
        let state = self.state.into_inner().map_err(|_| QueryError::LockPoisoned)?;
        state.storage.close()
    }

    fn lock(&self) -> Result<MutexGuard<'_, EngineState>> {
        self.state.lock().map_err(|_| QueryError::LockPoisoned)
    }

    fn insert_batch(&self, records: &[Record], returning: bool) -> Result<Vec<Record>> {
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        if let Some(other) = records.iter().find(|r| r.table() != first.table()) {
            return Err(QueryError::HeterogeneousBatch {
                first: first.table().to_string(),
                second: other.table().to_string(),
            });
        }

        let mut guard = self.lock()?;
        let state = &mut *guard;
        let schema = state.registry.lookup(first.table())?;
        let records = records
            .iter()
            .map(|r| Record::construct(&schema, r.fields().map(|(k, v)| (k, v.clone()))))
            .collect::<Result<Vec<_>, _>>()?;

        // Without native RETURNING each row goes in alone so its rowid can
        // be read back before the next one.
        let native = returning && self.native_returning;
        let max_params = if returning && !native {
            schema.columns().len()
        } else {
            self.config.max_params_per_statement
        };
        let statements = compiler::insert(&schema, &records, native, max_params)?;
        let reread = compiler::select_last_inserted(&schema);

        debug!(
            "inserting {} rows into {} with {} statements",
            records.len(),
            schema.name(),
            statements.len()
        );
        let tx = state.storage.transaction()?;
        let mut rows = Vec::new();
        for stmt in &statements {
            if native {
                rows.extend(sqlite::query(&tx, stmt)?);
            } else {
                sqlite::execute(&tx, stmt)?;
                if returning {
                    rows.extend(sqlite::query(&tx, &reread)?);
                }
            }
        }
        tx.commit()?;

        Ok(Shape::Records(schema)
            .map(rows)?
            .into_iter()
            .filter_map(Row::into_record)
            .collect())
    }

    pub(crate) fn run(&self, mut intent: StatementIntent, terminal: Terminal) -> Result<Outcome> {
        let table = intent.target_table()?;
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let schema = state.registry.lookup(&table)?;

        if matches!(intent.kind, IntentKind::Select) {
            if terminal == Terminal::First {
                intent.limit = Some(1);
            }
            let stmt = compiler::select(&intent, &schema)?;
            let shape = Shape::of_projection(&intent.projection, &schema, !intent.group_by.is_empty());
            let raw = sqlite::query(state.storage.connection(), &stmt)?;
            return Ok(Outcome {
                affected: raw.len(),
                rows: shape.map(raw)?,
            });
        }

        let first_only = terminal == Terminal::First;
        let stmt = compiler::mutation(&intent, &schema, first_only)?;
        let shape = match &intent.returning {
            Returning::Nothing => {
                let affected = sqlite::execute(state.storage.connection(), &stmt)?;
                return Ok(Outcome {
                    rows: Vec::new(),
                    affected,
                });
            }
            Returning::AllColumns => Shape::Records(Arc::clone(&schema)),
            Returning::Columns(columns) => Shape::of_columns(columns),
        };

        let raw = if self.native_returning {
            sqlite::query(state.storage.connection(), &stmt)?
        } else {
            self.emulate_returning(&mut state.storage, &schema, &intent, first_only)?
        };
        Ok(Outcome {
            affected: raw.len(),
            rows: shape.map(raw)?,
        })
    }

    /// Captures the target rows, mutates them by rowid and, for updates,
    /// re-reads the new values. All inside one transaction.
    fn emulate_returning(
        &self,
        storage: &mut Storage,
        schema: &TableSchema,
        intent: &StatementIntent,
        first_only: bool,
    ) -> Result<Vec<Vec<Value>>> {
        let is_delete = matches!(intent.kind, IntentKind::Delete { .. });
        let capture = compiler::capture(intent, schema, first_only, is_delete)?;
        let max_params = self.config.max_params_per_statement.max(1);
        let chunk = max_params
            .saturating_sub(compiler::head_params(intent))
            .max(1);

        let tx = storage.transaction()?;
        let mut rowids = Vec::new();
        let mut rows = Vec::new();
        for mut row in sqlite::query(&tx, &capture)? {
            match row.first() {
                Some(Value::Integer(rowid)) => rowids.push(*rowid),
                _ => {
                    return Err(QueryError::InvalidOperation(format!(
                        "table {} has no integer rowid",
                        schema.name()
                    )))
                }
            }
            row.remove(0);
            rows.push(row);
        }

        for ids in rowids.chunks(chunk) {
            sqlite::execute(&tx, &compiler::mutation_for_rowids(intent, schema, ids)?)?;
        }
        if !is_delete {
            rows.clear();
            for ids in rowids.chunks(max_params) {
                rows.extend(sqlite::query(
                    &tx,
                    &compiler::select_rowids(intent, schema, ids)?,
                )?);
            }
        }
        tx.commit()?;
        Ok(rows)
    }
}
