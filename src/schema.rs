//! Table schemas and the registry that owns them.
//!
//! A schema is registered once per engine and never changes afterwards.
//! Column order is part of the schema's identity: inserts bind values
//! positionally in registered order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, QueryError, Result};
use crate::expr::{AggregateArg, AggregateFn, ColumnRef, Expr};
use crate::value::{ScalarType, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub scalar_type: ScalarType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar_type,
            primary_key: false,
            nullable: false,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Integer primary keys alias the rowid, so storage assigns them when
    /// a row is inserted without one.
    pub fn is_auto_assigned(&self) -> bool {
        self.primary_key && self.scalar_type == ScalarType::Int
    }

    /// Whether NULL may be written to this column.
    pub fn accepts_null(&self) -> bool {
        self.nullable || self.is_auto_assigned()
    }
}

/// Ordered column structure for one record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn descriptor(&self, column: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == column)
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    pub fn primary_key(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Handle for building expressions over `column`.
    pub fn column(&self, column: &str) -> Result<ColumnRef, CompileError> {
        self.descriptor(column)
            .map(|c| ColumnRef::new(&self.name, &c.name, c.scalar_type))
            .ok_or_else(|| CompileError::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }

    /// Every column in registered order, as a projection.
    pub fn all_columns(&self) -> Vec<Expr> {
        self.columns
            .iter()
            .map(|c| Expr::Column(ColumnRef::new(&self.name, &c.name, c.scalar_type)))
            .collect()
    }

    /// `COUNT(*)` over this table.
    pub fn count_all(&self) -> Expr {
        Expr::Aggregate {
            func: AggregateFn::Count,
            arg: AggregateArg::AllRows {
                table: self.name.clone(),
            },
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let invalid = |reason: String| QueryError::InvalidSchema {
            table: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("table name is empty".to_string()));
        }
        if self.columns.is_empty() {
            return Err(invalid("table has no columns".to_string()));
        }
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                return Err(invalid(format!("duplicate column `{}`", column.name)));
            }
            if let Some(default) = &column.default {
                if matches!(default, Value::Real(v) if !v.is_finite()) {
                    return Err(invalid(format!(
                        "default {} of column `{}` is not a finite number",
                        default, column.name
                    )));
                }
                if default.clone().conform(column.scalar_type).is_none() {
                    return Err(invalid(format!(
                        "default {} does not fit {} column `{}`",
                        default, column.scalar_type, column.name
                    )));
                }
            }
        }
        if self.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(invalid("composite primary keys are not supported".to_string()));
        }
        Ok(())
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone)]
pub enum Registration {
    /// The schema is new to the registry.
    Created(Arc<TableSchema>),
    /// An identical schema was already registered.
    Existing(Arc<TableSchema>),
}

impl Registration {
    pub fn schema(&self) -> &Arc<TableSchema> {
        match self {
            Registration::Created(schema) | Registration::Existing(schema) => schema,
        }
    }
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registered schema for `schema`'s name if it is
    /// structurally identical, `None` if the name is free.
    pub fn existing(&self, schema: &TableSchema) -> Result<Option<Arc<TableSchema>>> {
        match self.tables.get(schema.name()) {
            Some(current) if current.as_ref() == schema => Ok(Some(Arc::clone(current))),
            Some(_) => Err(QueryError::SchemaConflict {
                table: schema.name().to_string(),
            }),
            None => Ok(None),
        }
    }

    pub fn register(&mut self, schema: TableSchema) -> Result<Registration> {
        schema.validate()?;
        if let Some(current) = self.existing(&schema)? {
            return Ok(Registration::Existing(current));
        }
        let schema = Arc::new(schema);
        self.tables
            .insert(schema.name().to_string(), Arc::clone(&schema));
        Ok(Registration::Created(schema))
    }

    pub fn lookup(&self, table: &str) -> Result<Arc<TableSchema>> {
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| QueryError::NotRegistered(table.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
