//! Maps raw result rows to records or tuples.
//!
//! A projection that is exactly the full column list of one table, in
//! registered order, yields records. Anything else yields tuples.

use std::sync::Arc;

use crate::error::ValidationError;
use crate::expr::{ColumnRef, Expr};
use crate::record::Record;
use crate::schema::TableSchema;
use crate::value::{ScalarType, Value};

/// One mapped result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Record(Record),
    Tuple(Vec<Value>),
}

impl Row {
    pub fn is_record(&self) -> bool {
        matches!(self, Row::Record(_))
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Row::Record(record) => Some(record),
            Row::Tuple(_) => None,
        }
    }

    pub fn into_record(self) -> Option<Record> {
        match self {
            Row::Record(record) => Some(record),
            Row::Tuple(_) => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Value]> {
        match self {
            Row::Tuple(values) => Some(values),
            Row::Record(_) => None,
        }
    }

    pub fn into_tuple(self) -> Option<Vec<Value>> {
        match self {
            Row::Tuple(values) => Some(values),
            Row::Record(_) => None,
        }
    }
}

/// How the rows of one statement are to be mapped.
#[derive(Debug, Clone)]
pub(crate) enum Shape {
    Records(Arc<TableSchema>),
    /// Declared type per output position, `None` where the raw value is kept.
    Tuples(Vec<Option<ScalarType>>),
}

impl Shape {
    pub(crate) fn of_projection(projection: &[Expr], schema: &Arc<TableSchema>, grouped: bool) -> Self {
        let full_row = !grouped
            && projection.len() == schema.columns().len()
            && projection
                .iter()
                .zip(schema.columns())
                .all(|(expr, column)| match expr {
                    Expr::Column(c) => c.table() == schema.name() && c.name() == column.name,
                    _ => false,
                });
        if full_row {
            return Shape::Records(Arc::clone(schema));
        }
        Shape::Tuples(
            projection
                .iter()
                .map(|expr| match expr {
                    Expr::Column(c) => Some(c.scalar_type()),
                    _ => None,
                })
                .collect(),
        )
    }

    pub(crate) fn of_columns(columns: &[ColumnRef]) -> Self {
        Shape::Tuples(columns.iter().map(|c| Some(c.scalar_type())).collect())
    }

    pub(crate) fn map(&self, rows: Vec<Vec<Value>>) -> Result<Vec<Row>, ValidationError> {
        rows.into_iter().map(|row| self.map_row(row)).collect()
    }

    fn map_row(&self, row: Vec<Value>) -> Result<Row, ValidationError> {
        match self {
            Shape::Records(schema) => Record::from_row(schema, row).map(Row::Record),
            Shape::Tuples(types) => Ok(Row::Tuple(
                row.into_iter()
                    .enumerate()
                    .map(|(i, value)| match types.get(i).copied().flatten() {
                        Some(ty) => value.decode(ty),
                        None => value,
                    })
                    .collect(),
            )),
        }
    }
}
