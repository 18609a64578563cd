//! Scalar values and the column types they are checked against.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    Int,
    Text,
    Real,
    Blob,
    Bool,
}

impl ScalarType {
    /// SQLite type name used in `CREATE TABLE`. Booleans are stored as integers.
    pub fn sql_type(self) -> &'static str {
        match self {
            ScalarType::Int | ScalarType::Bool => "INTEGER",
            ScalarType::Text => "TEXT",
            ScalarType::Real => "REAL",
            ScalarType::Blob => "BLOB",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Real)
    }

    /// Whether a value of type `other` can stand where `self` is declared.
    /// The only widening allowed is int to real.
    pub fn accepts(self, other: ScalarType) -> bool {
        self == other || (self == ScalarType::Real && other == ScalarType::Int)
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Int => "int",
            ScalarType::Text => "text",
            ScalarType::Real => "real",
            ScalarType::Blob => "blob",
            ScalarType::Bool => "bool",
        };
        f.write_str(name)
    }
}

/// Core value types for SQLite operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
}

impl Value {
    /// Runtime type of the value, `None` for NULL.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ScalarType::Int),
            Value::Real(_) => Some(ScalarType::Real),
            Value::Text(_) => Some(ScalarType::Text),
            Value::Blob(_) => Some(ScalarType::Blob),
            Value::Boolean(_) => Some(ScalarType::Bool),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short type label for error messages.
    pub fn type_label(&self) -> String {
        match self.scalar_type() {
            Some(ty) => ty.to_string(),
            None => "null".to_string(),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }

    /// Converts a value to the declared column type, widening ints to reals.
    /// Returns `None` when the value cannot be stored in that column. NULL
    /// passes through; nullability is checked by the caller.
    pub(crate) fn conform(self, ty: ScalarType) -> Option<Value> {
        match (self, ty) {
            (Value::Null, _) => Some(Value::Null),
            (Value::Integer(v), ScalarType::Real) => Some(Value::Real(v as f64)),
            (value, ty) if value.scalar_type() == Some(ty) => Some(value),
            _ => None,
        }
    }

    /// Reinterprets a raw storage value as the declared column type.
    /// SQLite has no boolean storage class, and REAL affinity may still
    /// hand back integers for values written outside this crate.
    pub(crate) fn decode(self, ty: ScalarType) -> Value {
        match (self, ty) {
            (Value::Integer(v), ScalarType::Bool) => Value::Boolean(v != 0),
            (Value::Integer(v), ScalarType::Real) => Value::Real(v as f64),
            (value, _) => value,
        }
    }

    /// Renders the value as an SQL literal. Only used for `DEFAULT` clauses
    /// in DDL, where bound parameters are not allowed.
    pub(crate) fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(v) => v.to_string(),
            Value::Real(v) => format!("{v:?}"),
            Value::Text(v) => format!("'{}'", v.replace('\'', "''")),
            Value::Blob(v) => {
                let hex: String = v.iter().map(|b| format!("{b:02X}")).collect();
                format!("X'{hex}'")
            }
            Value::Boolean(v) => i64::from(*v).to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Value::Boolean(v) => write!(f, "{v}"),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
            Value::Boolean(v) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*v))),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Null => Ok(Value::Null),
            ValueRef::Integer(v) => Ok(Value::Integer(v)),
            ValueRef::Real(v) => Ok(Value::Real(v)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Value::Text(s.to_owned()))
                .map_err(|err| FromSqlError::Other(Box::new(err))),
            ValueRef::Blob(bytes) => Ok(Value::Blob(bytes.to_vec())),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
