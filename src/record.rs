//! Validated records and the bridge to user-defined structs.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::error::{TypeMismatch, ValidationError};
use crate::schema::TableSchema;
use crate::value::{ScalarType, Value};

/// A struct that maps onto one table.
///
/// Field names must match column names. Conversion goes through serde, so
/// an auto-assigned primary key is usually declared as `Option<i64>`.
pub trait Table: Serialize + DeserializeOwned {
    fn schema() -> TableSchema;
}

/// A validated row of one table.
///
/// Fields are kept in registered column order. A record may omit columns;
/// inserts fill them from defaults or fail.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: String,
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Builds a record from column/value pairs, checking every value against
    /// the schema.
    pub fn construct<I, K, V>(schema: &TableSchema, values: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut slots: Vec<Option<Value>> = vec![None; schema.columns().len()];
        for (name, value) in values {
            let name = name.into();
            let position = schema
                .position(&name)
                .ok_or_else(|| ValidationError::UnknownField {
                    table: schema.name().to_string(),
                    column: name.clone(),
                })?;
            let column = &schema.columns()[position];
            let value = value.into();
            if value.is_null() && !column.accepts_null() {
                return Err(ValidationError::NullValue {
                    table: schema.name().to_string(),
                    column: name,
                });
            }
            let found = value.type_label();
            let value = value
                .conform(column.scalar_type)
                .ok_or_else(|| TypeMismatch {
                    target: format!("{}.{}", schema.name(), name),
                    expected: column.scalar_type,
                    found,
                })?;
            slots[position] = Some(value);
        }
        let fields = schema
            .columns()
            .iter()
            .zip(slots)
            .filter_map(|(column, slot)| slot.map(|value| (column.name.clone(), value)))
            .collect();
        Ok(Self {
            table: schema.name().to_string(),
            fields,
        })
    }

    /// Builds a record from a full storage row, decoding each value by its
    /// declared column type.
    pub(crate) fn from_row(schema: &TableSchema, row: Vec<Value>) -> Result<Self, ValidationError> {
        if row.len() != schema.columns().len() {
            return Err(ValidationError::Arity {
                table: schema.name().to_string(),
                expected: schema.columns().len(),
                actual: row.len(),
            });
        }
        let pairs: Vec<(String, Value)> = schema
            .columns()
            .iter()
            .zip(row)
            .map(|(column, value)| (column.name.clone(), value.decode(column.scalar_type)))
            .collect();
        Self::construct(schema, pairs)
    }

    /// Converts a [`Table`] struct into a record of `schema`.
    pub fn from_table<T: Table>(schema: &TableSchema, value: &T) -> Result<Self, ValidationError> {
        let conversion = |message: String| ValidationError::Conversion {
            table: schema.name().to_string(),
            message,
        };
        let object = match serde_json::to_value(value) {
            Ok(Json::Object(object)) => object,
            Ok(other) => return Err(conversion(format!("expected a struct, got {other}"))),
            Err(err) => return Err(conversion(err.to_string())),
        };
        let mut pairs = Vec::with_capacity(object.len());
        for (name, json) in object {
            let ty = schema
                .descriptor(&name)
                .map(|c| c.scalar_type)
                .ok_or_else(|| ValidationError::UnknownField {
                    table: schema.name().to_string(),
                    column: name.clone(),
                })?;
            let value = json_to_value(json, ty).ok_or_else(|| {
                conversion(format!("field `{name}` does not fit a {ty} column"))
            })?;
            pairs.push((name, value));
        }
        Self::construct(schema, pairs)
    }

    /// Converts the record into a [`Table`] struct.
    pub fn into_table<T: Table>(self) -> Result<T, ValidationError> {
        let table = self.table;
        let object: JsonMap<String, Json> = self
            .fields
            .into_iter()
            .map(|(name, value)| (name, value_to_json(value)))
            .collect();
        serde_json::from_value(Json::Object(object)).map_err(|err| ValidationError::Conversion {
            table,
            message: err.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn json_to_value(json: Json, ty: ScalarType) -> Option<Value> {
    match (json, ty) {
        (Json::Null, _) => Some(Value::Null),
        (Json::Bool(v), ScalarType::Bool) => Some(Value::Boolean(v)),
        (Json::Number(n), ScalarType::Int) => n.as_i64().map(Value::Integer),
        (Json::Number(n), ScalarType::Real) => n.as_f64().map(Value::Real),
        (Json::String(s), ScalarType::Text) => Some(Value::Text(s)),
        (Json::Array(items), ScalarType::Blob) => items
            .into_iter()
            .map(|item| item.as_u64().and_then(|b| u8::try_from(b).ok()))
            .collect::<Option<Vec<u8>>>()
            .map(Value::Blob),
        _ => None,
    }
}

fn value_to_json(value: Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Integer(v) => Json::Number(v.into()),
        Value::Real(v) => Number::from_f64(v).map_or(Json::Null, Json::Number),
        Value::Text(v) => Json::String(v),
        Value::Blob(v) => Json::Array(v.into_iter().map(|b| Json::Number(b.into())).collect()),
        Value::Boolean(v) => Json::Bool(v),
    }
}
