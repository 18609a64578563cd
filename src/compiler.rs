//! Turns schemas and statement intents into SQL text plus bound parameters.
//!
//! Every literal becomes a `?` placeholder and its value is pushed onto the
//! parameter list at the moment the placeholder is written. The storage
//! layer binds positionally, so the two must never drift apart.

use crate::error::{CompileError, QueryError, TypeMismatch};
use crate::expr::{AggregateArg, AssignOp, Assignment, ColumnRef, CompareOp, Expr};
use crate::record::Record;
use crate::schema::{ColumnDescriptor, TableSchema};
use crate::value::Value;

/// Compiled SQL and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntentKind {
    Select,
    Delete { table: String },
    Update { assignments: Vec<Assignment> },
}

/// Rows a mutation should hand back.
#[derive(Debug, Clone, PartialEq)]
pub enum Returning {
    Nothing,
    /// Every column, so full records can be rebuilt.
    AllColumns,
    Columns(Vec<ColumnRef>),
}

/// Accumulated statement intent, owned by one builder.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementIntent {
    pub kind: IntentKind,
    pub projection: Vec<Expr>,
    pub filter: Option<Expr>,
    pub returning: Returning,
    pub group_by: Vec<ColumnRef>,
    pub order_by: Vec<(ColumnRef, bool)>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl StatementIntent {
    fn with_kind(kind: IntentKind, projection: Vec<Expr>) -> Self {
        Self {
            kind,
            projection,
            filter: None,
            returning: Returning::Nothing,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn select(projection: Vec<Expr>) -> Self {
        Self::with_kind(IntentKind::Select, projection)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::with_kind(
            IntentKind::Delete {
                table: table.into(),
            },
            Vec::new(),
        )
    }

    pub fn update(assignments: Vec<Assignment>) -> Self {
        Self::with_kind(IntentKind::Update { assignments }, Vec::new())
    }

    pub fn wants_returning(&self) -> bool {
        self.returning != Returning::Nothing
    }

    /// The single table this intent touches.
    pub fn target_table(&self) -> Result<String, CompileError> {
        let target = match &self.kind {
            IntentKind::Select => self
                .projection
                .iter()
                .flat_map(Expr::tables)
                .next()
                .map(str::to_string)
                .ok_or(CompileError::EmptyProjection)?,
            IntentKind::Delete { table } => table.clone(),
            IntentKind::Update { assignments } => assignments
                .first()
                .map(|a| a.column().table().to_string())
                .ok_or(CompileError::EmptyAssignments)?,
        };

        let mut referenced: Vec<&str> = self.projection.iter().flat_map(Expr::tables).collect();
        if let Some(filter) = &self.filter {
            referenced.extend(filter.tables());
        }
        if let IntentKind::Update { assignments } = &self.kind {
            referenced.extend(assignments.iter().map(|a| a.column().table()));
        }
        if let Returning::Columns(columns) = &self.returning {
            referenced.extend(columns.iter().map(ColumnRef::table));
        }
        referenced.extend(self.group_by.iter().map(ColumnRef::table));
        referenced.extend(self.order_by.iter().map(|(c, _)| c.table()));

        match referenced.into_iter().find(|t| *t != target) {
            Some(other) => Err(CompileError::MixedTables {
                first: target,
                second: other.to_string(),
            }),
            None => Ok(target),
        }
    }
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

struct SqlWriter<'s> {
    schema: &'s TableSchema,
    sql: String,
    params: Vec<Value>,
}

impl<'s> SqlWriter<'s> {
    fn new(schema: &'s TableSchema) -> Self {
        Self {
            schema,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn bind(&mut self, value: Value) {
        self.sql.push('?');
        self.params.push(value);
    }

    fn table(&mut self) {
        let quoted = quote_ident(self.schema.name());
        self.push(&quoted);
    }

    fn column(&mut self, column: &ColumnRef) -> Result<(), CompileError> {
        let descriptor = resolve(self.schema, column)?;
        let quoted = quote_ident(&descriptor.name);
        self.push(&quoted);
        Ok(())
    }

    fn column_list(&mut self, columns: &[ColumnRef]) -> Result<(), CompileError> {
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.column(column)?;
        }
        Ok(())
    }

    fn all_columns(&mut self) {
        let list = self
            .schema
            .column_names()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ");
        self.push(&list);
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Column(column) => self.column(column)?,
            Expr::Literal(value) => self.bind(value.clone()),
            Expr::Comparison { op, left, right } => {
                check_comparable(left, right)?;
                self.expr(left)?;
                match (op, right.as_ref()) {
                    (CompareOp::Eq, Expr::Literal(Value::Null)) => self.push(" IS NULL"),
                    (CompareOp::Ne, Expr::Literal(Value::Null)) => self.push(" IS NOT NULL"),
                    _ => {
                        self.push(" ");
                        self.push(op.symbol());
                        self.push(" ");
                        self.expr(right)?;
                    }
                }
            }
            Expr::Aggregate { func, arg } => {
                self.push(func.name());
                self.push("(");
                match arg {
                    AggregateArg::Column(column) => self.column(column)?,
                    AggregateArg::AllRows { table } => {
                        if table != self.schema.name() {
                            return Err(CompileError::MixedTables {
                                first: self.schema.name().to_string(),
                                second: table.clone(),
                            });
                        }
                        self.push("*");
                    }
                }
                self.push(")");
            }
            Expr::In { column, values } => {
                if values.is_empty() {
                    return Err(CompileError::EmptyInList {
                        column: column.to_string(),
                    });
                }
                self.column(column)?;
                self.push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.bind(value.clone());
                }
                self.push(")");
            }
            Expr::And(left, right) => self.binary("AND", left, right)?,
            Expr::Or(left, right) => self.binary("OR", left, right)?,
        }
        Ok(())
    }

    fn binary(&mut self, keyword: &str, left: &Expr, right: &Expr) -> Result<(), CompileError> {
        self.push("(");
        self.expr(left)?;
        self.push(" ");
        self.push(keyword);
        self.push(" ");
        self.expr(right)?;
        self.push(")");
        Ok(())
    }

    fn filter(&mut self, filter: Option<&Expr>) -> Result<(), CompileError> {
        if let Some(filter) = filter {
            if filter.contains_aggregate() {
                return Err(CompileError::AggregateInFilter {
                    filter: filter.to_string(),
                });
            }
            self.push(" WHERE ");
            self.expr(filter)?;
        }
        Ok(())
    }

    fn returning(&mut self, returning: &Returning) -> Result<(), CompileError> {
        match returning {
            Returning::Nothing => {}
            Returning::AllColumns => {
                self.push(" RETURNING ");
                self.all_columns();
            }
            Returning::Columns(columns) => {
                self.push(" RETURNING ");
                self.column_list(columns)?;
            }
        }
        Ok(())
    }

    /// `rowid IN (SELECT rowid FROM t WHERE ... LIMIT 1)`, restricting a
    /// mutation to its first matching row.
    fn first_row_only(&mut self, filter: Option<&Expr>) -> Result<(), CompileError> {
        self.push(" WHERE rowid IN (SELECT rowid FROM ");
        self.table();
        self.filter(filter)?;
        self.push(" LIMIT 1)");
        Ok(())
    }

    fn rowids(&mut self, rowids: &[i64]) {
        self.push(" WHERE rowid IN (");
        for (i, rowid) in rowids.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(Value::Integer(*rowid));
        }
        self.push(")");
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn resolve<'s>(
    schema: &'s TableSchema,
    column: &ColumnRef,
) -> Result<&'s ColumnDescriptor, CompileError> {
    if column.table() != schema.name() {
        return Err(CompileError::MixedTables {
            first: schema.name().to_string(),
            second: column.table().to_string(),
        });
    }
    let descriptor = schema
        .descriptor(column.name())
        .ok_or_else(|| CompileError::UnknownColumn {
            table: schema.name().to_string(),
            column: column.name().to_string(),
        })?;
    if descriptor.scalar_type != column.scalar_type() {
        return Err(TypeMismatch {
            target: column.to_string(),
            expected: descriptor.scalar_type,
            found: column.scalar_type().to_string(),
        }
        .into());
    }
    Ok(descriptor)
}

fn check_comparable(left: &Expr, right: &Expr) -> Result<(), CompileError> {
    match (left.scalar_type(), right.scalar_type()) {
        (Some(l), Some(r)) if !(l.accepts(r) || r.accepts(l)) => Err(TypeMismatch {
            target: left.to_string(),
            expected: l,
            found: r.to_string(),
        }
        .into()),
        _ => Ok(()),
    }
}

/// `CREATE TABLE IF NOT EXISTS`, with the primary key declared inline.
pub fn create_table(schema: &TableSchema) -> Statement {
    let columns = schema
        .columns()
        .iter()
        .map(|column| {
            let mut def = format!("{} {}", quote_ident(&column.name), column.scalar_type.sql_type());
            if column.primary_key {
                def.push_str(" PRIMARY KEY");
            } else if !column.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                def.push_str(" DEFAULT ");
                def.push_str(&default.sql_literal());
            }
            def
        })
        .collect::<Vec<_>>()
        .join(", ");
    Statement::new(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(schema.name()),
        columns
    ))
}

/// Multi-row `INSERT`. Columns follow registered order; one parameter group
/// per record. Batches wider than `max_params` are split into several
/// statements, which the engine runs in one transaction.
pub fn insert(
    schema: &TableSchema,
    records: &[Record],
    returning: bool,
    max_params: usize,
) -> Result<Vec<Statement>, QueryError> {
    let width = schema.columns().len();
    let mut groups = Vec::with_capacity(records.len());
    for record in records {
        groups.push(row_values(schema, record)?);
    }

    let head = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_ident(schema.name()),
        schema
            .column_names()
            .map(quote_ident)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let group_sql = format!("({})", vec!["?"; width].join(", "));
    let rows_per_statement = (max_params / width.max(1)).max(1);

    let statements = groups
        .chunks(rows_per_statement)
        .map(|chunk| {
            let mut sql = head.clone();
            sql.push_str(&vec![group_sql.as_str(); chunk.len()].join(", "));
            if returning {
                sql.push_str(" RETURNING ");
                sql.push_str(&returning_all(schema));
            }
            Statement {
                sql,
                params: chunk.iter().flatten().cloned().collect(),
            }
        })
        .collect();
    Ok(statements)
}

/// Values of `record` in column order, filling gaps from defaults.
fn row_values(schema: &TableSchema, record: &Record) -> Result<Vec<Value>, QueryError> {
    schema
        .columns()
        .iter()
        .map(|column| match record.get(&column.name) {
            Some(value) => Ok(value.clone()),
            None => match &column.default {
                Some(default) => Ok(default.clone()),
                None if column.accepts_null() => Ok(Value::Null),
                None => Err(QueryError::MissingValue {
                    table: schema.name().to_string(),
                    column: column.name.clone(),
                }),
            },
        })
        .collect()
}

fn returning_all(schema: &TableSchema) -> String {
    schema
        .column_names()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Full row of the most recently inserted record.
pub fn select_last_inserted(schema: &TableSchema) -> Statement {
    Statement::new(format!(
        "SELECT {} FROM {} WHERE rowid = last_insert_rowid()",
        returning_all(schema),
        quote_ident(schema.name())
    ))
}

pub fn select(intent: &StatementIntent, schema: &TableSchema) -> Result<Statement, CompileError> {
    if intent.projection.is_empty() {
        return Err(CompileError::EmptyProjection);
    }
    let mut w = SqlWriter::new(schema);
    w.push("SELECT ");
    for (i, expr) in intent.projection.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.expr(expr)?;
    }
    w.push(" FROM ");
    w.table();
    w.filter(intent.filter.as_ref())?;
    if !intent.group_by.is_empty() {
        w.push(" GROUP BY ");
        w.column_list(&intent.group_by)?;
    }
    for (i, (column, ascending)) in intent.order_by.iter().enumerate() {
        w.push(if i == 0 { " ORDER BY " } else { ", " });
        w.column(column)?;
        w.push(if *ascending { " ASC" } else { " DESC" });
    }
    match (intent.limit, intent.offset) {
        (Some(limit), offset) => {
            w.push(" LIMIT ");
            w.bind(Value::Integer(limit));
            if let Some(offset) = offset {
                w.push(" OFFSET ");
                w.bind(Value::Integer(offset));
            }
        }
        (None, Some(offset)) => {
            w.push(" LIMIT -1 OFFSET ");
            w.bind(Value::Integer(offset));
        }
        (None, None) => {}
    }
    Ok(w.finish())
}

/// `DELETE FROM t` or `UPDATE t SET ...`, without any row restriction.
fn mutation_head(w: &mut SqlWriter<'_>, intent: &StatementIntent) -> Result<(), CompileError> {
    match &intent.kind {
        IntentKind::Delete { .. } => {
            w.push("DELETE FROM ");
            w.table();
        }
        IntentKind::Update { assignments } => {
            if assignments.is_empty() {
                return Err(CompileError::EmptyAssignments);
            }
            w.push("UPDATE ");
            w.table();
            w.push(" SET ");
            for (i, assignment) in assignments.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                let descriptor = resolve(w.schema, assignment.column())?;
                if assignment.value().is_null() && !descriptor.nullable {
                    return Err(CompileError::NullAssignment {
                        column: assignment.column().to_string(),
                    });
                }
                w.column(assignment.column())?;
                w.push(" = ");
                let operator = match assignment.op() {
                    AssignOp::Set => None,
                    AssignOp::Add => Some(" + "),
                    AssignOp::Sub => Some(" - "),
                    AssignOp::Mul => Some(" * "),
                    AssignOp::Div => Some(" / "),
                };
                if let Some(operator) = operator {
                    w.column(assignment.column())?;
                    w.push(operator);
                }
                w.bind(assignment.value().clone());
            }
        }
        IntentKind::Select => {
            return Err(CompileError::EmptyAssignments);
        }
    }
    Ok(())
}

/// A delete or update, with a native `RETURNING` clause when requested.
/// `first_only` limits the statement to the first matching row.
pub fn mutation(
    intent: &StatementIntent,
    schema: &TableSchema,
    first_only: bool,
) -> Result<Statement, CompileError> {
    let mut w = SqlWriter::new(schema);
    mutation_head(&mut w, intent)?;
    if first_only {
        w.first_row_only(intent.filter.as_ref())?;
    } else {
        w.filter(intent.filter.as_ref())?;
    }
    w.returning(&intent.returning)?;
    Ok(w.finish())
}

/// Selects `rowid` of the rows a mutation will touch, followed by the
/// returning columns when `with_returning` is set. First half of the
/// emulated `RETURNING` path.
pub fn capture(
    intent: &StatementIntent,
    schema: &TableSchema,
    first_only: bool,
    with_returning: bool,
) -> Result<Statement, CompileError> {
    let mut w = SqlWriter::new(schema);
    w.push("SELECT rowid");
    if with_returning {
        match &intent.returning {
            Returning::Nothing => {}
            Returning::AllColumns => {
                w.push(", ");
                w.all_columns();
            }
            Returning::Columns(columns) => {
                w.push(", ");
                w.column_list(columns)?;
            }
        }
    }
    w.push(" FROM ");
    w.table();
    w.filter(intent.filter.as_ref())?;
    w.push(" ORDER BY rowid");
    if first_only {
        w.push(" LIMIT 1");
    }
    Ok(w.finish())
}

/// The mutation restricted to captured rowids.
pub fn mutation_for_rowids(
    intent: &StatementIntent,
    schema: &TableSchema,
    rowids: &[i64],
) -> Result<Statement, CompileError> {
    let mut w = SqlWriter::new(schema);
    mutation_head(&mut w, intent)?;
    w.rowids(rowids);
    Ok(w.finish())
}

/// Re-reads the returning columns of captured rows after an update.
pub fn select_rowids(
    intent: &StatementIntent,
    schema: &TableSchema,
    rowids: &[i64],
) -> Result<Statement, CompileError> {
    let mut w = SqlWriter::new(schema);
    w.push("SELECT ");
    match &intent.returning {
        Returning::Columns(columns) => w.column_list(columns)?,
        Returning::AllColumns | Returning::Nothing => w.all_columns(),
    }
    w.push(" FROM ");
    w.table();
    w.rowids(rowids);
    w.push(" ORDER BY rowid");
    Ok(w.finish())
}

/// Number of `?` placeholders the mutation head binds before any filter.
pub(crate) fn head_params(intent: &StatementIntent) -> usize {
    match &intent.kind {
        IntentKind::Update { assignments } => assignments.len(),
        _ => 0,
    }
}
