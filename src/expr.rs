//! Column handles and the immutable expression tree built from them.
//!
//! Every combinator returns a new node; sub-expressions can be cloned into
//! as many statements as needed. Comparisons are type-checked when they are
//! built, so a mismatched literal never gets as far as the compiler.

use std::fmt;

use crate::error::TypeMismatch;
use crate::value::{ScalarType, Value};

/// Schema-bound handle to one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    table: String,
    column: String,
    scalar_type: ScalarType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl AggregateFn {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
            AggregateFn::Avg => "AVG",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateArg {
    Column(ColumnRef),
    /// The `*` argument, bound to the table it counts.
    AllRows { table: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Comparison {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Aggregate {
        func: AggregateFn,
        arg: AggregateArg,
    },
    In {
        column: ColumnRef,
        values: Vec<Value>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Column(ColumnRef),
}

impl From<ColumnRef> for Operand {
    fn from(column: ColumnRef) -> Self {
        Operand::Column(column)
    }
}

impl From<&ColumnRef> for Operand {
    fn from(column: &ColumnRef) -> Self {
        Operand::Column(column.clone())
    }
}

macro_rules! literal_operand {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Operand {
            fn from(v: $ty) -> Self {
                Operand::Literal(Value::from(v))
            }
        })*
    };
}

literal_operand!(i64, i32, u32, f64, bool, String, &str, Vec<u8>, &[u8]);

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Literal(v)
    }
}

/// Literal as compared against a `ty` operand. Ints widen to reals in
/// either direction, so an Int column compares against a Real literal.
/// Assignments stay strict and go through [`Value::conform`].
fn comparable_literal(ty: ScalarType, value: Value) -> Option<Value> {
    match (ty, value) {
        (ScalarType::Int, Value::Real(v)) => Some(Value::Real(v)),
        (ty, value) => value.conform(ty),
    }
}

impl ColumnRef {
    pub(crate) fn new(table: &str, column: &str, scalar_type: ScalarType) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            scalar_type,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.column
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar_type
    }

    pub fn expr(&self) -> Expr {
        Expr::Column(self.clone())
    }

    pub fn eq(&self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.expr().compare(CompareOp::Eq, rhs)
    }

    pub fn ne(&self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.expr().compare(CompareOp::Ne, rhs)
    }

    pub fn lt(&self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.expr().compare(CompareOp::Lt, rhs)
    }

    pub fn le(&self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.expr().compare(CompareOp::Le, rhs)
    }

    pub fn gt(&self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.expr().compare(CompareOp::Gt, rhs)
    }

    pub fn ge(&self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.expr().compare(CompareOp::Ge, rhs)
    }

    /// `column IN (v1, v2, ...)`. Every value must fit the column type.
    pub fn is_in<I, V>(&self, values: I) -> Result<Expr, TypeMismatch>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values = values
            .into_iter()
            .map(|v| {
                let value = v.into();
                let found = value.type_label();
                comparable_literal(self.scalar_type, value).ok_or_else(|| TypeMismatch {
                    target: self.to_string(),
                    expected: self.scalar_type,
                    found,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::In {
            column: self.clone(),
            values,
        })
    }

    pub fn count(&self) -> Expr {
        self.aggregate_unchecked(AggregateFn::Count)
    }

    pub fn sum(&self) -> Result<Expr, TypeMismatch> {
        self.numeric_aggregate(AggregateFn::Sum)
    }

    pub fn min(&self) -> Result<Expr, TypeMismatch> {
        self.numeric_aggregate(AggregateFn::Min)
    }

    pub fn max(&self) -> Result<Expr, TypeMismatch> {
        self.numeric_aggregate(AggregateFn::Max)
    }

    pub fn avg(&self) -> Result<Expr, TypeMismatch> {
        self.numeric_aggregate(AggregateFn::Avg)
    }

    /// `SET column = value`
    pub fn set(&self, value: impl Into<Value>) -> Result<Assignment, TypeMismatch> {
        Ok(Assignment {
            column: self.clone(),
            op: AssignOp::Set,
            value: self.check_literal(value.into())?,
        })
    }

    /// `SET column = column + value`
    pub fn add(&self, value: impl Into<Value>) -> Result<Assignment, TypeMismatch> {
        self.arithmetic(AssignOp::Add, value.into())
    }

    /// `SET column = column - value`
    pub fn sub(&self, value: impl Into<Value>) -> Result<Assignment, TypeMismatch> {
        self.arithmetic(AssignOp::Sub, value.into())
    }

    /// `SET column = column * value`
    pub fn mul(&self, value: impl Into<Value>) -> Result<Assignment, TypeMismatch> {
        self.arithmetic(AssignOp::Mul, value.into())
    }

    /// `SET column = column / value`
    pub fn div(&self, value: impl Into<Value>) -> Result<Assignment, TypeMismatch> {
        self.arithmetic(AssignOp::Div, value.into())
    }

    fn aggregate_unchecked(&self, func: AggregateFn) -> Expr {
        Expr::Aggregate {
            func,
            arg: AggregateArg::Column(self.clone()),
        }
    }

    fn numeric_aggregate(&self, func: AggregateFn) -> Result<Expr, TypeMismatch> {
        if !self.scalar_type.is_numeric() {
            return Err(TypeMismatch {
                target: format!("{}({})", func.name(), self),
                expected: ScalarType::Real,
                found: self.scalar_type.to_string(),
            });
        }
        Ok(self.aggregate_unchecked(func))
    }

    fn arithmetic(&self, op: AssignOp, value: Value) -> Result<Assignment, TypeMismatch> {
        if !self.scalar_type.is_numeric() || value.is_null() {
            return Err(TypeMismatch {
                target: self.to_string(),
                expected: ScalarType::Real,
                found: if self.scalar_type.is_numeric() {
                    value.type_label()
                } else {
                    self.scalar_type.to_string()
                },
            });
        }
        Ok(Assignment {
            column: self.clone(),
            op,
            value: self.check_literal(value)?,
        })
    }

    fn check_literal(&self, value: Value) -> Result<Value, TypeMismatch> {
        let found = value.type_label();
        value
            .conform(self.scalar_type)
            .ok_or_else(|| TypeMismatch {
                target: self.to_string(),
                expected: self.scalar_type,
                found,
            })
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

impl From<ColumnRef> for Expr {
    fn from(column: ColumnRef) -> Self {
        Expr::Column(column)
    }
}

impl From<&ColumnRef> for Expr {
    fn from(column: &ColumnRef) -> Self {
        Expr::Column(column.clone())
    }
}

impl Expr {
    /// Result type of the expression. `None` only for a NULL literal.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Expr::Column(c) => Some(c.scalar_type),
            Expr::Literal(v) => v.scalar_type(),
            Expr::Comparison { .. } | Expr::In { .. } | Expr::And(..) | Expr::Or(..) => {
                Some(ScalarType::Bool)
            }
            Expr::Aggregate { func, arg } => Some(match (func, arg) {
                (AggregateFn::Count, _) => ScalarType::Int,
                (AggregateFn::Avg, _) => ScalarType::Real,
                (_, AggregateArg::Column(c)) => c.scalar_type,
                (_, AggregateArg::AllRows { .. }) => ScalarType::Int,
            }),
        }
    }

    pub fn is_predicate(&self) -> bool {
        self.scalar_type() == Some(ScalarType::Bool)
    }

    pub fn compare(self, op: CompareOp, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        let left_type = self.scalar_type();
        let right = match rhs.into() {
            Operand::Literal(Value::Null) => {
                if !matches!(op, CompareOp::Eq | CompareOp::Ne) {
                    return Err(self.mismatch(left_type, "null".to_string()));
                }
                Expr::Literal(Value::Null)
            }
            Operand::Literal(value) => {
                let found = value.type_label();
                match left_type.and_then(|ty| comparable_literal(ty, value)) {
                    Some(value) => Expr::Literal(value),
                    None => return Err(self.mismatch(left_type, found)),
                }
            }
            Operand::Column(column) => {
                let compatible = left_type.map_or(false, |ty| {
                    ty.accepts(column.scalar_type) || column.scalar_type.accepts(ty)
                });
                if !compatible {
                    return Err(self.mismatch(left_type, column.scalar_type.to_string()));
                }
                Expr::Column(column)
            }
        };
        Ok(Expr::Comparison {
            op,
            left: Box::new(self),
            right: Box::new(right),
        })
    }

    pub fn eq(self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.compare(CompareOp::Eq, rhs)
    }

    pub fn ne(self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.compare(CompareOp::Ne, rhs)
    }

    pub fn lt(self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.compare(CompareOp::Lt, rhs)
    }

    pub fn le(self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.compare(CompareOp::Le, rhs)
    }

    pub fn gt(self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.compare(CompareOp::Gt, rhs)
    }

    pub fn ge(self, rhs: impl Into<Operand>) -> Result<Expr, TypeMismatch> {
        self.compare(CompareOp::Ge, rhs)
    }

    pub fn and(self, other: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(other))
    }

    /// Whether an aggregate appears anywhere in the tree. SQLite rejects
    /// aggregates in `WHERE`.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Column(_) | Expr::Literal(_) | Expr::In { .. } => false,
            Expr::Comparison { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.contains_aggregate() || right.contains_aggregate()
            }
        }
    }

    /// Tables referenced anywhere in the tree, in visitation order.
    pub fn tables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_tables(&mut out);
        out
    }

    fn collect_tables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(c) | Expr::In { column: c, .. } => out.push(&c.table),
            Expr::Literal(_) => {}
            Expr::Aggregate { arg, .. } => match arg {
                AggregateArg::Column(c) => out.push(&c.table),
                AggregateArg::AllRows { table } => out.push(table),
            },
            Expr::Comparison { left, right, .. } => {
                left.collect_tables(out);
                right.collect_tables(out);
            }
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.collect_tables(out);
                right.collect_tables(out);
            }
        }
    }

    fn mismatch(&self, expected: Option<ScalarType>, found: String) -> TypeMismatch {
        TypeMismatch {
            target: self.to_string(),
            expected: expected.unwrap_or(ScalarType::Bool),
            found,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Comparison { op, left, right } => write!(f, "{left} {} {right}", op.symbol()),
            Expr::Aggregate { func, arg } => match arg {
                AggregateArg::Column(c) => write!(f, "{}({c})", func.name()),
                AggregateArg::AllRows { table } => write!(f, "{}({table}.*)", func.name()),
            },
            Expr::In { column, values } => write!(f, "{column} IN ({} values)", values.len()),
            Expr::And(l, r) => write!(f, "({l} AND {r})"),
            Expr::Or(l, r) => write!(f, "({l} OR {r})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

/// One `SET` entry of an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    column: ColumnRef,
    op: AssignOp,
    value: Value,
}

impl Assignment {
    pub fn column(&self) -> &ColumnRef {
        &self.column
    }

    pub fn op(&self) -> AssignOp {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}
