//! Typed tree produced by name resolution
//!
//! Same shape as the parse tree, but every column is bound to a cursor and
//! ordinal, every call to a function handle, and every expression carries
//! its [`ColumnType`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::functions::{AccumulatorFactory, ScalarFunc};
use crate::parser::ast::{BinaryOp, SetOperator, UnaryOp};
use crate::schema::{Schema, SchemaColumn};
use crate::types::{ColumnType, QueryFlags, Value};

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone)]
pub enum TypedExpr {
    Literal(Value),
    /// Column `ordinal` of the row under `cursor`
    Column {
        cursor: usize,
        ordinal: usize,
        name: String,
        ty: ColumnType,
    },
    /// Scalar method or property (no arguments)
    Call {
        name: String,
        func: ScalarFunc,
        params: Vec<ColumnType>,
        args: Vec<TypedExpr>,
        ty: ColumnType,
    },
    /// Current result of the group's accumulator in `slot`
    AggregateRead { slot: usize, ty: ColumnType },
    Binary {
        op: BinaryOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
        ty: ColumnType,
    },
    Unary {
        op: UnaryOp,
        expr: Box<TypedExpr>,
        ty: ColumnType,
    },
}

impl TypedExpr {
    pub fn ty(&self) -> ColumnType {
        match self {
            TypedExpr::Literal(v) => v.column_type(),
            TypedExpr::Column { ty, .. }
            | TypedExpr::Call { ty, .. }
            | TypedExpr::AggregateRead { ty, .. }
            | TypedExpr::Binary { ty, .. }
            | TypedExpr::Unary { ty, .. } => *ty,
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            TypedExpr::AggregateRead { .. } => true,
            TypedExpr::Literal(_) | TypedExpr::Column { .. } => false,
            TypedExpr::Call { args, .. } => args.iter().any(TypedExpr::contains_aggregate),
            TypedExpr::Binary { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            TypedExpr::Unary { expr, .. } => expr.contains_aggregate(),
        }
    }
}

/// One aggregate used by a query: the per-row accumulate call and the
/// state it feeds
#[derive(Debug, Clone)]
pub struct AggregateSlot {
    pub slot: usize,
    /// Canonical text of the aggregate call, used to share slots
    pub text: String,
    pub accumulator: String,
    pub factory: AccumulatorFactory,
    /// Parameter types of the accumulate method
    pub params: Vec<ColumnType>,
    pub args: Vec<TypedExpr>,
}

// ============================================================================
// Sources
// ============================================================================

#[derive(Clone)]
pub enum SourceOrigin {
    /// `#schema.method(params)`
    Schema {
        schema: Arc<dyn Schema>,
        schema_name: String,
        method: String,
        params: Vec<Value>,
    },
    /// CTE table defined earlier in the statement
    Table { name: String },
}

impl fmt::Debug for SourceOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOrigin::Schema {
                schema_name,
                method,
                params,
                ..
            } => f
                .debug_struct("Schema")
                .field("schema_name", schema_name)
                .field("method", method)
                .field("params", params)
                .finish(),
            SourceOrigin::Table { name } => f.debug_struct("Table").field("name", name).finish(),
        }
    }
}

/// One FROM source with its loop cursor
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub cursor: usize,
    pub alias: String,
    pub origin: SourceOrigin,
    pub columns: Vec<SchemaColumn>,
    /// Join condition tested at this source's loop level
    pub on: Option<TypedExpr>,
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub name: String,
    pub expr: TypedExpr,
}

impl ResolvedField {
    pub fn ty(&self) -> ColumnType {
        self.expr.ty()
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedGroupBy {
    pub keys: Vec<TypedExpr>,
    pub having: Option<TypedExpr>,
}

#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    /// Procedure and output table name, `Query1`, `Query2`, ...
    pub name: String,
    pub sources: Vec<ResolvedSource>,
    pub filter: Option<TypedExpr>,
    pub group_by: Option<ResolvedGroupBy>,
    pub fields: Vec<ResolvedField>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
    pub refresh: Vec<AggregateSlot>,
    pub flags: QueryFlags,
}

#[derive(Debug, Clone)]
pub enum ResolvedSet {
    Query(Box<ResolvedQuery>),
    Operation {
        op: SetOperator,
        /// `<left>_<Op>_<right>`
        name: String,
        key_id: usize,
        /// Key ordinals in the output of the leftmost query
        key_columns: Vec<usize>,
        left: Box<ResolvedSet>,
        right: Box<ResolvedSet>,
    },
}

impl ResolvedSet {
    pub fn name(&self) -> &str {
        match self {
            ResolvedSet::Query(q) => &q.name,
            ResolvedSet::Operation { name, .. } => name,
        }
    }

    /// Query whose projection names the output columns
    pub fn leftmost(&self) -> &ResolvedQuery {
        match self {
            ResolvedSet::Query(q) => q,
            ResolvedSet::Operation { left, .. } => left.leftmost(),
        }
    }

    pub fn fields(&self) -> &[ResolvedField] {
        &self.leftmost().fields
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCte {
    pub name: String,
    pub body: ResolvedSet,
}

#[derive(Debug, Clone)]
pub struct ResolvedQueryStatement {
    pub ctes: Vec<ResolvedCte>,
    pub body: ResolvedSet,
}

/// Column list of a source, known at resolution time
#[derive(Debug, Clone)]
pub struct ResolvedDesc {
    /// Procedure and output table name, `Desc1`, ...
    pub name: String,
    /// `#schema.method(params)` as written
    pub source: String,
    pub columns: Vec<SchemaColumn>,
}

#[derive(Debug, Clone)]
pub enum ResolvedStatement {
    Query(ResolvedQueryStatement),
    Desc(ResolvedDesc),
}

impl ResolvedStatement {
    pub fn as_query(&self) -> Option<&ResolvedQueryStatement> {
        match self {
            ResolvedStatement::Query(query) => Some(query),
            ResolvedStatement::Desc(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedRoot {
    pub statements: Vec<ResolvedStatement>,
    /// Schemas whose tables or methods the program uses
    pub libraries: BTreeSet<String>,
    pub cursor_count: usize,
}
