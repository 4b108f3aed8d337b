//! Name and type resolution
//!
//! One depth-first walk over the parse tree. Each FROM source gets an alias
//! and a cursor, every column and method reference is bound, aggregates are
//! split into a per-row accumulate call (kept in the query's refresh list)
//! and a per-group read, and the typed tree is built bottom-up.

use std::collections::{BTreeSet, HashSet};

use crate::error::{Error, ErrorCode, Result};
use crate::functions::{AccumulatorSignature, MethodCatalog, MethodKind, MethodSignature, STANDARD_LIBRARY};
use crate::parser::ast::*;
use crate::parser::scope::{CteTable, ScopeKind, ScopeStack, Symbol, TableEntry, TableSymbol};
use crate::parser::typed::*;
use crate::schema::{SchemaColumn, SchemaProvider};
use crate::types::{ColumnType, QueryFlags, Value};

// ============================================================================
// Pass Context
// ============================================================================

/// Counters owned by one resolution pass.
///
/// Query names and cursors are unique over the whole root; set-operator
/// keys and generated aliases restart with every statement.
#[derive(Debug, Default)]
struct PassContext {
    queries: usize,
    cursors: usize,
    set_keys: usize,
    aliases: usize,
}

impl PassContext {
    fn begin_statement(&mut self) {
        self.set_keys = 0;
        self.aliases = 0;
    }

    fn next_query_name(&mut self) -> String {
        self.queries += 1;
        format!("Query{}", self.queries)
    }

    fn next_desc_name(&mut self) -> String {
        self.queries += 1;
        format!("Desc{}", self.queries)
    }

    fn next_cursor(&mut self) -> usize {
        let cursor = self.cursors;
        self.cursors += 1;
        cursor
    }

    fn next_alias(&mut self) -> String {
        let alias = format!("t{}", self.aliases);
        self.aliases += 1;
        alias
    }

    fn next_set_key(&mut self) -> usize {
        let key = self.set_keys;
        self.set_keys += 1;
        key
    }
}

/// Clause an expression appears in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Where,
    On,
    GroupKey,
    Having,
    Field,
}

impl Clause {
    fn allows_aggregates(self) -> bool {
        matches!(self, Clause::Having | Clause::Field)
    }

    fn name(self) -> &'static str {
        match self {
            Clause::Where => "WHERE",
            Clause::On => "JOIN ON",
            Clause::GroupKey => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::Field => "SELECT",
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

pub struct Resolver<'a> {
    provider: &'a dyn SchemaProvider,
    scopes: ScopeStack,
    pass: PassContext,
    libraries: BTreeSet<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(provider: &'a dyn SchemaProvider) -> Self {
        Resolver {
            provider,
            scopes: ScopeStack::new(),
            pass: PassContext::default(),
            libraries: BTreeSet::new(),
        }
    }

    pub fn resolve_root(mut self, root: &Root) -> Result<ResolvedRoot> {
        let statements = root
            .statements
            .iter()
            .map(|stmt| self.resolve_statement(stmt))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            target: "tabql::resolve",
            statements = statements.len(),
            cursors = self.pass.cursors,
            libraries = ?self.libraries,
            "resolved root"
        );

        Ok(ResolvedRoot {
            statements,
            libraries: self.libraries,
            cursor_count: self.pass.cursors,
        })
    }

    fn resolve_statement(&mut self, stmt: &Statement) -> Result<ResolvedStatement> {
        self.pass.begin_statement();
        match stmt {
            Statement::Query(query) => Ok(ResolvedStatement::Query(self.resolve_query_statement(query)?)),
            Statement::Desc(desc) => Ok(ResolvedStatement::Desc(self.resolve_desc(desc)?)),
        }
    }

    /// `DESC #schema.method(args)` lists the source's columns without reading it
    fn resolve_desc(&mut self, desc: &Describe) -> Result<ResolvedDesc> {
        let plugin = self.provider.schema(&desc.schema)?;
        let params: Vec<Value> = desc.args.iter().map(literal_value).collect();
        let table = plugin.table(&desc.method, &params)?;
        self.libraries.insert(desc.schema.to_lowercase());

        let args: Vec<String> = desc.args.iter().map(Literal::to_string).collect();
        let source = format!("#{}.{}({})", desc.schema, desc.method, args.join(", "));
        tracing::debug!(
            target: "tabql::resolve",
            columns = table.columns.len(),
            "described {}",
            source
        );

        Ok(ResolvedDesc {
            name: self.pass.next_desc_name(),
            source,
            columns: table.columns,
        })
    }

    fn resolve_query_statement(&mut self, stmt: &QueryStatement) -> Result<ResolvedQueryStatement> {
        self.scopes.push(ScopeKind::Cte);

        let mut ctes = Vec::with_capacity(stmt.ctes.len());
        for cte in &stmt.ctes {
            let body = self.resolve_set(&cte.body)?;
            let columns = body
                .fields()
                .iter()
                .map(|f| SchemaColumn {
                    name: f.name.clone(),
                    ty: f.ty(),
                })
                .collect();
            self.scopes.insert(
                cte.name.to_lowercase(),
                Symbol::Cte(CteTable {
                    name: cte.name.clone(),
                    columns,
                }),
            )?;
            ctes.push(ResolvedCte {
                name: cte.name.clone(),
                body,
            });
        }

        let body = self.resolve_set(&stmt.body)?;
        self.scopes.pop();
        Ok(ResolvedQueryStatement { ctes, body })
    }

    // ========================================================================
    // Set Operators
    // ========================================================================

    fn resolve_set(&mut self, set: &SetExpr) -> Result<ResolvedSet> {
        match set {
            SetExpr::Query(query) => Ok(ResolvedSet::Query(Box::new(self.resolve_query(query)?))),
            SetExpr::Operation {
                op,
                keys,
                left,
                right,
            } => {
                let left = self.resolve_set(left)?;
                let right = self.resolve_set(right)?;
                check_shapes(*op, &left, &right)?;

                let fields = left.fields();
                let key_columns = keys
                    .iter()
                    .map(|key| {
                        fields.iter().position(|f| f.name == *key).ok_or_else(|| {
                            Error::with_message(
                                ErrorCode::NotFound,
                                format!(
                                    "key column '{}' is not a field of {}",
                                    key,
                                    left.leftmost().name
                                ),
                            )
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let name = format!("{}_{}_{}", left.name(), op.name(), right.name());
                Ok(ResolvedSet::Operation {
                    op: *op,
                    name,
                    key_id: self.pass.next_set_key(),
                    key_columns,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    fn resolve_query(&mut self, query: &Query) -> Result<ResolvedQuery> {
        let name = self.pass.next_query_name();
        self.scopes.push(ScopeKind::Query);

        let mut sources = Vec::new();
        let tables = self.resolve_from(&query.from, &mut sources)?;
        self.scopes.insert(name.clone(), Symbol::Table(tables.clone()))?;

        let filter = match &query.where_clause {
            Some(expr) => Some(self.resolve_condition(expr, Clause::Where)?),
            None => None,
        };

        let mut group_by = match &query.group_by {
            Some(group) => {
                let keys = group
                    .keys
                    .iter()
                    .map(|key| self.resolve_expr(key, Clause::GroupKey))
                    .collect::<Result<Vec<_>>>()?;
                let having = match &group.having {
                    Some(expr) => Some(self.resolve_condition(expr, Clause::Having)?),
                    None => None,
                };
                Some(ResolvedGroupBy { keys, having })
            }
            None => None,
        };

        let fields = self.resolve_fields(&name, &query.fields, &tables)?;
        let refresh = self.scopes.pop_query()?;

        let mut flags = QueryFlags::empty();
        if sources.len() > 1 {
            flags |= QueryFlags::JOIN;
        }
        if group_by.is_some() {
            flags |= QueryFlags::GROUPING;
        } else if !refresh.is_empty() {
            flags |= QueryFlags::GROUPING | QueryFlags::IMPLICIT_GROUP;
            group_by = Some(ResolvedGroupBy {
                keys: vec![TypedExpr::Literal(Value::Integer(1))],
                having: None,
            });
        }

        tracing::debug!(
            target: "tabql::resolve",
            query = %name,
            aliases = ?tables.aliases(),
            aggregates = refresh.len(),
            flags = ?flags,
            "resolved query"
        );

        Ok(ResolvedQuery {
            name,
            sources,
            filter,
            group_by,
            fields,
            skip: query.skip,
            take: query.take,
            refresh,
            flags,
        })
    }

    fn resolve_fields(
        &mut self,
        query_name: &str,
        items: &[SelectItem],
        tables: &TableSymbol,
    ) -> Result<Vec<ResolvedField>> {
        let qualify = tables.entries().len() > 1;
        let mut fields = Vec::new();

        for item in items {
            match item {
                SelectItem::Star => {
                    for entry in tables.entries() {
                        for (ordinal, column) in entry.columns.iter().enumerate() {
                            let name = if qualify {
                                format!("{}.{}", entry.alias, column.name)
                            } else {
                                column.name.clone()
                            };
                            fields.push(ResolvedField {
                                name,
                                expr: column_expr(entry, ordinal, column),
                            });
                        }
                    }
                }
                SelectItem::Expr { expr, alias } => {
                    let typed = self.resolve_expr(expr, Clause::Field)?;
                    let name = alias.clone().unwrap_or_else(|| expr.to_string());
                    fields.push(ResolvedField { name, expr: typed });
                }
            }
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::with_message(
                    ErrorCode::Duplicate,
                    format!("field '{}' appears more than once in {}", field.name, query_name),
                ));
            }
        }
        Ok(fields)
    }

    // ========================================================================
    // FROM
    // ========================================================================

    fn resolve_from(
        &mut self,
        from: &FromSource,
        sources: &mut Vec<ResolvedSource>,
    ) -> Result<TableSymbol> {
        match from {
            FromSource::Schema {
                schema,
                method,
                args,
                alias,
            } => {
                let plugin = self.provider.schema(schema)?;
                let params: Vec<Value> = args.iter().map(literal_value).collect();
                let table = plugin.table(method, &params)?;
                let alias = alias.clone().unwrap_or_else(|| self.pass.next_alias());
                let cursor = self.pass.next_cursor();
                let schema_name = schema.to_lowercase();
                self.libraries.insert(schema_name.clone());

                tracing::debug!(
                    target: "tabql::resolve",
                    alias = %alias,
                    cursor,
                    "bound #{}.{}",
                    schema,
                    method
                );

                sources.push(ResolvedSource {
                    cursor,
                    alias: alias.clone(),
                    origin: SourceOrigin::Schema {
                        schema: plugin.clone(),
                        schema_name: schema_name.clone(),
                        method: method.clone(),
                        params,
                    },
                    columns: table.columns.clone(),
                    on: None,
                });
                Ok(TableSymbol::single(TableEntry {
                    alias,
                    cursor,
                    columns: table.columns,
                    schema: Some((schema_name, plugin)),
                }))
            }
            FromSource::Named { name, alias } => {
                let cte = self.scopes.find_cte(name).cloned().ok_or_else(|| {
                    Error::with_message(ErrorCode::NotFound, format!("table '{}' was not found", name))
                })?;
                let alias = alias.clone().unwrap_or_else(|| cte.name.clone());
                let cursor = self.pass.next_cursor();

                sources.push(ResolvedSource {
                    cursor,
                    alias: alias.clone(),
                    origin: SourceOrigin::Table {
                        name: cte.name.clone(),
                    },
                    columns: cte.columns.clone(),
                    on: None,
                });
                Ok(TableSymbol::single(TableEntry {
                    alias,
                    cursor,
                    columns: cte.columns,
                    schema: None,
                }))
            }
            FromSource::Join { left, right, on } => {
                self.scopes.push(ScopeKind::Join);
                let left = self.resolve_from(left, sources)?;
                self.scopes.insert("left", Symbol::Table(left.clone()))?;
                let right = self.resolve_from(right, sources)?;
                let merged = left.merge(right.clone())?;
                self.scopes.insert("right", Symbol::Table(right))?;

                let on = self.resolve_condition(on, Clause::On)?;
                self.scopes.pop();

                let joined = sources.last_mut().ok_or_else(|| {
                    Error::with_message(ErrorCode::Internal, "join without a right-hand source")
                })?;
                joined.on = Some(on);
                Ok(merged)
            }
        }
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn resolve_condition(&mut self, expr: &Expr, clause: Clause) -> Result<TypedExpr> {
        let typed = self.resolve_expr(expr, clause)?;
        if typed.ty() != ColumnType::Boolean {
            return Err(Error::with_message(
                ErrorCode::TypeMismatch,
                format!(
                    "{} condition '{}' must be Boolean, got {}",
                    clause.name(),
                    expr,
                    typed.ty()
                ),
            ));
        }
        Ok(typed)
    }

    fn resolve_expr(&mut self, expr: &Expr, clause: Clause) -> Result<TypedExpr> {
        match expr {
            Expr::Literal(lit) => Ok(TypedExpr::Literal(literal_value(lit))),
            Expr::Parens(inner) => self.resolve_expr(inner, clause),
            Expr::Column { alias, name } => self.resolve_column(alias.as_deref(), name),
            Expr::Call { alias, name, args } => {
                self.resolve_call(expr, alias.as_deref(), name, args, clause)
            }
            Expr::Binary { op, left, right } => {
                let left = self.resolve_expr(left, clause)?;
                let right = self.resolve_expr(right, clause)?;
                let ty = binary_type(*op, &left, &right)?;
                Ok(TypedExpr::Binary {
                    op: *op,
                    left: Box::new(left),
                    right: Box::new(right),
                    ty,
                })
            }
            Expr::In { expr: left, list } => self.resolve_in(left, list, clause),
            Expr::Unary { op, expr: inner } => {
                let inner = self.resolve_expr(inner, clause)?;
                let ty = unary_type(*op, &inner)?;
                Ok(TypedExpr::Unary {
                    op: *op,
                    expr: Box::new(inner),
                    ty,
                })
            }
        }
    }

    /// `x IN (a, b)` becomes `x = a OR x = b`; every item must share the
    /// operand's kind
    fn resolve_in(&mut self, left: &Expr, list: &[Expr], clause: Clause) -> Result<TypedExpr> {
        let operand = self.resolve_expr(left, clause)?;
        let mut contains: Option<TypedExpr> = None;

        for item in list {
            let typed = self.resolve_expr(item, clause)?;
            if typed.ty().kind() != operand.ty().kind() {
                return Err(Error::with_message(
                    ErrorCode::TypeMismatch,
                    format!(
                        "'{}' in the IN list of '{}' is {}, expected {}",
                        item,
                        left,
                        typed.ty(),
                        operand.ty()
                    ),
                ));
            }
            let test = TypedExpr::Binary {
                op: BinaryOp::Eq,
                left: Box::new(operand.clone()),
                right: Box::new(typed),
                ty: ColumnType::Boolean,
            };
            contains = Some(match contains {
                Some(previous) => TypedExpr::Binary {
                    op: BinaryOp::Or,
                    left: Box::new(previous),
                    right: Box::new(test),
                    ty: ColumnType::Boolean,
                },
                None => test,
            });
        }

        contains.ok_or_else(|| {
            Error::with_message(ErrorCode::Syntax, format!("empty IN list for '{}'", left))
        })
    }

    fn visible_entries(&self) -> Vec<TableEntry> {
        self.scopes.visible_entries().into_iter().cloned().collect()
    }

    fn resolve_column(&mut self, alias: Option<&str>, name: &str) -> Result<TypedExpr> {
        let entries = self.visible_entries();

        if let Some(alias) = alias {
            let entry = find_alias(&entries, alias)?;
            let (ordinal, column) = entry.column(name).ok_or_else(|| {
                Error::with_message(
                    ErrorCode::NotFound,
                    format!("column '{}' was not found in '{}'", name, alias),
                )
            })?;
            return Ok(column_expr(entry, ordinal, column));
        }

        let matches: Vec<_> = entries
            .iter()
            .filter_map(|e| e.column(name).map(|(ordinal, column)| (e, ordinal, column)))
            .collect();

        match matches.as_slice() {
            [(entry, ordinal, column)] => Ok(column_expr(entry, *ordinal, column)),
            [] => {
                let candidates: Vec<&TableEntry> = entries.iter().collect();
                self.resolve_property(&candidates, name)?.ok_or_else(|| {
                    Error::with_message(ErrorCode::NotFound, format!("column '{}' was not found", name))
                })
            }
            _ => {
                let aliases: Vec<_> = matches.iter().map(|(e, _, _)| e.alias.as_str()).collect();
                Err(Error::with_message(
                    ErrorCode::Ambiguous,
                    format!("column '{}' is ambiguous between {}", name, aliases.join(", ")),
                ))
            }
        }
    }

    fn resolve_property(
        &mut self,
        entries: &[&TableEntry],
        name: &str,
    ) -> Result<Option<TypedExpr>> {
        for (library, catalog) in catalogs(entries) {
            if let Some(sig) = catalog.resolve_property(name) {
                if let MethodKind::Property(func) = sig.kind {
                    self.note_library(library);
                    return Ok(Some(TypedExpr::Call {
                        name: sig.name.clone(),
                        func,
                        params: Vec::new(),
                        args: Vec::new(),
                        ty: sig.ret,
                    }));
                }
            }
        }
        Ok(None)
    }

    fn resolve_call(
        &mut self,
        expr: &Expr,
        alias: Option<&str>,
        name: &str,
        args: &[Expr],
        clause: Clause,
    ) -> Result<TypedExpr> {
        let args = args
            .iter()
            .map(|arg| self.resolve_expr(arg, clause))
            .collect::<Result<Vec<_>>>()?;
        let types: Vec<ColumnType> = args.iter().map(TypedExpr::ty).collect();

        let entries = self.visible_entries();
        let candidates: Vec<&TableEntry> = match alias {
            Some(alias) => vec![find_alias(&entries, alias)?],
            None => entries.iter().collect(),
        };

        if let Some((library, read, accumulator)) = find_aggregate(&candidates, name, &types)? {
            if !clause.allows_aggregates() {
                return Err(Error::with_message(
                    ErrorCode::TypeMismatch,
                    format!("aggregate '{}' is not allowed in {}", expr, clause.name()),
                ));
            }
            if args.iter().any(TypedExpr::contains_aggregate) {
                return Err(Error::with_message(
                    ErrorCode::TypeMismatch,
                    format!("aggregate '{}' cannot aggregate another aggregate", expr),
                ));
            }
            self.note_library(library);
            let slot = self.add_slot(expr.to_string(), accumulator, args)?;
            return Ok(TypedExpr::AggregateRead { slot, ty: read.ret });
        }

        for (library, catalog) in catalogs(&candidates) {
            let sig = match catalog.resolve_method(name, &types) {
                Ok(sig) => sig.clone(),
                Err(e) if e.code == ErrorCode::NotFound => continue,
                Err(e) => return Err(e),
            };
            if let MethodKind::Scalar(func) = sig.kind {
                self.note_library(library);
                return Ok(TypedExpr::Call {
                    name: sig.name,
                    func,
                    params: sig.params,
                    args,
                    ty: sig.ret,
                });
            }
        }

        if args.is_empty() {
            if let Some(property) = self.resolve_property(&candidates, name)? {
                return Ok(property);
            }
        }

        let names: Vec<_> = types.iter().map(|t| t.name()).collect();
        Err(Error::with_message(
            ErrorCode::NotFound,
            format!("method {}({}) was not found", name, names.join(", ")),
        ))
    }

    /// Slot for an aggregate call; identical calls share one slot
    fn add_slot(
        &mut self,
        text: String,
        accumulator: AccumulatorSignature,
        args: Vec<TypedExpr>,
    ) -> Result<usize> {
        let slots = self.scopes.refresh_methods_mut()?;
        if let Some(existing) = slots.iter().find(|s| s.text == text) {
            return Ok(existing.slot);
        }
        let slot = slots.len();
        slots.push(AggregateSlot {
            slot,
            text,
            accumulator: accumulator.name,
            factory: accumulator.factory,
            params: accumulator.params,
            args,
        });
        Ok(slot)
    }

    fn note_library(&mut self, library: Option<String>) {
        if let Some(name) = library {
            self.libraries.insert(name);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Real(r) => Value::Real(*r),
        Literal::Text(s) => Value::Text(s.clone()),
        Literal::Boolean(b) => Value::Boolean(*b),
    }
}

fn column_expr(entry: &TableEntry, ordinal: usize, column: &SchemaColumn) -> TypedExpr {
    TypedExpr::Column {
        cursor: entry.cursor,
        ordinal,
        name: column.name.clone(),
        ty: column.ty,
    }
}

fn find_alias<'e>(entries: &'e [TableEntry], alias: &str) -> Result<&'e TableEntry> {
    entries.iter().find(|e| e.alias == alias).ok_or_else(|| {
        Error::with_message(ErrorCode::NotFound, format!("alias '{}' was not found", alias))
    })
}

/// Catalogs to search, in FROM order, each with the schema it belongs to
fn catalogs<'e>(entries: &[&'e TableEntry]) -> Vec<(Option<String>, &'e MethodCatalog)> {
    if entries.is_empty() {
        return vec![(None, &*STANDARD_LIBRARY)];
    }
    entries
        .iter()
        .map(|&e| (e.schema_name().map(str::to_string), e.catalog()))
        .collect()
}

/// Read and accumulate signatures of an aggregate call.
///
/// The read half is matched without the aggregated (last) argument; the
/// accumulate half must then accept every argument.
fn find_aggregate(
    entries: &[&TableEntry],
    name: &str,
    types: &[ColumnType],
) -> Result<Option<(Option<String>, MethodSignature, AccumulatorSignature)>> {
    let Some((_, leading)) = types.split_last() else {
        return Ok(None);
    };
    for (library, catalog) in catalogs(entries) {
        if let Some(read) = catalog.try_resolve_aggregate(name, leading)? {
            let companion = read.accumulator().unwrap_or_default();
            let accumulator = catalog.resolve_accumulator(companion, types)?;
            return Ok(Some((library, read.clone(), accumulator.clone())));
        }
    }
    Ok(None)
}

fn binary_type(op: BinaryOp, left: &TypedExpr, right: &TypedExpr) -> Result<ColumnType> {
    use ColumnType::{Boolean, Integer, Real, Text};

    let (lt, rt) = (left.ty(), right.ty());
    let ty = match op {
        _ if op.is_arithmetic() && lt.is_numeric() && rt.is_numeric() => {
            Some(if lt == Integer && rt == Integer { Integer } else { Real })
        }
        BinaryOp::Add if lt == Text && rt == Text => Some(Text),
        _ if op.is_comparison() && lt.kind() == rt.kind() => Some(Boolean),
        BinaryOp::Like if lt == Text && rt == Text => Some(Boolean),
        BinaryOp::And | BinaryOp::Or if lt == Boolean && rt == Boolean => Some(Boolean),
        _ => None,
    };
    ty.ok_or_else(|| {
        Error::with_message(
            ErrorCode::TypeMismatch,
            format!("operator '{}' cannot be applied to {} and {}", op.symbol(), lt, rt),
        )
    })
}

fn unary_type(op: UnaryOp, operand: &TypedExpr) -> Result<ColumnType> {
    let ty = operand.ty();
    match op {
        UnaryOp::Neg if ty.is_numeric() => Ok(ty),
        UnaryOp::Not if ty == ColumnType::Boolean => Ok(ty),
        _ => Err(Error::with_message(
            ErrorCode::TypeMismatch,
            format!("operator '{}' cannot be applied to {}", unary_symbol(op), ty),
        )),
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Neg => "-",
        UnaryOp::Not => "not",
    }
}

fn check_shapes(op: SetOperator, left: &ResolvedSet, right: &ResolvedSet) -> Result<()> {
    let (l, r) = (left.fields(), right.fields());
    if l.len() != r.len() {
        return Err(Error::with_message(
            ErrorCode::TypeMismatch,
            format!(
                "{} operands have {} and {} columns",
                op.name(),
                l.len(),
                r.len()
            ),
        ));
    }
    for (i, (a, b)) in l.iter().zip(r).enumerate() {
        if a.ty() != b.ty() {
            return Err(Error::with_message(
                ErrorCode::TypeMismatch,
                format!(
                    "{} column {} is {} on the left and {} on the right",
                    op.name(),
                    i + 1,
                    a.ty(),
                    b.ty()
                ),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// Public API
// ============================================================================

/// Resolve every statement of `root` against `provider`
pub fn resolve(root: &Root, provider: &dyn SchemaProvider) -> Result<ResolvedRoot> {
    Resolver::new(provider).resolve_root(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::grammar::parse;
    use crate::schema::{MemorySchema, SchemaRegistry};

    fn registry() -> SchemaRegistry {
        let schema = MemorySchema::new("test")
            .with_table(
                "entities",
                vec![
                    ("Name", ColumnType::Text),
                    ("City", ColumnType::Text),
                    ("Population", ColumnType::Integer),
                    ("Money", ColumnType::Real),
                ],
                vec![],
            )
            .unwrap()
            .with_table(
                "cities",
                vec![("City", ColumnType::Text), ("Country", ColumnType::Text)],
                vec![],
            )
            .unwrap();
        SchemaRegistry::new().with("test", schema)
    }

    fn resolve_text(query: &str) -> Result<ResolvedRoot> {
        resolve(&parse(query).unwrap(), &registry())
    }

    fn first_query(root: &ResolvedRoot) -> &ResolvedQuery {
        root.statements[0].as_query().unwrap().body.leftmost()
    }

    #[test]
    fn test_resolve_simple_column() {
        let root = resolve_text("select City from #test.entities() where Population > 1000").unwrap();
        let query = first_query(&root);
        assert_eq!(query.name, "Query1");
        assert_eq!(query.sources[0].alias, "t0");
        assert!(matches!(
            query.fields[0].expr,
            TypedExpr::Column { cursor: 0, ordinal: 1, ty: ColumnType::Text, .. }
        ));
        assert_eq!(query.fields[0].name, "City");
        assert!(query.flags.is_empty());
        assert!(root.libraries.contains("test"));
    }

    #[test]
    fn test_resolve_ambiguous_column() {
        let err = resolve_text(
            "select City from #test.entities() a join #test.cities() b on a.City = b.City",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Ambiguous);
    }

    #[test]
    fn test_resolve_join_names_and_on() {
        let root = resolve_text(
            "select * from #test.entities() a inner join #test.cities() b on a.City = b.City",
        )
        .unwrap();
        let query = first_query(&root);
        assert!(query.flags.contains(QueryFlags::JOIN));
        assert!(query.sources[0].on.is_none());
        assert!(query.sources[1].on.is_some());
        let names: Vec<_> = query.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["a.Name", "a.City", "a.Population", "a.Money", "b.City", "b.Country"]
        );
    }

    #[test]
    fn test_resolve_unknown_names() {
        for query in [
            "select Missing from #test.entities()",
            "select x.Name from #test.entities() a",
            "select Name from #nope.entities()",
            "select Name from #test.nope()",
            "select Name from people",
            "select Frobnicate(Name) from #test.entities()",
        ] {
            assert_eq!(resolve_text(query).unwrap_err().code, ErrorCode::NotFound, "{}", query);
        }
    }

    #[test]
    fn test_resolve_type_rules() {
        let root = resolve_text(
            "select Name + City, Population + 1, Population * Money, Pi from #test.entities()",
        )
        .unwrap();
        let types: Vec<_> = first_query(&root).fields.iter().map(|f| f.ty()).collect();
        assert_eq!(
            types,
            vec![ColumnType::Text, ColumnType::Integer, ColumnType::Real, ColumnType::Real]
        );

        for query in [
            "select Name + 1 from #test.entities()",
            "select Name from #test.entities() where Population",
            "select Name from #test.entities() where Name = 1",
            "select Name from #test.entities() where Population like 'a%'",
            "select not Name from #test.entities()",
        ] {
            assert_eq!(resolve_text(query).unwrap_err().code, ErrorCode::TypeMismatch, "{}", query);
        }
    }

    #[test]
    fn test_resolve_implicit_group_and_shared_slots() {
        let root = resolve_text(
            "select Sum(Population), Sum(Population) + 1 as Next, Count(Name) from #test.entities()",
        )
        .unwrap();
        let query = first_query(&root);
        assert!(query.flags.contains(QueryFlags::GROUPING | QueryFlags::IMPLICIT_GROUP));
        assert_eq!(query.refresh.len(), 2);
        assert_eq!(query.refresh[0].accumulator, "SetSum");
        assert_eq!(query.refresh[1].accumulator, "SetCount");
        assert_eq!(query.group_by.as_ref().unwrap().keys.len(), 1);
        assert_eq!(query.fields[0].ty(), ColumnType::Real);
        assert_eq!(query.fields[2].ty(), ColumnType::Integer);
    }

    #[test]
    fn test_resolve_aggregate_misuse() {
        assert_eq!(
            resolve_text("select Name from #test.entities() where Count(Name) > 1")
                .unwrap_err()
                .code,
            ErrorCode::TypeMismatch
        );
        assert_eq!(
            resolve_text("select Sum(Count(Name)) from #test.entities()")
                .unwrap_err()
                .code,
            ErrorCode::TypeMismatch
        );
        assert_eq!(
            resolve_text("select Sum(Name) from #test.entities()")
                .unwrap_err()
                .code,
            ErrorCode::NotFound
        );
    }

    #[test]
    fn test_resolve_duplicate_field() {
        let err = resolve_text("select Name, City as Name from #test.entities()").unwrap_err();
        assert_eq!(err.code, ErrorCode::Duplicate);
    }

    #[test]
    fn test_resolve_set_operation() {
        let root = resolve_text(
            "select Name, City from #test.entities() union (City) \
             select City, Country from #test.cities()",
        )
        .unwrap();
        match &root.statements[0].as_query().unwrap().body {
            ResolvedSet::Operation {
                name,
                key_id,
                key_columns,
                ..
            } => {
                assert_eq!(name, "Query1_Union_Query2");
                assert_eq!(*key_id, 0);
                assert_eq!(key_columns, &vec![1]);
            }
            other => panic!("expected operation, got {:?}", other),
        }

        let err = resolve_text(
            "select Name from #test.entities() except (Name) select Population from #test.entities()",
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_resolve_cte() {
        let root = resolve_text(
            "with p as (select Name, Population from #test.entities()) \
             select p.Name from p where Population > 1",
        )
        .unwrap();
        let stmt = root.statements[0].as_query().unwrap();
        assert_eq!(stmt.ctes[0].name, "p");
        let query = stmt.body.leftmost();
        assert!(matches!(query.sources[0].origin, SourceOrigin::Table { ref name } if name == "p"));
        assert_eq!(query.sources[0].cursor, 1);
        assert_eq!(root.cursor_count, 2);
    }

    #[test]
    fn test_counters_restart_per_statement() {
        let root = resolve_text(
            "select Name from #test.entities(); select Name from #test.entities()",
        )
        .unwrap();
        let second = root.statements[1].as_query().unwrap().body.leftmost();
        assert_eq!(second.name, "Query2");
        assert_eq!(second.sources[0].alias, "t0");
        assert_eq!(second.sources[0].cursor, 1);
    }

    #[test]
    fn test_resolve_in_list() {
        let root = resolve_text(
            "select Name from #test.entities() where Population in (1, 2, 3)",
        )
        .unwrap();
        match first_query(&root).filter.as_ref().unwrap() {
            TypedExpr::Binary { op: BinaryOp::Or, left, right, .. } => {
                assert!(matches!(**left, TypedExpr::Binary { op: BinaryOp::Or, .. }));
                assert!(matches!(**right, TypedExpr::Binary { op: BinaryOp::Eq, .. }));
            }
            other => panic!("expected or-chain, got {:?}", other),
        }

        // Integer and Real share the numeric kind
        assert!(resolve_text("select Name from #test.entities() where Money in (1, 2.5)").is_ok());
        let err = resolve_text("select Name from #test.entities() where Population in (1, 'two')")
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn test_resolve_desc() {
        let root = resolve_text("desc #test.cities(); select Name from #test.entities()").unwrap();
        match &root.statements[0] {
            ResolvedStatement::Desc(desc) => {
                assert_eq!(desc.name, "Desc1");
                assert_eq!(desc.source, "#test.cities()");
                let names: Vec<_> = desc.columns.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["City", "Country"]);
            }
            other => panic!("expected desc, got {:?}", other),
        }
        assert_eq!(first_query_of(&root, 1).name, "Query2");
        assert!(root.libraries.contains("test"));

        assert_eq!(resolve_text("desc #test.nope()").unwrap_err().code, ErrorCode::NotFound);
    }

    fn first_query_of(root: &ResolvedRoot, statement: usize) -> &ResolvedQuery {
        root.statements[statement].as_query().unwrap().body.leftmost()
    }
}
