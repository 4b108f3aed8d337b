//! Scope stack for name resolution
//!
//! Every nesting level the resolver enters pushes a typed [`Frame`]: one per
//! statement for its CTEs, one per query for its FROM tables and aggregate
//! slots, and one per JOIN while its ON condition is resolved. Column lookup
//! walks the stack from the top down to the innermost query frame; CTE
//! lookup walks all the way out.

use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::functions::{MethodCatalog, STANDARD_LIBRARY};
use crate::parser::typed::AggregateSlot;
use crate::schema::{Schema, SchemaColumn};

// ============================================================================
// Symbols
// ============================================================================

/// One aliased source visible in a query
#[derive(Clone)]
pub struct TableEntry {
    pub alias: String,
    pub cursor: usize,
    pub columns: Vec<SchemaColumn>,
    /// Schema name and plugin for `#schema.method()` sources; `None` for CTEs
    pub schema: Option<(String, Arc<dyn Schema>)>,
}

impl TableEntry {
    /// Methods callable on rows of this source
    pub fn catalog(&self) -> &MethodCatalog {
        match &self.schema {
            Some((_, schema)) => schema.catalog(),
            None => &STANDARD_LIBRARY,
        }
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<(usize, &SchemaColumn)> {
        self.columns.iter().enumerate().find(|(_, c)| c.name == name)
    }
}

/// Aliased sources of a FROM clause; a join exposes every alias it combines
#[derive(Clone, Default)]
pub struct TableSymbol {
    entries: Vec<TableEntry>,
}

impl TableSymbol {
    pub fn single(entry: TableEntry) -> Self {
        TableSymbol {
            entries: vec![entry],
        }
    }

    /// Combine two sides of a join, rejecting a repeated alias
    pub fn merge(mut self, other: TableSymbol) -> Result<Self> {
        for entry in other.entries {
            if self.entry(&entry.alias).is_some() {
                return Err(Error::with_message(
                    ErrorCode::Duplicate,
                    format!("alias '{}' is used more than once", entry.alias),
                ));
            }
            self.entries.push(entry);
        }
        Ok(self)
    }

    pub fn entries(&self) -> &[TableEntry] {
        &self.entries
    }

    pub fn entry(&self, alias: &str) -> Option<&TableEntry> {
        self.entries.iter().find(|e| e.alias == alias)
    }

    pub fn aliases(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.alias.as_str()).collect()
    }
}

/// Columns of a CTE, readable by name later in the same statement
#[derive(Debug, Clone)]
pub struct CteTable {
    pub name: String,
    pub columns: Vec<SchemaColumn>,
}

#[derive(Clone)]
pub enum Symbol {
    Table(TableSymbol),
    Cte(CteTable),
    /// Aggregate accumulate calls the query runs once per row
    RefreshMethods(Vec<AggregateSlot>),
}

const REFRESH: &str = "#refresh";

// ============================================================================
// Frames
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Query,
    Cte,
    Join,
}

/// Symbols bound at one nesting level, in binding order
pub struct Frame {
    kind: ScopeKind,
    symbols: Vec<(String, Symbol)>,
}

impl Frame {
    fn new(kind: ScopeKind) -> Self {
        Frame {
            kind,
            symbols: Vec::new(),
        }
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    fn tables(&self) -> impl Iterator<Item = &TableSymbol> {
        self.symbols.iter().filter_map(|(_, s)| match s {
            Symbol::Table(t) => Some(t),
            _ => None,
        })
    }
}

/// Explicit stack of typed frames
#[derive(Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack::default()
    }

    pub fn push(&mut self, kind: ScopeKind) {
        let mut frame = Frame::new(kind);
        if kind == ScopeKind::Query {
            frame
                .symbols
                .push((REFRESH.to_string(), Symbol::RefreshMethods(Vec::new())));
        }
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bind `name` in the innermost frame
    pub fn insert(&mut self, name: impl Into<String>, symbol: Symbol) -> Result<()> {
        let frame = self.frames.last_mut().ok_or_else(no_frame)?;
        let name = name.into();
        if frame.get(&name).is_some() {
            return Err(Error::with_message(
                ErrorCode::Duplicate,
                format!("'{}' is already defined in this scope", name),
            ));
        }
        frame.symbols.push((name, symbol));
        Ok(())
    }

    /// Tables visible from the innermost frame, in binding order.
    ///
    /// Only frames above the innermost query frame (and that frame itself)
    /// are searched.
    pub fn visible_tables(&self) -> Vec<&TableSymbol> {
        let start = self
            .frames
            .iter()
            .rposition(|f| f.kind == ScopeKind::Query)
            .unwrap_or(0);
        self.frames[start..]
            .iter()
            .flat_map(|frame| frame.tables())
            .collect()
    }

    /// Visible table entries in FROM order
    pub fn visible_entries(&self) -> Vec<&TableEntry> {
        self.visible_tables()
            .into_iter()
            .flat_map(|t| t.entries())
            .collect()
    }

    /// CTE defined in this or any enclosing statement
    pub fn find_cte(&self, name: &str) -> Option<&CteTable> {
        let key = name.to_lowercase();
        self.frames.iter().rev().find_map(|frame| match frame.get(&key) {
            Some(Symbol::Cte(cte)) => Some(cte),
            _ => None,
        })
    }

    /// Aggregate slots of the innermost query
    pub fn refresh_methods_mut(&mut self) -> Result<&mut Vec<AggregateSlot>> {
        let frame = self
            .frames
            .iter_mut()
            .rev()
            .find(|f| f.kind == ScopeKind::Query)
            .ok_or_else(no_frame)?;
        match frame.get_mut(REFRESH) {
            Some(Symbol::RefreshMethods(slots)) => Ok(slots),
            _ => Err(no_frame()),
        }
    }

    /// Pop a query frame and hand back its aggregate slots
    pub fn pop_query(&mut self) -> Result<Vec<AggregateSlot>> {
        let mut frame = self.pop().ok_or_else(no_frame)?;
        if frame.kind != ScopeKind::Query {
            return Err(Error::with_message(
                ErrorCode::Internal,
                format!("expected query scope, found {:?}", frame.kind),
            ));
        }
        let refresh = frame.symbols.iter().position(|(n, _)| n == REFRESH);
        match refresh.map(|i| frame.symbols.swap_remove(i)) {
            Some((_, Symbol::RefreshMethods(slots))) => Ok(slots),
            _ => Ok(Vec::new()),
        }
    }
}

fn no_frame() -> Error {
    Error::with_message(ErrorCode::Internal, "no enclosing query scope")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn entry(alias: &str, cursor: usize, columns: &[&str]) -> TableEntry {
        TableEntry {
            alias: alias.to_string(),
            cursor,
            columns: columns
                .iter()
                .map(|c| SchemaColumn {
                    name: c.to_string(),
                    ty: ColumnType::Integer,
                })
                .collect(),
            schema: None,
        }
    }

    #[test]
    fn test_join_frame_sees_only_its_tables() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Query);
        scopes
            .insert("q", Symbol::Table(TableSymbol::single(entry("outer", 0, &["A"]))))
            .unwrap();
        scopes.push(ScopeKind::Query);
        scopes.push(ScopeKind::Join);
        scopes
            .insert("a", Symbol::Table(TableSymbol::single(entry("a", 1, &["X"]))))
            .unwrap();

        let aliases: Vec<_> = scopes
            .visible_entries()
            .iter()
            .map(|e| e.alias.clone())
            .collect();
        assert_eq!(aliases, vec!["a"]);
    }

    #[test]
    fn test_cte_lookup_walks_outward() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Cte);
        scopes
            .insert(
                "people",
                Symbol::Cte(CteTable {
                    name: "people".into(),
                    columns: Vec::new(),
                }),
            )
            .unwrap();
        scopes.push(ScopeKind::Query);
        scopes.push(ScopeKind::Join);
        assert!(scopes.find_cte("People").is_some());
        assert!(scopes.find_cte("missing").is_none());
    }

    #[test]
    fn test_merge_rejects_repeated_alias() {
        let left = TableSymbol::single(entry("a", 0, &["X"]));
        let right = TableSymbol::single(entry("a", 1, &["Y"]));
        assert_eq!(left.merge(right).err().unwrap().code, ErrorCode::Duplicate);
    }

    #[test]
    fn test_refresh_methods_belong_to_innermost_query() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeKind::Query);
        scopes.push(ScopeKind::Join);
        assert!(scopes.refresh_methods_mut().unwrap().is_empty());
        scopes.pop();
        assert!(scopes.pop_query().unwrap().is_empty());
        assert_eq!(scopes.depth(), 0);
    }
}
