//! Engine: compile and run queries against a schema provider

use crate::error::Result;
use crate::executor::{self, Program};
use crate::parser;
use crate::schema::{CancellationToken, SchemaProvider};
use crate::table::Table;
use crate::vdbe::Vdbe;

use super::config::EngineConfig;

// ============================================================================
// Engine
// ============================================================================

/// Compiles query text and runs programs under one configuration
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Engine {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Share `cancel` with the caller; cancelling it aborts running programs
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Parse, resolve and generate code for `query`.
    ///
    /// No program is produced if any stage fails.
    pub fn compile(&self, query: &str, provider: &dyn SchemaProvider) -> Result<Program> {
        let root = parser::parse(query)?;
        let resolved = parser::resolve(&root, provider)?;
        executor::generate(&resolved)
    }

    /// Run a compiled program and return its result table
    pub fn run(&self, program: &Program) -> Result<Table> {
        let table = Vdbe::new(program, &self.config, self.cancel.clone()).run()?;
        tracing::debug!(
            target: "tabql::vdbe",
            table = table.name(),
            rows = table.len(),
            "query finished"
        );
        Ok(table)
    }

    pub fn execute(&self, query: &str, provider: &dyn SchemaProvider) -> Result<Table> {
        let program = self.compile(query, provider)?;
        self.run(&program)
    }
}

/// Compile `query` with default settings
pub fn compile(query: &str, provider: &dyn SchemaProvider) -> Result<Program> {
    Engine::default().compile(query, provider)
}

/// Compile and run `query` with default settings
pub fn execute(query: &str, provider: &dyn SchemaProvider) -> Result<Table> {
    Engine::default().execute(query, provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::schema::{MemorySchema, SchemaRegistry};
    use crate::types::{ColumnType, Value};

    fn registry() -> SchemaRegistry {
        let schema = MemorySchema::new("test")
            .with_table(
                "numbers",
                vec![("N", ColumnType::Integer)],
                (1..=5).map(|n| vec![Value::Integer(n)]).collect(),
            )
            .unwrap();
        SchemaRegistry::new().with("test", schema)
    }

    #[test]
    fn test_execute_round_trip() {
        let table = execute("select N * 2 as Twice from #test.numbers() where N > 3", &registry())
            .unwrap();
        assert_eq!(table.column_names(), vec!["Twice"]);
        let values: Vec<_> = table.rows().iter().map(|r| r.values[0].clone()).collect();
        assert_eq!(values, vec![Value::Integer(8), Value::Integer(10)]);
    }

    #[test]
    fn test_cancelled_engine_does_not_run() {
        let cancel = CancellationToken::new();
        let engine = Engine::default().with_cancellation(cancel.clone());
        let program = engine.compile("select N from #test.numbers()", &registry()).unwrap();
        cancel.cancel();
        assert_eq!(engine.run(&program).unwrap_err().code, ErrorCode::Cancelled);
    }
}
