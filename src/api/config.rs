//! Engine configuration
//!
//! Settings shared by compilation and execution. Defaults suit tests and
//! small files; `from_env` lets a host override them without code changes.

use std::env;
use std::str::FromStr;

// ============================================================================
// Defaults
// ============================================================================

/// Default VM instruction budget (unlimited; the guard is opt-in)
pub const DEFAULT_MAX_INSTRUCTIONS: u64 = 0;

/// Default number of rows per chunk handed over by file readers
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of chunks buffered between a reader thread and the VM
pub const DEFAULT_QUEUE_DEPTH: usize = 8;

const ENV_MAX_INSTRUCTIONS: &str = "TABQL_MAX_INSTRUCTIONS";
const ENV_CHUNK_SIZE: &str = "TABQL_CHUNK_SIZE";
const ENV_QUEUE_DEPTH: &str = "TABQL_QUEUE_DEPTH";

// ============================================================================
// Engine Configuration
// ============================================================================

/// Configuration for an [`Engine`](crate::api::Engine)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum instructions a single run may execute (0 = unlimited)
    pub max_instructions: u64,
    /// Rows per chunk produced by background file readers
    pub chunk_size: usize,
    /// Chunks buffered between reader and VM
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TABQL_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let defaults = EngineConfig::default();
        EngineConfig {
            max_instructions: env_or(ENV_MAX_INSTRUCTIONS, defaults.max_instructions),
            chunk_size: env_or(ENV_CHUNK_SIZE, defaults.chunk_size).max(1),
            queue_depth: env_or(ENV_QUEUE_DEPTH, defaults.queue_depth).max(1),
        }
    }

    pub fn with_max_instructions(mut self, max_instructions: u64) -> Self {
        self.max_instructions = max_instructions;
        self
    }

    /// Chunk size is clamped to at least one row
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Queue depth is clamped to at least one chunk
    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth.max(1);
        self
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(target: "tabql::config", "ignoring {}={:?}: not a number", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_instructions, 0, "runs are unbounded unless a budget is set");
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.queue_depth, DEFAULT_QUEUE_DEPTH);
    }

    #[test]
    fn test_builders_clamp() {
        let config = EngineConfig::default()
            .with_max_instructions(500)
            .with_max_instructions(0)
            .with_chunk_size(0)
            .with_queue_depth(0);
        assert_eq!(config.max_instructions, 0);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.queue_depth, 1);
    }

    #[test]
    fn test_env_or_falls_back() {
        assert_eq!(env_or("TABQL_TEST_UNSET_VARIABLE", 42usize), 42);
    }
}
