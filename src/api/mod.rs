//! Public entry points
//!
//! [`compile`] turns query text into a [`Program`](crate::executor::Program);
//! [`execute`] compiles and runs it. [`Engine`] does the same with an
//! explicit configuration and cancellation token.

pub mod config;
mod engine;

pub use config::EngineConfig;
pub use engine::{compile, execute, Engine};
