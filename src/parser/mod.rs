//! Query front end: tokenizer, grammar and name resolution

pub mod ast;
pub mod grammar;
pub mod resolve;
pub mod scope;
pub mod tokenizer;
pub mod typed;

pub use grammar::parse;
pub use resolve::resolve;
