// Vela AST Library
// Validated syntax tree handed to the compiler core by a parser front-end

pub mod ast;
pub mod builder;

pub use ast::*;

// Version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
