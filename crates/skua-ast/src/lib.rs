//! Skua AST
//!
//! The typed abstract syntax tree the flow-graph builder consumes, together
//! with the scope, variable and label arenas it references and the
//! [`ParsedFunction`] surface handed over by the frontend.
//!
//! The tree is a pure visitor target: nodes never carry compilation state,
//! and everything mutable during graph construction lives in the builder.

pub mod function;
pub mod nodes;
pub mod parsed;
pub mod printer;
pub mod scope;
pub mod token;

pub use function::{Field, Function, FunctionKind};
pub use nodes::*;
pub use parsed::ParsedFunction;
pub use printer::AstPrinter;
pub use scope::{LabelId, LocalScope, LocalVariable, ScopeId, SourceLabel, VarId, VarIndex};
pub use token::{TokenKind, TokenPos};
