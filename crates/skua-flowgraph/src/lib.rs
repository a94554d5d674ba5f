//! Skua Flow-Graph Builder
//!
//! Lowers one typed function body into a control-flow graph of basic
//! blocks carrying three-address computations, then rewrites the graph
//! into pruned SSA form for optimised compilation.
//!
//! # Architecture
//!
//! The pipeline over one function is:
//! 1. AST → fragments (effect/value/test visitation over the node tree)
//! 2. fragment CFG → discovered, numbered blocks
//! 3. blocks → dominator tree and dominance frontier (SEMI-NCA)
//! 4. φ-insertion and renaming → SSA graph
//!
//! Construction is single-threaded, synchronous and deterministic; the
//! only failure mode is a [`error::Bailout`], which abandons the partial
//! graph.

pub mod elide;
pub mod error;
pub mod flags;
pub mod graph;
pub mod ir;
pub mod ssa;

mod lower;

pub use error::{Bailout, BuildResult};
pub use flags::BuilderConfig;
pub use graph::{FlowGraph, FlowGraphBuilder};
pub use ir::PrettyPrint;
