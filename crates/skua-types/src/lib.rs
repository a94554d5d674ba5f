//! Skua Type System
//!
//! This crate is the type-system collaborator consumed by the compiler
//! passes. It models classes, abstract types and type-argument vectors
//! together with the relational queries the flow-graph builder asks
//! (`is_subtype_of`, `is_more_specific_than`, `is_instance_of`,
//! `is_within_bounds_of`), plus the opaque runtime [`Instance`] handles
//! that literal expressions embed into constant computations.

pub mod context;
pub mod instance;
pub mod types;

pub use context::Context;
pub use instance::Instance;
pub use types::{AbstractType, Class, ClassId, TypeArguments, TypeKind, TypeSystem};
