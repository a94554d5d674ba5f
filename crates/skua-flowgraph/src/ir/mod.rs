//! The intermediate representation
//!
//! Three-address computations carried by instructions in a per-function
//! arena, organised into basic blocks by entry instructions.

pub mod computation;
pub mod instr;
pub mod pretty;
pub mod value;

pub use computation::{Computation, TryIndex};
pub use instr::{BlockInfo, BranchSide, BranchSlot, Graph, Instr, InstrId};
pub use pretty::{GraphWriter, PrettyPrint};
pub use value::{Environment, Value};
