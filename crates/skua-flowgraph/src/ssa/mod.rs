//! SSA construction
//!
//! Block discovery over the built CFG, SEMI-NCA dominators with the
//! dominance frontier, pruned φ-insertion and renaming.

pub mod bitvec;
pub mod discover;
pub mod dominators;
pub mod rename;

pub use bitvec::BitVector;
pub use discover::{discover_blocks, Discovery};
pub use dominators::{compute_dominators, Dominance};
pub use rename::{insert_phis, rename};
