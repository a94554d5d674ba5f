//! Local variables, scopes and jump labels
//!
//! Variables, scopes and labels are arena-allocated in the owning
//! [`ParsedFunction`](crate::ParsedFunction) and referenced by id from AST
//! nodes, keeping the tree immutable during graph construction.

use crate::token::TokenPos;
use skua_types::AbstractType;

/// Identifier of a local variable in the parsed function's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub u32);

impl std::fmt::Display for VarId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Identifier of a local scope in the parsed function's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Identifier of a source label in the parsed function's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelId(pub u32);

/// Where a local variable's storage lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIndex {
    /// Formal parameter slot.
    Parameter(usize),
    /// Stack slot in the function frame.
    Stack(usize),
    /// Slot in the heap context allocated by the owning scope; only for
    /// captured variables.
    Context(usize),
}

/// A local variable (parameter, stack local or captured local)
#[derive(Debug, Clone)]
pub struct LocalVariable {
    pub name: String,
    pub ty: AbstractType,
    pub token_pos: TokenPos,
    pub owner: ScopeId,
    pub is_captured: bool,
    pub index: VarIndex,
}

impl LocalVariable {
    pub fn new(
        name: impl Into<String>,
        ty: AbstractType,
        token_pos: TokenPos,
        owner: ScopeId,
        index: VarIndex,
    ) -> Self {
        Self {
            name: name.into(),
            ty,
            token_pos,
            owner,
            is_captured: matches!(index, VarIndex::Context(_)),
            index,
        }
    }

    /// Bit index of this variable in per-block assigned-variable sets and
    /// SSA environments. Parameters come first, then copied parameters,
    /// then stack locals. Captured variables have no bit index; their
    /// accesses are lowered to context field operations instead.
    pub fn bit_index(&self, fixed_parameter_count: usize, copied_parameter_count: usize) -> usize {
        match self.index {
            VarIndex::Parameter(i) => {
                assert!(i < fixed_parameter_count + copied_parameter_count);
                i
            }
            VarIndex::Stack(i) => fixed_parameter_count + copied_parameter_count + i,
            VarIndex::Context(_) => unreachable!("captured variables have no bit index"),
        }
    }

    /// Context slot of a captured variable.
    pub fn context_slot(&self) -> usize {
        match self.index {
            VarIndex::Context(i) => i,
            _ => unreachable!("not a captured variable"),
        }
    }
}

/// A lexical scope
#[derive(Debug, Clone)]
pub struct LocalScope {
    pub parent: Option<ScopeId>,
    /// Context nesting depth while this scope is active.
    pub context_level: usize,
    /// Number of captured variables this scope allocates a context for.
    pub num_context_variables: usize,
}

/// A break/continue target declared in the source
///
/// The flow-graph builder materialises the break and continue join blocks
/// lazily the first time a jump references them; those live in the
/// builder, not here.
#[derive(Debug, Clone)]
pub struct SourceLabel {
    pub name: String,
    /// Scope containing the labelled statement; jumps unchain contexts
    /// down to this scope's outer context level.
    pub owner: ScopeId,
    /// Set for case labels that are the target of a labelled continue.
    pub is_continue_target: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_index_layout() {
        let scope = ScopeId(0);
        let param = LocalVariable::new(
            "x",
            AbstractType::dynamic(),
            TokenPos(0),
            scope,
            VarIndex::Parameter(1),
        );
        let local = LocalVariable::new(
            "t",
            AbstractType::dynamic(),
            TokenPos(0),
            scope,
            VarIndex::Stack(0),
        );
        assert_eq!(param.bit_index(2, 0), 1);
        assert_eq!(local.bit_index(2, 0), 2);
        assert_eq!(local.bit_index(2, 1), 3);
    }

    #[test]
    fn test_captured_flag() {
        let var = LocalVariable::new(
            "c",
            AbstractType::dynamic(),
            TokenPos(0),
            ScopeId(0),
            VarIndex::Context(2),
        );
        assert!(var.is_captured);
        assert_eq!(var.context_slot(), 2);
    }
}
