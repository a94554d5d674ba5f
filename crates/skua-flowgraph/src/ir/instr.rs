//! Instructions, block entries and the per-function arena
//!
//! Every instruction lives in the [`Graph`] arena and is referenced by
//! [`InstrId`]; the CFG is cyclic, so edges are ids rather than owned
//! nodes. Straight-line code is a chain of `successor` links running from
//! a block entry to a terminator or the next block entry.

use super::computation::{Computation, TryIndex};
use super::value::{Environment, Value};
use skua_ast::TokenPos;

/// Identifier of an instruction in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrId(pub u32);

impl InstrId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "i{}", self.0)
    }
}

/// Which successor slot of a branch to write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSide {
    True,
    False,
}

/// A writable successor slot of a branch instruction
///
/// A test fragment exposes its branch's two slots, and the caller wires
/// block entries into them through the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchSlot {
    pub branch: InstrId,
    pub side: BranchSide,
}

/// Block-level bookkeeping carried by every block entry
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    /// Reverse-postorder number assigned after discovery.
    pub block_id: Option<usize>,
    pub preorder_number: Option<usize>,
    pub postorder_number: Option<usize>,
    /// Predecessor block entries in discovery order.
    pub predecessors: Vec<InstrId>,
    /// Immediate dominator.
    pub dominator: Option<InstrId>,
    /// Blocks immediately dominated by this one.
    pub dominated_blocks: Vec<InstrId>,
    /// Last instruction of the block's straight-line chain; the entry
    /// itself when the block is otherwise empty.
    pub last_instruction: Option<InstrId>,
}

impl BlockInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything a previous discovery computed so rediscovery is
    /// deterministic.
    pub fn reset_discovery(&mut self) {
        *self = Self::default();
    }
}

/// An instruction node in the graph arena
#[derive(Debug, Clone)]
pub enum Instr {
    /// Unique root; owns the normal entry and registered catch entries.
    GraphEntry {
        block: BlockInfo,
        normal_entry: InstrId,
        catch_entries: Vec<InstrId>,
        /// SSA start environment built by rename.
        start_env: Option<Environment>,
    },

    /// Single-predecessor block header. Catch handlers are target entries
    /// carrying their try index.
    TargetEntry {
        block: BlockInfo,
        try_index: TryIndex,
        successor: Option<InstrId>,
    },

    /// Multi-predecessor block header; owns the φ list once SSA
    /// construction inserts one.
    JoinEntry {
        block: BlockInfo,
        /// φs indexed by local-variable bit index.
        phis: Option<Vec<Option<InstrId>>>,
        successor: Option<InstrId>,
    },

    /// Side-effecting computation with no produced value.
    Do {
        comp: Computation,
        successor: Option<InstrId>,
        previous: Option<InstrId>,
        env: Option<Environment>,
    },

    /// Computation producing a value; a definition.
    Bind {
        comp: Computation,
        /// Expression-stack height before SSA.
        temp_index: Option<usize>,
        /// Unique definition index after SSA.
        ssa_temp_index: Option<usize>,
        successor: Option<InstrId>,
        previous: Option<InstrId>,
        env: Option<Environment>,
    },

    /// Pseudo-definition of a formal parameter, created for the SSA start
    /// environment; never linked into a block.
    Parameter {
        index: usize,
        ssa_temp_index: Option<usize>,
    },

    /// Join-point definition merging one value per predecessor.
    Phi {
        inputs: Vec<Option<Value>>,
        ssa_temp_index: Option<usize>,
    },

    /// Two-successor terminator.
    Branch {
        value: Value,
        true_successor: Option<InstrId>,
        false_successor: Option<InstrId>,
        previous: Option<InstrId>,
        env: Option<Environment>,
    },

    Return {
        token_pos: TokenPos,
        value: Value,
        previous: Option<InstrId>,
        env: Option<Environment>,
    },

    /// Throw terminator. Carries a successor slot because a throw in value
    /// position is followed by the synthetic null constant that keeps the
    /// enclosing expression fragment open; that tail is unreachable at run
    /// time.
    Throw {
        token_pos: TokenPos,
        try_index: TryIndex,
        exception: Value,
        successor: Option<InstrId>,
        previous: Option<InstrId>,
        env: Option<Environment>,
    },

    ReThrow {
        token_pos: TokenPos,
        try_index: TryIndex,
        exception: Value,
        stacktrace: Value,
        successor: Option<InstrId>,
        previous: Option<InstrId>,
        env: Option<Environment>,
    },
}

impl Instr {
    pub fn is_block_entry(&self) -> bool {
        matches!(
            self,
            Instr::GraphEntry { .. } | Instr::TargetEntry { .. } | Instr::JoinEntry { .. }
        )
    }

    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Instr::Bind { .. } | Instr::Parameter { .. } | Instr::Phi { .. }
        )
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instr::Branch { .. } | Instr::Return { .. } | Instr::Throw { .. } | Instr::ReThrow { .. }
        )
    }

    /// Computation carried by a Do or Bind.
    pub fn computation(&self) -> Option<&Computation> {
        match self {
            Instr::Do { comp, .. } | Instr::Bind { comp, .. } => Some(comp),
            _ => None,
        }
    }

    /// Number of values consumed from the expression temp stack.
    pub fn input_count(&self) -> usize {
        match self {
            Instr::Do { comp, .. } | Instr::Bind { comp, .. } => comp.input_count(),
            Instr::Branch { .. } | Instr::Return { .. } | Instr::Throw { .. } => 1,
            Instr::ReThrow { .. } => 2,
            _ => 0,
        }
    }

    /// The consumed input values, in operand order. φ inputs are not
    /// expression-stack inputs and are handled by the rename pass
    /// directly.
    pub fn inputs_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Instr::Do { comp, .. } | Instr::Bind { comp, .. } => comp.inputs_mut(),
            Instr::Branch { value, .. } | Instr::Return { value, .. } => vec![value],
            Instr::Throw { exception, .. } => vec![exception],
            Instr::ReThrow {
                exception,
                stacktrace,
                ..
            } => vec![exception, stacktrace],
            _ => Vec::new(),
        }
    }

    pub fn inputs(&self) -> Vec<&Value> {
        match self {
            Instr::Do { comp, .. } | Instr::Bind { comp, .. } => comp.inputs(),
            Instr::Branch { value, .. } | Instr::Return { value, .. } => vec![value],
            Instr::Throw { exception, .. } => vec![exception],
            Instr::ReThrow {
                exception,
                stacktrace,
                ..
            } => vec![exception, stacktrace],
            _ => Vec::new(),
        }
    }

    /// Straight-line successor, if this instruction kind has one.
    pub fn successor(&self) -> Option<InstrId> {
        match self {
            Instr::TargetEntry { successor, .. }
            | Instr::JoinEntry { successor, .. }
            | Instr::Do { successor, .. }
            | Instr::Bind { successor, .. }
            | Instr::Throw { successor, .. }
            | Instr::ReThrow { successor, .. } => *successor,
            _ => None,
        }
    }

    pub fn ssa_temp_index(&self) -> Option<usize> {
        match self {
            Instr::Bind { ssa_temp_index, .. }
            | Instr::Parameter { ssa_temp_index, .. }
            | Instr::Phi { ssa_temp_index, .. } => *ssa_temp_index,
            _ => None,
        }
    }

    pub fn block_info(&self) -> Option<&BlockInfo> {
        match self {
            Instr::GraphEntry { block, .. }
            | Instr::TargetEntry { block, .. }
            | Instr::JoinEntry { block, .. } => Some(block),
            _ => None,
        }
    }

    pub fn block_info_mut(&mut self) -> Option<&mut BlockInfo> {
        match self {
            Instr::GraphEntry { block, .. }
            | Instr::TargetEntry { block, .. }
            | Instr::JoinEntry { block, .. } => Some(block),
            _ => None,
        }
    }

    pub fn set_env(&mut self, new_env: Environment) {
        match self {
            Instr::Do { env, .. }
            | Instr::Bind { env, .. }
            | Instr::Branch { env, .. }
            | Instr::Return { env, .. }
            | Instr::Throw { env, .. }
            | Instr::ReThrow { env, .. } => *env = Some(new_env),
            _ => unreachable!("instruction kind carries no environment"),
        }
    }
}

/// The per-function instruction arena
#[derive(Debug, Default)]
pub struct Graph {
    instrs: Vec<Instr>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, instr: Instr) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        self.instrs.push(instr);
        id
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id.index()]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.instrs[id.index()]
    }

    /// Iterate over all allocated instructions with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (InstrId, &Instr)> {
        self.instrs
            .iter()
            .enumerate()
            .map(|(i, instr)| (InstrId(i as u32), instr))
    }

    pub fn successor(&self, id: InstrId) -> Option<InstrId> {
        self.instr(id).successor()
    }

    fn successor_slot(&mut self, id: InstrId) -> &mut Option<InstrId> {
        match self.instr_mut(id) {
            Instr::TargetEntry { successor, .. }
            | Instr::JoinEntry { successor, .. }
            | Instr::Do { successor, .. }
            | Instr::Bind { successor, .. }
            | Instr::Throw { successor, .. }
            | Instr::ReThrow { successor, .. } => successor,
            other => unreachable!("instruction kind has no successor: {:?}", other),
        }
    }

    /// Link `id`'s straight-line successor.
    pub fn set_successor(&mut self, id: InstrId, succ: InstrId) {
        *self.successor_slot(id) = Some(succ);
    }

    /// Unlink `current` from the chain after `prev`, returning what now
    /// follows `prev`.
    pub fn remove_from_chain(&mut self, prev: InstrId, current: InstrId) -> Option<InstrId> {
        let next = self.successor(current);
        *self.successor_slot(prev) = next;
        next
    }

    pub fn set_previous(&mut self, id: InstrId, prev: InstrId) {
        match self.instr_mut(id) {
            Instr::Do { previous, .. }
            | Instr::Bind { previous, .. }
            | Instr::Branch { previous, .. }
            | Instr::Return { previous, .. }
            | Instr::Throw { previous, .. }
            | Instr::ReThrow { previous, .. } => *previous = Some(prev),
            other => unreachable!("cannot set previous on {:?}", other),
        }
    }

    /// All control-flow successors of an instruction: both branch targets,
    /// the normal and catch entries of the graph entry, or the single
    /// straight-line successor.
    pub fn successors(&self, id: InstrId) -> Vec<InstrId> {
        match self.instr(id) {
            Instr::GraphEntry {
                normal_entry,
                catch_entries,
                ..
            } => {
                let mut v = vec![*normal_entry];
                v.extend(catch_entries.iter().copied());
                v
            }
            Instr::Branch {
                true_successor,
                false_successor,
                ..
            } => {
                let mut v = Vec::new();
                if let Some(t) = true_successor {
                    v.push(*t);
                }
                if let Some(f) = false_successor {
                    v.push(*f);
                }
                v
            }
            other => other.successor().into_iter().collect(),
        }
    }

    pub fn set_branch_target(&mut self, slot: BranchSlot, target: InstrId) {
        match self.instr_mut(slot.branch) {
            Instr::Branch {
                true_successor,
                false_successor,
                ..
            } => match slot.side {
                BranchSide::True => *true_successor = Some(target),
                BranchSide::False => *false_successor = Some(target),
            },
            other => unreachable!("branch slot does not point at a branch: {:?}", other),
        }
    }

    pub fn branch_target(&self, slot: BranchSlot) -> Option<InstrId> {
        match self.instr(slot.branch) {
            Instr::Branch {
                true_successor,
                false_successor,
                ..
            } => match slot.side {
                BranchSide::True => *true_successor,
                BranchSide::False => *false_successor,
            },
            other => unreachable!("branch slot does not point at a branch: {:?}", other),
        }
    }

    pub fn block_info(&self, id: InstrId) -> &BlockInfo {
        self.instr(id)
            .block_info()
            .expect("instruction is not a block entry")
    }

    pub fn block_info_mut(&mut self, id: InstrId) -> &mut BlockInfo {
        self.instr_mut(id)
            .block_info_mut()
            .expect("instruction is not a block entry")
    }

    pub fn predecessor_count(&self, id: InstrId) -> usize {
        self.block_info(id).predecessors.len()
    }

    /// Insert a φ for variable `var_index` into a join entry, sizing its
    /// inputs to the join's predecessor count. The slot must be empty.
    pub fn insert_phi(&mut self, join: InstrId, var_index: usize, var_count: usize) -> InstrId {
        let pred_count = self.predecessor_count(join);
        let phi = self.alloc(Instr::Phi {
            inputs: vec![None; pred_count],
            ssa_temp_index: None,
        });
        match self.instr_mut(join) {
            Instr::JoinEntry { phis, .. } => {
                let list = phis.get_or_insert_with(|| vec![None; var_count]);
                assert!(list[var_index].is_none());
                list[var_index] = Some(phi);
            }
            other => unreachable!("φ insertion into non-join: {:?}", other),
        }
        phi
    }

    pub fn phis(&self, join: InstrId) -> Option<&[Option<InstrId>]> {
        match self.instr(join) {
            Instr::JoinEntry { phis, .. } => phis.as_deref(),
            _ => None,
        }
    }

    pub fn set_ssa_temp_index(&mut self, id: InstrId, index: usize) {
        match self.instr_mut(id) {
            Instr::Bind { ssa_temp_index, .. }
            | Instr::Parameter { ssa_temp_index, .. }
            | Instr::Phi { ssa_temp_index, .. } => *ssa_temp_index = Some(index),
            other => unreachable!("not a definition: {:?}", other),
        }
    }

    pub fn set_phi_input(&mut self, phi: InstrId, index: usize, value: Value) {
        match self.instr_mut(phi) {
            Instr::Phi { inputs, .. } => inputs[index] = Some(value),
            other => unreachable!("not a phi: {:?}", other),
        }
    }

    pub fn set_start_env(&mut self, entry: InstrId, env: Environment) {
        match self.instr_mut(entry) {
            Instr::GraphEntry { start_env, .. } => *start_env = Some(env),
            other => unreachable!("not the graph entry: {:?}", other),
        }
    }

    pub fn add_catch_entry(&mut self, entry: InstrId, catch_entry: InstrId) {
        match self.instr_mut(entry) {
            Instr::GraphEntry { catch_entries, .. } => catch_entries.push(catch_entry),
            other => unreachable!("not the graph entry: {:?}", other),
        }
    }
}
