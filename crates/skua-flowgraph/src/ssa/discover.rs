//! Block discovery
//!
//! Depth-first traversal of the built CFG assigning preorder and
//! postorder numbers, recording the spanning-tree parent of each block,
//! collecting predecessor lists, and computing the per-block set of
//! assigned frame variables that seeds pruned φ-insertion.

use super::bitvec::BitVector;
use crate::ir::{Graph, InstrId};

/// Results of one discovery traversal
#[derive(Debug)]
pub struct Discovery {
    /// Block entries in preorder.
    pub preorder: Vec<InstrId>,
    /// Block entries in postorder.
    pub postorder: Vec<InstrId>,
    /// Preorder number of each block's spanning-tree parent, indexed by
    /// preorder number. The entry maps to itself.
    pub parent: Vec<usize>,
    /// Per-block assigned-variable sets, indexed by preorder number.
    pub assigned_vars: Vec<BitVector>,
}

/// Walk the graph from `graph_entry`, resetting any previous numbering
/// first so rediscovery is deterministic.
pub fn discover_blocks(
    graph: &mut Graph,
    graph_entry: InstrId,
    variable_count: usize,
    fixed_parameter_count: usize,
    copied_parameter_count: usize,
) -> Discovery {
    for i in 0..graph.len() {
        let id = InstrId(i as u32);
        if let Some(info) = graph.instr_mut(id).block_info_mut() {
            info.reset_discovery();
        }
    }

    let mut state = Discovery {
        preorder: Vec::new(),
        postorder: Vec::new(),
        parent: Vec::new(),
        assigned_vars: Vec::new(),
    };
    visit(
        graph,
        graph_entry,
        None,
        variable_count,
        fixed_parameter_count,
        copied_parameter_count,
        &mut state,
    );
    state
}

fn visit(
    graph: &mut Graph,
    block: InstrId,
    predecessor: Option<InstrId>,
    variable_count: usize,
    fixed_parameter_count: usize,
    copied_parameter_count: usize,
    state: &mut Discovery,
) {
    if graph.block_info(block).preorder_number.is_some() {
        // Back or cross edge: just record the extra predecessor.
        let pred = predecessor.expect("revisited block has a predecessor");
        graph.block_info_mut(block).predecessors.push(pred);
        return;
    }

    let preorder_number = state.preorder.len();
    {
        let info = graph.block_info_mut(block);
        if let Some(pred) = predecessor {
            info.predecessors.push(pred);
        }
        info.preorder_number = Some(preorder_number);
    }
    state.preorder.push(block);
    state.parent.push(
        predecessor
            .map(|p| {
                graph
                    .block_info(p)
                    .preorder_number
                    .expect("predecessor is discovered")
            })
            .unwrap_or(preorder_number),
    );

    // Walk the straight-line body: find the last instruction and collect
    // the frame variables assigned in this block.
    let mut assigned = BitVector::new(variable_count);
    let mut last = block;
    let mut current = graph.successor(block);
    while let Some(id) = current {
        if graph.instr(id).is_block_entry() {
            break;
        }
        if let Some(comp) = graph.instr(id).computation() {
            if let Some((local, _)) = comp.as_store_local() {
                if !local.is_captured {
                    let bit = local.bit_index(fixed_parameter_count, copied_parameter_count);
                    if bit < variable_count {
                        assigned.add(bit);
                    }
                }
            }
        }
        last = id;
        current = graph.successor(id);
    }
    graph.block_info_mut(block).last_instruction = Some(last);
    state.assigned_vars.push(assigned);

    for successor in graph.successors(last) {
        visit(
            graph,
            successor,
            Some(block),
            variable_count,
            fixed_parameter_count,
            copied_parameter_count,
            state,
        );
    }

    graph.block_info_mut(block).postorder_number = Some(state.postorder.len());
    state.postorder.push(block);
}
