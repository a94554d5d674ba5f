//! Dominator tree and dominance frontier
//!
//! SEMI-NCA: a two-pass variant of Lengauer-Tarjan that computes
//! semidominators from the depth-first spanning tree and then derives
//! immediate dominators as the nearest common ancestor of the spanning
//! parent and the semidominator. Path compression mutates the parent and
//! label arrays in place. The frontier pass walks each join predecessor
//! up the fresh dominator tree.

use super::bitvec::BitVector;
use crate::ir::{Graph, InstrId};

/// Dominance facts computed over the preorder numbering
#[derive(Debug)]
pub struct Dominance {
    /// Dominance frontier of each block, indexed by preorder number and
    /// holding preorder numbers.
    pub dominance_frontier: Vec<BitVector>,
}

/// Compute immediate dominators and the dominance frontier. Sets each
/// block's `dominator` and `dominated_blocks` as a side effect.
pub fn compute_dominators(
    graph: &mut Graph,
    preorder: &[InstrId],
    parent: &[usize],
) -> Dominance {
    let size = parent.len();
    assert_eq!(size, preorder.len());

    // All arrays map between preorder block numbers.
    let mut idom: Vec<usize> = parent.to_vec();
    let mut semi: Vec<usize> = (0..size).collect();
    let mut label: Vec<usize> = (0..size).collect();
    let mut parent: Vec<usize> = parent.to_vec();
    let mut dominance_frontier: Vec<BitVector> =
        (0..size).map(|_| BitVector::new(size)).collect();

    // 1. Semidominators, iterating blocks in reverse preorder (skipping
    // the entry).
    for block_index in (1..size).rev() {
        let block = preorder[block_index];
        let predecessors = graph.block_info(block).predecessors.clone();
        for pred in predecessors {
            let pred_index = graph
                .block_info(pred)
                .preorder_number
                .expect("predecessor is discovered");

            // Ascend the semidominator path starting at the predecessor.
            let mut best = pred_index;
            if pred_index > block_index {
                compress_path(block_index, pred_index, &mut parent, &mut label);
                best = label[pred_index];
            }
            semi[block_index] = semi[block_index].min(semi[best]);
        }
        label[block_index] = semi[block_index];
    }

    // 2. Immediate dominators as the nearest common ancestor of spanning
    // parent and semidominator.
    for block_index in 1..size {
        let mut dom_index = idom[block_index];
        while dom_index > semi[block_index] {
            dom_index = idom[dom_index];
        }
        idom[block_index] = dom_index;
        let dom_block = preorder[dom_index];
        graph.block_info_mut(preorder[block_index]).dominator = Some(dom_block);
        graph
            .block_info_mut(dom_block)
            .dominated_blocks
            .push(preorder[block_index]);
    }

    // 3. Dominance frontier: for every block with several predecessors,
    // walk each predecessor up to the block's immediate dominator.
    for block_index in 0..size {
        let block = preorder[block_index];
        let predecessors = graph.block_info(block).predecessors.clone();
        if predecessors.len() <= 1 {
            continue;
        }
        let dominator = graph.block_info(block).dominator;
        for pred in predecessors {
            let mut runner = pred;
            while Some(runner) != dominator {
                let runner_index = graph
                    .block_info(runner)
                    .preorder_number
                    .expect("runner is discovered");
                dominance_frontier[runner_index].add(block_index);
                runner = graph
                    .block_info(runner)
                    .dominator
                    .expect("runner below the entry has a dominator");
            }
        }
    }

    Dominance { dominance_frontier }
}

/// Link-eval path compression: each block's label becomes the minimum
/// semidominator on the compressed path.
fn compress_path(
    start_index: usize,
    current_index: usize,
    parent: &mut Vec<usize>,
    label: &mut Vec<usize>,
) {
    let next_index = parent[current_index];
    if next_index > start_index {
        compress_path(start_index, next_index, parent, label);
        label[current_index] = label[current_index].min(label[next_index]);
        parent[current_index] = parent[next_index];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::discover::discover_blocks;
    use crate::ir::{BlockInfo, Instr, Value};
    use skua_ast::TokenPos;
    use skua_types::Instance;

    fn target(graph: &mut Graph) -> InstrId {
        graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        })
    }

    fn join(graph: &mut Graph) -> InstrId {
        graph.alloc(Instr::JoinEntry {
            block: BlockInfo::new(),
            phis: None,
            successor: None,
        })
    }

    fn branch(graph: &mut Graph, t: InstrId, f: InstrId) -> InstrId {
        graph.alloc(Instr::Branch {
            value: Value::constant(Instance::Bool(true)),
            true_successor: Some(t),
            false_successor: Some(f),
            previous: None,
            env: None,
        })
    }

    fn ret(graph: &mut Graph) -> InstrId {
        graph.alloc(Instr::Return {
            token_pos: TokenPos(0),
            value: Value::constant(Instance::Null),
            previous: None,
            env: None,
        })
    }

    /// Build the classic diamond and return (graph, entry, parts).
    fn diamond() -> (Graph, InstrId, [InstrId; 5]) {
        let mut graph = Graph::new();
        let normal = target(&mut graph);
        let entry = graph.alloc(Instr::GraphEntry {
            block: BlockInfo::new(),
            normal_entry: normal,
            catch_entries: vec![],
            start_env: None,
        });
        let then_entry = target(&mut graph);
        let else_entry = target(&mut graph);
        let br = branch(&mut graph, then_entry, else_entry);
        graph.set_successor(normal, br);
        let merge = join(&mut graph);
        graph.set_successor(then_entry, merge);
        graph.set_successor(else_entry, merge);
        let r = ret(&mut graph);
        graph.set_successor(merge, r);
        (graph, entry, [normal, then_entry, else_entry, merge, entry])
    }

    #[test]
    fn test_diamond_dominators() {
        let (mut graph, entry, [normal, then_entry, else_entry, merge, graph_entry]) = diamond();
        let discovery = discover_blocks(&mut graph, entry, 0, 0, 0);
        compute_dominators(&mut graph, &discovery.preorder, &discovery.parent);

        // The branch block dominates both arms and the join.
        assert_eq!(graph.block_info(then_entry).dominator, Some(normal));
        assert_eq!(graph.block_info(else_entry).dominator, Some(normal));
        assert_eq!(graph.block_info(merge).dominator, Some(normal));
        assert_eq!(graph.block_info(normal).dominator, Some(graph_entry));

        // dominated_blocks is the inverse of dominator.
        assert!(graph
            .block_info(normal)
            .dominated_blocks
            .contains(&merge));
    }

    #[test]
    fn test_diamond_frontier() {
        let (mut graph, entry, [_, then_entry, else_entry, merge, _]) = diamond();
        let discovery = discover_blocks(&mut graph, entry, 0, 0, 0);
        let dominance = compute_dominators(&mut graph, &discovery.preorder, &discovery.parent);

        let merge_pre = graph.block_info(merge).preorder_number.unwrap();
        let then_pre = graph.block_info(then_entry).preorder_number.unwrap();
        let else_pre = graph.block_info(else_entry).preorder_number.unwrap();

        // Both arms have the join in their frontier; the join is not in
        // its own dominator's frontier.
        assert!(dominance.dominance_frontier[then_pre].contains(merge_pre));
        assert!(dominance.dominance_frontier[else_pre].contains(merge_pre));
    }

    #[test]
    fn test_loop_frontier_contains_header() {
        // entry → header(join) → branch(body, exit); body → header
        let mut graph = Graph::new();
        let normal = target(&mut graph);
        let entry = graph.alloc(Instr::GraphEntry {
            block: BlockInfo::new(),
            normal_entry: normal,
            catch_entries: vec![],
            start_env: None,
        });
        let header = join(&mut graph);
        graph.set_successor(normal, header);
        let body = target(&mut graph);
        let exit = target(&mut graph);
        let br = branch(&mut graph, body, exit);
        graph.set_successor(header, br);
        graph.set_successor(body, header);
        let r = ret(&mut graph);
        graph.set_successor(exit, r);

        let discovery = discover_blocks(&mut graph, entry, 0, 0, 0);
        let dominance = compute_dominators(&mut graph, &discovery.preorder, &discovery.parent);

        // The back-edge source has the loop header in its frontier, and
        // so does the header itself (it does not strictly dominate
        // itself).
        let header_pre = graph.block_info(header).preorder_number.unwrap();
        let body_pre = graph.block_info(body).preorder_number.unwrap();
        assert!(dominance.dominance_frontier[body_pre].contains(header_pre));
        assert!(dominance.dominance_frontier[header_pre].contains(header_pre));
        assert_eq!(graph.block_info(body).dominator, Some(header));
        assert_eq!(graph.block_info(exit).dominator, Some(header));
    }
}
