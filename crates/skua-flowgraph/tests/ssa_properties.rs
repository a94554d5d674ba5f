//! Graph-wide invariants of SSA construction

mod common;

use common::*;
use skua_ast::*;
use skua_flowgraph::ir::Instr;
use skua_flowgraph::{BuilderConfig, FlowGraph, FlowGraphBuilder};
use skua_types::{AbstractType, TypeSystem};

/// if (c) { x = 1; } else { x = 2; } while (x) { x = x - 1; } return x;
fn sample_function() -> ParsedFunction {
    let mut parsed = ParsedFunction::new(static_function("sample", 1));
    let root = parsed.root_scope();
    let c = parsed.add_parameter(root, "c", AbstractType::dynamic(), TokenPos(1));
    let x = parsed.add_stack_local(root, "x", AbstractType::dynamic());
    let label = parsed.add_label("loop", root, false);
    let body = seq(
        Some(root),
        vec![
            if_stmt(load(c), store(x, lit(1)), Some(store(x, lit(2)))),
            AstNode::While(WhileNode {
                token_pos: TokenPos(2),
                label,
                condition: Box::new(load(x)),
                body: Box::new(seq(
                    None,
                    vec![store(x, binop(TokenKind::Sub, load(x), lit(1)))],
                )),
            }),
            ret(load(x)),
        ],
    );
    parsed.set_node_sequence(body);
    parsed
}

fn build_ssa(parsed: &ParsedFunction, types: &TypeSystem) -> FlowGraph {
    FlowGraphBuilder::new(parsed, types, BuilderConfig::default())
        .build_graph(true, true)
        .expect("SSA construction succeeds")
}

/// All SSA temp indices assigned anywhere in the arena.
fn assigned_ssa_indices(flow_graph: &FlowGraph) -> Vec<usize> {
    flow_graph
        .graph
        .iter()
        .filter_map(|(_, instr)| instr.ssa_temp_index())
        .collect()
}

#[test]
fn test_ssa_temp_indices_are_unique_and_dense() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let flow_graph = build_ssa(&parsed, &types);

    let mut indices = assigned_ssa_indices(&flow_graph);
    indices.sort_unstable();
    let expected: Vec<usize> = (0..flow_graph.max_ssa_temp_index).collect();
    assert_eq!(indices, expected);
}

#[test]
fn test_no_residual_local_ops_after_rename() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let flow_graph = build_ssa(&parsed, &types);

    assert_eq!(count_computations(&flow_graph, |c| c.is_load_local()), 0);
    assert_eq!(count_computations(&flow_graph, |c| c.is_store_local()), 0);
}

#[test]
fn test_phi_arity_matches_predecessor_count() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let flow_graph = build_ssa(&parsed, &types);

    let mut seen_phis = 0;
    for join in join_entries(&flow_graph) {
        let predecessor_count = flow_graph.graph.block_info(join).predecessors.len();
        assert!(predecessor_count >= 2);
        if let Some(phis) = flow_graph.graph.phis(join) {
            for phi in phis.iter().flatten() {
                match flow_graph.graph.instr(*phi) {
                    Instr::Phi { inputs, .. } => {
                        assert_eq!(inputs.len(), predecessor_count);
                        assert!(inputs.iter().all(|input| input.is_some()));
                        seen_phis += 1;
                    }
                    _ => unreachable!(),
                }
            }
        }
    }
    // The if-join and the loop header both merge x.
    assert!(seen_phis >= 2);
}

#[test]
fn test_every_block_ends_in_a_single_terminator() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let flow_graph = build_ssa(&parsed, &types);

    for &block in &flow_graph.postorder {
        let chain = chain_of(&flow_graph.graph, block);
        let last = chain.last().copied().unwrap_or(block);
        let successors = flow_graph.graph.successors(last);
        match successors.len() {
            0 => assert!(matches!(
                flow_graph.graph.instr(last),
                Instr::Return { .. } | Instr::Throw { .. } | Instr::ReThrow { .. }
            )),
            1 => assert!(flow_graph.graph.instr(successors[0]).is_block_entry()),
            2 => assert!(matches!(
                flow_graph.graph.instr(last),
                Instr::Branch { .. } | Instr::GraphEntry { .. }
            )),
            n => panic!("block ends with {} successors", n),
        }
    }
}

#[test]
fn test_dominator_tree_is_well_formed() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let flow_graph = build_ssa(&parsed, &types);

    for &block in &flow_graph.postorder {
        if block == flow_graph.graph_entry {
            continue;
        }
        let info = flow_graph.graph.block_info(block);
        let dominator = info.dominator.expect("every non-entry block is dominated");
        assert!(flow_graph
            .graph
            .block_info(dominator)
            .dominated_blocks
            .contains(&block));
        // Dominators come earlier in preorder.
        assert!(
            flow_graph.graph.block_info(dominator).preorder_number.unwrap()
                <= info.preorder_number.unwrap()
        );
    }
}

#[test]
fn test_environments_are_attached_during_rename() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let flow_graph = build_ssa(&parsed, &types);

    // Every surviving straight-line instruction carries a deopt
    // environment of at least variable_count slots.
    for &block in &flow_graph.postorder {
        for id in chain_of(&flow_graph.graph, block) {
            let env = match flow_graph.graph.instr(id) {
                Instr::Do { env, .. }
                | Instr::Bind { env, .. }
                | Instr::Branch { env, .. }
                | Instr::Return { env, .. }
                | Instr::Throw { env, .. }
                | Instr::ReThrow { env, .. } => env.clone(),
                _ => None,
            };
            let env = env.expect("instruction carries an environment");
            assert!(env.len() >= flow_graph.variable_count);
        }
    }
}

#[test]
fn test_rename_is_idempotent_on_ssa_graph() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let mut flow_graph = build_ssa(&parsed, &types);

    let before_max = flow_graph.max_ssa_temp_index;
    let mut before: Vec<(usize, Option<usize>)> = reachable_instrs(&flow_graph)
        .into_iter()
        .map(|id| (id.index(), flow_graph.graph.instr(id).ssa_temp_index()))
        .collect();

    // No LoadLocal or StoreLocal remains, so a second rename assigns the
    // same indices in the same order.
    let after_max = skua_flowgraph::ssa::rename(
        &mut flow_graph.graph,
        flow_graph.graph_entry,
        &parsed,
    )
    .expect("second rename succeeds");
    assert_eq!(before_max, after_max);

    let mut after: Vec<(usize, Option<usize>)> = reachable_instrs(&flow_graph)
        .into_iter()
        .map(|id| (id.index(), flow_graph.graph.instr(id).ssa_temp_index()))
        .collect();
    before.sort_unstable();
    after.sort_unstable();
    assert_eq!(before, after);
}

#[test]
fn test_block_discovery_is_idempotent_through_driver() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let first = build_ssa(&parsed, &types);
    let second = build_ssa(&parsed, &types);

    // Deterministic construction: same shapes, same numbering.
    assert_eq!(first.postorder.len(), second.postorder.len());
    assert_eq!(first.max_ssa_temp_index, second.max_ssa_temp_index);
    let ids = |fg: &FlowGraph| -> Vec<Option<usize>> {
        fg.postorder
            .iter()
            .map(|&b| fg.graph.block_info(b).block_id)
            .collect()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn test_temp_stack_is_balanced_at_statement_boundaries() {
    let types = TypeSystem::new();
    let parsed = sample_function();
    let flow_graph = FlowGraphBuilder::new(&parsed, &types, BuilderConfig::default())
        .build_graph(false, false)
        .expect("graph construction succeeds");

    // Walk each block chain tracking stack height; at every Do of a
    // store (a statement boundary in this sample) the height is zero
    // afterwards.
    for &block in &flow_graph.postorder {
        let mut height: isize = 0;
        for id in chain_of(&flow_graph.graph, block) {
            match flow_graph.graph.instr(id) {
                Instr::Bind { comp, .. } => {
                    height -= comp.input_count() as isize;
                    assert!(height >= 0);
                    height += 1;
                }
                Instr::Do { comp, .. } => {
                    height -= comp.input_count() as isize;
                    assert!(height >= 0);
                    assert_eq!(height, 0, "statements leave the stack empty");
                }
                Instr::Return { .. } | Instr::Throw { .. } | Instr::Branch { .. } => {
                    height -= 1;
                    assert!(height >= 0);
                }
                Instr::ReThrow { .. } => {
                    height -= 2;
                    assert!(height >= 0);
                }
                _ => {}
            }
        }
    }
}
