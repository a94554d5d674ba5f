//! Pruned-SSA construction: φ-insertion and renaming
//!
//! φs are inserted per variable, seeded from the per-block assigned-
//! variable sets and driven through the dominance frontier with
//! high-water-mark guards. Renaming then walks the dominator tree with an
//! environment mapping variable bit indices to reaching values followed by
//! the transient expression stack, replacing and deleting every LoadLocal
//! and StoreLocal on the way.

use super::bitvec::BitVector;
use crate::error::{Bailout, BuildResult};
use crate::ir::{Environment, Graph, Instr, InstrId, Value};
use skua_ast::ParsedFunction;
use skua_types::Instance;

/// Insert φs for every variable assigned in a block that reaches a join
/// through the dominance frontier.
pub fn insert_phis(
    graph: &mut Graph,
    preorder: &[InstrId],
    assigned_vars: &[BitVector],
    var_count: usize,
    dom_frontier: &[BitVector],
) {
    let block_count = preorder.len();
    // Highest variable index that already has a φ in the block.
    let mut has_already: Vec<isize> = vec![-1; block_count];
    // Highest variable index for which the block entered the worklist.
    let mut work: Vec<isize> = vec![-1; block_count];

    let mut worklist: Vec<InstrId> = Vec::new();
    for var_index in 0..var_count {
        for block_index in 0..block_count {
            if assigned_vars[block_index].contains(var_index) {
                work[block_index] = var_index as isize;
                worklist.push(preorder[block_index]);
            }
        }

        while let Some(current) = worklist.pop() {
            let current_index = graph
                .block_info(current)
                .preorder_number
                .expect("block is discovered");
            let frontier: Vec<usize> = dom_frontier[current_index].iter().collect();
            for index in frontier {
                if has_already[index] < var_index as isize {
                    let block = preorder[index];
                    assert!(matches!(graph.instr(block), Instr::JoinEntry { .. }));
                    graph.insert_phi(block, var_index, var_count);
                    has_already[index] = var_index as isize;
                    if work[index] < var_index as isize {
                        work[index] = var_index as isize;
                        worklist.push(block);
                    }
                }
            }
        }
    }
}

/// Rewrite the graph into SSA form. Returns the number of SSA temps
/// allocated.
pub fn rename(
    graph: &mut Graph,
    graph_entry: InstrId,
    parsed_function: &ParsedFunction,
) -> BuildResult<usize> {
    let function_name = &parsed_function.function().name;
    if graph.successors(graph_entry).len() > 1 {
        return Err(Bailout::new(function_name, "Catch-entry support in SSA."));
    }
    if parsed_function.copied_parameter_count() > 0 {
        return Err(Bailout::new(function_name, "Copied parameter support in SSA"));
    }

    let fixed = parsed_function.function().num_fixed_parameters;
    let var_count = parsed_function.variable_count();
    assert_eq!(var_count, fixed + parsed_function.stack_local_count());

    let mut state = RenameState {
        fixed_parameter_count: fixed,
        copied_parameter_count: 0,
        var_count,
        next_ssa_temp_index: 0,
    };

    // Start environment: parameters come in as pseudo-definitions, all
    // locals start as null.
    let mut start_env: Vec<Value> = Vec::with_capacity(var_count);
    for index in 0..fixed {
        let param = graph.alloc(Instr::Parameter {
            index,
            ssa_temp_index: Some(state.next_ssa_temp_index),
        });
        state.next_ssa_temp_index += 1;
        start_env.push(Value::use_of(param));
    }
    for _ in fixed..var_count {
        start_env.push(Value::constant(Instance::Null));
    }
    graph.set_start_env(graph_entry, Environment::new(start_env.clone()));

    let normal_entry = graph.successors(graph_entry)[0];
    let mut env = start_env;
    rename_recursive(graph, normal_entry, &mut env, &mut state);
    Ok(state.next_ssa_temp_index)
}

struct RenameState {
    fixed_parameter_count: usize,
    copied_parameter_count: usize,
    var_count: usize,
    next_ssa_temp_index: usize,
}

impl RenameState {
    fn fresh_ssa_temp(&mut self) -> usize {
        let index = self.next_ssa_temp_index;
        self.next_ssa_temp_index += 1;
        index
    }
}

fn rename_recursive(
    graph: &mut Graph,
    block_entry: InstrId,
    env: &mut Vec<Value>,
    state: &mut RenameState,
) {
    // 1. φs define their variables at the top of the block.
    if let Some(phis) = graph.phis(block_entry).map(|p| p.to_vec()) {
        for (var_index, phi) in phis.iter().enumerate() {
            if let Some(phi) = phi {
                env[var_index] = Value::use_of(*phi);
                let index = state.fresh_ssa_temp();
                graph.set_ssa_temp_index(*phi, index);
            }
        }
    }

    // 2. Straight-line instructions.
    let mut prev = block_entry;
    let mut current_opt = graph.successor(block_entry);
    while let Some(current) = current_opt {
        if graph.instr(current).is_block_entry() {
            break;
        }

        // Attach a snapshot environment for deoptimisation.
        graph
            .instr_mut(current)
            .set_env(Environment::new(env.clone()));

        // 2a. Each use of a bound value pops the expression stack (only
        // binds push; parameter and φ uses are environment values). Uses
        // of LoadLocal or StoreLocal definitions are replaced by the
        // reaching value from the environment.
        let mut replacements: Vec<(usize, Value)> = Vec::new();
        {
            let instr = graph.instr(current);
            for (input_index, input) in instr.inputs().iter().enumerate() {
                let definition = match input.definition() {
                    Some(definition) => definition,
                    None => continue,
                };
                let comp = match graph.instr(definition) {
                    Instr::Bind { comp, .. } => comp,
                    _ => continue,
                };
                assert!(env.len() > state.var_count);
                env.pop();
                if let Some(local) = comp.as_load_local() {
                    let index =
                        local.bit_index(state.fixed_parameter_count, state.copied_parameter_count);
                    replacements.push((input_index, env[index].clone()));
                } else if let Some((local, _)) = comp.as_store_local() {
                    let index =
                        local.bit_index(state.fixed_parameter_count, state.copied_parameter_count);
                    replacements.push((input_index, env[index].clone()));
                }
            }
        }
        if !replacements.is_empty() {
            let mut inputs = graph.instr_mut(current).inputs_mut();
            for (input_index, value) in replacements {
                *inputs[input_index] = value;
            }
        }

        // 2b. LoadLocal and StoreLocal leave the graph; everything else
        // that binds gets a fresh SSA temp.
        enum Action {
            Load(usize),
            Store { index: usize, value: Value, is_bind: bool },
            Bind,
            Other,
        }
        let action = match graph.instr(current) {
            Instr::Bind { comp, .. } => {
                if let Some(local) = comp.as_load_local() {
                    Action::Load(
                        local.bit_index(state.fixed_parameter_count, state.copied_parameter_count),
                    )
                } else if let Some((local, value)) = comp.as_store_local() {
                    Action::Store {
                        index: local
                            .bit_index(state.fixed_parameter_count, state.copied_parameter_count),
                        value: value.clone(),
                        is_bind: true,
                    }
                } else {
                    Action::Bind
                }
            }
            Instr::Do { comp, .. } => {
                assert!(!comp.is_load_local());
                if let Some((local, value)) = comp.as_store_local() {
                    Action::Store {
                        index: local
                            .bit_index(state.fixed_parameter_count, state.copied_parameter_count),
                        value: value.clone(),
                        is_bind: false,
                    }
                } else {
                    Action::Other
                }
            }
            _ => Action::Other,
        };

        match action {
            Action::Load(index) => {
                env.push(env[index].clone());
                current_opt = graph.remove_from_chain(prev, current);
            }
            Action::Store {
                index,
                value,
                is_bind,
            } => {
                env[index] = value;
                if is_bind {
                    env.push(env[index].clone());
                }
                current_opt = graph.remove_from_chain(prev, current);
            }
            Action::Bind => {
                let index = state.fresh_ssa_temp();
                graph.set_ssa_temp_index(current, index);
                env.push(Value::use_of(current));
                prev = current;
                current_opt = graph.successor(current);
            }
            Action::Other => {
                prev = current;
                current_opt = graph.successor(current);
            }
        }
    }

    // Deletions may have changed the block's last instruction.
    graph.block_info_mut(block_entry).last_instruction = Some(prev);

    // 3. Dominated blocks rename against a copy of the environment.
    let dominated = graph.block_info(block_entry).dominated_blocks.clone();
    for block in dominated {
        let mut child_env = env.clone();
        rename_recursive(graph, block, &mut child_env, state);
    }

    // 4. In edge-split form only single-successor blocks can feed a join;
    // patch this block's slot in each of the join's φs.
    let successors = graph.successors(prev);
    if successors.len() == 1 {
        let successor = successors[0];
        if matches!(graph.instr(successor), Instr::JoinEntry { .. }) {
            let pred_index = graph
                .block_info(successor)
                .predecessors
                .iter()
                .position(|&p| p == block_entry)
                .expect("block is a predecessor of its join successor");
            if let Some(phis) = graph.phis(successor).map(|p| p.to_vec()) {
                for (var_index, phi) in phis.iter().enumerate() {
                    if let Some(phi) = phi {
                        graph.set_phi_input(*phi, pred_index, env[var_index].clone());
                    }
                }
            }
        }
    }
}
