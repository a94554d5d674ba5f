//! Shared helpers for flow-graph tests: hand-built ASTs and graph
//! walking.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use skua_ast::*;
use skua_flowgraph::ir::{Computation, Graph, Instr, InstrId};
use skua_flowgraph::FlowGraph;
use skua_types::{AbstractType, Instance, TypeSystem};

pub fn static_function(name: &str, num_params: usize) -> Function {
    let mut function = Function::new(name, TypeSystem::OBJECT, AbstractType::dynamic());
    function.is_static = true;
    function.num_fixed_parameters = num_params;
    function
}

pub fn lit(value: i64) -> AstNode {
    AstNode::Literal(LiteralNode {
        token_pos: TokenPos(0),
        literal: Instance::Smi(value),
    })
}

pub fn lit_str(value: &str) -> AstNode {
    AstNode::Literal(LiteralNode {
        token_pos: TokenPos(0),
        literal: Instance::string(value),
    })
}

pub fn load(local: VarId) -> AstNode {
    AstNode::LoadLocal(LoadLocalNode {
        token_pos: TokenPos(0),
        local,
        pseudo: None,
    })
}

pub fn store(local: VarId, value: AstNode) -> AstNode {
    AstNode::StoreLocal(StoreLocalNode {
        token_pos: TokenPos(0),
        local,
        value: Box::new(value),
    })
}

pub fn ret(value: AstNode) -> AstNode {
    AstNode::Return(ReturnNode {
        token_pos: TokenPos(0),
        value: Box::new(value),
        inlined_finally_list: vec![],
    })
}

pub fn seq(scope: Option<ScopeId>, nodes: Vec<AstNode>) -> AstNode {
    AstNode::Sequence(SequenceNode {
        token_pos: TokenPos(0),
        scope,
        nodes,
        label: None,
    })
}

pub fn binop(kind: TokenKind, left: AstNode, right: AstNode) -> AstNode {
    AstNode::BinaryOp(BinaryOpNode {
        token_pos: TokenPos(0),
        kind,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn comparison(kind: TokenKind, left: AstNode, right: AstNode) -> AstNode {
    AstNode::Comparison(ComparisonNode {
        token_pos: TokenPos(0),
        kind,
        left: Box::new(left),
        right: Box::new(right),
    })
}

pub fn type_node(ty: AbstractType) -> AstNode {
    AstNode::Type(TypeNode {
        token_pos: TokenPos(0),
        ty,
    })
}

pub fn if_stmt(condition: AstNode, true_branch: AstNode, false_branch: Option<AstNode>) -> AstNode {
    AstNode::If(IfNode {
        token_pos: TokenPos(0),
        condition: Box::new(condition),
        true_branch: Box::new(true_branch),
        false_branch: false_branch.map(Box::new),
    })
}

/// The instruction chain of one block, entry excluded.
pub fn chain_of(graph: &Graph, entry: InstrId) -> Vec<InstrId> {
    let mut instrs = Vec::new();
    let mut current = graph.successor(entry);
    while let Some(id) = current {
        if graph.instr(id).is_block_entry() {
            break;
        }
        instrs.push(id);
        current = graph.successor(id);
    }
    instrs
}

/// Every instruction reachable through block chains, φ lists included.
pub fn reachable_instrs(flow_graph: &FlowGraph) -> Vec<InstrId> {
    let mut instrs = Vec::new();
    for &block in &flow_graph.postorder {
        instrs.push(block);
        if let Some(phis) = flow_graph.graph.phis(block) {
            instrs.extend(phis.iter().flatten().copied());
        }
        instrs.extend(chain_of(&flow_graph.graph, block));
    }
    instrs
}

/// Reachable computations (from Do and Bind instructions).
pub fn reachable_computations(flow_graph: &FlowGraph) -> Vec<Computation> {
    reachable_instrs(flow_graph)
        .into_iter()
        .filter_map(|id| flow_graph.graph.instr(id).computation().cloned())
        .collect()
}

pub fn count_computations(flow_graph: &FlowGraph, pred: impl Fn(&Computation) -> bool) -> usize {
    reachable_computations(flow_graph)
        .iter()
        .filter(|c| pred(c))
        .count()
}

pub fn join_entries(flow_graph: &FlowGraph) -> Vec<InstrId> {
    flow_graph
        .postorder
        .iter()
        .copied()
        .filter(|&b| matches!(flow_graph.graph.instr(b), Instr::JoinEntry { .. }))
        .collect()
}
