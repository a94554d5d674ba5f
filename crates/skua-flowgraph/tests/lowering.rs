//! Lowering shapes for contexts, closures, allocation and control flow

mod common;

use common::*;
use skua_ast::*;
use skua_flowgraph::ir::{Computation, Instr};
use skua_flowgraph::{BuilderConfig, FlowGraph, FlowGraphBuilder};
use skua_types::{AbstractType, Class, Context, Instance, TypeSystem};

fn build(parsed: &ParsedFunction, types: &TypeSystem) -> FlowGraph {
    FlowGraphBuilder::new(parsed, types, BuilderConfig::default())
        .build_graph(false, false)
        .expect("graph construction succeeds")
}

#[test]
fn test_captured_local_goes_through_context() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("captures", 0));
    let root = parsed.root_scope();
    let body_scope = parsed.add_scope(Some(root), 1, 1);
    parsed.allocate_saved_context_var();
    let cap = parsed.add_captured_local(body_scope, 0, "cap", AbstractType::dynamic());

    let body = seq(
        Some(body_scope),
        vec![store(cap, lit(1)), ret(load(cap))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    // Entry: allocate the context, save the incoming one, chain.
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::AllocateContext {
                num_context_variables: 1,
                ..
            }
        )),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::ChainContext { .. }
        )),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::StoreLocal { local, .. } if local.name == ":saved_context")
        }),
        1
    );

    // The captured accesses are context field operations, not frame ops.
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::StoreVMField { offset_in_words, .. }
                if *offset_in_words == Context::variable_offset(0)
        )),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::LoadVMField { offset_in_words, .. }
                if *offset_in_words == Context::variable_offset(0)
        )),
        1
    );

    // One StoreContext nulls the register at entry, one restores the
    // saved context before the return.
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::StoreContext { .. }
        )),
        2
    );
}

#[test]
fn test_closure_call_saves_and_restores_context() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("call", 1));
    let root = parsed.root_scope();
    let f = parsed.add_parameter(root, "f", AbstractType::dynamic(), TokenPos(1));
    let body = seq(
        Some(root),
        vec![ret(AstNode::ClosureCall(ClosureCallNode {
            token_pos: TokenPos(2),
            closure: Box::new(load(f)),
            arguments: ArgumentList::positional(vec![lit(7)]),
        }))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    // The closure itself is the leading argument.
    let calls: Vec<_> = reachable_computations(&flow_graph)
        .into_iter()
        .filter(|c| matches!(c, Computation::ClosureCall { .. }))
        .collect();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Computation::ClosureCall { arguments, .. } => assert_eq!(arguments.len(), 2),
        _ => unreachable!(),
    }

    // CTX is stashed in the expression temp around the call.
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::StoreLocal { local, .. } if local.name == ":expr_temp")
        }),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::LoadLocal { local, .. } if local.name == ":expr_temp")
        }),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::StoreContext { .. }
        )),
        1
    );
}

#[test]
fn test_constructor_call_in_value_position() {
    let mut types = TypeSystem::new();
    let point = types.register_class(Class::new("Point", Some(TypeSystem::OBJECT)));
    let mut constructor = Function::new("Point.", point, AbstractType::dynamic());
    constructor.kind = FunctionKind::Constructor;
    constructor.num_fixed_parameters = 3;

    let mut parsed = ParsedFunction::new(static_function("make", 0));
    let root = parsed.root_scope();
    let allocated = parsed.add_stack_local(root, ":allocated", AbstractType::dynamic());
    let body = seq(
        Some(root),
        vec![ret(AstNode::ConstructorCall(ConstructorCallNode {
            token_pos: TokenPos(1),
            type_arguments: None,
            constructor,
            arguments: ArgumentList::positional(vec![lit(4)]),
            allocated_object_var: allocated,
        }))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::AllocateObject { .. }
        )),
        1
    );
    // The constructor runs as (receiver, ctor-phase, args...).
    let static_calls: Vec<_> = reachable_computations(&flow_graph)
        .into_iter()
        .filter(|c| matches!(c, Computation::StaticCall { .. }))
        .collect();
    assert_eq!(static_calls.len(), 1);
    match &static_calls[0] {
        Computation::StaticCall { arguments, .. } => assert_eq!(arguments.len(), 3),
        _ => unreachable!(),
    }
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::Constant {
                literal: Instance::Smi(Function::CTOR_PHASE_ALL),
                ..
            }
        )),
        1
    );
    // The allocated object survives the call in its dedicated temp.
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::StoreLocal { local, .. } if local.name == ":allocated")
        }),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::LoadLocal { local, .. } if local.name == ":allocated")
        }),
        1
    );
}

#[test]
fn test_factory_constructor_becomes_static_call() {
    let mut types = TypeSystem::new();
    let list = types.register_class(Class::new("List", Some(TypeSystem::OBJECT)));
    let mut factory = Function::new("List.filled", list, AbstractType::dynamic());
    factory.kind = FunctionKind::Factory;
    factory.is_static = true;
    factory.num_fixed_parameters = 2;

    let mut parsed = ParsedFunction::new(static_function("make", 0));
    let root = parsed.root_scope();
    let allocated = parsed.add_stack_local(root, ":allocated", AbstractType::dynamic());
    let body = seq(
        Some(root),
        vec![ret(AstNode::ConstructorCall(ConstructorCallNode {
            token_pos: TokenPos(1),
            type_arguments: None,
            constructor: factory,
            arguments: ArgumentList::positional(vec![lit(3)]),
            allocated_object_var: allocated,
        }))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    // No allocation; the factory gets a synthesised leading
    // type-arguments operand.
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::AllocateObject { .. }
                | Computation::AllocateObjectWithBoundsCheck { .. }
        )),
        0
    );
    let static_calls: Vec<_> = reachable_computations(&flow_graph)
        .into_iter()
        .filter(|c| matches!(c, Computation::StaticCall { .. }))
        .collect();
    assert_eq!(static_calls.len(), 1);
    match &static_calls[0] {
        Computation::StaticCall { arguments, .. } => assert_eq!(arguments.len(), 2),
        _ => unreachable!(),
    }
}

#[test]
fn test_instance_setter_value_returns_assigned_value() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("set", 2));
    let root = parsed.root_scope();
    let o = parsed.add_parameter(root, "o", AbstractType::dynamic(), TokenPos(1));
    let v = parsed.add_parameter(root, "v", AbstractType::dynamic(), TokenPos(2));
    let body = seq(
        Some(root),
        vec![ret(AstNode::InstanceSetter(InstanceSetterNode {
            token_pos: TokenPos(3),
            receiver: Box::new(load(o)),
            field_name: "f".to_string(),
            value: Box::new(load(v)),
        }))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    // The assigned value funnels through the expression temp so the
    // setter expression can produce it.
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::InstanceSetter { .. }
        )),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::StoreLocal { local, .. } if local.name == ":expr_temp")
        }),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::LoadLocal { local, .. } if local.name == ":expr_temp")
        }),
        1
    );
}

#[test]
fn test_instance_getter_is_getter_dispatch() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("get", 1));
    let root = parsed.root_scope();
    let o = parsed.add_parameter(root, "o", AbstractType::dynamic(), TokenPos(1));
    let body = seq(
        Some(root),
        vec![ret(AstNode::InstanceGetter(InstanceGetterNode {
            token_pos: TokenPos(2),
            receiver: Box::new(load(o)),
            field_name: "f".to_string(),
        }))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    let calls: Vec<_> = reachable_computations(&flow_graph)
        .into_iter()
        .filter(|c| matches!(c, Computation::InstanceCall { .. }))
        .collect();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Computation::InstanceCall {
            function_name,
            token_kind,
            arguments,
            ..
        } => {
            assert_eq!(function_name, "get:f");
            assert_eq!(*token_kind, TokenKind::Get);
            assert_eq!(arguments.len(), 1);
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_unary_minus_dispatches_negate_selector() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("neg", 1));
    let root = parsed.root_scope();
    let x = parsed.add_parameter(root, "x", AbstractType::dynamic(), TokenPos(1));
    let body = seq(
        Some(root),
        vec![ret(AstNode::UnaryOp(UnaryOpNode {
            token_pos: TokenPos(2),
            kind: TokenKind::Sub,
            operand: Box::new(load(x)),
        }))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    let calls: Vec<_> = reachable_computations(&flow_graph)
        .into_iter()
        .filter(|c| matches!(c, Computation::InstanceCall { .. }))
        .collect();
    assert_eq!(calls.len(), 1);
    match &calls[0] {
        Computation::InstanceCall {
            function_name,
            checked_argument_count,
            ..
        } => {
            assert_eq!(function_name, "unary-");
            assert_eq!(*checked_argument_count, 1);
        }
        _ => unreachable!(),
    }
}

#[test]
fn test_array_literal_carries_element_type_operand() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("arr", 0));
    let root = parsed.root_scope();
    let body = seq(
        Some(root),
        vec![ret(AstNode::Array(ArrayNode {
            token_pos: TokenPos(1),
            type_arguments: None,
            elements: vec![lit(1), lit(2)],
        }))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    let creates: Vec<_> = reachable_computations(&flow_graph)
        .into_iter()
        .filter(|c| matches!(c, Computation::CreateArray { .. }))
        .collect();
    assert_eq!(creates.len(), 1);
    match &creates[0] {
        Computation::CreateArray { elements, .. } => assert_eq!(elements.len(), 2),
        _ => unreachable!(),
    }
}

#[test]
fn test_instantiator_plumbing_for_uninstantiated_type_test() {
    let mut types = TypeSystem::new();
    let boxed = types.register_class(Class::generic(
        "Box",
        Some(TypeSystem::OBJECT),
        vec![AbstractType::class_type(TypeSystem::OBJECT)],
        3,
    ));

    let mut method = Function::new("contains", boxed, AbstractType::dynamic());
    method.num_fixed_parameters = 2;
    let mut parsed = ParsedFunction::new(method);
    let root = parsed.root_scope();
    let this = parsed.add_parameter(root, "this", AbstractType::dynamic(), TokenPos(0));
    let o = parsed.add_parameter(root, "o", AbstractType::dynamic(), TokenPos(1));
    parsed.set_instantiator(load(this));

    let body = seq(
        Some(root),
        vec![ret(comparison(
            TokenKind::Is,
            load(o),
            type_node(AbstractType::type_parameter("T")),
        ))],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    // The uninstantiated test needs the receiver and its type-argument
    // vector: the receiver is preserved in the expression temp and its
    // vector loaded from the class's field.
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(c, Computation::InstanceOf { .. })),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::StoreLocal { local, .. } if local.name == ":expr_temp")
        }),
        1
    );
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::LoadVMField {
                offset_in_words: 3,
                ..
            }
        )),
        1
    );
}

#[test]
fn test_switch_chains_case_tests() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("dispatch", 2));
    let root = parsed.root_scope();
    let v = parsed.add_parameter(root, "v", AbstractType::dynamic(), TokenPos(1));
    let r = parsed.add_parameter(root, "r", AbstractType::dynamic(), TokenPos(2));
    let switch_label = parsed.add_label("switch", root, false);

    let case1 = AstNode::Case(CaseNode {
        token_pos: TokenPos(3),
        label: None,
        case_expressions: vec![comparison(TokenKind::EqStrict, load(v), lit(1))],
        contains_default: false,
        statements: Box::new(seq(None, vec![store(r, lit(10))])),
    });
    let case2 = AstNode::Case(CaseNode {
        token_pos: TokenPos(4),
        label: None,
        case_expressions: vec![comparison(TokenKind::EqStrict, load(v), lit(2))],
        contains_default: true,
        statements: Box::new(seq(None, vec![store(r, lit(20))])),
    });
    let body = seq(
        Some(root),
        vec![
            AstNode::Switch(SwitchNode {
                token_pos: TokenPos(2),
                label: switch_label,
                body: Box::new(seq(None, vec![case1, case2])),
            }),
            ret(load(r)),
        ],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    // One equality test per case expression.
    let branches = reachable_instrs(&flow_graph)
        .into_iter()
        .filter(|&id| matches!(flow_graph.graph.instr(id), Instr::Branch { .. }))
        .count();
    assert_eq!(branches, 2);
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::StrictCompare { .. }
        )),
        2
    );
}

#[test]
fn test_do_while_tests_after_body() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("once", 1));
    let root = parsed.root_scope();
    let c = parsed.add_parameter(root, "c", AbstractType::dynamic(), TokenPos(1));
    let n = parsed.add_stack_local(root, "n", AbstractType::dynamic());
    let label = parsed.add_label("loop", root, false);
    let body = seq(
        Some(root),
        vec![
            AstNode::DoWhile(DoWhileNode {
                token_pos: TokenPos(2),
                label,
                condition: Box::new(load(c)),
                body: Box::new(seq(None, vec![store(n, lit(1))])),
            }),
            ret(load(n)),
        ],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::CheckStackOverflow { .. }
        )),
        1
    );
    // The body entry join takes the fall-in edge and the back edge.
    let joins = join_entries(&flow_graph);
    assert_eq!(joins.len(), 1);
    assert_eq!(flow_graph.graph.block_info(joins[0]).predecessors.len(), 2);
}

#[test]
fn test_endless_for_with_break() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("spin", 0));
    let root = parsed.root_scope();
    let label = parsed.add_label("loop", root, false);
    let body = seq(
        Some(root),
        vec![
            AstNode::For(ForNode {
                token_pos: TokenPos(1),
                label,
                initializer: Box::new(seq(None, vec![])),
                condition: None,
                increment: Box::new(seq(None, vec![])),
                body: Box::new(seq(
                    None,
                    vec![AstNode::Jump(JumpNode {
                        token_pos: TokenPos(2),
                        kind: JumpKind::Break,
                        label,
                        inlined_finally_list: vec![],
                    })],
                )),
            }),
            ret(lit(0)),
        ],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    // The break materialises the loop's break join and control continues
    // to the return.
    assert!(!join_entries(&flow_graph).is_empty());
    let returns = reachable_instrs(&flow_graph)
        .into_iter()
        .filter(|&id| matches!(flow_graph.graph.instr(id), Instr::Return { .. }))
        .count();
    assert_eq!(returns, 1);
}

#[test]
fn test_break_runs_inlined_finally() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("leave", 0));
    let root = parsed.root_scope();
    let ctx = parsed.add_stack_local(root, ":saved_try_ctx", AbstractType::dynamic());
    let label = parsed.add_label("guarded", root, false);

    let jump = AstNode::Jump(JumpNode {
        token_pos: TokenPos(2),
        kind: JumpKind::Break,
        label,
        inlined_finally_list: vec![AstNode::InlinedFinally(InlinedFinallyNode {
            token_pos: TokenPos(3),
            context_var: ctx,
            finally_block: Box::new(seq(None, vec![store(ctx, lit(0))])),
        })],
    });
    let labelled = AstNode::Sequence(SequenceNode {
        token_pos: TokenPos(1),
        scope: None,
        nodes: vec![jump],
        label: Some(label),
    });
    let body = seq(Some(root), vec![labelled, ret(lit(0))]);
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    // The finally restores the saved context before the jump leaves.
    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::StoreContext { .. }
        )),
        1
    );
    // The finally body itself ran (its store is present).
    assert_eq!(
        count_computations(&flow_graph, |c| {
            matches!(c, Computation::StoreLocal { local, .. } if local.name == ":saved_try_ctx")
        }),
        1
    );
    assert_eq!(join_entries(&flow_graph).len(), 1);
}

#[test]
fn test_native_body_lowered_to_native_call() {
    let types = TypeSystem::new();
    let mut parsed = ParsedFunction::new(static_function("native", 0));
    let root = parsed.root_scope();
    let body = seq(
        Some(root),
        vec![
            AstNode::NativeBody(NativeBodyNode {
                token_pos: TokenPos(1),
                native_name: "Clock_now".to_string(),
            }),
            ret(lit(0)),
        ],
    );
    parsed.set_node_sequence(body);
    let flow_graph = build(&parsed, &types);

    assert_eq!(
        count_computations(&flow_graph, |c| matches!(
            c,
            Computation::NativeCall { native_name, .. } if native_name == "Clock_now"
        )),
        1
    );
}
