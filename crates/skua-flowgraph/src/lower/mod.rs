//! AST to fragment lowering
//!
//! Every node is visited in one of three roles with distinct result
//! contracts, carried by a single visitor struct tagged with [`Role`].
//! Effect discards the result, Value exposes it through
//! [`AstVisitor::take_value`], Test ends the fragment in a branch and
//! exposes the two successor slots for the caller to wire.

pub mod fragment;

mod expr;
mod stmt;

use crate::error::BuildResult;
use crate::graph::FlowGraphBuilder;
use crate::ir::{
    BlockInfo, BranchSide, BranchSlot, Computation, Instr, InstrId, TryIndex, Value,
};
use fragment::{append_fragment, Fragment};
use skua_ast::{AstNode, LocalVariable, ParsedFunction, TokenPos};
use skua_types::{AbstractType, Context, Instance, TypeSystem};

/// Visitation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    /// Result discarded; only side effects are emitted.
    Effect,
    /// Emit code producing a value.
    Value,
    /// Emit code ending in a branch.
    Test,
}

/// The completed result of a Test-role visitation
pub(crate) struct TestFragment {
    pub fragment: Fragment,
    pub true_slot: BranchSlot,
    pub false_slot: BranchSlot,
}

/// The AST visitor: builds one fragment in one role
pub(crate) struct AstVisitor<'a, 'b> {
    pub(crate) owner: &'b mut FlowGraphBuilder<'a>,
    role: Role,
    pub(crate) fragment: Fragment,
    value: Option<Value>,
    true_slot: Option<BranchSlot>,
    false_slot: Option<BranchSlot>,
    /// Position of the condition, for the AssertBoolean a Test emits.
    condition_token_pos: TokenPos,
}

impl<'a, 'b> AstVisitor<'a, 'b> {
    pub(crate) fn for_effect(owner: &'b mut FlowGraphBuilder<'a>, temp_index: usize) -> Self {
        Self::new(owner, Role::Effect, temp_index, TokenPos(0))
    }

    pub(crate) fn for_value(owner: &'b mut FlowGraphBuilder<'a>, temp_index: usize) -> Self {
        Self::new(owner, Role::Value, temp_index, TokenPos(0))
    }

    pub(crate) fn for_test(
        owner: &'b mut FlowGraphBuilder<'a>,
        temp_index: usize,
        condition_token_pos: TokenPos,
    ) -> Self {
        Self::new(owner, Role::Test, temp_index, condition_token_pos)
    }

    fn new(
        owner: &'b mut FlowGraphBuilder<'a>,
        role: Role,
        temp_index: usize,
        condition_token_pos: TokenPos,
    ) -> Self {
        Self {
            owner,
            role,
            fragment: Fragment::new(temp_index),
            value: None,
            true_slot: None,
            false_slot: None,
            condition_token_pos,
        }
    }

    pub(crate) fn parsed(&self) -> &'a ParsedFunction {
        self.owner.parsed_function
    }

    pub(crate) fn types(&self) -> &'a TypeSystem {
        self.owner.types
    }

    pub(crate) fn try_index(&self) -> TryIndex {
        self.owner.try_index
    }

    pub(crate) fn checks_enabled(&self) -> bool {
        self.owner.config.enable_type_checks
    }

    pub(crate) fn is_open(&self) -> bool {
        self.fragment.is_open()
    }

    /// Take the value produced by a Value-role visitation.
    pub(crate) fn take_value(&mut self) -> Value {
        self.value.take().expect("value visitation produced no value")
    }

    /// Finish a Test-role visitation.
    pub(crate) fn into_test(self) -> TestFragment {
        TestFragment {
            fragment: self.fragment,
            true_slot: self.true_slot.expect("test visitation emitted no branch"),
            false_slot: self.false_slot.expect("test visitation emitted no branch"),
        }
    }

    // --- fragment primitives ---

    pub(crate) fn append(&mut self, other: Fragment) {
        self.fragment.append(&mut self.owner.graph, other);
    }

    /// Emit a value-producing computation and return a use of it.
    pub(crate) fn bind(&mut self, comp: Computation) -> Value {
        assert!(self.fragment.is_open());
        self.fragment.temp_index -= comp.input_count();
        let temp = self.fragment.temp_index;
        self.fragment.temp_index += 1;
        let bind = self.owner.graph.alloc(Instr::Bind {
            comp,
            temp_index: Some(temp),
            ssa_temp_index: None,
            successor: None,
            previous: None,
            env: None,
        });
        self.link(bind);
        Value::use_of(bind)
    }

    /// Emit a computation for effect only.
    pub(crate) fn do_(&mut self, comp: Computation) {
        assert!(self.fragment.is_open());
        self.fragment.temp_index -= comp.input_count();
        let instr = self.owner.graph.alloc(Instr::Do {
            comp,
            successor: None,
            previous: None,
            env: None,
        });
        self.link(instr);
    }

    /// Append a pre-built instruction (block entries, terminators).
    pub(crate) fn add_instruction(&mut self, instr: InstrId) {
        assert!(self.fragment.is_open());
        let kind = self.owner.graph.instr(instr);
        assert!(!matches!(kind, Instr::Do { .. } | Instr::Bind { .. }));
        assert!(!kind.is_definition());
        self.fragment.temp_index -= kind.input_count();
        self.link(instr);
    }

    fn link(&mut self, instr: InstrId) {
        if self.fragment.is_empty() {
            self.fragment.entry = Some(instr);
        } else {
            let exit = self.fragment.exit.expect("fragment is open");
            self.owner.graph.set_successor(exit, instr);
        }
        self.fragment.exit = Some(instr);
    }

    pub(crate) fn close_fragment(&mut self) {
        self.fragment.close();
    }

    /// Compose a branch diamond: append the test, wire fresh target
    /// entries into its successor slots, append each arm, and join or
    /// select whichever arm exits survive.
    pub(crate) fn join(&mut self, test: TestFragment, true_frag: Fragment, false_frag: Fragment) {
        assert!(self.fragment.is_open());
        let true_temp = true_frag.temp_index;
        let false_temp = false_frag.temp_index;
        self.append(test.fragment);

        let graph = &mut self.owner.graph;
        let true_entry = graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        graph.set_branch_target(test.true_slot, true_entry);
        let true_exit = append_fragment(graph, true_entry, true_frag);

        let false_entry = graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        graph.set_branch_target(test.false_slot, false_entry);
        let false_exit = append_fragment(graph, false_entry, false_frag);

        match (true_exit, false_exit) {
            (None, exit) => {
                self.fragment.exit = exit;
                if exit.is_some() {
                    self.fragment.temp_index = false_temp;
                }
            }
            (Some(true_exit), None) => {
                self.fragment.exit = Some(true_exit);
                self.fragment.temp_index = true_temp;
            }
            (Some(true_exit), Some(false_exit)) => {
                let join = graph.alloc(Instr::JoinEntry {
                    block: BlockInfo::new(),
                    phis: None,
                    successor: None,
                });
                graph.set_successor(true_exit, join);
                graph.set_successor(false_exit, join);
                assert_eq!(true_temp, false_temp);
                self.fragment.exit = Some(join);
                self.fragment.temp_index = true_temp;
            }
        }
    }

    /// Compose a top-tested loop from a test and a body fragment.
    pub(crate) fn tie_loop(&mut self, test: TestFragment, body: Fragment) {
        assert!(self.fragment.is_open());

        let body_entry = self.owner.graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        self.owner.graph.set_branch_target(test.true_slot, body_entry);
        let body_exit = append_fragment(&mut self.owner.graph, body_entry, body);

        let test_entry = test.fragment.entry;
        match body_exit {
            None => self.append(test.fragment),
            Some(body_exit) => {
                let join = self.owner.graph.alloc(Instr::JoinEntry {
                    block: BlockInfo::new(),
                    phis: None,
                    successor: None,
                });
                self.add_instruction(join);
                let graph = &mut self.owner.graph;
                graph.set_successor(join, test_entry.expect("loop test must emit code"));
                graph.set_successor(body_exit, join);
            }
        }

        let loop_exit = self.owner.graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        self.owner.graph.set_branch_target(test.false_slot, loop_exit);
        self.fragment.exit = Some(loop_exit);
    }

    // --- role contracts ---

    /// Close the visitation with a computation: emitted for effect,
    /// bound to a value, or bound and branched on, depending on the role.
    pub(crate) fn return_computation(&mut self, comp: Computation) -> BuildResult<()> {
        match self.role {
            Role::Effect => {
                self.do_(comp);
                Ok(())
            }
            Role::Value | Role::Test => {
                let value = self.bind(comp);
                self.return_value(value)
            }
        }
    }

    /// Close the visitation with an already-computed value.
    pub(crate) fn return_value(&mut self, value: Value) -> BuildResult<()> {
        match self.role {
            Role::Effect => unreachable!("effect visitation has no value contract"),
            Role::Value => {
                self.value = Some(value);
                Ok(())
            }
            Role::Test => {
                let mut value = value;
                if self.checks_enabled() {
                    value = self.bind(Computation::AssertBoolean {
                        token_pos: self.condition_token_pos,
                        try_index: self.try_index(),
                        value,
                    });
                }
                let branch = self.owner.graph.alloc(Instr::Branch {
                    value,
                    true_successor: None,
                    false_successor: None,
                    previous: None,
                    env: None,
                });
                self.add_instruction(branch);
                self.close_fragment();
                self.true_slot = Some(BranchSlot {
                    branch,
                    side: BranchSide::True,
                });
                self.false_slot = Some(BranchSlot {
                    branch,
                    side: BranchSide::False,
                });
                Ok(())
            }
        }
    }

    pub(crate) fn is_effect(&self) -> bool {
        self.role == Role::Effect
    }

    // --- child visitations ---

    pub(crate) fn visit_for_effect(&mut self, node: &AstNode) -> BuildResult<Fragment> {
        let mut visitor = AstVisitor::for_effect(&mut *self.owner, self.fragment.temp_index);
        visitor.visit(node)?;
        Ok(visitor.fragment)
    }

    pub(crate) fn visit_for_value(&mut self, node: &AstNode) -> BuildResult<(Fragment, Value)> {
        let mut visitor = AstVisitor::for_value(&mut *self.owner, self.fragment.temp_index);
        visitor.visit(node)?;
        let value = visitor.take_value();
        Ok((visitor.fragment, value))
    }

    pub(crate) fn visit_for_test(&mut self, node: &AstNode) -> BuildResult<TestFragment> {
        let mut visitor = AstVisitor::for_test(
            &mut *self.owner,
            self.fragment.temp_index,
            node.token_pos(),
        );
        visitor.visit(node)?;
        Ok(visitor.into_test())
    }

    /// Evaluate each argument for value and append the results.
    pub(crate) fn translate_argument_list(
        &mut self,
        arguments: &skua_ast::ArgumentList,
        values: &mut Vec<Value>,
    ) -> BuildResult<()> {
        for argument in &arguments.nodes {
            let (fragment, value) = self.visit_for_value(argument)?;
            self.append(fragment);
            values.push(value);
        }
        Ok(())
    }

    // --- dispatch ---

    pub(crate) fn visit(&mut self, node: &AstNode) -> BuildResult<()> {
        match node {
            AstNode::Sequence(n) => self.visit_sequence(n),
            AstNode::Return(n) => self.visit_return(n),
            AstNode::Literal(n) => self.visit_literal(n),
            AstNode::Type(_) => unreachable!("type nodes are handled by their comparison"),
            AstNode::Assignable(n) => self.visit_assignable(n),
            AstNode::BinaryOp(n) => self.visit_binary_op(n),
            AstNode::UnaryOp(n) => self.visit_unary_op(n),
            AstNode::Comparison(n) => self.visit_comparison(n),
            AstNode::Conditional(n) => self.visit_conditional(n),
            AstNode::If(n) => self.visit_if(n),
            AstNode::Switch(n) => self.visit_switch(n),
            AstNode::Case(n) => self.visit_case(n),
            AstNode::While(n) => self.visit_while(n),
            AstNode::DoWhile(n) => self.visit_do_while(n),
            AstNode::For(n) => self.visit_for(n),
            AstNode::Jump(n) => self.visit_jump(n),
            AstNode::Array(n) => self.visit_array(n),
            AstNode::Closure(n) => self.visit_closure(n),
            AstNode::InstanceCall(n) => self.visit_instance_call(n),
            AstNode::StaticCall(n) => self.visit_static_call(n),
            AstNode::ClosureCall(n) => self.visit_closure_call(n),
            AstNode::CloneContext(n) => self.visit_clone_context(n),
            AstNode::ConstructorCall(n) => self.visit_constructor_call(n),
            AstNode::InstanceGetter(n) => self.visit_instance_getter(n),
            AstNode::InstanceSetter(n) => self.visit_instance_setter(n),
            AstNode::StaticGetter(n) => self.visit_static_getter(n),
            AstNode::StaticSetter(n) => self.visit_static_setter(n),
            AstNode::NativeBody(n) => self.visit_native_body(n),
            AstNode::LoadLocal(n) => self.visit_load_local(n),
            AstNode::StoreLocal(n) => self.visit_store_local(n),
            AstNode::LoadInstanceField(n) => self.visit_load_instance_field(n),
            AstNode::StoreInstanceField(n) => self.visit_store_instance_field(n),
            AstNode::LoadStaticField(n) => self.visit_load_static_field(n),
            AstNode::StoreStaticField(n) => self.visit_store_static_field(n),
            AstNode::LoadIndexed(n) => self.visit_load_indexed(n),
            AstNode::StoreIndexed(n) => self.visit_store_indexed(n),
            AstNode::TryCatch(n) => self.visit_try_catch(n),
            AstNode::CatchClause(n) => self.visit_catch_clause(n),
            AstNode::InlinedFinally(n) => self.visit_inlined_finally(n),
            AstNode::Throw(n) => self.visit_throw(n),
        }
    }

    // --- local variables and contexts ---

    /// Build the computation that reads `local`, walking the context
    /// chain for captured variables.
    pub(crate) fn build_load_local(&mut self, local: &LocalVariable) -> Computation {
        if local.is_captured {
            let owner_level = self.parsed().scope(local.owner).context_level;
            let delta = self.owner.context_level - owner_level;
            let mut context = self.bind(Computation::CurrentContext {
                token_pos: local.token_pos,
            });
            for _ in 0..delta {
                context = self.bind(Computation::LoadVMField {
                    object: context,
                    offset_in_words: Context::parent_offset(),
                    ty: None,
                });
            }
            Computation::LoadVMField {
                object: context,
                offset_in_words: Context::variable_offset(local.context_slot()),
                ty: Some(local.ty.clone()),
            }
        } else {
            Computation::LoadLocal {
                local: local.clone(),
                context_level: self.owner.context_level,
            }
        }
    }

    /// Build the computation that writes `value` into `local`.
    pub(crate) fn build_store_local(&mut self, local: &LocalVariable, value: Value) -> Computation {
        if local.is_captured {
            let owner_level = self.parsed().scope(local.owner).context_level;
            let delta = self.owner.context_level - owner_level;
            let mut context = self.bind(Computation::CurrentContext {
                token_pos: local.token_pos,
            });
            for _ in 0..delta {
                context = self.bind(Computation::LoadVMField {
                    object: context,
                    offset_in_words: Context::parent_offset(),
                    ty: None,
                });
            }
            Computation::StoreVMField {
                object: context,
                offset_in_words: Context::variable_offset(local.context_slot()),
                value,
                ty: Some(local.ty.clone()),
            }
        } else {
            Computation::StoreLocal {
                local: local.clone(),
                value,
                context_level: self.owner.context_level,
            }
        }
    }

    /// Store the current context into `variable`.
    pub(crate) fn build_store_context(&mut self, variable: &LocalVariable) {
        let context = self.bind(Computation::CurrentContext {
            token_pos: variable.token_pos,
        });
        let store = self.build_store_local(variable, context);
        self.do_(store);
    }

    /// Load the context saved in `variable` back into the context
    /// register.
    pub(crate) fn build_load_context(&mut self, variable: &LocalVariable) {
        let load = self.build_load_local(variable);
        let saved = self.bind(load);
        self.do_(Computation::StoreContext { value: saved });
    }

    /// Pop one context off the chain.
    pub(crate) fn unchain_context(&mut self) {
        let context = self.bind(Computation::CurrentContext {
            token_pos: TokenPos(0),
        });
        let parent = self.bind(Computation::LoadVMField {
            object: context,
            offset_in_words: Context::parent_offset(),
            ty: None,
        });
        self.do_(Computation::StoreContext { value: parent });
    }

    pub(crate) fn expression_temp(&self) -> LocalVariable {
        let parsed = self.parsed();
        parsed.variable(parsed.expression_temp_var()).clone()
    }

    // --- type checks ---

    pub(crate) fn build_null_value(&mut self) -> Value {
        self.bind(Computation::Constant {
            token_pos: TokenPos(0),
            literal: Instance::Null,
        })
    }

    /// Static type of a value, when one is known at the use site.
    pub(crate) fn static_type_of(&self, value: &Value) -> Option<AbstractType> {
        let types = self.types();
        match value {
            Value::Constant { literal } => Some(types.type_of(literal)),
            Value::Use { definition } => match self.owner.graph.instr(*definition) {
                Instr::Bind { comp, .. } => match comp {
                    Computation::Constant { literal, .. } => Some(types.type_of(literal)),
                    Computation::LoadLocal { local, .. }
                    | Computation::StoreLocal { local, .. } => Some(local.ty.clone()),
                    Computation::AssertAssignable { dst_type, .. } => Some(dst_type.clone()),
                    Computation::AssertBoolean { .. }
                    | Computation::BooleanNegate { .. }
                    | Computation::InstanceOf { .. }
                    | Computation::StrictCompare { .. }
                    | Computation::EqualityCompare { .. }
                    | Computation::RelationalOp { .. } => Some(types.bool_type()),
                    _ => None,
                },
                _ => None,
            },
        }
    }

    /// Build the type check for an assignment or cast of `value` to
    /// `dst_type`.
    pub(crate) fn build_assert_assignable(
        &mut self,
        token_pos: TokenPos,
        value: Value,
        dst_type: &AbstractType,
        dst_name: &str,
    ) -> BuildResult<Computation> {
        let (instantiator, instantiator_type_arguments) = if dst_type.is_instantiated() {
            (self.build_null_value(), self.build_null_value())
        } else {
            self.build_typecheck_arguments(token_pos)?
        };
        Ok(Computation::AssertAssignable {
            token_pos,
            try_index: self.try_index(),
            value,
            instantiator,
            instantiator_type_arguments,
            dst_type: dst_type.clone(),
            dst_name: dst_name.to_string(),
        })
    }

    /// The checked value of an assignment; the check is elided when static
    /// analysis already guarantees it.
    pub(crate) fn build_assignable_value(
        &mut self,
        token_pos: TokenPos,
        value: Value,
        dst_type: &AbstractType,
        dst_name: &str,
    ) -> BuildResult<Value> {
        let static_type = self.static_type_of(&value);
        if crate::elide::can_skip_type_check(
            static_type.as_ref(),
            dst_type,
            self.types(),
            &self.owner.config,
        ) {
            return Ok(value);
        }
        let comp = self.build_assert_assignable(token_pos, value, dst_type, dst_name)?;
        Ok(self.bind(comp))
    }
}
