//! Statement lowering
//!
//! Sequences (with context allocation and entry checks), conditionals,
//! loops, switch/case chains, jumps with finally inlining, try/catch and
//! return.

use super::fragment::{append_fragment, Fragment};
use super::AstVisitor;
use crate::elide::can_skip_type_check;
use crate::error::BuildResult;
use crate::ir::{BlockInfo, Computation, Instr, InstrId};
use skua_ast::{
    AstNode, CaseNode, CatchClauseNode, DoWhileNode, ForNode, IfNode, InlinedFinallyNode,
    JumpKind, JumpNode, LocalVariable, ReturnNode, SequenceNode, SwitchNode, TryCatchNode,
    VarIndex, WhileNode,
};
use skua_types::Instance;

impl<'a, 'b> AstVisitor<'a, 'b> {
    /// Whether `node` is the outermost function body whose entry context
    /// must be saved rather than chained.
    fn must_save_restore_context(&self, node: &SequenceNode) -> bool {
        self.is_function_body(node) && self.parsed().saved_context_var().is_some()
    }

    fn is_function_body(&self, node: &SequenceNode) -> bool {
        match self.parsed().node_sequence() {
            AstNode::Sequence(body) => std::ptr::eq(node, body),
            _ => false,
        }
    }

    pub(super) fn visit_sequence(&mut self, node: &SequenceNode) -> BuildResult<()> {
        assert!(self.is_effect());
        let parsed = self.parsed();
        let num_context_variables = node
            .scope
            .map(|s| parsed.scope(s).num_context_variables)
            .unwrap_or(0);
        let previous_context_level = self.owner.context_level;

        if num_context_variables > 0 {
            // The scope declares captured variables; allocate and chain a
            // fresh context.
            let scope = node.scope.expect("context variables imply a scope");
            let allocated_context = self.bind(Computation::AllocateContext {
                token_pos: node.token_pos,
                try_index: self.try_index(),
                num_context_variables,
            });

            // The entry context of a non-closure function is not
            // accessible from the body, so it is saved in a dedicated
            // slot instead of being linked as the new context's parent.
            if self.must_save_restore_context(node) {
                let current_context = self.bind(Computation::CurrentContext {
                    token_pos: node.token_pos,
                });
                let saved_var = self
                    .parsed()
                    .variable(self.parsed().saved_context_var().unwrap())
                    .clone();
                let store = self.build_store_local(&saved_var, current_context);
                self.do_(store);
                let null_context = self.bind(Computation::Constant {
                    token_pos: node.token_pos,
                    literal: Instance::Null,
                });
                self.do_(Computation::StoreContext {
                    value: null_context,
                });
            }

            self.do_(Computation::ChainContext {
                context: allocated_context,
            });
            self.owner.context_level = self.parsed().scope(scope).context_level;

            // Copy captured formals from their frame slots into the fresh
            // context, then null the frame slots so stale values cannot be
            // observed and the originals can be collected.
            if self.is_function_body(node) {
                assert_eq!(self.parsed().scope(scope).context_level, 1);
                let num_params = self.parsed().function().num_parameters();
                for pos in 0..num_params {
                    let parameter = self.parsed().parameter(pos).clone();
                    if !parameter.is_captured {
                        continue;
                    }
                    let original = LocalVariable::new(
                        format!("{}-orig", parameter.name),
                        skua_types::AbstractType::dynamic(),
                        parameter.token_pos,
                        parameter.owner,
                        VarIndex::Parameter(pos),
                    );
                    let load = self.build_load_local(&original);
                    let value = self.bind(load);
                    let store = self.build_store_local(&parameter, value);
                    self.do_(store);
                    let null_constant = self.bind(Computation::Constant {
                        token_pos: node.token_pos,
                        literal: Instance::Null,
                    });
                    let store = self.build_store_local(&original, null_constant);
                    self.do_(store);
                }
            }
        }

        // Under strict checks the checkable formals are verified on entry.
        if self.checks_enabled() && self.is_function_body(node) {
            let function = self.parsed().function();
            let num_params = function.num_parameters();
            let mut pos = if function.is_constructor() {
                // Skip the receiver and the construction phase.
                2
            } else if function.is_factory() || function.is_dynamic_function() {
                // Skip the type-argument vector or the receiver.
                1
            } else {
                0
            };
            while pos < num_params {
                let parameter = self.parsed().parameter(pos).clone();
                if !can_skip_type_check(None, &parameter.ty, self.types(), &self.owner.config) {
                    let load = self.build_load_local(&parameter);
                    let value = self.bind(load);
                    let check = self.build_assert_assignable(
                        parameter.token_pos,
                        value,
                        &parameter.ty,
                        &parameter.name,
                    )?;
                    self.do_(check);
                }
                pos += 1;
            }
        }

        let mut i = 0;
        while self.is_open() && i < node.nodes.len() {
            let fragment = self.visit_for_effect(&node.nodes[i])?;
            self.append(fragment);
            i += 1;
        }

        if self.is_open() {
            if self.must_save_restore_context(node) {
                assert!(num_context_variables > 0);
                let saved_var = self
                    .parsed()
                    .variable(self.parsed().saved_context_var().unwrap())
                    .clone();
                self.build_load_context(&saved_var);
            } else if num_context_variables > 0 {
                self.unchain_context();
            }
        }

        // A break out of a labelled sequence has already unchained the
        // context on its way here.
        if let Some(label) = node.label {
            assert!(self.owner.join_for_continue(label).is_none());
            if let Some(break_join) = self.owner.join_for_break(label) {
                if self.is_open() {
                    self.add_instruction(break_join);
                } else {
                    self.fragment.exit = Some(break_join);
                }
            }
        }

        self.owner.context_level = previous_context_level;
        Ok(())
    }

    pub(super) fn visit_return(&mut self, node: &ReturnNode) -> BuildResult<()> {
        let (value_fragment, return_value) = self.visit_for_value(&node.value)?;
        self.append(value_fragment);

        for inlined_finally in &node.inlined_finally_list {
            let fragment = self.visit_for_effect(inlined_finally)?;
            self.append(fragment);
            if !self.is_open() {
                return Ok(());
            }
        }

        let mut return_value = return_value;
        if self.checks_enabled() {
            let function = self.parsed().function();
            // Implicit getters return the field value and need no check,
            // unless they compute a static field's initial value.
            if function.is_static || !function.is_implicit_getter() {
                let dst_type = function.result_type.clone();
                return_value = self.build_assignable_value(
                    node.value.token_pos(),
                    return_value,
                    &dst_type,
                    "function result",
                )?;
            }
        }

        let current_context_level = self.owner.context_level;
        if let Some(saved) = self.parsed().saved_context_var() {
            // CTX on entry was saved, not linked as a context parent.
            let saved_var = self.parsed().variable(saved).clone();
            self.build_load_context(&saved_var);
        } else {
            for _ in 0..current_context_level {
                self.unchain_context();
            }
        }

        let ret = self.owner.graph.alloc(Instr::Return {
            token_pos: node.token_pos,
            value: return_value,
            previous: None,
            env: None,
        });
        self.add_instruction(ret);
        self.close_fragment();
        Ok(())
    }

    pub(super) fn visit_if(&mut self, node: &IfNode) -> BuildResult<()> {
        let test = self.visit_for_test(&node.condition)?;
        let for_true = self.visit_for_effect(&node.true_branch)?;
        let for_false = match &node.false_branch {
            Some(false_branch) => self.visit_for_effect(false_branch)?,
            None => Fragment::new(self.fragment.temp_index),
        };
        self.join(test, for_true, for_false);
        Ok(())
    }

    pub(super) fn visit_switch(&mut self, node: &SwitchNode) -> BuildResult<()> {
        let body = self.visit_for_effect(&node.body)?;
        self.append(body);
        if let Some(break_join) = self.owner.join_for_break(node.label) {
            if self.is_open() {
                self.add_instruction(break_join);
            } else {
                self.fragment.exit = Some(break_join);
            }
        }
        // A continue targets a case label, never the switch itself.
        assert!(self.owner.join_for_continue(node.label).is_none());
        Ok(())
    }

    // A case node composes a chain of expression tests whose true arms
    // converge on the shared statement block; the final false arm feeds
    // the statements (with a default) or the case exit (without).
    pub(super) fn visit_case(&mut self, node: &CaseNode) -> BuildResult<()> {
        let len = node.case_expressions.len();
        let needs_join_at_statement_entry = len > 1 || (len > 0 && node.contains_default);

        // A labelled continue from another case enters at the statements.
        let statement_start = match node.label {
            Some(label) if self.parsed().label(label).is_continue_target => {
                self.owner.ensure_join_for_continue(label)
            }
            _ if needs_join_at_statement_entry => self.owner.graph.alloc(Instr::JoinEntry {
                block: BlockInfo::new(),
                phis: None,
                successor: None,
            }),
            _ => self.owner.graph.alloc(Instr::TargetEntry {
                block: BlockInfo::new(),
                try_index: None,
                successor: None,
            }),
        };

        let case_statements = {
            let mut for_case_statements =
                AstVisitor::for_effect(&mut *self.owner, self.fragment.temp_index);
            for_case_statements.add_instruction(statement_start);
            for_case_statements.visit(&node.statements)?;
            for_case_statements.fragment
        };

        if self.is_open() && len == 0 {
            assert!(node.contains_default);
            self.append(case_statements);
            return Ok(());
        }

        // Translate the case expressions and collect their successor
        // slots for wiring.
        let mut case_true_slots = Vec::with_capacity(len);
        let mut case_false_slots = Vec::with_capacity(len);
        let mut case_entries: Vec<Option<InstrId>> = Vec::with_capacity(len);
        for (i, case_expr) in node.case_expressions.iter().enumerate() {
            if i == 0 {
                case_entries.push(None);
                let test = self.visit_for_test(case_expr)?;
                // Only the first test is appended; the rest chain off it.
                case_true_slots.push(test.true_slot);
                case_false_slots.push(test.false_slot);
                self.append(test.fragment);
            } else {
                let case_entry = self.owner.graph.alloc(Instr::TargetEntry {
                    block: BlockInfo::new(),
                    try_index: None,
                    successor: None,
                });
                case_entries.push(Some(case_entry));
                let mut for_case_expression = AstVisitor::for_test(
                    &mut *self.owner,
                    self.fragment.temp_index,
                    case_expr.token_pos(),
                );
                for_case_expression.add_instruction(case_entry);
                for_case_expression.visit(case_expr)?;
                let test = for_case_expression.into_test();
                case_true_slots.push(test.true_slot);
                case_false_slots.push(test.false_slot);
            }
        }

        // Appending a test closed this fragment.
        assert!(!self.is_open());

        // Chain every test's false arm to the next test; true arms go to
        // the statements.
        let graph = &mut self.owner.graph;
        for i in 0..len.saturating_sub(1) {
            assert!(needs_join_at_statement_entry);
            graph.set_branch_target(case_false_slots[i], case_entries[i + 1].unwrap());
            let true_target = graph.alloc(Instr::TargetEntry {
                block: BlockInfo::new(),
                try_index: None,
                successor: None,
            });
            graph.set_branch_target(case_true_slots[i], true_target);
            graph.set_successor(true_target, statement_start);
        }

        let mut exit_instruction = None;
        if len > 0 {
            if matches!(graph.instr(statement_start), Instr::TargetEntry { .. }) {
                graph.set_branch_target(case_true_slots[len - 1], statement_start);
            } else {
                let true_target = graph.alloc(Instr::TargetEntry {
                    block: BlockInfo::new(),
                    try_index: None,
                    successor: None,
                });
                graph.set_branch_target(case_true_slots[len - 1], true_target);
                graph.set_successor(true_target, statement_start);
            }
            let false_target = graph.alloc(Instr::TargetEntry {
                block: BlockInfo::new(),
                try_index: None,
                successor: None,
            });
            graph.set_branch_target(case_false_slots[len - 1], false_target);
            if node.contains_default {
                // Both arms reach the statements.
                graph.set_successor(false_target, statement_start);
                if case_statements.is_open() {
                    let exit = graph.alloc(Instr::TargetEntry {
                        block: BlockInfo::new(),
                        try_index: None,
                        successor: None,
                    });
                    graph.set_successor(case_statements.exit.unwrap(), exit);
                    exit_instruction = Some(exit);
                }
            } else {
                let exit = if case_statements.is_open() {
                    let exit = graph.alloc(Instr::JoinEntry {
                        block: BlockInfo::new(),
                        phis: None,
                        successor: None,
                    });
                    graph.set_successor(case_statements.exit.unwrap(), exit);
                    exit
                } else {
                    graph.alloc(Instr::TargetEntry {
                        block: BlockInfo::new(),
                        try_index: None,
                        successor: None,
                    })
                };
                graph.set_successor(false_target, exit);
                exit_instruction = Some(exit);
            }
        } else {
            // A case node without expressions must hold the default.
            assert!(node.contains_default);
            self.add_instruction(statement_start);
        }

        assert!(!self.is_open());
        self.fragment.exit = exit_instruction;
        Ok(())
    }

    pub(super) fn visit_while(&mut self, node: &WhileNode) -> BuildResult<()> {
        let test = self.visit_for_test(&node.condition)?;
        assert!(!test.fragment.is_empty());

        let body = {
            let mut for_body = AstVisitor::for_effect(&mut *self.owner, self.fragment.temp_index);
            for_body.do_(Computation::CheckStackOverflow {
                token_pos: node.token_pos,
                try_index: for_body.try_index(),
            });
            for_body.visit(&node.body)?;
            for_body.fragment
        };

        // Jump joins exist only after the body has been traversed.
        if let Some(continue_join) = self.owner.join_for_continue(node.label) {
            self.add_instruction(continue_join);
        }
        self.tie_loop(test, body);
        if let Some(break_join) = self.owner.join_for_break(node.label) {
            self.add_instruction(break_join);
        }
        Ok(())
    }

    pub(super) fn visit_do_while(&mut self, node: &DoWhileNode) -> BuildResult<()> {
        // Traverse the body first so continue and break joins exist.
        let body = {
            let mut for_body = AstVisitor::for_effect(&mut *self.owner, self.fragment.temp_index);
            for_body.do_(Computation::CheckStackOverflow {
                token_pos: node.token_pos,
                try_index: for_body.try_index(),
            });
            for_body.visit(&node.body)?;
            for_body.fragment
        };
        let body_was_open = body.is_open();

        let test = self.visit_for_test(&node.condition)?;
        assert!(self.is_open());

        let body_entry_join = self.owner.graph.alloc(Instr::JoinEntry {
            block: BlockInfo::new(),
            phis: None,
            successor: None,
        });
        self.add_instruction(body_entry_join);
        let body_exit = append_fragment(&mut self.owner.graph, body_entry_join, body);

        let continue_join = self.owner.join_for_continue(node.label);
        if body_was_open || continue_join.is_some() {
            let graph = &mut self.owner.graph;
            let test_entry = continue_join.unwrap_or_else(|| {
                graph.alloc(Instr::TargetEntry {
                    block: BlockInfo::new(),
                    try_index: None,
                    successor: None,
                })
            });
            graph.set_successor(test_entry, test.fragment.entry.expect("test emits code"));
            if let Some(body_exit) = body_exit {
                graph.set_successor(body_exit, test_entry);
            }
        }

        let graph = &mut self.owner.graph;
        let back_target = graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        graph.set_branch_target(test.true_slot, back_target);
        graph.set_successor(back_target, body_entry_join);
        let loop_exit = graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        graph.set_branch_target(test.false_slot, loop_exit);
        match self.owner.join_for_break(node.label) {
            None => self.fragment.exit = Some(loop_exit),
            Some(break_join) => {
                self.owner.graph.set_successor(loop_exit, break_join);
                self.fragment.exit = Some(break_join);
            }
        }
        Ok(())
    }

    // 'break' joins at the loop exit, 'continue' joins at the increment.
    pub(super) fn visit_for(&mut self, node: &ForNode) -> BuildResult<()> {
        let initializer = self.visit_for_effect(&node.initializer)?;
        self.append(initializer);
        assert!(self.is_open());

        // Compose the body first to materialise any jump joins.
        let body_entry = self.owner.graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        let mut body = {
            let mut for_body = AstVisitor::for_effect(&mut *self.owner, self.fragment.temp_index);
            for_body.add_instruction(body_entry);
            for_body.do_(Computation::CheckStackOverflow {
                token_pos: node.token_pos,
                try_index: for_body.try_index(),
            });
            for_body.visit(&node.body)?;
            for_body.fragment
        };
        assert!(!body.is_empty());

        let continue_join = self.owner.join_for_continue(node.label);
        let loop_increment_end = if continue_join.is_none() && body.is_open() {
            // Grow the body with the increment; no extra block needed.
            let increment = self.visit_for_effect(&node.increment)?;
            body.append(&mut self.owner.graph, increment);
            let end = body.exit;
            assert!(end.is_some());
            end
        } else if let Some(continue_join) = continue_join {
            // The increment starts at the continue join.
            if body.is_open() {
                self.owner
                    .graph
                    .set_successor(body.exit.unwrap(), continue_join);
            }
            let mut for_increment =
                AstVisitor::for_effect(&mut *self.owner, self.fragment.temp_index);
            for_increment.add_instruction(continue_join);
            for_increment.visit(&node.increment)?;
            let end = for_increment.fragment.exit;
            assert!(end.is_some());
            end
        } else {
            // No backward branch exists at all.
            assert!(!body.is_open());
            None
        };

        if let Some(loop_increment_end) = loop_increment_end {
            let loop_start = self.owner.graph.alloc(Instr::JoinEntry {
                block: BlockInfo::new(),
                phis: None,
                successor: None,
            });
            self.add_instruction(loop_start);
            self.owner.graph.set_successor(loop_increment_end, loop_start);
        }

        match &node.condition {
            None => {
                // Endless loop.
                self.append(body);
                match self.owner.join_for_break(node.label) {
                    None => self.close_fragment(),
                    Some(break_join) => self.fragment.exit = Some(break_join),
                }
            }
            Some(condition) => {
                let loop_exit = self.owner.graph.alloc(Instr::TargetEntry {
                    block: BlockInfo::new(),
                    try_index: None,
                    successor: None,
                });
                let test = self.visit_for_test(condition)?;
                let true_slot = test.true_slot;
                let false_slot = test.false_slot;
                self.append(test.fragment);
                self.owner.graph.set_branch_target(true_slot, body_entry);
                self.owner.graph.set_branch_target(false_slot, loop_exit);
                match self.owner.join_for_break(node.label) {
                    None => self.fragment.exit = Some(loop_exit),
                    Some(break_join) => {
                        self.owner.graph.set_successor(loop_exit, break_join);
                        self.fragment.exit = Some(break_join);
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) fn visit_jump(&mut self, node: &JumpNode) -> BuildResult<()> {
        for inlined_finally in &node.inlined_finally_list {
            let fragment = self.visit_for_effect(inlined_finally)?;
            self.append(fragment);
            if !self.is_open() {
                return Ok(());
            }
        }

        // Unchain down to the outer context level of the scope holding
        // the target label.
        let parsed = self.parsed();
        let label = parsed.label(node.label);
        let mut target_context_level = 0;
        let target_scope = label.owner;
        if parsed.scope(target_scope).num_context_variables > 0 {
            // The label's scope allocates a context, so its outer scope is
            // one level down.
            target_context_level = parsed.scope(target_scope).context_level - 1;
        } else {
            let mut scope = Some(target_scope);
            while let Some(id) = scope {
                if parsed.scope(id).num_context_variables > 0 {
                    break;
                }
                scope = parsed.scope(id).parent;
            }
            if let Some(id) = scope {
                target_context_level = parsed.scope(id).context_level;
            }
        }
        let current_context_level = self.owner.context_level;
        assert!(current_context_level >= target_context_level);
        for _ in target_context_level..current_context_level {
            self.unchain_context();
        }

        let jump_target = match node.kind {
            JumpKind::Break => self.owner.ensure_join_for_break(node.label),
            JumpKind::Continue => self.owner.ensure_join_for_continue(node.label),
        };
        self.add_instruction(jump_target);
        self.close_fragment();
        Ok(())
    }

    pub(super) fn visit_try_catch(&mut self, node: &TryCatchNode) -> BuildResult<()> {
        let old_try_index = self.owner.try_index;
        let try_index = self.owner.allocate_try_index();
        self.owner.try_index = Some(try_index);

        // Preserve CTX across the protected region.
        let context_var = self.parsed().variable(node.context_var).clone();
        self.build_store_context(&context_var);

        let try_fragment = self.visit_for_effect(&node.try_block)?;
        self.append(try_fragment);

        // Done generating the try body.
        self.owner.try_index = old_try_index;

        if let Some(catch_block) = &node.catch_block {
            let catch_entry = self.owner.graph.alloc(Instr::TargetEntry {
                block: BlockInfo::new(),
                try_index: Some(try_index),
                successor: None,
            });
            let catch_fragment = {
                let mut for_catch_block =
                    AstVisitor::for_effect(&mut *self.owner, self.fragment.temp_index);
                for_catch_block.add_instruction(catch_entry);
                for_catch_block.visit_catch_clause(catch_block)?;
                for_catch_block.fragment
            };
            self.owner.add_catch_entry(catch_entry);
            assert!(!catch_fragment.is_open());
            if let Some(end_catch_label) = node.end_catch_label {
                if let Some(join) = self.owner.join_for_continue(end_catch_label) {
                    if self.is_open() {
                        self.add_instruction(join);
                    } else {
                        self.fragment.exit = Some(join);
                    }
                }
            }
        }

        if let Some(finally_block) = &node.finally_block {
            if self.is_open() {
                let fragment = self.visit_for_effect(finally_block)?;
                self.append(fragment);
            }
        }
        Ok(())
    }

    // The implicit exception, stack-trace and saved-context locals are
    // never captured.
    pub(super) fn visit_catch_clause(&mut self, node: &CatchClauseNode) -> BuildResult<()> {
        let exception_var = self.parsed().variable(node.exception_var).clone();
        let stacktrace_var = self.parsed().variable(node.stacktrace_var).clone();
        self.do_(Computation::CatchEntry {
            exception_var,
            stacktrace_var,
        });
        // Restore CTX from the context saved on try entry.
        let context_var = self.parsed().variable(node.context_var).clone();
        self.build_load_context(&context_var);

        let body = self.visit_for_effect(&node.body)?;
        self.append(body);
        Ok(())
    }

    // Exceptions thrown by an inlined finally block target the enclosing
    // try's handler, not the one the finally belongs to.
    pub(super) fn visit_inlined_finally(&mut self, node: &InlinedFinallyNode) -> BuildResult<()> {
        let saved_try_index = self.owner.try_index;
        if let Some(index) = saved_try_index {
            self.owner.try_index = index.checked_sub(1);
        }

        let context_var = self.parsed().variable(node.context_var).clone();
        self.build_load_context(&context_var);
        let fragment = self.visit_for_effect(&node.finally_block)?;
        self.append(fragment);

        if saved_try_index.is_some() {
            self.owner.try_index = saved_try_index;
        }
        Ok(())
    }
}
