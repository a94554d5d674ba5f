//! Expression lowering
//!
//! The value-producing node visitations, the short-circuit and
//! conditional-expression diamonds, type tests and casts, calls,
//! allocation, and the instantiator plumbing for uninstantiated types.

use super::fragment::Fragment;
use super::{AstVisitor, Role};
use crate::error::BuildResult;
use crate::ir::{Computation, Instr, Value};
use skua_ast::{
    ArrayNode, AssignableNode, BinaryOpNode, ClosureCallNode, ClosureNode, CloneContextNode,
    ComparisonNode, ConditionalNode, ConstructorCallNode, FunctionKind, InstanceCallNode,
    InstanceGetterNode, InstanceSetterNode, LiteralNode, LoadIndexedNode, LoadInstanceFieldNode,
    LoadLocalNode, LoadStaticFieldNode, NativeBodyNode, StaticCallNode, StaticGetterNode,
    StaticSetterNode, StoreIndexedNode, StoreInstanceFieldNode, StoreLocalNode,
    StoreStaticFieldNode, ThrowNode, TokenKind, TokenPos, UnaryOpNode,
};
use skua_types::{Instance, TypeSystem};

/// Sentinel passed as the instantiator operand of an allocation whose type
/// arguments need none.
const NO_INSTANTIATOR: i64 = 0;

impl<'a, 'b> AstVisitor<'a, 'b> {
    pub(super) fn visit_literal(&mut self, node: &LiteralNode) -> BuildResult<()> {
        match self.role {
            Role::Effect => Ok(()),
            Role::Value | Role::Test => self.return_computation(Computation::Constant {
                token_pos: node.token_pos,
                literal: node.literal.clone(),
            }),
        }
    }

    pub(super) fn visit_assignable(&mut self, node: &AssignableNode) -> BuildResult<()> {
        match self.role {
            Role::Effect => unreachable!("assignable nodes occur in value position only"),
            Role::Value | Role::Test => {
                let (fragment, value) = self.visit_for_value(&node.expr)?;
                self.append(fragment);
                let checked = self.build_assignable_value(
                    node.expr.token_pos(),
                    value,
                    &node.ty,
                    &node.dst_name,
                )?;
                self.return_value(checked)
            }
        }
    }

    // "&&" and "||" cannot be overloaded and never dispatch.
    pub(super) fn visit_binary_op(&mut self, node: &BinaryOpNode) -> BuildResult<()> {
        if node.kind == TokenKind::And || node.kind == TokenKind::Or {
            return match self.role {
                Role::Effect => self.build_short_circuit_for_effect(node),
                Role::Value | Role::Test => self.build_short_circuit_for_value(node),
            };
        }

        let (left_fragment, left_value) = self.visit_for_value(&node.left)?;
        self.append(left_fragment);
        let (right_fragment, right_value) = self.visit_for_value(&node.right)?;
        self.append(right_fragment);
        self.return_computation(Computation::InstanceCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            function_name: node.kind.symbol().to_string(),
            token_kind: node.kind,
            arguments: vec![left_value, right_value],
            argument_names: vec![],
            checked_argument_count: 2,
        })
    }

    fn build_short_circuit_for_effect(&mut self, node: &BinaryOpNode) -> BuildResult<()> {
        let test = self.visit_for_test(&node.left)?;
        let right = self.visit_for_effect(&node.right)?;
        let empty = Fragment::new(self.fragment.temp_index);
        if node.kind == TokenKind::And {
            self.join(test, right, empty);
        } else {
            self.join(test, empty, right);
        }
        Ok(())
    }

    // Short-circuit semantics: do not evaluate the right operand unless
    // needed.
    //   AND:  left ? right === true : false
    //   OR:   left ? true : right === true
    // Both arms funnel their boolean through the expression temp.
    fn build_short_circuit_for_value(&mut self, node: &BinaryOpNode) -> BuildResult<()> {
        let test = self.visit_for_test(&node.left)?;
        let expr_temp = self.expression_temp();

        let right_fragment = {
            let mut for_right =
                AstVisitor::for_value(&mut *self.owner, self.fragment.temp_index);
            for_right.visit(&node.right)?;
            let mut right_value = for_right.take_value();
            if for_right.checks_enabled() {
                right_value = for_right.bind(Computation::AssertBoolean {
                    token_pos: node.right.token_pos(),
                    try_index: for_right.try_index(),
                    value: right_value,
                });
            }
            let constant_true = for_right.bind(Computation::Constant {
                token_pos: node.token_pos,
                literal: Instance::Bool(true),
            });
            let compare = for_right.bind(Computation::StrictCompare {
                kind: TokenKind::EqStrict,
                left: right_value,
                right: constant_true,
            });
            let store = for_right.build_store_local(&expr_temp, compare);
            for_right.do_(store);
            for_right.fragment
        };

        let constant_fragment = {
            let mut for_constant =
                AstVisitor::for_value(&mut *self.owner, self.fragment.temp_index);
            let literal = Instance::Bool(node.kind == TokenKind::Or);
            let constant = for_constant.bind(Computation::Constant {
                token_pos: node.token_pos,
                literal,
            });
            let store = for_constant.build_store_local(&expr_temp, constant);
            for_constant.do_(store);
            for_constant.fragment
        };

        if node.kind == TokenKind::And {
            self.join(test, right_fragment, constant_fragment);
        } else {
            self.join(test, constant_fragment, right_fragment);
        }
        let load = self.build_load_local(&expr_temp);
        self.return_computation(load)
    }

    // "!" cannot be overloaded; everything else dispatches.
    pub(super) fn visit_unary_op(&mut self, node: &UnaryOpNode) -> BuildResult<()> {
        if node.kind == TokenKind::Not {
            let (fragment, value) = self.visit_for_value(&node.operand)?;
            self.append(fragment);
            let mut value = value;
            if self.checks_enabled() {
                value = self.bind(Computation::AssertBoolean {
                    token_pos: node.operand.token_pos(),
                    try_index: self.try_index(),
                    value,
                });
            }
            return self.return_computation(Computation::BooleanNegate { value });
        }

        let (fragment, value) = self.visit_for_value(&node.operand)?;
        self.append(fragment);
        let token_kind = if node.kind == TokenKind::Sub {
            TokenKind::Negate
        } else {
            node.kind
        };
        self.return_computation(Computation::InstanceCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            function_name: token_kind.symbol().to_string(),
            token_kind,
            arguments: vec![value],
            argument_names: vec![],
            checked_argument_count: 1,
        })
    }

    pub(super) fn visit_comparison(&mut self, node: &ComparisonNode) -> BuildResult<()> {
        if node.kind.is_type_test_operator() {
            return self.build_type_test(node);
        }
        if node.kind.is_type_cast_operator() {
            return self.build_type_cast(node);
        }

        if node.kind.is_strict_compare() {
            let (left_fragment, left_value) = self.visit_for_value(&node.left)?;
            self.append(left_fragment);
            let (right_fragment, right_value) = self.visit_for_value(&node.right)?;
            self.append(right_fragment);
            return self.return_computation(Computation::StrictCompare {
                kind: node.kind,
                left: left_value,
                right: right_value,
            });
        }

        if node.kind.is_equality() {
            let (left_fragment, left_value) = self.visit_for_value(&node.left)?;
            self.append(left_fragment);
            let (right_fragment, right_value) = self.visit_for_value(&node.right)?;
            self.append(right_fragment);
            let compare = Computation::EqualityCompare {
                token_pos: node.token_pos,
                try_index: self.try_index(),
                left: left_value,
                right: right_value,
            };
            if node.kind == TokenKind::Eq {
                return self.return_computation(compare);
            }
            let mut eq_result = self.bind(compare);
            if self.checks_enabled() {
                eq_result = self.bind(Computation::AssertBoolean {
                    token_pos: node.token_pos,
                    try_index: self.try_index(),
                    value: eq_result,
                });
            }
            return self.return_computation(Computation::BooleanNegate { value: eq_result });
        }

        let (left_fragment, left_value) = self.visit_for_value(&node.left)?;
        self.append(left_fragment);
        let (right_fragment, right_value) = self.visit_for_value(&node.right)?;
        self.append(right_fragment);
        self.return_computation(Computation::RelationalOp {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            kind: node.kind,
            left: left_value,
            right: right_value,
        })
    }

    fn build_type_test(&mut self, node: &ComparisonNode) -> BuildResult<()> {
        assert!(node.kind.is_type_test_operator());
        if self.role == Role::Effect {
            // Only the left operand's effects matter.
            let fragment = self.visit_for_effect(&node.left)?;
            self.append(fragment);
            return Ok(());
        }

        let ty = node.right.as_type().expect("type test against a type").ty.clone();
        assert!(ty.is_finalized() && !ty.is_malformed());
        let negate_result = node.kind == TokenKind::IsNot;

        // All objects are instances of T if Object is a subtype of T.
        let object_type = self.types().object_type();
        if ty.is_instantiated() && self.types().is_subtype_of(&object_type, &ty) {
            // Must still evaluate the left side.
            let fragment = self.visit_for_effect(&node.left)?;
            self.append(fragment);
            return self.return_computation(Computation::Constant {
                token_pos: node.token_pos,
                literal: Instance::Bool(!negate_result),
            });
        }

        // Decide the test at compile time for literal operands.
        if let Some(literal_node) = node.left.as_literal() {
            if ty.is_instantiated() {
                let literal = &literal_node.literal;
                let result = if self.types().class_of(literal) == TypeSystem::NULL {
                    // Null is only an instance of Object and dynamic, both
                    // of which were handled above.
                    negate_result
                } else if self.types().is_instance_of(literal, &ty) {
                    !negate_result
                } else {
                    negate_result
                };
                return self.return_computation(Computation::Constant {
                    token_pos: node.token_pos,
                    literal: Instance::Bool(result),
                });
            }
        }

        let (fragment, value) = self.visit_for_value(&node.left)?;
        self.append(fragment);
        let (instantiator, instantiator_type_arguments) = if ty.is_instantiated() {
            (self.build_null_value(), self.build_null_value())
        } else {
            self.build_typecheck_arguments(node.token_pos)?
        };
        self.return_computation(Computation::InstanceOf {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            value,
            instantiator,
            instantiator_type_arguments,
            ty,
            negate_result,
        })
    }

    fn build_type_cast(&mut self, node: &ComparisonNode) -> BuildResult<()> {
        assert!(node.kind.is_type_cast_operator());
        let ty = node.right.as_type().expect("cast against a type").ty.clone();
        assert!(ty.is_finalized());
        let (fragment, value) = self.visit_for_value(&node.left)?;
        self.append(fragment);
        match self.role {
            Role::Effect => {
                let static_type = self.static_type_of(&value);
                if !crate::elide::can_skip_type_check(
                    static_type.as_ref(),
                    &ty,
                    self.types(),
                    &self.owner.config,
                ) {
                    let check =
                        self.build_assert_assignable(node.token_pos, value, &ty, "type cast")?;
                    self.do_(check);
                }
                Ok(())
            }
            Role::Value | Role::Test => {
                let checked =
                    self.build_assignable_value(node.token_pos, value, &ty, "type cast")?;
                self.return_value(checked)
            }
        }
    }

    pub(super) fn visit_conditional(&mut self, node: &ConditionalNode) -> BuildResult<()> {
        let test = self.visit_for_test(&node.condition)?;
        match self.role {
            Role::Effect => {
                let for_true = self.visit_for_effect(&node.true_expr)?;
                let for_false = self.visit_for_effect(&node.false_expr)?;
                self.join(test, for_true, for_false);
                Ok(())
            }
            Role::Value | Role::Test => {
                let expr_temp = self.expression_temp();
                let true_fragment = {
                    let mut for_true =
                        AstVisitor::for_value(&mut *self.owner, self.fragment.temp_index);
                    for_true.visit(&node.true_expr)?;
                    assert!(for_true.is_open());
                    let value = for_true.take_value();
                    let store = for_true.build_store_local(&expr_temp, value);
                    for_true.do_(store);
                    for_true.fragment
                };
                let false_fragment = {
                    let mut for_false =
                        AstVisitor::for_value(&mut *self.owner, self.fragment.temp_index);
                    for_false.visit(&node.false_expr)?;
                    assert!(for_false.is_open());
                    let value = for_false.take_value();
                    let store = for_false.build_store_local(&expr_temp, value);
                    for_false.do_(store);
                    for_false.fragment
                };
                self.join(test, true_fragment, false_fragment);
                let load = self.build_load_local(&expr_temp);
                self.return_computation(load)
            }
        }
    }

    pub(super) fn visit_array(&mut self, node: &ArrayNode) -> BuildResult<()> {
        let mut values = Vec::with_capacity(node.elements.len());
        for element in &node.elements {
            let (fragment, value) = self.visit_for_value(element)?;
            self.append(fragment);
            values.push(value);
        }
        let element_type =
            self.build_instantiated_type_arguments(node.token_pos, &node.type_arguments)?;
        self.return_computation(Computation::CreateArray {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            elements: values,
            element_type,
        })
    }

    pub(super) fn visit_closure(&mut self, node: &ClosureNode) -> BuildResult<()> {
        let function = node.function.clone();

        let receiver = if function.kind == FunctionKind::ImplicitInstanceClosure {
            let receiver_node = node
                .receiver
                .as_ref()
                .expect("implicit instance closure has a receiver");
            let (fragment, value) = self.visit_for_value(receiver_node)?;
            self.append(fragment);
            value
        } else {
            self.build_null_value()
        };

        // A generic signature class needs the instantiator's type
        // arguments; otherwise null is passed.
        let signature_class = function
            .signature_class
            .expect("closure function has a signature class");
        let type_arguments = if self.types().class(signature_class).has_type_arguments() {
            assert!(function.kind != FunctionKind::ImplicitStaticClosure);
            self.build_instantiator_type_arguments(node.token_pos, None)?
        } else {
            self.build_null_value()
        };

        self.return_computation(Computation::CreateClosure {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            function,
            type_arguments,
            receiver,
        })
    }

    pub(super) fn visit_instance_call(&mut self, node: &InstanceCallNode) -> BuildResult<()> {
        let (receiver_fragment, receiver) = self.visit_for_value(&node.receiver)?;
        self.append(receiver_fragment);
        let mut values = Vec::with_capacity(node.arguments.len() + 1);
        values.push(receiver);
        self.translate_argument_list(&node.arguments, &mut values)?;
        self.return_computation(Computation::InstanceCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            function_name: node.function_name.clone(),
            token_kind: TokenKind::Illegal,
            arguments: values,
            argument_names: node.arguments.names.clone(),
            checked_argument_count: 1,
        })
    }

    pub(super) fn visit_static_call(&mut self, node: &StaticCallNode) -> BuildResult<()> {
        let mut values = Vec::with_capacity(node.arguments.len());
        self.translate_argument_list(&node.arguments, &mut values)?;
        self.return_computation(Computation::StaticCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            function: node.function.clone(),
            argument_names: node.arguments.names.clone(),
            arguments: values,
        })
    }

    // An invoked closure may change CTX, so the context is saved across
    // the call and restored afterwards.
    fn build_closure_call(&mut self, node: &ClosureCallNode) -> BuildResult<Computation> {
        let (closure_fragment, closure_value) = self.visit_for_value(&node.closure)?;
        self.append(closure_fragment);
        let mut arguments = Vec::with_capacity(node.arguments.len() + 1);
        arguments.push(closure_value);
        self.translate_argument_list(&node.arguments, &mut arguments)?;

        let expr_temp = self.expression_temp();
        self.build_store_context(&expr_temp);
        Ok(Computation::ClosureCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            arguments,
        })
    }

    pub(super) fn visit_closure_call(&mut self, node: &ClosureCallNode) -> BuildResult<()> {
        match self.role {
            Role::Effect => {
                let call = self.build_closure_call(node)?;
                self.do_(call);
                let expr_temp = self.expression_temp();
                self.build_load_context(&expr_temp);
                Ok(())
            }
            Role::Value | Role::Test => {
                let call = self.build_closure_call(node)?;
                let result = self.bind(call);
                let expr_temp = self.expression_temp();
                self.build_load_context(&expr_temp);
                self.return_value(result)
            }
        }
    }

    pub(super) fn visit_clone_context(&mut self, node: &CloneContextNode) -> BuildResult<()> {
        let context = self.bind(Computation::CurrentContext {
            token_pos: node.token_pos,
        });
        let clone = self.bind(Computation::CloneContext {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            context,
        });
        self.return_computation(Computation::StoreContext { value: clone })
    }

    pub(super) fn visit_constructor_call(&mut self, node: &ConstructorCallNode) -> BuildResult<()> {
        if node.constructor.is_factory() {
            let mut arguments = vec![
                self.build_instantiated_type_arguments(node.token_pos, &node.type_arguments)?,
            ];
            self.translate_argument_list(&node.arguments, &mut arguments)?;
            return self.return_computation(Computation::StaticCall {
                token_pos: node.token_pos,
                try_index: self.try_index(),
                function: node.constructor.clone(),
                argument_names: node.arguments.names.clone(),
                arguments,
            });
        }

        match self.role {
            Role::Effect => {
                // No need to preserve the allocated value.
                let allocated = self.build_object_allocation(node)?;
                self.build_constructor_call(node, allocated)
            }
            Role::Value | Role::Test => {
                // The allocated object survives the constructor call in
                // its dedicated temp.
                let allocated = self.build_object_allocation(node)?;
                let allocated_var = self.parsed().variable(node.allocated_object_var).clone();
                let store = self.build_store_local(&allocated_var, allocated);
                let allocated_value = self.bind(store);
                self.build_constructor_call(node, allocated_value)?;
                let load = self.build_load_local(&allocated_var);
                let result = self.bind(load);
                self.return_value(result)
            }
        }
    }

    fn build_object_allocation(&mut self, node: &ConstructorCallNode) -> BuildResult<Value> {
        let class_id = node.constructor.owner;
        let requires_type_arguments = self.types().class(class_id).has_type_arguments();

        let mut allocate_arguments = Vec::new();
        if requires_type_arguments {
            self.build_constructor_type_arguments(node, &mut allocate_arguments)?;
        }

        // Uninstantiated type arguments that cannot be proven within their
        // declared bounds are verified when the object is allocated.
        let needs_bounds_check = self.checks_enabled()
            && requires_type_arguments
            && node.type_arguments.as_ref().is_some_and(|args| {
                !args.is_instantiated() && !self.types().is_within_bounds_of(args, class_id)
            });

        let comp = if needs_bounds_check {
            Computation::AllocateObjectWithBoundsCheck {
                token_pos: node.token_pos,
                try_index: self.try_index(),
                class: class_id,
                arguments: allocate_arguments,
            }
        } else {
            Computation::AllocateObject {
                token_pos: node.token_pos,
                try_index: self.try_index(),
                class: class_id,
                arguments: allocate_arguments,
            }
        };
        Ok(self.bind(comp))
    }

    fn build_constructor_call(
        &mut self,
        node: &ConstructorCallNode,
        alloc_value: Value,
    ) -> BuildResult<()> {
        let ctor_arg = self.bind(Computation::Constant {
            token_pos: node.token_pos,
            literal: Instance::Smi(skua_ast::Function::CTOR_PHASE_ALL),
        });
        let mut values = vec![alloc_value, ctor_arg];
        self.translate_argument_list(&node.arguments, &mut values)?;
        self.do_(Computation::StaticCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            function: node.constructor.clone(),
            argument_names: node.arguments.names.clone(),
            arguments: values,
        });
        Ok(())
    }

    pub(super) fn visit_instance_getter(&mut self, node: &InstanceGetterNode) -> BuildResult<()> {
        let (receiver_fragment, receiver) = self.visit_for_value(&node.receiver)?;
        self.append(receiver_fragment);
        self.return_computation(Computation::InstanceCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            function_name: format!("get:{}", node.field_name),
            token_kind: TokenKind::Get,
            arguments: vec![receiver],
            argument_names: vec![],
            checked_argument_count: 1,
        })
    }

    fn build_instance_setter_values(
        &mut self,
        node: &InstanceSetterNode,
    ) -> BuildResult<(Value, Value)> {
        let (receiver_fragment, receiver) = self.visit_for_value(&node.receiver)?;
        self.append(receiver_fragment);
        let (value_fragment, value) = self.visit_for_value(&node.value)?;
        self.append(value_fragment);
        Ok((receiver, value))
    }

    pub(super) fn visit_instance_setter(&mut self, node: &InstanceSetterNode) -> BuildResult<()> {
        match self.role {
            Role::Effect => {
                let (receiver, value) = self.build_instance_setter_values(node)?;
                self.return_computation(Computation::InstanceSetter {
                    token_pos: node.token_pos,
                    try_index: self.try_index(),
                    field_name: node.field_name.clone(),
                    receiver,
                    value,
                })
            }
            Role::Value | Role::Test => {
                // A setter expression's result is the assigned value, so
                // it is saved across the setter dispatch.
                let (receiver, value) = self.build_instance_setter_values(node)?;
                let expr_temp = self.expression_temp();
                let store = self.build_store_local(&expr_temp, value);
                let saved_value = self.bind(store);
                self.do_(Computation::InstanceSetter {
                    token_pos: node.token_pos,
                    try_index: self.try_index(),
                    field_name: node.field_name.clone(),
                    receiver,
                    value: saved_value,
                });
                let load = self.build_load_local(&expr_temp);
                self.return_computation(load)
            }
        }
    }

    pub(super) fn visit_static_getter(&mut self, node: &StaticGetterNode) -> BuildResult<()> {
        self.return_computation(Computation::StaticCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            function: node.getter_function.clone(),
            argument_names: vec![],
            arguments: vec![],
        })
    }

    pub(super) fn visit_static_setter(&mut self, node: &StaticSetterNode) -> BuildResult<()> {
        let (value_fragment, value) = self.visit_for_value(&node.value)?;
        self.append(value_fragment);
        self.return_computation(Computation::StaticSetter {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            setter_function: node.setter_function.clone(),
            value,
        })
    }

    pub(super) fn visit_native_body(&mut self, node: &NativeBodyNode) -> BuildResult<()> {
        self.return_computation(Computation::NativeCall {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            native_name: node.native_name.clone(),
        })
    }

    pub(super) fn visit_load_local(&mut self, node: &LoadLocalNode) -> BuildResult<()> {
        if let Some(pseudo) = &node.pseudo {
            let fragment = self.visit_for_effect(pseudo)?;
            self.append(fragment);
        }
        match self.role {
            Role::Effect => Ok(()),
            Role::Value | Role::Test => {
                let local = self.parsed().variable(node.local).clone();
                let load = self.build_load_local(&local);
                self.return_computation(load)
            }
        }
    }

    pub(super) fn visit_store_local(&mut self, node: &StoreLocalNode) -> BuildResult<()> {
        let local = self.parsed().variable(node.local).clone();
        let (value_fragment, value) = self.visit_for_value(&node.value)?;
        self.append(value_fragment);
        let mut store_value = value;
        if self.checks_enabled() {
            store_value = self.build_assignable_value(
                node.value.token_pos(),
                store_value,
                &local.ty,
                &local.name,
            )?;
        }
        let store = self.build_store_local(&local, store_value);
        self.return_computation(store)
    }

    pub(super) fn visit_load_instance_field(
        &mut self,
        node: &LoadInstanceFieldNode,
    ) -> BuildResult<()> {
        let (instance_fragment, instance) = self.visit_for_value(&node.instance)?;
        self.append(instance_fragment);
        self.return_computation(Computation::LoadInstanceField {
            field: node.field.clone(),
            instance,
        })
    }

    pub(super) fn visit_store_instance_field(
        &mut self,
        node: &StoreInstanceFieldNode,
    ) -> BuildResult<()> {
        if self.role != Role::Effect {
            unreachable!("instance field stores produce no value");
        }
        let (instance_fragment, instance) = self.visit_for_value(&node.instance)?;
        self.append(instance_fragment);
        let (value_fragment, value) = self.visit_for_value(&node.value)?;
        self.append(value_fragment);
        let mut store_value = value;
        if self.checks_enabled() {
            store_value = self.build_assignable_value(
                node.value.token_pos(),
                store_value,
                &node.field.ty,
                &node.field.name,
            )?;
        }
        self.return_computation(Computation::StoreInstanceField {
            field: node.field.clone(),
            instance,
            value: store_value,
        })
    }

    pub(super) fn visit_load_static_field(
        &mut self,
        node: &LoadStaticFieldNode,
    ) -> BuildResult<()> {
        self.return_computation(Computation::LoadStaticField {
            field: node.field.clone(),
        })
    }

    pub(super) fn visit_store_static_field(
        &mut self,
        node: &StoreStaticFieldNode,
    ) -> BuildResult<()> {
        let (value_fragment, value) = self.visit_for_value(&node.value)?;
        self.append(value_fragment);
        let mut store_value = value;
        if self.checks_enabled() {
            store_value = self.build_assignable_value(
                node.value.token_pos(),
                store_value,
                &node.field.ty,
                &node.field.name,
            )?;
        }
        self.return_computation(Computation::StoreStaticField {
            field: node.field.clone(),
            value: store_value,
        })
    }

    pub(super) fn visit_load_indexed(&mut self, node: &LoadIndexedNode) -> BuildResult<()> {
        let (array_fragment, array) = self.visit_for_value(&node.array)?;
        self.append(array_fragment);
        let (index_fragment, index) = self.visit_for_value(&node.index_expr)?;
        self.append(index_fragment);
        self.return_computation(Computation::LoadIndexed {
            token_pos: node.token_pos,
            try_index: self.try_index(),
            array,
            index,
        })
    }

    fn build_store_indexed_values(
        &mut self,
        node: &StoreIndexedNode,
    ) -> BuildResult<(Value, Value, Value)> {
        let (array_fragment, array) = self.visit_for_value(&node.array)?;
        self.append(array_fragment);
        let (index_fragment, index) = self.visit_for_value(&node.index_expr)?;
        self.append(index_fragment);
        let (value_fragment, value) = self.visit_for_value(&node.value)?;
        self.append(value_fragment);
        Ok((array, index, value))
    }

    pub(super) fn visit_store_indexed(&mut self, node: &StoreIndexedNode) -> BuildResult<()> {
        match self.role {
            Role::Effect => {
                let (array, index, value) = self.build_store_indexed_values(node)?;
                self.return_computation(Computation::StoreIndexed {
                    token_pos: node.token_pos,
                    try_index: self.try_index(),
                    array,
                    index,
                    value,
                })
            }
            Role::Value | Role::Test => {
                // The expression result is the stored value.
                let (array, index, value) = self.build_store_indexed_values(node)?;
                let expr_temp = self.expression_temp();
                let store = self.build_store_local(&expr_temp, value);
                let saved_value = self.bind(store);
                self.do_(Computation::StoreIndexed {
                    token_pos: node.token_pos,
                    try_index: self.try_index(),
                    array,
                    index,
                    value: saved_value,
                });
                let load = self.build_load_local(&expr_temp);
                self.return_computation(load)
            }
        }
    }

    fn build_throw(&mut self, node: &ThrowNode) -> BuildResult<()> {
        let (exception_fragment, exception) = self.visit_for_value(&node.exception)?;
        self.append(exception_fragment);
        let instr = match &node.stacktrace {
            None => self.owner.graph.alloc(Instr::Throw {
                token_pos: node.token_pos,
                try_index: self.try_index(),
                exception,
                successor: None,
                previous: None,
                env: None,
            }),
            Some(stacktrace) => {
                let (stacktrace_fragment, stacktrace_value) = self.visit_for_value(stacktrace)?;
                self.append(stacktrace_fragment);
                self.owner.graph.alloc(Instr::ReThrow {
                    token_pos: node.token_pos,
                    try_index: self.try_index(),
                    exception,
                    stacktrace: stacktrace_value,
                    successor: None,
                    previous: None,
                    env: None,
                })
            }
        };
        self.add_instruction(instr);
        Ok(())
    }

    pub(super) fn visit_throw(&mut self, node: &ThrowNode) -> BuildResult<()> {
        match self.role {
            Role::Effect => {
                self.build_throw(node)?;
                self.close_fragment();
                Ok(())
            }
            // The parser can rewrite expressions into throws; produce a
            // synthetic null so the enclosing expression fragment stays
            // open past the closed control-flow path.
            Role::Value | Role::Test => {
                self.build_throw(node)?;
                self.return_computation(Computation::Constant {
                    token_pos: node.token_pos,
                    literal: Instance::Null,
                })
            }
        }
    }

    // --- instantiator plumbing ---

    /// The instantiator object for the enclosing class, or `None` inside a
    /// factory (whose type arguments arrive as its first parameter).
    pub(super) fn build_instantiator(&mut self) -> BuildResult<Option<Value>> {
        let function = self.parsed().function();
        if self.types().class(function.owner).num_type_parameters == 0 {
            return Ok(None);
        }
        if function.outermost().is_factory() {
            return Ok(None);
        }

        let instantiator = self
            .parsed()
            .instantiator()
            .expect("generic owner class implies an instantiator expression");
        let (fragment, value) = self.visit_for_value(instantiator)?;
        self.append(fragment);
        Ok(Some(value))
    }

    /// The type-argument vector of the instantiator. The receiver cannot
    /// be null here, so its type-argument field can be loaded directly;
    /// for factories the vector is already the first parameter.
    pub(super) fn build_instantiator_type_arguments(
        &mut self,
        token_pos: TokenPos,
        instantiator: Option<Value>,
    ) -> BuildResult<Value> {
        let function = self.parsed().function();
        let instantiator_class = self.types().class(function.owner);
        if instantiator_class.num_type_parameters == 0 {
            // The type arguments are compile-time constants.
            return Ok(self.bind(Computation::Constant {
                token_pos,
                literal: Instance::Null,
            }));
        }
        if function.outermost().is_factory() {
            assert!(instantiator.is_none());
            let instantiator_node = self
                .parsed()
                .instantiator()
                .expect("factory has a type-argument parameter expression");
            let (fragment, value) = self.visit_for_value(instantiator_node)?;
            self.append(fragment);
            return Ok(value);
        }

        let offset = instantiator_class
            .type_arguments_field_offset
            .expect("generic class stores its type arguments");
        let instantiator = match instantiator {
            Some(value) => Some(value),
            None => self.build_instantiator()?,
        };
        let instantiator = instantiator.expect("non-factory generic class has an instantiator");
        Ok(self.bind(Computation::LoadVMField {
            object: instantiator,
            offset_in_words: offset,
            ty: None,
        }))
    }

    /// A value for `type_arguments`: embedded when instantiated,
    /// instantiated at run time against the instantiator's vector
    /// otherwise.
    pub(super) fn build_instantiated_type_arguments(
        &mut self,
        token_pos: TokenPos,
        type_arguments: &Option<skua_types::TypeArguments>,
    ) -> BuildResult<Value> {
        match type_arguments {
            None => Ok(self.bind(Computation::Constant {
                token_pos,
                literal: Instance::Null,
            })),
            Some(args) if args.is_instantiated() => Ok(self.bind(Computation::Constant {
                token_pos,
                literal: Instance::TypeArgs(args.clone()),
            })),
            Some(args) => {
                let instantiator = self.build_instantiator_type_arguments(token_pos, None)?;
                Ok(self.bind(Computation::InstantiateTypeArguments {
                    token_pos,
                    try_index: self.try_index(),
                    type_arguments: args.clone(),
                    instantiator,
                }))
            }
        }
    }

    /// Both runtime values a non-instantiated type check needs. The
    /// instantiator is preserved in the expression temp while its
    /// type-argument vector is loaded.
    pub(super) fn build_typecheck_arguments(
        &mut self,
        token_pos: TokenPos,
    ) -> BuildResult<(Value, Value)> {
        let function = self.parsed().function();
        // Only reached when the tested type is not instantiated.
        assert!(self.types().class(function.owner).num_type_parameters > 0);

        match self.build_instantiator()? {
            None => {
                // Inside a factory there is no instantiator object.
                let instantiator = self.build_null_value();
                let type_arguments = self.build_instantiator_type_arguments(token_pos, None)?;
                Ok((instantiator, type_arguments))
            }
            Some(instantiator) => {
                let expr_temp = self.expression_temp();
                let store = self.build_store_local(&expr_temp, instantiator);
                let instantiator = self.bind(store);
                let load = self.build_load_local(&expr_temp);
                let loaded = self.bind(load);
                let type_arguments =
                    self.build_instantiator_type_arguments(token_pos, Some(loaded))?;
                Ok((instantiator, type_arguments))
            }
        }
    }

    /// The two trailing allocation operands of a generic, non-factory
    /// constructor call: the constructor type arguments and the
    /// instantiator. Uses the expression temp and the per-node allocated
    /// object temp to keep the intermediate results addressable.
    fn build_constructor_type_arguments(
        &mut self,
        node: &ConstructorCallNode,
        args: &mut Vec<Value>,
    ) -> BuildResult<()> {
        let class_id = node.constructor.owner;
        assert!(self.types().class(class_id).has_type_arguments());
        assert!(!node.constructor.is_factory());

        match &node.type_arguments {
            None => {
                let type_args = self.bind(Computation::Constant {
                    token_pos: node.token_pos,
                    literal: Instance::Null,
                });
                let no_instantiator = self.bind(Computation::Constant {
                    token_pos: node.token_pos,
                    literal: Instance::Smi(NO_INSTANTIATOR),
                });
                args.push(type_args);
                args.push(no_instantiator);
                Ok(())
            }
            Some(type_arguments) if type_arguments.is_instantiated() => {
                let type_args = self.bind(Computation::Constant {
                    token_pos: node.token_pos,
                    literal: Instance::TypeArgs(type_arguments.clone()),
                });
                let no_instantiator = self.bind(Computation::Constant {
                    token_pos: node.token_pos,
                    literal: Instance::Smi(NO_INSTANTIATOR),
                });
                args.push(type_args);
                args.push(no_instantiator);
                Ok(())
            }
            Some(type_arguments) => {
                let t1 = self.expression_temp();
                let t2 = self.parsed().variable(node.allocated_object_var).clone();

                let instantiator_type_arguments =
                    self.build_instantiator_type_arguments(node.token_pos, None)?;
                assert!(instantiator_type_arguments.is_use());
                let store = self.build_store_local(&t1, instantiator_type_arguments);
                let stored_instantiator = self.bind(store);
                // t1 holds the instantiator type arguments.

                let extract_type_arguments =
                    self.bind(Computation::ExtractConstructorTypeArguments {
                        token_pos: node.token_pos,
                        try_index: self.try_index(),
                        type_arguments: type_arguments.clone(),
                        instantiator: stored_instantiator,
                    });
                let store = self.build_store_local(&t2, extract_type_arguments);
                self.do_(store);
                // t2 holds the extracted constructor type arguments.

                let load = self.build_load_local(&t1);
                let load_instantiator = self.bind(load);
                let extract_instantiator =
                    self.bind(Computation::ExtractConstructorInstantiator {
                        class: class_id,
                        instantiator: load_instantiator,
                    });
                let store = self.build_store_local(&t1, extract_instantiator);
                self.do_(store);
                // t1 holds the extracted constructor instantiator.

                let load = self.build_load_local(&t2);
                let load_0 = self.bind(load);
                let load = self.build_load_local(&t1);
                let load_1 = self.bind(load);
                args.push(load_0);
                args.push(load_1);
                Ok(())
            }
        }
    }
}
