//! The parsed function handed to the flow-graph builder

use crate::function::Function;
use crate::nodes::AstNode;
use crate::scope::{LabelId, LocalScope, LocalVariable, ScopeId, SourceLabel, VarId, VarIndex};
use crate::token::TokenPos;
use skua_types::AbstractType;

/// A fully parsed and scope-resolved function body
///
/// Owns the variable, scope and label arenas that AST nodes reference by
/// id. The frontend allocates the reserved `:expr_temp` stack local up
/// front; value-mode lowerings of short-circuit, conditional and
/// setter-returning-value forms funnel through it.
#[derive(Debug)]
pub struct ParsedFunction {
    function: Function,
    node_sequence: Option<AstNode>,
    scopes: Vec<LocalScope>,
    vars: Vec<LocalVariable>,
    /// Formal parameter variables in declaration order; captured formals
    /// appear here with their context slot as storage.
    parameters: Vec<VarId>,
    labels: Vec<SourceLabel>,
    expression_temp_var: VarId,
    saved_context_var: Option<VarId>,
    /// Receiver (or, for factories, type-argument parameter) expression
    /// used to instantiate uninstantiated types; present iff the owner
    /// class is generic.
    instantiator: Option<AstNode>,
    copied_parameter_count: usize,
    stack_local_count: usize,
}

impl ParsedFunction {
    /// Create a parsed function with a root scope and the reserved
    /// expression temp.
    pub fn new(function: Function) -> Self {
        let root = LocalScope {
            parent: None,
            context_level: 0,
            num_context_variables: 0,
        };
        let expr_temp = LocalVariable::new(
            ":expr_temp",
            AbstractType::dynamic(),
            TokenPos(0),
            ScopeId(0),
            VarIndex::Stack(0),
        );
        Self {
            function,
            node_sequence: None,
            scopes: vec![root],
            vars: vec![expr_temp],
            parameters: Vec::new(),
            labels: Vec::new(),
            expression_temp_var: VarId(0),
            saved_context_var: None,
            instantiator: None,
            copied_parameter_count: 0,
            stack_local_count: 1,
        }
    }

    pub fn function(&self) -> &Function {
        &self.function
    }

    pub fn node_sequence(&self) -> &AstNode {
        self.node_sequence
            .as_ref()
            .expect("node sequence not attached")
    }

    pub fn set_node_sequence(&mut self, node: AstNode) {
        assert!(matches!(node, AstNode::Sequence(_)));
        self.node_sequence = Some(node);
    }

    pub fn root_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn expression_temp_var(&self) -> VarId {
        self.expression_temp_var
    }

    pub fn saved_context_var(&self) -> Option<VarId> {
        self.saved_context_var
    }

    pub fn instantiator(&self) -> Option<&AstNode> {
        self.instantiator.as_ref()
    }

    pub fn set_instantiator(&mut self, node: AstNode) {
        self.instantiator = Some(node);
    }

    pub fn copied_parameter_count(&self) -> usize {
        self.copied_parameter_count
    }

    pub fn set_copied_parameter_count(&mut self, count: usize) {
        self.copied_parameter_count = count;
    }

    pub fn stack_local_count(&self) -> usize {
        self.stack_local_count
    }

    /// Total number of frame-addressed variables; the length of SSA
    /// environments and assigned-variable bit-vectors.
    pub fn variable_count(&self) -> usize {
        self.function.num_fixed_parameters + self.copied_parameter_count + self.stack_local_count
    }

    pub fn add_scope(
        &mut self,
        parent: Option<ScopeId>,
        context_level: usize,
        num_context_variables: usize,
    ) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(LocalScope {
            parent,
            context_level,
            num_context_variables,
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &LocalScope {
        &self.scopes[id.0 as usize]
    }

    /// Register the next formal parameter as a frame-slot variable.
    pub fn add_parameter(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        ty: AbstractType,
        token_pos: TokenPos,
    ) -> VarId {
        let index = self.parameters.len();
        assert!(index < self.function.num_parameters());
        let id = self.push_var(LocalVariable::new(
            name,
            ty,
            token_pos,
            scope,
            VarIndex::Parameter(index),
        ));
        self.parameters.push(id);
        id
    }

    /// Register the next formal parameter as captured: its value lives at
    /// `context_slot` of the context allocated by `scope`.
    pub fn add_captured_parameter(
        &mut self,
        scope: ScopeId,
        context_slot: usize,
        name: impl Into<String>,
        ty: AbstractType,
        token_pos: TokenPos,
    ) -> VarId {
        assert!(self.parameters.len() < self.function.num_parameters());
        let id = self.push_var(LocalVariable::new(
            name,
            ty,
            token_pos,
            scope,
            VarIndex::Context(context_slot),
        ));
        self.parameters.push(id);
        id
    }

    /// Allocate a fresh stack local.
    pub fn add_stack_local(
        &mut self,
        scope: ScopeId,
        name: impl Into<String>,
        ty: AbstractType,
    ) -> VarId {
        let index = self.stack_local_count;
        self.stack_local_count += 1;
        self.push_var(LocalVariable::new(
            name,
            ty,
            TokenPos(0),
            scope,
            VarIndex::Stack(index),
        ))
    }

    /// Register a captured local held in the context of `scope` at
    /// `context_slot`.
    pub fn add_captured_local(
        &mut self,
        scope: ScopeId,
        context_slot: usize,
        name: impl Into<String>,
        ty: AbstractType,
    ) -> VarId {
        self.push_var(LocalVariable::new(
            name,
            ty,
            TokenPos(0),
            scope,
            VarIndex::Context(context_slot),
        ))
    }

    /// Allocate the save slot for the entry context; required when the
    /// outermost scope allocates a context and the function is not a
    /// closure.
    pub fn allocate_saved_context_var(&mut self) -> VarId {
        assert!(self.saved_context_var.is_none());
        let id = self.add_stack_local(self.root_scope(), ":saved_context", AbstractType::dynamic());
        self.saved_context_var = Some(id);
        id
    }

    pub fn variable(&self, id: VarId) -> &LocalVariable {
        &self.vars[id.0 as usize]
    }

    /// The formal parameter at declaration position `index`.
    pub fn parameter(&self, index: usize) -> &LocalVariable {
        self.variable(self.parameters[index])
    }

    pub fn parameters(&self) -> &[VarId] {
        &self.parameters
    }

    pub fn add_label(
        &mut self,
        name: impl Into<String>,
        owner: ScopeId,
        is_continue_target: bool,
    ) -> LabelId {
        let id = LabelId(self.labels.len() as u32);
        self.labels.push(SourceLabel {
            name: name.into(),
            owner,
            is_continue_target,
        });
        id
    }

    pub fn label(&self, id: LabelId) -> &SourceLabel {
        &self.labels[id.0 as usize]
    }

    fn push_var(&mut self, var: LocalVariable) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::SequenceNode;
    use skua_types::TypeSystem;

    fn sample_function() -> Function {
        let mut f = Function::new("f", TypeSystem::OBJECT, AbstractType::dynamic());
        f.is_static = true;
        f.num_fixed_parameters = 2;
        f
    }

    #[test]
    fn test_expression_temp_is_preallocated() {
        let parsed = ParsedFunction::new(sample_function());
        let temp = parsed.variable(parsed.expression_temp_var());
        assert_eq!(temp.name, ":expr_temp");
        assert_eq!(parsed.stack_local_count(), 1);
        assert_eq!(parsed.variable_count(), 3);
    }

    #[test]
    fn test_variable_count_tracks_locals() {
        let mut parsed = ParsedFunction::new(sample_function());
        let root = parsed.root_scope();
        parsed.add_stack_local(root, "x", AbstractType::dynamic());
        assert_eq!(parsed.stack_local_count(), 2);
        assert_eq!(parsed.variable_count(), 4);
    }

    #[test]
    fn test_node_sequence_roundtrip() {
        let mut parsed = ParsedFunction::new(sample_function());
        parsed.set_node_sequence(AstNode::Sequence(SequenceNode {
            token_pos: TokenPos(0),
            scope: Some(parsed.root_scope()),
            nodes: vec![],
            label: None,
        }));
        assert!(parsed.node_sequence().as_sequence().is_some());
    }
}
