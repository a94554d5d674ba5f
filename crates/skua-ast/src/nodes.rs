//! AST node kinds
//!
//! One struct per node kind plus the [`AstNode`] dispatch enum. The tree is
//! immutable during compilation; nodes reference variables, scopes and
//! labels by id into the owning parsed function.

use crate::function::{Field, Function};
use crate::scope::{LabelId, ScopeId, VarId};
use crate::token::{TokenKind, TokenPos};
use skua_types::{AbstractType, ClassId, Instance, TypeArguments};

/// A positional argument list with optional trailing named arguments
#[derive(Debug, Clone)]
pub struct ArgumentList {
    pub nodes: Vec<AstNode>,
    /// Names of the trailing named arguments; empty when all arguments are
    /// positional.
    pub names: Vec<String>,
}

impl ArgumentList {
    pub fn positional(nodes: Vec<AstNode>) -> Self {
        Self {
            nodes,
            names: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Break,
    Continue,
}

/// A statement sequence with an optional scope and label
#[derive(Debug, Clone)]
pub struct SequenceNode {
    pub token_pos: TokenPos,
    pub scope: Option<ScopeId>,
    pub nodes: Vec<AstNode>,
    pub label: Option<LabelId>,
}

#[derive(Debug, Clone)]
pub struct ReturnNode {
    pub token_pos: TokenPos,
    pub value: Box<AstNode>,
    /// Finally clauses to inline before leaving, innermost first.
    pub inlined_finally_list: Vec<AstNode>,
}

#[derive(Debug, Clone)]
pub struct LiteralNode {
    pub token_pos: TokenPos,
    pub literal: Instance,
}

/// A type in expression position; only the right operand of `is`/`as`
#[derive(Debug, Clone)]
pub struct TypeNode {
    pub token_pos: TokenPos,
    pub ty: AbstractType,
}

/// An expression checked against a declared type on assignment
#[derive(Debug, Clone)]
pub struct AssignableNode {
    pub token_pos: TokenPos,
    pub expr: Box<AstNode>,
    pub ty: AbstractType,
    pub dst_name: String,
}

#[derive(Debug, Clone)]
pub struct BinaryOpNode {
    pub token_pos: TokenPos,
    pub kind: TokenKind,
    pub left: Box<AstNode>,
    pub right: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct UnaryOpNode {
    pub token_pos: TokenPos,
    pub kind: TokenKind,
    pub operand: Box<AstNode>,
}

/// Comparisons, type tests (`is`, `is!`) and casts (`as`)
#[derive(Debug, Clone)]
pub struct ComparisonNode {
    pub token_pos: TokenPos,
    pub kind: TokenKind,
    pub left: Box<AstNode>,
    pub right: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct ConditionalNode {
    pub token_pos: TokenPos,
    pub condition: Box<AstNode>,
    pub true_expr: Box<AstNode>,
    pub false_expr: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct IfNode {
    pub token_pos: TokenPos,
    pub condition: Box<AstNode>,
    pub true_branch: Box<AstNode>,
    pub false_branch: Option<Box<AstNode>>,
}

#[derive(Debug, Clone)]
pub struct SwitchNode {
    pub token_pos: TokenPos,
    pub label: LabelId,
    /// A sequence of case nodes.
    pub body: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct CaseNode {
    pub token_pos: TokenPos,
    pub label: Option<LabelId>,
    pub case_expressions: Vec<AstNode>,
    pub contains_default: bool,
    pub statements: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct WhileNode {
    pub token_pos: TokenPos,
    pub label: LabelId,
    pub condition: Box<AstNode>,
    pub body: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct DoWhileNode {
    pub token_pos: TokenPos,
    pub label: LabelId,
    pub condition: Box<AstNode>,
    pub body: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct ForNode {
    pub token_pos: TokenPos,
    pub label: LabelId,
    pub initializer: Box<AstNode>,
    /// Missing condition means an endless loop.
    pub condition: Option<Box<AstNode>>,
    pub increment: Box<AstNode>,
    pub body: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct JumpNode {
    pub token_pos: TokenPos,
    pub kind: JumpKind,
    pub label: LabelId,
    pub inlined_finally_list: Vec<AstNode>,
}

#[derive(Debug, Clone)]
pub struct ArrayNode {
    pub token_pos: TokenPos,
    pub type_arguments: Option<TypeArguments>,
    pub elements: Vec<AstNode>,
}

#[derive(Debug, Clone)]
pub struct ClosureNode {
    pub token_pos: TokenPos,
    pub function: Function,
    /// Receiver expression for implicit instance closures.
    pub receiver: Option<Box<AstNode>>,
}

#[derive(Debug, Clone)]
pub struct InstanceCallNode {
    pub token_pos: TokenPos,
    pub receiver: Box<AstNode>,
    pub function_name: String,
    pub arguments: ArgumentList,
}

#[derive(Debug, Clone)]
pub struct StaticCallNode {
    pub token_pos: TokenPos,
    pub function: Function,
    pub arguments: ArgumentList,
}

#[derive(Debug, Clone)]
pub struct ClosureCallNode {
    pub token_pos: TokenPos,
    pub closure: Box<AstNode>,
    pub arguments: ArgumentList,
}

/// Clone the current context at loop-scope boundaries so each iteration
/// captures distinct variables
#[derive(Debug, Clone)]
pub struct CloneContextNode {
    pub token_pos: TokenPos,
}

#[derive(Debug, Clone)]
pub struct ConstructorCallNode {
    pub token_pos: TokenPos,
    pub type_arguments: Option<TypeArguments>,
    pub constructor: Function,
    pub arguments: ArgumentList,
    /// Stack temp holding the allocated object while the constructor runs.
    pub allocated_object_var: VarId,
}

#[derive(Debug, Clone)]
pub struct InstanceGetterNode {
    pub token_pos: TokenPos,
    pub receiver: Box<AstNode>,
    pub field_name: String,
}

#[derive(Debug, Clone)]
pub struct InstanceSetterNode {
    pub token_pos: TokenPos,
    pub receiver: Box<AstNode>,
    pub field_name: String,
    pub value: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct StaticGetterNode {
    pub token_pos: TokenPos,
    pub cls: ClassId,
    pub field_name: String,
    /// The resolved static getter function.
    pub getter_function: Function,
}

#[derive(Debug, Clone)]
pub struct StaticSetterNode {
    pub token_pos: TokenPos,
    pub cls: ClassId,
    pub field_name: String,
    /// The resolved static setter function.
    pub setter_function: Function,
    pub value: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct NativeBodyNode {
    pub token_pos: TokenPos,
    pub native_name: String,
}

#[derive(Debug, Clone)]
pub struct LoadLocalNode {
    pub token_pos: TokenPos,
    pub local: VarId,
    /// Side-effecting expression evaluated before the load, if any.
    pub pseudo: Option<Box<AstNode>>,
}

#[derive(Debug, Clone)]
pub struct StoreLocalNode {
    pub token_pos: TokenPos,
    pub local: VarId,
    pub value: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct LoadInstanceFieldNode {
    pub token_pos: TokenPos,
    pub field: Field,
    pub instance: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct StoreInstanceFieldNode {
    pub token_pos: TokenPos,
    pub field: Field,
    pub instance: Box<AstNode>,
    pub value: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct LoadStaticFieldNode {
    pub token_pos: TokenPos,
    pub field: Field,
}

#[derive(Debug, Clone)]
pub struct StoreStaticFieldNode {
    pub token_pos: TokenPos,
    pub field: Field,
    pub value: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct LoadIndexedNode {
    pub token_pos: TokenPos,
    pub array: Box<AstNode>,
    pub index_expr: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct StoreIndexedNode {
    pub token_pos: TokenPos,
    pub array: Box<AstNode>,
    pub index_expr: Box<AstNode>,
    pub value: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct CatchClauseNode {
    pub token_pos: TokenPos,
    /// Local the runtime stores the caught exception into.
    pub exception_var: VarId,
    /// Local the runtime stores the stack trace into.
    pub stacktrace_var: VarId,
    /// Local holding the context saved on try entry.
    pub context_var: VarId,
    pub body: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct TryCatchNode {
    pub token_pos: TokenPos,
    pub try_block: Box<AstNode>,
    /// Local holding the context saved on try entry.
    pub context_var: VarId,
    pub catch_block: Option<Box<CatchClauseNode>>,
    pub finally_block: Option<Box<AstNode>>,
    /// Continue label joining control flow after the catch block.
    pub end_catch_label: Option<LabelId>,
}

/// A finally clause inlined at a return or jump site
#[derive(Debug, Clone)]
pub struct InlinedFinallyNode {
    pub token_pos: TokenPos,
    /// Local holding the context saved on entry to the guarded block.
    pub context_var: VarId,
    pub finally_block: Box<AstNode>,
}

#[derive(Debug, Clone)]
pub struct ThrowNode {
    pub token_pos: TokenPos,
    pub exception: Box<AstNode>,
    /// Present for rethrows.
    pub stacktrace: Option<Box<AstNode>>,
}

/// Every AST node kind the flow-graph builder visits
#[derive(Debug, Clone)]
pub enum AstNode {
    Sequence(SequenceNode),
    Return(ReturnNode),
    Literal(LiteralNode),
    Type(TypeNode),
    Assignable(AssignableNode),
    BinaryOp(BinaryOpNode),
    UnaryOp(UnaryOpNode),
    Comparison(ComparisonNode),
    Conditional(ConditionalNode),
    If(IfNode),
    Switch(SwitchNode),
    Case(CaseNode),
    While(WhileNode),
    DoWhile(DoWhileNode),
    For(ForNode),
    Jump(JumpNode),
    Array(ArrayNode),
    Closure(ClosureNode),
    InstanceCall(InstanceCallNode),
    StaticCall(StaticCallNode),
    ClosureCall(ClosureCallNode),
    CloneContext(CloneContextNode),
    ConstructorCall(ConstructorCallNode),
    InstanceGetter(InstanceGetterNode),
    InstanceSetter(InstanceSetterNode),
    StaticGetter(StaticGetterNode),
    StaticSetter(StaticSetterNode),
    NativeBody(NativeBodyNode),
    LoadLocal(LoadLocalNode),
    StoreLocal(StoreLocalNode),
    LoadInstanceField(LoadInstanceFieldNode),
    StoreInstanceField(StoreInstanceFieldNode),
    LoadStaticField(LoadStaticFieldNode),
    StoreStaticField(StoreStaticFieldNode),
    LoadIndexed(LoadIndexedNode),
    StoreIndexed(StoreIndexedNode),
    TryCatch(TryCatchNode),
    CatchClause(CatchClauseNode),
    InlinedFinally(InlinedFinallyNode),
    Throw(ThrowNode),
}

impl AstNode {
    pub fn token_pos(&self) -> TokenPos {
        match self {
            AstNode::Sequence(n) => n.token_pos,
            AstNode::Return(n) => n.token_pos,
            AstNode::Literal(n) => n.token_pos,
            AstNode::Type(n) => n.token_pos,
            AstNode::Assignable(n) => n.token_pos,
            AstNode::BinaryOp(n) => n.token_pos,
            AstNode::UnaryOp(n) => n.token_pos,
            AstNode::Comparison(n) => n.token_pos,
            AstNode::Conditional(n) => n.token_pos,
            AstNode::If(n) => n.token_pos,
            AstNode::Switch(n) => n.token_pos,
            AstNode::Case(n) => n.token_pos,
            AstNode::While(n) => n.token_pos,
            AstNode::DoWhile(n) => n.token_pos,
            AstNode::For(n) => n.token_pos,
            AstNode::Jump(n) => n.token_pos,
            AstNode::Array(n) => n.token_pos,
            AstNode::Closure(n) => n.token_pos,
            AstNode::InstanceCall(n) => n.token_pos,
            AstNode::StaticCall(n) => n.token_pos,
            AstNode::ClosureCall(n) => n.token_pos,
            AstNode::CloneContext(n) => n.token_pos,
            AstNode::ConstructorCall(n) => n.token_pos,
            AstNode::InstanceGetter(n) => n.token_pos,
            AstNode::InstanceSetter(n) => n.token_pos,
            AstNode::StaticGetter(n) => n.token_pos,
            AstNode::StaticSetter(n) => n.token_pos,
            AstNode::NativeBody(n) => n.token_pos,
            AstNode::LoadLocal(n) => n.token_pos,
            AstNode::StoreLocal(n) => n.token_pos,
            AstNode::LoadInstanceField(n) => n.token_pos,
            AstNode::StoreInstanceField(n) => n.token_pos,
            AstNode::LoadStaticField(n) => n.token_pos,
            AstNode::StoreStaticField(n) => n.token_pos,
            AstNode::LoadIndexed(n) => n.token_pos,
            AstNode::StoreIndexed(n) => n.token_pos,
            AstNode::TryCatch(n) => n.token_pos,
            AstNode::CatchClause(n) => n.token_pos,
            AstNode::InlinedFinally(n) => n.token_pos,
            AstNode::Throw(n) => n.token_pos,
        }
    }

    pub fn as_literal(&self) -> Option<&LiteralNode> {
        match self {
            AstNode::Literal(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeNode> {
        match self {
            AstNode::Type(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceNode> {
        match self {
            AstNode::Sequence(n) => Some(n),
            _ => None,
        }
    }

    /// Short kind name, used by the AST printer.
    pub fn kind_name(&self) -> &'static str {
        match self {
            AstNode::Sequence(_) => "Sequence",
            AstNode::Return(_) => "Return",
            AstNode::Literal(_) => "Literal",
            AstNode::Type(_) => "Type",
            AstNode::Assignable(_) => "Assignable",
            AstNode::BinaryOp(_) => "BinaryOp",
            AstNode::UnaryOp(_) => "UnaryOp",
            AstNode::Comparison(_) => "Comparison",
            AstNode::Conditional(_) => "Conditional",
            AstNode::If(_) => "If",
            AstNode::Switch(_) => "Switch",
            AstNode::Case(_) => "Case",
            AstNode::While(_) => "While",
            AstNode::DoWhile(_) => "DoWhile",
            AstNode::For(_) => "For",
            AstNode::Jump(_) => "Jump",
            AstNode::Array(_) => "Array",
            AstNode::Closure(_) => "Closure",
            AstNode::InstanceCall(_) => "InstanceCall",
            AstNode::StaticCall(_) => "StaticCall",
            AstNode::ClosureCall(_) => "ClosureCall",
            AstNode::CloneContext(_) => "CloneContext",
            AstNode::ConstructorCall(_) => "ConstructorCall",
            AstNode::InstanceGetter(_) => "InstanceGetter",
            AstNode::InstanceSetter(_) => "InstanceSetter",
            AstNode::StaticGetter(_) => "StaticGetter",
            AstNode::StaticSetter(_) => "StaticSetter",
            AstNode::NativeBody(_) => "NativeBody",
            AstNode::LoadLocal(_) => "LoadLocal",
            AstNode::StoreLocal(_) => "StoreLocal",
            AstNode::LoadInstanceField(_) => "LoadInstanceField",
            AstNode::StoreInstanceField(_) => "StoreInstanceField",
            AstNode::LoadStaticField(_) => "LoadStaticField",
            AstNode::StoreStaticField(_) => "StoreStaticField",
            AstNode::LoadIndexed(_) => "LoadIndexed",
            AstNode::StoreIndexed(_) => "StoreIndexed",
            AstNode::TryCatch(_) => "TryCatch",
            AstNode::CatchClause(_) => "CatchClause",
            AstNode::InlinedFinally(_) => "InlinedFinally",
            AstNode::Throw(_) => "Throw",
        }
    }
}
