//! AST dump used by the `print_ast` diagnostic flag

use crate::nodes::{ArgumentList, AstNode};
use crate::parsed::ParsedFunction;
use std::fmt::Write;

/// Renders a parsed function's AST as an indented tree.
pub struct AstPrinter<'a> {
    parsed: &'a ParsedFunction,
}

impl<'a> AstPrinter<'a> {
    pub fn new(parsed: &'a ParsedFunction) -> Self {
        Self { parsed }
    }

    pub fn print(&self) -> String {
        let mut out = String::new();
        writeln!(out, "ast for {}", self.parsed.function().name).unwrap();
        self.print_node(self.parsed.node_sequence(), 1, &mut out);
        out
    }

    fn print_node(&self, node: &AstNode, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        write!(out, "{}{}", pad, node.kind_name()).unwrap();
        match node {
            AstNode::Literal(n) => writeln!(out, " {}", n.literal).unwrap(),
            AstNode::Type(n) => writeln!(out, " {}", n.ty).unwrap(),
            AstNode::BinaryOp(n) => writeln!(out, " {}", n.kind).unwrap(),
            AstNode::UnaryOp(n) => writeln!(out, " {}", n.kind).unwrap(),
            AstNode::Comparison(n) => writeln!(out, " {}", n.kind).unwrap(),
            AstNode::LoadLocal(n) => {
                writeln!(out, " {}", self.parsed.variable(n.local).name).unwrap()
            }
            AstNode::StoreLocal(n) => {
                writeln!(out, " {}", self.parsed.variable(n.local).name).unwrap()
            }
            AstNode::InstanceCall(n) => writeln!(out, " {}", n.function_name).unwrap(),
            AstNode::StaticCall(n) => writeln!(out, " {}", n.function.name).unwrap(),
            AstNode::ConstructorCall(n) => writeln!(out, " {}", n.constructor.name).unwrap(),
            AstNode::InstanceGetter(n) => writeln!(out, " {}", n.field_name).unwrap(),
            AstNode::InstanceSetter(n) => writeln!(out, " {}", n.field_name).unwrap(),
            AstNode::StaticGetter(n) => writeln!(out, " {}", n.field_name).unwrap(),
            AstNode::StaticSetter(n) => writeln!(out, " {}", n.field_name).unwrap(),
            AstNode::NativeBody(n) => writeln!(out, " {}", n.native_name).unwrap(),
            AstNode::LoadInstanceField(n) => writeln!(out, " {}", n.field.name).unwrap(),
            AstNode::StoreInstanceField(n) => writeln!(out, " {}", n.field.name).unwrap(),
            AstNode::LoadStaticField(n) => writeln!(out, " {}", n.field.name).unwrap(),
            AstNode::StoreStaticField(n) => writeln!(out, " {}", n.field.name).unwrap(),
            _ => writeln!(out).unwrap(),
        }
        for child in children_of(node) {
            self.print_node(child, depth + 1, out);
        }
    }
}

fn argument_children(args: &ArgumentList) -> impl Iterator<Item = &AstNode> {
    args.nodes.iter()
}

fn children_of(node: &AstNode) -> Vec<&AstNode> {
    match node {
        AstNode::Sequence(n) => n.nodes.iter().collect(),
        AstNode::Return(n) => {
            let mut v: Vec<&AstNode> = n.inlined_finally_list.iter().collect();
            v.push(&*n.value);
            v
        }
        AstNode::Assignable(n) => vec![&*n.expr],
        AstNode::BinaryOp(n) => vec![&*n.left, &*n.right],
        AstNode::UnaryOp(n) => vec![&*n.operand],
        AstNode::Comparison(n) => vec![&*n.left, &*n.right],
        AstNode::Conditional(n) => vec![&*n.condition, &*n.true_expr, &*n.false_expr],
        AstNode::If(n) => {
            let mut v = vec![&*n.condition, &*n.true_branch];
            if let Some(e) = &n.false_branch {
                v.push(e);
            }
            v
        }
        AstNode::Switch(n) => vec![&*n.body],
        AstNode::Case(n) => {
            let mut v: Vec<&AstNode> = n.case_expressions.iter().collect();
            v.push(&*n.statements);
            v
        }
        AstNode::While(n) => vec![&*n.condition, &*n.body],
        AstNode::DoWhile(n) => vec![&*n.body, &*n.condition],
        AstNode::For(n) => {
            let mut v = vec![&*n.initializer];
            if let Some(c) = &n.condition {
                v.push(c);
            }
            v.push(&*n.increment);
            v.push(&*n.body);
            v
        }
        AstNode::Jump(n) => n.inlined_finally_list.iter().collect(),
        AstNode::Array(n) => n.elements.iter().collect(),
        AstNode::Closure(n) => n.receiver.iter().map(|b| &**b).collect(),
        AstNode::InstanceCall(n) => {
            let mut v = vec![&*n.receiver];
            v.extend(argument_children(&n.arguments));
            v
        }
        AstNode::StaticCall(n) => argument_children(&n.arguments).collect(),
        AstNode::ClosureCall(n) => {
            let mut v = vec![&*n.closure];
            v.extend(argument_children(&n.arguments));
            v
        }
        AstNode::ConstructorCall(n) => argument_children(&n.arguments).collect(),
        AstNode::InstanceGetter(n) => vec![&*n.receiver],
        AstNode::InstanceSetter(n) => vec![&*n.receiver, &*n.value],
        AstNode::StaticSetter(n) => vec![&*n.value],
        AstNode::LoadLocal(n) => n.pseudo.iter().map(|b| &**b).collect(),
        AstNode::StoreLocal(n) => vec![&*n.value],
        AstNode::LoadInstanceField(n) => vec![&*n.instance],
        AstNode::StoreInstanceField(n) => vec![&*n.instance, &*n.value],
        AstNode::StoreStaticField(n) => vec![&*n.value],
        AstNode::LoadIndexed(n) => vec![&*n.array, &*n.index_expr],
        AstNode::StoreIndexed(n) => vec![&*n.array, &*n.index_expr, &*n.value],
        AstNode::TryCatch(n) => {
            let mut v = vec![&*n.try_block];
            if let Some(c) = &n.catch_block {
                v.push(&*c.body);
            }
            if let Some(f) = &n.finally_block {
                v.push(f);
            }
            v
        }
        AstNode::CatchClause(n) => vec![&*n.body],
        AstNode::InlinedFinally(n) => vec![&*n.finally_block],
        AstNode::Throw(n) => {
            let mut v = vec![&*n.exception];
            if let Some(s) = &n.stacktrace {
                v.push(s);
            }
            v
        }
        AstNode::Literal(_)
        | AstNode::Type(_)
        | AstNode::CloneContext(_)
        | AstNode::StaticGetter(_)
        | AstNode::NativeBody(_)
        | AstNode::LoadStaticField(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::Function;
    use crate::nodes::*;
    use crate::token::{TokenKind, TokenPos};
    use skua_types::{AbstractType, Instance, TypeSystem};

    #[test]
    fn test_prints_nested_tree() {
        let mut f = Function::new("main", TypeSystem::OBJECT, AbstractType::dynamic());
        f.is_static = true;
        let mut parsed = ParsedFunction::new(f);
        let root = parsed.root_scope();
        parsed.set_node_sequence(AstNode::Sequence(SequenceNode {
            token_pos: TokenPos(0),
            scope: Some(root),
            nodes: vec![AstNode::Return(ReturnNode {
                token_pos: TokenPos(1),
                value: Box::new(AstNode::BinaryOp(BinaryOpNode {
                    token_pos: TokenPos(2),
                    kind: TokenKind::Add,
                    left: Box::new(AstNode::Literal(LiteralNode {
                        token_pos: TokenPos(2),
                        literal: Instance::Smi(1),
                    })),
                    right: Box::new(AstNode::Literal(LiteralNode {
                        token_pos: TokenPos(3),
                        literal: Instance::Smi(2),
                    })),
                })),
                inlined_finally_list: vec![],
            })],
            label: None,
        }));

        let dump = AstPrinter::new(&parsed).print();
        assert!(dump.contains("ast for main"));
        assert!(dump.contains("Return"));
        assert!(dump.contains("BinaryOp +"));
        assert!(dump.contains("Literal 1"));
    }
}
