//! Pretty-printing for the flow graph
//!
//! Provides the human-readable dump behind `print_flow_graph` and the
//! structured emission consumed by external graph tooling.

use super::instr::{Graph, Instr, InstrId};
use super::value::Value;
use std::fmt::Write as _;
use std::io::{self, Write};

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

/// Renders one instruction's produced-value name: SSA temp if assigned,
/// pre-SSA temp otherwise.
fn def_name(graph: &Graph, id: InstrId) -> String {
    match graph.instr(id) {
        Instr::Bind {
            ssa_temp_index: Some(n),
            ..
        }
        | Instr::Phi {
            ssa_temp_index: Some(n),
            ..
        }
        | Instr::Parameter {
            ssa_temp_index: Some(n),
            ..
        } => format!("v{}", n),
        Instr::Bind {
            temp_index: Some(t),
            ..
        } => format!("t{}", t),
        Instr::Parameter { index, .. } => format!("p{}", index),
        _ => format!("{}", id),
    }
}

fn value_name(graph: &Graph, value: &Value) -> String {
    match value {
        Value::Constant { literal } => format!("#{}", literal),
        Value::Use { definition } => def_name(graph, *definition),
    }
}

/// Pretty-printer over a numbered graph
pub struct FlowGraphPrinter<'a> {
    function_name: &'a str,
    graph: &'a Graph,
    /// Block entries in reverse postorder.
    block_order: &'a [InstrId],
}

impl<'a> FlowGraphPrinter<'a> {
    pub fn new(function_name: &'a str, graph: &'a Graph, block_order: &'a [InstrId]) -> Self {
        Self {
            function_name,
            graph,
            block_order,
        }
    }

    pub fn print_blocks(&self) -> String {
        let mut out = String::new();
        writeln!(out, "==== {}", self.function_name).unwrap();
        for &entry in self.block_order {
            self.print_block(entry, &mut out);
        }
        out
    }

    fn print_block(&self, entry: InstrId, out: &mut String) {
        let graph = self.graph;
        let info = graph.block_info(entry);
        let id = info.block_id.unwrap_or(usize::MAX);
        match graph.instr(entry) {
            Instr::GraphEntry { .. } => writeln!(out, "B{} [graph entry]", id).unwrap(),
            Instr::TargetEntry { try_index, .. } => {
                write!(out, "B{} [target", id).unwrap();
                if let Some(t) = try_index {
                    write!(out, " try_idx {}", t).unwrap();
                }
                writeln!(out, "]").unwrap();
            }
            Instr::JoinEntry { phis, .. } => {
                write!(out, "B{} [join", id).unwrap();
                write!(out, " pred(").unwrap();
                for (i, p) in info.predecessors.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ").unwrap();
                    }
                    write!(
                        out,
                        "B{}",
                        graph.block_info(*p).block_id.unwrap_or(usize::MAX)
                    )
                    .unwrap();
                }
                writeln!(out, ")]").unwrap();
                if let Some(phis) = phis {
                    for (var, phi) in phis.iter().enumerate() {
                        if let Some(phi) = phi {
                            if let Instr::Phi { inputs, .. } = graph.instr(*phi) {
                                write!(out, "    {} <- phi[{}](", def_name(graph, *phi), var)
                                    .unwrap();
                                for (i, input) in inputs.iter().enumerate() {
                                    if i > 0 {
                                        write!(out, ", ").unwrap();
                                    }
                                    match input {
                                        Some(v) => {
                                            write!(out, "{}", value_name(graph, v)).unwrap()
                                        }
                                        None => write!(out, "_").unwrap(),
                                    }
                                }
                                writeln!(out, ")").unwrap();
                            }
                        }
                    }
                }
            }
            _ => unreachable!("block order holds block entries only"),
        }

        // Straight-line body.
        let mut current = graph.successor(entry);
        while let Some(id) = current {
            if graph.instr(id).is_block_entry() {
                writeln!(
                    out,
                    "    goto B{}",
                    graph.block_info(id).block_id.unwrap_or(usize::MAX)
                )
                .unwrap();
                return;
            }
            self.print_instr(id, out);
            current = graph.successor(id);
        }
    }

    fn print_instr(&self, id: InstrId, out: &mut String) {
        let graph = self.graph;
        match graph.instr(id) {
            Instr::Do { comp, .. } => writeln!(out, "    {}", render_comp(graph, comp)).unwrap(),
            Instr::Bind { comp, .. } => writeln!(
                out,
                "    {} <- {}",
                def_name(graph, id),
                render_comp(graph, comp)
            )
            .unwrap(),
            Instr::Branch {
                value,
                true_successor,
                false_successor,
                ..
            } => {
                let t = true_successor
                    .map(|b| graph.block_info(b).block_id.unwrap_or(usize::MAX))
                    .unwrap_or(usize::MAX);
                let f = false_successor
                    .map(|b| graph.block_info(b).block_id.unwrap_or(usize::MAX))
                    .unwrap_or(usize::MAX);
                writeln!(
                    out,
                    "    if {} goto (B{}, B{})",
                    value_name(graph, value),
                    t,
                    f
                )
                .unwrap();
            }
            Instr::Return { value, .. } => {
                writeln!(out, "    return {}", value_name(graph, value)).unwrap()
            }
            Instr::Throw { exception, .. } => {
                writeln!(out, "    throw {}", value_name(graph, exception)).unwrap()
            }
            Instr::ReThrow {
                exception,
                stacktrace,
                ..
            } => writeln!(
                out,
                "    rethrow {}, {}",
                value_name(graph, exception),
                value_name(graph, stacktrace)
            )
            .unwrap(),
            other => unreachable!("not a straight-line instruction: {:?}", other),
        }
    }
}

/// Render a computation with its operand values resolved to temp names.
fn render_comp(graph: &Graph, comp: &super::computation::Computation) -> String {
    // Reuse the computation's Display but patch operand spellings, which
    // print as raw arena ids there. Replace higher ids first so an id that
    // is a prefix of another cannot clobber it.
    let mut text = format!("{}", comp);
    let mut uses: Vec<InstrId> = comp.inputs().iter().filter_map(|v| v.definition()).collect();
    uses.sort_by_key(|id| std::cmp::Reverse(id.0));
    uses.dedup();
    for id in uses {
        text = text.replace(&format!("{}", id), &def_name(graph, id));
    }
    text
}

/// Structured graph emission for external visualisation tooling
pub struct GraphWriter<'a> {
    function_name: &'a str,
    graph: &'a Graph,
    block_order: &'a [InstrId],
}

impl<'a> GraphWriter<'a> {
    pub fn new(function_name: &'a str, graph: &'a Graph, block_order: &'a [InstrId]) -> Self {
        Self {
            function_name,
            graph,
            block_order,
        }
    }

    /// Emit the graph as nested begin/end records.
    pub fn write_function(&self, sink: &mut dyn Write) -> io::Result<()> {
        writeln!(sink, "begin_function {}", self.function_name)?;
        for &entry in self.block_order {
            let info = self.graph.block_info(entry);
            let id = info.block_id.unwrap_or(usize::MAX);
            write!(sink, "  begin_block B{} preds", id)?;
            for p in &info.predecessors {
                write!(
                    sink,
                    " B{}",
                    self.graph.block_info(*p).block_id.unwrap_or(usize::MAX)
                )?;
            }
            if let Some(dom) = info.dominator {
                write!(
                    sink,
                    " dom B{}",
                    self.graph.block_info(dom).block_id.unwrap_or(usize::MAX)
                )?;
            }
            writeln!(sink)?;
            let printer = FlowGraphPrinter::new(self.function_name, self.graph, &[]);
            let mut body = String::new();
            printer.print_block(entry, &mut body);
            for line in body.lines().skip(1) {
                writeln!(sink, "  {}", line)?;
            }
            writeln!(sink, "  end_block")?;
        }
        writeln!(sink, "end_function")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instr::BlockInfo;
    use crate::ir::Computation;
    use skua_ast::TokenPos;
    use skua_types::Instance;

    #[test]
    fn test_prints_bind_and_return() {
        let mut graph = Graph::new();
        let entry = graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        graph.block_info_mut(entry).block_id = Some(0);
        let bind = graph.alloc(Instr::Bind {
            comp: Computation::Constant {
                token_pos: TokenPos(0),
                literal: Instance::Smi(7),
            },
            temp_index: Some(0),
            ssa_temp_index: None,
            successor: None,
            previous: None,
            env: None,
        });
        let ret = graph.alloc(Instr::Return {
            token_pos: TokenPos(0),
            value: Value::use_of(bind),
            previous: None,
            env: None,
        });
        graph.set_successor(entry, bind);
        graph.set_successor(bind, ret);

        let order = vec![entry];
        let dump = FlowGraphPrinter::new("f", &graph, &order).print_blocks();
        assert!(dump.contains("==== f"));
        assert!(dump.contains("t0 <- 7"));
        assert!(dump.contains("return t0"));
    }
}
