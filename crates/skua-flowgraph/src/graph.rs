//! The flow-graph builder driver
//!
//! Orchestrates the passes: visits the function body as one closed effect
//! fragment, discovers and renumbers blocks, optionally links
//! instructions backwards, runs the SSA pipeline for optimised builds,
//! and emits the finished graph.

use crate::error::BuildResult;
use crate::flags::BuilderConfig;
use crate::ir::{
    BlockInfo, Graph, GraphWriter, Instr, InstrId, PrettyPrint, TryIndex,
};
use crate::ir::pretty::FlowGraphPrinter;
use crate::lower::AstVisitor;
use crate::ssa;
use rustc_hash::FxHashMap;
use skua_ast::{AstPrinter, LabelId, ParsedFunction};
use skua_types::TypeSystem;
use std::io::{self, Write};

/// Break and continue joins materialised for one source label
#[derive(Debug, Default, Clone, Copy)]
struct LabelJoins {
    break_join: Option<InstrId>,
    continue_join: Option<InstrId>,
}

/// Builds the flow graph of one function
pub struct FlowGraphBuilder<'a> {
    pub(crate) parsed_function: &'a ParsedFunction,
    pub(crate) types: &'a TypeSystem,
    pub(crate) config: BuilderConfig,
    pub(crate) graph: Graph,
    graph_entry: Option<InstrId>,
    /// Context nesting depth at the current visitation point.
    pub(crate) context_level: usize,
    /// Try index of the enclosing try block, if any.
    pub(crate) try_index: TryIndex,
    next_try_index: u32,
    labels: FxHashMap<LabelId, LabelJoins>,
}

impl<'a> FlowGraphBuilder<'a> {
    pub fn new(
        parsed_function: &'a ParsedFunction,
        types: &'a TypeSystem,
        config: BuilderConfig,
    ) -> Self {
        Self {
            parsed_function,
            types,
            config,
            graph: Graph::new(),
            graph_entry: None,
            context_level: 0,
            try_index: None,
            next_try_index: 0,
            labels: FxHashMap::default(),
        }
    }

    pub(crate) fn allocate_try_index(&mut self) -> u32 {
        let index = self.next_try_index;
        self.next_try_index += 1;
        index
    }

    pub(crate) fn add_catch_entry(&mut self, catch_entry: InstrId) {
        let entry = self.graph_entry.expect("graph entry exists");
        self.graph.add_catch_entry(entry, catch_entry);
    }

    pub(crate) fn join_for_break(&self, label: LabelId) -> Option<InstrId> {
        self.labels.get(&label).and_then(|j| j.break_join)
    }

    pub(crate) fn join_for_continue(&self, label: LabelId) -> Option<InstrId> {
        self.labels.get(&label).and_then(|j| j.continue_join)
    }

    pub(crate) fn ensure_join_for_break(&mut self, label: LabelId) -> InstrId {
        let joins = self.labels.entry(label).or_default();
        if let Some(join) = joins.break_join {
            return join;
        }
        let join = self.graph.alloc(Instr::JoinEntry {
            block: BlockInfo::new(),
            phis: None,
            successor: None,
        });
        self.labels.entry(label).or_default().break_join = Some(join);
        join
    }

    pub(crate) fn ensure_join_for_continue(&mut self, label: LabelId) -> InstrId {
        let joins = self.labels.entry(label).or_default();
        if let Some(join) = joins.continue_join {
            return join;
        }
        let join = self.graph.alloc(Instr::JoinEntry {
            block: BlockInfo::new(),
            phis: None,
            successor: None,
        });
        self.labels.entry(label).or_default().continue_join = Some(join);
        join
    }

    /// Build the graph: lower the body, discover and number blocks, and
    /// for optimised SSA builds run dominators, φ-insertion and rename.
    pub fn build_graph(mut self, for_optimized: bool, use_ssa: bool) -> BuildResult<FlowGraph> {
        let parsed = self.parsed_function;
        if self.config.print_ast {
            println!("{}", AstPrinter::new(parsed).print());
        }

        let normal_entry = self.graph.alloc(Instr::TargetEntry {
            block: BlockInfo::new(),
            try_index: None,
            successor: None,
        });
        let graph_entry = self.graph.alloc(Instr::GraphEntry {
            block: BlockInfo::new(),
            normal_entry,
            catch_entries: Vec::new(),
            start_env: None,
        });
        self.graph_entry = Some(graph_entry);

        {
            let mut for_effect = AstVisitor::for_effect(&mut self, 0);
            for_effect.add_instruction(normal_entry);
            for_effect.visit(parsed.node_sequence())?;
            // The body must be properly terminated.
            assert!(!for_effect.fragment.is_open());
        }

        let variable_count = parsed.variable_count();
        let fixed = parsed.function().num_fixed_parameters;
        let copied = parsed.copied_parameter_count();
        let discovery = ssa::discover_blocks(
            &mut self.graph,
            graph_entry,
            variable_count,
            fixed,
            copied,
        );

        // Number blocks in reverse postorder.
        let block_count = discovery.postorder.len();
        for (i, &block) in discovery.postorder.iter().enumerate() {
            self.graph.block_info_mut(block).block_id = Some(block_count - i - 1);
        }

        if for_optimized {
            // Link instructions backwards for optimised compilation.
            for &block in &discovery.postorder {
                let mut prev = block;
                let mut current = self.graph.successor(block);
                while let Some(id) = current {
                    if self.graph.instr(id).is_block_entry() {
                        break;
                    }
                    self.graph.set_previous(id, prev);
                    prev = id;
                    current = self.graph.successor(id);
                }
            }
        }

        let mut max_ssa_temp_index = 0;
        if for_optimized && use_ssa {
            let dominance =
                ssa::compute_dominators(&mut self.graph, &discovery.preorder, &discovery.parent);
            ssa::insert_phis(
                &mut self.graph,
                &discovery.preorder,
                &discovery.assigned_vars,
                variable_count,
                &dominance.dominance_frontier,
            );
            max_ssa_temp_index = ssa::rename(&mut self.graph, graph_entry, parsed)?;
        }

        let flow_graph = FlowGraph {
            function_name: parsed.function().name.clone(),
            graph: self.graph,
            graph_entry,
            preorder: discovery.preorder,
            postorder: discovery.postorder,
            variable_count,
            max_ssa_temp_index,
        };
        if self.config.print_flow_graph {
            println!("{}", flow_graph.pretty_print());
        }
        Ok(flow_graph)
    }
}

/// The finished graph, handed to the optimisation and emission passes
#[derive(Debug)]
pub struct FlowGraph {
    pub function_name: String,
    pub graph: Graph,
    pub graph_entry: InstrId,
    /// Block entries in discovery preorder.
    pub preorder: Vec<InstrId>,
    /// Block entries in discovery postorder.
    pub postorder: Vec<InstrId>,
    pub variable_count: usize,
    /// Number of SSA temps allocated; zero when SSA did not run.
    pub max_ssa_temp_index: usize,
}

impl FlowGraph {
    /// Block entries in reverse postorder, i.e. ascending block id.
    pub fn reverse_postorder(&self) -> Vec<InstrId> {
        self.postorder.iter().rev().copied().collect()
    }

    /// Emit the structured graph-writer form.
    pub fn write_graph(&self, sink: &mut dyn Write) -> io::Result<()> {
        let order = self.reverse_postorder();
        GraphWriter::new(&self.function_name, &self.graph, &order).write_function(sink)
    }
}

impl PrettyPrint for FlowGraph {
    fn pretty_print(&self) -> String {
        let order = self.reverse_postorder();
        FlowGraphPrinter::new(&self.function_name, &self.graph, &order).print_blocks()
    }
}
