//! Builder configuration
//!
//! Compilation flags travel as a plain struct handed to the builder at
//! construction.

/// Configuration of one flow-graph construction
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Eliminate type checks when allowed by static type analysis.
    pub eliminate_type_checks: bool,
    /// Global strict-checks mode; gates every AssertAssignable and
    /// AssertBoolean emission.
    pub enable_type_checks: bool,
    /// Build SSA form for optimised compilation.
    pub use_ssa: bool,
    /// Print the AST before graph construction.
    pub print_ast: bool,
    /// Print the finished flow graph.
    pub print_flow_graph: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            eliminate_type_checks: true,
            enable_type_checks: false,
            use_ssa: cfg!(target_pointer_width = "64"),
            print_ast: false,
            print_flow_graph: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BuilderConfig::default();
        assert!(config.eliminate_type_checks);
        assert!(!config.enable_type_checks);
        assert!(!config.print_ast);
        assert!(!config.print_flow_graph);
    }
}
