//! Builder errors

use thiserror::Error;

pub type BuildResult<T> = Result<T, Bailout>;

/// Non-recoverable "this function cannot be compiled by the current
/// pipeline configuration" signal
///
/// Unwinds to the compiler driver through ordinary `Result` propagation;
/// the partial graph is discarded with the builder. Everything else the
/// builder could complain about is an internal invariant and asserts
/// instead.
#[derive(Debug, Error)]
#[error("FlowGraphBuilder Bailout: {function} {reason}")]
pub struct Bailout {
    /// Name of the function being compiled.
    pub function: String,
    pub reason: String,
}

impl Bailout {
    pub fn new(function: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_format() {
        let b = Bailout::new("main", "Catch-entry support in SSA.");
        assert_eq!(
            b.to_string(),
            "FlowGraphBuilder Bailout: main Catch-entry support in SSA."
        );
    }
}
