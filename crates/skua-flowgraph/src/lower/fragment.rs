//! Open-ended CFG fragments
//!
//! A fragment is a possibly-open sub-graph under construction: an entry,
//! an exit that can still be extended, and the current height of the
//! expression temp stack. Fragments are assembled bottom-up by the AST
//! visitor and spliced together through the arena.

use crate::ir::{Graph, InstrId};

/// A partial sub-graph with a possibly-open exit
///
/// States: *empty* (no entry), *open* (empty, or exit still extendable)
/// and *closed* (entry present but no exit; the fragment is terminated).
#[derive(Debug)]
pub struct Fragment {
    pub entry: Option<InstrId>,
    pub exit: Option<InstrId>,
    /// Height of the expression temp stack at the fragment's exit.
    pub temp_index: usize,
}

impl Fragment {
    pub fn new(temp_index: usize) -> Self {
        Self {
            entry: None,
            exit: None,
            temp_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    pub fn is_open(&self) -> bool {
        self.is_empty() || self.exit.is_some()
    }

    /// Splice `other` onto this fragment's open exit. Appending a closed
    /// fragment closes this one.
    pub fn append(&mut self, graph: &mut Graph, other: Fragment) {
        assert!(self.is_open());
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            self.entry = other.entry;
        } else {
            let exit = self.exit.expect("open non-empty fragment has an exit");
            graph.set_successor(exit, other.entry.expect("non-empty fragment has an entry"));
        }
        self.exit = other.exit;
        self.temp_index = other.temp_index;
    }

    /// Terminate the fragment.
    pub fn close(&mut self) {
        assert!(self.is_open());
        self.exit = None;
    }
}

/// Append a fragment to a block entry, returning the exit of the result:
/// the entry itself for an empty fragment, `None` when the fragment is
/// closed.
pub fn append_fragment(graph: &mut Graph, entry: InstrId, fragment: Fragment) -> Option<InstrId> {
    if fragment.is_empty() {
        return Some(entry);
    }
    graph.set_successor(entry, fragment.entry.expect("non-empty fragment has an entry"));
    fragment.exit
}
