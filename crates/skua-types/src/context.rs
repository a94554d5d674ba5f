//! Heap context layout
//!
//! Captured variables live in heap-allocated `Context` objects chained
//! through a parent pointer. The compiler only needs the word-slot offsets
//! of the parent pointer and the variable array; the object itself is
//! runtime territory.

/// Layout constants for runtime context objects
pub struct Context;

impl Context {
    /// Word-slot offset of the parent-context pointer.
    pub const fn parent_offset() -> usize {
        1
    }

    /// Word-slot offset of the captured variable at `index`.
    pub const fn variable_offset(index: usize) -> usize {
        2 + index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_do_not_overlap() {
        assert!(Context::variable_offset(0) > Context::parent_offset());
        assert_eq!(Context::variable_offset(3), Context::variable_offset(0) + 3);
    }
}
