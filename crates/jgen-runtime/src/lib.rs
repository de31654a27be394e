//! Backtracking match runtime linked by parsers generated with `jgen`.
//!
//! Generated code only ever talks to a [`Cursor`] through `match_byte`,
//! `literal`, `range`, the zero-width assertions and the closure based
//! combinators (`all`, `star`, `plus`, `opt`, `not`). Rule parameters are
//! passed around as [`Arg`].

pub mod arg;
pub mod cursor;

pub use arg::{unmatched_case, Arg};
pub use cursor::{Cursor, CursorPosition};
