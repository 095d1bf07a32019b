//! swizzle-runtime: the class/selector/method-table object model that
//! swizzle-intercept hooks into.
//!
//! Classes own a table of methods keyed by interned selectors. Each method
//! carries an optional type encoding and an atomically swappable
//! implementation pointer. Objects start with an `isa` pointer to their class
//! and messages are sent by resolving the current implementation and calling
//! it with the receiver and selector as the two leading arguments.

pub mod class;
pub mod error;
pub mod object;
pub mod selector;

pub use class::{Class, Imp, Method};
pub use error::{Result, RuntimeError};
pub use object::Object;
pub use selector::Sel;
