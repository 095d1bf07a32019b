//! Call shapes and the executable trampolines prepared from them.

pub mod call_shape;
pub mod trampoline;

pub use call_shape::{CallShape, ReturnBuffer};
pub use trampoline::{DispatchFn, Trampoline};
