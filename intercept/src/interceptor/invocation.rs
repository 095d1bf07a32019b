//! Per-thread record of hook invocations currently running a replacement.
//!
//! A replacement that takes only the plain method arguments gets an
//! "original" callable with the same plain shape. When it calls that, the
//! receiver and selector are recovered from the innermost frame of the same
//! hook on this thread.

use core::cell::RefCell;
use core::ffi::c_void;
use core::marker::PhantomData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Frame {
    pub context: u64,
    pub receiver: *mut c_void,
    pub selector: *mut c_void,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops its frame when dropped. Not `Send`: frames belong to the thread that
/// pushed them.
pub(crate) struct FrameGuard {
    _thread_bound: PhantomData<*const ()>,
}

impl FrameGuard {
    pub(crate) fn enter(context: u64, receiver: *mut c_void, selector: *mut c_void) -> FrameGuard {
        FRAMES.with(|frames| {
            frames.borrow_mut().push(Frame {
                context,
                receiver,
                selector,
            })
        });
        FrameGuard {
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        // try_with: the guard may outlive the thread-local during thread exit.
        let _ = FRAMES.try_with(|frames| frames.borrow_mut().pop());
    }
}

/// Innermost active frame of hook `context` on this thread.
pub(crate) fn current(context: u64) -> Option<Frame> {
    FRAMES.with(|frames| frames.borrow().iter().rev().find(|f| f.context == context).copied())
}

/// Whether the calling thread is inside a hook replacement.
pub fn in_dispatch() -> bool {
    depth() > 0
}

/// Number of hook replacements active on the calling thread.
pub fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}
