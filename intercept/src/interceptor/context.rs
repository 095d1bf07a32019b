use core::ffi::c_void;
use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use swizzle_runtime::{Class, Imp, Method, Sel};

use crate::code::{CallShape, Trampoline};
use crate::interceptor::dispatch::{self, fatal};
use crate::interceptor::invocation::{self, FrameGuard};
use crate::interceptor::replacement::Replacement;
use crate::signature::layout::{Arguments, Layout};
use crate::signature::Signature;
use crate::types::{HookMode, Result};

const UNINSTALLED: u8 = 0;
const INSTALLED: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Uninstalled,
    Installed,
    Cancelled,
}

/// One installed hook: the trampoline that sits in a method slot, the shapes
/// needed to call through it, and where "the original" currently lives.
///
/// Trampolines are declared first so their closures are freed before the
/// call shapes they point into.
pub(crate) struct HookContext {
    trampoline: Trampoline<Weak<HookContext>>,
    forwarder: Option<Trampoline<Weak<HookContext>>>,
    method_shape: CallShape,
    replacement_shape: CallShape,
    original_shape: Option<CallShape>,
    id: u64,
    class: &'static Class,
    selector: Sel,
    mode: HookMode,
    layout: Layout,
    replacement: Arc<Replacement>,
    /// Slot value displaced at install. Never changes afterwards.
    original: AtomicPtr<c_void>,
    /// Where calls forward to. Starts as `original`, relinked when the hook
    /// this one wraps is cancelled.
    next: AtomicPtr<c_void>,
    state: AtomicU8,
    trace: bool,
}

// Trampoline userdata refers back to the context; every other field is
// immutable after construction or atomic.
unsafe impl Send for HookContext {}
unsafe impl Sync for HookContext {}

impl HookContext {
    /// Resolves shapes and binds trampolines. Touches no method slot, so a
    /// failure here leaves dispatch state as it was.
    pub(crate) fn prepare(
        id: u64,
        class: &'static Class,
        method: &Method,
        mode: HookMode,
        replacement: Arc<Replacement>,
        trace: bool,
    ) -> Result<Arc<HookContext>> {
        let method_signature = Signature::for_method(class.name(), method)?;
        let replacement_signature = replacement.signature()?;
        let layout = Layout::resolve(mode, &method_signature, &replacement_signature)?;

        let method_shape = CallShape::new(&method_signature)?;
        let replacement_shape = CallShape::new(&replacement_signature)?;
        let original_shape = layout
            .original_signature(&method_signature)
            .map(|signature| CallShape::new(&signature))
            .transpose()?;

        let mut trampoline = Trampoline::allocate()?;
        let mut forwarder = if original_shape.is_some() {
            Some(Trampoline::allocate()?)
        } else {
            None
        };

        let mut bound = Ok(());
        let context = Arc::new_cyclic(|weak: &Weak<HookContext>| {
            bound = trampoline
                .bind(&method_shape, dispatch::dispatch_method, weak.clone())
                .and_then(|()| match (forwarder.as_mut(), original_shape.as_ref()) {
                    (Some(forwarder), Some(shape)) => forwarder.bind(shape, dispatch::dispatch_original, weak.clone()),
                    _ => Ok(()),
                });
            HookContext {
                trampoline,
                forwarder,
                method_shape,
                replacement_shape,
                original_shape,
                id,
                class,
                selector: method.name(),
                mode,
                layout,
                replacement,
                original: AtomicPtr::new(ptr::null_mut()),
                next: AtomicPtr::new(ptr::null_mut()),
                state: AtomicU8::new(UNINSTALLED),
                trace,
            }
        });
        bound?;
        Ok(context)
    }

    /// Puts the trampoline into `method`'s slot and returns the displaced IMP.
    ///
    /// The displaced value is whatever the slot held at the instant of the
    /// swap, so a wrapper installed by someone else in the meantime ends up
    /// behind this hook rather than being dropped.
    pub(crate) fn install(&self, method: &Method) -> Imp {
        let code = self.trampoline.code();
        let mut current = method.implementation();
        self.state.store(INSTALLED, Ordering::Release);
        loop {
            self.original.store(current.as_ptr(), Ordering::Release);
            self.next.store(current.as_ptr(), Ordering::Release);
            match method.compare_exchange_implementation(current, code) {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }

    /// Installed → cancelled. False when someone else got there first.
    pub(crate) fn mark_cancelled(&self) -> bool {
        self.state
            .compare_exchange(INSTALLED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Repoints `next` from `from` to `to`. False if it no longer held `from`.
    pub(crate) fn relink(&self, from: Imp, to: Imp) -> bool {
        self.next
            .compare_exchange(from.as_ptr(), to.as_ptr(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            UNINSTALLED => State::Uninstalled,
            INSTALLED => State::Installed,
            _ => State::Cancelled,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn class(&self) -> &'static Class {
        self.class
    }

    pub(crate) fn selector(&self) -> Sel {
        self.selector
    }

    pub(crate) fn mode(&self) -> HookMode {
        self.mode
    }

    /// Address installed into method slots.
    pub(crate) fn code(&self) -> Imp {
        self.trampoline.code()
    }

    pub(crate) fn original(&self) -> Option<Imp> {
        Imp::new(self.original.load(Ordering::Acquire))
    }

    pub(crate) fn next(&self) -> Option<Imp> {
        Imp::new(self.next.load(Ordering::Acquire))
    }

    fn next_or_fatal(&self) -> Imp {
        match self.next() {
            Some(next) => next,
            None => fatal("hook trampoline called before install"),
        }
    }

    /// Body of every call through the trampoline.
    ///
    /// # Safety
    /// `ret` and `args` are the buffers libffi hands the closure for
    /// `method_shape`.
    pub(crate) unsafe fn dispatch(&self, ret: *mut c_void, args: *mut *mut c_void) {
        let next = self.next_or_fatal();
        if self.state() == State::Cancelled {
            // Still referenced from outside the chain: pass straight through.
            self.method_shape.call(next, ret, args);
            return;
        }
        if self.trace {
            log::trace!(
                "{} hook #{} on -[{} {}] (depth {})",
                self.mode,
                self.id,
                self.class.name(),
                self.selector,
                invocation::depth()
            );
        }

        let receiver = *(*args as *const *mut c_void);
        let selector = *(*args.add(1) as *const *mut c_void);
        let _frame = FrameGuard::enter(self.id, receiver, selector);

        match self.mode {
            HookMode::Before => {
                self.call_replacement(args, None, ptr::null_mut());
                self.method_shape.call(next, ret, args);
            }
            HookMode::After => {
                self.method_shape.call(next, ret, args);
                if self.layout.result {
                    let mut result = self.method_shape.return_buffer();
                    ptr::copy_nonoverlapping(
                        ret as *const u8,
                        result.as_mut_ptr() as *mut u8,
                        self.method_shape.return_storage(),
                    );
                    self.call_replacement(args, Some(result.value_ptr()), ptr::null_mut());
                } else {
                    self.call_replacement(args, None, ptr::null_mut());
                }
            }
            HookMode::Instead => self.call_replacement(args, None, ret),
        }
    }

    /// Calls the replacement with the parameters its layout asked for.
    /// A null `ret` means the replacement returns void.
    unsafe fn call_replacement(&self, args: *mut *mut c_void, result: Option<*mut c_void>, ret: *mut c_void) {
        let method_args = core::slice::from_raw_parts(args, self.method_shape.arity());
        let mut original = self.forwarder.as_ref().map(|f| f.code().as_ptr());

        let mut params: Vec<*mut c_void> = Vec::with_capacity(self.replacement_shape.arity());
        if let Some(original) = original.as_mut() {
            params.push(original as *mut *mut c_void as *mut c_void);
        }
        match self.layout.arguments {
            Arguments::Omitted => {}
            Arguments::Plain => params.extend_from_slice(&method_args[2..]),
            Arguments::WithReceiver => params.extend_from_slice(method_args),
        }
        params.extend(result);
        debug_assert_eq!(params.len(), self.replacement_shape.arity());

        let mut unused = 0u64;
        let ret = if ret.is_null() {
            &mut unused as *mut u64 as *mut c_void
        } else {
            ret
        };
        self.replacement_shape.call(self.replacement.code(), ret, params.as_mut_ptr());
    }

    /// Body of the "original" callable handed to the replacement.
    ///
    /// # Safety
    /// `ret` and `args` are the buffers libffi hands the closure for
    /// `original_shape`.
    pub(crate) unsafe fn forward_original(&self, ret: *mut c_void, args: *mut *mut c_void) {
        let next = self.next_or_fatal();
        if self.layout.arguments == Arguments::WithReceiver {
            self.method_shape.call(next, ret, args);
            return;
        }

        let Some(frame) = invocation::current(self.id) else {
            fatal("original implementation called outside of its hook invocation");
        };
        let plain = self.original_shape.as_ref().map_or(0, CallShape::arity);
        let mut receiver = frame.receiver;
        let mut selector = frame.selector;
        let mut full: Vec<*mut c_void> = Vec::with_capacity(plain + 2);
        full.push(&mut receiver as *mut *mut c_void as *mut c_void);
        full.push(&mut selector as *mut *mut c_void as *mut c_void);
        full.extend_from_slice(core::slice::from_raw_parts(args, plain));
        self.method_shape.call(next, ret, full.as_mut_ptr());
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .field("selector", &self.selector)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("code", &self.code())
            .field("original", &self.original())
            .field("next", &self.next())
            .finish()
    }
}

impl Drop for HookContext {
    fn drop(&mut self) {
        log::debug!(
            "releasing {} hook #{} on -[{} {}]",
            self.mode,
            self.id,
            self.class.name(),
            self.selector
        );
    }
}
