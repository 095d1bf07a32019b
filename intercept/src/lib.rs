//! swizzle-intercept: runtime method hooking.
//!
//! Hooks replace a method's implementation slot with a libffi trampoline
//! built from the method's type encoding, so any argument and return shape
//! can be intercepted without generated code. Several hooks on one method
//! compose into a chain and can be cancelled in any order.

pub mod code;
pub mod config;
pub mod interceptor;
pub mod signature;
pub mod types;

// Re-exports for convenience (flattened imports)
pub use config::HookConfig;
pub use interceptor::invocation::{self, in_dispatch};
pub use interceptor::replacement::Replacement;
pub use interceptor::{ChainInfo, HookInfo, HookToken, Interceptor};
pub use signature::{Signature, TypeDescriptor, TypeKind};
pub use swizzle_runtime::{Class, Imp, Method, Object, Sel};
pub use types::{HookError, HookMode, Result};

/// Sets the engine configuration.
///
/// Must run before the first hook is installed; afterwards the settings read
/// from the environment stay in effect and this returns false.
pub fn init(config: HookConfig) -> bool {
    interceptor::configure(config)
}

/// Installs `replacement` on `class`'s implementation of `selector`.
/// See [`Interceptor::hook`].
pub fn hook(class: &'static Class, selector: Sel, mode: HookMode, replacement: Replacement) -> Result<HookToken> {
    Interceptor::obtain().hook(class, selector, mode, replacement)
}

/// Removes the hook behind `token`. True only if this call cancelled it.
pub fn cancel(token: &HookToken) -> bool {
    Interceptor::obtain().cancel(token)
}

pub fn is_hooked(class: &'static Class, selector: Sel) -> bool {
    Interceptor::obtain().is_hooked(class, selector)
}

pub fn hook_count(class: &'static Class, selector: Sel) -> usize {
    Interceptor::obtain().hook_count(class, selector)
}

pub fn snapshot() -> Vec<ChainInfo> {
    Interceptor::obtain().snapshot()
}

/// Process-global lock for tests that swap method implementations.
///
/// Tests that install hooks hold this lock so slot contents observed by one
/// test are not changed underneath it by another.
#[cfg(test)]
pub(crate) fn lock_hook_tests() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|e| e.into_inner())
}
