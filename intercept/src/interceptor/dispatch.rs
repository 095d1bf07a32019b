//! libffi closure callbacks. Both resolve the owning context through the
//! `Weak` bound as trampoline userdata and hold it for the whole call.

use core::ffi::c_void;
use std::sync::Weak;

use libffi::raw;

use crate::interceptor::context::HookContext;

/// Internal consistency violation: the chain no longer matches the live
/// pointers, so no call can be routed safely.
pub(crate) fn fatal(message: &str) -> ! {
    log::error!("swizzle: {message}");
    std::process::abort()
}

unsafe fn context(userdata: *mut c_void) -> std::sync::Arc<HookContext> {
    let weak = &*(userdata as *const Weak<HookContext>);
    match weak.upgrade() {
        Some(context) => context,
        None => fatal("trampoline called after its hook was released"),
    }
}

/// Installed into method slots.
pub(crate) unsafe extern "C" fn dispatch_method(
    _cif: *mut raw::ffi_cif,
    ret: *mut c_void,
    args: *mut *mut c_void,
    userdata: *mut c_void,
) {
    let _epoch = crossbeam_epoch::pin();
    context(userdata).dispatch(ret, args);
}

/// Handed to replacements as their "original" callable.
pub(crate) unsafe extern "C" fn dispatch_original(
    _cif: *mut raw::ffi_cif,
    ret: *mut c_void,
    args: *mut *mut c_void,
    userdata: *mut c_void,
) {
    let _epoch = crossbeam_epoch::pin();
    context(userdata).forward_original(ret, args);
}
