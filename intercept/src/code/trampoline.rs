use core::ffi::c_void;
use core::ptr;

use libffi::raw;
use swizzle_runtime::Imp;

use crate::code::call_shape::CallShape;
use crate::types::{HookError, Result};

/// Callback every trampoline invocation lands in: the cif it was prepared
/// with, the return slot, pointers to each argument, and the bound userdata.
pub type DispatchFn = unsafe extern "C" fn(
    cif: *mut raw::ffi_cif,
    ret: *mut c_void,
    args: *mut *mut c_void,
    userdata: *mut c_void,
);

/// Executable stub with the calling convention of a [`CallShape`].
///
/// Owns one libffi closure (writable descriptor plus executable code page)
/// and the userdata handed to its callback. The closure is released exactly
/// once, when the trampoline drops; whoever owns it must make sure nothing can
/// still jump to [`Trampoline::code`] by then.
pub struct Trampoline<U> {
    closure: *mut raw::ffi_closure,
    code: Imp,
    userdata: Option<Box<U>>,
}

unsafe impl<U: Send + Sync> Send for Trampoline<U> {}
unsafe impl<U: Send + Sync> Sync for Trampoline<U> {}

impl<U> Trampoline<U> {
    /// Reserves the closure memory. Nothing can call it until [`bind`](Self::bind).
    pub fn allocate() -> Result<Self> {
        let mut code: *mut c_void = ptr::null_mut();
        let closure = unsafe { raw::ffi_closure_alloc(core::mem::size_of::<raw::ffi_closure>(), &mut code) }
            as *mut raw::ffi_closure;
        if closure.is_null() {
            return Err(HookError::Ffi("ffi_closure_alloc failed".into()));
        }
        let Some(code) = Imp::new(code) else {
            unsafe { raw::ffi_closure_free(closure.cast()) };
            return Err(HookError::Ffi("ffi_closure_alloc returned no code address".into()));
        };
        Ok(Self {
            closure,
            code,
            userdata: None,
        })
    }

    /// Prepares the closure so calls through [`code`](Self::code) reach
    /// `dispatch` with `userdata`.
    ///
    /// `shape` must outlive the trampoline: libffi keeps pointing at its cif.
    pub fn bind(&mut self, shape: &CallShape, dispatch: DispatchFn, userdata: U) -> Result<()> {
        let userdata = Box::new(userdata);
        let status = unsafe {
            raw::ffi_prep_closure_loc(
                self.closure,
                shape.as_raw(),
                Some(dispatch),
                &*userdata as *const U as *mut c_void,
                self.code.as_ptr(),
            )
        };
        if status != raw::ffi_status_FFI_OK {
            return Err(HookError::Ffi(format!("ffi_prep_closure_loc failed (status {status:?})")));
        }
        self.userdata = Some(userdata);
        Ok(())
    }

    pub fn code(&self) -> Imp {
        self.code
    }

    pub fn is_bound(&self) -> bool {
        self.userdata.is_some()
    }
}

impl<U> Drop for Trampoline<U> {
    fn drop(&mut self) {
        unsafe { raw::ffi_closure_free(self.closure.cast()) };
    }
}
