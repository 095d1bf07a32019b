//! Implementations given to subclasses that only inherit a hooked method.
//!
//! Copying the superclass's IMP into the subclass would freeze whatever the
//! superclass slot held at that moment, possibly another chain's trampoline.
//! The forwarder instead looks the superclass implementation up on every
//! call, like a message to `super`.

use core::ffi::c_void;
use std::sync::Arc;

use libffi::raw;
use swizzle_runtime::{Class, Imp, Method, Sel};

use crate::code::{CallShape, Trampoline};
use crate::interceptor::dispatch::fatal;
use crate::signature::Signature;
use crate::types::Result;

struct SuperCall {
    shape: Arc<CallShape>,
    superclass: &'static Class,
    selector: Sel,
}

pub(crate) struct SuperForwarder {
    trampoline: Trampoline<SuperCall>,
}

impl SuperForwarder {
    /// Forwarder for `method`, an implementation `superclass` defines or inherits.
    pub(crate) fn new(superclass: &'static Class, method: &Method) -> Result<SuperForwarder> {
        let signature = Signature::for_method(superclass.name(), method)?;
        let shape = Arc::new(CallShape::new(&signature)?);
        let mut trampoline = Trampoline::allocate()?;
        trampoline.bind(
            &shape,
            dispatch_super,
            SuperCall {
                shape: shape.clone(),
                superclass,
                selector: method.name(),
            },
        )?;
        Ok(SuperForwarder { trampoline })
    }

    pub(crate) fn code(&self) -> Imp {
        self.trampoline.code()
    }
}

unsafe extern "C" fn dispatch_super(
    _cif: *mut raw::ffi_cif,
    ret: *mut c_void,
    args: *mut *mut c_void,
    userdata: *mut c_void,
) {
    let _epoch = crossbeam_epoch::pin();
    let call = &*(userdata as *const SuperCall);
    let Some(method) = call.superclass.instance_method(call.selector) else {
        fatal("superclass lost the method a subclass forwards to");
    };
    call.shape.call(method.implementation(), ret, args);
}
