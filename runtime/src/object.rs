use core::sync::atomic::{AtomicPtr, Ordering};

use crate::class::{Class, Imp};
use crate::error::{Result, RuntimeError};
use crate::selector::Sel;

/// Object header. Types that embed it first (`#[repr(C)]`) can be passed as
/// receivers of any method.
#[repr(C)]
#[derive(Debug)]
pub struct Object {
    isa: AtomicPtr<Class>,
}

impl Object {
    pub fn new(class: &'static Class) -> Self {
        Self {
            isa: AtomicPtr::new(class as *const Class as *mut Class),
        }
    }

    pub fn class(&self) -> &'static Class {
        // isa is only ever written from &'static Class.
        unsafe { &*self.isa.load(Ordering::Acquire) }
    }

    /// Points this object at another class and returns the previous one.
    pub fn set_class(&self, class: &'static Class) -> &'static Class {
        let old = self.isa.swap(class as *const Class as *mut Class, Ordering::AcqRel);
        unsafe { &*old }
    }

    pub fn responds_to(&self, sel: Sel) -> bool {
        self.class().instance_method(sel).is_some()
    }

    /// Resolves the current implementation of `sel` and hands it to `call`.
    ///
    /// The calling thread stays pinned to the global reclamation epoch for the
    /// whole call, so an implementation that gets unhooked concurrently is not
    /// released before `call` returns.
    ///
    /// ```
    /// use swizzle_runtime::{Class, Imp, Object, Sel};
    ///
    /// extern "C" fn answer(_this: &Object, _cmd: Sel) -> i64 {
    ///     42
    /// }
    ///
    /// let class = Class::register("Doc.Answer", None).unwrap();
    /// let sel = Sel::register("answer");
    /// let imp = Imp::new(answer as *const core::ffi::c_void).unwrap();
    /// unsafe { class.add_method(sel, imp, "q@:") };
    ///
    /// let obj = Object::new(class);
    /// let value = obj
    ///     .send(sel, |imp| unsafe {
    ///         imp.cast::<extern "C" fn(&Object, Sel) -> i64>()(&obj, sel)
    ///     })
    ///     .unwrap();
    /// assert_eq!(value, 42);
    /// ```
    pub fn send<R>(&self, sel: Sel, call: impl FnOnce(Imp) -> R) -> Result<R> {
        let _guard = crossbeam_epoch::pin();
        let class = self.class();
        let method = class.instance_method(sel).ok_or_else(|| RuntimeError::SelectorNotFound {
            class: class.name().to_owned(),
            selector: sel.name().to_owned(),
        })?;
        Ok(call(method.implementation()))
    }
}
