use core::ffi::c_void;
use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicPtr, Ordering};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{Result, RuntimeError};
use crate::selector::Sel;

/// Untyped method implementation pointer.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Imp(NonNull<c_void>);

unsafe impl Send for Imp {}
unsafe impl Sync for Imp {}

impl Imp {
    pub fn new(ptr: *const c_void) -> Option<Imp> {
        NonNull::new(ptr as *mut c_void).map(Imp)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    /// Reinterprets the pointer as a concrete function pointer type.
    ///
    /// # Safety
    /// `F` must be an `extern "C"` function pointer type matching the real
    /// signature of the code behind this pointer.
    pub unsafe fn cast<F: Copy>(self) -> F {
        assert_eq!(core::mem::size_of::<F>(), core::mem::size_of::<*mut c_void>());
        core::mem::transmute_copy(&self.0)
    }
}

impl fmt::Debug for Imp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Imp({:p})", self.0)
    }
}

/// One entry of a class's method table.
pub struct Method {
    name: Sel,
    types: Option<String>,
    imp: AtomicPtr<c_void>,
}

impl Method {
    fn new(name: Sel, imp: Imp, types: Option<String>) -> Self {
        Self {
            name,
            types,
            imp: AtomicPtr::new(imp.as_ptr()),
        }
    }

    pub fn name(&self) -> Sel {
        self.name
    }

    /// Type encoding of the implementation, receiver and selector included.
    pub fn type_encoding(&self) -> Option<&str> {
        self.types.as_deref()
    }

    pub fn implementation(&self) -> Imp {
        let ptr = self.imp.load(Ordering::Acquire);
        // The slot is only ever written from non-null Imps.
        Imp(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Installs `imp` and returns the implementation it replaced.
    pub fn set_implementation(&self, imp: Imp) -> Imp {
        let old = self.imp.swap(imp.as_ptr(), Ordering::AcqRel);
        Imp(unsafe { NonNull::new_unchecked(old) })
    }

    /// Installs `new` only if the slot still holds `current`.
    ///
    /// On failure the implementation actually installed is returned.
    pub fn compare_exchange_implementation(&self, current: Imp, new: Imp) -> core::result::Result<Imp, Imp> {
        self.imp
            .compare_exchange(current.as_ptr(), new.as_ptr(), Ordering::AcqRel, Ordering::Acquire)
            .map(|p| Imp(unsafe { NonNull::new_unchecked(p) }))
            .map_err(|p| Imp(unsafe { NonNull::new_unchecked(p) }))
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("imp", &self.implementation())
            .finish()
    }
}

/// A class: a name, an optional superclass and a method table.
///
/// Classes are registered once and live for the rest of the process.
pub struct Class {
    name: String,
    superclass: Option<&'static Class>,
    methods: RwLock<HashMap<Sel, Arc<Method>>>,
}

fn registry() -> &'static RwLock<HashMap<String, &'static Class>> {
    static CLASSES: OnceLock<RwLock<HashMap<String, &'static Class>>> = OnceLock::new();
    CLASSES.get_or_init(|| RwLock::new(HashMap::new()))
}

impl Class {
    pub fn register(name: &str, superclass: Option<&'static Class>) -> Result<&'static Class> {
        let mut classes = registry().write();
        if classes.contains_key(name) {
            return Err(RuntimeError::DuplicateClass(name.to_owned()));
        }
        let class: &'static Class = Box::leak(Box::new(Class {
            name: name.to_owned(),
            superclass,
            methods: RwLock::new(HashMap::new()),
        }));
        classes.insert(name.to_owned(), class);
        Ok(class)
    }

    pub fn lookup(name: &str) -> Option<&'static Class> {
        registry().read().get(name).copied()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<&'static Class> {
        self.superclass
    }

    pub fn is_subclass_of(&self, other: &Class) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if core::ptr::eq(class, other) {
                return true;
            }
            current = class.superclass.map(|c| c as &Class);
        }
        false
    }

    /// Adds a method unless this class already defines `sel`.
    ///
    /// # Safety
    /// `types` must describe the real signature of `imp`, with the receiver
    /// (`@`) and selector (`:`) as the first two arguments.
    pub unsafe fn add_method(&self, sel: Sel, imp: Imp, types: &str) -> bool {
        self.insert(Method::new(sel, imp, Some(types.to_owned())))
    }

    /// Adds a method that carries no type encoding.
    ///
    /// # Safety
    /// `imp` must follow the method calling convention (receiver, selector,
    /// arguments).
    pub unsafe fn add_untyped_method(&self, sel: Sel, imp: Imp) -> bool {
        self.insert(Method::new(sel, imp, None))
    }

    fn insert(&self, method: Method) -> bool {
        let mut methods = self.methods.write();
        if methods.contains_key(&method.name) {
            return false;
        }
        methods.insert(method.name, Arc::new(method));
        true
    }

    /// The method this class defines itself, ignoring superclasses.
    pub fn own_method(&self, sel: Sel) -> Option<Arc<Method>> {
        self.methods.read().get(&sel).cloned()
    }

    /// Resolves `sel` through this class and its superclasses.
    pub fn instance_method(&self, sel: Sel) -> Option<Arc<Method>> {
        let mut current = Some(self);
        while let Some(class) = current {
            if let Some(method) = class.own_method(sel) {
                return Some(method);
            }
            current = class.superclass.map(|c| c as &Class);
        }
        None
    }

    pub fn methods(&self) -> Vec<Arc<Method>> {
        self.methods.read().values().cloned().collect()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("superclass", &self.superclass.map(|c| c.name()))
            .finish()
    }
}
